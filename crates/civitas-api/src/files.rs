//! Content-addressed file store for uploaded documents.
//!
//! Files are named by the SHA-256 hex digest of their bytes and fanned out
//! by the first two hex characters: `<root>/ab/abcdef…`. Identical uploads
//! share one file.

use std::{
  io,
  path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct FileStore {
  root: PathBuf,
}

impl FileStore {
  pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

  pub fn root(&self) -> &Path { &self.root }

  /// SHA-256 hex digest of `bytes`; the key they are stored under.
  pub fn key_for(bytes: &[u8]) -> String { hex::encode(Sha256::digest(bytes)) }

  /// Store `bytes` and return their key. Writing existing content is a no-op.
  pub async fn put(&self, bytes: &[u8]) -> io::Result<String> {
    let key = Self::key_for(bytes);
    let path = self.path_for(&key)?;
    if tokio::fs::try_exists(&path).await? {
      return Ok(key);
    }
    if let Some(dir) = path.parent() {
      tokio::fs::create_dir_all(dir).await?;
    }
    // Write beside the target and rename so readers never see a partial file.
    let staging = path.with_extension(format!("{}.part", uuid::Uuid::new_v4()));
    tokio::fs::write(&staging, bytes).await?;
    tokio::fs::rename(&staging, &path).await?;
    tracing::debug!(key = %key, size = bytes.len(), "stored upload");
    Ok(key)
  }

  /// The bytes stored under `key`, or `None` if absent.
  pub async fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
    let path = self.path_for(key)?;
    match tokio::fs::read(&path).await {
      Ok(bytes) => Ok(Some(bytes)),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e),
    }
  }

  fn path_for(&self, key: &str) -> io::Result<PathBuf> {
    let valid = key.len() == 64 && key.bytes().all(|b| b.is_ascii_hexdigit());
    if !valid {
      return Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("malformed storage key {key:?}"),
      ));
    }
    Ok(self.root.join(&key[..2]).join(key))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scratch() -> FileStore {
    FileStore::new(std::env::temp_dir().join(format!("civitas-files-{}", uuid::Uuid::new_v4())))
  }

  #[tokio::test]
  async fn put_then_get() {
    let files = scratch();
    let key = files.put(b"%PDF-1.7 acte").await.unwrap();
    assert_eq!(key.len(), 64);
    assert!(files.root().join(&key[..2]).join(&key).exists());
    assert_eq!(files.get(&key).await.unwrap().as_deref(), Some(&b"%PDF-1.7 acte"[..]));
    let _ = std::fs::remove_dir_all(files.root());
  }

  #[tokio::test]
  async fn identical_content_shares_a_key() {
    let files = scratch();
    let a = files.put(b"same").await.unwrap();
    let b = files.put(b"same").await.unwrap();
    assert_eq!(a, b);
    let _ = std::fs::remove_dir_all(files.root());
  }

  #[tokio::test]
  async fn missing_key_is_none() {
    let files = scratch();
    assert!(files.get(&"0".repeat(64)).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn path_traversal_is_refused() {
    let files = scratch();
    let err = files.get("../../etc/passwd").await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
  }
}
