//! Documents attached to requests. File bytes live in the file store; only
//! metadata and the content-addressed storage key are kept here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, request::RequestKind};

/// Tag given to the official document an agent attaches before completion.
pub const FINAL_CERTIFICATE: &str = "final_certificate";
/// Tag given to a pre-existing certificate uploaded by a citizen.
pub const EXISTING_CERTIFICATE: &str = "existing_certificate";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
  pub document_id:  Uuid,
  pub request_kind: RequestKind,
  pub request_id:   Uuid,
  /// Free-form: `identity_proof`, `existing_certificate`, `final_certificate`…
  pub doc_type:     String,
  pub file_name:    String,
  pub media_type:   String,
  pub size_bytes:   u64,
  /// SHA-256 hex digest of the content; also the key in the file store.
  pub storage_key:  String,
  pub url:          String,
  pub uploaded_by:  Uuid,
  pub created_at:   DateTime<Utc>,
}

/// Input to [`crate::store::PortalStore::add_document`].
#[derive(Debug, Clone)]
pub struct NewDocument {
  pub request_kind: RequestKind,
  pub request_id:   Uuid,
  pub doc_type:     String,
  pub file_name:    String,
  pub media_type:   String,
  pub size_bytes:   u64,
  pub storage_key:  String,
  pub uploaded_by:  Uuid,
}

/// The path a stored document is served from.
pub fn content_url(document_id: Uuid) -> String {
  format!("/api/documents/{document_id}/content")
}

// ─── Media types ─────────────────────────────────────────────────────────────

/// Upload media types accepted by the portal.
pub const ALLOWED_MEDIA_TYPES: [&str; 3] =
  ["application/pdf", "image/jpeg", "image/png"];

/// Check a declared media type against the allow-list and the content's
/// leading bytes. Returns the normalized media type.
pub fn check_media_type(declared: &str, content: &[u8]) -> Result<&'static str> {
  let declared = declared
    .split(';')
    .next()
    .unwrap_or_default()
    .trim()
    .to_ascii_lowercase();

  let media_type = ALLOWED_MEDIA_TYPES
    .into_iter()
    .find(|allowed| *allowed == declared)
    .ok_or_else(|| {
      Error::validation(format!(
        "type de fichier non autorisé : {declared} (PDF, JPEG ou PNG uniquement)"
      ))
    })?;

  let magic_ok = match media_type {
    "application/pdf" => content.starts_with(b"%PDF"),
    "image/jpeg" => content.starts_with(&[0xFF, 0xD8, 0xFF]),
    "image/png" => content.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
    _ => false,
  };
  if !magic_ok {
    return Err(Error::validation(
      "le contenu du fichier ne correspond pas à son type déclaré",
    ));
  }

  Ok(media_type)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pdf_with_parameters_is_accepted() {
    let mt = check_media_type("application/pdf; charset=binary", b"%PDF-1.7\n").unwrap();
    assert_eq!(mt, "application/pdf");
  }

  #[test]
  fn disallowed_type_is_rejected() {
    assert!(check_media_type("text/plain", b"hello").is_err());
  }

  #[test]
  fn mismatched_magic_is_rejected() {
    assert!(check_media_type("image/png", b"%PDF-1.4").is_err());
  }

  #[test]
  fn png_magic_is_recognized() {
    let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
    assert_eq!(check_media_type("IMAGE/PNG", &png).unwrap(), "image/png");
  }
}
