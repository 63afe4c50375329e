//! Error types for the civitas-export serializers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("write failed: {0}")]
  Io(#[from] std::io::Error),

  /// A record had a different number of fields than the header.
  #[error("record has {got} fields, header has {expected}")]
  FieldCount { expected: usize, got: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
