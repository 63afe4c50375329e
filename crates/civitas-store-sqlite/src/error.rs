//! Error type for `civitas-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] civitas_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored tag column held a value no enum variant matches.
  #[error("unknown {column} value: {value:?}")]
  UnknownTag { column: &'static str, value: String },

  #[error("negative value in {0}")]
  Negative(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
