//! The response envelope, [`ApiError`] and its [`IntoResponse`] mapping.
//!
//! Every JSON endpoint answers `{ ok, data, error }`. Errors carry the coarse
//! [`ErrorKind`], a stable code and a French message; internal failures are
//! logged with their source chain and answered with a generic message.

use axum::{
  Json,
  extract::multipart::{MultipartError, MultipartRejection},
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use civitas_core::ErrorKind;
use serde::Serialize;
use thiserror::Error;

// ─── Envelope ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorBody {
  pub kind:    ErrorKind,
  pub code:    &'static str,
  pub message: String,
}

/// `{ "ok": bool, "data": T | null, "error": {...} | null }`
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
  pub ok:    bool,
  pub data:  Option<T>,
  pub error: Option<ErrorBody>,
}

impl<T: Serialize> Envelope<T> {
  pub fn ok(data: T) -> Self { Self { ok: true, data: Some(data), error: None } }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
  fn into_response(self) -> Response { Json(self).into_response() }
}

pub type ApiResult<T> = Result<Envelope<T>, ApiError>;

// ─── Error ───────────────────────────────────────────────────────────────────

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Core(#[from] civitas_core::Error),

  #[error("cette adresse e-mail est déjà utilisée")]
  EmailTaken,

  #[error("le fichier dépasse la taille maximale autorisée ({} Mo)", mebibytes(.0))]
  PayloadTooLarge(usize),

  #[error("requête invalide : {0}")]
  BadRequest(String),

  #[error("file store error: {0}")]
  Io(#[from] std::io::Error),

  #[error("export error: {0}")]
  Export(#[from] civitas_export::Error),
}

impl ApiError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Core(e) => e.kind(),
      Self::EmailTaken | Self::PayloadTooLarge(_) | Self::BadRequest(_) => {
        ErrorKind::Validation
      }
      Self::Io(_) | Self::Export(_) => ErrorKind::Internal,
    }
  }

  pub fn code(&self) -> &'static str {
    match self {
      Self::Core(e) => e.code(),
      Self::EmailTaken => "EMAIL_TAKEN",
      Self::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
      Self::BadRequest(_) => "BAD_REQUEST",
      Self::Io(_) | Self::Export(_) => "INTERNAL",
    }
  }

  pub fn status(&self) -> StatusCode {
    if let Self::PayloadTooLarge(_) = self {
      return StatusCode::PAYLOAD_TOO_LARGE;
    }
    match self.kind() {
      ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
      ErrorKind::Forbidden => StatusCode::FORBIDDEN,
      ErrorKind::NotFound => StatusCode::NOT_FOUND,
      ErrorKind::Validation => StatusCode::BAD_REQUEST,
      ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// The message shown to the caller. Internal details stay in the logs.
  fn public_message(&self) -> String {
    match self {
      Self::Core(civitas_core::Error::Gateway(_)) => {
        "passerelle de paiement indisponible".to_owned()
      }
      _ if self.kind() == ErrorKind::Internal => {
        "une erreur interne est survenue".to_owned()
      }
      _ => self.to_string(),
    }
  }
}

fn mebibytes(bytes: &usize) -> usize { bytes / (1024 * 1024) }

fn source_chain(e: &dyn std::error::Error) -> String {
  let mut chain = e.to_string();
  let mut current = e.source();
  while let Some(cause) = current {
    chain.push_str(": ");
    chain.push_str(&cause.to_string());
    current = cause.source();
  }
  chain
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(code = self.code(), error = %source_chain(&self), "request failed");
    }
    let body = Envelope::<()> {
      ok:    false,
      data:  None,
      error: Some(ErrorBody {
        kind:    self.kind(),
        code:    self.code(),
        message: self.public_message(),
      }),
    };
    (status, Json(body)).into_response()
  }
}

// ─── Extractor rejections ────────────────────────────────────────────────────

impl From<JsonRejection> for ApiError {
  fn from(r: JsonRejection) -> Self { Self::BadRequest(r.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(r: QueryRejection) -> Self { Self::BadRequest(r.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(r: PathRejection) -> Self { Self::BadRequest(r.body_text()) }
}

impl From<MultipartRejection> for ApiError {
  fn from(r: MultipartRejection) -> Self { Self::BadRequest(r.body_text()) }
}

/// Map a multipart read failure, recognizing the body-limit case.
pub(crate) fn multipart_error(e: MultipartError, limit: usize) -> ApiError {
  if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
    ApiError::PayloadTooLarge(limit)
  } else {
    ApiError::BadRequest(e.body_text())
  }
}

#[cfg(test)]
mod tests {
  use uuid::Uuid;

  use super::*;
  use civitas_core::{Error, request::RequestKind};

  #[test]
  fn already_processed_is_403() {
    let e = ApiError::from(Error::AlreadyProcessed);
    assert_eq!(e.status(), StatusCode::FORBIDDEN);
    assert_eq!(e.code(), "REQUEST_ALREADY_PROCESSED");
  }

  #[test]
  fn not_found_is_404() {
    let e = ApiError::from(Error::RequestNotFound {
      kind: RequestKind::BirthCertificate,
      id:   Uuid::nil(),
    });
    assert_eq!(e.status(), StatusCode::NOT_FOUND);
  }

  #[test]
  fn oversize_is_413_with_validation_kind() {
    let e = ApiError::PayloadTooLarge(2 * 1024 * 1024);
    assert_eq!(e.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(e.kind(), ErrorKind::Validation);
    assert!(e.to_string().contains("2 Mo"), "{e}");
  }

  #[test]
  fn internal_message_is_generic() {
    let io = std::io::Error::other("disk /var/lib/civitas full");
    let e = ApiError::from(Error::store(io));
    assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!e.public_message().contains("/var/lib"));
  }

  #[test]
  fn chain_includes_sources() {
    let io = std::io::Error::other("disk full");
    let e = ApiError::from(Error::store(io));
    assert!(source_chain(&e).ends_with("disk full"), "{}", source_chain(&e));
  }
}
