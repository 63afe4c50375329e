//! Error types for `civitas-core`.
//!
//! Every variant maps onto one of five coarse [`ErrorKind`]s (the HTTP-facing
//! taxonomy) and carries a stable machine-readable [`Error::code`]. Display
//! strings are French because they are shown to citizens and agents verbatim.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::request::RequestKind;

/// Coarse error classification shared by every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  Unauthorized,
  Forbidden,
  NotFound,
  Validation,
  Internal,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("authentification requise")]
  Unauthorized,

  #[error("accès refusé : {0}")]
  Forbidden(String),

  #[error("{kind} introuvable : {id}")]
  RequestNotFound { kind: RequestKind, id: Uuid },

  #[error("{0} introuvable")]
  NotFound(String),

  #[error("Cette demande a déjà été traitée par l'administrateur")]
  AlreadyProcessed,

  #[error("un paiement validé est requis avant l'approbation")]
  PaymentRequired,

  #[error("le document final doit être joint avant l'approbation")]
  FinalDocumentRequired,

  #[error("le motif du rejet est obligatoire")]
  ReasonRequired,

  #[error("cette demande est déjà payée")]
  AlreadyPaid,

  #[error("session de paiement invalide : {0}")]
  InvalidSession(String),

  #[error("le paiement n'est pas finalisé (statut : {0})")]
  PaymentNotCompleted(String),

  #[error("métadonnées de paiement manquantes : {0}")]
  MetadataMissing(&'static str),

  #[error("{0}")]
  Validation(String),

  #[error("passerelle de paiement indisponible : {0}")]
  Gateway(String),

  #[error("erreur de stockage : {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a backend error. Used as `.map_err(Error::store)`.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }

  pub fn validation(msg: impl Into<String>) -> Self {
    Self::Validation(msg.into())
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Unauthorized => ErrorKind::Unauthorized,
      Self::Forbidden(_) | Self::AlreadyProcessed => ErrorKind::Forbidden,
      Self::RequestNotFound { .. } | Self::NotFound(_) => ErrorKind::NotFound,
      Self::PaymentRequired
      | Self::FinalDocumentRequired
      | Self::ReasonRequired
      | Self::AlreadyPaid
      | Self::InvalidSession(_)
      | Self::PaymentNotCompleted(_)
      | Self::MetadataMissing(_)
      | Self::Validation(_) => ErrorKind::Validation,
      Self::Gateway(_) | Self::Store(_) => ErrorKind::Internal,
    }
  }

  /// Stable identifier for clients that need to branch on the failure.
  pub fn code(&self) -> &'static str {
    match self {
      Self::Unauthorized => "UNAUTHORIZED",
      Self::Forbidden(_) => "FORBIDDEN",
      Self::RequestNotFound { .. } => "REQUEST_NOT_FOUND",
      Self::NotFound(_) => "NOT_FOUND",
      Self::AlreadyProcessed => "REQUEST_ALREADY_PROCESSED",
      Self::PaymentRequired => "PAYMENT_REQUIRED",
      Self::FinalDocumentRequired => "FINAL_DOCUMENT_REQUIRED",
      Self::ReasonRequired => "REASON_REQUIRED",
      Self::AlreadyPaid => "ALREADY_PAID",
      Self::InvalidSession(_) => "INVALID_SESSION",
      Self::PaymentNotCompleted(_) => "PAYMENT_NOT_COMPLETED",
      Self::MetadataMissing(_) => "METADATA_MISSING",
      Self::Validation(_) => "VALIDATION",
      Self::Gateway(_) => "GATEWAY_ERROR",
      Self::Store(_) => "INTERNAL",
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn already_processed_is_forbidden() {
    assert_eq!(Error::AlreadyProcessed.kind(), ErrorKind::Forbidden);
    assert_eq!(Error::AlreadyProcessed.code(), "REQUEST_ALREADY_PROCESSED");
  }

  #[test]
  fn payment_failures_are_validation() {
    for e in [
      Error::PaymentRequired,
      Error::InvalidSession("x".into()),
      Error::PaymentNotCompleted("unpaid".into()),
      Error::MetadataMissing("request_id"),
    ] {
      assert_eq!(e.kind(), ErrorKind::Validation, "{e:?}");
    }
  }

  #[test]
  fn request_not_found_names_the_kind() {
    let e = Error::RequestNotFound {
      kind: RequestKind::BirthDeclaration,
      id:   Uuid::nil(),
    };
    assert_eq!(e.kind(), ErrorKind::NotFound);
    assert!(e.to_string().contains("déclaration de naissance"));
  }
}
