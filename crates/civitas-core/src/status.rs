//! Status enums and the legacy-label adapter.
//!
//! Requests historically carried two vocabularies for the same state: the
//! uppercase English set (`PENDING`, `COMPLETED`, `REJECTED`) and the French
//! labels (`en_attente`, `approuvé`, `rejeté`). [`RequestStatus`] is the only
//! representation used in memory; [`RequestStatus::from_label`] is the single
//! place where foreign spellings are accepted. Output is always canonical.

use serde::{Deserialize, Deserializer, Serialize};
use strum::{AsRefStr, Display, EnumIter};

use crate::{Error, Result};

// ─── Request status ──────────────────────────────────────────────────────────

/// Lifecycle of a birth declaration or certificate request.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, AsRefStr, Display, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
  Pending,
  Completed,
  Rejected,
}

impl RequestStatus {
  /// Parse any status spelling seen in stored rows or client payloads.
  ///
  /// `APPROVED` and `approuvé` both mean the request was accepted, which is
  /// [`RequestStatus::Completed`] in the canonical set.
  pub fn from_label(label: &str) -> Result<Self> {
    let normalized = label.trim().to_lowercase();
    match normalized.as_str() {
      "pending" | "en_attente" | "en attente" => Ok(Self::Pending),
      "completed" | "approved" | "approuvé" | "approuve" => Ok(Self::Completed),
      "rejected" | "rejeté" | "rejete" => Ok(Self::Rejected),
      _ => Err(Error::validation(format!("statut inconnu : {label:?}"))),
    }
  }

  /// COMPLETED and REJECTED admit no further agent transition.
  pub fn is_terminal(self) -> bool { !matches!(self, Self::Pending) }

  /// French label used in notification messages.
  pub fn label_fr(self) -> &'static str {
    match self {
      Self::Pending => "en attente",
      Self::Completed => "approuvée",
      Self::Rejected => "rejetée",
    }
  }
}

impl<'de> Deserialize<'de> for RequestStatus {
  fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(d)?;
    Self::from_label(&raw).map_err(serde::de::Error::custom)
  }
}

// ─── Payment status ──────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
  Pending,
  Paid,
  Failed,
}

impl PaymentStatus {
  pub fn from_label(label: &str) -> Result<Self> {
    match label.trim().to_lowercase().as_str() {
      "pending" | "en_attente" => Ok(Self::Pending),
      "paid" | "payé" | "paye" => Ok(Self::Paid),
      "failed" | "échoué" | "echoue" => Ok(Self::Failed),
      _ => Err(Error::validation(format!("statut de paiement inconnu : {label:?}"))),
    }
  }
}

// ─── Notification status ─────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
  Unread,
  Read,
}

impl NotificationStatus {
  pub fn from_label(label: &str) -> Result<Self> {
    match label {
      "UNREAD" => Ok(Self::Unread),
      "READ" => Ok(Self::Read),
      other => Err(Error::validation(format!("statut de notification inconnu : {other:?}"))),
    }
  }
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator as _;

  use super::*;

  #[test]
  fn french_labels_map_to_canonical() {
    assert_eq!(RequestStatus::from_label("en_attente").unwrap(), RequestStatus::Pending);
    assert_eq!(RequestStatus::from_label("approuvé").unwrap(), RequestStatus::Completed);
    assert_eq!(RequestStatus::from_label("rejeté").unwrap(), RequestStatus::Rejected);
  }

  #[test]
  fn approved_is_completed() {
    assert_eq!(RequestStatus::from_label("APPROVED").unwrap(), RequestStatus::Completed);
  }

  #[test]
  fn unknown_label_is_rejected() {
    assert!(RequestStatus::from_label("archived").is_err());
  }

  #[test]
  fn canonical_round_trip_through_as_ref() {
    for status in RequestStatus::iter() {
      assert_eq!(RequestStatus::from_label(status.as_ref()).unwrap(), status);
    }
  }

  #[test]
  fn serde_accepts_legacy_and_emits_canonical() {
    let s: RequestStatus = serde_json::from_str("\"rejeté\"").unwrap();
    assert_eq!(s, RequestStatus::Rejected);
    assert_eq!(serde_json::to_string(&s).unwrap(), "\"REJECTED\"");
  }

  #[test]
  fn terminal_states() {
    assert!(!RequestStatus::Pending.is_terminal());
    assert!(RequestStatus::Completed.is_terminal());
    assert!(RequestStatus::Rejected.is_terminal());
  }
}
