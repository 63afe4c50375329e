//! Payments and the checkout-session metadata that links them to requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, request::RequestKind, status::PaymentStatus};

/// Metadata keys written into a checkout session at creation time.
pub const META_REQUEST_ID: &str = "request_id";
pub const META_REQUEST_TYPE: &str = "request_type";

/// The single request a payment belongs to. Being an enum, a payment can
/// never reference both a declaration and a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentTarget {
  #[serde(rename = "birth_declaration_id")]
  BirthDeclaration(Uuid),
  #[serde(rename = "birth_certificate_id")]
  BirthCertificate(Uuid),
}

impl PaymentTarget {
  pub fn new(kind: RequestKind, request_id: Uuid) -> Self {
    match kind {
      RequestKind::BirthDeclaration => Self::BirthDeclaration(request_id),
      RequestKind::BirthCertificate => Self::BirthCertificate(request_id),
    }
  }

  pub fn kind(self) -> RequestKind {
    match self {
      Self::BirthDeclaration(_) => RequestKind::BirthDeclaration,
      Self::BirthCertificate(_) => RequestKind::BirthCertificate,
    }
  }

  pub fn request_id(self) -> Uuid {
    match self {
      Self::BirthDeclaration(id) | Self::BirthCertificate(id) => id,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
  pub payment_id:          Uuid,
  #[serde(flatten)]
  pub target:              PaymentTarget,
  /// Stored in minor units; serialized as a major-unit decimal.
  #[serde(rename = "amount", with = "major_units")]
  pub amount_minor:        i64,
  pub currency:            String,
  pub status:              PaymentStatus,
  pub checkout_session_id: String,
  pub created_at:          DateTime<Utc>,
  pub updated_at:          DateTime<Utc>,
}

impl Payment {
  pub fn is_paid(&self) -> bool { self.status == PaymentStatus::Paid }

  pub fn amount(&self) -> f64 { to_major(self.amount_minor) }
}

/// Input to [`crate::store::PortalStore::record_payment_once`].
#[derive(Debug, Clone)]
pub struct NewPayment {
  pub target:              PaymentTarget,
  pub amount_minor:        i64,
  pub currency:            String,
  pub status:              PaymentStatus,
  pub checkout_session_id: String,
}

/// Parameters for [`crate::store::PortalStore::list_payments`].
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
  pub status:        Option<PaymentStatus>,
  pub created_after: Option<DateTime<Utc>>,
}

/// Minor units (cents, centimes) to a major-unit amount.
pub fn to_major(minor: i64) -> f64 { minor as f64 / 100.0 }

/// Extract the request reference a checkout session was created for.
pub fn target_from_metadata(
  metadata: &std::collections::HashMap<String, String>,
) -> Result<PaymentTarget> {
  let raw_id = metadata
    .get(META_REQUEST_ID)
    .filter(|v| !v.is_empty())
    .ok_or(Error::MetadataMissing(META_REQUEST_ID))?;
  let raw_type = metadata
    .get(META_REQUEST_TYPE)
    .filter(|v| !v.is_empty())
    .ok_or(Error::MetadataMissing(META_REQUEST_TYPE))?;

  let request_id =
    Uuid::parse_str(raw_id).map_err(|_| Error::MetadataMissing(META_REQUEST_ID))?;
  let kind =
    RequestKind::from_tag(raw_type).map_err(|_| Error::MetadataMissing(META_REQUEST_TYPE))?;

  Ok(PaymentTarget::new(kind, request_id))
}

mod major_units {
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(minor: &i64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(super::to_major(*minor))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let major = f64::deserialize(d)?;
    Ok((major * 100.0).round() as i64)
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;

  fn metadata(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect()
  }

  #[test]
  fn payment_serializes_single_target_and_major_amount() {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let p = Payment {
      payment_id:          Uuid::new_v4(),
      target:              PaymentTarget::BirthDeclaration(id),
      amount_minor:        500_000,
      currency:            "xof".into(),
      status:              PaymentStatus::Paid,
      checkout_session_id: "cs_test_1".into(),
      created_at:          now,
      updated_at:          now,
    };
    let json = serde_json::to_value(&p).unwrap();
    assert_eq!(json["birth_declaration_id"], id.to_string());
    assert!(json.get("birth_certificate_id").is_none());
    assert_eq!(json["amount"], 5000.0);
    assert_eq!(json["status"], "PAID");
  }

  #[test]
  fn metadata_round_trip() {
    let id = Uuid::new_v4();
    let id_str = id.to_string();
    let meta = metadata(&[
      (META_REQUEST_ID, id_str.as_str()),
      (META_REQUEST_TYPE, "birth_certificate"),
    ]);
    assert_eq!(target_from_metadata(&meta).unwrap(), PaymentTarget::BirthCertificate(id));
  }

  #[test]
  fn missing_metadata_is_reported() {
    let meta = metadata(&[(META_REQUEST_TYPE, "birth_declaration")]);
    assert!(matches!(
      target_from_metadata(&meta),
      Err(Error::MetadataMissing(META_REQUEST_ID))
    ));
  }

  #[test]
  fn garbage_request_id_counts_as_missing() {
    let meta = metadata(&[
      (META_REQUEST_ID, "not-a-uuid"),
      (META_REQUEST_TYPE, "birth_declaration"),
    ]);
    assert!(matches!(target_from_metadata(&meta), Err(Error::MetadataMissing(_))));
  }
}
