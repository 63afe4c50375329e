//! Document requests: birth declarations and birth certificates.
//!
//! Both entities share a [`RequestHeader`] holding the lifecycle fields the
//! transition gate reasons about. Entity-specific fields live alongside it.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result, document::Document, payment::Payment, status::RequestStatus,
};

// ─── Kind ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
  #[serde(alias = "declaration", alias = "birth-declaration")]
  BirthDeclaration,
  #[serde(alias = "certificate", alias = "birth-certificate")]
  BirthCertificate,
}

impl RequestKind {
  /// The tag stored in `request_kind` columns and gateway metadata.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::BirthDeclaration => "birth_declaration",
      Self::BirthCertificate => "birth_certificate",
    }
  }

  pub fn from_tag(tag: &str) -> Result<Self> {
    match tag.trim() {
      "birth_declaration" | "birth-declaration" | "declaration" => {
        Ok(Self::BirthDeclaration)
      }
      "birth_certificate" | "birth-certificate" | "certificate" => {
        Ok(Self::BirthCertificate)
      }
      other => Err(Error::validation(format!("type de demande inconnu : {other:?}"))),
    }
  }

  /// The kind preceded by the elided French preposition.
  pub fn with_de(self) -> &'static str {
    match self {
      Self::BirthDeclaration => "de déclaration de naissance",
      Self::BirthCertificate => "d'acte de naissance",
    }
  }
}

impl fmt::Display for RequestKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::BirthDeclaration => "déclaration de naissance",
      Self::BirthCertificate => "acte de naissance",
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
  #[serde(alias = "M", alias = "masculin")]
  Male,
  #[serde(alias = "F", alias = "féminin", alias = "feminin")]
  Female,
}

impl Gender {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Male => "male",
      Self::Female => "female",
    }
  }

  pub fn from_tag(tag: &str) -> Result<Self> {
    match tag {
      "male" => Ok(Self::Male),
      "female" => Ok(Self::Female),
      other => Err(Error::validation(format!("sexe inconnu : {other:?}"))),
    }
  }
}

// ─── Header ──────────────────────────────────────────────────────────────────

/// Lifecycle fields common to every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestHeader {
  pub kind:       RequestKind,
  pub request_id: Uuid,
  pub citizen_id: Uuid,
  /// The agent who last changed the status, if any.
  pub agent_id:   Option<Uuid>,
  pub status:     RequestStatus,
  /// Reject reason or agent note.
  pub comment:    Option<String>,
  /// Incremented on every status write; the compare-and-swap token.
  pub version:    i64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

// ─── Birth declaration ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BirthDeclaration {
  #[serde(flatten)]
  pub header:           RequestHeader,
  pub child_first_name: String,
  pub child_last_name:  String,
  pub birth_date:       NaiveDate,
  pub birth_place:      String,
  pub gender:           Gender,
  pub father_name:      Option<String>,
  pub mother_name:      Option<String>,
  #[serde(default)]
  pub documents:        Vec<Document>,
  pub payment:          Option<Payment>,
}

impl BirthDeclaration {
  pub fn child_full_name(&self) -> String {
    format!("{} {}", self.child_first_name.trim(), self.child_last_name.trim())
  }
}

/// Citizen-supplied body for a new declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBirthDeclaration {
  pub child_first_name: String,
  pub child_last_name:  String,
  pub birth_date:       NaiveDate,
  pub birth_place:      String,
  pub gender:           Gender,
  pub father_name:      Option<String>,
  pub mother_name:      Option<String>,
}

impl NewBirthDeclaration {
  pub fn validate(&self, today: NaiveDate) -> Result<()> {
    require("prénom de l'enfant", &self.child_first_name)?;
    require("nom de l'enfant", &self.child_last_name)?;
    require("lieu de naissance", &self.birth_place)?;
    not_in_future(self.birth_date, today)
  }
}

// ─── Birth certificate ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BirthCertificate {
  #[serde(flatten)]
  pub header:                RequestHeader,
  pub full_name:             String,
  pub birth_date:            NaiveDate,
  pub birth_place:           String,
  pub father_full_name:      Option<String>,
  pub mother_full_name:      Option<String>,
  /// Assigned once the certificate is issued.
  pub certificate_number:    Option<String>,
  pub tracking_number:       String,
  /// Set when the certificate was synthesized from an approved declaration.
  pub source_declaration_id: Option<Uuid>,
  #[serde(default)]
  pub documents:             Vec<Document>,
  pub payment:               Option<Payment>,
}

/// Citizen-supplied body for a direct certificate request.
#[derive(Debug, Clone, Deserialize)]
pub struct CertificateRequestBody {
  pub full_name:        String,
  pub birth_date:       NaiveDate,
  pub birth_place:      String,
  pub father_full_name: Option<String>,
  pub mother_full_name: Option<String>,
}

impl CertificateRequestBody {
  pub fn validate(&self, today: NaiveDate) -> Result<()> {
    require("nom complet", &self.full_name)?;
    require("lieu de naissance", &self.birth_place)?;
    not_in_future(self.birth_date, today)
  }
}

/// Input to [`crate::store::PortalStore::create_certificate`]; numbers and
/// initial status are decided by the caller.
#[derive(Debug, Clone)]
pub struct NewBirthCertificate {
  pub citizen_id:            Uuid,
  pub agent_id:              Option<Uuid>,
  pub status:                RequestStatus,
  pub full_name:             String,
  pub birth_date:            NaiveDate,
  pub birth_place:           String,
  pub father_full_name:      Option<String>,
  pub mother_full_name:      Option<String>,
  pub certificate_number:    Option<String>,
  pub tracking_number:       String,
  pub source_declaration_id: Option<Uuid>,
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// Parameters for the request listing methods of the store.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
  pub citizen_id:    Option<Uuid>,
  pub status:        Option<RequestStatus>,
  pub created_after: Option<DateTime<Utc>>,
}

/// One entry of a citizen's combined documents list.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestSummary {
  BirthDeclaration(BirthDeclaration),
  BirthCertificate(BirthCertificate),
}

impl RequestSummary {
  pub fn created_at(&self) -> DateTime<Utc> {
    match self {
      Self::BirthDeclaration(d) => d.header.created_at,
      Self::BirthCertificate(c) => c.header.created_at,
    }
  }
}

// ─── Validation helpers ──────────────────────────────────────────────────────

fn require(field: &str, value: &str) -> Result<()> {
  if value.trim().is_empty() {
    return Err(Error::validation(format!("le champ « {field} » est obligatoire")));
  }
  Ok(())
}

fn not_in_future(date: NaiveDate, today: NaiveDate) -> Result<()> {
  if date > today {
    return Err(Error::validation("la date de naissance ne peut pas être dans le futur"));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn awa() -> NewBirthDeclaration {
    NewBirthDeclaration {
      child_first_name: "Awa".into(),
      child_last_name:  "Koné".into(),
      birth_date:       NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
      birth_place:      "Abidjan".into(),
      gender:           Gender::Female,
      father_name:      Some("Moussa Koné".into()),
      mother_name:      None,
    }
  }

  #[test]
  fn valid_declaration_passes() {
    let today = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
    assert!(awa().validate(today).is_ok());
  }

  #[test]
  fn blank_place_is_rejected() {
    let today = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
    let mut d = awa();
    d.birth_place = "   ".into();
    assert!(matches!(d.validate(today), Err(Error::Validation(_))));
  }

  #[test]
  fn future_birth_date_is_rejected() {
    let today = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
    assert!(awa().validate(today).is_err());
  }

  #[test]
  fn kind_accepts_short_aliases() {
    let k: RequestKind = serde_json::from_str("\"certificate\"").unwrap();
    assert_eq!(k, RequestKind::BirthCertificate);
    assert_eq!(RequestKind::from_tag("birth-declaration").unwrap(), RequestKind::BirthDeclaration);
  }
}
