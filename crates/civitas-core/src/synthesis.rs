//! Approval-driven certificate synthesis.
//!
//! When an agent approves a paid declaration, a new birth certificate is
//! materialized from it. This module decides whether that is allowed and
//! builds the certificate; the store commits the certificate, the document
//! copies, the declaration update and both notifications in one transaction.

use chrono::{Datelike as _, Utc};
use rand_core::{OsRng, RngCore as _};
use uuid::Uuid;

use crate::{
  Error, Result,
  account::Principal,
  authz::{self, Requirement},
  document::Document,
  gate,
  payment::Payment,
  request::{BirthDeclaration, NewBirthCertificate, RequestKind},
  status::RequestStatus,
};

/// Unambiguous uppercase alphabet (no `0`/`O`, `1`/`I`). 32 symbols, so a
/// byte modulo its length is unbiased.
const ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

fn random_code(len: usize) -> String {
  let mut bytes = vec![0u8; len];
  OsRng.fill_bytes(&mut bytes);
  bytes
    .into_iter()
    .map(|b| ALPHABET[(b as usize) % ALPHABET.len()] as char)
    .collect()
}

/// `AN-<year>-XXXXXXXX`
pub fn certificate_number() -> String {
  format!("AN-{}-{}", Utc::now().year(), random_code(8))
}

/// `TRK-XXXXXXXXXX`
pub fn tracking_number() -> String { format!("TRK-{}", random_code(10)) }

/// Preconditions for approving `declaration`.
pub fn check_approval(
  principal: &Principal,
  declaration: &BirthDeclaration,
  payment: Option<&Payment>,
  final_document_id: Option<Uuid>,
  final_document: Option<&Document>,
) -> Result<()> {
  authz::require(principal, Requirement::roles(authz::STAFF))?;

  let header = &declaration.header;
  debug_assert_eq!(header.kind, RequestKind::BirthDeclaration);
  if header.status != RequestStatus::Pending {
    return Err(Error::AlreadyProcessed);
  }
  gate::require_paid(payment)?;
  gate::check_final_document(header, final_document_id, final_document)
}

/// Build the certificate issued for an approved declaration. The result is
/// already COMPLETED and carries fresh certificate and tracking numbers.
pub fn certificate_for(
  declaration: &BirthDeclaration,
  agent_id: Uuid,
) -> NewBirthCertificate {
  NewBirthCertificate {
    citizen_id:            declaration.header.citizen_id,
    agent_id:              Some(agent_id),
    status:                RequestStatus::Completed,
    full_name:             declaration.child_full_name(),
    birth_date:            declaration.birth_date,
    birth_place:           declaration.birth_place.trim().to_owned(),
    father_full_name:      declaration.father_name.clone(),
    mother_full_name:      declaration.mother_name.clone(),
    certificate_number:    Some(certificate_number()),
    tracking_number:       tracking_number(),
    source_declaration_id: Some(declaration.header.request_id),
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;
  use crate::{
    account::{AccountStatus, Role},
    payment::PaymentTarget,
    request::{Gender, RequestHeader},
    status::PaymentStatus,
  };

  fn declaration(status: RequestStatus) -> BirthDeclaration {
    let now = Utc::now();
    BirthDeclaration {
      header:           RequestHeader {
        kind: RequestKind::BirthDeclaration,
        request_id: Uuid::new_v4(),
        citizen_id: Uuid::new_v4(),
        agent_id: None,
        status,
        comment: None,
        version: 0,
        created_at: now,
        updated_at: now,
      },
      child_first_name: "Awa".into(),
      child_last_name:  "Koné".into(),
      birth_date:       NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
      birth_place:      "Abidjan".into(),
      gender:           Gender::Female,
      father_name:      Some("Moussa Koné".into()),
      mother_name:      Some("Fatou Traoré".into()),
      documents:        vec![],
      payment:          None,
    }
  }

  fn agent() -> Principal {
    Principal {
      account_id: Uuid::new_v4(),
      email:      "agent@mairie.ci".into(),
      role:       Role::Agent,
      status:     AccountStatus::Active,
    }
  }

  fn paid_for(d: &BirthDeclaration) -> Payment {
    let now = Utc::now();
    Payment {
      payment_id:          Uuid::new_v4(),
      target:              PaymentTarget::BirthDeclaration(d.header.request_id),
      amount_minor:        500_000,
      currency:            "xof".into(),
      status:              PaymentStatus::Paid,
      checkout_session_id: "cs_test".into(),
      created_at:          now,
      updated_at:          now,
    }
  }

  #[test]
  fn codes_use_the_alphabet() {
    let trk = tracking_number();
    assert!(trk.starts_with("TRK-"));
    assert_eq!(trk.len(), 14);
    assert!(trk[4..].bytes().all(|b| ALPHABET.contains(&b)));
    assert_ne!(tracking_number(), tracking_number());
  }

  #[test]
  fn certificate_copies_declaration_facts() {
    let d = declaration(RequestStatus::Pending);
    let agent_id = Uuid::new_v4();
    let cert = certificate_for(&d, agent_id);
    assert_eq!(cert.citizen_id, d.header.citizen_id);
    assert_eq!(cert.full_name, "Awa Koné");
    assert_eq!(cert.birth_date, d.birth_date);
    assert_eq!(cert.birth_place, "Abidjan");
    assert_eq!(cert.status, RequestStatus::Completed);
    assert_eq!(cert.source_declaration_id, Some(d.header.request_id));
    assert_eq!(cert.agent_id, Some(agent_id));
    assert!(cert.certificate_number.unwrap().starts_with("AN-"));
  }

  #[test]
  fn approval_without_payment_fails() {
    let d = declaration(RequestStatus::Pending);
    let err = check_approval(&agent(), &d, None, None, None).unwrap_err();
    assert!(matches!(err, Error::PaymentRequired));
  }

  #[test]
  fn approval_of_processed_declaration_fails() {
    let d = declaration(RequestStatus::Rejected);
    let p = paid_for(&d);
    let err = check_approval(&agent(), &d, Some(&p), None, None).unwrap_err();
    assert!(matches!(err, Error::AlreadyProcessed));
  }

  #[test]
  fn paid_pending_declaration_is_approvable() {
    let d = declaration(RequestStatus::Pending);
    let p = paid_for(&d);
    check_approval(&agent(), &d, Some(&p), None, None).unwrap();
  }
}
