//! Status Transition Gate.
//!
//! Decides whether a requested status change is permitted, given the current
//! request header and the facts the caller resolved for it (payment, final
//! document). Pure: the write itself is a compare-and-swap performed by the
//! store on the header's `(status, version)` pair.

use serde::Deserialize;
use uuid::Uuid;

use crate::{
  Error, Result,
  account::Principal,
  authz::{self, Requirement},
  document::{Document, FINAL_CERTIFICATE},
  payment::Payment,
  request::{RequestHeader, RequestKind},
  status::RequestStatus,
};

/// Which route the change came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
  /// Agent (or admin) review: terminal requests are frozen.
  Review,
  /// Administrator override. Still guarded unless `force` is set.
  AdminOverride { force: bool },
}

impl GateMode {
  fn forced(self) -> bool { matches!(self, Self::AdminOverride { force: true }) }
}

/// A requested status change.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusChange {
  #[serde(alias = "status")]
  pub target:            RequestStatus,
  /// Reject reason or agent note.
  #[serde(default, alias = "reject_reason", alias = "reason")]
  pub comment:           Option<String>,
  /// A document already attached to the request, required for completion.
  #[serde(default)]
  pub final_document_id: Option<Uuid>,
}

/// Facts the gate needs, resolved by the caller from the store.
#[derive(Debug, Clone, Copy)]
pub struct GateInput<'a> {
  pub header:         &'a RequestHeader,
  pub payment:        Option<&'a Payment>,
  pub final_document: Option<&'a Document>,
}

/// Check `change` against the gate rules. `Ok(())` means the caller may
/// attempt the conditional write.
pub fn check(
  principal: &Principal,
  mode: GateMode,
  input: GateInput<'_>,
  change: &StatusChange,
) -> Result<()> {
  let roles = match mode {
    GateMode::Review => authz::STAFF,
    GateMode::AdminOverride { .. } => authz::ADMIN,
  };
  authz::require(principal, Requirement::roles(roles))?;

  let header = input.header;
  let forced = mode.forced();

  if header.status.is_terminal() && !forced {
    return Err(Error::AlreadyProcessed);
  }
  if !forced && !change.target.is_terminal() {
    return Err(Error::validation(
      "une demande ne peut pas être remise en attente",
    ));
  }
  if change.target == header.status {
    return Err(Error::validation(format!(
      "la demande est déjà au statut {}",
      header.status
    )));
  }
  if header.kind == RequestKind::BirthDeclaration
    && change.target == RequestStatus::Completed
  {
    return Err(Error::validation(
      "une déclaration s'approuve via la délivrance de l'acte de naissance",
    ));
  }

  match change.target {
    RequestStatus::Rejected => {
      let has_reason = change
        .comment
        .as_deref()
        .is_some_and(|c| !c.trim().is_empty());
      if !has_reason {
        return Err(Error::ReasonRequired);
      }
    }
    RequestStatus::Completed => {
      check_final_document(header, change.final_document_id, input.final_document)?;
      if change.final_document_id.is_none() {
        return Err(Error::FinalDocumentRequired);
      }
      require_paid(input.payment)?;
    }
    RequestStatus::Pending => {}
  }

  Ok(())
}

/// A supplied final-document id must resolve to a final certificate attached
/// to this request by staff, not one of the citizen's own uploads.
pub fn check_final_document(
  header: &RequestHeader,
  requested: Option<Uuid>,
  resolved: Option<&Document>,
) -> Result<()> {
  let Some(id) = requested else { return Ok(()) };
  let doc = match resolved {
    Some(doc)
      if doc.document_id == id
        && doc.request_id == header.request_id
        && doc.request_kind == header.kind =>
    {
      doc
    }
    _ => {
      return Err(Error::validation(
        "le document final indiqué n'est pas rattaché à cette demande",
      ));
    }
  };
  if doc.doc_type != FINAL_CERTIFICATE || doc.uploaded_by == header.citizen_id {
    return Err(Error::validation(format!(
      "le document « {} » n'est pas un acte final déposé par un agent",
      doc.file_name
    )));
  }
  Ok(())
}

pub fn require_paid(payment: Option<&Payment>) -> Result<()> {
  if payment.is_some_and(Payment::is_paid) {
    Ok(())
  } else {
    Err(Error::PaymentRequired)
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::{
    account::{AccountStatus, Role},
    payment::PaymentTarget,
    status::PaymentStatus,
  };

  fn principal(role: Role) -> Principal {
    Principal {
      account_id: Uuid::new_v4(),
      email:      "agent@mairie.ci".into(),
      role,
      status:     AccountStatus::Active,
    }
  }

  fn header(kind: RequestKind, status: RequestStatus) -> RequestHeader {
    let now = Utc::now();
    RequestHeader {
      kind,
      request_id: Uuid::new_v4(),
      citizen_id: Uuid::new_v4(),
      agent_id: None,
      status,
      comment: None,
      version: 0,
      created_at: now,
      updated_at: now,
    }
  }

  fn paid(h: &RequestHeader) -> Payment {
    let now = Utc::now();
    Payment {
      payment_id:          Uuid::new_v4(),
      target:              PaymentTarget::new(h.kind, h.request_id),
      amount_minor:        500_000,
      currency:            "xof".into(),
      status:              PaymentStatus::Paid,
      checkout_session_id: "cs_1".into(),
      created_at:          now,
      updated_at:          now,
    }
  }

  fn final_doc(h: &RequestHeader) -> Document {
    Document {
      document_id:  Uuid::new_v4(),
      request_kind: h.kind,
      request_id:   h.request_id,
      doc_type:     crate::document::FINAL_CERTIFICATE.into(),
      file_name:    "acte.pdf".into(),
      media_type:   "application/pdf".into(),
      size_bytes:   10,
      storage_key:  "ab".repeat(32),
      url:          "/api/documents/x/content".into(),
      uploaded_by:  Uuid::new_v4(),
      created_at:   Utc::now(),
    }
  }

  fn change(target: RequestStatus) -> StatusChange {
    StatusChange { target, comment: None, final_document_id: None }
  }

  fn input(h: &RequestHeader) -> GateInput<'_> {
    GateInput { header: h, payment: None, final_document: None }
  }

  #[test]
  fn citizens_can_never_change_status() {
    let h = header(RequestKind::BirthCertificate, RequestStatus::Pending);
    let mut c = change(RequestStatus::Rejected);
    c.comment = Some("incomplet".into());
    let err = check(&principal(Role::Citizen), GateMode::Review, input(&h), &c).unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
  }

  #[test]
  fn terminal_requests_are_frozen_for_review() {
    for status in [RequestStatus::Completed, RequestStatus::Rejected] {
      let h = header(RequestKind::BirthCertificate, status);
      let mut c = change(RequestStatus::Rejected);
      c.comment = Some("again".into());
      let err = check(&principal(Role::Agent), GateMode::Review, input(&h), &c).unwrap_err();
      assert!(matches!(err, Error::AlreadyProcessed), "{status}: {err:?}");
    }
  }

  #[test]
  fn unforced_admin_override_respects_terminal_guard() {
    let h = header(RequestKind::BirthCertificate, RequestStatus::Rejected);
    let mode = GateMode::AdminOverride { force: false };
    let err = check(&principal(Role::Admin), mode, input(&h), &change(RequestStatus::Pending))
      .unwrap_err();
    assert!(matches!(err, Error::AlreadyProcessed));
  }

  #[test]
  fn forced_override_may_reopen() {
    let h = header(RequestKind::BirthCertificate, RequestStatus::Rejected);
    let mode = GateMode::AdminOverride { force: true };
    check(&principal(Role::Admin), mode, input(&h), &change(RequestStatus::Pending)).unwrap();
  }

  #[test]
  fn override_requires_admin() {
    let h = header(RequestKind::BirthCertificate, RequestStatus::Pending);
    let mode = GateMode::AdminOverride { force: true };
    let err = check(&principal(Role::Agent), mode, input(&h), &change(RequestStatus::Pending))
      .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
  }

  #[test]
  fn rejection_requires_reason() {
    let h = header(RequestKind::BirthCertificate, RequestStatus::Pending);
    let mut c = change(RequestStatus::Rejected);
    c.comment = Some("   ".into());
    let err = check(&principal(Role::Agent), GateMode::Review, input(&h), &c).unwrap_err();
    assert!(matches!(err, Error::ReasonRequired));
  }

  #[test]
  fn completion_requires_final_document_then_payment() {
    let h = header(RequestKind::BirthCertificate, RequestStatus::Pending);
    let agent = principal(Role::Agent);

    let err = check(&agent, GateMode::Review, input(&h), &change(RequestStatus::Completed))
      .unwrap_err();
    assert!(matches!(err, Error::FinalDocumentRequired));

    let doc = final_doc(&h);
    let mut c = change(RequestStatus::Completed);
    c.final_document_id = Some(doc.document_id);
    let with_doc = GateInput { header: &h, payment: None, final_document: Some(&doc) };
    let err = check(&agent, GateMode::Review, with_doc, &c).unwrap_err();
    assert!(matches!(err, Error::PaymentRequired));

    let payment = paid(&h);
    let ready = GateInput { header: &h, payment: Some(&payment), final_document: Some(&doc) };
    check(&agent, GateMode::Review, ready, &c).unwrap();
  }

  #[test]
  fn final_document_from_another_request_is_rejected() {
    let h = header(RequestKind::BirthCertificate, RequestStatus::Pending);
    let other = header(RequestKind::BirthCertificate, RequestStatus::Pending);
    let doc = final_doc(&other);
    let payment = paid(&h);
    let mut c = change(RequestStatus::Completed);
    c.final_document_id = Some(doc.document_id);
    let inp = GateInput { header: &h, payment: Some(&payment), final_document: Some(&doc) };
    let err = check(&principal(Role::Agent), GateMode::Review, inp, &c).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
  }

  #[test]
  fn supporting_document_is_not_a_final_document() {
    let h = header(RequestKind::BirthCertificate, RequestStatus::Pending);
    let payment = paid(&h);
    for doc_type in ["identity_proof", "supporting_document", crate::document::EXISTING_CERTIFICATE] {
      let mut doc = final_doc(&h);
      doc.doc_type = doc_type.into();
      let mut c = change(RequestStatus::Completed);
      c.final_document_id = Some(doc.document_id);
      let inp = GateInput { header: &h, payment: Some(&payment), final_document: Some(&doc) };
      let err = check(&principal(Role::Agent), GateMode::Review, inp, &c).unwrap_err();
      assert!(matches!(err, Error::Validation(_)), "{doc_type}: {err:?}");
    }
  }

  #[test]
  fn final_document_uploaded_by_owner_is_rejected() {
    let h = header(RequestKind::BirthCertificate, RequestStatus::Pending);
    let payment = paid(&h);
    let mut doc = final_doc(&h);
    doc.uploaded_by = h.citizen_id;
    let mut c = change(RequestStatus::Completed);
    c.final_document_id = Some(doc.document_id);
    let inp = GateInput { header: &h, payment: Some(&payment), final_document: Some(&doc) };
    let err = check(&principal(Role::Agent), GateMode::Review, inp, &c).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
  }

  #[test]
  fn declarations_cannot_be_completed_directly() {
    let h = header(RequestKind::BirthDeclaration, RequestStatus::Pending);
    let err = check(&principal(Role::Agent), GateMode::Review, input(&h), &change(RequestStatus::Completed))
      .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
  }

  #[test]
  fn review_cannot_reopen() {
    let h = header(RequestKind::BirthCertificate, RequestStatus::Pending);
    let err = check(&principal(Role::Agent), GateMode::Review, input(&h), &change(RequestStatus::Pending))
      .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
  }

  #[test]
  fn pending_payment_does_not_count() {
    let h = header(RequestKind::BirthCertificate, RequestStatus::Pending);
    let mut p = paid(&h);
    p.status = PaymentStatus::Pending;
    assert!(matches!(require_paid(Some(&p)), Err(Error::PaymentRequired)));
  }
}
