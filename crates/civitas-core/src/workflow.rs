//! Request lifecycle operations, generic over the store and the gateway.
//!
//! Each function authorizes the caller, reads what the gate needs, checks it,
//! and issues one conditional or atomic write. Lost races surface as
//! [`Error::AlreadyProcessed`]; nothing is retried.

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::{
  Error, Result,
  account::Principal,
  authz::{self, Requirement},
  document::Document,
  gate::{self, GateInput, GateMode, StatusChange},
  gateway::{CheckoutRequest, CheckoutSession, PaymentGateway},
  notification,
  payment::{self, NewPayment, PaymentTarget},
  request::{
    BirthCertificate, BirthDeclaration, CertificateRequestBody, NewBirthCertificate,
    NewBirthDeclaration, RequestHeader, RequestKind,
  },
  status::{PaymentStatus, RequestStatus},
  store::{ApprovalWrite, CasOutcome, PortalStore, RecordedPayment, TransitionWrite},
  synthesis,
};

/// Fee schedule and redirect targets for hosted checkout.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
  pub currency:              String,
  pub declaration_fee_minor: i64,
  pub certificate_fee_minor: i64,
  pub success_url:           String,
  pub cancel_url:            String,
}

impl CheckoutSettings {
  pub fn fee_for(&self, kind: RequestKind) -> i64 {
    match kind {
      RequestKind::BirthDeclaration => self.declaration_fee_minor,
      RequestKind::BirthCertificate => self.certificate_fee_minor,
    }
  }
}

// ─── Lookups ─────────────────────────────────────────────────────────────────

/// Load a request header, failing with `RequestNotFound`.
pub async fn load_header<S: PortalStore>(
  store: &S,
  kind: RequestKind,
  id: Uuid,
) -> Result<RequestHeader> {
  store
    .get_request_header(kind, id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::RequestNotFound { kind, id })
}

/// Load a request header the caller may see: staff see everything,
/// citizens only their own.
pub async fn authorize_request_access<S: PortalStore>(
  store: &S,
  principal: &Principal,
  kind: RequestKind,
  id: Uuid,
) -> Result<RequestHeader> {
  authz::require(principal, Requirement::roles(authz::ANY))?;
  let header = load_header(store, kind, id).await?;
  authz::require(principal, Requirement::roles(authz::ANY).owned_by(header.citizen_id))?;
  Ok(header)
}

async fn load_document<S: PortalStore>(
  store: &S,
  id: Option<Uuid>,
) -> Result<Option<Document>> {
  match id {
    Some(id) => store.get_document(id).await.map_err(Error::store),
    None => Ok(None),
  }
}

// ─── Submission ──────────────────────────────────────────────────────────────

pub async fn submit_declaration<S: PortalStore>(
  store: &S,
  principal: &Principal,
  input: NewBirthDeclaration,
) -> Result<BirthDeclaration> {
  authz::require(principal, Requirement::roles(authz::CITIZEN))?;
  input.validate(Utc::now().date_naive())?;

  let declaration = store
    .create_declaration(principal.account_id, input)
    .await
    .map_err(Error::store)?;
  tracing::info!(
    request_id = %declaration.header.request_id,
    citizen_id = %principal.account_id,
    "birth declaration submitted"
  );
  Ok(declaration)
}

pub async fn submit_certificate_request<S: PortalStore>(
  store: &S,
  principal: &Principal,
  body: CertificateRequestBody,
) -> Result<BirthCertificate> {
  authz::require(principal, Requirement::roles(authz::CITIZEN))?;
  body.validate(Utc::now().date_naive())?;

  let certificate = store
    .create_certificate(NewBirthCertificate {
      citizen_id:            principal.account_id,
      agent_id:              None,
      status:                RequestStatus::Pending,
      full_name:             body.full_name.trim().to_owned(),
      birth_date:            body.birth_date,
      birth_place:           body.birth_place.trim().to_owned(),
      father_full_name:      body.father_full_name,
      mother_full_name:      body.mother_full_name,
      certificate_number:    None,
      tracking_number:       synthesis::tracking_number(),
      source_declaration_id: None,
    })
    .await
    .map_err(Error::store)?;
  tracing::info!(
    request_id = %certificate.header.request_id,
    tracking_number = %certificate.tracking_number,
    "birth certificate requested"
  );
  Ok(certificate)
}

// ─── Status Transition Gate ──────────────────────────────────────────────────

/// Apply a gated status change to a request.
pub async fn change_status<S: PortalStore>(
  store: &S,
  principal: &Principal,
  mode: GateMode,
  kind: RequestKind,
  id: Uuid,
  change: StatusChange,
) -> Result<RequestHeader> {
  let roles = match mode {
    GateMode::Review => authz::STAFF,
    GateMode::AdminOverride { .. } => authz::ADMIN,
  };
  authz::require(principal, Requirement::roles(roles))?;

  let header = load_header(store, kind, id).await?;
  let payment = if change.target == RequestStatus::Completed {
    store.find_payment(kind, id).await.map_err(Error::store)?
  } else {
    None
  };
  let final_document = load_document(store, change.final_document_id).await?;

  gate::check(
    principal,
    mode,
    GateInput {
      header:         &header,
      payment:        payment.as_ref(),
      final_document: final_document.as_ref(),
    },
    &change,
  )?;

  let comment = change
    .comment
    .as_deref()
    .map(str::trim)
    .filter(|c| !c.is_empty())
    .map(str::to_owned);
  let certificate_number = (kind == RequestKind::BirthCertificate
    && change.target == RequestStatus::Completed)
    .then(synthesis::certificate_number);

  if let GateMode::AdminOverride { force: true } = mode {
    tracing::warn!(
      admin_id = %principal.account_id,
      request_id = %id,
      from = %header.status,
      to = %change.target,
      "forced status override"
    );
  }

  let write = TransitionWrite {
    kind,
    request_id: id,
    expected_status: header.status,
    expected_version: header.version,
    target: change.target,
    notification: notification::status_changed(&header, change.target, comment.as_deref()),
    comment,
    agent_id: principal.account_id,
    certificate_number,
  };

  match store.apply_transition(write).await.map_err(Error::store)? {
    CasOutcome::Applied(updated) => {
      tracing::info!(
        request_id = %id,
        kind = kind.as_str(),
        from = %header.status,
        to = %updated.status,
        agent_id = %principal.account_id,
        "request status changed"
      );
      Ok(updated)
    }
    CasOutcome::Stale(current) => {
      tracing::info!(
        request_id = %id,
        current = %current.status,
        "status change lost a concurrent update"
      );
      Err(Error::AlreadyProcessed)
    }
    CasOutcome::Missing => Err(Error::RequestNotFound { kind, id }),
  }
}

// ─── Certificate synthesis ───────────────────────────────────────────────────

/// Approve a paid declaration and issue its birth certificate.
pub async fn approve_declaration<S: PortalStore>(
  store: &S,
  principal: &Principal,
  declaration_id: Uuid,
  final_document_id: Option<Uuid>,
) -> Result<BirthCertificate> {
  authz::require(principal, Requirement::roles(authz::STAFF))?;

  let declaration = store
    .get_declaration(declaration_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::RequestNotFound {
      kind: RequestKind::BirthDeclaration,
      id:   declaration_id,
    })?;
  let final_document = load_document(store, final_document_id).await?;

  synthesis::check_approval(
    principal,
    &declaration,
    declaration.payment.as_ref(),
    final_document_id,
    final_document.as_ref(),
  )?;

  let certificate_id = Uuid::new_v4();
  let certificate = synthesis::certificate_for(&declaration, principal.account_id);
  let write = ApprovalWrite {
    declaration_id,
    expected_version: declaration.header.version,
    agent_id: principal.account_id,
    certificate_id,
    declaration_notification: notification::status_changed(
      &declaration.header,
      RequestStatus::Completed,
      None,
    ),
    certificate_notification: notification::certificate_ready(certificate_id, &certificate),
    certificate,
  };

  match store.approve_declaration(write).await.map_err(Error::store)? {
    CasOutcome::Applied(issued) => {
      tracing::info!(
        declaration_id = %declaration_id,
        certificate_id = %issued.header.request_id,
        tracking_number = %issued.tracking_number,
        agent_id = %principal.account_id,
        "declaration approved, certificate issued"
      );
      Ok(issued)
    }
    CasOutcome::Stale(_) => Err(Error::AlreadyProcessed),
    CasOutcome::Missing => Err(Error::RequestNotFound {
      kind: RequestKind::BirthDeclaration,
      id:   declaration_id,
    }),
  }
}

// ─── Payment linkage ─────────────────────────────────────────────────────────

/// Open a hosted checkout for one of the caller's pending requests.
pub async fn start_checkout<S, G>(
  store: &S,
  gateway: &G,
  principal: &Principal,
  settings: &CheckoutSettings,
  kind: RequestKind,
  request_id: Uuid,
) -> Result<CheckoutSession>
where
  S: PortalStore,
  G: PaymentGateway,
{
  authz::require(principal, Requirement::roles(authz::CITIZEN))?;
  let header = load_header(store, kind, request_id).await?;
  authz::require(principal, Requirement::roles(authz::CITIZEN).owned_by(header.citizen_id))?;

  if header.status != RequestStatus::Pending {
    return Err(Error::AlreadyProcessed);
  }
  let existing = store
    .find_payment(kind, request_id)
    .await
    .map_err(Error::store)?;
  if existing.is_some_and(|p| p.is_paid()) {
    return Err(Error::AlreadyPaid);
  }

  let metadata = HashMap::from([
    (payment::META_REQUEST_ID.to_owned(), request_id.to_string()),
    (payment::META_REQUEST_TYPE.to_owned(), kind.as_str().to_owned()),
  ]);
  let session = gateway
    .create_checkout_session(CheckoutRequest {
      amount_minor: settings.fee_for(kind),
      currency: settings.currency.clone(),
      description: format!("Frais de {kind}"),
      metadata,
      success_url: settings.success_url.clone(),
      cancel_url: settings.cancel_url.clone(),
      customer_email: Some(principal.email.clone()),
    })
    .await
    .map_err(|e| Error::Gateway(e.to_string()))?;

  tracing::info!(
    request_id = %request_id,
    session_id = %session.id,
    "checkout session created"
  );
  Ok(session)
}

/// Record the payment behind a completed checkout session. Idempotent.
pub async fn verify_payment<S, G>(
  store: &S,
  gateway: &G,
  principal: &Principal,
  settings: &CheckoutSettings,
  session_id: &str,
) -> Result<RecordedPayment>
where
  S: PortalStore,
  G: PaymentGateway,
{
  authz::require(principal, Requirement::roles(authz::ANY))?;

  let session_id = session_id.trim();
  if session_id.is_empty() {
    return Err(Error::InvalidSession("identifiant de session vide".to_owned()));
  }

  let session = gateway
    .retrieve_checkout_session(session_id)
    .await
    .map_err(|e| Error::InvalidSession(e.to_string()))?
    .ok_or_else(|| Error::InvalidSession(format!("session {session_id} inconnue")))?;

  if !session.is_paid() {
    return Err(Error::PaymentNotCompleted(session.payment_status));
  }

  let target = payment::target_from_metadata(&session.metadata)?;
  let header = load_header(store, target.kind(), target.request_id()).await?;
  authz::require(principal, Requirement::roles(authz::ANY).owned_by(header.citizen_id))?;

  let amount_minor = session
    .amount_total
    .ok_or_else(|| Error::InvalidSession("montant absent de la session".to_owned()))?;
  let input = NewPayment {
    target: PaymentTarget::new(header.kind, header.request_id),
    amount_minor,
    currency: session
      .currency
      .clone()
      .unwrap_or_else(|| settings.currency.clone()),
    status: PaymentStatus::Paid,
    checkout_session_id: session.id.clone(),
  };
  let notice = notification::payment_received(header.citizen_id, &input);

  let recorded = store
    .record_payment_once(input, Some(notice))
    .await
    .map_err(Error::store)?;

  if recorded.newly_recorded {
    tracing::info!(
      payment_id = %recorded.payment.payment_id,
      request_id = %header.request_id,
      amount_minor,
      "payment recorded"
    );
  } else {
    tracing::debug!(
      request_id = %header.request_id,
      "payment already recorded, verification is a no-op"
    );
  }
  Ok(recorded)
}
