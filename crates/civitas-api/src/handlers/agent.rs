//! Handlers for `/api/agent` endpoints (agents and administrators).
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `GET`   | `/birth-declarations` | Optional `?status=` |
//! | `GET`   | `/birth-declarations/{id}` | |
//! | `PATCH` | `/birth-declarations/{id}/status` | Body: [`StatusChange`]; rejection only |
//! | `POST`  | `/birth-declarations/{id}/approve` | Issues the certificate; body optional |
//! | `GET`   | `/birth-certificates` | Optional `?status=` |
//! | `GET`   | `/birth-certificates/{id}` | |
//! | `PATCH` | `/birth-certificates?id=` | Body: [`StatusChange`] |
//! | `GET`   | `/dashboard` | Counts over all requests |

use axum::extract::State;
use civitas_core::{
  Error,
  authz::{self, Requirement},
  gate::{GateMode, StatusChange},
  gateway::PaymentGateway,
  request::{BirthCertificate, BirthDeclaration, RequestFilter, RequestHeader, RequestKind},
  stats::StatusCounts,
  store::PortalStore,
  workflow,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  AppState,
  auth::CurrentUser,
  error::{ApiError, ApiResult, Envelope},
  extract::{JsonBody, PathParam, QueryParams},
  handlers::StatusQuery,
};

fn staff(user: &CurrentUser) -> Result<(), ApiError> {
  authz::require(&user.principal(), Requirement::roles(authz::STAFF))?;
  Ok(())
}

fn all_filter(query: &StatusQuery) -> Result<RequestFilter, ApiError> {
  Ok(RequestFilter { status: query.status()?, ..RequestFilter::default() })
}

// ─── Birth declarations ──────────────────────────────────────────────────────

/// `GET /api/agent/birth-declarations[?status=]`
pub async fn list_declarations<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  QueryParams(query): QueryParams<StatusQuery>,
) -> ApiResult<Vec<BirthDeclaration>>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  staff(&user)?;
  let declarations = state
    .store
    .list_declarations(all_filter(&query)?)
    .await
    .map_err(Error::store)?;
  Ok(Envelope::ok(declarations))
}

/// `GET /api/agent/birth-declarations/{id}`
pub async fn get_declaration<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  PathParam(id): PathParam<Uuid>,
) -> ApiResult<BirthDeclaration>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  staff(&user)?;
  let declaration = state
    .store
    .get_declaration(id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::RequestNotFound { kind: RequestKind::BirthDeclaration, id })?;
  Ok(Envelope::ok(declaration))
}

/// `PATCH /api/agent/birth-declarations/{id}/status`
pub async fn declaration_status<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  PathParam(id): PathParam<Uuid>,
  JsonBody(change): JsonBody<StatusChange>,
) -> ApiResult<RequestHeader>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let header = workflow::change_status(
    &*state.store,
    &user.principal(),
    GateMode::Review,
    RequestKind::BirthDeclaration,
    id,
    change,
  )
  .await?;
  Ok(Envelope::ok(header))
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveBody {
  #[serde(default)]
  pub final_document_id: Option<Uuid>,
}

/// `POST /api/agent/birth-declarations/{id}/approve`
pub async fn approve<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  PathParam(id): PathParam<Uuid>,
  body: Option<JsonBody<ApproveBody>>,
) -> ApiResult<BirthCertificate>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let body = body.map(|JsonBody(b)| b).unwrap_or_default();
  let certificate =
    workflow::approve_declaration(&*state.store, &user.principal(), id, body.final_document_id)
      .await?;
  Ok(Envelope::ok(certificate))
}

// ─── Birth certificates ──────────────────────────────────────────────────────

/// `GET /api/agent/birth-certificates[?status=]`
pub async fn list_certificates<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  QueryParams(query): QueryParams<StatusQuery>,
) -> ApiResult<Vec<BirthCertificate>>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  staff(&user)?;
  let certificates = state
    .store
    .list_certificates(all_filter(&query)?)
    .await
    .map_err(Error::store)?;
  Ok(Envelope::ok(certificates))
}

/// `GET /api/agent/birth-certificates/{id}`
pub async fn get_certificate<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  PathParam(id): PathParam<Uuid>,
) -> ApiResult<BirthCertificate>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  staff(&user)?;
  let certificate = state
    .store
    .get_certificate(id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::RequestNotFound { kind: RequestKind::BirthCertificate, id })?;
  Ok(Envelope::ok(certificate))
}

#[derive(Debug, Deserialize)]
pub struct IdQuery {
  pub id: Uuid,
}

/// `PATCH /api/agent/birth-certificates?id=`
pub async fn certificate_status<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  QueryParams(IdQuery { id }): QueryParams<IdQuery>,
  JsonBody(change): JsonBody<StatusChange>,
) -> ApiResult<RequestHeader>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let header = workflow::change_status(
    &*state.store,
    &user.principal(),
    GateMode::Review,
    RequestKind::BirthCertificate,
    id,
    change,
  )
  .await?;
  Ok(Envelope::ok(header))
}

// ─── Dashboard ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct AgentDashboard {
  pub declarations: StatusCounts,
  pub certificates: StatusCounts,
}

/// `GET /api/agent/dashboard`
pub async fn dashboard<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
) -> ApiResult<AgentDashboard>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  staff(&user)?;
  let store = &*state.store;
  Ok(Envelope::ok(AgentDashboard {
    declarations: store
      .request_counts(RequestKind::BirthDeclaration, RequestFilter::default())
      .await
      .map_err(Error::store)?,
    certificates: store
      .request_counts(RequestKind::BirthCertificate, RequestFilter::default())
      .await
      .map_err(Error::store)?,
  }))
}
