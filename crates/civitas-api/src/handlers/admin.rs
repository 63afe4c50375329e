//! Handlers for `/api/admin` endpoints: account management, status
//! overrides, payment reporting and the admin dashboard.

use axum::{
  extract::State,
  http::{StatusCode, header},
  response::IntoResponse,
};
use chrono::Utc;
use civitas_core::{
  Error,
  account::{Account, AccountStatus, Role},
  authz::{self, Requirement},
  gate::{GateMode, StatusChange},
  gateway::PaymentGateway,
  payment::{Payment, PaymentFilter},
  request::{RequestFilter, RequestHeader, RequestKind},
  stats::{AccountCounts, PaymentTotals, StatusCounts, TimeRange},
  status::RequestStatus,
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
  handlers::{PaymentQuery, auth::NewAccountBody, auth::create_account, parse_time_range},
};

fn admin(user: &CurrentUser) -> Result<(), ApiError> {
  authz::require(&user.principal(), Requirement::roles(authz::ADMIN))?;
  Ok(())
}

// ─── Agents & admins ─────────────────────────────────────────────────────────

/// `GET /api/admin/agents`
pub async fn list_agents<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
) -> ApiResult<Vec<Account>>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  admin(&user)?;
  let agents = state
    .store
    .list_accounts(Some(Role::Agent))
    .await
    .map_err(Error::store)?;
  Ok(Envelope::ok(agents))
}

/// `POST /api/admin/agents`
pub async fn create_agent<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  JsonBody(body): JsonBody<NewAccountBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  admin(&user)?;
  let agent = create_account(&*state.store, body, Role::Agent).await?;
  Ok((StatusCode::CREATED, Envelope::ok(agent)))
}

/// `POST /api/admin/admins`
pub async fn create_admin<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  JsonBody(body): JsonBody<NewAccountBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  admin(&user)?;
  let created = create_account(&*state.store, body, Role::Admin).await?;
  Ok((StatusCode::CREATED, Envelope::ok(created)))
}

#[derive(Debug, Deserialize)]
pub struct AccountIdQuery {
  pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
  pub deleted: Uuid,
}

/// `DELETE /api/admin/agents?id=`
///
/// Hard delete, agents only.
pub async fn delete_agent<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  QueryParams(AccountIdQuery { id }): QueryParams<AccountIdQuery>,
) -> ApiResult<Deleted>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  admin(&user)?;
  let is_agent = state
    .store
    .get_account(id)
    .await
    .map_err(Error::store)?
    .is_some_and(|a| a.role == Role::Agent);
  if !is_agent {
    return Err(Error::NotFound(format!("agent {id}")).into());
  }
  if !state.store.delete_account(id).await.map_err(Error::store)? {
    return Err(Error::NotFound(format!("agent {id}")).into());
  }
  tracing::info!(agent_id = %id, admin_id = %user.account.account_id, "agent deleted");
  Ok(Envelope::ok(Deleted { deleted: id }))
}

// ─── Citizens ────────────────────────────────────────────────────────────────

/// `GET /api/admin/citizens`
pub async fn list_citizens<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
) -> ApiResult<Vec<Account>>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  admin(&user)?;
  let citizens = state
    .store
    .list_accounts(Some(Role::Citizen))
    .await
    .map_err(Error::store)?;
  Ok(Envelope::ok(citizens))
}

#[derive(Debug, Deserialize)]
pub struct AccountStatusBody {
  pub status: AccountStatus,
}

/// `PATCH /api/admin/citizens/{id}/status`
pub async fn citizen_status<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  PathParam(id): PathParam<Uuid>,
  JsonBody(body): JsonBody<AccountStatusBody>,
) -> ApiResult<Account>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  admin(&user)?;
  let is_citizen = state
    .store
    .get_account(id)
    .await
    .map_err(Error::store)?
    .is_some_and(|a| a.role == Role::Citizen);
  if !is_citizen {
    return Err(Error::NotFound(format!("citoyen {id}")).into());
  }
  let account = state
    .store
    .set_account_status(id, body.status)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::NotFound(format!("citoyen {id}")))?;
  tracing::info!(citizen_id = %id, status = %body.status, "citizen status changed");
  Ok(Envelope::ok(account))
}

// ─── Status override ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OverrideBody {
  pub request_type:      RequestKind,
  pub status:            RequestStatus,
  #[serde(default, alias = "reject_reason", alias = "reason")]
  pub comment:           Option<String>,
  #[serde(default)]
  pub final_document_id: Option<Uuid>,
  /// Bypass the terminal-state guard.
  #[serde(default)]
  pub force:             bool,
}

/// `PATCH /api/admin/documents/{id}/status`
pub async fn override_status<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  PathParam(id): PathParam<Uuid>,
  JsonBody(body): JsonBody<OverrideBody>,
) -> ApiResult<RequestHeader>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let change = StatusChange {
    target:            body.status,
    comment:           body.comment,
    final_document_id: body.final_document_id,
  };
  let header = workflow::change_status(
    &*state.store,
    &user.principal(),
    GateMode::AdminOverride { force: body.force },
    body.request_type,
    id,
    change,
  )
  .await?;
  Ok(Envelope::ok(header))
}

// ─── Payments ────────────────────────────────────────────────────────────────

fn payment_filter(query: &PaymentQuery) -> Result<PaymentFilter, ApiError> {
  Ok(PaymentFilter {
    status:        query.status()?,
    created_after: query.time_range()?.map(|r| r.since(Utc::now())),
  })
}

/// `GET /api/admin/payments[?status=][&timeRange=]`
pub async fn list_payments<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  QueryParams(query): QueryParams<PaymentQuery>,
) -> ApiResult<Vec<Payment>>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  admin(&user)?;
  let payments = state
    .store
    .list_payments(payment_filter(&query)?)
    .await
    .map_err(Error::store)?;
  Ok(Envelope::ok(payments))
}

/// `POST /api/admin/payments/export`
///
/// Responds with a CSV download on success.
pub async fn export_payments<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  JsonBody(query): JsonBody<PaymentQuery>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  admin(&user)?;
  let payments = state
    .store
    .list_payments(payment_filter(&query)?)
    .await
    .map_err(Error::store)?;
  let csv = civitas_export::payments_csv(&payments)?;
  let file_name = civitas_export::export_file_name(Utc::now().date_naive());

  tracing::info!(rows = payments.len(), admin_id = %user.account.account_id, "payments exported");
  Ok((
    [
      (header::CONTENT_TYPE, civitas_export::CSV_MEDIA_TYPE.to_owned()),
      (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{file_name}\"")),
    ],
    csv,
  ))
}

// ─── Dashboard ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
  #[serde(rename = "timeRange", alias = "time_range")]
  pub time_range: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdminDashboard {
  pub time_range:   Option<TimeRange>,
  pub declarations: StatusCounts,
  pub certificates: StatusCounts,
  pub accounts:     AccountCounts,
  pub payments:     PaymentTotals,
}

/// `GET /api/admin/dashboard[?timeRange=today|week|month|year]`
pub async fn dashboard<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  QueryParams(query): QueryParams<DashboardQuery>,
) -> ApiResult<AdminDashboard>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  admin(&user)?;
  let time_range = parse_time_range(query.time_range.as_deref())?;
  let created_after = time_range.map(|r| r.since(Utc::now()));
  let requests = RequestFilter { created_after, ..RequestFilter::default() };
  let store = &*state.store;

  Ok(Envelope::ok(AdminDashboard {
    time_range,
    declarations: store
      .request_counts(RequestKind::BirthDeclaration, requests.clone())
      .await
      .map_err(Error::store)?,
    certificates: store
      .request_counts(RequestKind::BirthCertificate, requests)
      .await
      .map_err(Error::store)?,
    accounts: store.account_counts().await.map_err(Error::store)?,
    payments: store
      .payment_totals(PaymentFilter { status: None, created_after })
      .await
      .map_err(Error::store)?,
  }))
}
