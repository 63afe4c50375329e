//! Handlers for `/api/citizen` endpoints. Every route acts on the caller's
//! own requests, notifications and profile.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use civitas_core::{
  Error,
  account::{Account, ProfileUpdate},
  authz::{self, Requirement},
  gateway::PaymentGateway,
  notification::Notification,
  request::{
    BirthCertificate, BirthDeclaration, CertificateRequestBody, NewBirthDeclaration,
    RequestFilter, RequestKind, RequestSummary,
  },
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
  handlers::{StatusQuery, required},
};

fn citizen(user: &CurrentUser) -> Result<Uuid, ApiError> {
  authz::require(&user.principal(), Requirement::roles(authz::CITIZEN))?;
  Ok(user.account.account_id)
}

fn own_filter(citizen_id: Uuid, query: &StatusQuery) -> Result<RequestFilter, ApiError> {
  Ok(RequestFilter {
    citizen_id:    Some(citizen_id),
    status:        query.status()?,
    created_after: None,
  })
}

// ─── Birth declarations ──────────────────────────────────────────────────────

/// `POST /api/citizen/birth-declarations`
pub async fn create_declaration<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  JsonBody(body): JsonBody<NewBirthDeclaration>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let declaration =
    workflow::submit_declaration(&*state.store, &user.principal(), body).await?;
  Ok((StatusCode::CREATED, Envelope::ok(declaration)))
}

/// `GET /api/citizen/birth-declarations[?status=]`
pub async fn list_declarations<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  QueryParams(query): QueryParams<StatusQuery>,
) -> ApiResult<Vec<BirthDeclaration>>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let citizen_id = citizen(&user)?;
  let declarations = state
    .store
    .list_declarations(own_filter(citizen_id, &query)?)
    .await
    .map_err(Error::store)?;
  Ok(Envelope::ok(declarations))
}

/// `GET /api/citizen/birth-declarations/{id}`
pub async fn get_declaration<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  PathParam(id): PathParam<Uuid>,
) -> ApiResult<BirthDeclaration>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  citizen(&user)?;
  workflow::authorize_request_access(
    &*state.store,
    &user.principal(),
    RequestKind::BirthDeclaration,
    id,
  )
  .await?;
  let declaration = state
    .store
    .get_declaration(id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::RequestNotFound { kind: RequestKind::BirthDeclaration, id })?;
  Ok(Envelope::ok(declaration))
}

// ─── Birth certificates ──────────────────────────────────────────────────────

/// `POST /api/citizen/birth-certificates`
pub async fn create_certificate<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  JsonBody(body): JsonBody<CertificateRequestBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let certificate =
    workflow::submit_certificate_request(&*state.store, &user.principal(), body).await?;
  Ok((StatusCode::CREATED, Envelope::ok(certificate)))
}

/// `GET /api/citizen/birth-certificates[?status=]`
pub async fn list_certificates<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  QueryParams(query): QueryParams<StatusQuery>,
) -> ApiResult<Vec<BirthCertificate>>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let citizen_id = citizen(&user)?;
  let certificates = state
    .store
    .list_certificates(own_filter(citizen_id, &query)?)
    .await
    .map_err(Error::store)?;
  Ok(Envelope::ok(certificates))
}

/// `GET /api/citizen/birth-certificates/{id}`
pub async fn get_certificate<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  PathParam(id): PathParam<Uuid>,
) -> ApiResult<BirthCertificate>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  citizen(&user)?;
  workflow::authorize_request_access(
    &*state.store,
    &user.principal(),
    RequestKind::BirthCertificate,
    id,
  )
  .await?;
  let certificate = state
    .store
    .get_certificate(id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::RequestNotFound { kind: RequestKind::BirthCertificate, id })?;
  Ok(Envelope::ok(certificate))
}

/// `GET /api/citizen/track/{tracking_number}`
pub async fn track<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  PathParam(tracking_number): PathParam<String>,
) -> ApiResult<BirthCertificate>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  citizen(&user)?;
  let tracking_number = tracking_number.trim().to_uppercase();
  let certificate = state
    .store
    .find_certificate_by_tracking(&tracking_number)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::NotFound(format!("numéro de suivi {tracking_number}")))?;
  authz::require(
    &user.principal(),
    Requirement::roles(authz::CITIZEN).owned_by(certificate.header.citizen_id),
  )?;
  Ok(Envelope::ok(certificate))
}

/// `GET /api/citizen/documents`
///
/// Lists every request of the caller, newest first.
pub async fn documents<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
) -> ApiResult<Vec<RequestSummary>>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let citizen_id = citizen(&user)?;
  let filter = RequestFilter { citizen_id: Some(citizen_id), ..RequestFilter::default() };

  let declarations = state
    .store
    .list_declarations(filter.clone())
    .await
    .map_err(Error::store)?;
  let certificates = state
    .store
    .list_certificates(filter)
    .await
    .map_err(Error::store)?;

  let mut summaries: Vec<RequestSummary> = declarations
    .into_iter()
    .map(RequestSummary::BirthDeclaration)
    .chain(certificates.into_iter().map(RequestSummary::BirthCertificate))
    .collect();
  summaries.sort_by_key(|s| std::cmp::Reverse(s.created_at()));
  Ok(Envelope::ok(summaries))
}

// ─── Profile ─────────────────────────────────────────────────────────────────

/// `PATCH /api/citizen/profile`
pub async fn update_profile<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  JsonBody(body): JsonBody<ProfileUpdate>,
) -> ApiResult<Account>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let citizen_id = citizen(&user)?;
  let update = ProfileUpdate {
    display_name: body.display_name.as_deref().map(|n| required("nom", n)).transpose()?,
    phone:        body.phone.map(|p| p.trim().to_owned()),
  };
  let account = state
    .store
    .update_profile(citizen_id, update)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::NotFound("compte".to_owned()))?;
  Ok(Envelope::ok(account))
}

// ─── Dashboard ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CitizenDashboard {
  pub declarations:         StatusCounts,
  pub certificates:         StatusCounts,
  pub unread_notifications: u64,
}

/// `GET /api/citizen/dashboard`
pub async fn dashboard<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
) -> ApiResult<CitizenDashboard>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let citizen_id = citizen(&user)?;
  let filter = RequestFilter { citizen_id: Some(citizen_id), ..RequestFilter::default() };
  let store = &*state.store;

  Ok(Envelope::ok(CitizenDashboard {
    declarations:         store
      .request_counts(RequestKind::BirthDeclaration, filter.clone())
      .await
      .map_err(Error::store)?,
    certificates:         store
      .request_counts(RequestKind::BirthCertificate, filter)
      .await
      .map_err(Error::store)?,
    unread_notifications: store.unread_count(citizen_id).await.map_err(Error::store)?,
  }))
}

// ─── Notifications ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
  #[serde(default)]
  pub unread: bool,
}

/// `GET /api/citizen/notifications[?unread=true]`
pub async fn notifications<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  QueryParams(query): QueryParams<NotificationQuery>,
) -> ApiResult<Vec<Notification>>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let citizen_id = citizen(&user)?;
  let list = state
    .store
    .list_notifications(citizen_id, query.unread)
    .await
    .map_err(Error::store)?;
  Ok(Envelope::ok(list))
}

/// `PATCH /api/citizen/notifications/{id}/read`
pub async fn mark_read<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  PathParam(id): PathParam<Uuid>,
) -> ApiResult<Notification>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let citizen_id = citizen(&user)?;
  let notification = state
    .store
    .mark_notification_read(citizen_id, id)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::NotFound("notification".to_owned()))?;
  Ok(Envelope::ok(notification))
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
  pub updated: u64,
}

/// `POST /api/citizen/notifications/read-all`
pub async fn mark_all_read<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
) -> ApiResult<MarkedRead>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let citizen_id = citizen(&user)?;
  let updated = state
    .store
    .mark_all_notifications_read(citizen_id)
    .await
    .map_err(Error::store)?;
  Ok(Envelope::ok(MarkedRead { updated }))
}
