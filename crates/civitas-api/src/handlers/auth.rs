//! Handlers for `/api/auth` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/api/auth/register` | Citizens only; returns 201 + account |
//! | `POST` | `/api/auth/login` | Returns the token and sets the session cookie |
//! | `POST` | `/api/auth/logout` | Deletes the current session |
//! | `GET`  | `/api/auth/me` | The current account |

use axum::{
  extract::State,
  http::{StatusCode, header},
  response::{AppendHeaders, IntoResponse},
};
use chrono::{DateTime, Utc};
use civitas_core::{
  Error,
  account::{Account, AccountStatus, NewAccount, Role, Session, normalize_email},
  gateway::PaymentGateway,
  store::PortalStore,
};
use serde::{Deserialize, Serialize};

use crate::{
  AppState,
  auth::{self, CurrentUser},
  error::{ApiError, ApiResult, Envelope},
  extract::JsonBody,
  handlers::required,
};

// ─── Account creation ────────────────────────────────────────────────────────

/// Body accepted by registration and by the admin account-creation routes.
#[derive(Debug, Deserialize)]
pub struct NewAccountBody {
  pub email:        String,
  pub display_name: String,
  pub password:     String,
  pub phone:        Option<String>,
}

/// Validate `body`, hash the password and persist an account with `role`.
pub(crate) async fn create_account<S: PortalStore>(
  store: &S,
  body: NewAccountBody,
  role: Role,
) -> Result<Account, ApiError> {
  let email = normalize_email(&body.email);
  if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
    return Err(Error::validation("adresse e-mail invalide").into());
  }
  let display_name = required("nom", &body.display_name)?;
  auth::check_password_strength(&body.password)?;

  let account = store
    .create_account(NewAccount {
      email,
      display_name,
      phone: body.phone.map(|p| p.trim().to_owned()).filter(|p| !p.is_empty()),
      password_hash: auth::hash_password(&body.password)?,
      role,
    })
    .await
    .map_err(Error::store)?
    .ok_or(ApiError::EmailTaken)?;

  tracing::info!(account_id = %account.account_id, role = %role, "account created");
  Ok(account)
}

// ─── Register ────────────────────────────────────────────────────────────────

/// `POST /api/auth/register`
pub async fn register<S, G>(
  State(state): State<AppState<S, G>>,
  JsonBody(body): JsonBody<NewAccountBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let account = create_account(&*state.store, body, Role::Citizen).await?;
  Ok((StatusCode::CREATED, Envelope::ok(account)))
}

// ─── Login / logout ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginBody {
  pub email:    String,
  pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
  pub token:      String,
  pub expires_at: DateTime<Utc>,
  pub account:    Account,
}

/// `POST /api/auth/login`
pub async fn login<S, G>(
  State(state): State<AppState<S, G>>,
  JsonBody(body): JsonBody<LoginBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let email = normalize_email(&body.email);
  let account = state
    .store
    .find_account_by_email(&email)
    .await
    .map_err(Error::store)?
    .filter(|a| auth::verify_password(&body.password, &a.password_hash))
    .ok_or(Error::Unauthorized)?;
  if account.status != AccountStatus::Active {
    tracing::info!(account_id = %account.account_id, "login refused for inactive account");
    return Err(Error::Unauthorized.into());
  }

  let token = auth::new_token();
  let now = Utc::now();
  let expires_at = now + state.settings.session_ttl;
  state
    .store
    .create_session(Session {
      token_hash: auth::token_hash(&token),
      account_id: account.account_id,
      created_at: now,
      expires_at,
    })
    .await
    .map_err(Error::store)?;

  tracing::info!(account_id = %account.account_id, "session opened");
  let cookie = auth::session_cookie(&token, expires_at);
  Ok((
    AppendHeaders([(header::SET_COOKIE, cookie)]),
    Envelope::ok(LoginResponse { token, expires_at, account }),
  ))
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
  pub logged_out: bool,
}

/// `POST /api/auth/logout`
pub async fn logout<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
) -> Result<impl IntoResponse, ApiError>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let logged_out = state
    .store
    .delete_session(user.token_hash)
    .await
    .map_err(Error::store)?;
  Ok((
    AppendHeaders([(header::SET_COOKIE, auth::cleared_cookie())]),
    Envelope::ok(LogoutResponse { logged_out }),
  ))
}

/// `GET /api/auth/me`
pub async fn me<S, G>(user: CurrentUser) -> ApiResult<Account>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  Ok(Envelope::ok(user.account))
}
