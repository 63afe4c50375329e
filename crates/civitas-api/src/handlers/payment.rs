//! Handlers for `/api/payment`: hosted checkout and payment verification.

use axum::extract::State;
use civitas_core::{
  gateway::PaymentGateway,
  payment::Payment,
  request::RequestKind,
  store::PortalStore,
  workflow,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  AppState,
  auth::CurrentUser,
  error::{ApiResult, Envelope},
  extract::JsonBody,
};

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
  pub request_type: RequestKind,
  pub request_id:   Uuid,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
  pub session_id: String,
  pub url:        Option<String>,
}

/// `POST /api/payment/checkout`
pub async fn checkout<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  JsonBody(body): JsonBody<CheckoutBody>,
) -> ApiResult<CheckoutResponse>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let session = workflow::start_checkout(
    &*state.store,
    &*state.gateway,
    &user.principal(),
    &state.settings.checkout,
    body.request_type,
    body.request_id,
  )
  .await?;
  Ok(Envelope::ok(CheckoutResponse { session_id: session.id, url: session.url }))
}

#[derive(Debug, Deserialize)]
pub struct VerifyBody {
  pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
  pub payment:        Payment,
  pub newly_recorded: bool,
}

/// `POST /api/payment/verify`
///
/// Idempotent: a second call for the same session records nothing.
pub async fn verify<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  JsonBody(body): JsonBody<VerifyBody>,
) -> ApiResult<VerifyResponse>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let recorded = workflow::verify_payment(
    &*state.store,
    &*state.gateway,
    &user.principal(),
    &state.settings.checkout,
    &body.session_id,
  )
  .await?;
  Ok(Envelope::ok(VerifyResponse {
    payment:        recorded.payment,
    newly_recorded: recorded.newly_recorded,
  }))
}
