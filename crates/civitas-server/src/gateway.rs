//! Hosted checkout over the Stripe HTTP API.

use std::time::Duration;

use civitas_core::gateway::{CheckoutRequest, CheckoutSession, PaymentGateway};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),
  #[error("stripe returned {status}: {message}")]
  Api { status: StatusCode, message: String },
}

#[derive(Deserialize)]
struct ErrorResponse {
  error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
  #[serde(default)]
  message: String,
}

/// [`PaymentGateway`] backed by Stripe Checkout.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct StripeGateway {
  client:     Client,
  api_base:   String,
  secret_key: String,
}

impl StripeGateway {
  pub fn new(api_base: &str, secret_key: &str) -> Result<Self, GatewayError> {
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    Ok(Self {
      client,
      api_base: api_base.trim_end_matches('/').to_owned(),
      secret_key: secret_key.to_owned(),
    })
  }

  fn url(&self, path: &str) -> String { format!("{}/v1{}", self.api_base, path) }

  async fn fail(resp: reqwest::Response) -> GatewayError {
    let status = resp.status();
    let message = match resp.json::<ErrorResponse>().await {
      Ok(body) => body.error.message,
      Err(_) => String::new(),
    };
    GatewayError::Api { status, message }
  }
}

/// Form fields for `POST /v1/checkout/sessions`: one line item carrying the
/// whole amount, plus the caller's metadata.
pub fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
  let mut form = vec![
    ("mode".to_owned(), "payment".to_owned()),
    ("success_url".to_owned(), request.success_url.clone()),
    ("cancel_url".to_owned(), request.cancel_url.clone()),
    ("line_items[0][quantity]".to_owned(), "1".to_owned()),
    ("line_items[0][price_data][currency]".to_owned(), request.currency.to_lowercase()),
    ("line_items[0][price_data][unit_amount]".to_owned(), request.amount_minor.to_string()),
    ("line_items[0][price_data][product_data][name]".to_owned(), request.description.clone()),
  ];
  if let Some(email) = &request.customer_email {
    form.push(("customer_email".to_owned(), email.clone()));
  }
  let mut metadata: Vec<_> = request.metadata.iter().collect();
  metadata.sort();
  for (key, value) in metadata {
    form.push((format!("metadata[{key}]"), value.clone()));
  }
  form
}

/// Stripe session ids are `cs_` followed by alphanumerics and underscores.
fn is_session_id(id: &str) -> bool {
  !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl PaymentGateway for StripeGateway {
  type Error = GatewayError;

  async fn create_checkout_session(
    &self,
    request: CheckoutRequest,
  ) -> Result<CheckoutSession, GatewayError> {
    let resp = self
      .client
      .post(self.url("/checkout/sessions"))
      .bearer_auth(&self.secret_key)
      .form(&checkout_form(&request))
      .send()
      .await?;
    if !resp.status().is_success() {
      return Err(Self::fail(resp).await);
    }
    let session: CheckoutSession = resp.json().await?;
    tracing::debug!(session_id = %session.id, amount = request.amount_minor, "checkout session created");
    Ok(session)
  }

  async fn retrieve_checkout_session(
    &self,
    session_id: &str,
  ) -> Result<Option<CheckoutSession>, GatewayError> {
    if !is_session_id(session_id) {
      return Ok(None);
    }
    let resp = self
      .client
      .get(self.url(&format!("/checkout/sessions/{session_id}")))
      .bearer_auth(&self.secret_key)
      .send()
      .await?;
    if resp.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    if !resp.status().is_success() {
      return Err(Self::fail(resp).await);
    }
    Ok(Some(resp.json().await?))
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;

  fn request() -> CheckoutRequest {
    CheckoutRequest {
      amount_minor:   500_000,
      currency:       "XOF".into(),
      description:    "Déclaration de naissance".into(),
      metadata:       HashMap::from([
        ("request_type".to_owned(), "birth_declaration".to_owned()),
        ("request_id".to_owned(), "5f0c".to_owned()),
      ]),
      success_url:    "https://civitas.test/paiement/succes".into(),
      cancel_url:     "https://civitas.test/paiement/annule".into(),
      customer_email: Some("awa@example.ci".into()),
    }
  }

  fn get<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
    form.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
  }

  #[test]
  fn form_carries_amount_and_metadata() {
    let form = checkout_form(&request());
    assert_eq!(get(&form, "mode"), Some("payment"));
    assert_eq!(get(&form, "line_items[0][price_data][unit_amount]"), Some("500000"));
    assert_eq!(get(&form, "line_items[0][price_data][currency]"), Some("xof"));
    assert_eq!(get(&form, "metadata[request_type]"), Some("birth_declaration"));
    assert_eq!(get(&form, "metadata[request_id]"), Some("5f0c"));
    assert_eq!(get(&form, "customer_email"), Some("awa@example.ci"));
  }

  #[test]
  fn metadata_order_is_stable() {
    let form = checkout_form(&request());
    let keys: Vec<_> = form.iter().filter(|(k, _)| k.starts_with("metadata")).map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, ["metadata[request_id]", "metadata[request_type]"]);
  }

  #[test]
  fn session_ids_are_checked_before_use_in_paths() {
    assert!(is_session_id("cs_test_a1B2c3"));
    assert!(!is_session_id(""));
    assert!(!is_session_id("../v1/customers"));
    assert!(!is_session_id("cs_test?expand=1"));
  }

  #[test]
  fn stripe_session_json_decodes() {
    let raw = r#"{
      "id": "cs_test_123",
      "object": "checkout.session",
      "url": null,
      "payment_status": "paid",
      "amount_total": 500000,
      "currency": "xof",
      "metadata": { "request_id": "5f0c", "request_type": "birth_declaration" }
    }"#;
    let session: CheckoutSession = serde_json::from_str(raw).unwrap();
    assert!(session.is_paid());
    assert_eq!(session.amount_total, Some(500_000));
    assert_eq!(session.metadata["request_type"], "birth_declaration");
  }
}
