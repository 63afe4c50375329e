//! The `PaymentGateway` trait: the hosted-checkout provider seen from the
//! portal. Implemented over HTTP by `civitas-server` and by in-process fakes
//! in tests.

use std::{collections::HashMap, future::Future};

use serde::{Deserialize, Serialize};

/// Parameters for opening a hosted checkout.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
  pub amount_minor:   i64,
  pub currency:       String,
  /// Line-item label shown on the checkout page.
  pub description:    String,
  /// Echoed back on retrieval; carries the request reference.
  pub metadata:       HashMap<String, String>,
  pub success_url:    String,
  pub cancel_url:     String,
  pub customer_email: Option<String>,
}

/// A checkout session as reported by the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutSession {
  pub id:             String,
  /// Hosted page to redirect the citizen to; absent once the session ends.
  pub url:            Option<String>,
  /// `paid`, `unpaid` or `no_payment_required`.
  pub payment_status: String,
  /// Total in minor units.
  pub amount_total:   Option<i64>,
  pub currency:       Option<String>,
  #[serde(default)]
  pub metadata:       HashMap<String, String>,
}

impl CheckoutSession {
  pub fn is_paid(&self) -> bool { self.payment_status == "paid" }
}

pub trait PaymentGateway: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Open a new checkout session.
  fn create_checkout_session(
    &self,
    request: CheckoutRequest,
  ) -> impl Future<Output = Result<CheckoutSession, Self::Error>> + Send + '_;

  /// Look up a session. Returns `None` if the gateway does not know it.
  fn retrieve_checkout_session<'a>(
    &'a self,
    session_id: &'a str,
  ) -> impl Future<Output = Result<Option<CheckoutSession>, Self::Error>> + Send + 'a;
}
