//! Server wiring for the Civitas portal: configuration, the Stripe gateway
//! and the traced application router.

pub mod gateway;

pub use gateway::{GatewayError, StripeGateway};

use std::path::PathBuf;

use axum::Router;
use civitas_api::{ApiSettings, AppState};
use civitas_core::{gateway::PaymentGateway, store::PortalStore, workflow::CheckoutSettings};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `CIVITAS_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                  String,
  pub port:                  u16,
  /// Origin the citizen's browser returns to after checkout.
  pub public_base_url:       String,
  pub store_path:            PathBuf,
  pub upload_dir:            PathBuf,
  #[serde(default = "default_session_ttl_hours")]
  pub session_ttl_hours:     i64,
  #[serde(default = "default_currency")]
  pub currency:              String,
  pub declaration_fee_minor: i64,
  pub certificate_fee_minor: i64,
  pub stripe_secret_key:     String,
  #[serde(default = "default_stripe_api_base")]
  pub stripe_api_base:       String,
}

fn default_session_ttl_hours() -> i64 { 24 }

fn default_currency() -> String { "xof".to_owned() }

fn default_stripe_api_base() -> String { "https://api.stripe.com".to_owned() }

impl ServerConfig {
  /// Handler settings derived from this configuration.
  pub fn api_settings(&self) -> ApiSettings {
    let base = self.public_base_url.trim_end_matches('/');
    ApiSettings {
      checkout:    CheckoutSettings {
        currency:              self.currency.to_lowercase(),
        declaration_fee_minor: self.declaration_fee_minor,
        certificate_fee_minor: self.certificate_fee_minor,
        success_url:           format!("{base}/paiement/succes?session_id={{CHECKOUT_SESSION_ID}}"),
        cancel_url:            format!("{base}/paiement/annule"),
      },
      session_ttl: chrono::Duration::hours(self.session_ttl_hours),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The API router with request tracing.
pub fn app<S, G>(state: AppState<S, G>) -> Router
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  civitas_api::router(state).layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use config::{Config, File, FileFormat};

  use super::*;

  const MINIMAL: &str = r#"
    host = "0.0.0.0"
    port = 8080
    public_base_url = "https://etat-civil.example.ci/"
    store_path = "~/civitas/portal.db"
    upload_dir = "/var/lib/civitas/uploads"
    declaration_fee_minor = 500000
    certificate_fee_minor = 300000
    stripe_secret_key = "sk_test_x"
  "#;

  fn load(toml: &str) -> ServerConfig {
    Config::builder()
      .add_source(File::from_str(toml, FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn defaults_fill_optional_fields() {
    let cfg = load(MINIMAL);
    assert_eq!(cfg.session_ttl_hours, 24);
    assert_eq!(cfg.currency, "xof");
    assert_eq!(cfg.stripe_api_base, "https://api.stripe.com");
  }

  #[test]
  fn checkout_urls_come_from_public_base() {
    let settings = load(MINIMAL).api_settings();
    assert_eq!(
      settings.checkout.success_url,
      "https://etat-civil.example.ci/paiement/succes?session_id={CHECKOUT_SESSION_ID}"
    );
    assert_eq!(settings.checkout.cancel_url, "https://etat-civil.example.ci/paiement/annule");
    assert_eq!(settings.session_ttl, chrono::Duration::hours(24));
  }
}
