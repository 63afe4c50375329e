//! JSON API for the Civitas portal.
//!
//! Exposes an axum [`Router`] under `/api`, backed by any [`PortalStore`]
//! and [`PaymentGateway`]. Routes are segmented by role:
//!
//! | Prefix | Callers |
//! |--------|---------|
//! | `/api/auth` | anyone (`me`/`logout` need a session) |
//! | `/api/citizen` | citizens, on their own requests |
//! | `/api/agent` | agents and administrators |
//! | `/api/admin` | administrators |
//! | `/api/payment` | citizens paying for their requests |
//! | `/api/documents` | any caller allowed to see the owning request |

pub mod auth;
pub mod error;
pub mod extract;
pub mod files;
pub mod handlers;

pub use error::{ApiError, ApiResult, Envelope};
pub use files::FileStore;

use std::sync::Arc;

use axum::{
  Router,
  extract::DefaultBodyLimit,
  routing::{get, patch, post},
};
use chrono::Duration;
use civitas_core::{gateway::PaymentGateway, store::PortalStore, workflow::CheckoutSettings};

use handlers::{admin, agent, citizen, documents, payment};

/// Upload cap for supporting documents and final certificates.
pub const UPLOAD_LIMIT: usize = 5 * 1024 * 1024;
/// Upload cap for a citizen's existing birth certificate.
pub const CERTIFICATE_UPLOAD_LIMIT: usize = 2 * 1024 * 1024;
/// Room for multipart boundaries and text fields around the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

// ─── Application state ────────────────────────────────────────────────────────

/// Runtime settings the handlers need.
#[derive(Debug, Clone)]
pub struct ApiSettings {
  pub checkout:    CheckoutSettings,
  pub session_ttl: Duration,
}

/// Shared state threaded through all axum handlers.
pub struct AppState<S, G> {
  pub store:    Arc<S>,
  pub gateway:  Arc<G>,
  pub files:    Arc<FileStore>,
  pub settings: Arc<ApiSettings>,
}

impl<S, G> Clone for AppState<S, G> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      gateway:  Arc::clone(&self.gateway),
      files:    Arc::clone(&self.files),
      settings: Arc::clone(&self.settings),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the `/api` router.
pub fn router<S, G>(state: AppState<S, G>) -> Router
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let upload_limit = DefaultBodyLimit::max(UPLOAD_LIMIT + MULTIPART_OVERHEAD);
  let certificate_limit = DefaultBodyLimit::max(CERTIFICATE_UPLOAD_LIMIT + MULTIPART_OVERHEAD);

  let auth_routes = Router::new()
    .route("/register", post(handlers::auth::register::<S, G>))
    .route("/login",    post(handlers::auth::login::<S, G>))
    .route("/logout",   post(handlers::auth::logout::<S, G>))
    .route("/me",       get(handlers::auth::me::<S, G>));

  let citizen_routes = Router::new()
    .route(
      "/birth-declarations",
      post(citizen::create_declaration::<S, G>).get(citizen::list_declarations::<S, G>),
    )
    .route("/birth-declarations/{id}", get(citizen::get_declaration::<S, G>))
    .route(
      "/birth-certificates",
      post(citizen::create_certificate::<S, G>).get(citizen::list_certificates::<S, G>),
    )
    .route("/birth-certificates/{id}",      get(citizen::get_certificate::<S, G>))
    .route("/track/{tracking_number}",      get(citizen::track::<S, G>))
    .route("/documents",                    get(citizen::documents::<S, G>))
    .route("/profile",                      patch(citizen::update_profile::<S, G>))
    .route("/dashboard",                    get(citizen::dashboard::<S, G>))
    .route("/notifications",                get(citizen::notifications::<S, G>))
    .route("/notifications/{id}/read",      patch(citizen::mark_read::<S, G>))
    .route("/notifications/read-all",       post(citizen::mark_all_read::<S, G>))
    .route(
      "/document/upload",
      post(documents::citizen_upload::<S, G>).layer(upload_limit),
    )
    .route(
      "/upload-birth-certificate",
      post(documents::citizen_certificate_upload::<S, G>).layer(certificate_limit),
    );

  let agent_routes = Router::new()
    .route("/birth-declarations",              get(agent::list_declarations::<S, G>))
    .route("/birth-declarations/{id}",         get(agent::get_declaration::<S, G>))
    .route("/birth-declarations/{id}/status",  patch(agent::declaration_status::<S, G>))
    .route("/birth-declarations/{id}/approve", post(agent::approve::<S, G>))
    .route(
      "/birth-certificates",
      get(agent::list_certificates::<S, G>).patch(agent::certificate_status::<S, G>),
    )
    .route("/birth-certificates/{id}",         get(agent::get_certificate::<S, G>))
    .route("/dashboard",                       get(agent::dashboard::<S, G>))
    .route(
      "/documents/upload",
      post(documents::agent_upload::<S, G>).layer(upload_limit),
    );

  let admin_routes = Router::new()
    .route(
      "/agents",
      get(admin::list_agents::<S, G>)
        .post(admin::create_agent::<S, G>)
        .delete(admin::delete_agent::<S, G>),
    )
    .route("/admins",                 post(admin::create_admin::<S, G>))
    .route("/citizens",               get(admin::list_citizens::<S, G>))
    .route("/citizens/{id}/status",   patch(admin::citizen_status::<S, G>))
    .route("/documents/{id}/status",  patch(admin::override_status::<S, G>))
    .route("/payments",               get(admin::list_payments::<S, G>))
    .route("/payments/export",        post(admin::export_payments::<S, G>))
    .route("/dashboard",              get(admin::dashboard::<S, G>));

  let payment_routes = Router::new()
    .route("/checkout", post(payment::checkout::<S, G>))
    .route("/verify",   post(payment::verify::<S, G>));

  let api = Router::new()
    .nest("/auth", auth_routes)
    .nest("/citizen", citizen_routes)
    .nest("/agent", agent_routes)
    .nest("/admin", admin_routes)
    .nest("/payment", payment_routes)
    .route("/documents/{id}/content", get(documents::content::<S, G>));

  Router::new().nest("/api", api).with_state(state)
}
