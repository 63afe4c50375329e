//! The `PortalStore` trait and the write descriptors it consumes.
//!
//! The trait is implemented by storage backends (e.g. `civitas-store-sqlite`).
//! Higher layers (`civitas-api`, the workflows in this crate) depend on this
//! abstraction, not on any concrete backend.
//!
//! Every status write is conditional on the `(status, version)` pair the
//! caller read, and every write that touches more than one row is atomic.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  account::{Account, AccountStatus, NewAccount, ProfileUpdate, Role, Session},
  document::{Document, NewDocument},
  notification::{NewNotification, Notification},
  payment::{NewPayment, Payment, PaymentFilter},
  request::{
    BirthCertificate, BirthDeclaration, NewBirthCertificate, NewBirthDeclaration,
    RequestFilter, RequestHeader, RequestKind,
  },
  stats::{AccountCounts, PaymentTotals, StatusCounts},
  status::RequestStatus,
};

// ─── Write descriptors ───────────────────────────────────────────────────────

/// A gated status change, applied only if the stored row still matches
/// `expected_status` and `expected_version`.
#[derive(Debug, Clone)]
pub struct TransitionWrite {
  pub kind:               RequestKind,
  pub request_id:         Uuid,
  pub expected_status:    RequestStatus,
  pub expected_version:   i64,
  pub target:             RequestStatus,
  pub comment:            Option<String>,
  pub agent_id:           Uuid,
  /// Certificates only: assigned if the row has no number yet.
  pub certificate_number: Option<String>,
  /// Written in the same transaction as the status change.
  pub notification:       NewNotification,
}

/// Everything a declaration approval writes, as one unit of work.
#[derive(Debug, Clone)]
pub struct ApprovalWrite {
  pub declaration_id:           Uuid,
  pub expected_version:         i64,
  pub agent_id:                 Uuid,
  pub certificate_id:           Uuid,
  pub certificate:              NewBirthCertificate,
  pub declaration_notification: NewNotification,
  pub certificate_notification: NewNotification,
}

/// Result of a conditional write.
#[derive(Debug, Clone)]
pub enum CasOutcome<T> {
  Applied(T),
  /// The row moved on since it was read; carries its current header.
  Stale(RequestHeader),
  Missing,
}

/// Result of [`PortalStore::record_payment_once`].
#[derive(Debug, Clone)]
pub struct RecordedPayment {
  pub payment:        Payment,
  /// `false` when a payment already existed for the request.
  pub newly_recorded: bool,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the portal's persistence backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait PortalStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Accounts ──────────────────────────────────────────────────────────

  /// Persist a new account. The e-mail must already be normalized.
  /// Returns `None` if the e-mail is already registered.
  fn create_account(
    &self,
    input: NewAccount,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + '_;

  fn get_account(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + '_;

  fn find_account_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + 'a;

  /// All accounts, optionally restricted to one role, oldest first.
  fn list_accounts(
    &self,
    role: Option<Role>,
  ) -> impl Future<Output = Result<Vec<Account>, Self::Error>> + Send + '_;

  /// Returns `None` if the account does not exist.
  fn set_account_status(
    &self,
    id: Uuid,
    status: AccountStatus,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + '_;

  fn update_profile(
    &self,
    id: Uuid,
    update: ProfileUpdate,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + '_;

  /// Hard delete. Sessions cascade; requests keep their data and lose the
  /// agent reference. Returns `false` if nothing was deleted.
  fn delete_account(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn account_counts(
    &self,
  ) -> impl Future<Output = Result<AccountCounts, Self::Error>> + Send + '_;

  // ── Sessions ──────────────────────────────────────────────────────────

  fn create_session(
    &self,
    session: Session,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The account owning an unexpired session, if any.
  fn resolve_session(
    &self,
    token_hash: String,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + '_;

  fn delete_session(
    &self,
    token_hash: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Requests ──────────────────────────────────────────────────────────

  /// Persist a PENDING declaration owned by `citizen_id`.
  fn create_declaration(
    &self,
    citizen_id: Uuid,
    input: NewBirthDeclaration,
  ) -> impl Future<Output = Result<BirthDeclaration, Self::Error>> + Send + '_;

  /// Declaration with its documents and payment attached.
  fn get_declaration(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<BirthDeclaration>, Self::Error>> + Send + '_;

  /// Newest first, with documents and payments attached.
  fn list_declarations(
    &self,
    filter: RequestFilter,
  ) -> impl Future<Output = Result<Vec<BirthDeclaration>, Self::Error>> + Send + '_;

  fn create_certificate(
    &self,
    input: NewBirthCertificate,
  ) -> impl Future<Output = Result<BirthCertificate, Self::Error>> + Send + '_;

  fn get_certificate(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<BirthCertificate>, Self::Error>> + Send + '_;

  fn find_certificate_by_tracking<'a>(
    &'a self,
    tracking_number: &'a str,
  ) -> impl Future<Output = Result<Option<BirthCertificate>, Self::Error>> + Send + 'a;

  fn list_certificates(
    &self,
    filter: RequestFilter,
  ) -> impl Future<Output = Result<Vec<BirthCertificate>, Self::Error>> + Send + '_;

  /// Lifecycle fields only, for either kind.
  fn get_request_header(
    &self,
    kind: RequestKind,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<RequestHeader>, Self::Error>> + Send + '_;

  /// Compare-and-swap status write plus its notification, atomically.
  fn apply_transition(
    &self,
    write: TransitionWrite,
  ) -> impl Future<Output = Result<CasOutcome<RequestHeader>, Self::Error>> + Send + '_;

  /// Certificate synthesis as one transaction: declaration CAS to
  /// COMPLETED, certificate insert, document copies, two notifications.
  fn approve_declaration(
    &self,
    write: ApprovalWrite,
  ) -> impl Future<Output = Result<CasOutcome<BirthCertificate>, Self::Error>> + Send + '_;

  fn request_counts(
    &self,
    kind: RequestKind,
    filter: RequestFilter,
  ) -> impl Future<Output = Result<StatusCounts, Self::Error>> + Send + '_;

  // ── Documents ─────────────────────────────────────────────────────────

  fn add_document(
    &self,
    input: NewDocument,
  ) -> impl Future<Output = Result<Document, Self::Error>> + Send + '_;

  fn get_document(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + '_;

  fn list_documents(
    &self,
    kind: RequestKind,
    request_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + '_;

  // ── Payments ──────────────────────────────────────────────────────────

  /// Insert `input` unless a payment already references the same request.
  /// The check and insert are one transaction; `notification` is written
  /// only when a row is inserted.
  fn record_payment_once(
    &self,
    input: NewPayment,
    notification: Option<NewNotification>,
  ) -> impl Future<Output = Result<RecordedPayment, Self::Error>> + Send + '_;

  fn find_payment(
    &self,
    kind: RequestKind,
    request_id: Uuid,
  ) -> impl Future<Output = Result<Option<Payment>, Self::Error>> + Send + '_;

  /// Newest first.
  fn list_payments(
    &self,
    filter: PaymentFilter,
  ) -> impl Future<Output = Result<Vec<Payment>, Self::Error>> + Send + '_;

  fn payment_totals(
    &self,
    filter: PaymentFilter,
  ) -> impl Future<Output = Result<PaymentTotals, Self::Error>> + Send + '_;

  // ── Notifications ─────────────────────────────────────────────────────

  /// Newest first.
  fn list_notifications(
    &self,
    citizen_id: Uuid,
    unread_only: bool,
  ) -> impl Future<Output = Result<Vec<Notification>, Self::Error>> + Send + '_;

  /// Mark one notification READ. `None` if it does not exist or belongs to
  /// someone else.
  fn mark_notification_read(
    &self,
    citizen_id: Uuid,
    notification_id: Uuid,
  ) -> impl Future<Output = Result<Option<Notification>, Self::Error>> + Send + '_;

  /// Returns the number of notifications that changed.
  fn mark_all_notifications_read(
    &self,
    citizen_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  fn unread_count(
    &self,
    citizen_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;
}
