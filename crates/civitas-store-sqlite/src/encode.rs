//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 with fixed microsecond precision so that string
//! comparison orders them. Dates are `YYYY-MM-DD`. UUIDs are hyphenated
//! lowercase. Status columns are decoded through the legacy-label adapter.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use civitas_core::{
  account::{Account, AccountStatus, Role},
  document::{self, Document},
  notification::{Notification, NotificationKind},
  payment::{Payment, PaymentTarget},
  request::{BirthCertificate, BirthDeclaration, Gender, RequestHeader, RequestKind},
  status::{NotificationStatus, PaymentStatus, RequestStatus},
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Tags ────────────────────────────────────────────────────────────────────

fn unknown(column: &'static str, value: &str) -> Error {
  Error::UnknownTag { column, value: value.to_owned() }
}

fn decode_parsed<T: FromStr>(column: &'static str, s: &str) -> Result<T> {
  T::from_str(s).map_err(|_| unknown(column, s))
}

pub fn decode_request_status(s: &str) -> Result<RequestStatus> {
  RequestStatus::from_label(s).map_err(|_| unknown("status", s))
}

pub fn decode_request_kind(s: &str) -> Result<RequestKind> {
  RequestKind::from_tag(s).map_err(|_| unknown("request_kind", s))
}

fn decode_gender(s: &str) -> Result<Gender> {
  Gender::from_tag(s).map_err(|_| unknown("gender", s))
}

fn decode_payment_status(s: &str) -> Result<PaymentStatus> {
  PaymentStatus::from_label(s).map_err(|_| unknown("payment status", s))
}

fn decode_notification_status(s: &str) -> Result<NotificationStatus> {
  NotificationStatus::from_label(s).map_err(|_| unknown("notification status", s))
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const ACCOUNT_COLUMNS: &str = "account_id, email, display_name, phone, \
                                   password_hash, role, status, created_at, updated_at";

pub struct RawAccount {
  pub account_id:    String,
  pub email:         String,
  pub display_name:  String,
  pub phone:         Option<String>,
  pub password_hash: String,
  pub role:          String,
  pub status:        String,
  pub created_at:    String,
  pub updated_at:    String,
}

impl RawAccount {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      account_id:    row.get(0)?,
      email:         row.get(1)?,
      display_name:  row.get(2)?,
      phone:         row.get(3)?,
      password_hash: row.get(4)?,
      role:          row.get(5)?,
      status:        row.get(6)?,
      created_at:    row.get(7)?,
      updated_at:    row.get(8)?,
    })
  }

  pub fn into_account(self) -> Result<Account> {
    Ok(Account {
      account_id:    decode_uuid(&self.account_id)?,
      email:         self.email,
      display_name:  self.display_name,
      phone:         self.phone,
      password_hash: self.password_hash,
      role:          decode_parsed::<Role>("role", &self.role)?,
      status:        decode_parsed::<AccountStatus>("account status", &self.status)?,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

/// Columns `0..=7` of every request table.
pub const HEADER_COLUMNS: &str =
  "request_id, citizen_id, agent_id, status, comment, version, created_at, updated_at";

pub struct RawHeader {
  pub request_id: String,
  pub citizen_id: String,
  pub agent_id:   Option<String>,
  pub status:     String,
  pub comment:    Option<String>,
  pub version:    i64,
  pub created_at: String,
  pub updated_at: String,
}

impl RawHeader {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      request_id: row.get(0)?,
      citizen_id: row.get(1)?,
      agent_id:   row.get(2)?,
      status:     row.get(3)?,
      comment:    row.get(4)?,
      version:    row.get(5)?,
      created_at: row.get(6)?,
      updated_at: row.get(7)?,
    })
  }

  pub fn into_header(self, kind: RequestKind) -> Result<RequestHeader> {
    Ok(RequestHeader {
      kind,
      request_id: decode_uuid(&self.request_id)?,
      citizen_id: decode_uuid(&self.citizen_id)?,
      agent_id: decode_opt_uuid(self.agent_id)?,
      status: decode_request_status(&self.status)?,
      comment: self.comment,
      version: self.version,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub const DECLARATION_FIELDS: &str = "child_first_name, child_last_name, birth_date, \
                                      birth_place, gender, father_name, mother_name";

pub struct RawDeclaration {
  pub header:           RawHeader,
  pub child_first_name: String,
  pub child_last_name:  String,
  pub birth_date:       String,
  pub birth_place:      String,
  pub gender:           String,
  pub father_name:      Option<String>,
  pub mother_name:      Option<String>,
  pub documents:        Vec<RawDocument>,
  pub payment:          Option<RawPayment>,
}

impl RawDeclaration {
  /// Expects `HEADER_COLUMNS, DECLARATION_FIELDS`.
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      header:           RawHeader::from_row(row)?,
      child_first_name: row.get(8)?,
      child_last_name:  row.get(9)?,
      birth_date:       row.get(10)?,
      birth_place:      row.get(11)?,
      gender:           row.get(12)?,
      father_name:      row.get(13)?,
      mother_name:      row.get(14)?,
      documents:        Vec::new(),
      payment:          None,
    })
  }

  pub fn into_declaration(self) -> Result<BirthDeclaration> {
    Ok(BirthDeclaration {
      header:           self.header.into_header(RequestKind::BirthDeclaration)?,
      child_first_name: self.child_first_name,
      child_last_name:  self.child_last_name,
      birth_date:       decode_date(&self.birth_date)?,
      birth_place:      self.birth_place,
      gender:           decode_gender(&self.gender)?,
      father_name:      self.father_name,
      mother_name:      self.mother_name,
      documents:        decode_documents(self.documents)?,
      payment:          self.payment.map(RawPayment::into_payment).transpose()?,
    })
  }
}

pub const CERTIFICATE_FIELDS: &str = "full_name, birth_date, birth_place, father_full_name, \
                                      mother_full_name, certificate_number, tracking_number, \
                                      source_declaration_id";

pub struct RawCertificate {
  pub header:                RawHeader,
  pub full_name:             String,
  pub birth_date:            String,
  pub birth_place:           String,
  pub father_full_name:      Option<String>,
  pub mother_full_name:      Option<String>,
  pub certificate_number:    Option<String>,
  pub tracking_number:       String,
  pub source_declaration_id: Option<String>,
  pub documents:             Vec<RawDocument>,
  pub payment:               Option<RawPayment>,
}

impl RawCertificate {
  /// Expects `HEADER_COLUMNS, CERTIFICATE_FIELDS`.
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      header:                RawHeader::from_row(row)?,
      full_name:             row.get(8)?,
      birth_date:            row.get(9)?,
      birth_place:           row.get(10)?,
      father_full_name:      row.get(11)?,
      mother_full_name:      row.get(12)?,
      certificate_number:    row.get(13)?,
      tracking_number:       row.get(14)?,
      source_declaration_id: row.get(15)?,
      documents:             Vec::new(),
      payment:               None,
    })
  }

  pub fn into_certificate(self) -> Result<BirthCertificate> {
    Ok(BirthCertificate {
      header:                self.header.into_header(RequestKind::BirthCertificate)?,
      full_name:             self.full_name,
      birth_date:            decode_date(&self.birth_date)?,
      birth_place:           self.birth_place,
      father_full_name:      self.father_full_name,
      mother_full_name:      self.mother_full_name,
      certificate_number:    self.certificate_number,
      tracking_number:       self.tracking_number,
      source_declaration_id: decode_opt_uuid(self.source_declaration_id)?,
      documents:             decode_documents(self.documents)?,
      payment:               self.payment.map(RawPayment::into_payment).transpose()?,
    })
  }
}

pub const DOCUMENT_COLUMNS: &str = "document_id, request_kind, request_id, doc_type, \
                                    file_name, media_type, size_bytes, storage_key, \
                                    uploaded_by, created_at";

pub struct RawDocument {
  pub document_id:  String,
  pub request_kind: String,
  pub request_id:   String,
  pub doc_type:     String,
  pub file_name:    String,
  pub media_type:   String,
  pub size_bytes:   i64,
  pub storage_key:  String,
  pub uploaded_by:  String,
  pub created_at:   String,
}

impl RawDocument {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      document_id:  row.get(0)?,
      request_kind: row.get(1)?,
      request_id:   row.get(2)?,
      doc_type:     row.get(3)?,
      file_name:    row.get(4)?,
      media_type:   row.get(5)?,
      size_bytes:   row.get(6)?,
      storage_key:  row.get(7)?,
      uploaded_by:  row.get(8)?,
      created_at:   row.get(9)?,
    })
  }

  pub fn into_document(self) -> Result<Document> {
    let document_id = decode_uuid(&self.document_id)?;
    Ok(Document {
      document_id,
      request_kind: decode_request_kind(&self.request_kind)?,
      request_id: decode_uuid(&self.request_id)?,
      doc_type: self.doc_type,
      file_name: self.file_name,
      media_type: self.media_type,
      size_bytes: u64::try_from(self.size_bytes).map_err(|_| Error::Negative("size_bytes"))?,
      storage_key: self.storage_key,
      url: document::content_url(document_id),
      uploaded_by: decode_uuid(&self.uploaded_by)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

fn decode_documents(raws: Vec<RawDocument>) -> Result<Vec<Document>> {
  raws.into_iter().map(RawDocument::into_document).collect()
}

pub const PAYMENT_COLUMNS: &str = "payment_id, request_kind, request_id, amount_minor, \
                                   currency, status, checkout_session_id, created_at, updated_at";

pub struct RawPayment {
  pub payment_id:          String,
  pub request_kind:        String,
  pub request_id:          String,
  pub amount_minor:        i64,
  pub currency:            String,
  pub status:              String,
  pub checkout_session_id: String,
  pub created_at:          String,
  pub updated_at:          String,
}

impl RawPayment {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      payment_id:          row.get(0)?,
      request_kind:        row.get(1)?,
      request_id:          row.get(2)?,
      amount_minor:        row.get(3)?,
      currency:            row.get(4)?,
      status:              row.get(5)?,
      checkout_session_id: row.get(6)?,
      created_at:          row.get(7)?,
      updated_at:          row.get(8)?,
    })
  }

  pub fn into_payment(self) -> Result<Payment> {
    let kind = decode_request_kind(&self.request_kind)?;
    Ok(Payment {
      payment_id:          decode_uuid(&self.payment_id)?,
      target:              PaymentTarget::new(kind, decode_uuid(&self.request_id)?),
      amount_minor:        self.amount_minor,
      currency:            self.currency,
      status:              decode_payment_status(&self.status)?,
      checkout_session_id: self.checkout_session_id,
      created_at:          decode_dt(&self.created_at)?,
      updated_at:          decode_dt(&self.updated_at)?,
    })
  }
}

pub const NOTIFICATION_COLUMNS: &str = "notification_id, citizen_id, title, message, kind, \
                                        status, reference_id, created_at";

pub struct RawNotification {
  pub notification_id: String,
  pub citizen_id:      String,
  pub title:           String,
  pub message:         String,
  pub kind:            String,
  pub status:          String,
  pub reference_id:    Option<String>,
  pub created_at:      String,
}

impl RawNotification {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      notification_id: row.get(0)?,
      citizen_id:      row.get(1)?,
      title:           row.get(2)?,
      message:         row.get(3)?,
      kind:            row.get(4)?,
      status:          row.get(5)?,
      reference_id:    row.get(6)?,
      created_at:      row.get(7)?,
    })
  }

  pub fn into_notification(self) -> Result<Notification> {
    Ok(Notification {
      notification_id: decode_uuid(&self.notification_id)?,
      citizen_id:      decode_uuid(&self.citizen_id)?,
      title:           self.title,
      message:         self.message,
      kind:            decode_parsed::<NotificationKind>("notification kind", &self.kind)?,
      status:          decode_notification_status(&self.status)?,
      reference_id:    decode_opt_uuid(self.reference_id)?,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let a = DateTime::parse_from_rfc3339("2024-01-10T09:00:00.5Z").unwrap().with_timezone(&Utc);
    let b = DateTime::parse_from_rfc3339("2024-01-10T09:00:00.25Z").unwrap().with_timezone(&Utc);
    assert!(encode_dt(b) < encode_dt(a));
    assert_eq!(decode_dt(&encode_dt(a)).unwrap(), a);
  }

  #[test]
  fn legacy_status_labels_decode() {
    assert_eq!(decode_request_status("approuvé").unwrap(), RequestStatus::Completed);
    assert!(matches!(
      decode_request_status("archived"),
      Err(Error::UnknownTag { column: "status", .. })
    ));
  }

  #[test]
  fn birth_date_format() {
    let d = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
    assert_eq!(encode_date(d), "2024-01-10");
    assert_eq!(decode_date("2024-01-10").unwrap(), d);
  }
}
