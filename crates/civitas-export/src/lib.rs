//! Tabular exports for the Civitas portal.
//!
//! Pure synchronous serializers from [`civitas_core`] domain types to
//! RFC 4180 CSV. No HTTP or database dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use civitas_export::payments_csv;
//!
//! let csv = payments_csv(&[]).unwrap();
//! assert!(csv.starts_with("payment_id,"));
//! ```

pub mod error;
mod serialize;

use chrono::NaiveDate;
use civitas_core::payment::Payment;

pub use error::{Error, Result};

/// Media type of every export produced by this crate.
pub const CSV_MEDIA_TYPE: &str = "text/csv; charset=utf-8";

/// Column order of the payment export.
pub const PAYMENT_COLUMNS: [&str; 8] = [
  "payment_id",
  "request_type",
  "request_id",
  "amount",
  "currency",
  "status",
  "checkout_session_id",
  "created_at",
];

/// Serialize `payments` as CSV with a header row and CRLF line endings.
pub fn payments_csv(payments: &[Payment]) -> Result<String> {
  let mut out = Vec::new();
  write_payments(&mut out, payments)?;
  // Every byte written comes from `&str` fields.
  Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Stream the payment export into `w`.
pub fn write_payments<W: std::io::Write>(w: &mut W, payments: &[Payment]) -> Result<()> {
  serialize::write_record(w, &PAYMENT_COLUMNS, PAYMENT_COLUMNS.len())?;
  for payment in payments {
    let row = serialize::payment_row(payment);
    serialize::write_record(w, &row, PAYMENT_COLUMNS.len())?;
  }
  Ok(())
}

/// `payments-<date>.csv`, the download name offered to the browser.
pub fn export_file_name(date: NaiveDate) -> String {
  format!("payments-{}.csv", date.format("%Y-%m-%d"))
}
