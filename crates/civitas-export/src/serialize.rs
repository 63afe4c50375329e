//! RFC 4180 CSV writer.
//!
//! Records end in CRLF. A field is quoted when it contains a comma, a double
//! quote, CR or LF; embedded quotes are doubled.

use std::{borrow::Cow, io::Write};

use chrono::SecondsFormat;
use civitas_core::payment::Payment;

use crate::error::{Error, Result};

// ─── Field escaping ──────────────────────────────────────────────────────────

pub(crate) fn escape_field(s: &str) -> Cow<'_, str> {
  if s.contains([',', '"', '\r', '\n']) {
    Cow::Owned(format!("\"{}\"", s.replace('"', "\"\"")))
  } else {
    Cow::Borrowed(s)
  }
}

pub(crate) fn write_record<W, S>(w: &mut W, fields: &[S], expected: usize) -> Result<()>
where
  W: Write,
  S: AsRef<str>,
{
  if fields.len() != expected {
    return Err(Error::FieldCount { expected, got: fields.len() });
  }
  for (i, field) in fields.iter().enumerate() {
    if i > 0 {
      w.write_all(b",")?;
    }
    w.write_all(escape_field(field.as_ref()).as_bytes())?;
  }
  w.write_all(b"\r\n")?;
  Ok(())
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// One payment in `PAYMENT_COLUMNS` order. Amounts are major units with two
/// decimals; currencies are uppercased.
pub(crate) fn payment_row(p: &Payment) -> [String; 8] {
  [
    p.payment_id.to_string(),
    p.target.kind().as_str().to_owned(),
    p.target.request_id().to_string(),
    format!("{:.2}", p.amount()),
    p.currency.to_uppercase(),
    p.status.as_ref().to_owned(),
    p.checkout_session_id.clone(),
    p.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
  ]
}

#[cfg(test)]
mod tests {
  use chrono::{NaiveDate, TimeZone as _, Utc};
  use civitas_core::{payment::PaymentTarget, status::PaymentStatus};
  use uuid::Uuid;

  use super::*;
  use crate::{PAYMENT_COLUMNS, export_file_name, payments_csv};

  fn payment(session: &str) -> Payment {
    let at = Utc.with_ymd_and_hms(2024, 1, 10, 9, 30, 0).unwrap();
    Payment {
      payment_id:          Uuid::nil(),
      target:              PaymentTarget::BirthDeclaration(Uuid::nil()),
      amount_minor:        500_000,
      currency:            "xof".into(),
      status:              PaymentStatus::Paid,
      checkout_session_id: session.into(),
      created_at:          at,
      updated_at:          at,
    }
  }

  #[test]
  fn plain_fields_are_not_quoted() {
    assert_eq!(escape_field("cs_test_1"), "cs_test_1");
  }

  #[test]
  fn special_fields_are_quoted() {
    assert_eq!(escape_field("a,b"), "\"a,b\"");
    assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
  }

  #[test]
  fn export_has_header_and_crlf_rows() {
    let csv = payments_csv(&[payment("cs_1")]).unwrap();
    let nil = Uuid::nil();
    let expected = format!(
      "{}\r\n{nil},birth_declaration,{nil},5000.00,XOF,PAID,cs_1,2024-01-10T09:30:00Z\r\n",
      PAYMENT_COLUMNS.join(",")
    );
    assert_eq!(csv, expected);
  }

  #[test]
  fn session_id_with_comma_is_quoted_in_row() {
    let csv = payments_csv(&[payment("cs,odd")]).unwrap();
    assert!(csv.contains(",\"cs,odd\","), "{csv}");
  }

  #[test]
  fn empty_export_is_header_only() {
    let csv = payments_csv(&[]).unwrap();
    assert_eq!(csv.matches("\r\n").count(), 1);
  }

  #[test]
  fn mismatched_record_is_rejected() {
    let mut out = Vec::new();
    let err = write_record(&mut out, &["a", "b"], 3).unwrap_err();
    assert!(matches!(err, Error::FieldCount { expected: 3, got: 2 }));
  }

  #[test]
  fn file_name_carries_date() {
    let d = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
    assert_eq!(export_file_name(d), "payments-2024-01-10.csv");
  }
}
