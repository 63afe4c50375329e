//! Route handlers, one module per role segment.

pub mod admin;
pub mod agent;
pub mod auth;
pub mod citizen;
pub mod documents;
pub mod payment;

use serde::Deserialize;

use civitas_core::{
  Error, Result,
  stats::TimeRange,
  status::{PaymentStatus, RequestStatus},
};

/// `?status=` on request listings. Any known spelling is accepted.
#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
  pub status: Option<String>,
}

impl StatusQuery {
  pub fn status(&self) -> Result<Option<RequestStatus>> {
    non_blank(self.status.as_deref())
      .map(RequestStatus::from_label)
      .transpose()
  }
}

/// `?status=&timeRange=` on payment listings, also the export body.
#[derive(Debug, Default, Deserialize)]
pub struct PaymentQuery {
  pub status:     Option<String>,
  #[serde(rename = "timeRange", alias = "time_range")]
  pub time_range: Option<String>,
}

impl PaymentQuery {
  pub fn status(&self) -> Result<Option<PaymentStatus>> {
    non_blank(self.status.as_deref())
      .map(PaymentStatus::from_label)
      .transpose()
  }

  pub fn time_range(&self) -> Result<Option<TimeRange>> {
    parse_time_range(self.time_range.as_deref())
  }
}

pub(crate) fn parse_time_range(raw: Option<&str>) -> Result<Option<TimeRange>> {
  non_blank(raw).map(TimeRange::from_label).transpose()
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
  raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Trimmed, non-empty text or a validation error naming `field`.
pub(crate) fn required(field: &str, value: &str) -> Result<String> {
  let value = value.trim();
  if value.is_empty() {
    return Err(Error::validation(format!("le champ « {field} » est obligatoire")));
  }
  Ok(value.to_owned())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blank_status_means_no_filter() {
    let q = StatusQuery { status: Some("  ".into()) };
    assert_eq!(q.status().unwrap(), None);
  }

  #[test]
  fn legacy_status_filter_is_accepted() {
    let q = StatusQuery { status: Some("en_attente".into()) };
    assert_eq!(q.status().unwrap(), Some(RequestStatus::Pending));
  }

  #[test]
  fn payment_query_reads_camel_case_range() {
    let q: PaymentQuery = serde_json::from_str(r#"{"timeRange":"week"}"#).unwrap();
    assert_eq!(q.time_range().unwrap(), Some(TimeRange::Week));
    let q: PaymentQuery = serde_json::from_str(r#"{"time_range":"year","status":"paid"}"#).unwrap();
    assert_eq!(q.time_range().unwrap(), Some(TimeRange::Year));
    assert_eq!(q.status().unwrap(), Some(PaymentStatus::Paid));
  }

  #[test]
  fn unknown_range_is_an_error() {
    assert!(parse_time_range(Some("decade")).is_err());
  }
}
