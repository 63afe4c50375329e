//! Dashboard aggregates and the reporting time window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, status::RequestStatus};

/// `?timeRange=today|week|month|year` on the admin dashboard and exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
  Today,
  Week,
  Month,
  Year,
}

impl TimeRange {
  pub fn from_label(label: &str) -> Result<Self> {
    match label {
      "today" => Ok(Self::Today),
      "week" => Ok(Self::Week),
      "month" => Ok(Self::Month),
      "year" => Ok(Self::Year),
      other => Err(Error::validation(format!("période inconnue : {other:?}"))),
    }
  }

  /// Start of the window ending at `now`. `Today` starts at UTC midnight.
  pub fn since(self, now: DateTime<Utc>) -> DateTime<Utc> {
    match self {
      Self::Today => now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now),
      Self::Week => now - Duration::days(7),
      Self::Month => now - Duration::days(30),
      Self::Year => now - Duration::days(365),
    }
  }
}

/// Request counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
  pub total:     u64,
  pub pending:   u64,
  pub completed: u64,
  pub rejected:  u64,
}

impl StatusCounts {
  pub fn add(&mut self, status: RequestStatus, n: u64) {
    self.total += n;
    match status {
      RequestStatus::Pending => self.pending += n,
      RequestStatus::Completed => self.completed += n,
      RequestStatus::Rejected => self.rejected += n,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccountCounts {
  pub citizens: u64,
  pub agents:   u64,
  pub admins:   u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PaymentTotals {
  pub count:       u64,
  /// Sum of PAID payments, in minor units.
  #[serde(skip)]
  pub paid_minor:  i64,
  /// Same sum in major units.
  pub paid_amount: f64,
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  #[test]
  fn today_starts_at_midnight() {
    let now = Utc.with_ymd_and_hms(2024, 1, 10, 15, 30, 0).unwrap();
    let since = TimeRange::Today.since(now);
    assert_eq!(since, Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap());
  }

  #[test]
  fn week_is_seven_days() {
    let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
    assert_eq!(TimeRange::Week.since(now), Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap());
  }

  #[test]
  fn unknown_range_is_validation() {
    assert!(matches!(TimeRange::from_label("decade"), Err(Error::Validation(_))));
  }

  #[test]
  fn counts_accumulate() {
    let mut c = StatusCounts::default();
    c.add(RequestStatus::Pending, 2);
    c.add(RequestStatus::Rejected, 1);
    assert_eq!(c, StatusCounts { total: 3, pending: 2, completed: 0, rejected: 1 });
  }
}
