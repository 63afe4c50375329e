//! Accounts, roles and the authenticated principal.
//!
//! Citizens, agents and administrators share one account table; the role tag
//! decides which routes they may use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
  Citizen,
  Agent,
  Admin,
}

/// Accounts are never soft-deleted; deactivation is a status toggle.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AccountStatus {
  #[default]
  Active,
  Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
  pub account_id:    Uuid,
  pub email:         String,
  pub display_name:  String,
  pub phone:         Option<String>,
  /// argon2 PHC string; never leaves the server.
  #[serde(skip_serializing, default)]
  pub password_hash: String,
  pub role:          Role,
  pub status:        AccountStatus,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

impl Account {
  pub fn principal(&self) -> Principal {
    Principal {
      account_id: self.account_id,
      email:      self.email.clone(),
      role:       self.role,
      status:     self.status,
    }
  }
}

/// Input to [`crate::store::PortalStore::create_account`].
/// The password must already be hashed by the caller.
#[derive(Debug, Clone)]
pub struct NewAccount {
  pub email:         String,
  pub display_name:  String,
  pub phone:         Option<String>,
  pub password_hash: String,
  pub role:          Role,
}

/// Self-service profile fields. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
  pub display_name: Option<String>,
  pub phone:        Option<String>,
}

/// The caller identity resolved from a session token.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
  pub account_id: Uuid,
  pub email:      String,
  pub role:       Role,
  pub status:     AccountStatus,
}

/// A login session. Only the SHA-256 digest of the bearer token is kept.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
  #[serde(skip)]
  pub token_hash: String,
  pub account_id: Uuid,
  pub created_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
}

/// Lowercase and trim an e-mail address before storage or lookup.
pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

#[cfg(test)]
mod tests {
  use std::str::FromStr as _;

  use super::*;

  #[test]
  fn role_parses_lowercase() {
    assert_eq!(Role::from_str("agent").unwrap(), Role::Agent);
    assert_eq!(Role::Admin.as_ref(), "admin");
  }

  #[test]
  fn password_hash_is_not_serialized() {
    let now = Utc::now();
    let account = Account {
      account_id:    Uuid::new_v4(),
      email:         "awa@example.ci".into(),
      display_name:  "Awa".into(),
      phone:         None,
      password_hash: "$argon2id$secret".into(),
      role:          Role::Citizen,
      status:        AccountStatus::Active,
      created_at:    now,
      updated_at:    now,
    };
    let json = serde_json::to_string(&account).unwrap();
    assert!(!json.contains("argon2"), "{json}");
  }

  #[test]
  fn email_normalization() {
    assert_eq!(normalize_email("  Awa.Kone@Example.CI "), "awa.kone@example.ci");
  }
}
