//! The single authorization check every handler goes through.

use uuid::Uuid;

use crate::{
  Error, Result,
  account::{AccountStatus, Principal, Role},
};

pub const CITIZEN: &[Role] = &[Role::Citizen];
pub const STAFF: &[Role] = &[Role::Agent, Role::Admin];
pub const ADMIN: &[Role] = &[Role::Admin];
pub const ANY: &[Role] = &[Role::Citizen, Role::Agent, Role::Admin];

/// What an operation demands of its caller.
#[derive(Debug, Clone, Copy)]
pub struct Requirement<'a> {
  pub roles: &'a [Role],
  /// When set, citizens must be this account. Staff are never owner-bound.
  pub owner: Option<Uuid>,
}

impl<'a> Requirement<'a> {
  pub fn roles(roles: &'a [Role]) -> Self { Self { roles, owner: None } }

  pub fn owned_by(mut self, owner: Uuid) -> Self {
    self.owner = Some(owner);
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
  Inactive,
  Role,
  NotOwner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
  Allow,
  Deny(DenyReason),
}

impl Decision {
  pub fn into_result(self) -> Result<()> {
    match self {
      Self::Allow => Ok(()),
      Self::Deny(DenyReason::Inactive) => {
        Err(Error::Forbidden("compte désactivé".to_owned()))
      }
      Self::Deny(DenyReason::Role) => {
        Err(Error::Forbidden("rôle insuffisant pour cette opération".to_owned()))
      }
      Self::Deny(DenyReason::NotOwner) => {
        Err(Error::Forbidden("cette demande ne vous appartient pas".to_owned()))
      }
    }
  }
}

pub fn authorize(principal: &Principal, requirement: &Requirement<'_>) -> Decision {
  if principal.status != AccountStatus::Active {
    return Decision::Deny(DenyReason::Inactive);
  }
  if !requirement.roles.contains(&principal.role) {
    return Decision::Deny(DenyReason::Role);
  }
  if let Some(owner) = requirement.owner
    && principal.role == Role::Citizen
    && principal.account_id != owner
  {
    return Decision::Deny(DenyReason::NotOwner);
  }
  Decision::Allow
}

/// [`authorize`] followed by [`Decision::into_result`], logging denials.
pub fn require(principal: &Principal, requirement: Requirement<'_>) -> Result<()> {
  let decision = authorize(principal, &requirement);
  if let Decision::Deny(reason) = decision {
    tracing::warn!(
      account_id = %principal.account_id,
      role = %principal.role,
      ?reason,
      "authorization denied"
    );
  }
  decision.into_result()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn principal(role: Role) -> Principal {
    Principal {
      account_id: Uuid::new_v4(),
      email:      "someone@example.ci".into(),
      role,
      status:     AccountStatus::Active,
    }
  }

  #[test]
  fn role_mismatch_is_denied() {
    let p = principal(Role::Citizen);
    assert_eq!(
      authorize(&p, &Requirement::roles(STAFF)),
      Decision::Deny(DenyReason::Role)
    );
  }

  #[test]
  fn citizen_must_own_resource() {
    let p = principal(Role::Citizen);
    let other = Uuid::new_v4();
    assert_eq!(
      authorize(&p, &Requirement::roles(CITIZEN).owned_by(other)),
      Decision::Deny(DenyReason::NotOwner)
    );
    assert_eq!(
      authorize(&p, &Requirement::roles(CITIZEN).owned_by(p.account_id)),
      Decision::Allow
    );
  }

  #[test]
  fn staff_are_not_owner_bound() {
    let p = principal(Role::Agent);
    assert_eq!(
      authorize(&p, &Requirement::roles(ANY).owned_by(Uuid::new_v4())),
      Decision::Allow
    );
  }

  #[test]
  fn inactive_accounts_are_denied_first() {
    let mut p = principal(Role::Admin);
    p.status = AccountStatus::Inactive;
    assert_eq!(
      authorize(&p, &Requirement::roles(ADMIN)),
      Decision::Deny(DenyReason::Inactive)
    );
  }

  #[test]
  fn deny_maps_to_forbidden() {
    let err = Decision::Deny(DenyReason::Role).into_result().unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
  }
}
