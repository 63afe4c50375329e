//! Password hashing, session tokens and the [`CurrentUser`] extractor.
//!
//! A session token is 32 random bytes from the OS, URL-safe base64 encoded.
//! The client presents it as `Authorization: Bearer <token>` or in the
//! `civitas_session` cookie; the store only ever sees its SHA-256 digest.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use civitas_core::{
  Error,
  account::{Account, Principal},
  gateway::PaymentGateway,
  store::PortalStore,
};
use rand_core::{OsRng, RngCore as _};
use sha2::{Digest, Sha256};

use crate::{AppState, error::ApiError};

pub const SESSION_COOKIE: &str = "civitas_session";
pub const MIN_PASSWORD_CHARS: usize = 8;

// ─── Passwords ───────────────────────────────────────────────────────────────

/// Hash `password` into an argon2 PHC string.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| ApiError::from(Error::store(std::io::Error::other(e.to_string()))))
}

/// `false` for a wrong password or an unparseable stored hash.
pub fn verify_password(password: &str, phc: &str) -> bool {
  let Ok(parsed) = PasswordHash::new(phc) else { return false };
  Argon2::default()
    .verify_password(password.as_bytes(), &parsed)
    .is_ok()
}

pub fn check_password_strength(password: &str) -> Result<(), ApiError> {
  if password.chars().count() < MIN_PASSWORD_CHARS {
    return Err(
      Error::validation(format!(
        "le mot de passe doit contenir au moins {MIN_PASSWORD_CHARS} caractères"
      ))
      .into(),
    );
  }
  Ok(())
}

// ─── Tokens ──────────────────────────────────────────────────────────────────

pub fn new_token() -> String {
  let mut bytes = [0u8; 32];
  OsRng.fill_bytes(&mut bytes);
  URL_SAFE_NO_PAD.encode(bytes)
}

pub fn token_hash(token: &str) -> String { hex::encode(Sha256::digest(token.as_bytes())) }

/// The bearer token or session cookie carried by a request.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
  let bearer = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|t| !t.is_empty());
  if let Some(token) = bearer {
    return Some(token.to_owned());
  }

  headers
    .get_all(header::COOKIE)
    .iter()
    .filter_map(|v| v.to_str().ok())
    .flat_map(|v| v.split(';'))
    .filter_map(|pair| pair.trim().split_once('='))
    .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
    .map(|(_, value)| value.to_owned())
}

pub fn session_cookie(token: &str, expires_at: DateTime<Utc>) -> String {
  let max_age = (expires_at - Utc::now()).num_seconds().max(0);
  format!("{SESSION_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={max_age}")
}

pub fn cleared_cookie() -> String {
  format!("{SESSION_COOKIE}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0")
}

// ─── Extractor ───────────────────────────────────────────────────────────────

/// The account behind a valid, unexpired session.
#[derive(Debug, Clone)]
pub struct CurrentUser {
  pub account:    Account,
  pub token_hash: String,
}

impl CurrentUser {
  pub fn principal(&self) -> Principal { self.account.principal() }
}

impl<S, G> FromRequestParts<AppState<S, G>> for CurrentUser
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S, G>,
  ) -> Result<Self, Self::Rejection> {
    let token = token_from_headers(&parts.headers).ok_or(Error::Unauthorized)?;
    let token_hash = token_hash(&token);
    let account = state
      .store
      .resolve_session(token_hash.clone(), Utc::now())
      .await
      .map_err(Error::store)?
      .ok_or(Error::Unauthorized)?;
    Ok(Self { account, token_hash })
  }
}

#[cfg(test)]
mod tests {
  use axum::http::HeaderValue;

  use super::*;

  #[test]
  fn hash_then_verify() {
    let phc = hash_password("motdepasse").unwrap();
    assert!(phc.starts_with("$argon2"));
    assert!(verify_password("motdepasse", &phc));
    assert!(!verify_password("autrechose", &phc));
  }

  #[test]
  fn garbage_hash_never_verifies() {
    assert!(!verify_password("anything", "not-a-phc-string"));
  }

  #[test]
  fn short_password_is_rejected() {
    assert!(check_password_strength("court").is_err());
    assert!(check_password_strength("assezlong").is_ok());
  }

  #[test]
  fn tokens_are_unique_and_url_safe() {
    let a = new_token();
    let b = new_token();
    assert_ne!(a, b);
    assert_eq!(a.len(), 43);
    assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
  }

  #[test]
  fn token_hash_is_hex_sha256() {
    let h = token_hash("abc");
    assert_eq!(h, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
  }

  #[test]
  fn bearer_wins_over_cookie() {
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok1"));
    headers.insert(header::COOKIE, HeaderValue::from_static("civitas_session=tok2"));
    assert_eq!(token_from_headers(&headers).as_deref(), Some("tok1"));
  }

  #[test]
  fn cookie_is_found_among_others() {
    let mut headers = HeaderMap::new();
    headers.insert(
      header::COOKIE,
      HeaderValue::from_static("theme=dark; civitas_session=tok2; lang=fr"),
    );
    assert_eq!(token_from_headers(&headers).as_deref(), Some("tok2"));
  }

  #[test]
  fn missing_credentials() {
    assert!(token_from_headers(&HeaderMap::new()).is_none());
  }

  #[test]
  fn cookie_attributes() {
    let c = session_cookie("tok", Utc::now() + chrono::Duration::hours(1));
    assert!(c.starts_with("civitas_session=tok; HttpOnly; Path=/; SameSite=Lax"), "{c}");
  }
}
