//! Extractor wrappers whose rejections render as the error envelope.

use axum::extract::{FromRequest, FromRequestParts, OptionalFromRequest, Request};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// `Option<JsonBody<T>>` is `None` when the request carries no body and no
/// `Content-Type`; a body that is present must still be valid JSON.
impl<T, S> OptionalFromRequest<S> for JsonBody<T>
where
  T: DeserializeOwned,
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request(req: Request, state: &S) -> Result<Option<Self>, Self::Rejection> {
    let json =
      <axum::Json<T> as OptionalFromRequest<S>>::from_request(req, state).await?;
    Ok(json.map(|axum::Json(value)| Self(value)))
  }
}

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct QueryParams<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct PathParam<T>(pub T);
