//! Document uploads and content download.
//!
//! | Method | Path | Fields | Cap |
//! |--------|------|--------|-----|
//! | `POST` | `/api/citizen/document/upload` | `request_type`, `request_id`, `doc_type`, `file` | 5 MB |
//! | `POST` | `/api/citizen/upload-birth-certificate` | `request_id`, `file` | 2 MB |
//! | `POST` | `/api/agent/documents/upload` | `request_type`, `request_id`, `file` | 5 MB |
//! | `GET`  | `/api/documents/{id}/content` | | |

use std::collections::HashMap;

use axum::{
  extract::{Multipart, State, multipart::MultipartRejection},
  http::{StatusCode, header},
  response::IntoResponse,
};
use bytes::Bytes;
use civitas_core::{
  Error,
  account::Principal,
  authz::{self, Requirement},
  document::{self, Document, EXISTING_CERTIFICATE, FINAL_CERTIFICATE, NewDocument},
  gateway::PaymentGateway,
  request::RequestKind,
  status::RequestStatus,
  store::PortalStore,
  workflow,
};
use uuid::Uuid;

use crate::{
  AppState, CERTIFICATE_UPLOAD_LIMIT, UPLOAD_LIMIT,
  auth::CurrentUser,
  error::{ApiError, Envelope, multipart_error},
  extract::PathParam,
};

const DEFAULT_DOC_TYPE: &str = "supporting_document";

// ─── Multipart form ──────────────────────────────────────────────────────────

#[derive(Debug)]
struct UploadedFile {
  file_name:  String,
  media_type: String,
  bytes:      Bytes,
}

#[derive(Debug, Default)]
struct UploadForm {
  fields: HashMap<String, String>,
  file:   Option<UploadedFile>,
}

impl UploadForm {
  /// Drain `multipart`, keeping text fields and the `file` part.
  async fn read(multipart: &mut Multipart, limit: usize) -> Result<Self, ApiError> {
    let mut form = Self::default();
    while let Some(field) = multipart
      .next_field()
      .await
      .map_err(|e| multipart_error(e, limit))?
    {
      let Some(name) = field.name().map(str::to_owned) else { continue };
      if name == "file" {
        let file_name = field
          .file_name()
          .map(str::to_owned)
          .unwrap_or_else(|| "document".to_owned());
        let media_type = field
          .content_type()
          .map(str::to_owned)
          .unwrap_or_default();
        let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
        if bytes.len() > limit {
          return Err(ApiError::PayloadTooLarge(limit));
        }
        form.file = Some(UploadedFile { file_name, media_type, bytes });
      } else {
        let value = field.text().await.map_err(|e| multipart_error(e, limit))?;
        form.fields.insert(name, value);
      }
    }
    Ok(form)
  }

  fn field(&self, name: &str) -> Result<&str, ApiError> {
    self
      .fields
      .get(name)
      .map(|v| v.trim())
      .filter(|v| !v.is_empty())
      .ok_or_else(|| Error::validation(format!("le champ « {name} » est obligatoire")).into())
  }

  fn request_id(&self) -> Result<Uuid, ApiError> {
    Uuid::parse_str(self.field("request_id")?)
      .map_err(|_| Error::validation("identifiant de demande invalide").into())
  }

  fn request_kind(&self) -> Result<RequestKind, ApiError> {
    Ok(RequestKind::from_tag(self.field("request_type")?)?)
  }

  fn take_file(&mut self) -> Result<UploadedFile, ApiError> {
    self
      .file
      .take()
      .filter(|f| !f.bytes.is_empty())
      .ok_or_else(|| Error::validation("aucun fichier fourni").into())
  }
}

// ─── Shared upload path ──────────────────────────────────────────────────────

/// Check the caller may attach to the request, validate the file and store it.
async fn attach<S, G>(
  state: &AppState<S, G>,
  principal: &Principal,
  kind: RequestKind,
  request_id: Uuid,
  doc_type: String,
  file: UploadedFile,
) -> Result<(StatusCode, Envelope<Document>), ApiError>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let header =
    workflow::authorize_request_access(&*state.store, principal, kind, request_id).await?;
  if header.status != RequestStatus::Pending {
    return Err(Error::AlreadyProcessed.into());
  }

  let media_type = document::check_media_type(&file.media_type, &file.bytes)?;
  let storage_key = state.files.put(&file.bytes).await?;

  let document = state
    .store
    .add_document(NewDocument {
      request_kind: kind,
      request_id,
      doc_type,
      file_name: file.file_name,
      media_type: media_type.to_owned(),
      size_bytes: file.bytes.len() as u64,
      storage_key,
      uploaded_by: principal.account_id,
    })
    .await
    .map_err(Error::store)?;

  tracing::info!(
    document_id = %document.document_id,
    request_id = %request_id,
    doc_type = %document.doc_type,
    size = document.size_bytes,
    "document uploaded"
  );
  Ok((StatusCode::CREATED, Envelope::ok(document)))
}

// ─── Upload handlers ─────────────────────────────────────────────────────────

/// `POST /api/citizen/document/upload`
pub async fn citizen_upload<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let principal = user.principal();
  authz::require(&principal, Requirement::roles(authz::CITIZEN))?;

  let mut form = UploadForm::read(&mut multipart?, UPLOAD_LIMIT).await?;
  let kind = form.request_kind()?;
  let request_id = form.request_id()?;
  let doc_type = form
    .field("doc_type")
    .map(str::to_owned)
    .unwrap_or_else(|_| DEFAULT_DOC_TYPE.to_owned());
  if doc_type == FINAL_CERTIFICATE {
    return Err(
      Error::Forbidden("seul un agent peut joindre le document final".to_owned()).into(),
    );
  }
  let file = form.take_file()?;

  attach(&state, &principal, kind, request_id, doc_type, file).await
}

/// `POST /api/citizen/upload-birth-certificate`
pub async fn citizen_certificate_upload<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let principal = user.principal();
  authz::require(&principal, Requirement::roles(authz::CITIZEN))?;

  let mut form = UploadForm::read(&mut multipart?, CERTIFICATE_UPLOAD_LIMIT).await?;
  let request_id = form.request_id()?;
  let file = form.take_file()?;

  attach(
    &state,
    &principal,
    RequestKind::BirthCertificate,
    request_id,
    EXISTING_CERTIFICATE.to_owned(),
    file,
  )
  .await
}

/// `POST /api/agent/documents/upload`
///
/// Attaches the final certificate document.
pub async fn agent_upload<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let principal = user.principal();
  authz::require(&principal, Requirement::roles(authz::STAFF))?;

  let mut form = UploadForm::read(&mut multipart?, UPLOAD_LIMIT).await?;
  let kind = form.request_kind()?;
  let request_id = form.request_id()?;
  let file = form.take_file()?;

  attach(&state, &principal, kind, request_id, FINAL_CERTIFICATE.to_owned(), file).await
}

// ─── Content ─────────────────────────────────────────────────────────────────

/// `GET /api/documents/{id}/content`
///
/// Serves the raw bytes with the stored media type.
pub async fn content<S, G>(
  State(state): State<AppState<S, G>>,
  user: CurrentUser,
  PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PortalStore + 'static,
  G: PaymentGateway + 'static,
{
  let document = state
    .store
    .get_document(id)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::NotFound(format!("document {id}")))?;
  workflow::authorize_request_access(
    &*state.store,
    &user.principal(),
    document.request_kind,
    document.request_id,
  )
  .await?;

  let bytes = state
    .files
    .get(&document.storage_key)
    .await?
    .ok_or_else(|| Error::NotFound(format!("contenu du document {id}")))?;

  let file_name: String = document
    .file_name
    .chars()
    .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
    .filter(|c| *c != '"' && *c != '\\')
    .collect();
  Ok((
    [
      (header::CONTENT_TYPE, document.media_type),
      (header::CONTENT_DISPOSITION, format!("inline; filename=\"{file_name}\"")),
    ],
    bytes,
  ))
}
