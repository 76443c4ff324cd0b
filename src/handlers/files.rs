//! File-level API handlers: upload, download-link issuance, token
//! redemption, listing, and deletion.
//!
//! Upload is restricted to ops users and to the three Office Open XML
//! formats; both the filename extension and the magic bytes of the
//! payload have to agree before anything touches disk.

use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use metrics::counter;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{self, AuthenticatedUser};
use crate::errors::ApiError;
use crate::metadata::store::{FileRecord, FileUpdate, MetadataStore};
use crate::storage::backend::BlobStore;
use crate::metrics::{
    BYTES_DOWNLOADED_TOTAL, BYTES_UPLOADED_TOTAL, DOWNLOADS_TOTAL, UPLOADS_TOTAL,
};
use crate::AppState;

// -- Content validation -------------------------------------------------------

/// Accepted upload formats: extension paired with the MIME type the
/// payload must sniff as.
const ALLOWED_FILE_TYPES: &[(&str, &str)] = &[
    (
        ".docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    (
        ".pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    (
        ".xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
];

/// Whether the filename carries one of the accepted extensions.
fn is_allowed_file_type(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    ALLOWED_FILE_TYPES.iter().any(|(ext, _)| lower.ends_with(ext))
}

/// Sniff the payload's magic bytes and return the matching accepted MIME
/// type, or `None` when the content is not one of the Office formats.
fn sniff_office_mime(data: &[u8]) -> Option<&'static str> {
    let kind = infer::get(data)?;
    ALLOWED_FILE_TYPES
        .iter()
        .find(|(_, mime)| *mime == kind.mime_type())
        .map(|(_, mime)| *mime)
}

/// Reduce a client-supplied filename to its final path component.
fn sanitize_filename(raw: &str) -> Result<String, ApiError> {
    let name = std::path::Path::new(raw)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string);
    match name {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(ApiError::bad_request("invalid filename")),
    }
}

/// Build a Content-Disposition header value that survives non-ASCII
/// filenames (RFC 6266 encoded form plus an ASCII fallback).
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let encoded = utf8_percent_encode(filename, NON_ALPHANUMERIC);
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

// -- Request / response types -------------------------------------------------

/// Public view of a stored file.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct FileResponse {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub file_size: u64,
    pub uploaded_by: String,
    pub access_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<FileRecord> for FileResponse {
    fn from(record: FileRecord) -> Self {
        Self {
            id: record.file_id.to_string(),
            filename: record.filename,
            content_type: record.content_type,
            file_size: record.size,
            uploaded_by: record.owner_id.to_string(),
            access_token: record.access_token,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// A freshly issued download link.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DownloadLinkResponse {
    pub download_link: String,
    pub message: String,
}

/// Access token presented on redemption.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct DownloadQuery {
    /// The capability token embedded in the download link.
    pub token: String,
}

// -- Handlers -----------------------------------------------------------------

/// `POST /files/upload` -- Accept an Office document from an ops user.
#[utoipa::path(
    post,
    path = "/files/upload",
    tag = "Files",
    operation_id = "UploadFile",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "File stored", body = FileResponse),
        (status = 400, description = "Disallowed extension or content"),
        (status = 403, description = "Caller is not an ops user")
    )
)]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedUser>,
    mut multipart: Multipart,
) -> Result<Json<FileResponse>, ApiError> {
    caller.require_ops()?;

    // Pull the `file` part out of the multipart body.
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .map(str::to_string)
                .ok_or_else(|| ApiError::bad_request("file part carries no filename"))?;
            let declared_type = field
                .content_type()
                .map(str::to_string)
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("failed to read file part: {e}")))?;
            upload = Some((filename, declared_type, data));
            break;
        }
    }
    let Some((raw_filename, declared_type, data)) = upload else {
        return Err(ApiError::bad_request("missing file part"));
    };

    let filename = sanitize_filename(&raw_filename)?;
    if !is_allowed_file_type(&filename) {
        let allowed: Vec<&str> = ALLOWED_FILE_TYPES.iter().map(|(ext, _)| *ext).collect();
        return Err(ApiError::bad_request(format!(
            "only {} files are allowed",
            allowed.join(", ")
        )));
    }
    if sniff_office_mime(&data).is_none() {
        return Err(ApiError::bad_request("invalid file content type"));
    }

    // Random prefix keeps uploads with the same name from colliding.
    let storage_key = format!("{}_{}", hex::encode(rand::random::<[u8; 8]>()), filename);
    let content_hash = state.storage.put(&storage_key, data.clone()).await?;
    tracing::debug!(key = %storage_key, hash = %content_hash, "blob stored");

    let now = now_rfc3339();
    let record = FileRecord {
        file_id: Uuid::new_v4(),
        filename,
        content_type: declared_type,
        size: data.len() as u64,
        storage_key,
        owner_id: caller.user.user_id,
        access_token: None,
        created_at: now.clone(),
        updated_at: now,
    };
    state.metadata.create_file(record.clone()).await?;

    counter!(UPLOADS_TOTAL).increment(1);
    counter!(BYTES_UPLOADED_TOTAL).increment(data.len() as u64);
    tracing::info!(
        file_id = %record.file_id,
        filename = %record.filename,
        size = record.size,
        by = %caller.user.email,
        "file uploaded"
    );

    Ok(Json(FileResponse::from(record)))
}

/// `GET /files/download/{file_id}` -- Issue a fresh download link.
///
/// Issuing replaces any previously issued token for the file, which
/// stops resolving immediately.
#[utoipa::path(
    get,
    path = "/files/download/{file_id}",
    tag = "Files",
    operation_id = "GenerateDownloadLink",
    params(("file_id" = Uuid, Path, description = "File identifier")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Download link issued", body = DownloadLinkResponse),
        (status = 404, description = "File not found")
    )
)]
pub async fn generate_download_link(
    State(state): State<Arc<AppState>>,
    Extension(_caller): Extension<AuthenticatedUser>,
    Path(file_id): Path<Uuid>,
) -> Result<Json<DownloadLinkResponse>, ApiError> {
    let file = state
        .metadata
        .get_file_by_id(file_id)
        .await?
        .ok_or_else(|| ApiError::not_found("file not found"))?;

    let access_token = auth::generate_access_token();
    state
        .metadata
        .update_file(
            file.file_id,
            FileUpdate {
                access_token: Some(access_token.clone()),
            },
        )
        .await?;

    let download_link = format!(
        "{}/files/download?token={}",
        state.config.server.public_url, access_token
    );
    Ok(Json(DownloadLinkResponse {
        download_link,
        message: "success".to_string(),
    }))
}

/// `GET /files/download?token=` -- Redeem an access token for the file
/// it names. The token, not the caller's identity, selects the file;
/// any authenticated caller holding it may download.
#[utoipa::path(
    get,
    path = "/files/download",
    tag = "Files",
    operation_id = "DownloadFile",
    params(DownloadQuery),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "File contents"),
        (status = 404, description = "Unknown token or missing blob")
    )
)]
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Extension(_caller): Extension<AuthenticatedUser>,
    Query(params): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let file = state
        .metadata
        .get_file_by_access_token(&params.token)
        .await?
        .ok_or_else(|| ApiError::not_found("file not found or access denied"))?;

    if !state.storage.exists(&file.storage_key).await? {
        return Err(ApiError::not_found("file not found in storage"));
    }
    let blob = state.storage.get(&file.storage_key).await?;

    counter!(DOWNLOADS_TOTAL).increment(1);
    counter!(BYTES_DOWNLOADED_TOTAL).increment(blob.data.len() as u64);
    tracing::debug!(file_id = %file.file_id, filename = %file.filename, "file served");

    Ok((
        StatusCode::OK,
        [
            ("content-type", file.content_type),
            ("content-disposition", content_disposition(&file.filename)),
        ],
        blob.data,
    )
        .into_response())
}

/// `GET /files/list` -- The caller's own uploads, newest first.
#[utoipa::path(
    get,
    path = "/files/list",
    tag = "Files",
    operation_id = "ListFiles",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Files uploaded by the caller", body = [FileResponse])
    )
)]
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<FileResponse>>, ApiError> {
    let files = state
        .metadata
        .list_files_by_owner(caller.user.user_id)
        .await?;
    Ok(Json(files.into_iter().map(FileResponse::from).collect()))
}

/// `DELETE /files/{file_id}` -- Remove a file record and its blob.
///
/// The record is deleted first and is the source of truth; blob removal
/// is best-effort and a failure there is logged, not surfaced.
#[utoipa::path(
    delete,
    path = "/files/{file_id}",
    tag = "Files",
    operation_id = "DeleteFile",
    params(("file_id" = Uuid, Path, description = "File identifier")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "File deleted", body = FileResponse),
        (status = 403, description = "Caller is not an ops user"),
        (status = 404, description = "File not found")
    )
)]
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedUser>,
    Path(file_id): Path<Uuid>,
) -> Result<Json<FileResponse>, ApiError> {
    caller.require_ops()?;

    let record = state
        .metadata
        .delete_file(file_id)
        .await?
        .ok_or_else(|| ApiError::not_found("file not found"))?;

    if let Err(e) = state.storage.delete(&record.storage_key).await {
        tracing::warn!(
            file_id = %record.file_id,
            key = %record.storage_key,
            error = %e,
            "blob removal failed after record deletion"
        );
    }

    tracing::info!(file_id = %record.file_id, by = %caller.user.email, "file deleted");
    Ok(Json(FileResponse::from(record)))
}

/// Get current time as an RFC 3339 string with millisecond precision.
fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// -- Tests --------------------------------------------------------------------
