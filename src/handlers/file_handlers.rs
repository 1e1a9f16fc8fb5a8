//! HTTP handlers for file upload, download, listing and deletion.
//! Uploads arrive as base64 inside JSON; downloads are served as raw bytes
//! with a Content-Type inferred from the file extension.

use crate::{
    content_type::content_type_for,
    errors::AppError,
    handlers::bucket_handlers::MessageResponse,
    services::blob_store::BlobStore,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Request body for `POST /buckets/{bucket}/files`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertFileReq {
    #[serde(default)]
    pub file_name: String,
    /// Standard (padded) base64 of the file contents.
    #[serde(default)]
    pub file_data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNamesResponse {
    pub file_names: Vec<String>,
}

/// POST `/buckets/{bucket}/files`: upload one file.
pub async fn insert_file(
    State(store): State<BlobStore>,
    Path(bucket): Path<String>,
    payload: Result<Json<InsertFileReq>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;
    if req.file_name.is_empty() || req.file_data.is_empty() {
        return Err(AppError::bad_request(
            "File name and file data cannot be empty.",
        ));
    }

    let data = general_purpose::STANDARD
        .decode(&req.file_data)
        .map_err(|_| AppError::bad_request("Invalid Base64 encoding for fileData."))?;

    info!(
        "Attempting to insert file '{}' into bucket '{}'",
        req.file_name, bucket
    );
    store.insert_file(&bucket, &req.file_name, &data).await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: format!(
                "File '{}' inserted successfully into bucket '{}'.",
                req.file_name, bucket
            ),
        }),
    ))
}

/// GET `/buckets/{bucket}/files`: list file names in upload order.
pub async fn list_files(
    State(store): State<BlobStore>,
    Path(bucket): Path<String>,
) -> Result<Json<FileNamesResponse>, AppError> {
    let file_names = store.list_files(&bucket).await?;
    Ok(Json(FileNamesResponse { file_names }))
}

/// GET `/buckets/{bucket}/files/{file_name}`: serve the raw bytes.
///
/// Errors are rendered as JSON before any body byte is produced.
pub async fn get_file(
    State(store): State<BlobStore>,
    Path((bucket, file_name)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let data = store.get_file(&bucket, &file_name).await?;
    let content_type = content_type_for(&file_name);
    let length = data.len();

    let mut response = Response::new(Body::from(Bytes::from(data)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    debug!(
        "Serving file '{}' from bucket '{}' with Content-Type: {}",
        file_name, bucket, content_type
    );
    Ok(response)
}

/// DELETE `/buckets/{bucket}/files/{file_name}`: remove every file with that name.
pub async fn delete_file(
    State(store): State<BlobStore>,
    Path((bucket, file_name)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    store.delete_file(&bucket, &file_name).await?;
    Ok(StatusCode::NO_CONTENT)
}
