//! HTTP handlers for bucket lifecycle and enumeration.

use crate::{errors::AppError, services::blob_store::BlobStore};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Request body for `POST /buckets/create`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBucketReq {
    #[serde(default)]
    pub bucket_name: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct BucketsResponse {
    pub buckets: Vec<String>,
}

/// POST `/buckets/create`: create a bucket (idempotent).
pub async fn create_bucket(
    State(store): State<BlobStore>,
    payload: Result<Json<CreateBucketReq>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;
    if req.bucket_name.is_empty() {
        return Err(AppError::bad_request("Bucket name cannot be empty."));
    }

    info!("Attempting to create bucket: {}", req.bucket_name);
    store.create_bucket(&req.bucket_name).await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: format!("Bucket '{}' created successfully.", req.bucket_name),
        }),
    ))
}

/// GET `/buckets`: list bucket names.
pub async fn list_buckets(State(store): State<BlobStore>) -> Result<Json<BucketsResponse>, AppError> {
    let buckets = store.list_buckets().await?;
    Ok(Json(BucketsResponse { buckets }))
}

/// DELETE `/buckets/{bucket}`: drop a bucket and all of its files.
pub async fn delete_bucket(
    State(store): State<BlobStore>,
    Path(bucket): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    info!("Attempting to delete bucket: {}", bucket);
    store.delete_bucket(&bucket).await?;
    Ok(StatusCode::NO_CONTENT)
}
