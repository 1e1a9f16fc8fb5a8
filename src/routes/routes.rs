//! Defines routes for all bucket and file operations.
//!
//! ## Structure
//! - **Bucket-level endpoints**
//!   - `POST   /buckets/create`: create bucket (`{bucketName}`)
//!   - `GET    /buckets`: list buckets
//!   - `DELETE /buckets/{bucket}`: delete bucket and its files
//!
//! - **File-level endpoints**
//!   - `POST   /buckets/{bucket}/files`: upload file (`{fileName, fileData}`)
//!   - `GET    /buckets/{bucket}/files`: list file names
//!   - `GET    /buckets/{bucket}/files/{file_name}`: download raw bytes
//!   - `DELETE /buckets/{bucket}/files/{file_name}`: delete every file with that name
//!
//! The static `/buckets/create` segment takes precedence over `{bucket}`, so
//! a bucket literally named `create` cannot be deleted over HTTP.

use crate::{
    errors::AppError,
    handlers::{
        bucket_handlers::{create_bucket, delete_bucket, list_buckets},
        file_handlers::{delete_file, get_file, insert_file, list_files},
        health_handlers::{healthz, readyz},
    },
    services::blob_store::BlobStore,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};

/// Build and return the router for all blob store routes.
///
/// The router carries shared state (`BlobStore`) to all handlers.
/// `max_body_bytes` bounds upload requests, which carry whole files as base64.
pub fn routes(max_body_bytes: usize) -> Router<BlobStore> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Bucket-level routes
        .route("/buckets", get(list_buckets))
        .route("/buckets/create", post(create_bucket))
        .route("/buckets/{bucket}", delete(delete_bucket))
        // File-level routes
        .route("/buckets/{bucket}/files", post(insert_file).get(list_files))
        .route(
            "/buckets/{bucket}/files/{file_name}",
            get(get_file).delete(delete_file),
        )
        .fallback(fallback)
        .layer(DefaultBodyLimit::max(max_body_bytes))
}

/// Unknown routes still answer with the JSON error envelope.
async fn fallback() -> AppError {
    AppError::not_found("The requested resource was not found.")
}
