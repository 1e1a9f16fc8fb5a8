//! Content-Type lookup by file extension for served files.

use std::path::Path;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const CONTENT_TYPES: &[(&str, &str)] = &[
    // images
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    // audio
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("aac", "audio/aac"),
    // video
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("ogv", "video/ogg"),
    // documents
    ("pdf", "application/pdf"),
    ("txt", "text/plain"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("mjs", "application/javascript"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("csv", "text/csv"),
    // archives
    ("zip", "application/zip"),
    ("tar", "application/x-tar"),
    ("gz", "application/gzip"),
];

/// Infer a Content-Type from the extension of `file_name`, case-insensitively.
pub fn content_type_for(file_name: &str) -> &'static str {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| {
            CONTENT_TYPES
                .iter()
                .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        })
        .map(|(_, content_type)| *content_type)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}
