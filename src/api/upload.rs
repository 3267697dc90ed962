//! Upload endpoint for image and file content
//!
//! - POST /course/upload/{kind} - kind is `image` or `file`
//!
//! Stored files are served back under `/media/`. The returned path is what
//! an Image or File content item takes as its `file` field.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::path::Path as FsPath;
use tokio::fs;
use uuid::Uuid;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::config::UploadConfig;
use crate::models::ContentKind;
use crate::services::render::MEDIA_URL;

/// Response for a stored upload
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Path relative to the media root
    pub file: String,
    pub url: String,
    pub size: u64,
    pub content_type: String,
}

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(config: &UploadConfig) -> Router<AppState> {
    let limit = usize::try_from(config.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/upload/{kind}", post(upload))
        .layer(DefaultBodyLimit::max(limit))
}

/// POST /course/upload/{kind}
///
/// Accepts multipart/form-data with a single field named "file".
async fn upload(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(kind): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    if !user.0.can_manage_courses() {
        return Err(ApiError::forbidden("Only instructors can upload course material"));
    }
    let (kind, subdir) = match kind.parse::<ContentKind>() {
        Ok(ContentKind::Image) => (ContentKind::Image, "images"),
        Ok(ContentKind::File) => (ContentKind::File, "files"),
        _ => return Err(ApiError::not_found(format!("Unknown upload kind: {}", kind))),
    };

    let config = &state.upload_config;
    let target_dir = config.path.join(subdir);
    ensure_upload_dir(&target_dir).await?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        if kind == ContentKind::Image && !config.is_image_type_allowed(&content_type) {
            return Err(ApiError::validation_error(format!(
                "Invalid image type: {}. Allowed types: {:?}",
                content_type, config.allowed_image_types
            )));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;

        if data.len() as u64 > config.max_file_size {
            return Err(ApiError::validation_error(format!(
                "File too large. Maximum size: {} bytes",
                config.max_file_size
            )));
        }

        let stored = format!("{}.{}", Uuid::new_v4(), get_extension(&filename, &content_type));
        fs::write(target_dir.join(&stored), &data).await.map_err(|e| {
            tracing::error!("Failed to save upload {}: {}", stored, e);
            ApiError::internal_error("Failed to save file")
        })?;

        let relative = format!("{}/{}", subdir, stored);
        tracing::info!(user_id = user.0.id, size = data.len(), "Stored upload {}", relative);
        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                url: format!("{}{}", MEDIA_URL, relative),
                file: relative,
                size: data.len() as u64,
                content_type,
            }),
        ));
    }

    Err(ApiError::validation_error("No file provided"))
}

async fn ensure_upload_dir(path: &FsPath) -> Result<(), ApiError> {
    fs::create_dir_all(path).await.map_err(|e| {
        tracing::error!("Failed to create upload dir {}: {}", path.display(), e);
        ApiError::internal_error("Failed to create upload directory")
    })
}

/// Extensions a browser would execute when served from `/media`
const ACTIVE_EXTENSIONS: &[&str] = &["svg", "svgz", "htm", "html", "xhtml", "xml", "js", "mjs"];

/// File extension from the original name, else from the content type
fn get_extension(filename: &str, content_type: &str) -> String {
    if let Some((_, ext)) = filename.rsplit_once('.') {
        let ext = ext.to_lowercase();
        if !ext.is_empty()
            && ext.len() < 10
            && ext.chars().all(|c| c.is_ascii_alphanumeric())
            && !ACTIVE_EXTENSIONS.contains(&ext.as_str())
        {
            return ext;
        }
    }

    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "application/pdf" => "pdf",
        "text/plain" => "txt",
        _ => "bin",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_extension() {
        assert_eq!(get_extension("Slides.PDF", "application/octet-stream"), "pdf");
        assert_eq!(get_extension("photo", "image/png"), "png");
        assert_eq!(get_extension("archive.tar/../x", "text/plain"), "txt");
        assert_eq!(get_extension("noext.", "application/zip"), "bin");
        assert_eq!(get_extension("logo.SVG", "image/svg+xml"), "bin");
        assert_eq!(get_extension("page.html", "text/html"), "bin");
    }
}
