//! Product image upload handlers.
//!
//! Two intake paths feed the same place: a direct multipart upload, and a
//! server-side fetch of an image URL. Both land the bytes under the owning
//! team's image prefix and hand back the storage key that generation
//! requests reference.

use std::time::{Duration, Instant};

use axum::extract::{Multipart, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::security::validate_image_url;
use crate::state::AppState;

/// Cap on server-side image fetches. Mirrors the multipart body limit.
const MAX_FETCH_BYTES: usize = 15 * 1024 * 1024;

/// Timeout for fetching a remote image.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Upload response.
#[derive(Serialize)]
pub struct UploadResponse {
    pub image_key: String,
    pub team_id: String,
    pub size_bytes: u64,
}

/// Upload a product image (multipart form).
///
/// Accepts an optional `team_id` text field and a `file` field. Without a
/// team the image lands in the caller's personal team.
pub async fn upload_image(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let started = Instant::now();

    let mut team_id: Option<String> = None;
    let mut filename: Option<String> = None;
    let mut data: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        match field.name() {
            Some("team_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid team_id field: {}", e)))?;
                if !value.trim().is_empty() {
                    team_id = Some(value.trim().to_string());
                }
            }
            Some("file") => {
                filename = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid file field: {}", e)))?;
                data = Some(bytes.to_vec());
            }
            _ => {
                // Unknown fields are skipped, not rejected
            }
        }
    }

    let filename = filename.ok_or_else(|| ApiError::bad_request("Missing file field"))?;
    let data = data.ok_or_else(|| ApiError::bad_request("Missing file field"))?;
    if data.is_empty() {
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }

    let team = state
        .teams
        .resolve_team(&user.uid, user.email.as_deref(), team_id.as_deref())
        .await?;

    let size_bytes = data.len() as u64;
    let image_key = state
        .storage
        .store_product_image(&team.team_id, &filename, data)
        .await
        .map_err(|e| match e {
            adreel_storage::StorageError::UnsupportedImageType(ext) => {
                ApiError::bad_request(format!("Unsupported image type: {}", ext))
            }
            other => ApiError::Storage(other),
        })?;

    metrics::record_upload("multipart", size_bytes, started.elapsed().as_secs_f64());
    info!(
        uid = %user.uid,
        team_id = %team.team_id,
        key = %image_key,
        bytes = size_bytes,
        "Uploaded product image"
    );

    Ok(Json(UploadResponse {
        image_key,
        team_id: team.team_id.to_string(),
        size_bytes,
    }))
}

/// Fetch-by-URL request.
#[derive(Debug, Deserialize)]
pub struct FetchUploadRequest {
    /// Publicly reachable image URL
    pub url: String,
    /// Target team; defaults to the caller's personal team
    #[serde(default)]
    pub team_id: Option<String>,
}

/// Fetch an image from a URL into storage.
///
/// The URL is validated against internal address ranges before any request
/// leaves the service.
pub async fn fetch_image(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<FetchUploadRequest>,
) -> ApiResult<Json<UploadResponse>> {
    let started = Instant::now();

    let url = validate_image_url(&request.url)
        .into_result()
        .map_err(|e| ApiError::bad_request(format!("Invalid image URL: {}", e)))?;

    let team = state
        .teams
        .resolve_team(&user.uid, user.email.as_deref(), request.team_id.as_deref())
        .await?;

    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| ApiError::internal(format!("HTTP client error: {}", e)))?;

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to fetch image: {}", e)))?;

    if !response.status().is_success() {
        return Err(ApiError::bad_request(format!(
            "Image fetch returned {}",
            response.status()
        )));
    }

    if let Some(length) = response.content_length() {
        if length as usize > MAX_FETCH_BYTES {
            return Err(ApiError::bad_request(format!(
                "Image too large: {} bytes (max {})",
                length, MAX_FETCH_BYTES
            )));
        }
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let data = response
        .bytes()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read image body: {}", e)))?
        .to_vec();

    if data.is_empty() {
        return Err(ApiError::bad_request("Fetched image is empty"));
    }
    if data.len() > MAX_FETCH_BYTES {
        return Err(ApiError::bad_request(format!(
            "Image too large: {} bytes (max {})",
            data.len(),
            MAX_FETCH_BYTES
        )));
    }

    let filename = filename_for_fetch(&url, content_type.as_deref());

    let size_bytes = data.len() as u64;
    let image_key = state
        .storage
        .store_product_image(&team.team_id, &filename, data)
        .await
        .map_err(|e| match e {
            adreel_storage::StorageError::UnsupportedImageType(ext) => {
                warn!(uid = %user.uid, url = %url, "Rejected fetched image type: {}", ext);
                ApiError::bad_request(format!("Unsupported image type: {}", ext))
            }
            other => ApiError::Storage(other),
        })?;

    metrics::record_upload("fetch", size_bytes, started.elapsed().as_secs_f64());
    info!(
        uid = %user.uid,
        team_id = %team.team_id,
        key = %image_key,
        bytes = size_bytes,
        "Fetched product image"
    );

    Ok(Json(UploadResponse {
        image_key,
        team_id: team.team_id.to_string(),
        size_bytes,
    }))
}

/// Derive a filename for a fetched image so extension validation applies.
///
/// Prefers the URL path's extension; falls back to the response content type.
fn filename_for_fetch(url: &str, content_type: Option<&str>) -> String {
    let path_name = url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.last().map(|s| s.to_string()))
        })
        .filter(|name| name.contains('.'));

    if let Some(name) = path_name {
        return name;
    }

    let ext = match content_type {
        Some(ct) if ct.starts_with("image/png") => "png",
        Some(ct) if ct.starts_with("image/jpeg") => "jpg",
        Some(ct) if ct.starts_with("image/webp") => "webp",
        _ => "bin",
    };
    format!("fetched.{}", ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_url_path() {
        assert_eq!(
            filename_for_fetch("https://cdn.example.com/products/shoe.png", None),
            "shoe.png"
        );
        assert_eq!(
            filename_for_fetch("https://cdn.example.com/a/b/photo.JPEG?v=2", None),
            "photo.JPEG"
        );
    }

    #[test]
    fn test_filename_falls_back_to_content_type() {
        assert_eq!(
            filename_for_fetch("https://cdn.example.com/image", Some("image/webp")),
            "fetched.webp"
        );
        assert_eq!(
            filename_for_fetch("https://cdn.example.com/image", Some("image/jpeg; charset=binary")),
            "fetched.jpg"
        );
    }

    #[test]
    fn test_unknown_content_type_yields_invalid_extension() {
        // store_product_image rejects this downstream
        assert_eq!(
            filename_for_fetch("https://cdn.example.com/blob", Some("application/pdf")),
            "fetched.bin"
        );
    }
}
