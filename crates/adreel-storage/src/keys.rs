//! Object key layout for the bucket.
//!
//! Everything is scoped under the owning team:
//!
//! - `teams/{team_id}/images/{uuid}.{ext}`: uploaded product images
//! - `teams/{team_id}/videos/{video_id}/segments/{index:03}.mp4`: archived segment renders
//! - `teams/{team_id}/videos/{video_id}/final.mp4`: archived merged video

use adreel_models::{TeamId, VideoId};

use crate::error::{StorageError, StorageResult};

/// Image extensions accepted for product uploads.
pub const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Extract and validate the extension of an uploaded image filename.
pub fn image_extension(filename: &str) -> StorageResult<String> {
    let ext = filename
        .rsplit('.')
        .next()
        .filter(|e| *e != filename)
        .map(|e| e.to_lowercase())
        .ok_or_else(|| StorageError::UnsupportedImageType(filename.to_string()))?;

    if !ALLOWED_IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return Err(StorageError::UnsupportedImageType(ext));
    }
    Ok(ext)
}

/// Content type for a validated image extension.
pub fn image_content_type(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Key for an uploaded product image.
pub fn image_key(team_id: &TeamId, image_id: &str, ext: &str) -> String {
    format!("teams/{}/images/{}.{}", team_id.as_str(), image_id, ext)
}

/// Key for an archived segment render.
pub fn segment_key(team_id: &TeamId, video_id: &VideoId, index: u32) -> String {
    format!(
        "teams/{}/videos/{}/segments/{:03}.mp4",
        team_id.as_str(),
        video_id.as_str(),
        index
    )
}

/// Key for the archived final video.
pub fn final_video_key(team_id: &TeamId, video_id: &VideoId) -> String {
    format!(
        "teams/{}/videos/{}/final.mp4",
        team_id.as_str(),
        video_id.as_str()
    )
}

/// Prefix covering every object belonging to a video.
pub fn video_prefix(team_id: &TeamId, video_id: &VideoId) -> String {
    format!("teams/{}/videos/{}/", team_id.as_str(), video_id.as_str())
}

/// Verify that a client-supplied image key belongs to the given team.
///
/// Generation requests reference images by key; this stops a request from
/// pointing a render at another team's objects.
pub fn validate_image_key(team_id: &TeamId, key: &str) -> StorageResult<()> {
    let expected_prefix = format!("teams/{}/images/", team_id.as_str());
    if !key.starts_with(&expected_prefix) || key.contains("..") {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (TeamId, VideoId) {
        (TeamId::from_string("t1"), VideoId::from_string("v1"))
    }

    #[test]
    fn test_key_layout() {
        let (team, video) = ids();
        assert_eq!(image_key(&team, "img-1", "png"), "teams/t1/images/img-1.png");
        assert_eq!(
            segment_key(&team, &video, 2),
            "teams/t1/videos/v1/segments/002.mp4"
        );
        assert_eq!(final_video_key(&team, &video), "teams/t1/videos/v1/final.mp4");
        assert_eq!(video_prefix(&team, &video), "teams/t1/videos/v1/");
    }

    #[test]
    fn test_image_extension_validation() {
        assert_eq!(image_extension("photo.PNG").unwrap(), "png");
        assert_eq!(image_extension("a.b.jpeg").unwrap(), "jpeg");
        assert!(image_extension("archive.zip").is_err());
        assert!(image_extension("noextension").is_err());
    }

    #[test]
    fn test_image_content_types() {
        assert_eq!(image_content_type("png"), "image/png");
        assert_eq!(image_content_type("jpg"), "image/jpeg");
        assert_eq!(image_content_type("webp"), "image/webp");
    }

    #[test]
    fn test_validate_image_key_scoping() {
        let (team, _) = ids();
        assert!(validate_image_key(&team, "teams/t1/images/x.png").is_ok());
        assert!(validate_image_key(&team, "teams/t2/images/x.png").is_err());
        assert!(validate_image_key(&team, "teams/t1/images/../../t2/x.png").is_err());
        assert!(validate_image_key(&team, "x.png").is_err());
    }
}
