//! High-level storage operations.

use tracing::info;
use uuid::Uuid;

use adreel_models::{TeamId, VideoId};

use crate::client::R2Client;
use crate::error::StorageResult;
use crate::keys;

impl R2Client {
    /// Store an uploaded product image under the team's image prefix.
    ///
    /// Returns the object key the caller should reference in generation
    /// requests.
    pub async fn store_product_image(
        &self,
        team_id: &TeamId,
        filename: &str,
        data: Vec<u8>,
    ) -> StorageResult<String> {
        let ext = keys::image_extension(filename)?;
        let content_type = keys::image_content_type(&ext);
        let key = keys::image_key(team_id, &Uuid::new_v4().to_string(), &ext);

        self.upload_bytes(data, &key, content_type).await?;
        info!(team_id = %team_id, key = %key, "Stored product image");
        Ok(key)
    }

    /// Archive a rendered segment downloaded from the vendor.
    pub async fn archive_segment(
        &self,
        team_id: &TeamId,
        video_id: &VideoId,
        index: u32,
        data: Vec<u8>,
    ) -> StorageResult<String> {
        let key = keys::segment_key(team_id, video_id, index);
        self.upload_bytes(data, &key, "video/mp4").await?;
        Ok(key)
    }

    /// Archive the merged final video.
    pub async fn archive_final_video(
        &self,
        team_id: &TeamId,
        video_id: &VideoId,
        data: Vec<u8>,
    ) -> StorageResult<String> {
        let key = keys::final_video_key(team_id, video_id);
        self.upload_bytes(data, &key, "video/mp4").await?;
        info!(team_id = %team_id, video_id = %video_id, "Archived final video");
        Ok(key)
    }

    /// Delete every object belonging to a video.
    pub async fn delete_video_files(
        &self,
        team_id: &TeamId,
        video_id: &VideoId,
    ) -> StorageResult<u32> {
        let prefix = keys::video_prefix(team_id, video_id);
        let objects = self.list_objects(&prefix).await?;

        if objects.is_empty() {
            info!(team_id = %team_id, video_id = %video_id, "No files to delete");
            return Ok(0);
        }

        let object_keys: Vec<_> = objects.into_iter().map(|o| o.key).collect();
        self.delete_objects(&object_keys).await
    }
}
