//! Video repository: team-scoped video documents with embedded segments.
//!
//! Videos live at `teams/{team_id}/videos/{video_id}`. The segment array is
//! embedded in the video document, so segment updates rewrite the whole
//! array under an updateTime precondition. Webhooks and the worker can both
//! touch a video concurrently; every terminal transition goes through a
//! read-check-write loop so late arrivals land on a terminal status as
//! no-ops instead of resurrecting the video.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info, warn};

use adreel_models::{Segment, SegmentStatus, TeamId, VideoId, VideoRecord, VideoStatus};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{
    ArrayValue, CollectionSelector, Cursor, FieldReference, FromFirestoreValue, MapValue, Order,
    StructuredQuery, ToFirestoreValue, Value,
};

/// Maximum retries for optimistic concurrency updates.
const MAX_TRANSITION_RETRIES: u32 = 5;

/// Base delay between optimistic retries (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 50;

// ============================================================================
// Pagination
// ============================================================================

pub const DEFAULT_PAGE_SIZE: u32 = 25;
pub const MAX_PAGE_SIZE: u32 = 100;

const CURSOR_SEPARATOR: &str = "|";

/// Clamp a requested page size to the allowed range.
pub fn normalize_page_size(limit: Option<u32>) -> i32 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE) as i32
}

/// Opaque cursor for created-at ordered pagination.
///
/// Encodes the sort value and the document path of the last row, so the
/// next query can start just after it.
#[derive(Debug, Clone)]
pub struct PageCursor {
    pub created_at: String,
    pub doc_path: String,
}

impl PageCursor {
    /// Encode to a URL-safe string.
    pub fn encode(&self) -> String {
        let raw = format!("{}{}{}", self.created_at, CURSOR_SEPARATOR, self.doc_path);
        urlencoding::encode(&raw).into_owned()
    }

    /// Decode from a URL-encoded string.
    pub fn decode(encoded: &str) -> Option<Self> {
        let decoded = urlencoding::decode(encoded).ok()?;
        let (created_at, doc_path) = decoded.split_once(CURSOR_SEPARATOR)?;

        // The doc path must look like a Firestore document reference.
        if !doc_path.contains("/documents/") {
            return None;
        }

        Some(Self {
            created_at: created_at.to_string(),
            doc_path: doc_path.to_string(),
        })
    }
}

/// One page of a team's videos, newest first.
#[derive(Debug)]
pub struct VideoPage {
    pub videos: Vec<VideoRecord>,
    pub next_cursor: Option<String>,
}

// ============================================================================
// Repository
// ============================================================================

/// Repository for a single team's video documents.
pub struct VideoRepository {
    client: FirestoreClient,
    team_id: TeamId,
}

impl VideoRepository {
    pub fn new(client: FirestoreClient, team_id: TeamId) -> Self {
        Self { client, team_id }
    }

    fn collection(&self) -> String {
        format!("teams/{}/videos", self.team_id.as_str())
    }

    fn parent_path(&self) -> String {
        format!("teams/{}", self.team_id.as_str())
    }

    /// Create a new video record.
    pub async fn create(&self, video: &VideoRecord) -> FirestoreResult<()> {
        let fields = video_record_to_fields(video);
        self.client
            .create_document(&self.collection(), video.video_id.as_str(), fields)
            .await?;
        info!(
            video_id = %video.video_id,
            team_id = %video.team_id,
            segments = video.segments.len(),
            "Created video record"
        );
        Ok(())
    }

    /// Get a video by ID.
    pub async fn get(&self, video_id: &VideoId) -> FirestoreResult<Option<VideoRecord>> {
        let doc = self
            .client
            .get_document(&self.collection(), video_id.as_str())
            .await?;

        match doc {
            Some(d) => Ok(Some(document_to_video_record(&d)?)),
            None => Ok(None),
        }
    }

    /// List videos newest first, with cursor pagination.
    pub async fn list(&self, limit: Option<u32>, cursor: Option<&str>) -> FirestoreResult<VideoPage> {
        let page_size = normalize_page_size(limit);
        let cursor = match cursor {
            Some(c) => Some(
                PageCursor::decode(c)
                    .ok_or_else(|| FirestoreError::request_failed("Invalid pagination cursor"))?,
            ),
            None => None,
        };

        let mut query = StructuredQuery {
            from: vec![CollectionSelector {
                collection_id: "videos".to_string(),
                all_descendants: None,
            }],
            filter: None,
            order_by: Some(vec![
                Order {
                    field: FieldReference {
                        field_path: "created_at".to_string(),
                    },
                    direction: "DESCENDING".to_string(),
                },
                // Secondary order on document name for a stable cursor.
                Order {
                    field: FieldReference {
                        field_path: "__name__".to_string(),
                    },
                    direction: "DESCENDING".to_string(),
                },
            ]),
            start_at: None,
            limit: Some(page_size),
        };

        if let Some(ref c) = cursor {
            query.start_at = Some(Cursor {
                values: vec![
                    Value::TimestampValue(c.created_at.clone()),
                    Value::ReferenceValue(c.doc_path.clone()),
                ],
                before: Some(false),
            });
        }

        let docs = self.client.run_query(&self.parent_path(), query).await?;

        let mut videos = Vec::with_capacity(docs.len());
        let mut last_position: Option<PageCursor> = None;
        for doc in &docs {
            match document_to_video_record(doc) {
                Ok(record) => {
                    if let (Some(name), Some(fields)) = (&doc.name, &doc.fields) {
                        if let Some(Value::TimestampValue(ts)) = fields.get("created_at") {
                            last_position = Some(PageCursor {
                                created_at: ts.clone(),
                                doc_path: name.clone(),
                            });
                        }
                    }
                    videos.push(record);
                }
                Err(e) => warn!(error = %e, "Skipping malformed video document"),
            }
        }

        let next_cursor = if videos.len() as i32 == page_size {
            last_position.map(|c| c.encode())
        } else {
            None
        };

        Ok(VideoPage { videos, next_cursor })
    }

    /// Move a video forward along its normal pipeline path.
    ///
    /// Used by the worker between its own sequential phases, where it is the
    /// only writer. Concurrent paths (webhooks, the timeout sweeper) use
    /// [`complete_if_active`](Self::complete_if_active) and
    /// [`fail_if_active`](Self::fail_if_active) instead.
    pub async fn advance_status(
        &self,
        video_id: &VideoId,
        status: VideoStatus,
    ) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), status.as_str().to_firestore_value());
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());

        self.client
            .update_document(
                &self.collection(),
                video_id.as_str(),
                fields,
                Some(vec!["status".to_string(), "updated_at".to_string()]),
            )
            .await?;
        Ok(())
    }

    /// Replace the whole segment array.
    ///
    /// Used once, when the worker writes the generated per-segment prompts.
    pub async fn set_segments(
        &self,
        video_id: &VideoId,
        segments: &[Segment],
    ) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("segments".to_string(), segments_to_value(segments));
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());

        self.client
            .update_document(
                &self.collection(),
                video_id.as_str(),
                fields,
                Some(vec!["segments".to_string(), "updated_at".to_string()]),
            )
            .await?;
        Ok(())
    }

    /// Apply a change to one segment under optimistic concurrency control.
    ///
    /// `apply` receives the segment as currently stored and returns the new
    /// segment, or `None` to skip the write (e.g. the segment is already
    /// terminal). On a concurrent write the read-apply-write cycle is
    /// retried against the fresh document.
    pub async fn update_segment_with<F>(
        &self,
        video_id: &VideoId,
        segment_index: u32,
        apply: F,
    ) -> FirestoreResult<Option<Segment>>
    where
        F: Fn(Segment) -> Option<Segment>,
    {
        for attempt in 0..MAX_TRANSITION_RETRIES {
            let doc = self
                .client
                .get_document(&self.collection(), video_id.as_str())
                .await?
                .ok_or_else(|| {
                    FirestoreError::not_found(format!("{}/{}", self.collection(), video_id))
                })?;

            let record = document_to_video_record(&doc)?;
            let mut segments = record.segments;
            let pos = segments
                .iter()
                .position(|s| s.index == segment_index)
                .ok_or_else(|| {
                    FirestoreError::not_found(format!(
                        "segment {} of video {}",
                        segment_index, video_id
                    ))
                })?;

            let updated = match apply(segments[pos].clone()) {
                Some(s) => s,
                None => return Ok(None),
            };
            segments[pos] = updated.clone();

            let mut fields = HashMap::new();
            fields.insert("segments".to_string(), segments_to_value(&segments));
            fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());

            match self
                .client
                .update_document_with_precondition(
                    &self.collection(),
                    video_id.as_str(),
                    fields,
                    Some(vec!["segments".to_string(), "updated_at".to_string()]),
                    doc.update_time.as_deref(),
                )
                .await
            {
                Ok(_) => return Ok(Some(updated)),
                Err(e) if e.is_precondition_failed() => {
                    debug!(
                        video_id = %video_id,
                        segment = segment_index,
                        attempt = attempt + 1,
                        "Segment update precondition failed, retrying"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(
                        RETRY_BASE_DELAY_MS * (attempt as u64 + 1),
                    ))
                    .await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(FirestoreError::request_failed(format!(
            "Failed to update segment {} of video {} after {} retries",
            segment_index, video_id, MAX_TRANSITION_RETRIES
        )))
    }

    /// Mark a video completed, unless it already reached a terminal state.
    ///
    /// Returns `false` when the video was already terminal, which makes
    /// webhook retries and duplicate deliveries harmless.
    pub async fn complete_if_active(
        &self,
        video_id: &VideoId,
        final_url: Option<&str>,
        final_key: Option<&str>,
    ) -> FirestoreResult<bool> {
        for attempt in 0..MAX_TRANSITION_RETRIES {
            let doc = self
                .client
                .get_document(&self.collection(), video_id.as_str())
                .await?
                .ok_or_else(|| {
                    FirestoreError::not_found(format!("{}/{}", self.collection(), video_id))
                })?;

            let record = document_to_video_record(&doc)?;
            if !record.status.can_transition_to(VideoStatus::Completed) {
                debug!(
                    video_id = %video_id,
                    status = %record.status,
                    "Video already terminal, skipping completion"
                );
                return Ok(false);
            }

            let now = Utc::now();
            let mut fields = HashMap::new();
            fields.insert(
                "status".to_string(),
                VideoStatus::Completed.as_str().to_firestore_value(),
            );
            if let Some(url) = final_url {
                fields.insert("final_video_url".to_string(), url.to_firestore_value());
            }
            if let Some(key) = final_key {
                fields.insert("final_video_key".to_string(), key.to_firestore_value());
            }
            fields.insert("completed_at".to_string(), now.to_firestore_value());
            fields.insert("updated_at".to_string(), now.to_firestore_value());
            let mask: Vec<String> = fields.keys().cloned().collect();

            match self
                .client
                .update_document_with_precondition(
                    &self.collection(),
                    video_id.as_str(),
                    fields,
                    Some(mask),
                    doc.update_time.as_deref(),
                )
                .await
            {
                Ok(_) => {
                    info!(video_id = %video_id, team_id = %self.team_id, "Video completed");
                    return Ok(true);
                }
                Err(e) if e.is_precondition_failed() => {
                    debug!(
                        video_id = %video_id,
                        attempt = attempt + 1,
                        "Completion precondition failed, retrying"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(
                        RETRY_BASE_DELAY_MS * (attempt as u64 + 1),
                    ))
                    .await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(FirestoreError::request_failed(format!(
            "Failed to complete video {} after {} retries",
            video_id, MAX_TRANSITION_RETRIES
        )))
    }

    /// Mark a video failed, unless it already reached a terminal state.
    pub async fn fail_if_active(&self, video_id: &VideoId, error: &str) -> FirestoreResult<bool> {
        for attempt in 0..MAX_TRANSITION_RETRIES {
            let doc = self
                .client
                .get_document(&self.collection(), video_id.as_str())
                .await?
                .ok_or_else(|| {
                    FirestoreError::not_found(format!("{}/{}", self.collection(), video_id))
                })?;

            let record = document_to_video_record(&doc)?;
            if !record.status.can_transition_to(VideoStatus::Failed) {
                debug!(
                    video_id = %video_id,
                    status = %record.status,
                    "Video already terminal, skipping failure mark"
                );
                return Ok(false);
            }

            let now = Utc::now();
            let mut fields = HashMap::new();
            fields.insert(
                "status".to_string(),
                VideoStatus::Failed.as_str().to_firestore_value(),
            );
            fields.insert("error_message".to_string(), error.to_firestore_value());
            fields.insert("failed_at".to_string(), now.to_firestore_value());
            fields.insert("updated_at".to_string(), now.to_firestore_value());
            let mask: Vec<String> = fields.keys().cloned().collect();

            match self
                .client
                .update_document_with_precondition(
                    &self.collection(),
                    video_id.as_str(),
                    fields,
                    Some(mask),
                    doc.update_time.as_deref(),
                )
                .await
            {
                Ok(_) => {
                    warn!(video_id = %video_id, team_id = %self.team_id, error = %error, "Video failed");
                    return Ok(true);
                }
                Err(e) if e.is_precondition_failed() => {
                    debug!(
                        video_id = %video_id,
                        attempt = attempt + 1,
                        "Failure precondition failed, retrying"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(
                        RETRY_BASE_DELAY_MS * (attempt as u64 + 1),
                    ))
                    .await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(FirestoreError::request_failed(format!(
            "Failed to mark video {} failed after {} retries",
            video_id, MAX_TRANSITION_RETRIES
        )))
    }

    /// Record the archived copy of a completed video.
    ///
    /// Runs after completion, so no precondition loop: the key is additive
    /// and last-writer-wins is acceptable.
    pub async fn set_final_video_key(&self, video_id: &VideoId, key: &str) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("final_video_key".to_string(), key.to_firestore_value());
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());
        let mask: Vec<String> = fields.keys().cloned().collect();

        self.client
            .update_document(&self.collection(), video_id.as_str(), fields, Some(mask))
            .await?;
        info!(video_id = %video_id, key = %key, "Recorded archived final video");
        Ok(())
    }

    /// Delete a video record.
    pub async fn delete(&self, video_id: &VideoId) -> FirestoreResult<()> {
        self.client
            .delete_document(&self.collection(), video_id.as_str())
            .await?;
        info!(video_id = %video_id, team_id = %self.team_id, "Deleted video record");
        Ok(())
    }
}

// ============================================================================
// Conversions
// ============================================================================

fn segment_to_value(segment: &Segment) -> Value {
    let mut fields = HashMap::new();
    fields.insert("index".to_string(), segment.index.to_firestore_value());
    fields.insert("prompt".to_string(), segment.prompt.to_firestore_value());
    fields.insert(
        "status".to_string(),
        segment.status.as_str().to_firestore_value(),
    );
    if let Some(ref id) = segment.vendor_request_id {
        fields.insert("vendor_request_id".to_string(), id.to_firestore_value());
    }
    if let Some(ref key) = segment.output_key {
        fields.insert("output_key".to_string(), key.to_firestore_value());
    }
    if let Some(ref url) = segment.vendor_output_url {
        fields.insert("vendor_output_url".to_string(), url.to_firestore_value());
    }
    if let Some(started) = segment.started_at {
        fields.insert("started_at".to_string(), started.to_firestore_value());
    }
    if let Some(finished) = segment.finished_at {
        fields.insert("finished_at".to_string(), finished.to_firestore_value());
    }
    if let Some(ref error) = segment.error_message {
        fields.insert("error_message".to_string(), error.to_firestore_value());
    }
    Value::MapValue(MapValue {
        fields: Some(fields),
    })
}

fn segments_to_value(segments: &[Segment]) -> Value {
    Value::ArrayValue(ArrayValue {
        values: Some(segments.iter().map(segment_to_value).collect()),
    })
}

fn value_to_segment(value: &Value) -> Option<Segment> {
    let fields = match value {
        Value::MapValue(m) => m.fields.as_ref()?,
        _ => return None,
    };

    Some(Segment {
        index: fields.get("index").and_then(|v| u32::from_firestore_value(v))?,
        prompt: fields
            .get("prompt")
            .and_then(|v| String::from_firestore_value(v))
            .unwrap_or_default(),
        vendor_request_id: fields
            .get("vendor_request_id")
            .and_then(|v| String::from_firestore_value(v)),
        status: match fields
            .get("status")
            .and_then(|v| String::from_firestore_value(v))
            .unwrap_or_default()
            .as_str()
        {
            "in_progress" => SegmentStatus::InProgress,
            "completed" => SegmentStatus::Completed,
            "failed" => SegmentStatus::Failed,
            _ => SegmentStatus::InQueue,
        },
        output_key: fields
            .get("output_key")
            .and_then(|v| String::from_firestore_value(v)),
        vendor_output_url: fields
            .get("vendor_output_url")
            .and_then(|v| String::from_firestore_value(v)),
        started_at: fields
            .get("started_at")
            .and_then(|v| chrono::DateTime::from_firestore_value(v)),
        finished_at: fields
            .get("finished_at")
            .and_then(|v| chrono::DateTime::from_firestore_value(v)),
        error_message: fields
            .get("error_message")
            .and_then(|v| String::from_firestore_value(v)),
    })
}

fn video_record_to_fields(video: &VideoRecord) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert(
        "video_id".to_string(),
        video.video_id.as_str().to_firestore_value(),
    );
    fields.insert(
        "team_id".to_string(),
        video.team_id.as_str().to_firestore_value(),
    );
    fields.insert(
        "created_by".to_string(),
        video.created_by.to_firestore_value(),
    );
    fields.insert("title".to_string(), video.title.to_firestore_value());
    fields.insert("image_key".to_string(), video.image_key.to_firestore_value());
    fields.insert("prompt".to_string(), video.prompt.to_firestore_value());
    fields.insert(
        "duration_seconds".to_string(),
        video.duration_seconds.to_firestore_value(),
    );
    fields.insert("seed".to_string(), video.seed.to_firestore_value());
    fields.insert(
        "aspect_ratio".to_string(),
        video.aspect_ratio.as_str().to_firestore_value(),
    );
    fields.insert(
        "status".to_string(),
        video.status.as_str().to_firestore_value(),
    );
    fields.insert("segments".to_string(), segments_to_value(&video.segments));
    fields.insert(
        "credits_charged".to_string(),
        video.credits_charged.to_firestore_value(),
    );
    if let Some(ref key) = video.final_video_key {
        fields.insert("final_video_key".to_string(), key.to_firestore_value());
    }
    if let Some(ref url) = video.final_video_url {
        fields.insert("final_video_url".to_string(), url.to_firestore_value());
    }
    if let Some(ref error) = video.error_message {
        fields.insert("error_message".to_string(), error.to_firestore_value());
    }
    fields.insert(
        "created_at".to_string(),
        video.created_at.to_firestore_value(),
    );
    fields.insert(
        "updated_at".to_string(),
        video.updated_at.to_firestore_value(),
    );
    if let Some(completed) = video.completed_at {
        fields.insert("completed_at".to_string(), completed.to_firestore_value());
    }
    if let Some(failed) = video.failed_at {
        fields.insert("failed_at".to_string(), failed.to_firestore_value());
    }
    fields
}

fn document_to_video_record(doc: &crate::types::Document) -> FirestoreResult<VideoRecord> {
    let fields = doc
        .fields
        .as_ref()
        .ok_or_else(|| FirestoreError::InvalidResponse("Document has no fields".to_string()))?;

    let get_string = |key: &str| -> String {
        fields
            .get(key)
            .and_then(|v| String::from_firestore_value(v))
            .unwrap_or_default()
    };

    let get_u32 = |key: &str| -> u32 {
        fields
            .get(key)
            .and_then(|v| u32::from_firestore_value(v))
            .unwrap_or(0)
    };

    Ok(VideoRecord {
        video_id: VideoId::from_string(get_string("video_id")),
        team_id: TeamId::from_string(get_string("team_id")),
        created_by: get_string("created_by"),
        title: get_string("title"),
        image_key: get_string("image_key"),
        prompt: get_string("prompt"),
        duration_seconds: get_u32("duration_seconds"),
        seed: get_u32("seed"),
        aspect_ratio: get_string("aspect_ratio").parse().unwrap_or_default(),
        status: match get_string("status").as_str() {
            "generating_prompts" => VideoStatus::GeneratingPrompts,
            "rendering" => VideoStatus::Rendering,
            "merging" => VideoStatus::Merging,
            "completed" => VideoStatus::Completed,
            "failed" => VideoStatus::Failed,
            _ => VideoStatus::Queued,
        },
        segments: fields
            .get("segments")
            .and_then(|v| match v {
                Value::ArrayValue(arr) => arr
                    .values
                    .as_ref()
                    .map(|vals| vals.iter().filter_map(value_to_segment).collect()),
                _ => None,
            })
            .unwrap_or_default(),
        credits_charged: get_u32("credits_charged"),
        final_video_key: fields
            .get("final_video_key")
            .and_then(|v| String::from_firestore_value(v)),
        final_video_url: fields
            .get("final_video_url")
            .and_then(|v| String::from_firestore_value(v)),
        error_message: fields
            .get("error_message")
            .and_then(|v| String::from_firestore_value(v)),
        created_at: fields
            .get("created_at")
            .and_then(|v| chrono::DateTime::from_firestore_value(v))
            .unwrap_or_else(Utc::now),
        updated_at: fields
            .get("updated_at")
            .and_then(|v| chrono::DateTime::from_firestore_value(v))
            .unwrap_or_else(Utc::now),
        completed_at: fields
            .get("completed_at")
            .and_then(|v| chrono::DateTime::from_firestore_value(v)),
        failed_at: fields
            .get("failed_at")
            .and_then(|v| chrono::DateTime::from_firestore_value(v)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_models::AspectRatio;

    fn sample_record() -> VideoRecord {
        VideoRecord::new(
            VideoId::from_string("vid-1"),
            TeamId::from_string("team-1"),
            "user-1",
            "Sneaker teaser",
            "teams/team-1/images/shoe.png",
            "sneaker rotating on a pedestal",
            20,
            54_321,
            AspectRatio::Landscape,
        )
        .unwrap()
    }

    #[test]
    fn test_record_fields_roundtrip() {
        let mut record = sample_record();
        record.segments[0] = record.segments[0]
            .clone()
            .submitted("req-123")
            .complete("https://vendor.example/seg0.mp4");

        let doc = crate::types::Document::new(video_record_to_fields(&record));
        let parsed = document_to_video_record(&doc).unwrap();

        assert_eq!(parsed.video_id, record.video_id);
        assert_eq!(parsed.team_id, record.team_id);
        assert_eq!(parsed.duration_seconds, 20);
        assert_eq!(parsed.seed, 54_321);
        assert_eq!(parsed.aspect_ratio, AspectRatio::Landscape);
        assert_eq!(parsed.segments.len(), 3);
        assert_eq!(parsed.segments[0].status, SegmentStatus::Completed);
        assert_eq!(
            parsed.segments[0].vendor_output_url.as_deref(),
            Some("https://vendor.example/seg0.mp4")
        );
        assert_eq!(parsed.segments[1].status, SegmentStatus::InQueue);
        assert_eq!(parsed.credits_charged, 3);
    }

    #[test]
    fn test_segment_value_roundtrip_with_empty_options() {
        let segment = Segment::new(2, "closing shot");
        let value = segment_to_value(&segment);
        let parsed = value_to_segment(&value).unwrap();
        assert_eq!(parsed.index, 2);
        assert_eq!(parsed.prompt, "closing shot");
        assert_eq!(parsed.status, SegmentStatus::InQueue);
        assert!(parsed.vendor_request_id.is_none());
        assert!(parsed.started_at.is_none());
    }

    #[test]
    fn test_cursor_encode_decode() {
        let cursor = PageCursor {
            created_at: "2026-01-05T10:00:00Z".to_string(),
            doc_path: "projects/p/databases/(default)/documents/teams/t1/videos/v1".to_string(),
        };
        let encoded = cursor.encode();
        let decoded = PageCursor::decode(&encoded).unwrap();
        assert_eq!(decoded.created_at, cursor.created_at);
        assert_eq!(decoded.doc_path, cursor.doc_path);
    }

    #[test]
    fn test_cursor_decode_rejects_garbage() {
        assert!(PageCursor::decode("not-a-cursor").is_none());
        assert!(PageCursor::decode("ts%7Cnot-a-doc-path").is_none());
    }

    #[test]
    fn test_page_size_normalization() {
        assert_eq!(normalize_page_size(None), DEFAULT_PAGE_SIZE as i32);
        assert_eq!(normalize_page_size(Some(0)), 1);
        assert_eq!(normalize_page_size(Some(1000)), MAX_PAGE_SIZE as i32);
        assert_eq!(normalize_page_size(Some(10)), 10);
    }

    #[test]
    fn test_unknown_status_falls_back_to_queued() {
        let mut record = sample_record();
        record.status = VideoStatus::Rendering;
        let mut fields = video_record_to_fields(&record);
        fields.insert(
            "status".to_string(),
            "no_such_status".to_firestore_value(),
        );
        let doc = crate::types::Document::new(fields);
        let parsed = document_to_video_record(&doc).unwrap();
        assert_eq!(parsed.status, VideoStatus::Queued);
    }
}
