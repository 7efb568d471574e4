//! Video records and their status machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::generation::{GenerationParamError, SegmentPlan};
use crate::ids::string_id;
use crate::segment::{Segment, SegmentStatus};
use crate::team::TeamId;

string_id! {
    /// Unique identifier for a generated video.
    pub struct VideoId
}

/// Output aspect ratio for generated videos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum AspectRatio {
    /// 9:16 vertical (reels, stories)
    #[default]
    #[serde(rename = "9:16")]
    Portrait,
    /// 16:9 horizontal
    #[serde(rename = "16:9")]
    Landscape,
    /// 1:1 square
    #[serde(rename = "1:1")]
    Square,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Portrait => "9:16",
            Self::Landscape => "16:9",
            Self::Square => "1:1",
        }
    }
}

impl std::str::FromStr for AspectRatio {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "9:16" => Ok(Self::Portrait),
            "16:9" => Ok(Self::Landscape),
            "1:1" => Ok(Self::Square),
            _ => Err(()),
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generation status of a video.
///
/// Forward-only: `Completed` and `Failed` are terminal and absorb any
/// late webhook or poll result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// Accepted, waiting for a worker
    #[default]
    Queued,
    /// Worker is asking the prompt service for per-segment prompts
    GeneratingPrompts,
    /// Segments are being rendered by the vendor
    Rendering,
    /// All segments done, merge vendor is concatenating
    Merging,
    /// Final asset is available
    Completed,
    /// Generation failed
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::GeneratingPrompts => "generating_prompts",
            Self::Rendering => "rendering",
            Self::Merging => "merging",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether this status can never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Ordinal used to enforce forward-only movement.
    fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::GeneratingPrompts => 1,
            Self::Rendering => 2,
            Self::Merging => 3,
            Self::Completed | Self::Failed => 4,
        }
    }

    /// Whether moving to `next` is a legal forward transition. Failure is
    /// reachable from any non-terminal state.
    pub fn can_transition_to(&self, next: VideoStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Self::Failed {
            return true;
        }
        next.rank() > self.rank()
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated marketing video, stored under its owning team.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoRecord {
    /// Unique video ID
    pub video_id: VideoId,

    /// Owning team
    pub team_id: TeamId,

    /// User who requested the generation
    pub created_by: String,

    /// Display title
    pub title: String,

    /// Storage key of the source product image
    pub image_key: String,

    /// Base motion prompt supplied by the user
    pub prompt: String,

    /// Requested duration in seconds
    pub duration_seconds: u32,

    /// Generation seed, shared by every segment
    pub seed: u32,

    /// Output aspect ratio
    #[serde(default)]
    pub aspect_ratio: AspectRatio,

    /// Generation status
    #[serde(default)]
    pub status: VideoStatus,

    /// Planned segments, in order
    #[serde(default)]
    pub segments: Vec<Segment>,

    /// Credits charged when the request was accepted
    #[serde(default)]
    pub credits_charged: u32,

    /// Storage key of the archived final video
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_video_key: Option<String>,

    /// Vendor-hosted URL of the final video
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_video_url: Option<String>,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Set once, when the video reaches `completed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Set once, when the video reaches `failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl VideoRecord {
    /// Create a new queued video with its segments planned.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        video_id: VideoId,
        team_id: TeamId,
        created_by: impl Into<String>,
        title: impl Into<String>,
        image_key: impl Into<String>,
        prompt: impl Into<String>,
        duration_seconds: u32,
        seed: u32,
        aspect_ratio: AspectRatio,
    ) -> Result<Self, GenerationParamError> {
        let plan = SegmentPlan::for_duration(duration_seconds)?;
        crate::generation::validate_seed(seed)?;
        let prompt = prompt.into();
        let now = Utc::now();

        Ok(Self {
            video_id,
            team_id,
            created_by: created_by.into(),
            title: title.into(),
            image_key: image_key.into(),
            segments: plan.build_segments(&prompt),
            prompt,
            duration_seconds,
            seed,
            aspect_ratio,
            status: VideoStatus::Queued,
            credits_charged: plan.credits(),
            final_video_key: None,
            final_video_url: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
        })
    }

    /// The segment plan this record was created with.
    pub fn plan(&self) -> SegmentPlan {
        SegmentPlan {
            requested_seconds: self.duration_seconds,
            segment_count: self.segments.len() as u32,
        }
    }

    /// Whether every segment has completed.
    pub fn all_segments_completed(&self) -> bool {
        !self.segments.is_empty()
            && self
                .segments
                .iter()
                .all(|s| s.status == SegmentStatus::Completed)
    }

    /// Move to a new status if the transition is legal; no-op otherwise.
    pub fn advance(mut self, next: VideoStatus) -> Self {
        if self.status.can_transition_to(next) {
            self.status = next;
            self.updated_at = Utc::now();
        }
        self
    }

    /// Mark as completed with the final asset location.
    pub fn complete(mut self, final_url: Option<String>, final_key: Option<String>) -> Self {
        if !self.status.can_transition_to(VideoStatus::Completed) {
            return self;
        }
        self.status = VideoStatus::Completed;
        self.final_video_url = final_url;
        self.final_video_key = final_key;
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    /// Mark as failed, recording the reason.
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        if !self.status.can_transition_to(VideoStatus::Failed) {
            return self;
        }
        self.status = VideoStatus::Failed;
        self.error_message = Some(error.into());
        self.failed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::SEGMENT_SECONDS;

    fn record(duration: u32) -> VideoRecord {
        VideoRecord::new(
            VideoId::new(),
            TeamId::from_string("team-1"),
            "user-1",
            "Sneaker teaser",
            "teams/team-1/images/shoe.png",
            "sneaker rotating on a pedestal",
            duration,
            12_345,
            AspectRatio::Portrait,
        )
        .unwrap()
    }

    #[test]
    fn test_new_record_plans_segments() {
        let video = record(20);
        assert_eq!(video.segments.len(), 3);
        assert_eq!(video.credits_charged, 3);
        assert_eq!(video.status, VideoStatus::Queued);
        assert_eq!(video.plan().total_seconds(), 3 * SEGMENT_SECONDS);
    }

    #[test]
    fn test_new_record_rejects_bad_seed() {
        let result = VideoRecord::new(
            VideoId::new(),
            TeamId::from_string("team-1"),
            "user-1",
            "t",
            "k",
            "p",
            8,
            123,
            AspectRatio::Portrait,
        );
        assert!(matches!(
            result,
            Err(GenerationParamError::SeedOutOfRange(123))
        ));
    }

    #[test]
    fn test_status_forward_only() {
        assert!(VideoStatus::Queued.can_transition_to(VideoStatus::GeneratingPrompts));
        assert!(VideoStatus::GeneratingPrompts.can_transition_to(VideoStatus::Rendering));
        assert!(VideoStatus::Rendering.can_transition_to(VideoStatus::Merging));
        assert!(VideoStatus::Rendering.can_transition_to(VideoStatus::Completed));
        assert!(VideoStatus::Merging.can_transition_to(VideoStatus::Completed));
        assert!(!VideoStatus::Merging.can_transition_to(VideoStatus::Rendering));
        assert!(!VideoStatus::Completed.can_transition_to(VideoStatus::Failed));
        assert!(!VideoStatus::Failed.can_transition_to(VideoStatus::Queued));
    }

    #[test]
    fn test_failure_reachable_from_any_active_state() {
        for status in [
            VideoStatus::Queued,
            VideoStatus::GeneratingPrompts,
            VideoStatus::Rendering,
            VideoStatus::Merging,
        ] {
            assert!(status.can_transition_to(VideoStatus::Failed));
        }
    }

    #[test]
    fn test_complete_after_terminal_is_noop() {
        let video = record(8).fail("vendor down");
        let video = video.complete(Some("https://v.example/final.mp4".into()), None);
        assert_eq!(video.status, VideoStatus::Failed);
        assert!(video.final_video_url.is_none());
    }

    #[test]
    fn test_all_segments_completed() {
        let mut video = record(16);
        assert!(!video.all_segments_completed());
        video.segments = video
            .segments
            .into_iter()
            .map(|s| s.complete("https://vendor.example/seg.mp4"))
            .collect();
        assert!(video.all_segments_completed());
    }
}
