//! Segment records and their status machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Render status of a single segment.
///
/// Mirrors the generation vendor's queue states. Terminal states absorb:
/// once a segment is `Completed` or `Failed` it never moves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    /// Waiting for the vendor to pick the request up
    #[default]
    InQueue,
    /// Vendor is rendering
    InProgress,
    /// Output is available
    Completed,
    /// Vendor reported failure or the poll timed out
    Failed,
}

impl SegmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InQueue => "in_queue",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether this status can never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving to `next` is a legal forward transition.
    pub fn can_transition_to(&self, next: SegmentStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (Self::InQueue, _) => true,
            (Self::InProgress, Self::InQueue) => false,
            (Self::InProgress, _) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One 8-second chunk of a video, rendered independently by the vendor and
/// later concatenated with its siblings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    /// Zero-based position within the video
    pub index: u32,

    /// Motion prompt used for this segment
    pub prompt: String,

    /// Vendor request id, present once submitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_request_id: Option<String>,

    /// Render status
    #[serde(default)]
    pub status: SegmentStatus,

    /// Storage key of the archived segment file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,

    /// Vendor-hosted output URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_output_url: Option<String>,

    /// When the segment was submitted to the vendor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the segment reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Segment {
    /// Create a fresh, unsubmitted segment.
    pub fn new(index: u32, prompt: impl Into<String>) -> Self {
        Self {
            index,
            prompt: prompt.into(),
            vendor_request_id: None,
            status: SegmentStatus::InQueue,
            output_key: None,
            vendor_output_url: None,
            started_at: None,
            finished_at: None,
            error_message: None,
        }
    }

    /// Record the vendor request id after submission.
    pub fn submitted(mut self, request_id: impl Into<String>) -> Self {
        self.vendor_request_id = Some(request_id.into());
        self.started_at = Some(Utc::now());
        self
    }

    /// Mark the vendor as actively rendering.
    pub fn in_progress(mut self) -> Self {
        if self.status.can_transition_to(SegmentStatus::InProgress) {
            self.status = SegmentStatus::InProgress;
        }
        self
    }

    /// Mark completed with the vendor output URL.
    pub fn complete(mut self, vendor_url: impl Into<String>) -> Self {
        self.status = SegmentStatus::Completed;
        self.vendor_output_url = Some(vendor_url.into());
        self.finished_at = Some(Utc::now());
        self
    }

    /// Record where the archived copy landed.
    pub fn archived(mut self, output_key: impl Into<String>) -> Self {
        self.output_key = Some(output_key.into());
        self
    }

    /// Mark failed.
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.status = SegmentStatus::Failed;
        self.error_message = Some(error.into());
        self.finished_at = Some(Utc::now());
        self
    }
}
