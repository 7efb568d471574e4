//! Shared data models for the AdReel backend.
//!
//! This crate provides Serde-serializable types for:
//! - Videos, segments, and their status machines
//! - Segment planning and credit cost arithmetic
//! - Teams, members, and roles
//! - Invitations and subscriptions
//! - Render job tracking

pub mod generation;
mod ids;
pub mod invitation;
pub mod job;
pub mod plan;
pub mod segment;
pub mod subscription;
pub mod team;
pub mod video;

// Re-export common types
pub use generation::{
    credits_for_duration, random_seed, segment_count_for_duration, validate_seed,
    GenerationParamError, SegmentPlan, MAX_DURATION_SECONDS, MAX_SEGMENTS, SEED_MAX, SEED_MIN,
    SEGMENT_SECONDS,
};
pub use invitation::{
    normalize_email, InvitationId, InvitationStatus, TeamInvitation, INVITATION_TTL_DAYS,
};
pub use job::{ActiveRenderJob, JobId};
pub use plan::PlanTier;
pub use segment::{Segment, SegmentStatus};
pub use subscription::{SubscriptionStatus, UserSubscription};
pub use team::{current_usage_month, Team, TeamId, TeamMember, TeamRole};
pub use video::{AspectRatio, VideoId, VideoRecord, VideoStatus};
