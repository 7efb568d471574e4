//! Firestore persistence for AdReel.
//!
//! This crate provides:
//! - A REST client with token caching, retries, and request metrics
//! - Typed repositories for videos, teams, invitations, and subscriptions
//! - Optimistic-lock helpers for usage counters and status transitions
//!
//! # Document layout
//!
//! - `teams/{team_id}`: team with monthly usage counter
//! - `teams/{team_id}/members/{user_id}`: membership records
//! - `teams/{team_id}/videos/{video_id}`: videos with embedded segments
//! - `team_invitations/{invitation_id}`: email invitations
//! - `user_subscriptions/{user_id}`: plan records

pub mod client;
pub mod error;
pub mod metrics;
pub mod repos;
pub mod retry;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use repos::{
    CreditChargeOutcome, CreditChargeResult, InvitationRepository, PageCursor,
    SubscriptionRepository, TeamRepository, VideoPage, VideoRepository,
};
pub use retry::RetryConfig;
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
