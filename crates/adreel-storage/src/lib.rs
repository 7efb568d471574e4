//! Cloudflare R2 storage client.
//!
//! This crate provides:
//! - Byte upload/download to R2
//! - Presigned URL generation for playback
//! - The team-scoped object key layout
//! - Prefix deletion for video cleanup

pub mod client;
pub mod error;
pub mod keys;
pub mod operations;

pub use client::{ObjectInfo, R2Client, R2Config};
pub use error::{StorageError, StorageResult};
