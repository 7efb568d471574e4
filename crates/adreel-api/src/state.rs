//! Application state.

use std::sync::Arc;

use adreel_firestore::{FirestoreClient, VideoRepository};
use adreel_models::TeamId;
use adreel_queue::{JobQueue, JobStatusCache, ProgressChannel};
use adreel_storage::R2Client;
use adreel_vendors::EmailClient;

use crate::auth::JwksCache;
use crate::config::ApiConfig;
use crate::services::{QuotaService, TeamService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub storage: Arc<R2Client>,
    pub firestore: Arc<FirestoreClient>,
    pub queue: Arc<JobQueue>,
    pub progress: Arc<ProgressChannel>,
    pub status_cache: Arc<JobStatusCache>,
    pub jwks: Arc<JwksCache>,
    pub email: Arc<EmailClient>,
    pub teams: TeamService,
    pub quota: QuotaService,
}

impl AppState {
    /// Create new application state.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let storage = R2Client::from_env()?;
        let firestore = FirestoreClient::from_env().await?;
        let queue = JobQueue::from_env()?;

        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let progress = ProgressChannel::new(&redis_url)?;
        let status_cache = JobStatusCache::new(&redis_url)?;

        let jwks = JwksCache::new().await?;
        let email = EmailClient::new()?;

        let firestore_arc = Arc::new(firestore);
        let teams = TeamService::new(Arc::clone(&firestore_arc));
        let quota = QuotaService::new(Arc::clone(&firestore_arc));

        Ok(Self {
            config,
            storage: Arc::new(storage),
            firestore: firestore_arc,
            queue: Arc::new(queue),
            progress: Arc::new(progress),
            status_cache: Arc::new(status_cache),
            jwks: Arc::new(jwks),
            email: Arc::new(email),
            teams,
            quota,
        })
    }

    /// Video repository scoped to one team.
    pub fn video_repo(&self, team_id: &TeamId) -> VideoRepository {
        VideoRepository::new((*self.firestore).clone(), team_id.clone())
    }
}
