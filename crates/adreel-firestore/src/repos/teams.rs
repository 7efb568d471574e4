//! Team repository: team documents, membership, and usage counters.
//!
//! Teams live at `teams/{team_id}` with members in the
//! `teams/{team_id}/members/{user_id}` subcollection. The monthly usage
//! counter sits on the team document and is incremented under an updateTime
//! precondition so concurrent reservations never lose a charge.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use adreel_models::{current_usage_month, Team, TeamId, TeamMember, TeamRole};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{
    CollectionSelector, Document, Filter, FromFirestoreValue, StructuredQuery, ToFirestoreValue,
    Value, Write,
};

/// Maximum retries for atomic credit operations (optimistic locking).
const MAX_CREDIT_RETRIES: u32 = 5;

/// Base delay for backoff between credit retries (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 50;

const TEAMS_COLLECTION: &str = "teams";
const MEMBERS_COLLECTION: &str = "members";

// ============================================================================
// Credit charge results
// ============================================================================

/// Result of a successful credit reservation.
#[derive(Debug, Clone)]
pub struct CreditChargeResult {
    /// Total credits used this month after the charge.
    pub credits_used_after: u32,
    /// Whether this charge was the first of a new month.
    pub month_reset: bool,
}

/// Outcome of a reservation attempt against the monthly allowance.
#[derive(Debug, Clone)]
pub enum CreditChargeOutcome {
    /// The charge was applied.
    Charged(CreditChargeResult),
    /// The charge would exceed the allowance; nothing was written.
    InsufficientCredits {
        used: u32,
        requested: u32,
        limit: u32,
    },
}

// ============================================================================
// Repository
// ============================================================================

/// Repository for team documents and their member subcollections.
#[derive(Clone)]
pub struct TeamRepository {
    client: FirestoreClient,
}

impl TeamRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    fn members_collection(team_id: &TeamId) -> String {
        format!(
            "{}/{}/{}",
            TEAMS_COLLECTION,
            team_id.as_str(),
            MEMBERS_COLLECTION
        )
    }

    /// Create a team and its owner membership in one atomic batch.
    ///
    /// Either both documents land or neither does, so a team can never
    /// exist without its owner in the members subcollection.
    pub async fn create_with_owner(&self, team: &Team, owner: &TeamMember) -> FirestoreResult<()> {
        let team_name = self
            .client
            .full_document_name(TEAMS_COLLECTION, team.team_id.as_str());
        let member_name = self
            .client
            .full_document_name(&Self::members_collection(&team.team_id), &owner.user_id);

        let writes = vec![
            Write::insert(team_name, team_to_fields(team)),
            Write::insert(member_name, member_to_fields(owner)),
        ];

        self.client.batch_write(writes).await?;
        info!(
            team_id = %team.team_id,
            owner_id = %team.owner_id,
            personal = team.personal,
            "Created team with owner membership"
        );
        Ok(())
    }

    /// Get a team by ID.
    pub async fn get(&self, team_id: &TeamId) -> FirestoreResult<Option<Team>> {
        let doc = self
            .client
            .get_document(TEAMS_COLLECTION, team_id.as_str())
            .await?;

        match doc {
            Some(d) => Ok(Some(document_to_team(&d)?)),
            None => Ok(None),
        }
    }

    /// Rename a team.
    pub async fn rename(&self, team_id: &TeamId, name: &str) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), name.to_firestore_value());
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());

        self.client
            .update_document(
                TEAMS_COLLECTION,
                team_id.as_str(),
                fields,
                Some(vec!["name".to_string(), "updated_at".to_string()]),
            )
            .await?;
        Ok(())
    }

    // =========================================================================
    // Membership
    // =========================================================================

    /// Get one member of a team.
    pub async fn get_member(
        &self,
        team_id: &TeamId,
        user_id: &str,
    ) -> FirestoreResult<Option<TeamMember>> {
        let doc = self
            .client
            .get_document(&Self::members_collection(team_id), user_id)
            .await?;

        match doc {
            Some(d) => Ok(Some(document_to_member(&d)?)),
            None => Ok(None),
        }
    }

    /// Add a member. Fails with `AlreadyExists` if the user is already in
    /// the team.
    pub async fn add_member(&self, team_id: &TeamId, member: &TeamMember) -> FirestoreResult<()> {
        self.client
            .create_document(
                &Self::members_collection(team_id),
                &member.user_id,
                member_to_fields(member),
            )
            .await?;
        info!(
            team_id = %team_id,
            user_id = %member.user_id,
            role = %member.role,
            "Added team member"
        );
        Ok(())
    }

    /// Remove a member from a team.
    pub async fn remove_member(&self, team_id: &TeamId, user_id: &str) -> FirestoreResult<()> {
        self.client
            .delete_document(&Self::members_collection(team_id), user_id)
            .await?;
        info!(team_id = %team_id, user_id = %user_id, "Removed team member");
        Ok(())
    }

    /// List all members of a team. Teams are small, so no pagination.
    pub async fn list_members(&self, team_id: &TeamId) -> FirestoreResult<Vec<TeamMember>> {
        let response = self
            .client
            .list_documents(&Self::members_collection(team_id), Some(100), None)
            .await?;

        let mut members = Vec::new();
        for doc in response.documents.unwrap_or_default() {
            match document_to_member(&doc) {
                Ok(m) => members.push(m),
                Err(e) => warn!(team_id = %team_id, error = %e, "Skipping malformed member document"),
            }
        }
        Ok(members)
    }

    /// All teams a user belongs to, newest first.
    ///
    /// Runs a collection group query over `members` subcollections, then
    /// batch-fetches the parent team documents.
    pub async fn teams_for_user(&self, user_id: &str) -> FirestoreResult<Vec<Team>> {
        let query = StructuredQuery {
            from: vec![CollectionSelector {
                collection_id: MEMBERS_COLLECTION.to_string(),
                all_descendants: Some(true),
            }],
            filter: Some(Filter::field_eq("user_id", user_id.to_firestore_value())),
            order_by: None,
            start_at: None,
            limit: None,
        };

        let member_docs = self.client.run_query("", query).await?;

        let team_names: Vec<String> = member_docs
            .iter()
            .filter_map(|doc| doc.name.as_deref())
            .filter_map(team_doc_name_from_member_name)
            .collect();

        if team_names.is_empty() {
            return Ok(vec![]);
        }

        let team_docs = self.client.batch_get_documents(team_names, None).await?;

        let mut teams = Vec::with_capacity(team_docs.len());
        for doc in &team_docs {
            match document_to_team(doc) {
                Ok(t) => teams.push(t),
                Err(e) => warn!(user_id = %user_id, error = %e, "Skipping malformed team document"),
            }
        }
        teams.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(teams)
    }

    // =========================================================================
    // Usage counters
    // =========================================================================

    /// Atomically reserve credits against the team's monthly allowance.
    ///
    /// Reads the counter, applies the lazy month reset, rejects if the
    /// charge would exceed `monthly_limit`, and writes the incremented
    /// counter under an updateTime precondition. On contention the whole
    /// read-check-write cycle retries against the fresh document.
    pub async fn charge_credits(
        &self,
        team_id: &TeamId,
        credits: u32,
        monthly_limit: u32,
    ) -> FirestoreResult<CreditChargeOutcome> {
        let current_month = current_usage_month();
        let mut last_error = None;

        for attempt in 0..MAX_CREDIT_RETRIES {
            let doc = self
                .client
                .get_document(TEAMS_COLLECTION, team_id.as_str())
                .await?
                .ok_or_else(|| {
                    warn!(team_id = %team_id, "Team not found when charging credits");
                    FirestoreError::NotFound(format!("Team {} not found", team_id))
                })?;

            let team = document_to_team(&doc)?;
            let is_new_month = team.usage_reset_month != current_month;
            let credits_used = if is_new_month {
                0
            } else {
                team.credits_used_this_month
            };

            let new_credits = credits_used.saturating_add(credits);
            if new_credits > monthly_limit {
                debug!(
                    team_id = %team_id,
                    used = credits_used,
                    requested = credits,
                    limit = monthly_limit,
                    "Credit reservation rejected: allowance exceeded"
                );
                return Ok(CreditChargeOutcome::InsufficientCredits {
                    used: credits_used,
                    requested: credits,
                    limit: monthly_limit,
                });
            }

            let mut fields = HashMap::new();
            fields.insert(
                "credits_used_this_month".to_string(),
                new_credits.to_firestore_value(),
            );
            fields.insert(
                "usage_reset_month".to_string(),
                current_month.to_firestore_value(),
            );
            fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());

            let update_mask = vec![
                "credits_used_this_month".to_string(),
                "usage_reset_month".to_string(),
                "updated_at".to_string(),
            ];

            match self
                .client
                .update_document_with_precondition(
                    TEAMS_COLLECTION,
                    team_id.as_str(),
                    fields,
                    Some(update_mask),
                    doc.update_time.as_deref(),
                )
                .await
            {
                Ok(_) => {
                    info!(
                        team_id = %team_id,
                        credits = credits,
                        total_used = new_credits,
                        month_reset = is_new_month,
                        "Reserved credits"
                    );
                    return Ok(CreditChargeOutcome::Charged(CreditChargeResult {
                        credits_used_after: new_credits,
                        month_reset: is_new_month,
                    }));
                }
                Err(e) if e.is_precondition_failed() => {
                    debug!(
                        team_id = %team_id,
                        attempt = attempt + 1,
                        "Credit reservation precondition failed, retrying"
                    );
                    last_error = Some(e);
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * (attempt as u64 + 1));
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => {
                    warn!(team_id = %team_id, error = %e, "Failed to reserve credits");
                    return Err(e);
                }
            }
        }

        warn!(
            team_id = %team_id,
            retries = MAX_CREDIT_RETRIES,
            error = ?last_error,
            "Credit reservation failed after retries"
        );
        Err(FirestoreError::request_failed(
            "Failed to reserve credits due to concurrent updates",
        ))
    }

    /// Credits used this month, treating a stale month key as zero.
    ///
    /// Returns 0 for a missing team; callers that need existence checks do
    /// them separately.
    pub async fn credits_used(&self, team_id: &TeamId) -> FirestoreResult<u32> {
        let current_month = current_usage_month();

        let doc = self
            .client
            .get_document(TEAMS_COLLECTION, team_id.as_str())
            .await?;

        match doc {
            Some(d) => {
                let team = document_to_team(&d)?;
                Ok(team.effective_credits_used(&current_month))
            }
            None => Ok(0),
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// Extract the parent team document name from a member document name, e.g.
/// "projects/p/databases/d/documents/teams/T/members/U" ->
/// "projects/p/databases/d/documents/teams/T".
fn team_doc_name_from_member_name(member_name: &str) -> Option<String> {
    let idx = member_name.find("/teams/")?;
    let after = &member_name[idx + "/teams/".len()..];
    let team_id = after.split('/').next()?;
    if team_id.is_empty() {
        return None;
    }
    Some(format!("{}/teams/{}", &member_name[..idx], team_id))
}

fn team_to_fields(team: &Team) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert(
        "team_id".to_string(),
        team.team_id.as_str().to_firestore_value(),
    );
    fields.insert("name".to_string(), team.name.to_firestore_value());
    fields.insert("owner_id".to_string(), team.owner_id.to_firestore_value());
    fields.insert("personal".to_string(), team.personal.to_firestore_value());
    fields.insert(
        "credits_used_this_month".to_string(),
        team.credits_used_this_month.to_firestore_value(),
    );
    fields.insert(
        "usage_reset_month".to_string(),
        team.usage_reset_month.to_firestore_value(),
    );
    fields.insert(
        "created_at".to_string(),
        team.created_at.to_firestore_value(),
    );
    fields.insert(
        "updated_at".to_string(),
        team.updated_at.to_firestore_value(),
    );
    fields
}

fn document_to_team(doc: &Document) -> FirestoreResult<Team> {
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

    Ok(Team {
        team_id: TeamId::from_string(get_string("team_id")),
        name: get_string("name"),
        owner_id: get_string("owner_id"),
        personal: fields
            .get("personal")
            .and_then(|v| bool::from_firestore_value(v))
            .unwrap_or(false),
        credits_used_this_month: fields
            .get("credits_used_this_month")
            .and_then(|v| u32::from_firestore_value(v))
            .unwrap_or(0),
        usage_reset_month: get_string("usage_reset_month"),
        created_at: fields
            .get("created_at")
            .and_then(|v| chrono::DateTime::from_firestore_value(v))
            .unwrap_or_else(Utc::now),
        updated_at: fields
            .get("updated_at")
            .and_then(|v| chrono::DateTime::from_firestore_value(v))
            .unwrap_or_else(Utc::now),
    })
}

fn member_to_fields(member: &TeamMember) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert(
        "user_id".to_string(),
        member.user_id.to_firestore_value(),
    );
    fields.insert("email".to_string(), member.email.to_firestore_value());
    fields.insert(
        "role".to_string(),
        member.role.as_str().to_firestore_value(),
    );
    fields.insert(
        "joined_at".to_string(),
        member.joined_at.to_firestore_value(),
    );
    fields
}

fn document_to_member(doc: &Document) -> FirestoreResult<TeamMember> {
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

    Ok(TeamMember {
        user_id: get_string("user_id"),
        email: get_string("email"),
        role: TeamRole::from_str(&get_string("role")),
        joined_at: fields
            .get("joined_at")
            .and_then(|v| chrono::DateTime::from_firestore_value(v))
            .unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_fields_roundtrip() {
        let mut team = Team::new("Acme Marketing", "user-7");
        team.credits_used_this_month = 12;
        team.usage_reset_month = "2026-08".to_string();

        let doc = Document::new(team_to_fields(&team));
        let parsed = document_to_team(&doc).unwrap();

        assert_eq!(parsed.team_id, team.team_id);
        assert_eq!(parsed.name, "Acme Marketing");
        assert_eq!(parsed.owner_id, "user-7");
        assert!(!parsed.personal);
        assert_eq!(parsed.credits_used_this_month, 12);
        assert_eq!(parsed.usage_reset_month, "2026-08");
    }

    #[test]
    fn test_member_fields_roundtrip() {
        let member = TeamMember::new("user-3", "pat@example.com", TeamRole::Admin);
        let doc = Document::new(member_to_fields(&member));
        let parsed = document_to_member(&doc).unwrap();

        assert_eq!(parsed.user_id, "user-3");
        assert_eq!(parsed.email, "pat@example.com");
        assert_eq!(parsed.role, TeamRole::Admin);
    }

    #[test]
    fn test_unknown_role_falls_back_to_member() {
        let member = TeamMember::new("user-3", "pat@example.com", TeamRole::Member);
        let mut fields = member_to_fields(&member);
        fields.insert("role".to_string(), "superuser".to_firestore_value());
        let parsed = document_to_member(&Document::new(fields)).unwrap();
        assert_eq!(parsed.role, TeamRole::Member);
    }

    #[test]
    fn test_team_doc_name_from_member_name() {
        let name = "projects/p/databases/(default)/documents/teams/team-9/members/user-2";
        assert_eq!(
            team_doc_name_from_member_name(name).unwrap(),
            "projects/p/databases/(default)/documents/teams/team-9"
        );
        assert!(team_doc_name_from_member_name("projects/p/databases/d/documents/other/x").is_none());
    }
}
