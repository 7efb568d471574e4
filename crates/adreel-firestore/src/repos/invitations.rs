//! Invitation repository: the top-level `team_invitations` collection.
//!
//! Invitations are stored outside the team subtree so an invitee can list
//! everything addressed to their email without knowing any team IDs.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{info, warn};

use adreel_models::{
    normalize_email, InvitationId, InvitationStatus, TeamId, TeamInvitation, TeamRole,
};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{
    CollectionSelector, Document, Filter, FromFirestoreValue, StructuredQuery, ToFirestoreValue,
    Value,
};

const COLLECTION: &str = "team_invitations";

/// Repository for team invitation documents.
#[derive(Clone)]
pub struct InvitationRepository {
    client: FirestoreClient,
}

impl InvitationRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Create an invitation.
    pub async fn create(&self, invitation: &TeamInvitation) -> FirestoreResult<()> {
        self.client
            .create_document(
                COLLECTION,
                invitation.invitation_id.as_str(),
                invitation_to_fields(invitation),
            )
            .await?;
        info!(
            invitation_id = %invitation.invitation_id,
            team_id = %invitation.team_id,
            email = %invitation.email,
            "Created invitation"
        );
        Ok(())
    }

    /// Get an invitation by ID.
    pub async fn get(&self, invitation_id: &InvitationId) -> FirestoreResult<Option<TeamInvitation>> {
        let doc = self
            .client
            .get_document(COLLECTION, invitation_id.as_str())
            .await?;

        match doc {
            Some(d) => Ok(Some(document_to_invitation(&d)?)),
            None => Ok(None),
        }
    }

    /// All invitations for a team, newest first. Includes non-pending ones
    /// so admins can see history.
    pub async fn list_for_team(&self, team_id: &TeamId) -> FirestoreResult<Vec<TeamInvitation>> {
        let query = StructuredQuery {
            from: vec![CollectionSelector {
                collection_id: COLLECTION.to_string(),
                all_descendants: None,
            }],
            filter: Some(Filter::field_eq(
                "team_id",
                team_id.as_str().to_firestore_value(),
            )),
            order_by: None,
            start_at: None,
            limit: None,
        };

        let docs = self.client.run_query("", query).await?;
        let mut invitations = parse_invitations(&docs);
        // Invitation lists are small; sort in memory.
        invitations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(invitations)
    }

    /// Pending, unexpired invitations addressed to an email, newest first.
    pub async fn pending_for_email(&self, email: &str) -> FirestoreResult<Vec<TeamInvitation>> {
        let normalized = normalize_email(email);
        let query = StructuredQuery {
            from: vec![CollectionSelector {
                collection_id: COLLECTION.to_string(),
                all_descendants: None,
            }],
            filter: Some(Filter::and(vec![
                Filter::field_eq("email", normalized.to_firestore_value()),
                Filter::field_eq(
                    "status",
                    InvitationStatus::Pending.as_str().to_firestore_value(),
                ),
            ])),
            order_by: None,
            start_at: None,
            limit: None,
        };

        let docs = self.client.run_query("", query).await?;
        let now = Utc::now();
        let mut invitations: Vec<TeamInvitation> = parse_invitations(&docs)
            .into_iter()
            .filter(|inv| !inv.is_expired(now))
            .collect();
        invitations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(invitations)
    }

    /// Find a pending, unexpired invitation for this team and email, if any.
    /// Used to stop duplicate invites.
    pub async fn find_pending(
        &self,
        team_id: &TeamId,
        email: &str,
    ) -> FirestoreResult<Option<TeamInvitation>> {
        let normalized = normalize_email(email);
        let query = StructuredQuery {
            from: vec![CollectionSelector {
                collection_id: COLLECTION.to_string(),
                all_descendants: None,
            }],
            filter: Some(Filter::and(vec![
                Filter::field_eq("team_id", team_id.as_str().to_firestore_value()),
                Filter::field_eq("email", normalized.to_firestore_value()),
                Filter::field_eq(
                    "status",
                    InvitationStatus::Pending.as_str().to_firestore_value(),
                ),
            ])),
            order_by: None,
            start_at: None,
            limit: None,
        };

        let docs = self.client.run_query("", query).await?;
        let now = Utc::now();
        Ok(parse_invitations(&docs)
            .into_iter()
            .find(|inv| !inv.is_expired(now)))
    }

    /// Set the lifecycle status of an invitation.
    pub async fn set_status(
        &self,
        invitation_id: &InvitationId,
        status: InvitationStatus,
    ) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert(
            "status".to_string(),
            status.as_str().to_firestore_value(),
        );

        self.client
            .update_document(
                COLLECTION,
                invitation_id.as_str(),
                fields,
                Some(vec!["status".to_string()]),
            )
            .await?;
        info!(invitation_id = %invitation_id, status = %status, "Updated invitation status");
        Ok(())
    }
}

fn parse_invitations(docs: &[Document]) -> Vec<TeamInvitation> {
    let mut invitations = Vec::with_capacity(docs.len());
    for doc in docs {
        match document_to_invitation(doc) {
            Ok(inv) => invitations.push(inv),
            Err(e) => warn!(error = %e, "Skipping malformed invitation document"),
        }
    }
    invitations
}

// ============================================================================
// Conversions
// ============================================================================

fn invitation_to_fields(invitation: &TeamInvitation) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert(
        "invitation_id".to_string(),
        invitation.invitation_id.as_str().to_firestore_value(),
    );
    fields.insert(
        "team_id".to_string(),
        invitation.team_id.as_str().to_firestore_value(),
    );
    fields.insert(
        "team_name".to_string(),
        invitation.team_name.to_firestore_value(),
    );
    fields.insert("email".to_string(), invitation.email.to_firestore_value());
    fields.insert(
        "role".to_string(),
        invitation.role.as_str().to_firestore_value(),
    );
    fields.insert(
        "invited_by".to_string(),
        invitation.invited_by.to_firestore_value(),
    );
    fields.insert(
        "status".to_string(),
        invitation.status.as_str().to_firestore_value(),
    );
    fields.insert(
        "created_at".to_string(),
        invitation.created_at.to_firestore_value(),
    );
    fields.insert(
        "expires_at".to_string(),
        invitation.expires_at.to_firestore_value(),
    );
    fields
}

fn document_to_invitation(doc: &Document) -> FirestoreResult<TeamInvitation> {
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

    Ok(TeamInvitation {
        invitation_id: InvitationId::from_string(get_string("invitation_id")),
        team_id: TeamId::from_string(get_string("team_id")),
        team_name: get_string("team_name"),
        email: get_string("email"),
        role: TeamRole::from_str(&get_string("role")),
        invited_by: get_string("invited_by"),
        status: match get_string("status").as_str() {
            "accepted" => InvitationStatus::Accepted,
            "declined" => InvitationStatus::Declined,
            "revoked" => InvitationStatus::Revoked,
            _ => InvitationStatus::Pending,
        },
        created_at: fields
            .get("created_at")
            .and_then(|v| chrono::DateTime::from_firestore_value(v))
            .unwrap_or_else(Utc::now),
        expires_at: fields
            .get("expires_at")
            .and_then(|v| chrono::DateTime::from_firestore_value(v))
            .unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite() -> TeamInvitation {
        TeamInvitation::new(
            TeamId::from_string("team-1"),
            "Acme",
            "jordan@example.com",
            TeamRole::Member,
            "user-1",
        )
    }

    #[test]
    fn test_invitation_fields_roundtrip() {
        let invitation = invite();
        let doc = Document::new(invitation_to_fields(&invitation));
        let parsed = document_to_invitation(&doc).unwrap();

        assert_eq!(parsed.invitation_id, invitation.invitation_id);
        assert_eq!(parsed.team_id, invitation.team_id);
        assert_eq!(parsed.team_name, "Acme");
        assert_eq!(parsed.email, "jordan@example.com");
        assert_eq!(parsed.role, TeamRole::Member);
        assert_eq!(parsed.status, InvitationStatus::Pending);
        assert_eq!(
            parsed.expires_at.timestamp(),
            invitation.expires_at.timestamp()
        );
    }

    #[test]
    fn test_unknown_status_parses_as_pending() {
        let invitation = invite().revoke();
        let mut fields = invitation_to_fields(&invitation);
        fields.insert("status".to_string(), "limbo".to_firestore_value());
        let parsed = document_to_invitation(&Document::new(fields)).unwrap();
        assert_eq!(parsed.status, InvitationStatus::Pending);
    }
}
