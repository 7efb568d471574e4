//! Subscription repository: the `user_subscriptions` collection.
//!
//! One document per user, keyed by user ID. A missing document means the
//! free tier, so reads never fail just because nobody ever subscribed.

use std::collections::HashMap;

use chrono::Utc;
use tracing::info;

use adreel_models::{PlanTier, SubscriptionStatus, UserSubscription};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{Document, FromFirestoreValue, ToFirestoreValue, Value};

const COLLECTION: &str = "user_subscriptions";

/// Repository for user subscription documents.
#[derive(Clone)]
pub struct SubscriptionRepository {
    client: FirestoreClient,
}

impl SubscriptionRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Get a user's subscription, if one was ever recorded.
    pub async fn get(&self, user_id: &str) -> FirestoreResult<Option<UserSubscription>> {
        let doc = self.client.get_document(COLLECTION, user_id).await?;
        match doc {
            Some(d) => Ok(Some(document_to_subscription(&d)?)),
            None => Ok(None),
        }
    }

    /// Create or replace a user's subscription record.
    pub async fn upsert(&self, subscription: &UserSubscription) -> FirestoreResult<()> {
        let fields = subscription_to_fields(subscription);

        match self
            .client
            .create_document(COLLECTION, &subscription.user_id, fields.clone())
            .await
        {
            Ok(_) => {}
            Err(FirestoreError::AlreadyExists(_)) => {
                let mask: Vec<String> = fields.keys().cloned().collect();
                self.client
                    .update_document(COLLECTION, &subscription.user_id, fields, Some(mask))
                    .await?;
            }
            Err(e) => return Err(e),
        }

        info!(
            user_id = %subscription.user_id,
            plan = %subscription.plan,
            status = %subscription.status,
            "Upserted subscription"
        );
        Ok(())
    }

    /// The plan that applies to a user right now. Missing documents and
    /// canceled subscriptions resolve to Free.
    pub async fn plan_for(&self, user_id: &str) -> FirestoreResult<PlanTier> {
        Ok(self
            .get(user_id)
            .await?
            .map(|s| s.effective_plan())
            .unwrap_or(PlanTier::Free))
    }
}

// ============================================================================
// Conversions
// ============================================================================

fn subscription_to_fields(subscription: &UserSubscription) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert(
        "user_id".to_string(),
        subscription.user_id.to_firestore_value(),
    );
    fields.insert(
        "plan".to_string(),
        subscription.plan.as_str().to_firestore_value(),
    );
    fields.insert(
        "status".to_string(),
        subscription.status.as_str().to_firestore_value(),
    );
    if let Some(period_end) = subscription.current_period_end {
        fields.insert(
            "current_period_end".to_string(),
            period_end.to_firestore_value(),
        );
    }
    fields.insert(
        "updated_at".to_string(),
        subscription.updated_at.to_firestore_value(),
    );
    fields
}

fn document_to_subscription(doc: &Document) -> FirestoreResult<UserSubscription> {
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

    Ok(UserSubscription {
        user_id: get_string("user_id"),
        plan: PlanTier::from_str(&get_string("plan")),
        status: match get_string("status").as_str() {
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" => SubscriptionStatus::Canceled,
            _ => SubscriptionStatus::Active,
        },
        current_period_end: fields
            .get("current_period_end")
            .and_then(|v| chrono::DateTime::from_firestore_value(v)),
        updated_at: fields
            .get("updated_at")
            .and_then(|v| chrono::DateTime::from_firestore_value(v))
            .unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_fields_roundtrip() {
        let mut subscription = UserSubscription::new("user-5", PlanTier::Pro);
        subscription.current_period_end = Some(Utc::now() + chrono::Duration::days(30));

        let doc = Document::new(subscription_to_fields(&subscription));
        let parsed = document_to_subscription(&doc).unwrap();

        assert_eq!(parsed.user_id, "user-5");
        assert_eq!(parsed.plan, PlanTier::Pro);
        assert_eq!(parsed.status, SubscriptionStatus::Active);
        assert!(parsed.current_period_end.is_some());
    }

    #[test]
    fn test_unknown_plan_parses_as_free() {
        let subscription = UserSubscription::new("user-5", PlanTier::Studio);
        let mut fields = subscription_to_fields(&subscription);
        fields.insert("plan".to_string(), "platinum".to_firestore_value());
        let parsed = document_to_subscription(&Document::new(fields)).unwrap();
        assert_eq!(parsed.plan, PlanTier::Free);
    }

    #[test]
    fn test_missing_period_end_stays_none() {
        let subscription = UserSubscription::new("user-5", PlanTier::Free);
        let doc = Document::new(subscription_to_fields(&subscription));
        let parsed = document_to_subscription(&doc).unwrap();
        assert!(parsed.current_period_end.is_none());
    }
}
