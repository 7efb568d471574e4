//! Firestore integration tests.

/// Test Firestore connection.
#[tokio::test]
#[ignore = "requires Firestore credentials"]
async fn test_firestore_connection() {
    dotenvy::dotenv().ok();

    let client = adreel_firestore::FirestoreClient::from_env()
        .await
        .expect("Failed to create Firestore client");

    // A missing document is Ok(None); anything else means the connection
    // or credentials are broken.
    let result = client.get_document("_health", "_check").await;
    match result {
        Ok(Some(_)) => println!("Health check document exists"),
        Ok(None) => println!("Health check document not found (expected)"),
        Err(e) => panic!("Unexpected error: {}", e),
    }
}

/// Test video repository CRUD operations.
#[tokio::test]
#[ignore = "requires Firestore credentials"]
async fn test_video_repository() {
    use adreel_firestore::VideoRepository;
    use adreel_models::{AspectRatio, TeamId, VideoId, VideoRecord, VideoStatus};

    dotenvy::dotenv().ok();

    let client = adreel_firestore::FirestoreClient::from_env()
        .await
        .expect("Failed to create Firestore client");

    let team_id = TeamId::from_string("test_team_integration");
    let repo = VideoRepository::new(client.clone(), team_id.clone());

    // Create a test video: 16 seconds -> two segments
    let video_id = VideoId::new();
    let video = VideoRecord::new(
        video_id.clone(),
        team_id,
        "test_user_integration",
        "Integration Test Video",
        "teams/test_team_integration/images/test.png",
        "Slow orbit around the product",
        16,
        12345,
        AspectRatio::Portrait,
    )
    .expect("Failed to build video record");

    // Create
    repo.create(&video).await.expect("Failed to create video");
    println!("Created video: {}", video_id);

    // Read
    let fetched = repo.get(&video_id).await.expect("Failed to get video");
    assert!(fetched.is_some());
    let fetched = fetched.unwrap();
    assert_eq!(fetched.title, "Integration Test Video");
    assert_eq!(fetched.segments.len(), 2);
    assert_eq!(fetched.status, VideoStatus::Queued);

    // Advance status
    repo.advance_status(&video_id, VideoStatus::GeneratingPrompts)
        .await
        .expect("Failed to advance status");

    // Verify update
    let updated = repo
        .get(&video_id)
        .await
        .expect("Failed to get video")
        .unwrap();
    assert_eq!(updated.status, VideoStatus::GeneratingPrompts);

    // Fail the active video
    let failed = repo
        .fail_if_active(&video_id, "Integration test failure")
        .await
        .expect("Failed to fail video");
    assert!(failed);

    // A terminal record absorbs further failure attempts
    let failed_again = repo
        .fail_if_active(&video_id, "Second failure")
        .await
        .expect("Failed to re-fail video");
    assert!(!failed_again);

    // Delete
    repo.delete(&video_id).await.expect("Failed to delete video");
    println!("Deleted video: {}", video_id);

    // Verify deletion
    let deleted = repo.get(&video_id).await.expect("Failed to get video");
    assert!(deleted.is_none());
}

/// Test team bootstrap and membership lookup.
#[tokio::test]
#[ignore = "requires Firestore credentials"]
async fn test_team_service() {
    use std::sync::Arc;

    use adreel_api::TeamService;

    dotenvy::dotenv().ok();

    let firestore = Arc::new(
        adreel_firestore::FirestoreClient::from_env()
            .await
            .expect("Failed to create Firestore client"),
    );

    let service = TeamService::new(Arc::clone(&firestore));

    let uid = "test_user_integration_team";

    // First call creates the personal team, second call finds it
    let team = service
        .ensure_personal_team(uid, Some("test@example.com"))
        .await
        .expect("Failed to ensure personal team");
    println!("Personal team: {:?}", team.team_id);
    assert!(team.personal);

    let again = service
        .ensure_personal_team(uid, Some("test@example.com"))
        .await
        .expect("Failed to re-ensure personal team");
    assert_eq!(again.team_id, team.team_id);

    let teams = service
        .teams_for_user(uid)
        .await
        .expect("Failed to list teams");
    assert!(teams.iter().any(|t| t.team_id == team.team_id));
}

/// Test credit reservation against the monthly allowance.
#[tokio::test]
#[ignore = "requires Firestore credentials"]
async fn test_credit_reservation() {
    use adreel_firestore::{CreditChargeOutcome, TeamRepository};
    use adreel_models::{Team, TeamMember, TeamRole};

    dotenvy::dotenv().ok();

    let client = adreel_firestore::FirestoreClient::from_env()
        .await
        .expect("Failed to create Firestore client");

    let repo = TeamRepository::new(client.clone());

    let team = Team::new("Credit Test Team", "test_user_credits");
    let owner = TeamMember::new("test_user_credits", "credits@example.com", TeamRole::Owner);
    repo.create_with_owner(&team, &owner)
        .await
        .expect("Failed to create team");

    // Two 1-credit charges fit a limit of 3
    for _ in 0..2 {
        let outcome = repo
            .charge_credits(&team.team_id, 1, 3)
            .await
            .expect("Failed to charge credits");
        assert!(matches!(outcome, CreditChargeOutcome::Charged(_)));
    }

    // A 2-credit charge would land at 4 of 3
    let outcome = repo
        .charge_credits(&team.team_id, 2, 3)
        .await
        .expect("Failed to charge credits");
    match outcome {
        CreditChargeOutcome::InsufficientCredits {
            used,
            requested,
            limit,
        } => {
            assert_eq!(used, 2);
            assert_eq!(requested, 2);
            assert_eq!(limit, 3);
        }
        CreditChargeOutcome::Charged(_) => panic!("Charge past the limit must be rejected"),
    }

    // Rejection leaves the counter untouched
    let used = repo
        .credits_used(&team.team_id)
        .await
        .expect("Failed to read usage");
    assert_eq!(used, 2);

    // Cleanup
    repo.remove_member(&team.team_id, "test_user_credits")
        .await
        .expect("Failed to remove member");
    client
        .delete_document("teams", team.team_id.as_str())
        .await
        .expect("Failed to delete team");
}
