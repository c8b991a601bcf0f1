//! Compaction and claim-check behavior across the full stack.

use std::time::Duration;

use steward::routing::RoutingContext;
use steward::session::CompactionSettings;

mod common;

use common::{TestOptions, test_registry, test_registry_with, wait_until};

fn seeded_context() -> RoutingContext {
    let mut context = RoutingContext::new();
    context.set("client_id", "CL-1001");
    context
}

const PROMPTS: [&str; 6] = [
    "list my beneficiaries",
    "list my investment accounts",
    "what is my savings balance",
    "list my beneficiaries",
    "show my retirement account",
    "list my investment accounts",
];

// ============================================================================
// Compaction Transparency
// ============================================================================

#[tokio::test]
async fn compaction_between_turns_is_transparent() {
    let (registry, _workspace) = test_registry().await;

    // Twin sessions over the same records; one compacts mid-way.
    let plain = registry.create(seeded_context()).await.unwrap();
    let compacted = registry.create(seeded_context()).await.unwrap();

    for (i, prompt) in PROMPTS.iter().enumerate() {
        let _ = plain.process_message(prompt.to_string()).await.unwrap();
        let _ = compacted.process_message(prompt.to_string()).await.unwrap();

        if i == 2 {
            compacted.request_compaction().await.unwrap();
            // Give the loop a chance to hit the safe point.
            wait_until(Duration::from_secs(10), async || {
                compacted.metadata().await.unwrap().status
                    == steward::api::SessionStatus::Idle
            })
            .await;
        }
    }

    // Same routing decisions, same history growth.
    let plain_history = plain.history().await.unwrap();
    let compacted_history = compacted.history().await.unwrap();
    assert_eq!(plain_history, compacted_history);
    assert_eq!(
        plain.metadata().await.unwrap().active_role,
        compacted.metadata().await.unwrap().active_role
    );

    registry.shutdown().await;
}

#[tokio::test]
async fn explicit_compaction_truncates_the_log() {
    let (registry, _workspace) = test_registry().await;
    let handle = registry.create(seeded_context()).await.unwrap();
    let session_id = handle.id().to_string();

    for prompt in PROMPTS {
        let _ = handle.process_message(prompt.to_string()).await.unwrap();
    }
    let events_before = registry.store().load_events(&session_id, 0).await.unwrap();

    handle.request_compaction().await.unwrap();
    wait_until(Duration::from_secs(10), async || {
        let events = registry.store().load_events(&session_id, 0).await.unwrap();
        events.len() < events_before.len()
    })
    .await;

    // The session keeps working on the compacted log.
    let interactions = handle
        .process_message("list my beneficiaries".to_string())
        .await
        .unwrap();
    assert!(interactions[0].structured_response.contains("Fred"));

    registry.shutdown().await;
}

#[tokio::test]
async fn threshold_compaction_bounds_log_growth() {
    let (registry, workspace) = test_registry_with(TestOptions {
        compaction: CompactionSettings {
            enabled: true,
            event_threshold: 10,
            archive: true,
        },
        ..TestOptions::default()
    })
    .await;

    let handle = registry.create(seeded_context()).await.unwrap();
    let session_id = handle.id().to_string();

    for prompt in PROMPTS {
        let _ = handle.process_message(prompt.to_string()).await.unwrap();
    }

    // The live log stays bounded near the threshold.
    let events = registry.store().load_events(&session_id, 0).await.unwrap();
    assert!(
        events.len() < 20,
        "expected a compacted log, found {} events",
        events.len()
    );

    // Compacted-out events were archived, not lost.
    let archive_path = workspace
        .join("sessions")
        .join(&session_id)
        .join("events.archive.jsonl");
    assert!(archive_path.exists());

    // Restart after compaction reconstructs the session.
    let history_before = handle.history().await.unwrap();
    let role_before = handle.metadata().await.unwrap().active_role;
    registry.shutdown().await;

    let registry = common::registry_at(
        &workspace,
        &TestOptions {
            compaction: CompactionSettings {
                enabled: true,
                event_threshold: 10,
                archive: true,
            },
            ..TestOptions::default()
        },
    )
    .await;
    registry.recover().await.unwrap();

    let handle = registry.get(&session_id).unwrap();
    assert_eq!(handle.history().await.unwrap(), history_before);
    assert_eq!(handle.metadata().await.unwrap().active_role, role_before);

    registry.shutdown().await;
}

// ============================================================================
// Claim-Check Codec Across the Stack
// ============================================================================

#[tokio::test]
async fn oversized_outputs_are_claim_checked_transparently() {
    // A tiny threshold forces capability outputs through the codec.
    let (registry, workspace) = test_registry_with(TestOptions {
        codec_threshold: 64,
        ..TestOptions::default()
    })
    .await;

    let handle = registry.create(seeded_context()).await.unwrap();
    let session_id = handle.id().to_string();

    let interactions = handle
        .process_message("list my beneficiaries".to_string())
        .await
        .unwrap();
    assert!(interactions[0].structured_response.contains("Fred"));

    // Blobs were written for this session.
    let blobs_dir = workspace.join("blobs").join(&session_id);
    assert!(blobs_dir.exists());
    assert!(std::fs::read_dir(&blobs_dir).unwrap().count() > 0);

    // History and events read back decoded.
    let history = handle.history().await.unwrap();
    assert!(history[0].structured_response.contains("Fred"));
    let events = registry.store().load_events(&session_id, 0).await.unwrap();
    assert!(!events.is_empty());

    // Restart decodes everything from disk.
    registry.shutdown().await;
    let registry = common::registry_at(
        &workspace,
        &TestOptions {
            codec_threshold: 64,
            ..TestOptions::default()
        },
    )
    .await;
    registry.recover().await.unwrap();

    let handle = registry.get(&session_id).unwrap();
    let recovered = handle.history().await.unwrap();
    assert_eq!(recovered, history);

    registry.shutdown().await;
}
