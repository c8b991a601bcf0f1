//! End-to-end session flow tests against the registry.

use std::time::Duration;

use steward::gate::REFUSAL_TEXT;
use steward::routing::RoutingContext;
use steward::session::ActorError;
use steward::tasks::WorkerCommand;

mod common;

use common::{TestOptions, test_registry, test_registry_with, wait_until};

fn seeded_context() -> RoutingContext {
    let mut context = RoutingContext::new();
    context.set("client_id", "CL-1001");
    context
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn history_reflects_submission_order() {
    let (registry, _workspace) = test_registry().await;
    let handle = registry.create(seeded_context()).await.unwrap();

    let prompts = [
        "list my beneficiaries",
        "list my investment accounts",
        "what is my savings balance",
        "list my beneficiaries again",
        "show my retirement account",
    ];
    for prompt in prompts {
        handle.submit_user_message(prompt.to_string()).await.unwrap();
    }

    wait_until(Duration::from_secs(10), async || {
        handle.history().await.unwrap().len() == prompts.len()
    })
    .await;

    let history = handle.history().await.unwrap();
    for (interaction, prompt) in history.iter().zip(prompts) {
        assert_eq!(interaction.user_prompt, prompt);
    }

    registry.shutdown().await;
}

#[tokio::test]
async fn queries_are_answerable_while_idle() {
    let (registry, _workspace) = test_registry().await;
    let handle = registry.create(RoutingContext::new()).await.unwrap();

    assert!(handle.history().await.unwrap().is_empty());
    let metadata = handle.metadata().await.unwrap();
    assert_eq!(metadata.active_role, "supervisor");

    registry.shutdown().await;
}

// ============================================================================
// Admission Gate
// ============================================================================

#[tokio::test]
async fn off_domain_message_gets_fixed_refusal() {
    let (registry, _workspace) = test_registry().await;
    let handle = registry.create(RoutingContext::new()).await.unwrap();

    let interactions = handle
        .process_message("what is the capital of France".to_string())
        .await
        .unwrap();

    assert_eq!(interactions.len(), 1);
    assert_eq!(interactions[0].text_response, REFUSAL_TEXT);
    // The reason lives in the trace, never in the response.
    assert!(interactions[0].trace.contains("admission gate"));
    assert!(interactions[0].structured_response.is_empty());

    registry.shutdown().await;
}

#[tokio::test]
async fn refusal_does_not_change_routing_state() {
    let (registry, _workspace) = test_registry().await;
    let handle = registry.create(seeded_context()).await.unwrap();

    // Move to the beneficiary role first.
    let _ = handle
        .process_message("list my beneficiaries".to_string())
        .await
        .unwrap();
    assert_eq!(handle.metadata().await.unwrap().active_role, "beneficiary");

    let interactions = handle
        .process_message("tell me a joke".to_string())
        .await
        .unwrap();
    assert_eq!(interactions[0].text_response, REFUSAL_TEXT);
    assert_eq!(handle.metadata().await.unwrap().active_role, "beneficiary");

    registry.shutdown().await;
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn oversized_message_rejected_before_queueing() {
    let (registry, _workspace) = test_registry().await;
    let handle = registry.create(RoutingContext::new()).await.unwrap();

    let oversized = "x".repeat(1001);
    let err = handle.process_message(oversized).await.unwrap_err();
    assert!(matches!(err, ActorError::Validation(_)));

    let err = handle.process_message(String::new()).await.unwrap_err();
    assert!(matches!(err, ActorError::Validation(_)));

    // Nothing entered history.
    assert!(handle.history().await.unwrap().is_empty());

    registry.shutdown().await;
}

// ============================================================================
// Routing and Capabilities
// ============================================================================

#[tokio::test]
async fn beneficiary_listing_embeds_tool_output() {
    let (registry, _workspace) = test_registry().await;
    let handle = registry.create(seeded_context()).await.unwrap();

    // First turn routes supervisor -> beneficiary.
    let interactions = handle
        .process_message("list my beneficiaries".to_string())
        .await
        .unwrap();
    assert_eq!(interactions.len(), 1);
    assert!(interactions[0].trace.contains("Handed off from supervisor to beneficiary"));
    assert!(interactions[0].structured_response.contains("Fred"));

    // Second turn: already at the beneficiary role, no handoff.
    let interactions = handle
        .process_message("list my beneficiaries".to_string())
        .await
        .unwrap();
    assert_eq!(interactions.len(), 1);
    assert!(interactions[0].trace.contains("invoking list_beneficiaries"));
    assert!(!interactions[0].trace.contains("Handed off"));

    registry.shutdown().await;
}

#[tokio::test]
async fn account_id_from_message_lands_in_context() {
    let (registry, _workspace) = test_registry().await;
    let handle = registry.create(RoutingContext::new()).await.unwrap();

    // No id yet: the specialist asks for one.
    let interactions = handle
        .process_message("list my beneficiaries".to_string())
        .await
        .unwrap();
    assert!(interactions[0].text_response.contains("account id"));

    // Bare id continues the routine and remembers the id.
    let interactions = handle
        .process_message("CL-1001".to_string())
        .await
        .unwrap();
    assert!(interactions[0].structured_response.contains("Sandy"));

    // Later turns reuse the remembered id.
    let interactions = handle
        .process_message("list my investment accounts".to_string())
        .await
        .unwrap();
    assert!(interactions[0].structured_response.contains("Retirement"));

    registry.shutdown().await;
}

#[tokio::test]
async fn fatal_task_failure_records_error_trace() {
    let (registry, _workspace) = test_registry().await;
    let mut context = RoutingContext::new();
    context.set("client_id", "CL-9999"); // unknown client
    let handle = registry.create(context).await.unwrap();

    let err = handle
        .process_message("list my beneficiaries".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::Turn(_)));

    // The failed turn still left an error-trace interaction, with no
    // partial output.
    let history = handle.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].text_response.is_empty());
    assert!(history[0].structured_response.is_empty());
    assert!(history[0].trace.contains("turn aborted"));

    // The session stays live.
    let interactions = handle
        .process_message("CL-1001".to_string())
        .await
        .unwrap();
    assert!(!interactions.is_empty());

    registry.shutdown().await;
}

// ============================================================================
// External Status and Termination
// ============================================================================

#[tokio::test]
async fn external_status_bypasses_gate_and_lands_in_history() {
    let (registry, _workspace) = test_registry().await;
    let handle = registry.create(RoutingContext::new()).await.unwrap();

    // Off-domain text would be refused as a user message; as a status
    // event it is recorded verbatim.
    handle
        .submit_external_status("New Retirement account status changed: Complete".to_string())
        .await
        .unwrap();

    wait_until(Duration::from_secs(10), async || {
        handle.history().await.unwrap().len() == 1
    })
    .await;

    let history = handle.history().await.unwrap();
    assert!(history[0].user_prompt.is_empty());
    assert!(history[0].text_response.contains("status changed"));

    registry.shutdown().await;
}

#[tokio::test]
async fn terminate_drains_queue_then_ends() {
    let (registry, _workspace) = test_registry().await;
    let handle = registry.create(seeded_context()).await.unwrap();

    handle
        .submit_user_message("list my beneficiaries".to_string())
        .await
        .unwrap();
    handle
        .submit_user_message("list my investment accounts".to_string())
        .await
        .unwrap();
    handle.terminate().await.unwrap();

    wait_until(Duration::from_secs(10), async || {
        handle.metadata().await.unwrap().status == steward::api::SessionStatus::Ended
    })
    .await;

    // Queued events drained before the end.
    let history = handle.history().await.unwrap();
    assert_eq!(history.len(), 2);

    // Synchronous turns are refused after the end; queries still work.
    let err = handle
        .process_message("list my beneficiaries".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::SessionEnded));
    assert_eq!(handle.history().await.unwrap().len(), 2);

    registry.shutdown().await;
}

// ============================================================================
// Recovery (at-most-once across restart)
// ============================================================================

#[tokio::test]
async fn restart_recovers_without_duplicating_turns() {
    let (registry, workspace) = test_registry().await;
    let handle = registry.create(seeded_context()).await.unwrap();
    let session_id = handle.id().to_string();

    let _ = handle
        .process_message("list my beneficiaries".to_string())
        .await
        .unwrap();
    let _ = handle
        .process_message("list my investment accounts".to_string())
        .await
        .unwrap();
    let history_before = handle.history().await.unwrap();
    let role_before = handle.metadata().await.unwrap().active_role;

    // Restart: new registry over the same workspace.
    registry.shutdown().await;
    let registry = common::registry_at(&workspace, &TestOptions::default()).await;
    let result = registry.recover().await.unwrap();
    assert_eq!(result.recovered, 1);

    let handle = registry.get(&session_id).unwrap();

    // No turn was applied twice.
    let history_after = handle.history().await.unwrap();
    assert_eq!(history_after, history_before);

    // Routing state survived: same role, context still remembered.
    assert_eq!(handle.metadata().await.unwrap().active_role, role_before);
    let interactions = handle
        .process_message("list my investment accounts".to_string())
        .await
        .unwrap();
    assert!(interactions[0].structured_response.contains("Checking"));

    registry.shutdown().await;
}

#[tokio::test]
async fn ended_sessions_are_not_recovered() {
    let (registry, workspace) = test_registry().await;
    let handle = registry.create(RoutingContext::new()).await.unwrap();
    let session_id = handle.id().to_string();

    handle.terminate().await.unwrap();
    wait_until(Duration::from_secs(10), async || {
        handle.metadata().await.unwrap().status == steward::api::SessionStatus::Ended
    })
    .await;
    registry.shutdown().await;

    let registry = common::registry_at(&workspace, &TestOptions::default()).await;
    let result = registry.recover().await.unwrap();
    assert_eq!(result.recovered, 0);
    assert_eq!(result.skipped, 1);
    assert!(registry.get(&session_id).is_none());

    registry.shutdown().await;
}

// ============================================================================
// Account-Opening Worker
// ============================================================================

#[tokio::test]
async fn account_opening_worker_feeds_status_back() {
    let worker = WorkerCommand {
        command: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            // Prints one state, echoes back the first signal, then
            // completes.
            "echo 'state: Waiting KYC'; read line; echo \"state: $line accepted\"; echo 'state: Complete'"
                .to_string(),
        ],
    };
    let (registry, _workspace) = test_registry_with(TestOptions {
        worker_command: Some(worker),
        ..TestOptions::default()
    })
    .await;

    let handle = registry.create(seeded_context()).await.unwrap();

    let interactions = handle
        .process_message("open a retirement account with 2500".to_string())
        .await
        .unwrap();
    assert!(interactions[0].structured_response.contains("Initializing"));
    assert_eq!(handle.metadata().await.unwrap().active_role, "open-account");

    // The worker's stdout lines come back as external status events.
    wait_until(Duration::from_secs(10), async || {
        handle
            .history()
            .await
            .unwrap()
            .iter()
            .any(|i| i.text_response.contains("Waiting KYC"))
    })
    .await;

    // Approving KYC signals the worker over stdin.
    let _ = handle
        .process_message("please approve kyc".to_string())
        .await
        .unwrap();

    wait_until(Duration::from_secs(10), async || {
        let history = handle.history().await.unwrap();
        history.iter().any(|i| i.text_response.contains("accepted"))
            && history.iter().any(|i| i.text_response.contains("Complete"))
    })
    .await;

    registry.shutdown().await;
}

#[tokio::test]
async fn unconfigured_worker_fails_the_turn() {
    let (registry, _workspace) = test_registry().await;
    let handle = registry.create(seeded_context()).await.unwrap();

    let err = handle
        .process_message("open a retirement account".to_string())
        .await
        .unwrap_err();
    match err {
        ActorError::Turn(message) => assert!(message.contains("not configured")),
        other => panic!("expected turn error, got {other:?}"),
    }

    registry.shutdown().await;
}
