//! End-to-end pipeline tests driving the orchestrator with scripted tool
//! invokers.

mod helpers;

use cardlab_common::events::StepKind;
use cardlab_cp::models::{CardPair, ProcessingOptions};
use cardlab_cp::services::tool_client::Capability;
use helpers::{Behavior, ScriptedInvoker};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn pair() -> CardPair {
    CardPair::new(Some(b"front image".to_vec()), Some(b"back image".to_vec()))
}

#[tokio::test]
async fn default_options_run_the_full_pipeline() {
    let invoker = Arc::new(ScriptedInvoker::new());
    let state = helpers::test_state(invoker.clone());
    let session_id = state.sessions.create().await;

    let outcome = state
        .orchestrator()
        .run_batch(session_id, vec![pair()], ProcessingOptions::default(), CancellationToken::new())
        .await;

    assert_eq!(outcome.summary.total_cards, 1);
    assert_eq!(outcome.summary.successful, 1);
    assert_eq!(outcome.summary.success_rate, "100.0%");

    let result = &outcome.results[0];
    assert!(result.is_clean());
    for step in [
        "front_orientation_verified",
        "front_background_removed",
        "front_identified",
        "front_graded",
        "front_description_generated",
        "back_orientation_verified",
        "back_background_removed",
        "back_graded",
    ] {
        assert!(
            result.steps_completed.iter().any(|s| s == step),
            "missing step {}",
            step
        );
    }
    assert!(!result.steps_completed.iter().any(|s| s == "back_identified"));
    assert!(!result.steps_completed.iter().any(|s| s == "back_description_generated"));
    assert!(!result.steps_completed.iter().any(|s| s.contains("enhanced")));

    assert_eq!(result.identification.as_ref().unwrap().display_name(), "Charizard");
    assert!(result.listing_description.is_some());
    // Both sides graded 8.5 final, so the combined grade stays 8.5
    assert_eq!(result.grade.as_ref().unwrap().final_grade, Some(8.5));

    let events = state.sessions.events_from(session_id, 0).await.unwrap();
    assert_eq!(events.first().unwrap().kind, StepKind::Start);
    assert_eq!(events.last().unwrap().kind, StepKind::Complete);
    assert!(
        events.iter().any(|e| e
            .identification_hint
            .as_ref()
            .is_some_and(|h| h.card_name == "Charizard")),
        "identification hint should ride on a narrated event"
    );
}

#[tokio::test]
async fn back_side_is_never_identified_enhanced_or_described() {
    let invoker = Arc::new(ScriptedInvoker::new());
    let state = helpers::test_state(invoker.clone());
    let session_id = state.sessions.create().await;

    let options = ProcessingOptions { enhance: true, ..ProcessingOptions::default() };
    let outcome = state
        .orchestrator()
        .run_batch(session_id, vec![pair()], options, CancellationToken::new())
        .await;

    assert_eq!(invoker.call_count(Capability::IdentifyCard), 1);
    assert_eq!(invoker.call_count(Capability::GenerateDescription), 1);
    assert_eq!(invoker.call_count(Capability::EnhanceImage), 1);
    // Shared steps run for both sides
    assert_eq!(invoker.call_count(Capability::CheckOrientation), 2);
    assert_eq!(invoker.call_count(Capability::GradeCard), 2);

    let result = &outcome.results[0];
    assert!(result.steps_completed.iter().any(|s| s == "front_enhanced"));
    assert!(!result.steps_completed.iter().any(|s| s == "back_enhanced"));
}

#[tokio::test(start_paused = true)]
async fn grading_timeout_does_not_sink_the_rest_of_the_pair() {
    let invoker = Arc::new(
        ScriptedInvoker::new().with_behavior(Capability::GradeCard, Behavior::Stall),
    );
    let state = helpers::test_state_with_timeouts(
        invoker.clone(),
        Duration::from_secs(1),
        Duration::from_secs(1),
    );
    let session_id = state.sessions.create().await;

    let outcome = state
        .orchestrator()
        .run_batch(session_id, vec![pair()], ProcessingOptions::default(), CancellationToken::new())
        .await;

    let result = &outcome.results[0];
    assert!(!result.is_clean());
    assert!(
        result
            .errors
            .iter()
            .any(|e| e.contains("grade_card failed") && e.contains("timed out")),
        "timeout should be recorded as a step error: {:?}",
        result.errors
    );
    // Steps after the failed grade still ran
    assert!(result.steps_completed.iter().any(|s| s == "front_description_generated"));
    assert!(result.grade.is_none());
    assert_eq!(outcome.summary.failed, 1);
}

#[tokio::test]
async fn missing_side_fails_the_pair_with_zero_tool_calls() {
    let invoker = Arc::new(ScriptedInvoker::new());
    let state = helpers::test_state(invoker.clone());
    let session_id = state.sessions.create().await;

    let broken = CardPair::new(None, Some(b"back image".to_vec()));
    let outcome = state
        .orchestrator()
        .run_batch(session_id, vec![broken], ProcessingOptions::default(), CancellationToken::new())
        .await;

    assert!(invoker.calls().is_empty(), "no capability may run for an invalid pair");
    let result = &outcome.results[0];
    assert_eq!(result.errors, vec!["No front image data provided"]);
    assert!(result.steps_completed.is_empty());
    assert_eq!(outcome.summary.failed, 1);
}

#[tokio::test]
async fn all_selections_off_still_checks_orientation() {
    let invoker = Arc::new(ScriptedInvoker::new());
    let state = helpers::test_state(invoker.clone());
    let session_id = state.sessions.create().await;

    let options = ProcessingOptions {
        remove_background: false,
        identify: false,
        grade: false,
        enhance: false,
        generate_description: false,
    };
    let outcome = state
        .orchestrator()
        .run_batch(session_id, vec![pair()], options, CancellationToken::new())
        .await;

    let calls = invoker.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| *c == Capability::CheckOrientation));

    let result = &outcome.results[0];
    assert_eq!(
        result.steps_completed,
        vec!["front_orientation_verified", "back_orientation_verified"]
    );
    assert!(result.is_clean());
}

#[tokio::test]
async fn rotation_is_applied_once_when_needed() {
    let invoker = Arc::new(ScriptedInvoker::new().with_behavior(
        Capability::CheckOrientation,
        Behavior::Envelope(json!({
            "success": true,
            "needs_rotation": true,
            "rotation_angle": -90.0,
        })),
    ));
    let state = helpers::test_state(invoker.clone());
    let session_id = state.sessions.create().await;

    let outcome = state
        .orchestrator()
        .run_batch(session_id, vec![pair()], ProcessingOptions::default(), CancellationToken::new())
        .await;

    // One rotation per side, never more
    assert_eq!(invoker.call_count(Capability::RotateImage), 2);

    let result = &outcome.results[0];
    assert!(result.steps_completed.iter().any(|s| s == "front_orientation_corrected"));
    assert!(result.front.orientation_corrected.is_some());
}

#[tokio::test]
async fn failed_step_does_not_abort_the_remaining_plan() {
    let invoker = Arc::new(ScriptedInvoker::new().with_behavior(
        Capability::RemoveBackground,
        Behavior::Fail("model crashed".to_string()),
    ));
    let state = helpers::test_state(invoker.clone());
    let session_id = state.sessions.create().await;

    let outcome = state
        .orchestrator()
        .run_batch(session_id, vec![pair()], ProcessingOptions::default(), CancellationToken::new())
        .await;

    let result = &outcome.results[0];
    assert!(
        result.errors.iter().any(|e| e.contains("remove_background failed") && e.contains("model crashed")),
        "errors: {:?}",
        result.errors
    );
    // Identification still ran, against the unprocessed image
    assert!(result.steps_completed.iter().any(|s| s == "front_identified"));
    assert!(result.steps_completed.iter().any(|s| s == "front_graded"));
    assert_eq!(outcome.summary.failed, 1);
}

#[tokio::test]
async fn two_pair_batch_narrates_in_submission_order() {
    let invoker = Arc::new(ScriptedInvoker::new());
    let state = helpers::test_state(invoker.clone());
    let session_id = state.sessions.create().await;

    let outcome = state
        .orchestrator()
        .run_batch(
            session_id,
            vec![pair(), pair()],
            ProcessingOptions::default(),
            CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome.summary.total_cards, 2);

    let events = state.sessions.events_from(session_id, 0).await.unwrap();
    assert_eq!(events[0].kind, StepKind::Start);
    assert_eq!(events[1].kind, StepKind::Planning);
    assert_eq!(events.last().unwrap().kind, StepKind::Complete);

    let first_pair = events
        .iter()
        .position(|e| e.message.contains("card pair 1 of 2"))
        .expect("pair 1 announcement");
    let second_pair = events
        .iter()
        .position(|e| e.message.contains("card pair 2 of 2"))
        .expect("pair 2 announcement");
    assert!(first_pair < second_pair);

    let transitions = events
        .iter()
        .filter(|e| e.message.contains("Moving on to the next one"))
        .count();
    assert_eq!(transitions, 1, "no transition message after the final pair");
}

#[tokio::test]
async fn one_pair_failure_leaves_other_pairs_untouched() {
    let invoker = Arc::new(ScriptedInvoker::new());
    let state = helpers::test_state(invoker.clone());
    let session_id = state.sessions.create().await;

    let broken = CardPair::new(Some(b"front image".to_vec()), None);
    let outcome = state
        .orchestrator()
        .run_batch(
            session_id,
            vec![broken, pair()],
            ProcessingOptions::default(),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.summary.total_cards, 2);
    assert_eq!(outcome.summary.successful, 1);
    assert_eq!(outcome.summary.failed, 1);
    assert_eq!(outcome.summary.success_rate, "50.0%");
    assert!(!outcome.results[0].is_clean());
    assert!(outcome.results[1].is_clean());
}
