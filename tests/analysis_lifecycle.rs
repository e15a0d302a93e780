mod common;

use std::sync::Arc;
use std::time::Duration;

use callsight::{AnalysisPhase, CallsightController, ControllerError, ConversationMetrics};
use common::{test_settings, wav_fixture, OFFLINE_API_URL};

#[tokio::test]
async fn start_without_source_fails_and_leaves_flags_alone() {
    let controller = offline_controller();
    let err = controller
        .start_analysis()
        .await
        .expect_err("analysis without a source must fail");
    assert!(matches!(err, ControllerError::NoSource));

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.phase, AnalysisPhase::Idle);
    assert!(!snapshot.is_analyzing);
    assert!(!snapshot.is_analysis_complete);
}

#[tokio::test]
async fn unreachable_endpoint_completes_via_simulation_within_bound() {
    let controller = offline_controller();
    load_fixture(&controller).await;

    let started = std::time::Instant::now();
    controller
        .start_analysis()
        .await
        .expect("fallback should complete");
    assert!(started.elapsed() < Duration::from_secs(4));

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.phase, AnalysisPhase::Complete);
    assert!(snapshot.is_analysis_complete);
    assert!(!snapshot.is_analyzing);
    assert!(!snapshot.metrics.transcript.is_empty());
    for line in &snapshot.metrics.transcript {
        assert!(
            line.starts_with("Agent: ") || line.starts_with("Customer: "),
            "transcript line missing speaker tag: {line}"
        );
    }
    assert!(snapshot.metrics.conversation_type.is_some());
    assert!(!snapshot.metrics.summary.is_empty());
    let tones = &snapshot.metrics.tone_analysis;
    assert!(tones.is_consistent());
    assert_eq!(tones.scores.len(), tones.timestamps.len());
    assert!(!tones.is_empty());
}

#[tokio::test]
async fn tone_series_stays_consistent_at_every_observation() {
    let controller = Arc::new(offline_controller());
    load_fixture(&controller).await;

    let running = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.start_analysis().await })
    };

    // Sample the model mid-flight; paired lengths and ordering must hold at
    // every point, not just at completion.
    let mut observations = 0;
    loop {
        let snapshot = controller.snapshot().await;
        let tones = &snapshot.metrics.tone_analysis;
        assert_eq!(tones.scores.len(), tones.timestamps.len());
        assert!(tones.is_consistent());
        if snapshot.is_analysis_complete {
            break;
        }
        observations += 1;
        assert!(observations < 1_000, "analysis never completed");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    running
        .await
        .expect("run should not panic")
        .expect("run should complete");
}

#[tokio::test]
async fn second_start_while_in_flight_is_rejected() {
    let controller = Arc::new(offline_controller());
    load_fixture(&controller).await;

    let first = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.start_analysis().await })
    };
    wait_until_analyzing(&controller).await;

    let err = controller
        .start_analysis()
        .await
        .expect_err("overlapping analysis must be rejected");
    assert!(matches!(err, ControllerError::AlreadyInProgress));

    first
        .await
        .expect("first run should not panic")
        .expect("first run should complete");
    assert!(controller.snapshot().await.is_analysis_complete);
}

#[tokio::test]
async fn loading_a_new_file_while_analyzing_is_rejected() {
    let controller = Arc::new(offline_controller());
    load_fixture(&controller).await;

    let running = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.start_analysis().await })
    };
    wait_until_analyzing(&controller).await;

    let err = controller
        .load_source("other.wav", "audio/wav", wav_fixture(0.1))
        .await
        .expect_err("load during analysis must be rejected");
    assert!(matches!(err, ControllerError::AlreadyInProgress));

    running
        .await
        .expect("run should not panic")
        .expect("run should complete");
    // The original clip is still the loaded one.
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.source_name.as_deref(), Some("call.wav"));
}

#[tokio::test]
async fn reset_mid_simulation_stops_all_further_mutation() {
    let controller = Arc::new(offline_controller());
    load_fixture(&controller).await;

    let running = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.start_analysis().await })
    };
    wait_until_analyzing(&controller).await;
    // Let a few simulation steps land before pulling the plug.
    tokio::time::sleep(Duration::from_millis(60)).await;

    controller.reset().await;
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.phase, AnalysisPhase::Idle);
    assert!(!snapshot.has_source);
    assert_eq!(snapshot.metrics, ConversationMetrics::default());

    running
        .await
        .expect("cancelled run should not panic")
        .expect("cancelled run resolves quietly");

    // Longer than the remaining simulation would have run; nothing may have
    // written into the replaced model.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.phase, AnalysisPhase::Idle);
    assert_eq!(snapshot.metrics, ConversationMetrics::default());
}

#[tokio::test]
async fn completed_analysis_can_be_rerun() {
    let controller = offline_controller();
    load_fixture(&controller).await;

    controller
        .start_analysis()
        .await
        .expect("first run should complete");
    assert!(controller.snapshot().await.is_analysis_complete);

    controller
        .start_analysis()
        .await
        .expect("re-run should complete");
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.phase, AnalysisPhase::Complete);
    assert!(snapshot.metrics.conversation_type.is_some());
}

#[tokio::test]
async fn reset_after_completion_returns_to_idle_zero_model() {
    let controller = offline_controller();
    load_fixture(&controller).await;
    controller
        .start_analysis()
        .await
        .expect("run should complete");

    controller.reset().await;
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.phase, AnalysisPhase::Idle);
    assert!(!snapshot.has_source);
    assert!(snapshot.source_name.is_none());
    assert_eq!(snapshot.metrics, ConversationMetrics::default());
}

fn offline_controller() -> CallsightController {
    CallsightController::new(&test_settings(OFFLINE_API_URL)).expect("controller should build")
}

async fn load_fixture(controller: &CallsightController) {
    controller
        .load_source("call.wav", "audio/wav", wav_fixture(0.25))
        .await
        .expect("load should succeed");
}

async fn wait_until_analyzing(controller: &CallsightController) {
    for _ in 0..100 {
        if controller.snapshot().await.is_analyzing {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("analysis never reached the analyzing phase");
}
