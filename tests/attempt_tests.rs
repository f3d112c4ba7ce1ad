use std::sync::Arc;

use profsim_api::error::EngineError;
use profsim_api::models::{AttemptStatus, TaskStreamEvent};
use profsim_api::services::ai_client::ScriptedAiClient;
use profsim_api::services::memory_store::MemoryStore;

mod common;

async fn complete_one_task_run(
    engine: &profsim_api::services::progression::ProgressionEngine,
    answer: &str,
) {
    common::drain(
        engine
            .fetch_current(common::USER, common::PROFESSION)
            .await
            .unwrap(),
    )
    .await;
    let events = common::drain(
        engine
            .submit_answer(common::USER, "t1", answer)
            .await
            .unwrap(),
    )
    .await;
    assert!(matches!(
        events.last(),
        Some(TaskStreamEvent::Completed { .. })
    ));
}

#[tokio::test]
async fn restart_opens_a_clean_attempt_and_keeps_old_reports_readable() {
    let store = Arc::new(MemoryStore::new());
    common::seed_catalog(&store, 1);
    let ai = Arc::new(ScriptedAiClient::with_responses([
        "First run question.",
        "First run report.",
        "Second run question.",
    ]));
    let engine = common::engine(store.clone(), ai.clone());

    complete_one_task_run(&engine, "first run answer").await;

    let second = engine
        .attempts()
        .restart(common::USER, common::PROFESSION)
        .await
        .unwrap();
    assert_eq!(second.attempt_number, 2);
    assert_eq!(second.status, AttemptStatus::NotStarted);
    assert!(second.dialogue_history.is_empty());

    // The fresh attempt regenerates its own question instead of reusing the
    // first attempt's dialogue.
    let calls = ai.calls();
    let events = common::drain(
        engine
            .fetch_current(common::USER, common::PROFESSION)
            .await
            .unwrap(),
    )
    .await;
    let TaskStreamEvent::Done(done) = events.last().unwrap() else {
        panic!("expected done");
    };
    assert_eq!(done.full_text, "Second run question.");
    assert_eq!(ai.calls(), calls + 1);

    // Attempt 1's report stays addressable by number.
    let first = engine
        .final_report(common::USER, common::PROFESSION, Some(1))
        .await
        .unwrap();
    assert_eq!(first.final_report.as_deref(), Some("First run report."));

    // The latest attempt has no report yet.
    let err = engine
        .final_report(common::USER, common::PROFESSION, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound("report")));
}

#[tokio::test]
async fn restarts_stop_at_the_attempt_ceiling() {
    let store = Arc::new(MemoryStore::new());
    common::seed_catalog(&store, 1);
    let ai = Arc::new(ScriptedAiClient::new());
    let engine = common::engine(store.clone(), ai.clone());
    let attempts = engine.attempts();

    attempts
        .current_or_seed(common::USER, common::PROFESSION)
        .await
        .unwrap();
    attempts.restart(common::USER, common::PROFESSION).await.unwrap();
    attempts.restart(common::USER, common::PROFESSION).await.unwrap();

    let err = attempts
        .restart(common::USER, common::PROFESSION)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::AttemptLimitExceeded(common::MAX_ATTEMPTS)
    ));

    let history = attempts
        .history(common::USER, common::PROFESSION)
        .await
        .unwrap();
    assert_eq!(history.len(), common::MAX_ATTEMPTS as usize);
}
