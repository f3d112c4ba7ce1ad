use std::sync::Arc;

use profsim_api::error::EngineError;
use profsim_api::models::{AnsweredTask, AttemptStatus, TaskStreamEvent};
use profsim_api::services::ai_client::{AiError, ScriptedAiClient};
use profsim_api::services::memory_store::MemoryStore;
use profsim_api::services::store::ProgressStore;

mod common;

#[tokio::test]
async fn first_fetch_streams_and_persists_the_question() {
    let store = Arc::new(MemoryStore::new());
    common::seed_catalog(&store, 2);
    let ai = Arc::new(ScriptedAiClient::with_responses([
        "Welcome to your first assignment.",
    ]));
    let engine = common::engine(store.clone(), ai.clone());

    let events = common::drain(
        engine
            .fetch_current(common::USER, common::PROFESSION)
            .await
            .unwrap(),
    )
    .await;

    assert!(matches!(events.first(), Some(TaskStreamEvent::Metadata(m)) if !m.completed));
    let done = events.last().unwrap();
    let TaskStreamEvent::Done(done) = done else {
        panic!("expected a done event, got {:?}", done);
    };
    assert_eq!(done.full_text, "Welcome to your first assignment.");
    assert_eq!(done.task_id.as_deref(), Some("t1"));
    assert!(!done.cached);
    assert_eq!(common::token_text(&events), done.full_text);

    // The generated question is now part of the attempt.
    let attempt = store
        .latest_attempt(common::USER, common::PROFESSION)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attempt.status, AttemptStatus::InProgress);
    assert_eq!(
        attempt.cached_question(),
        Some("Welcome to your first assignment.")
    );
}

#[tokio::test]
async fn refetch_serves_the_cached_question_without_an_ai_call() {
    let store = Arc::new(MemoryStore::new());
    common::seed_catalog(&store, 2);
    let ai = Arc::new(ScriptedAiClient::with_responses(["The question text."]));
    let engine = common::engine(store.clone(), ai.clone());

    let first = common::drain(
        engine
            .fetch_current(common::USER, common::PROFESSION)
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(ai.calls(), 1);

    let second = common::drain(
        engine
            .fetch_current(common::USER, common::PROFESSION)
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(ai.calls(), 1, "cache hit must not invoke the AI");

    let TaskStreamEvent::Done(first_done) = first.last().unwrap() else {
        panic!("expected done");
    };
    let TaskStreamEvent::Done(cached_done) = second.last().unwrap() else {
        panic!("expected done");
    };
    assert!(cached_done.cached);
    assert_eq!(cached_done.full_text, first_done.full_text);
}

#[tokio::test]
async fn full_walk_ends_in_a_completed_attempt_with_a_report() {
    let store = Arc::new(MemoryStore::new());
    common::seed_catalog(&store, 2);
    let ai = Arc::new(ScriptedAiClient::with_responses([
        "Question one.",
        "Question two.",
        "Final report body.",
    ]));
    let engine = common::engine(store.clone(), ai.clone());

    common::drain(
        engine
            .fetch_current(common::USER, common::PROFESSION)
            .await
            .unwrap(),
    )
    .await;

    // Answering task 1 streams the task 2 question.
    let events = common::drain(
        engine
            .submit_answer(common::USER, "t1", "my first answer")
            .await
            .unwrap(),
    )
    .await;
    let TaskStreamEvent::Done(done) = events.last().unwrap() else {
        panic!("expected done");
    };
    assert_eq!(done.full_text, "Question two.");
    assert_eq!(done.task_id.as_deref(), Some("t2"));

    // Answering the last task streams the report and completes the attempt.
    let events = common::drain(
        engine
            .submit_answer(common::USER, "t2", "my second answer")
            .await
            .unwrap(),
    )
    .await;
    assert!(matches!(
        events.first(),
        Some(TaskStreamEvent::Metadata(m)) if m.completed && m.generating_report
    ));
    let TaskStreamEvent::Completed { final_report } = events.last().unwrap() else {
        panic!("expected completed, got {:?}", events.last());
    };
    assert_eq!(final_report, "Final report body.");
    assert_eq!(common::token_text(&events), "Final report body.");

    let attempt = store
        .latest_attempt(common::USER, common::PROFESSION)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attempt.status, AttemptStatus::Completed);
    assert!(attempt.dialogue_history.is_empty());
    assert_eq!(attempt.final_report.as_deref(), Some("Final report body."));

    // A completed attempt serves no further tasks; the report stays
    // readable through the report path and a restart opens attempt #2.
    let calls = ai.calls();
    let err = engine
        .fetch_current(common::USER, common::PROFESSION)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoMoreTasks));
    assert_eq!(ai.calls(), calls);

    let report = engine
        .final_report(common::USER, common::PROFESSION, None)
        .await
        .unwrap();
    assert_eq!(report.final_report.as_deref(), Some("Final report body."));

    // And submitting again is rejected outright.
    let err = engine
        .submit_answer(common::USER, "t2", "late answer")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoMoreTasks));
}

#[tokio::test]
async fn report_prompt_quotes_every_exchange_in_order() {
    let store = Arc::new(MemoryStore::new());
    common::seed_catalog(&store, 2);
    let ai = Arc::new(ScriptedAiClient::with_responses([
        "Question one.",
        "Question two.",
        "Report.",
    ]));
    let engine = common::engine(store.clone(), ai.clone());

    common::drain(
        engine
            .fetch_current(common::USER, common::PROFESSION)
            .await
            .unwrap(),
    )
    .await;
    common::drain(
        engine
            .submit_answer(common::USER, "t1", "answer alpha")
            .await
            .unwrap(),
    )
    .await;
    common::drain(
        engine
            .submit_answer(common::USER, "t2", "answer beta")
            .await
            .unwrap(),
    )
    .await;

    let requests = ai.requests();
    let report_request = requests.last().unwrap();
    let prompt = &report_request.messages.last().unwrap().content;

    let q1 = prompt.find("Question one.").unwrap();
    let a1 = prompt.find("answer alpha").unwrap();
    let q2 = prompt.find("Question two.").unwrap();
    let a2 = prompt.find("answer beta").unwrap();
    assert!(q1 < a1 && a1 < q2 && q2 < a2);
    assert_eq!(report_request.temperature, 0.5);

    // The scenario voice carries through to the report request.
    assert_eq!(
        report_request.messages.first().unwrap().content,
        "You are the trainee's team lead at a product company."
    );
}

#[tokio::test]
async fn transition_request_carries_the_submitted_answer() {
    let store = Arc::new(MemoryStore::new());
    common::seed_catalog(&store, 2);
    let ai = Arc::new(ScriptedAiClient::with_responses([
        "Question one.",
        "Question two.",
    ]));
    let engine = common::engine(store.clone(), ai.clone());

    common::drain(
        engine
            .fetch_current(common::USER, common::PROFESSION)
            .await
            .unwrap(),
    )
    .await;
    common::drain(
        engine
            .submit_answer(common::USER, "t1", "I escalated the outage first")
            .await
            .unwrap(),
    )
    .await;

    // The next-question request is the system prompt plus one transition
    // turn quoting the answer just given.
    let requests = ai.requests();
    let transition = &requests[1];
    assert_eq!(transition.messages.len(), 2);
    let prompt = &transition.messages[1].content;
    assert!(prompt.contains("task #1"));
    assert!(prompt.contains("I escalated the outage first"));
    assert!(prompt.contains("Task 2 description"));
}

#[tokio::test]
async fn question_failure_falls_back_to_the_template_text() {
    let store = Arc::new(MemoryStore::new());
    common::seed_catalog(&store, 2);
    let ai = Arc::new(ScriptedAiClient::new());
    ai.push_failure(AiError::Timeout);
    let engine = common::engine(store.clone(), ai.clone());

    let events = common::drain(
        engine
            .fetch_current(common::USER, common::PROFESSION)
            .await
            .unwrap(),
    )
    .await;

    let TaskStreamEvent::Done(done) = events.last().unwrap() else {
        panic!("expected done, got {:?}", events.last());
    };
    assert!(done.fallback);
    assert_eq!(done.full_text, "Task 1 description");

    // The fallback text is recorded, so the next fetch serves it from cache
    // and keeps the shown question consistent.
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
    assert!(done.cached);
    assert_eq!(done.full_text, "Task 1 description");
    assert_eq!(ai.calls(), calls);
}

#[tokio::test]
async fn report_failure_keeps_the_attempt_open_and_a_later_fetch_retries() {
    let store = Arc::new(MemoryStore::new());
    common::seed_catalog(&store, 1);
    let ai = Arc::new(ScriptedAiClient::with_responses(["Only question."]));
    let engine = common::engine(store.clone(), ai.clone());

    common::drain(
        engine
            .fetch_current(common::USER, common::PROFESSION)
            .await
            .unwrap(),
    )
    .await;

    ai.push_failure(AiError::Api("upstream 500".to_string()));
    let events = common::drain(
        engine
            .submit_answer(common::USER, "t1", "the answer")
            .await
            .unwrap(),
    )
    .await;
    assert!(matches!(
        events.last(),
        Some(TaskStreamEvent::Error { kind, .. }) if kind == "generation_failure"
    ));

    // Answer is safe, attempt still open.
    let attempt = store
        .latest_attempt(common::USER, common::PROFESSION)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attempt.status, AttemptStatus::InProgress);
    let answered = store.answered_for_attempt(&attempt.id).await.unwrap();
    assert_eq!(answered.len(), 1);
    assert_eq!(answered[0].answer, "the answer");

    // The next fetch retries only the report.
    ai.push("Recovered report.");
    let events = common::drain(
        engine
            .fetch_current(common::USER, common::PROFESSION)
            .await
            .unwrap(),
    )
    .await;
    assert!(matches!(
        events.last(),
        Some(TaskStreamEvent::Completed { final_report }) if final_report == "Recovered report."
    ));

    let attempt = store
        .latest_attempt(common::USER, common::PROFESSION)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attempt.status, AttemptStatus::Completed);
    assert!(attempt.dialogue_history.is_empty());
}

#[tokio::test]
async fn resubmitting_an_already_answered_task_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    common::seed_catalog(&store, 2);
    let ai = Arc::new(ScriptedAiClient::with_responses(["Question one."]));
    let engine = common::engine(store.clone(), ai.clone());

    common::drain(
        engine
            .fetch_current(common::USER, common::PROFESSION)
            .await
            .unwrap(),
    )
    .await;

    // Simulate a crash after the answer record landed but before the task
    // pointer moved: the record exists, the attempt still points at task 1.
    let attempt = store
        .latest_attempt(common::USER, common::PROFESSION)
        .await
        .unwrap()
        .unwrap();
    let answered = AnsweredTask::new(
        &attempt.id,
        common::USER,
        "t1",
        1,
        attempt.attempt_number,
        "Question one.".to_string(),
        "earlier answer".to_string(),
    );
    store.insert_answered_task(&answered).await.unwrap();

    let err = engine
        .submit_answer(common::USER, "t1", "second try")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateSubmission));

    // The original record is untouched.
    let records = store.answered_for_attempt(&attempt.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].answer, "earlier answer");
}

#[tokio::test]
async fn a_retry_of_an_already_accepted_submission_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    common::seed_catalog(&store, 2);
    let ai = Arc::new(ScriptedAiClient::with_responses([
        "Question one.",
        "Question two.",
    ]));
    let engine = common::engine(store.clone(), ai.clone());

    common::drain(
        engine
            .fetch_current(common::USER, common::PROFESSION)
            .await
            .unwrap(),
    )
    .await;
    common::drain(
        engine
            .submit_answer(common::USER, "t1", "answer for task one")
            .await
            .unwrap(),
    )
    .await;

    // The client lost the response and sends the same submission again.
    // It must not be recorded as the answer to task 2.
    let err = engine
        .submit_answer(common::USER, "t1", "answer for task one")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateSubmission));

    let attempt = store
        .latest_attempt(common::USER, common::PROFESSION)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attempt.current_task_order, 1);
    let records = store.answered_for_attempt(&attempt.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].task_id, "t1");
}

#[tokio::test]
async fn submitting_a_task_ahead_of_the_pointer_is_invalid() {
    let store = Arc::new(MemoryStore::new());
    common::seed_catalog(&store, 2);
    let ai = Arc::new(ScriptedAiClient::with_responses(["Question one."]));
    let engine = common::engine(store.clone(), ai.clone());

    common::drain(
        engine
            .fetch_current(common::USER, common::PROFESSION)
            .await
            .unwrap(),
    )
    .await;

    let err = engine
        .submit_answer(common::USER, "t2", "skipping ahead")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Invalid(_)));
}

#[tokio::test]
async fn a_scenario_without_tasks_yields_no_more_tasks() {
    let store = Arc::new(MemoryStore::new());
    common::seed_catalog(&store, 0);
    let ai = Arc::new(ScriptedAiClient::new());
    let engine = common::engine(store.clone(), ai.clone());

    let err = engine
        .fetch_current(common::USER, common::PROFESSION)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoMoreTasks));
    assert_eq!(ai.calls(), 0);
}
