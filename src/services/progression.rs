use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::EngineError;
use crate::metrics::{record_cache_hit, record_cache_miss, ANSWERS_SUBMITTED_TOTAL};
use crate::models::{
    AnsweredTask, Attempt, Profession, Scenario, Speaker, TaskDone, TaskMetadata, TaskStreamEvent,
    TaskTemplate,
};
use crate::services::ai_client::{AiClient, AiError, CompletionRequest};
use crate::services::attempt_service::AttemptService;
use crate::services::conversation::{
    answer_turn_text, build_messages, initial_task_prompt, transition_prompt,
};
use crate::services::locks::{AttemptLockGuard, AttemptLocks};
use crate::services::report::{report_request, REPORT_FAILURE_MESSAGE};
use crate::services::store::ProgressStore;

pub const QUESTION_TEMPERATURE: f32 = 0.7;
pub const QUESTION_MAX_TOKENS: u32 = 1000;

const EVENT_BUFFER: usize = 64;

/// Drives a user through a profession's scenario: question generation and
/// caching, answer submission, and the final report. Every public operation
/// takes the per-(user, profession) lock before touching the attempt, and
/// streamed work holds it until the stream finishes.
pub struct ProgressionEngine {
    store: Arc<dyn ProgressStore>,
    ai: Arc<dyn AiClient>,
    locks: AttemptLocks,
    attempts: AttemptService,
}

/// Everything a streaming worker needs after the pre-checks passed. The lock
/// guard rides along so it is released when the stream task ends.
struct StreamContext {
    store: Arc<dyn ProgressStore>,
    ai: Arc<dyn AiClient>,
    tx: mpsc::Sender<TaskStreamEvent>,
    _guard: AttemptLockGuard,
}

impl StreamContext {
    async fn send(&self, event: TaskStreamEvent) {
        // A failed send means the client disconnected; generation and
        // persistence still run to completion.
        let _ = self.tx.send(event).await;
    }

    async fn send_error(&self, error: &EngineError, message: &str) {
        self.send(TaskStreamEvent::Error {
            kind: error.kind().to_string(),
            message: message.to_string(),
        })
        .await;
    }

    /// Forward a token stream, accumulating the full text.
    async fn pump_tokens(
        &self,
        request: CompletionRequest,
        report: bool,
    ) -> Result<String, AiError> {
        let mut rx = self.ai.complete_stream(request).await?;
        let mut full = String::new();
        while let Some(item) = rx.recv().await {
            let token = item?;
            full.push_str(&token);
            let event = if report {
                TaskStreamEvent::ReportToken { token }
            } else {
                TaskStreamEvent::Token { token }
            };
            self.send(event).await;
        }
        if full.is_empty() {
            return Err(AiError::Api("empty stream".to_string()));
        }
        Ok(full)
    }
}

impl ProgressionEngine {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        ai: Arc<dyn AiClient>,
        locks: AttemptLocks,
        max_attempts: u32,
    ) -> Self {
        let attempts = AttemptService::new(store.clone(), max_attempts);
        Self {
            store,
            ai,
            locks,
            attempts,
        }
    }

    pub fn attempts(&self) -> &AttemptService {
        &self.attempts
    }

    async fn scenario(&self, profession_id: &str) -> Result<Scenario, EngineError> {
        self.store
            .get_scenario(profession_id)
            .await
            .map_err(EngineError::persistence)?
            .ok_or(EngineError::NotFound("scenario"))
    }

    fn spawn_stream(
        &self,
        guard: AttemptLockGuard,
    ) -> (StreamContext, mpsc::Receiver<TaskStreamEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let ctx = StreamContext {
            store: self.store.clone(),
            ai: self.ai.clone(),
            tx,
            _guard: guard,
        };
        (ctx, rx)
    }

    /// Stream the current task's question. Serves the cached question when
    /// the latest dialogue turn is system-generated; otherwise generates,
    /// records the new turn, and persists before the `done` event. A
    /// completed attempt has no current task; the report endpoint serves
    /// the stored report and a restart opens the next attempt.
    pub async fn fetch_current(
        &self,
        user_id: &str,
        profession_id: &str,
    ) -> Result<mpsc::Receiver<TaskStreamEvent>, EngineError> {
        let guard = self
            .locks
            .acquire(user_id, profession_id)
            .await
            .map_err(EngineError::persistence)?;

        let mut attempt = self.attempts.current_or_seed(user_id, profession_id).await?;
        let profession = self.attempts.get_profession(profession_id).await?;
        let scenario = self.scenario(profession_id).await?;

        if attempt.is_completed() {
            return Err(EngineError::NoMoreTasks);
        }

        let next_order = attempt.current_task_order + 1;
        let task = self
            .store
            .get_task_by_order(&scenario.id, next_order)
            .await
            .map_err(EngineError::persistence)?;

        let Some(task) = task else {
            if attempt.current_task_order == 0 {
                // Scenario ships without tasks.
                return Err(EngineError::NoMoreTasks);
            }
            // Every task answered but no report yet: an earlier report
            // generation failed, retry it now.
            let (ctx, rx) = self.spawn_stream(guard);
            let template = self.report_template_text(profession_id).await?;
            tokio::spawn(async move {
                run_report_stream(ctx, attempt, scenario, profession, template).await;
            });
            return Ok(rx);
        };

        attempt.begin();

        if let Some(question) = attempt.cached_question() {
            record_cache_hit();
            let question = question.to_string();
            let task_id = task.id.clone();
            self.store
                .update_attempt(&attempt)
                .await
                .map_err(EngineError::persistence)?;
            let (ctx, rx) = self.spawn_stream(guard);
            tokio::spawn(async move {
                ctx.send(TaskStreamEvent::Metadata(TaskMetadata::for_task(&task)))
                    .await;
                ctx.send(TaskStreamEvent::Done(TaskDone {
                    full_text: question,
                    task_id: Some(task_id),
                    completed: false,
                    cached: true,
                    fallback: false,
                }))
                .await;
            });
            return Ok(rx);
        }

        record_cache_miss();
        let prompt = if next_order == 1 {
            initial_task_prompt(&task)
        } else {
            // Re-fetch after a lost generation: rebuild the transition from
            // the answer that moved the pointer here.
            let prev = self.answer_text(&attempt.id, next_order - 1).await?;
            transition_prompt(next_order - 1, &prev, &task)
        };
        // The transition turn carries the previous answer itself, so no
        // further dialogue history is sent alongside it.
        let request = CompletionRequest {
            messages: build_messages(&scenario, &[], &prompt),
            temperature: QUESTION_TEMPERATURE,
            max_tokens: QUESTION_MAX_TOKENS,
        };

        let (ctx, rx) = self.spawn_stream(guard);
        tokio::spawn(async move {
            run_question_stream(ctx, attempt, task, request).await;
        });
        Ok(rx)
    }

    /// Record the answer to the identified task, then stream the next
    /// question (or the report when this was the last task). The answer
    /// record, dialogue turn, and task pointer are all persisted before
    /// generation starts, so a failed or abandoned stream never loses the
    /// submission.
    pub async fn submit_answer(
        &self,
        user_id: &str,
        task_id: &str,
        answer: &str,
    ) -> Result<mpsc::Receiver<TaskStreamEvent>, EngineError> {
        let task = self
            .store
            .get_task(task_id)
            .await
            .map_err(EngineError::persistence)?
            .ok_or(EngineError::NotFound("task"))?;
        let scenario = self
            .store
            .get_scenario_by_id(&task.scenario_id)
            .await
            .map_err(EngineError::persistence)?
            .ok_or(EngineError::NotFound("scenario"))?;
        let profession_id = scenario.profession_id.clone();

        let guard = self
            .locks
            .acquire(user_id, &profession_id)
            .await
            .map_err(EngineError::persistence)?;

        let profession = self.attempts.get_profession(&profession_id).await?;
        self.attempts.ensure_access(user_id, &profession).await?;
        let mut attempt = self
            .store
            .latest_attempt(user_id, &profession_id)
            .await
            .map_err(EngineError::persistence)?
            .ok_or(EngineError::NotFound("attempt"))?;
        if attempt.is_completed() {
            return Err(EngineError::NoMoreTasks);
        }

        // An already answered task is a duplicate no matter where the pointer
        // is now: a client retry after a lost response must not land on the
        // next task.
        if self
            .store
            .answered_exists(&attempt.id, &task.id)
            .await
            .map_err(EngineError::persistence)?
        {
            return Err(EngineError::DuplicateSubmission);
        }

        let order = task.order;
        if order != attempt.current_task_order + 1 {
            return Err(EngineError::Invalid("task is not the attempt's current task"));
        }

        // The report later quotes the question exactly as shown, so capture
        // it from the history. A submission without any generated turn (a
        // lost or wiped history) gets one non-streamed regeneration; if that
        // fails too, the raw template stands in.
        let question = match attempt.last_generated() {
            Some(text) => text.to_string(),
            None => {
                let prompt = if order == 1 {
                    initial_task_prompt(&task)
                } else {
                    let prev = self.answer_text(&attempt.id, order - 1).await?;
                    transition_prompt(order - 1, &prev, &task)
                };
                let request = CompletionRequest {
                    messages: build_messages(&scenario, &[], &prompt),
                    temperature: QUESTION_TEMPERATURE,
                    max_tokens: QUESTION_MAX_TOKENS,
                };
                match self.ai.complete(request).await {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(task_id = %task.id, "Question recovery failed: {}", e);
                        task.description_template.clone()
                    }
                }
            }
        };
        let answered = AnsweredTask::new(
            &attempt.id,
            user_id,
            &task.id,
            order,
            attempt.attempt_number,
            question,
            answer.to_string(),
        );

        attempt.begin();
        attempt.record_turn(Speaker::User, answer_turn_text(order, answer));
        attempt.advance(order);

        self.store
            .insert_answered_task(&answered)
            .await
            .map_err(EngineError::persistence)?;
        self.store
            .update_attempt(&attempt)
            .await
            .map_err(EngineError::persistence)?;
        ANSWERS_SUBMITTED_TOTAL.inc();

        let next_task = self
            .store
            .get_task_by_order(&scenario.id, order + 1)
            .await
            .map_err(EngineError::persistence)?;

        match next_task {
            Some(next) => {
                let request = CompletionRequest {
                    messages: build_messages(
                        &scenario,
                        &[],
                        &transition_prompt(order, answer, &next),
                    ),
                    temperature: QUESTION_TEMPERATURE,
                    max_tokens: QUESTION_MAX_TOKENS,
                };
                let (ctx, rx) = self.spawn_stream(guard);
                tokio::spawn(async move {
                    run_question_stream(ctx, attempt, next, request).await;
                });
                Ok(rx)
            }
            None => {
                let template = self.report_template_text(&profession_id).await?;
                let (ctx, rx) = self.spawn_stream(guard);
                tokio::spawn(async move {
                    run_report_stream(ctx, attempt, scenario, profession, template).await;
                });
                Ok(rx)
            }
        }
    }

    /// The stored answer for one task of an attempt, used to rebuild a
    /// transition prompt after the original generation was lost.
    async fn answer_text(&self, attempt_id: &str, task_order: u32) -> Result<String, EngineError> {
        self.store
            .answered_for_attempt(attempt_id)
            .await
            .map_err(EngineError::persistence)?
            .into_iter()
            .find(|a| a.task_order == task_order)
            .map(|a| a.answer)
            .ok_or(EngineError::NotFound("answer"))
    }

    /// Read-only report access for a completed attempt. Defaults to the
    /// latest attempt when no number is given.
    pub async fn final_report(
        &self,
        user_id: &str,
        profession_id: &str,
        attempt_number: Option<u32>,
    ) -> Result<Attempt, EngineError> {
        let attempt = match attempt_number {
            Some(number) => {
                self.attempts
                    .by_number(user_id, profession_id, number)
                    .await?
            }
            None => self
                .store
                .latest_attempt(user_id, profession_id)
                .await
                .map_err(EngineError::persistence)?
                .ok_or(EngineError::NotFound("attempt"))?,
        };
        if !attempt.is_completed() || attempt.final_report.is_none() {
            return Err(EngineError::NotFound("report"));
        }
        Ok(attempt)
    }

    async fn report_template_text(
        &self,
        profession_id: &str,
    ) -> Result<Option<String>, EngineError> {
        Ok(self
            .store
            .get_report_template(profession_id)
            .await
            .map_err(EngineError::persistence)?
            .map(|t| t.template_text))
    }
}

/// Generate one question, streaming tokens, then persist the new dialogue
/// turn before `done`. On generation failure the raw task description is
/// served and recorded instead, so the question shown always matches the
/// question the report will quote.
async fn run_question_stream(
    ctx: StreamContext,
    mut attempt: Attempt,
    task: TaskTemplate,
    request: CompletionRequest,
) {
    ctx.send(TaskStreamEvent::Metadata(TaskMetadata::for_task(&task)))
        .await;

    let (question, fallback) = match ctx.pump_tokens(request, false).await {
        Ok(text) => (text, false),
        Err(e) => {
            tracing::warn!(task_id = %task.id, "Question generation failed: {}", e);
            (task.description_template.clone(), true)
        }
    };

    attempt.record_turn(Speaker::SystemGenerated, question.clone());
    if let Err(e) = ctx.store.update_attempt(&attempt).await {
        let err = EngineError::persistence(e);
        tracing::error!("Failed to persist generated question: {:#}", err);
        ctx.send_error(&err, "Could not save the task, please retry.")
            .await;
        return;
    }

    ctx.send(TaskStreamEvent::Done(TaskDone {
        full_text: question,
        task_id: Some(task.id),
        completed: false,
        cached: false,
        fallback,
    }))
    .await;
}

/// Generate the final report and complete the attempt. A failed generation
/// leaves the attempt in progress so the next fetch retries; answers are
/// already persisted either way.
async fn run_report_stream(
    ctx: StreamContext,
    mut attempt: Attempt,
    scenario: Scenario,
    profession: Profession,
    template: Option<String>,
) {
    ctx.send(TaskStreamEvent::Metadata(TaskMetadata::for_report()))
        .await;

    let answered = match ctx.store.answered_for_attempt(&attempt.id).await {
        Ok(answered) => answered,
        Err(e) => {
            let err = EngineError::persistence(e);
            tracing::error!("Failed to load answers for report: {:#}", err);
            ctx.send_error(&err, REPORT_FAILURE_MESSAGE).await;
            return;
        }
    };

    let request = report_request(
        &scenario.system_prompt,
        template.as_deref(),
        &profession,
        &answered,
    );
    let report = match ctx.pump_tokens(request, true).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(
                profession_id = %profession.id,
                "Report generation failed: {}",
                e
            );
            ctx.send_error(&EngineError::Generation(e), REPORT_FAILURE_MESSAGE)
                .await;
            return;
        }
    };

    if attempt.complete(report.clone()) {
        if let Err(e) = ctx.store.update_attempt(&attempt).await {
            let err = EngineError::persistence(e);
            tracing::error!("Failed to persist completed attempt: {:#}", err);
            ctx.send_error(&err, REPORT_FAILURE_MESSAGE).await;
            return;
        }
    }

    ctx.send(TaskStreamEvent::Completed {
        final_report: report,
    })
    .await;
}
