use serde::Serialize;

use crate::models::catalog::TaskTemplate;

/// Events emitted by the progression engine over SSE. The wire shape is
/// `{"type": ..., "data": {...}}`; metadata always precedes the first token
/// so clients can render a shell immediately, and `done`/`completed` is the
/// last event of a successful stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TaskStreamEvent {
    Metadata(TaskMetadata),
    Token { token: String },
    ReportToken { token: String },
    Done(TaskDone),
    Completed { final_report: String },
    Error { kind: String, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit_minutes: Option<u32>,
    pub completed: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub generating_report: bool,
}

impl TaskMetadata {
    pub fn for_task(task: &TaskTemplate) -> Self {
        Self {
            id: Some(task.id.clone()),
            order: Some(task.order),
            category: Some(task.category.clone()),
            time_limit_minutes: Some(task.time_limit_minutes),
            completed: false,
            generating_report: false,
        }
    }

    pub fn for_report() -> Self {
        Self {
            id: None,
            order: None,
            category: None,
            time_limit_minutes: None,
            completed: true,
            generating_report: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskDone {
    pub full_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub completed: bool,
    /// Question came from the dialogue-history cache, no AI call was made.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cached: bool,
    /// Generation failed; the raw template text is served instead.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

impl TaskStreamEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            TaskStreamEvent::Metadata(_) => "metadata",
            TaskStreamEvent::Token { .. } => "token",
            TaskStreamEvent::ReportToken { .. } => "report-token",
            TaskStreamEvent::Done(_) => "done",
            TaskStreamEvent::Completed { .. } => "completed",
            TaskStreamEvent::Error { .. } => "error",
        }
    }

    pub fn to_sse_data(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
