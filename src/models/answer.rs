use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One persisted record per (attempt, task). The question text is captured
/// from the dialogue history at submission time so the report always shows
/// exactly what the user was asked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnsweredTask {
    #[serde(rename = "_id")]
    pub id: String,
    pub attempt_id: String,
    pub user_id: String,
    pub task_id: String,
    pub task_order: u32,
    pub attempt_number: u32,
    pub question: String,
    pub answer: String,
    pub completed_at: DateTime<Utc>,
}

impl AnsweredTask {
    pub fn new(
        attempt_id: &str,
        user_id: &str,
        task_id: &str,
        task_order: u32,
        attempt_number: u32,
        question: String,
        answer: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            attempt_id: attempt_id.to_string(),
            user_id: user_id.to_string(),
            task_id: task_id.to_string(),
            task_order,
            attempt_number,
            question,
            answer,
            completed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitAnswerRequest {
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub attempt_number: u32,
    pub final_report: String,
    pub completed_at: Option<DateTime<Utc>>,
}
