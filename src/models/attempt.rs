use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    SystemGenerated,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub speaker: Speaker,
    pub text: String,
}

/// One numbered run of a user through a profession's scenario. The latest
/// attempt_number per (user, profession) is the only mutable one; older
/// attempts are immutable history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub profession_id: String,
    pub attempt_number: u32,
    pub status: AttemptStatus,
    /// Order of the last answered task; 0 = none answered yet.
    pub current_task_order: u32,
    pub dialogue_history: Vec<DialogueTurn>,
    pub final_report: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Attempt {
    pub fn new(
        user_id: &str,
        profession_id: &str,
        attempt_number: u32,
        status: AttemptStatus,
    ) -> Self {
        let started_at = match status {
            AttemptStatus::NotStarted => None,
            _ => Some(Utc::now()),
        };
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            profession_id: profession_id.to_string(),
            attempt_number,
            status,
            current_task_order: 0,
            dialogue_history: Vec::new(),
            final_report: None,
            started_at,
            completed_at: None,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == AttemptStatus::InProgress
    }

    pub fn is_completed(&self) -> bool {
        self.status == AttemptStatus::Completed
    }

    /// Lazy start on first task fetch.
    pub fn begin(&mut self) {
        if self.status == AttemptStatus::NotStarted {
            self.status = AttemptStatus::InProgress;
            self.started_at = Some(Utc::now());
        }
    }

    pub fn record_turn(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.dialogue_history.push(DialogueTurn {
            speaker,
            text: text.into(),
        });
    }

    /// Cached question for the current step: only valid when the latest
    /// history entry is a system-generated turn (a user turn after it means
    /// the step moved on).
    pub fn cached_question(&self) -> Option<&str> {
        match self.dialogue_history.last() {
            Some(turn) if turn.speaker == Speaker::SystemGenerated => Some(&turn.text),
            _ => None,
        }
    }

    /// Most recent system-generated turn, regardless of what follows it.
    /// Backward scan is fine: history length is bounded by the task count.
    pub fn last_generated(&self) -> Option<&str> {
        self.dialogue_history
            .iter()
            .rev()
            .find(|turn| turn.speaker == Speaker::SystemGenerated)
            .map(|turn| turn.text.as_str())
    }

    /// Monotonically non-decreasing; moving the pointer backwards is a
    /// programming error, not user input.
    pub fn advance(&mut self, task_order: u32) {
        debug_assert!(task_order >= self.current_task_order);
        if task_order > self.current_task_order {
            self.current_task_order = task_order;
        }
    }

    /// Terminal transition. Clears the dialogue history (only the answered
    /// task records and the report survive completion). Returns false when
    /// the attempt is already completed so an existing report is never
    /// overwritten.
    pub fn complete(&mut self, report: impl Into<String>) -> bool {
        if self.is_completed() {
            return false;
        }
        self.status = AttemptStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.final_report = Some(report.into());
        self.dialogue_history.clear();
        true
    }
}

/// Compact view of one attempt, used by the progress-history endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptSummary {
    pub attempt_number: u32,
    pub status: AttemptStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub has_report: bool,
}

impl From<&Attempt> for AttemptSummary {
    fn from(attempt: &Attempt) -> Self {
        Self {
            attempt_number: attempt.attempt_number,
            status: attempt.status,
            started_at: attempt.started_at,
            completed_at: attempt.completed_at,
            has_report: attempt.final_report.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_question_requires_generated_turn_last() {
        let mut attempt = Attempt::new("u1", "p1", 1, AttemptStatus::InProgress);
        assert!(attempt.cached_question().is_none());

        attempt.record_turn(Speaker::SystemGenerated, "Q1");
        assert_eq!(attempt.cached_question(), Some("Q1"));

        attempt.record_turn(Speaker::User, "A1");
        assert!(attempt.cached_question().is_none());
        assert_eq!(attempt.last_generated(), Some("Q1"));
    }

    #[test]
    fn complete_clears_history_and_guards_report() {
        let mut attempt = Attempt::new("u1", "p1", 1, AttemptStatus::InProgress);
        attempt.record_turn(Speaker::SystemGenerated, "Q1");
        attempt.record_turn(Speaker::User, "A1");

        assert!(attempt.complete("the report"));
        assert!(attempt.dialogue_history.is_empty());
        assert_eq!(attempt.status, AttemptStatus::Completed);
        assert_eq!(attempt.final_report.as_deref(), Some("the report"));

        // Second completion must not overwrite the report.
        assert!(!attempt.complete("another report"));
        assert_eq!(attempt.final_report.as_deref(), Some("the report"));
    }

    #[test]
    fn advance_is_monotone() {
        let mut attempt = Attempt::new("u1", "p1", 1, AttemptStatus::InProgress);
        attempt.advance(1);
        attempt.advance(2);
        assert_eq!(attempt.current_task_order, 2);
    }

    #[test]
    fn begin_only_moves_out_of_not_started() {
        let mut attempt = Attempt::new("u1", "p1", 1, AttemptStatus::NotStarted);
        assert!(attempt.started_at.is_none());
        attempt.begin();
        assert_eq!(attempt.status, AttemptStatus::InProgress);
        assert!(attempt.started_at.is_some());

        attempt.complete("done");
        attempt.begin();
        assert_eq!(attempt.status, AttemptStatus::Completed);
    }
}
