use std::fmt::Write as _;

use crate::models::{AnsweredTask, Profession};
use crate::services::ai_client::{ChatMessage, CompletionRequest};

/// Used when a profession ships without a report template of its own.
pub const DEFAULT_REPORT_TEMPLATE: &str = "You are a senior mentor reviewing a trainee's \
    simulated working day. Write a structured performance report: strengths, weaknesses, \
    and concrete recommendations for each answer. Address the trainee directly.";

/// Served instead of a report when generation fails; the attempt stays open
/// so a later request can retry.
pub const REPORT_FAILURE_MESSAGE: &str = "We could not prepare your report right now. \
    Your answers are saved; please try again in a few minutes.";

pub const REPORT_TEMPERATURE: f32 = 0.5;
pub const REPORT_MAX_TOKENS: u32 = 2000;

/// Every question and answer of the attempt, in task order, under the
/// profession heading. The report must be able to quote what was actually
/// asked, so questions come from the persisted records, not the templates.
pub fn build_report_prompt(profession: &Profession, answered: &[AnsweredTask]) -> String {
    let mut prompt = format!(
        "Profession: {}\n\nThe trainee completed {} tasks. Review each exchange:\n",
        profession.name,
        answered.len()
    );
    for record in answered {
        let _ = write!(
            prompt,
            "\nTask {}:\nQuestion: {}\nAnswer: {}\n",
            record.task_order, record.question, record.answer
        );
    }
    prompt.push_str("\nNow write the final report.");
    prompt
}

/// The scenario's system prompt stays the system message, exactly as during
/// the working day; the template and the Q/A pairs form the user turn.
pub fn report_request(
    system_prompt: &str,
    template_text: Option<&str>,
    profession: &Profession,
    answered: &[AnsweredTask],
) -> CompletionRequest {
    let prompt = format!(
        "{}\n\n{}",
        template_text.unwrap_or(DEFAULT_REPORT_TEMPLATE),
        build_report_prompt(profession, answered)
    );
    CompletionRequest {
        messages: vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(prompt),
        ],
        temperature: REPORT_TEMPERATURE,
        max_tokens: REPORT_MAX_TOKENS,
    }
}
