use crate::models::{DialogueTurn, Scenario, Speaker, TaskTemplate};
use crate::services::ai_client::ChatMessage;

/// Prompt asking the AI to phrase the first task of a scenario.
pub fn initial_task_prompt(task: &TaskTemplate) -> String {
    format!(
        "Present the following task to the trainee as a realistic work assignment. \
         Keep the professional framing of the scenario and address the trainee \
         directly. Task: {}",
        task.description_template
    )
}

/// Prompt asking the AI to phrase the next task as a continuation of the
/// working day. The previous answer is folded into the prompt itself, which
/// is why the transition is sent with an empty dialogue history: this single
/// turn already carries the context the model needs.
pub fn transition_prompt(prev_order: u32, prev_answer: &str, next: &TaskTemplate) -> String {
    format!(
        "The trainee answered task #{} with: {}\n\nIntroduce the next task as a \
         natural continuation of the working day, reacting briefly to that \
         answer. Task: {}",
        prev_order, prev_answer, next.description_template
    )
}

/// Text recorded as the user's turn when an answer is submitted.
pub fn answer_turn_text(task_order: u32, answer: &str) -> String {
    format!("Answered task #{}: {}", task_order, answer)
}

/// Map a dialogue history onto chat messages with the scenario's system
/// prompt first. System-generated turns become assistant messages, user
/// turns become user messages, in recorded order.
pub fn build_messages(
    scenario: &Scenario,
    history: &[DialogueTurn],
    prompt: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(scenario.system_prompt.clone()));
    for turn in history {
        messages.push(match turn.speaker {
            Speaker::SystemGenerated => ChatMessage::assistant(turn.text.clone()),
            Speaker::User => ChatMessage::user(turn.text.clone()),
        });
    }
    messages.push(ChatMessage::user(prompt.to_string()));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ai_client::MessageRole;

    fn scenario() -> Scenario {
        Scenario {
            id: "s1".to_string(),
            profession_id: "p1".to_string(),
            system_prompt: "You are a senior colleague.".to_string(),
        }
    }

    #[test]
    fn history_maps_to_roles_in_order() {
        let history = vec![
            DialogueTurn {
                speaker: Speaker::SystemGenerated,
                text: "First question".to_string(),
            },
            DialogueTurn {
                speaker: Speaker::User,
                text: "My answer".to_string(),
            },
        ];
        let messages = build_messages(&scenario(), &history, "next please");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].content, "First question");
        assert_eq!(messages[2].role, MessageRole::User);
        assert_eq!(messages[3].role, MessageRole::User);
        assert_eq!(messages[3].content, "next please");
    }

    #[test]
    fn transition_prompt_carries_the_previous_answer() {
        let next = TaskTemplate {
            id: "t2".to_string(),
            scenario_id: "s1".to_string(),
            order: 2,
            category: "analysis".to_string(),
            time_limit_minutes: 15,
            description_template: "Draft the quarterly summary".to_string(),
        };
        let prompt = transition_prompt(1, "I sorted the tickets by impact", &next);

        assert!(prompt.contains("task #1"));
        assert!(prompt.contains("I sorted the tickets by impact"));
        assert!(prompt.contains("Draft the quarterly summary"));
    }

    #[test]
    fn empty_history_yields_system_plus_prompt() {
        let messages = build_messages(&scenario(), &[], "prompt");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[1].role, MessageRole::User);
    }
}
