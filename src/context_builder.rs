//! Build the chat-completion message array for the assistant call.

use serde_json::{json, Value};

use crate::models::messages::Message;

const SYSTEM_PROMPT_BASE: &str = r#"You are an AI assistant specializing in data analysis and prediction for event organizers with 5 years experience.
Your main responsibilities are:
- Analyzing data related to events, such as number of participants, tickets sold, expenses, feedback, and other relevant metrics.
- Making predictions based on historical data (e.g., forecasting the number of attendees, estimating profits, identifying potential risks).
- Providing suggestions, recommendations, and optimization strategies to help make future events more successful.
- Focusing on optimizing aspects such as marketing, cost efficiency, venue and timing selection, and enhancing participant experience.
- Explaining your analyses and recommendations clearly, logically, and based on the available data.
- Always use professional yet easy-to-understand language.
- Never go off-topic from event organizing and data analysis.
- If the available data is insufficient, politely ask the user for additional necessary information.

Never discuss topics outside of event organizing or make predictions without a data-driven basis."#;

/// The organization blob goes in verbatim; an empty object stays `{}`.
pub fn build_system_prompt(organization_data: &Value) -> String {
    format!(
        "{}\n\nThis is the user's organization data: {}",
        SYSTEM_PROMPT_BASE, organization_data
    )
}

/// Map the stored transcript plus the incoming client message to the JSON
/// message array the chat API expects. The client message is dropped if a
/// row with its id is already part of the transcript (a retried request).
pub fn build_chat_messages(
    history: &[Message],
    client_message_id: uuid::Uuid,
    client_role: &str,
    client_content: &str,
) -> Vec<Value> {
    let mut out: Vec<Value> = history
        .iter()
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect();

    if !history.iter().any(|m| m.id == client_message_id) {
        out.push(json!({"role": client_role, "content": client_content}));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn stored(role: &str, content: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            chat_id: Uuid::new_v4(),
            role: role.to_string(),
            content: content.to_string(),
            meta_json: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_organization_data_is_embedded_verbatim() {
        let prompt = build_system_prompt(&json!({}));
        assert!(prompt.ends_with("This is the user's organization data: {}"));
    }

    #[test]
    fn organization_fields_appear_in_prompt() {
        let prompt = build_system_prompt(&json!({"venue": "Hall A", "capacity": 1200}));
        assert!(prompt.contains("\"venue\":\"Hall A\""));
        assert!(prompt.contains("\"capacity\":1200"));
    }

    #[test]
    fn client_message_is_appended_after_history() {
        let history = vec![stored("user", "hello"), stored("assistant", "hi there")];
        let msgs = build_chat_messages(&history, Uuid::new_v4(), "user", "how did we do?");

        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0]["role"], "user");
        assert_eq!(msgs[1]["role"], "assistant");
        assert_eq!(msgs[2]["content"], "how did we do?");
    }

    #[test]
    fn already_persisted_client_message_is_not_duplicated() {
        let existing = stored("user", "hello");
        let id = existing.id;
        let msgs = build_chat_messages(&[existing], id, "user", "hello");

        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn empty_history_yields_single_message() {
        let msgs = build_chat_messages(&[], Uuid::new_v4(), "user", "first!");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["role"], "user");
    }
}
