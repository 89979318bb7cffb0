use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tokens::estimate_tokens;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// A single turn in a conversation. Immutable once created.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default = "new_id")] // Generate a new id if missing during deserialization
    pub id: String,
    pub text: String,
    pub is_user: bool,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    // Cached estimate of `text`, set once at creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<usize>,
}

impl Message {
    /// Creates a message with a fresh id and its token cost cached.
    pub fn new(text: impl Into<String>, is_user: bool) -> Self {
        let text = text.into();
        let tokens = estimate_tokens(&text);
        Self {
            id: new_id(),
            text,
            is_user,
            timestamp: Utc::now(),
            tokens: Some(tokens),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, true)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(text, false)
    }

    /// Token cost of this message: the cached value, or a fresh estimate.
    pub fn token_cost(&self) -> usize {
        self.tokens.unwrap_or_else(|| estimate_tokens(&self.text))
    }
}

pub const DEFAULT_CONVERSATION_TITLE: &str = "New Chat";

// An ordered message history bound to a provider and model
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub provider_id: String,
    pub model_name: String,
    // Copied in at creation or on an explicit prompt switch; not kept in sync
    // with the per-(provider, model) preference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_title() -> String {
    DEFAULT_CONVERSATION_TITLE.to_string()
}

impl Conversation {
    pub fn new(
        provider_id: impl Into<String>,
        model_name: impl Into<String>,
        system_prompt: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            title: default_title(),
            messages: Vec::new(),
            provider_id: provider_id.into(),
            model_name: model_name.into(),
            system_prompt,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_CONVERSATION_TITLE
    }
}

// A named, reusable instruction block
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemPrompt {
    pub id: String,
    pub name: String,
    pub prompt: String,
    #[serde(default)]
    pub is_default: bool,
    // Present for callers that want to filter; lookup ignores them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

// Provider-facing turn
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

// Reply from a completion call
#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub content: String,
    pub usage: Option<Usage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_message_caches_its_token_cost() {
        let msg = Message::user("hello there");
        assert_eq!(msg.tokens, Some(3));
        assert_eq!(msg.token_cost(), 3);
    }

    #[test]
    fn token_cost_falls_back_to_estimate() {
        let mut msg = Message::assistant("abcdefgh");
        msg.tokens = None;
        assert_eq!(msg.token_cost(), 2);
    }

    #[test]
    fn conversation_decodes_camel_case_with_iso_timestamps() {
        let raw = r#"{
            "id": "c1",
            "title": "Trip plans",
            "messages": [
                {"id": "m1", "text": "hi", "isUser": true, "timestamp": "2024-05-01T10:00:00.000Z"}
            ],
            "providerId": "openai",
            "modelName": "gpt-4o",
            "createdAt": "2024-05-01T09:59:00.000Z",
            "updatedAt": "2024-05-01T10:00:00.000Z"
        }"#;
        let conv: Conversation = serde_json::from_str(raw).unwrap();
        assert_eq!(conv.messages.len(), 1);
        assert!(conv.messages[0].is_user);
        assert_eq!(conv.messages[0].tokens, None);
        assert_eq!(conv.system_prompt, None);
        assert_eq!(
            conv.created_at,
            "2024-05-01T09:59:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn missing_title_defaults_to_new_chat() {
        let raw = r#"{"id": "c2", "providerId": "openai", "modelName": "gpt-4o"}"#;
        let conv: Conversation = serde_json::from_str(raw).unwrap();
        assert!(conv.has_default_title());
        assert!(conv.messages.is_empty());
    }

    #[test]
    fn role_serializes_lowercase() {
        let turn = Turn { role: Role::Assistant, content: "ok".into() };
        assert_eq!(
            serde_json::to_string(&turn).unwrap(),
            r#"{"role":"assistant","content":"ok"}"#
        );
    }
}
