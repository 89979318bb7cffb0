use anyhow::Context;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use crate::models::Conversation;
use crate::storage::KeyValueStore;

pub const CONVERSATIONS_KEY: &str = "conversations";
pub const CURRENT_CONVERSATION_KEY: &str = "current_conversation_id";

const TITLE_MAX_CHARS: usize = 50;
const TITLE_ELLIPSIS: &str = "...";

/// Derives a conversation title from the first user message.
///
/// Newlines become spaces. Titles longer than 50 characters are cut to 47
/// characters followed by `"..."`.
pub fn estimate_title(first_user_text: &str) -> String {
    let collapsed = first_user_text.replace("\r\n", " ").replace(['\n', '\r'], " ");
    if collapsed.chars().count() <= TITLE_MAX_CHARS {
        return collapsed;
    }
    let keep = TITLE_MAX_CHARS - TITLE_ELLIPSIS.len();
    let mut title: String = collapsed.chars().take(keep).collect();
    title.push_str(TITLE_ELLIPSIS);
    title
}

/// Persists all conversations as one JSON list under a single key.
///
/// `save` and `delete` are read-modify-write over that key without locking:
/// two concurrent writers can lose an update. Callers are expected to
/// serialize writes (a single UI task does).
#[derive(Clone)]
pub struct ConversationStore {
    store: Arc<dyn KeyValueStore>,
}

impl ConversationStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Loads the raw record list. Records are kept as JSON so rewrites preserve
    /// entries this version cannot decode.
    async fn load_raw(&self) -> Result<Vec<Value>, anyhow::Error> {
        let Some(blob) = self.store.get(CONVERSATIONS_KEY).await? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&blob).context("Failed to parse stored conversation list")
    }

    async fn store_raw(&self, records: &[Value]) -> Result<(), anyhow::Error> {
        let blob = serde_json::to_string(records).context("Failed to serialize conversations")?;
        self.store.set(CONVERSATIONS_KEY, &blob).await
    }

    fn record_id(record: &Value) -> Option<&str> {
        record.get("id").and_then(Value::as_str)
    }

    /// Lists every decodable conversation in storage order.
    ///
    /// Never fails: a storage error yields an empty list, and a corrupt record
    /// is skipped with a warning.
    pub async fn list(&self) -> Vec<Conversation> {
        let records = match self.load_raw().await {
            Ok(records) => records,
            Err(e) => {
                log::error!("Failed to load conversations: {:?}", e);
                return Vec::new();
            }
        };

        let conversations: Vec<Conversation> = records
            .into_iter()
            .enumerate()
            .filter_map(|(index, record)| {
                let id = Self::record_id(&record).unwrap_or("<no id>").to_string();
                match serde_json::from_value::<Conversation>(record) {
                    Ok(conv) => Some(conv),
                    Err(e) => {
                        log::warn!("Skipping unreadable conversation #{} ({}): {}", index, id, e);
                        None
                    }
                }
            })
            .collect();

        log::debug!("Loaded {} conversations", conversations.len());
        conversations
    }

    pub async fn get(&self, id: &str) -> Option<Conversation> {
        self.list().await.into_iter().find(|c| c.id == id)
    }

    /// Like `get`, but an unreadable collection or record is an error instead
    /// of a miss.
    pub async fn find(&self, id: &str) -> Result<Option<Conversation>, anyhow::Error> {
        let records = self.load_raw().await?;
        let Some(record) = records.into_iter().find(|r| Self::record_id(r) == Some(id)) else {
            return Ok(None);
        };
        let conversation = serde_json::from_value(record)
            .with_context(|| format!("Failed to parse stored conversation {}", id))?;
        Ok(Some(conversation))
    }

    /// Creates and persists an empty conversation.
    pub async fn create(
        &self,
        provider_id: impl Into<String>,
        model_name: impl Into<String>,
        system_prompt: Option<String>,
    ) -> Result<Conversation, anyhow::Error> {
        let mut conversation = Conversation::new(provider_id, model_name, system_prompt);
        self.save(&mut conversation).await?;
        Ok(conversation)
    }

    /// Upserts `conversation` by id and refreshes its `updated_at`.
    pub async fn save(&self, conversation: &mut Conversation) -> Result<(), anyhow::Error> {
        conversation.updated_at = Utc::now();
        let record = serde_json::to_value(&*conversation).context("Failed to serialize conversation")?;

        let mut records = self.load_raw().await?;
        match records
            .iter()
            .position(|r| Self::record_id(r) == Some(conversation.id.as_str()))
        {
            Some(index) => records[index] = record,
            None => records.push(record),
        }

        self.store_raw(&records)
            .await
            .with_context(|| format!("Failed to save conversation {}", conversation.id))?;
        log::info!("Saved conversation {} ({} messages)", conversation.id, conversation.messages.len());
        Ok(())
    }

    /// Removes the conversation, clearing the current id if it pointed at it.
    pub async fn delete(&self, id: &str) -> Result<(), anyhow::Error> {
        log::warn!("Deleting conversation with ID: {}", id);
        let mut records = self.load_raw().await?;
        let before = records.len();
        records.retain(|r| Self::record_id(r) != Some(id));

        if records.len() == before {
            log::warn!("Attempted to delete non-existent conversation: {}", id);
        } else {
            self.store_raw(&records)
                .await
                .with_context(|| format!("Failed to delete conversation {}", id))?;
        }

        if self.current_id().await.as_deref() == Some(id) {
            self.store.remove(CURRENT_CONVERSATION_KEY).await?;
        }
        Ok(())
    }

    pub async fn current_id(&self) -> Option<String> {
        match self.store.get(CURRENT_CONVERSATION_KEY).await {
            Ok(id) => id.filter(|id| !id.is_empty()),
            Err(e) => {
                log::error!("Failed to read current conversation id: {:?}", e);
                None
            }
        }
    }

    pub async fn set_current_id(&self, id: &str) -> Result<(), anyhow::Error> {
        log::debug!("Setting current conversation to {}", id);
        self.store.set(CURRENT_CONVERSATION_KEY, id).await
    }
}
