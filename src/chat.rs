use anyhow::Context;
use std::sync::Arc;

use crate::api::CompletionProvider;
use crate::config::{self, AppConfig};
use crate::context::{build_turns, trim_messages};
use crate::conversations::{estimate_title, ConversationStore};
use crate::models::{Conversation, Message};
use crate::prompts::SystemPromptCatalog;
use crate::providers::{find_provider, ModelPreferences};
use crate::storage::KeyValueStore;

// Application-level chat operations on top of storage and the provider.
#[derive(Clone)]
pub struct ChatService {
    conversations: ConversationStore,
    prompts: SystemPromptCatalog,
    preferences: ModelPreferences,
    api_provider: Arc<dyn CompletionProvider>,
    config: AppConfig,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        api_provider: Arc<dyn CompletionProvider>,
        config: AppConfig,
    ) -> Self {
        Self {
            conversations: ConversationStore::new(store.clone()),
            prompts: SystemPromptCatalog::new(store.clone()),
            preferences: ModelPreferences::new(store),
            api_provider,
            config,
        }
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn prompts(&self) -> &SystemPromptCatalog {
        &self.prompts
    }

    pub fn preferences(&self) -> &ModelPreferences {
        &self.preferences
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    async fn load(&self, conversation_id: &str) -> Result<Conversation, anyhow::Error> {
        self.conversations
            .find(conversation_id)
            .await?
            .with_context(|| format!("Conversation {} not found", conversation_id))
    }

    /// Starts a conversation bound to the configured provider, its selected
    /// model and the system prompt selected for that pair, and makes it current.
    pub async fn new_conversation(&self) -> Result<Conversation, anyhow::Error> {
        let provider_id = self.config.provider_id.clone();
        let model_name = self.preferences.selected_model(&provider_id).await;
        let system_prompt = self.prompts.selected(&provider_id, &model_name).await;

        let conversation = self
            .conversations
            .create(provider_id, model_name, Some(system_prompt))
            .await?;
        self.conversations.set_current_id(&conversation.id).await?;
        log::info!(
            "Created conversation {} ({}/{})",
            conversation.id,
            conversation.provider_id,
            conversation.model_name
        );
        Ok(conversation)
    }

    /// The current conversation, or a fresh one when none is recorded or the
    /// recorded id no longer exists.
    pub async fn current_or_new(&self) -> Result<Conversation, anyhow::Error> {
        if let Some(id) = self.conversations.current_id().await {
            if let Some(conversation) = self.conversations.get(&id).await {
                return Ok(conversation);
            }
            log::warn!("Current conversation {} not found, starting a new one", id);
        }
        self.new_conversation().await
    }

    pub async fn select(&self, conversation_id: &str) -> Result<Conversation, anyhow::Error> {
        let conversation = self.load(conversation_id).await?;
        self.conversations.set_current_id(&conversation.id).await?;
        Ok(conversation)
    }

    /// Sends `text` as a user turn and returns the assistant reply.
    ///
    /// The user message is saved before the provider is called, so it stays
    /// in the history if the call fails.
    pub async fn send(&self, conversation_id: &str, text: &str) -> Result<Message, anyhow::Error> {
        let text = text.trim();
        if text.is_empty() {
            anyhow::bail!("Message cannot be empty");
        }
        let mut conversation = self.load(conversation_id).await?;

        if conversation.has_default_title() && !conversation.messages.iter().any(|m| m.is_user) {
            conversation.title = estimate_title(text);
        }
        conversation.messages.push(Message::user(text));
        self.conversations.save(&mut conversation).await?;

        let provider = find_provider(&conversation.provider_id)
            .with_context(|| format!("Unknown provider '{}'", conversation.provider_id))?;
        let system_prompt = conversation.system_prompt.as_deref();
        let history = trim_messages(
            &conversation.messages,
            &conversation.model_name,
            system_prompt,
            self.config.max_context_tokens,
        );
        let turns = build_turns(history, system_prompt);

        let api_key_ref = self.config.api_key_ref.as_deref().unwrap_or(provider.api_key_ref);
        let api_key = config::get_api_key(provider, api_key_ref)?;

        let completion = self
            .api_provider
            .complete(provider, &api_key, &turns, &conversation.model_name)
            .await
            .with_context(|| format!("Completion failed for conversation {}", conversation.id))?;

        let reply = Message::assistant(completion.content);
        conversation.messages.push(reply.clone());
        self.conversations.save(&mut conversation).await?;
        Ok(reply)
    }

    /// Rebinds the conversation to another provider, using that provider's selected model.
    pub async fn switch_provider(
        &self,
        conversation_id: &str,
        provider_id: &str,
    ) -> Result<Conversation, anyhow::Error> {
        if find_provider(provider_id).is_none() {
            anyhow::bail!("Unknown provider '{}'", provider_id);
        }
        let mut conversation = self.load(conversation_id).await?;
        conversation.provider_id = provider_id.to_string();
        conversation.model_name = self.preferences.selected_model(provider_id).await;
        self.conversations.save(&mut conversation).await?;
        Ok(conversation)
    }

    /// Changes the conversation's model and remembers it as the provider's selection.
    pub async fn switch_model(
        &self,
        conversation_id: &str,
        model_name: &str,
    ) -> Result<Conversation, anyhow::Error> {
        let model_name = model_name.trim();
        if model_name.is_empty() {
            anyhow::bail!("Model name cannot be empty");
        }
        let mut conversation = self.load(conversation_id).await?;
        conversation.model_name = model_name.to_string();
        self.conversations.save(&mut conversation).await?;
        self.preferences
            .set_selected_model(&conversation.provider_id, model_name)
            .await?;
        Ok(conversation)
    }

    /// Records `prompt_id` for the conversation's (provider, model) pair and pins
    /// its text on this conversation. Other conversations keep their own prompt.
    pub async fn switch_system_prompt(
        &self,
        conversation_id: &str,
        prompt_id: &str,
    ) -> Result<Conversation, anyhow::Error> {
        let prompt = self
            .prompts
            .find(prompt_id)
            .await
            .with_context(|| format!("Unknown system prompt '{}'", prompt_id))?;
        let mut conversation = self.load(conversation_id).await?;

        self.prompts
            .set_selected(&conversation.provider_id, &conversation.model_name, &prompt.id)
            .await?;
        conversation.system_prompt = Some(prompt.prompt);
        self.conversations.save(&mut conversation).await?;
        Ok(conversation)
    }

    pub async fn rename(&self, conversation_id: &str, title: &str) -> Result<(), anyhow::Error> {
        let title = title.trim();
        if title.is_empty() {
            anyhow::bail!("New title cannot be empty.");
        }
        let mut conversation = self.load(conversation_id).await?;
        conversation.title = title.to_string();
        self.conversations.save(&mut conversation).await
    }

    pub async fn delete(&self, conversation_id: &str) -> Result<(), anyhow::Error> {
        self.conversations.delete(conversation_id).await
    }
}
