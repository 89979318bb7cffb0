use anyhow::Context;
use std::sync::{Arc, LazyLock};

use crate::models::SystemPrompt;
use crate::storage::KeyValueStore;

pub const CUSTOM_PROMPTS_KEY: &str = "custom_system_prompts";

fn selected_prompt_key(provider_id: &str, model_name: &str) -> String {
    format!("system_prompt_{}_{}", provider_id, model_name)
}

fn builtin(id: &str, name: &str, prompt: &str) -> SystemPrompt {
    SystemPrompt {
        id: id.to_string(),
        name: name.to_string(),
        prompt: prompt.to_string(),
        is_default: true,
        provider_id: None,
        model_name: None,
    }
}

// The first entry is the fallback for every unresolved selection.
static BUILTIN_PROMPTS: LazyLock<Vec<SystemPrompt>> = LazyLock::new(|| {
    vec![
        builtin(
            "default",
            "Helpful Assistant",
            "You are a helpful, friendly assistant. Answer clearly and accurately.",
        ),
        builtin(
            "concise",
            "Concise",
            "You are a concise assistant. Answer in as few words as possible without losing accuracy.",
        ),
        builtin(
            "coder",
            "Programmer",
            "You are an expert software engineer. Give working code with short explanations.",
        ),
        builtin(
            "writer",
            "Writing Coach",
            "You are a writing coach. Improve clarity, grammar and tone while keeping the author's voice.",
        ),
        builtin(
            "tutor",
            "Tutor",
            "You are a patient tutor. Explain step by step and check understanding with short questions.",
        ),
    ]
});

pub fn builtin_prompts() -> &'static [SystemPrompt] {
    &BUILTIN_PROMPTS
}

/// Built-in prompts plus user-defined ones. Built-ins are never stored;
/// the two sets are merged at read time.
#[derive(Clone)]
pub struct SystemPromptCatalog {
    store: Arc<dyn KeyValueStore>,
}

impl SystemPromptCatalog {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    async fn load_custom(&self) -> Result<Vec<SystemPrompt>, anyhow::Error> {
        match self.store.get(CUSTOM_PROMPTS_KEY).await? {
            Some(blob) => serde_json::from_str(&blob).context("Failed to parse custom system prompts"),
            None => Ok(Vec::new()),
        }
    }

    async fn store_custom(&self, prompts: &[SystemPrompt]) -> Result<(), anyhow::Error> {
        let blob = serde_json::to_string(prompts).context("Failed to serialize custom system prompts")?;
        self.store.set(CUSTOM_PROMPTS_KEY, &blob).await
    }

    /// User-defined prompts; empty when storage cannot be read.
    pub async fn custom(&self) -> Vec<SystemPrompt> {
        self.load_custom().await.unwrap_or_else(|e| {
            log::error!("Failed to load custom system prompts: {:?}", e);
            Vec::new()
        })
    }

    /// Built-ins first, then custom prompts.
    pub async fn list(&self) -> Vec<SystemPrompt> {
        let mut prompts = builtin_prompts().to_vec();
        prompts.extend(self.custom().await);
        prompts
    }

    pub async fn find(&self, id: &str) -> Option<SystemPrompt> {
        self.list().await.into_iter().find(|p| p.id == id)
    }

    /// Text of the prompt selected for (provider, model), falling back to the
    /// first built-in when nothing is recorded or the id no longer resolves.
    pub async fn selected(&self, provider_id: &str, model_name: &str) -> String {
        let key = selected_prompt_key(provider_id, model_name);
        let selected_id = match self.store.get(&key).await {
            Ok(id) => id,
            Err(e) => {
                log::error!("Failed to read selected system prompt '{}': {:?}", key, e);
                None
            }
        };

        if let Some(id) = selected_id {
            if let Some(prompt) = self.find(&id).await {
                return prompt.prompt;
            }
            log::warn!("Selected system prompt '{}' no longer exists, using default", id);
        }
        builtin_prompts()[0].prompt.clone()
    }

    /// Records the selection. The id is not validated here.
    pub async fn set_selected(
        &self,
        provider_id: &str,
        model_name: &str,
        prompt_id: &str,
    ) -> Result<(), anyhow::Error> {
        log::info!(
            "Selecting system prompt '{}' for {}/{}",
            prompt_id,
            provider_id,
            model_name
        );
        self.store
            .set(&selected_prompt_key(provider_id, model_name), prompt_id)
            .await
    }

    /// Creates or replaces a custom prompt by id.
    pub async fn save_custom(&self, mut prompt: SystemPrompt) -> Result<(), anyhow::Error> {
        if builtin_prompts().iter().any(|p| p.id == prompt.id) {
            anyhow::bail!("Built-in system prompt '{}' cannot be modified", prompt.id);
        }
        if prompt.name.trim().is_empty() || prompt.prompt.trim().is_empty() {
            anyhow::bail!("System prompt name and text cannot be empty");
        }
        prompt.is_default = false;

        let mut prompts = self.load_custom().await?;
        match prompts.iter_mut().find(|p| p.id == prompt.id) {
            Some(existing) => *existing = prompt,
            None => prompts.push(prompt),
        }
        self.store_custom(&prompts).await
    }

    pub async fn delete_custom(&self, id: &str) -> Result<(), anyhow::Error> {
        if builtin_prompts().iter().any(|p| p.id == id) {
            anyhow::bail!("Built-in system prompt '{}' cannot be deleted", id);
        }
        let mut prompts = self.load_custom().await?;
        let before = prompts.len();
        prompts.retain(|p| p.id != id);
        if prompts.len() == before {
            log::warn!("Attempted to delete non-existent system prompt: {}", id);
            return Ok(());
        }
        self.store_custom(&prompts).await
    }
}
