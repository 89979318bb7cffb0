//! Built-in provider registry and per-provider model preferences.

use anyhow::Context;
use std::sync::Arc;

use crate::storage::KeyValueStore;

// A hosted completion backend reachable through an OpenAI-compatible endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub base_url: &'static str,
    pub default_model: &'static str,
    pub models: &'static [&'static str],
    // 'env:VAR' or 'keyring'
    pub api_key_ref: &'static str,
}

pub static PROVIDERS: &[ProviderInfo] = &[
    ProviderInfo {
        id: "openai",
        name: "OpenAI",
        base_url: "https://api.openai.com/v1",
        default_model: "gpt-4o-mini",
        models: &["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-3.5-turbo", "o1", "o3-mini"],
        api_key_ref: "env:OPENAI_API_KEY",
    },
    ProviderInfo {
        id: "anthropic",
        name: "Anthropic",
        base_url: "https://api.anthropic.com/v1",
        default_model: "claude-3-5-sonnet-20241022",
        models: &[
            "claude-3-5-sonnet-20241022",
            "claude-3-5-haiku-20241022",
            "claude-3-opus-20240229",
            "claude-3-haiku-20240307",
        ],
        api_key_ref: "env:ANTHROPIC_API_KEY",
    },
    ProviderInfo {
        id: "google",
        name: "Google Gemini",
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
        default_model: "gemini-2.0-flash",
        models: &["gemini-2.0-flash", "gemini-1.5-pro", "gemini-1.5-flash"],
        api_key_ref: "env:GEMINI_API_KEY",
    },
    ProviderInfo {
        id: "deepseek",
        name: "DeepSeek",
        base_url: "https://api.deepseek.com/v1",
        default_model: "deepseek-chat",
        models: &["deepseek-chat", "deepseek-reasoner"],
        api_key_ref: "env:DEEPSEEK_API_KEY",
    },
];

pub fn find_provider(id: &str) -> Option<&'static ProviderInfo> {
    PROVIDERS.iter().find(|p| p.id == id)
}

fn selected_model_key(provider_id: &str) -> String {
    format!("selected_model_{}", provider_id)
}

fn custom_models_key(provider_id: &str) -> String {
    format!("custom_models_{}", provider_id)
}

/// Selected model and user-added models, per provider.
#[derive(Clone)]
pub struct ModelPreferences {
    store: Arc<dyn KeyValueStore>,
}

impl ModelPreferences {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Stored selection, else the provider's default model (empty for unknown providers).
    pub async fn selected_model(&self, provider_id: &str) -> String {
        match self.store.get(&selected_model_key(provider_id)).await {
            Ok(Some(model)) if !model.is_empty() => return model,
            Ok(_) => {}
            Err(e) => log::error!("Failed to read selected model for {}: {:?}", provider_id, e),
        }
        find_provider(provider_id)
            .map(|p| p.default_model.to_string())
            .unwrap_or_default()
    }

    pub async fn set_selected_model(&self, provider_id: &str, model: &str) -> Result<(), anyhow::Error> {
        log::info!("Selecting model {} for provider {}", model, provider_id);
        self.store.set(&selected_model_key(provider_id), model).await
    }

    async fn load_custom(&self, provider_id: &str) -> Result<Vec<String>, anyhow::Error> {
        match self.store.get(&custom_models_key(provider_id)).await? {
            Some(blob) => serde_json::from_str(&blob)
                .with_context(|| format!("Failed to parse custom models for {}", provider_id)),
            None => Ok(Vec::new()),
        }
    }

    async fn store_custom(&self, provider_id: &str, models: &[String]) -> Result<(), anyhow::Error> {
        let blob = serde_json::to_string(models).context("Failed to serialize custom models")?;
        self.store.set(&custom_models_key(provider_id), &blob).await
    }

    pub async fn custom_models(&self, provider_id: &str) -> Vec<String> {
        self.load_custom(provider_id).await.unwrap_or_else(|e| {
            log::error!("Failed to load custom models for {}: {:?}", provider_id, e);
            Vec::new()
        })
    }

    pub async fn add_custom_model(&self, provider_id: &str, model: &str) -> Result<(), anyhow::Error> {
        let model = model.trim();
        if model.is_empty() {
            anyhow::bail!("Model name cannot be empty");
        }
        let mut models = self.load_custom(provider_id).await?;
        if models.iter().any(|m| m == model) {
            log::debug!("Custom model {} already present for {}", model, provider_id);
            return Ok(());
        }
        models.push(model.to_string());
        self.store_custom(provider_id, &models).await
    }

    pub async fn remove_custom_model(&self, provider_id: &str, model: &str) -> Result<(), anyhow::Error> {
        let mut models = self.load_custom(provider_id).await?;
        let before = models.len();
        models.retain(|m| m != model);
        if models.len() == before {
            return Ok(());
        }
        self.store_custom(provider_id, &models).await
    }

    /// Built-in models followed by custom ones not already listed.
    pub async fn available_models(&self, provider_id: &str) -> Vec<String> {
        let mut models: Vec<String> = find_provider(provider_id)
            .map(|p| p.models.iter().map(|m| m.to_string()).collect())
            .unwrap_or_default();
        for custom in self.custom_models(provider_id).await {
            if !models.contains(&custom) {
                models.push(custom);
            }
        }
        models
    }
}
