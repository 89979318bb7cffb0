use crate::providers::{find_provider, ProviderInfo, PROVIDERS};
use anyhow::{Context, Result};
use clap::Parser;
use keyring::Entry;
use std::path::PathBuf;

const DEFAULT_DB_PATH: &str = "localchat.sqlite";
const DEFAULT_PROVIDER: &str = "openai";

/// Process-level settings, from command-line flags or `LOCALCHAT_*` variables.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "localchat")]
#[command(version, about = "Chat with hosted AI models from the terminal")]
pub struct AppConfig {
    /// SQLite database holding conversations and preferences
    #[arg(long, env = "LOCALCHAT_DB_PATH", default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,

    /// Provider for new conversations
    #[arg(long = "provider", env = "LOCALCHAT_PROVIDER", default_value = DEFAULT_PROVIDER, value_parser = parse_provider_id)]
    pub provider_id: String,

    /// Replaces the model's context window when trimming history
    #[arg(long, env = "LOCALCHAT_MAX_CONTEXT_TOKENS")]
    pub max_context_tokens: Option<usize>,

    /// Overrides the provider's API key reference ('env:VAR' or 'keyring')
    #[arg(long, env = "LOCALCHAT_API_KEY_REF")]
    pub api_key_ref: Option<String>,
}

fn parse_provider_id(value: &str) -> Result<String, String> {
    match find_provider(value) {
        Some(provider) => Ok(provider.id.to_string()),
        None => {
            let known: Vec<&str> = PROVIDERS.iter().map(|p| p.id).collect();
            Err(format!("unknown provider '{}' (expected one of: {})", value, known.join(", ")))
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            provider_id: DEFAULT_PROVIDER.to_string(),
            max_context_tokens: None,
            api_key_ref: None,
        }
    }
}

// --- API Key Retrieval ---

const KEYRING_SERVICE_PREFIX: &str = "localchat_api_key";

fn keyring_entry(provider: &ProviderInfo) -> Result<Entry> {
    let service_name = format!("{}-{}", KEYRING_SERVICE_PREFIX, provider.id);
    Entry::new(&service_name, provider.name) // Provider name as "username"
        .context("Failed to create keyring entry")
}

/// Retrieves the API key for `provider`, following `api_key_ref`
/// (`env:VAR` or `keyring`).
pub fn get_api_key(provider: &ProviderInfo, api_key_ref: &str) -> Result<String> {
    match api_key_ref {
        ref_str if ref_str.starts_with("env:") => {
            let env_var_name = ref_str.trim_start_matches("env:");
            log::debug!("Retrieving API key from environment variable: {}", env_var_name);
            std::env::var(env_var_name).context(format!(
                "Failed to get API key from environment variable '{}'",
                env_var_name
            ))
        }
        "keyring" => {
            log::debug!("Retrieving API key from keyring for provider: {}", provider.id);
            keyring_entry(provider)?.get_password().context(format!(
                "Failed to get API key from keyring for '{}'. Please set it first.",
                provider.name
            ))
        }
        "" => Err(anyhow::anyhow!(
            "API key reference not set for provider '{}'",
            provider.name
        )),
        other => Err(anyhow::anyhow!("Unsupported api_key_ref format: {}", other)),
    }
}

/// Stores an API key in the OS keyring for `provider`.
pub fn set_api_key_in_keyring(provider: &ProviderInfo, api_key: &str) -> Result<()> {
    log::info!("Setting API key in keyring for provider: {}", provider.id);
    keyring_entry(provider)?.set_password(api_key).context(format!(
        "Failed to set API key in keyring for '{}'",
        provider.name
    ))
}
