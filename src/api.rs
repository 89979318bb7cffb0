use crate::models::{Completion, Turn, Usage};
use crate::providers::ProviderInfo;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

// Interface to a hosted completion backend: ordered turns in, one reply out.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        provider: &ProviderInfo,
        api_key: &str,
        turns: &[Turn],
        model: &str,
    ) -> Result<Completion>;
}

// --- OpenAI Compatible Provider Implementation ---

#[derive(Serialize, Debug)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: &'a [Turn],
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChatChoiceMessage {
    // Null for refusals or tool-only replies
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAICompatibleProvider {
    client: Client,
}

impl OpenAICompatibleProvider {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    fn parse_response(body: &str) -> Result<Completion> {
        let response: ChatResponse =
            serde_json::from_str(body).context("Failed to parse chat completion response")?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .context("Chat completion response contained no choices")?;
        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            usage: response.usage,
        })
    }
}

impl Default for OpenAICompatibleProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for OpenAICompatibleProvider {
    async fn complete(
        &self,
        provider: &ProviderInfo,
        api_key: &str,
        turns: &[Turn],
        model: &str,
    ) -> Result<Completion> {
        log::info!(
            "Sending request to {} ({}) using model: {} with {} turns",
            provider.name,
            provider.base_url,
            model,
            turns.len()
        );

        let request_body = ChatRequestBody { model, messages: turns };
        let request_url = format!("{}/chat/completions", provider.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&request_url)
            .bearer_auth(api_key)
            .json(&request_body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", provider.name))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<Failed to read response body>".to_string());

        if !status.is_success() {
            log::error!("{} request failed with status {}: {}", provider.name, status, body);
            return Err(anyhow::anyhow!("API request failed with status {}: {}", status, body));
        }

        let completion = Self::parse_response(&body)?;
        if let Some(usage) = &completion.usage {
            log::debug!(
                "{} usage: {} prompt + {} completion tokens",
                provider.name,
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }
        Ok(completion)
    }
}
