// Declare the modules
pub mod api;
pub mod capacity;
pub mod chat;
pub mod config;
pub mod context;
pub mod conversations;
pub mod models;
pub mod prompts;
pub mod providers;
pub mod repl;
pub mod storage;
pub mod tokens;

use crate::api::{CompletionProvider, OpenAICompatibleProvider};
use crate::chat::ChatService;
use crate::config::AppConfig;
use crate::storage::{KeyValueStore, SqliteStore};
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;

pub use crate::capacity::context_window;
pub use crate::context::{build_turns, trim_messages};
pub use crate::conversations::estimate_title;
pub use crate::tokens::estimate_tokens;

pub async fn run() -> Result<(), anyhow::Error> {
    // Initialize logging
    env_logger::init();

    let config = AppConfig::parse();
    let store: Arc<dyn KeyValueStore> = Arc::new(
        SqliteStore::open(&config.db_path)
            .await
            .context("Failed to open conversation storage")?,
    );
    let api_provider: Arc<dyn CompletionProvider> = Arc::new(OpenAICompatibleProvider::new());
    let service = ChatService::new(store, api_provider, config);

    repl::run(service).await
}
