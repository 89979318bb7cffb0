use anyhow::Result;
use async_trait::async_trait;
use localchat_lib::api::CompletionProvider;
use localchat_lib::chat::ChatService;
use localchat_lib::config::AppConfig;
use localchat_lib::models::{Completion, Role, Turn, Usage};
use localchat_lib::prompts::builtin_prompts;
use localchat_lib::providers::ProviderInfo;
use localchat_lib::storage::{KeyValueStore, MemoryStore, SqliteStore};
use std::sync::{Arc, Mutex};

const KEY_VAR: &str = "LOCALCHAT_CHAT_FLOW_TEST_KEY";

#[derive(Default)]
struct StubProvider {
    calls: Mutex<Vec<(String, String, Vec<Turn>)>>,
    fail: bool,
}

#[async_trait]
impl CompletionProvider for StubProvider {
    async fn complete(
        &self,
        provider: &ProviderInfo,
        api_key: &str,
        turns: &[Turn],
        model: &str,
    ) -> Result<Completion> {
        assert_eq!(api_key, "sk-stub");
        self.calls
            .lock()
            .unwrap()
            .push((provider.id.to_string(), model.to_string(), turns.to_vec()));
        if self.fail {
            anyhow::bail!("provider unavailable");
        }
        let last = turns.last().map(|t| t.content.clone()).unwrap_or_default();
        Ok(Completion {
            content: format!("echo: {}", last),
            usage: Some(Usage {
                prompt_tokens: 1,
                completion_tokens: 1,
                total_tokens: 2,
            }),
        })
    }
}

fn config(max_context_tokens: Option<usize>) -> AppConfig {
    std::env::set_var(KEY_VAR, "sk-stub");
    AppConfig {
        max_context_tokens,
        api_key_ref: Some(format!("env:{}", KEY_VAR)),
        ..AppConfig::default()
    }
}

fn service_with(
    store: Arc<dyn KeyValueStore>,
    provider: Arc<StubProvider>,
    max_context_tokens: Option<usize>,
) -> ChatService {
    ChatService::new(store, provider, config(max_context_tokens))
}

#[tokio::test]
async fn send_appends_both_turns_and_titles_the_conversation() {
    let stub = Arc::new(StubProvider::default());
    let service = service_with(Arc::new(MemoryStore::new()), stub.clone(), None);

    let conv = service.current_or_new().await.unwrap();
    assert_eq!(conv.provider_id, "openai");
    assert_eq!(conv.model_name, "gpt-4o-mini");
    assert_eq!(conv.system_prompt.as_deref(), Some(builtin_prompts()[0].prompt.as_str()));

    let reply = service.send(&conv.id, "Hello\nthere").await.unwrap();
    assert_eq!(reply.text, "echo: Hello\nthere");
    assert!(!reply.is_user);
    assert_eq!(reply.tokens, Some(5));

    let stored = service.conversations().get(&conv.id).await.unwrap();
    assert_eq!(stored.title, "Hello there");
    assert_eq!(stored.messages.len(), 2);
    assert!(stored.messages[0].is_user);

    let calls = stub.calls.lock().unwrap();
    let (provider_id, model, turns) = &calls[0];
    assert_eq!(provider_id, "openai");
    assert_eq!(model, "gpt-4o-mini");
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::System);
    assert_eq!(turns[1].role, Role::User);
}

#[tokio::test]
async fn title_is_only_derived_from_the_first_message() {
    let stub = Arc::new(StubProvider::default());
    let service = service_with(Arc::new(MemoryStore::new()), stub, None);
    let conv = service.new_conversation().await.unwrap();

    service.send(&conv.id, "first").await.unwrap();
    service.send(&conv.id, "second").await.unwrap();
    assert_eq!(service.conversations().get(&conv.id).await.unwrap().title, "first");
}

#[tokio::test]
async fn history_is_trimmed_to_the_budget() {
    let stub = Arc::new(StubProvider::default());
    // 40 tokens -> 32 for system prompt and history
    let service = service_with(Arc::new(MemoryStore::new()), stub.clone(), Some(40));
    let conv = service.new_conversation().await.unwrap();
    service.switch_system_prompt(&conv.id, "tutor").await.unwrap();

    for i in 0..4 {
        service.send(&conv.id, &format!("message {} {}", i, "x".repeat(20))).await.unwrap();
    }

    let calls = stub.calls.lock().unwrap();
    let (_, _, turns) = calls.last().unwrap();
    assert_eq!(turns[0].role, Role::System);
    assert_eq!(turns.last().unwrap().content, format!("message 3 {}", "x".repeat(20)));
    // tutor prompt (23 tokens) leaves 9: the newest message (8) fits, the reply before it (9) does not
    assert_eq!(turns.len(), 2);
}

#[tokio::test]
async fn failed_completion_keeps_the_user_message() {
    let stub = Arc::new(StubProvider { fail: true, ..Default::default() });
    let service = service_with(Arc::new(MemoryStore::new()), stub, None);
    let conv = service.new_conversation().await.unwrap();

    assert!(service.send(&conv.id, "are you there?").await.is_err());
    let stored = service.conversations().get(&conv.id).await.unwrap();
    assert_eq!(stored.messages.len(), 1);
    assert!(stored.messages[0].is_user);
}

#[tokio::test]
async fn empty_message_and_unknown_conversation_are_rejected() {
    let stub = Arc::new(StubProvider::default());
    let service = service_with(Arc::new(MemoryStore::new()), stub.clone(), None);
    let conv = service.new_conversation().await.unwrap();

    assert!(service.send(&conv.id, "   ").await.is_err());
    assert!(service.send("missing", "hi").await.is_err());
    assert!(stub.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn switching_prompt_pins_it_on_one_conversation_only() {
    let stub = Arc::new(StubProvider::default());
    let service = service_with(Arc::new(MemoryStore::new()), stub, None);
    let first = service.new_conversation().await.unwrap();
    let second = service.new_conversation().await.unwrap();

    let updated = service.switch_system_prompt(&first.id, "coder").await.unwrap();
    let coder = service.prompts().find("coder").await.unwrap();
    assert_eq!(updated.system_prompt.as_deref(), Some(coder.prompt.as_str()));

    // The preference changed for the pair, the other conversation kept its copy.
    assert_eq!(service.prompts().selected("openai", "gpt-4o-mini").await, coder.prompt);
    let untouched = service.conversations().get(&second.id).await.unwrap();
    assert_eq!(untouched.system_prompt, second.system_prompt);

    // New conversations pick up the latest preference.
    let third = service.new_conversation().await.unwrap();
    assert_eq!(third.system_prompt.as_deref(), Some(coder.prompt.as_str()));

    assert!(service.switch_system_prompt(&first.id, "nope").await.is_err());
}

#[tokio::test]
async fn switching_model_and_provider_updates_preferences() {
    let stub = Arc::new(StubProvider::default());
    let service = service_with(Arc::new(MemoryStore::new()), stub.clone(), None);
    let conv = service.new_conversation().await.unwrap();

    service.switch_model(&conv.id, "gpt-4o").await.unwrap();
    assert_eq!(service.preferences().selected_model("openai").await, "gpt-4o");

    let moved = service.switch_provider(&conv.id, "anthropic").await.unwrap();
    assert_eq!(moved.provider_id, "anthropic");
    assert_eq!(moved.model_name, "claude-3-5-sonnet-20241022");
    assert!(service.switch_provider(&conv.id, "nope").await.is_err());

    service.send(&conv.id, "hi").await.unwrap();
    let calls = stub.calls.lock().unwrap();
    assert_eq!(calls[0].0, "anthropic");
    assert_eq!(calls[0].1, "claude-3-5-sonnet-20241022");
}

#[tokio::test]
async fn current_conversation_survives_and_is_replaced_after_delete() {
    let stub = Arc::new(StubProvider::default());
    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::in_memory().await.unwrap());
    let service = service_with(store.clone(), stub.clone(), None);

    let conv = service.current_or_new().await.unwrap();
    service.rename(&conv.id, "  Pinned  ").await.unwrap();
    assert!(service.rename(&conv.id, " ").await.is_err());

    // Same storage, fresh service: the current conversation is restored.
    let restarted = service_with(store, stub, None);
    let again = restarted.current_or_new().await.unwrap();
    assert_eq!(again.id, conv.id);
    assert_eq!(again.title, "Pinned");

    restarted.delete(&conv.id).await.unwrap();
    let replacement = restarted.current_or_new().await.unwrap();
    assert_ne!(replacement.id, conv.id);
    assert_eq!(restarted.conversations().list().await.len(), 1);
}

#[tokio::test]
async fn unreadable_storage_is_not_reported_as_missing() {
    let stub = Arc::new(StubProvider::default());
    let store = Arc::new(MemoryStore::new());
    let service = service_with(store.clone(), stub.clone(), None);
    let conv = service.new_conversation().await.unwrap();

    store.set("conversations", "{not json").await.unwrap();
    let err = service.send(&conv.id, "hi").await.unwrap_err();
    let chain = format!("{:#}", err);
    assert!(chain.contains("Failed to parse stored conversation list"), "{}", chain);
    assert!(!chain.contains("not found"), "{}", chain);
    assert!(stub.calls.lock().unwrap().is_empty());
}
