//! Fits conversation history into a model's context window.

use crate::capacity::context_window;
use crate::models::{Message, Role, Turn};
use crate::tokens::estimate_tokens;

/// Share of the context window (in percent) that history and system prompt
/// may use. The rest is left for the model's reply.
const PROMPT_SHARE_PERCENT: i64 = 80;

/// Token budget left for history once the reply reserve and the system
/// prompt are taken out. May be negative.
pub fn history_budget(limit: usize, system_prompt: Option<&str>) -> i64 {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let system_tokens = system_prompt.map(estimate_tokens).map_or(0, to_signed);
    (limit.saturating_mul(PROMPT_SHARE_PERCENT) / 100).saturating_sub(system_tokens)
}

fn to_signed(tokens: usize) -> i64 {
    i64::try_from(tokens).unwrap_or(i64::MAX)
}

/// Selects the most recent contiguous run of `messages` that fits the budget
/// for `model_name`.
///
/// `max_tokens_override` replaces the capacity lookup entirely. The walk goes
/// newest to oldest and stops at the first message that does not fit. When
/// nothing fits, the newest message is returned alone so a non-empty history
/// never trims to nothing.
pub fn trim_messages<'a>(
    messages: &'a [Message],
    model_name: &str,
    system_prompt: Option<&str>,
    max_tokens_override: Option<usize>,
) -> &'a [Message] {
    let limit = max_tokens_override.unwrap_or_else(|| context_window(model_name));
    let available = history_budget(limit, system_prompt);

    let mut total: i64 = 0;
    let mut start = messages.len();
    for message in messages.iter().rev() {
        let cost = to_signed(message.token_cost());
        if total.saturating_add(cost) > available {
            break;
        }
        total += cost;
        start -= 1;
    }

    if start == messages.len() && !messages.is_empty() {
        log::debug!(
            "Newest message alone exceeds the budget of {} tokens for {}; sending it anyway",
            available,
            model_name
        );
        start = messages.len() - 1;
    }

    log::debug!(
        "Kept {} of {} messages for {} ({} of {} tokens)",
        messages.len() - start,
        messages.len(),
        model_name,
        total,
        available
    );
    &messages[start..]
}

/// Builds the provider-facing turn list: an optional leading system turn,
/// then one turn per message in order.
pub fn build_turns(messages: &[Message], system_prompt: Option<&str>) -> Vec<Turn> {
    let mut turns = Vec::with_capacity(messages.len() + 1);
    if let Some(prompt) = system_prompt.filter(|p| !p.is_empty()) {
        turns.push(Turn {
            role: Role::System,
            content: prompt.to_string(),
        });
    }
    turns.extend(messages.iter().map(|msg| Turn {
        role: if msg.is_user { Role::User } else { Role::Assistant },
        content: msg.text.clone(),
    }));
    turns
}
