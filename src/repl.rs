//! Line-oriented chat on stdin/stdout.

use crate::chat::ChatService;
use crate::capacity::context_window;
use crate::context::history_budget;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const HELP: &str = "\
Commands:
  /new               start a new conversation
  /list              list conversations
  /open <id>         switch to a conversation
  /provider <id>     bind this conversation to another provider
  /model <name>      switch model
  /models            list models for this conversation's provider
  /prompts           list system prompts
  /prompt <id>       switch system prompt
  /title <text>      rename this conversation
  /delete            delete this conversation
  /quit              exit
Anything else is sent as a message.";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Send(String),
    New,
    List,
    Open(String),
    Provider(String),
    Model(String),
    Models,
    Prompts,
    Prompt(String),
    Title(String),
    Delete,
    Help,
    Quit,
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Command::Empty);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Command::Send(line.to_string()));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        let require = |arg: &str| {
            if arg.is_empty() {
                Err(format!("/{} needs an argument", name))
            } else {
                Ok(arg.to_string())
            }
        };

        match name {
            "new" => Ok(Command::New),
            "list" => Ok(Command::List),
            "open" => require(arg).map(Command::Open),
            "provider" => require(arg).map(Command::Provider),
            "model" => require(arg).map(Command::Model),
            "models" => Ok(Command::Models),
            "prompts" => Ok(Command::Prompts),
            "prompt" => require(arg).map(Command::Prompt),
            "title" => require(arg).map(Command::Title),
            "delete" => Ok(Command::Delete),
            "help" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!("Unknown command /{} (try /help)", other)),
        }
    }
}

pub async fn run(service: ChatService) -> Result<(), anyhow::Error> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut current = service.current_or_new().await?;
    stdout
        .write_all(format!("{} [{}/{}]\n", current.title, current.provider_id, current.model_name).as_bytes())
        .await?;

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                stdout.write_all(format!("{}\n", message).as_bytes()).await?;
                continue;
            }
        };

        let id = current.id.clone();
        let output = match command {
            Command::Empty => continue,
            Command::Quit => break,
            Command::Help => Ok(HELP.to_string()),
            Command::Send(text) => service
                .send(&id, &text)
                .await
                .map(|reply| reply.text),
            Command::New => service.new_conversation().await.map(|conv| {
                let text = format!("Started {} [{}/{}]", conv.id, conv.provider_id, conv.model_name);
                current = conv;
                text
            }),
            Command::List => Ok(service
                .conversations()
                .list()
                .await
                .iter()
                .map(|c| {
                    let marker = if c.id == current.id { "*" } else { " " };
                    format!("{} {}  {} ({} messages)", marker, c.id, c.title, c.messages.len())
                })
                .collect::<Vec<_>>()
                .join("\n")),
            Command::Open(target) => service.select(&target).await.map(|conv| {
                let text = format!("{} [{}/{}]", conv.title, conv.provider_id, conv.model_name);
                current = conv;
                text
            }),
            Command::Provider(provider_id) => service.switch_provider(&id, &provider_id).await.map(|conv| {
                let text = format!("Now using {}/{}", conv.provider_id, conv.model_name);
                current = conv;
                text
            }),
            Command::Model(name) => service.switch_model(&id, &name).await.map(|conv| {
                let budget = history_budget(
                    service.config().max_context_tokens.unwrap_or_else(|| context_window(&conv.model_name)),
                    conv.system_prompt.as_deref(),
                );
                let text = format!("Now using {} (history budget {} tokens)", conv.model_name, budget);
                current = conv;
                text
            }),
            Command::Models => Ok(service
                .preferences()
                .available_models(&current.provider_id)
                .await
                .join("\n")),
            Command::Prompts => Ok(service
                .prompts()
                .list()
                .await
                .iter()
                .map(|p| format!("{}  {}", p.id, p.name))
                .collect::<Vec<_>>()
                .join("\n")),
            Command::Prompt(prompt_id) => service.switch_system_prompt(&id, &prompt_id).await.map(|conv| {
                current = conv;
                format!("System prompt set to {}", prompt_id)
            }),
            Command::Title(title) => service.rename(&id, &title).await.map(|_| {
                current.title = title.clone();
                format!("Renamed to {}", title)
            }),
            Command::Delete => match service.delete(&id).await {
                Ok(()) => service.current_or_new().await.map(|conv| {
                    let text = format!("Deleted. Now in {} [{}]", conv.id, conv.title);
                    current = conv;
                    text
                }),
                Err(e) => Err(e),
            },
        };

        match output {
            Ok(text) => stdout.write_all(format!("{}\n", text).as_bytes()).await?,
            Err(e) => {
                log::error!("Command failed: {:?}", e);
                stdout.write_all(format!("Error: {:#}\n", e).as_bytes()).await?
            }
        }
    }

    Ok(())
}
