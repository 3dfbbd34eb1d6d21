use std::io::Write;

use anyhow::{bail, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use fereelab_client::{ApiClient, ChatManager, ListParams};
use fereelab_types::{ChatCompletionRequest, ChatMessage, PromptMessage, Role, UpdateChatRequest};

use crate::{ChatArgs, HistoryCommand};

// ── Chat ──────────────────────────────────────────────────────────────────────

pub async fn chat(api: ApiClient, args: ChatArgs) -> Result<()> {
    let mut manager = ChatManager::new(api);

    if let Some(model) = args.model.as_deref() {
        manager.refresh_models().await?;
        if !manager.state.select_model(model) {
            bail!("unknown model '{model}'; see `fereelab models`");
        }
    }
    if args.temporary {
        manager.state.start_temporary_chat();
    } else if let Some(id) = args.chat_id.as_deref() {
        manager.switch_to_conversation(id).await?;
        debug!(chat_id = id, messages = manager.state.messages().len(), "continuing chat");
    }

    let prompt = args.prompt.join(" ");
    if !prompt.trim().is_empty() {
        if args.no_stream {
            return complete_once(&manager, &prompt).await;
        }
        return send(&mut manager, &prompt).await;
    }

    eprintln!("Type a message and press Enter. /new starts a new chat, /exit quits.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        std::io::stderr().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/exit" | "/quit" => break,
            "/new" => {
                manager.state.start_new_conversation();
                eprintln!("(new chat)");
            }
            text => {
                if let Err(e) = send(&mut manager, text).await {
                    eprintln!("error: {e:#}");
                }
            }
        }
    }
    Ok(())
}

/// Stream one reply to stdout.
async fn send(manager: &mut ChatManager, prompt: &str) -> Result<()> {
    let mut stdout = std::io::stdout();
    let outcome = manager
        .send_message(prompt, |delta| {
            let _ = stdout.write_all(delta.as_bytes());
            let _ = stdout.flush();
        })
        .await;
    println!();
    if let Some(outcome) = outcome? {
        if let Some(chat_id) = outcome.chat_id {
            eprintln!("(saved to chat {chat_id})");
        }
    }
    Ok(())
}

/// Ask for the whole reply at once.
async fn complete_once(manager: &ChatManager, prompt: &str) -> Result<()> {
    let mut messages: Vec<PromptMessage> = manager
        .state
        .messages()
        .iter()
        .map(ChatMessage::to_prompt)
        .collect();
    messages.push(PromptMessage::new(Role::User, prompt.trim()));

    let request = ChatCompletionRequest {
        messages,
        model: manager.state.active_model(),
        stream: false,
        temperature: None,
        max_tokens: None,
        chat_id: manager
            .state
            .current()
            .filter(|c| c.saved)
            .map(|c| c.id.clone()),
    };
    let api = if manager.state.is_temporary {
        manager.api().anonymous()
    } else {
        manager.api().clone()
    };
    let reply = api.complete(&request).await?;
    println!("{}", reply.content);
    if let Some(chat_id) = reply.chat_id {
        eprintln!("(saved to chat {chat_id})");
    }
    Ok(())
}

// ── History ───────────────────────────────────────────────────────────────────

pub async fn history(api: &ApiClient, cmd: HistoryCommand) -> Result<()> {
    match cmd {
        HistoryCommand::List {
            limit,
            offset,
            archived,
        } => {
            let list = api
                .list_chats(ListParams {
                    limit,
                    offset,
                    archived,
                })
                .await?;
            for chat in &list.chats {
                println!(
                    "{}  {}  {} ({} messages)",
                    chat.id,
                    chat.updated_at.format("%Y-%m-%d %H:%M"),
                    chat.title,
                    chat.messages.len()
                );
            }
            let page = &list.pagination;
            eprintln!(
                "{} of {} shown{}",
                list.chats.len(),
                page.total,
                if page.has_more { "; more with --offset" } else { "" }
            );
        }
        HistoryCommand::Show { id } => {
            let chat = api.get_chat(&id).await?;
            println!("# {}", chat.title);
            for msg in &chat.messages {
                println!("\n[{}] {}", msg.role, msg.content);
            }
        }
        HistoryCommand::Rename { id, title } => {
            let chat = api
                .update_chat(&UpdateChatRequest {
                    chat_id: Some(id),
                    title: Some(title),
                    messages: None,
                    model: None,
                })
                .await?;
            println!("Renamed {} to \"{}\"", chat.id, chat.title);
        }
        HistoryCommand::Delete { id } => {
            println!("{}", api.delete_chat(&id).await?.message);
        }
        HistoryCommand::Restore { id } => {
            let chat = api.restore_chat(&id).await?;
            println!("Restored \"{}\"", chat.title);
        }
    }
    Ok(())
}

// ── Models ────────────────────────────────────────────────────────────────────

pub async fn models(api: &ApiClient, filter: Option<&str>) -> Result<()> {
    let resp = api.models().await?;
    let needle = filter.map(str::to_lowercase);
    for model in resp
        .models
        .iter()
        .filter(|m| needle.as_deref().is_none_or(|n| m.id.to_lowercase().contains(n)))
    {
        println!(
            "{:<48} {:>8} ctx  ${}/1K in  ${}/1K out",
            model.id, model.context_length, model.input_price, model.output_price
        );
    }
    if resp.cached {
        debug!("model list served from cache");
    }
    Ok(())
}
