//! fereelab – terminal client for a FereeLAB chat server.
//!
//! The session token from `login` / `signup` is kept in the local storage
//! file, so later invocations are signed in until `logout`.

mod commands;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fereelab_client::{ApiClient, FileStorage, KeyValueStore};

/// Storage key of the saved session token.
const TOKEN_KEY: &str = "authToken";

#[derive(Debug, Parser)]
#[command(name = "fereelab", version, about = "Chat with a FereeLAB server from the terminal")]
struct Cli {
    /// Server base URL.
    #[arg(long, env = "FEREELAB_URL", default_value = "http://localhost:3000")]
    url: String,

    /// Local storage file (defaults to the user config directory).
    #[arg(long, env = "FEREELAB_STORAGE")]
    storage: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create an account and sign in.
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long, env = "FEREELAB_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in and remember the session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "FEREELAB_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// End the remembered session.
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// Send a prompt, or start an interactive session when none is given.
    Chat(ChatArgs),
    /// Browse and manage saved chats.
    #[command(subcommand)]
    History(HistoryCommand),
    /// List available models.
    Models {
        /// Only show models whose id contains this text.
        #[arg(long)]
        filter: Option<String>,
    },
    /// Check that the server is up.
    Health,
}

#[derive(Debug, Args)]
pub(crate) struct ChatArgs {
    /// Model id; defaults to the server's default model.
    #[arg(long, short)]
    pub model: Option<String>,
    /// Continue a saved chat.
    #[arg(long = "chat")]
    pub chat_id: Option<String>,
    /// Wait for the whole reply instead of streaming it.
    #[arg(long)]
    pub no_stream: bool,
    /// Do not save this conversation.
    #[arg(long)]
    pub temporary: bool,
    pub prompt: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub(crate) enum HistoryCommand {
    List {
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
        /// Show archived chats instead of active ones.
        #[arg(long)]
        archived: bool,
    },
    Show {
        id: String,
    },
    Rename {
        id: String,
        title: String,
    },
    /// Archive a chat.
    Delete {
        id: String,
    },
    /// Bring an archived chat back.
    Restore {
        id: String,
    },
}

fn open_storage(path: Option<&Path>) -> Result<FileStorage> {
    match path {
        Some(path) => FileStorage::open(path),
        None => FileStorage::open_default(),
    }
    .context("failed to open local storage")
}

/// An API client carrying the remembered session, if any.
fn client_for(url: &str, storage: &dyn KeyValueStore) -> Result<ApiClient> {
    Ok(ApiClient::new(url)?.with_token(storage.get(TOKEN_KEY)))
}

fn remember_session(storage: &mut dyn KeyValueStore, token: &str) -> Result<()> {
    storage
        .set(TOKEN_KEY, token)
        .context("failed to save session token")
}

fn forget_session(storage: &mut dyn KeyValueStore) -> Result<()> {
    storage
        .remove(TOKEN_KEY)
        .context("failed to clear session token")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_env("FEREELAB_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut storage = open_storage(cli.storage.as_deref())?;
    let mut api = client_for(&cli.url, &storage)?;

    match cli.command {
        Command::Signup {
            email,
            name,
            password,
        } => {
            let resp = api
                .signup(&fereelab_types::SignupRequest {
                    email,
                    password,
                    name,
                })
                .await?;
            remember_session(&mut storage, &resp.token)?;
            println!("Signed up as {} <{}>", resp.user.name, resp.user.email);
        }
        Command::Login { email, password } => {
            let resp = api
                .login(&fereelab_types::LoginRequest { email, password })
                .await?;
            remember_session(&mut storage, &resp.token)?;
            println!("Signed in as {} <{}>", resp.user.name, resp.user.email);
        }
        Command::Logout => {
            if api.token().is_some() {
                let resp = api.logout().await;
                forget_session(&mut storage)?;
                println!("{}", resp?.message);
            } else {
                println!("Not signed in");
            }
        }
        Command::Whoami => {
            let user = api.me().await?;
            println!("{} <{}> ({})", user.name, user.email, user.provider);
        }
        Command::Chat(args) => commands::chat(api, args).await?,
        Command::History(cmd) => commands::history(&api, cmd).await?,
        Command::Models { filter } => commands::models(&api, filter.as_deref()).await?,
        Command::Health => {
            let health = api.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use clap::CommandFactory;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("fereelab").chain(args.iter().copied())).unwrap()
    }

    fn scratch_path() -> PathBuf {
        std::env::temp_dir().join(format!("fereelab-cli-{}", uuid::Uuid::new_v4().simple()))
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn chat_collects_prompt_words_and_flags() {
        let cli = parse(&["chat", "--chat", "c1", "-m", "openai/gpt-4o", "--no-stream", "hello", "there"]);
        let Command::Chat(args) = cli.command else {
            panic!("expected chat, got {:?}", cli.command);
        };
        assert_eq!(args.chat_id.as_deref(), Some("c1"));
        assert_eq!(args.model.as_deref(), Some("openai/gpt-4o"));
        assert!(args.no_stream);
        assert!(!args.temporary);
        assert_eq!(args.prompt, ["hello", "there"]);
    }

    #[test]
    fn history_subcommands_parse() {
        let cli = parse(&["history", "list", "--limit", "5", "--archived"]);
        assert!(matches!(
            cli.command,
            Command::History(HistoryCommand::List { limit: Some(5), offset: None, archived: true })
        ));

        let cli = parse(&["history", "rename", "c1", "New title"]);
        assert!(matches!(
            cli.command,
            Command::History(HistoryCommand::Rename { ref id, ref title }) if id == "c1" && title == "New title"
        ));

        assert!(Cli::try_parse_from(["fereelab", "history", "show"]).is_err());
    }

    #[test]
    fn url_flag_overrides_default() {
        let cli = parse(&["--url", "http://example.test:8080", "health"]);
        assert_eq!(cli.url, "http://example.test:8080");
        assert!(matches!(cli.command, Command::Health));
    }

    #[test]
    fn session_survives_reopen_until_forgotten() {
        let path = scratch_path();
        {
            let mut storage = open_storage(Some(&path)).unwrap();
            assert!(client_for("http://localhost:3000", &storage).unwrap().token().is_none());
            remember_session(&mut storage, "tok-1").unwrap();
        }

        let mut storage = open_storage(Some(&path)).unwrap();
        let api = client_for("http://localhost:3000", &storage).unwrap();
        assert_eq!(api.token(), Some("tok-1"));

        forget_session(&mut storage).unwrap();
        let storage = open_storage(Some(&path)).unwrap();
        assert!(storage.get(TOKEN_KEY).is_none());
        assert!(client_for("http://localhost:3000", &storage).unwrap().token().is_none());

        let _ = std::fs::remove_file(&path);
    }
}
