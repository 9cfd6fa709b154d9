mod agent;
mod cli;
mod config;
mod error;
mod gateway;
mod llm;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::gateway::{Gateway, MessageRequest};
use crate::llm::models;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "chat-gateway",
    about = "Multi-provider chat sessions over OpenAI, Claude and DeepSeek",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    /// Config file (defaults to ~/.chat-gateway/config.yaml)
    #[arg(long, global = true, env = "CHAT_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a prompt (single turn, or a REPL when no prompt is given)
    Chat {
        /// The prompt to send
        prompt: Option<String>,

        /// Provider id (openai, claude, deepseek)
        #[arg(short, long)]
        provider: String,

        /// Model name; must be allowed for the provider's key
        #[arg(short, long)]
        model: String,

        /// Session id to continue; a new session is created when omitted
        #[arg(short, long)]
        session: Option<String>,

        /// Reveal the reply incrementally
        #[arg(long)]
        stream: bool,

        /// Print streamed delivery events as JSON lines
        #[arg(long, requires = "stream")]
        json: bool,
    },
    /// Provider API key management
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },
    /// Chat session management
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
    /// Provider information
    Providers {
        #[command(subcommand)]
        action: ProvidersAction,
    },
}

#[derive(Subcommand)]
enum KeysAction {
    /// Validate and store an API key
    Add {
        #[arg(short, long)]
        provider: String,

        /// Falls back to the provider's usual env var (e.g. OPENAI_API_KEY)
        #[arg(short = 'k', long)]
        api_key: Option<String>,

        /// Allowed model; the first one is validated before the key is saved
        #[arg(short, long = "model", required = true)]
        models: Vec<String>,
    },
    /// List configured providers and their models
    List,
    /// Remove a provider's key
    Remove { provider: String },
}

#[derive(Subcommand)]
enum SessionsAction {
    /// Create an empty session
    New,
    /// List sessions, newest first
    List,
    /// Print a session transcript
    Show { id: String },
    /// Delete a session and its agents
    Delete { id: String },
}

#[derive(Subcommand)]
enum ProvidersAction {
    /// List supported providers
    List,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;
    let gateway = Arc::new(Gateway::open(&config)?);

    match cli.command {
        Commands::Chat {
            prompt,
            provider,
            model,
            session,
            stream,
            json,
        } => {
            let session_id = match session {
                Some(id) => gateway.session(&id)?.id,
                None => gateway.create_session()?.id,
            };
            match prompt {
                Some(text) => {
                    let request = MessageRequest {
                        message: text,
                        provider_id: provider,
                        model_name: model,
                    };
                    cmd_chat_once(&gateway, &session_id, request, stream, json).await
                }
                None => {
                    let target = cli::ChatTarget {
                        session_id,
                        provider_id: provider,
                        model_name: model,
                        stream,
                    };
                    cli::run_repl(&gateway, target).await
                }
            }
        }
        Commands::Keys { action } => match action {
            KeysAction::Add {
                provider,
                api_key,
                models,
            } => cmd_keys_add(&gateway, provider, api_key, models).await,
            KeysAction::List => cmd_keys_list(&gateway),
            KeysAction::Remove { provider } => {
                gateway.remove_provider_key(&provider)?;
                println!("Removed API key for {provider}");
                Ok(())
            }
        },
        Commands::Sessions { action } => match action {
            SessionsAction::New => {
                println!("{}", gateway.create_session()?.id);
                Ok(())
            }
            SessionsAction::List => cmd_sessions_list(&gateway),
            SessionsAction::Show { id } => cmd_sessions_show(&gateway, &id),
            SessionsAction::Delete { id } => {
                gateway.delete_session(&id).await?;
                println!("Deleted session {id}");
                Ok(())
            }
        },
        Commands::Providers { action } => match action {
            ProvidersAction::List => cmd_providers_list(&gateway),
        },
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chat_gateway=info".parse().unwrap()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn cmd_chat_once(
    gateway: &Arc<Gateway>,
    session_id: &str,
    request: MessageRequest,
    stream: bool,
    json: bool,
) -> Result<()> {
    if stream {
        cli::print_stream(gateway, session_id, request, json).await?;
    } else {
        let reply = gateway.send_message(session_id, request).await?;
        println!("{}", reply.content);
    }
    eprintln!("\x1b[2m(session {session_id})\x1b[0m");
    Ok(())
}

async fn cmd_keys_add(
    gateway: &Gateway,
    provider: String,
    api_key: Option<String>,
    model_names: Vec<String>,
) -> Result<()> {
    let api_key = match api_key {
        Some(key) => key,
        None => {
            let var = models::api_key_env_var(&provider)
                .with_context(|| format!("--api-key is required for provider '{provider}'"))?;
            std::env::var(var)
                .ok()
                .filter(|v| !v.is_empty())
                .with_context(|| format!("no --api-key given and {var} is not set"))?
        }
    };

    eprintln!("Validating {provider} key...");
    gateway.add_provider_key(&provider, &api_key, model_names).await?;
    println!("API key saved for {provider}");
    Ok(())
}

fn cmd_keys_list(gateway: &Gateway) -> Result<()> {
    let providers = gateway.list_providers();
    if providers.is_empty() {
        println!("No API keys configured.");
        return Ok(());
    }
    for (provider, allowed) in &providers {
        println!("{provider}: {}", allowed.join(", "));
    }
    Ok(())
}

fn cmd_sessions_list(gateway: &Gateway) -> Result<()> {
    let sessions = gateway.list_sessions();
    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }
    for s in &sessions {
        println!(
            "{}  {}  {} message{}  {}",
            s.id,
            s.created_at.format("%Y-%m-%d %H:%M"),
            s.message_count,
            if s.message_count == 1 { "" } else { "s" },
            s.title,
        );
    }
    Ok(())
}

fn cmd_sessions_show(gateway: &Gateway, id: &str) -> Result<()> {
    let session = gateway.session(id)?;
    println!("\x1b[1m{}\x1b[0m \x1b[2m({})\x1b[0m", session.title, session.id);
    cli::print_transcript(&session.messages);
    Ok(())
}

fn cmd_providers_list(gateway: &Gateway) -> Result<()> {
    let configured = gateway.list_providers();
    for provider in gateway.supported_providers() {
        let status = if configured.contains_key(&provider) {
            "key configured"
        } else {
            "no key"
        };
        println!("{provider} ({status})");
        let suggested = models::suggested_models(&provider);
        if !suggested.is_empty() {
            println!("\x1b[2m  models: {}\x1b[0m", suggested.join(", "));
        }
    }
    println!(
        "\x1b[2mAgent types: {}\x1b[0m",
        agent::factory::supported_agent_types().join(", ")
    );
    Ok(())
}
