use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use futures_util::StreamExt;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::agent::types::Role;
use crate::gateway::{DeliveryEvent, Gateway, MessageRequest};
use crate::store::TranscriptMessage;

/// Where REPL input is sent.
pub(crate) struct ChatTarget {
    pub session_id: String,
    pub provider_id: String,
    pub model_name: String,
    pub stream: bool,
}

impl ChatTarget {
    fn request(&self, message: &str) -> MessageRequest {
        MessageRequest {
            message: message.to_string(),
            provider_id: self.provider_id.clone(),
            model_name: self.model_name.clone(),
        }
    }
}

/// Resolve the history file path (~/.chat-gateway/history).
fn history_path() -> Option<std::path::PathBuf> {
    dirs::home_dir().map(|h| h.join(".chat-gateway").join("history"))
}

/// Run the interactive REPL loop.
///
/// Uses rustyline for line editing. History is persisted to
/// ~/.chat-gateway/history across runs.
pub(crate) async fn run_repl(gateway: &Arc<Gateway>, mut target: ChatTarget) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    if let Some(ref path) = history_path() {
        let _ = rl.load_history(path);
    }

    eprintln!(
        "\x1b[1mchat-gateway\x1b[0m \x1b[2mv{}\x1b[0m  \x1b[2m({}/{})\x1b[0m",
        env!("CARGO_PKG_VERSION"),
        target.provider_id,
        target.model_name,
    );
    eprintln!("\x1b[2mType \"exit\" or Ctrl+D to quit. Type /help for commands.\x1b[0m\n");

    loop {
        match rl.readline("\x1b[1;32m>\x1b[0m ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed == "exit" || trimmed == "quit" {
                    break;
                }
                rl.add_history_entry(trimmed)?;

                if trimmed.starts_with('/') {
                    handle_slash_command(trimmed, gateway, &mut target).await;
                    continue;
                }

                let request = target.request(trimmed);
                let result = if target.stream {
                    print_stream(gateway, &target.session_id, request, false).await
                } else {
                    match gateway.send_message(&target.session_id, request).await {
                        Ok(reply) => {
                            println!("{}", reply.content);
                            Ok(())
                        }
                        Err(e) => Err(e.into()),
                    }
                };
                if let Err(e) = result {
                    eprintln!("\x1b[31mError: {e:#}\x1b[0m");
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => {
                eprintln!("\x1b[31mInput error: {e}\x1b[0m");
                break;
            }
        }
    }

    if let Some(ref path) = history_path() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let _ = rl.save_history(path);
    }

    eprintln!("\x1b[2m(session {})\x1b[0m", target.session_id);
    Ok(())
}

/// Stream one reply to stdout until it completes or Ctrl+C is pressed.
///
/// Stopping early only stops display; the reply is still recorded.
pub(crate) async fn print_stream(
    gateway: &Arc<Gateway>,
    session_id: &str,
    request: MessageRequest,
    json: bool,
) -> Result<()> {
    let mut events = gateway.stream_message(session_id, request);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else { break };
                if json {
                    writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
                    continue;
                }
                match event {
                    DeliveryEvent::UserMessage(_) | DeliveryEvent::Start(_) => {}
                    DeliveryEvent::Chunk(chunk) => {
                        write!(stdout, "{}", chunk.increment)?;
                        stdout.flush()?;
                    }
                    DeliveryEvent::Complete(_) => writeln!(stdout)?,
                    DeliveryEvent::Error { error } => anyhow::bail!(error),
                }
            }
            _ = &mut ctrl_c => {
                eprintln!("\n\x1b[2m(stopped; the full reply is saved in the session)\x1b[0m");
                break;
            }
        }
    }
    Ok(())
}

pub(crate) fn print_transcript(messages: &[TranscriptMessage]) {
    if messages.is_empty() {
        eprintln!("  (no messages)");
        return;
    }
    for m in messages {
        println!("{}", format_message(m));
    }
}

fn format_message(m: &TranscriptMessage) -> String {
    let label = match (&m.role, &m.model) {
        (Role::Assistant, Some(model)) => format!("assistant ({model})"),
        (role, _) => role.as_str().to_string(),
    };
    format!(
        "\x1b[2m[{}]\x1b[0m \x1b[1m{}:\x1b[0m {}",
        m.timestamp.format("%H:%M:%S"),
        label,
        m.content
    )
}

/// Split `/command args` into the command and its trimmed arguments.
fn split_command(cmd: &str) -> (&str, &str) {
    let mut parts = cmd.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or("");
    let args = parts.next().unwrap_or("").trim();
    (command, args)
}

async fn handle_slash_command(cmd: &str, gateway: &Gateway, target: &mut ChatTarget) {
    let (command, args) = split_command(cmd);

    match command {
        "/help" | "/h" => {
            eprintln!(
                "\n\x1b[1m  Commands:\x1b[0m\n\
                 \x20   /help, /h                Show this help\n\
                 \x20   /clear                   Start a new session\n\
                 \x20   /reset                   Forget model context, keep the transcript\n\
                 \x20   /history                 Show this session's transcript\n\
                 \x20   /stream [on|off]         Toggle incremental output\n\
                 \x20   /info                    Show session, provider and model\n\
                 \x20   exit, quit               Exit the REPL\n\
                 \x20   Ctrl+C                   Stop a streamed reply\n\
                 \x20   Ctrl+D                   Exit (EOF)\n"
            );
        }

        "/clear" => match gateway.create_session() {
            Ok(session) => {
                target.session_id = session.id;
                eprintln!("  Started new session {}", target.session_id);
            }
            Err(e) => eprintln!("\x1b[31m  Error creating session: {e}\x1b[0m"),
        },

        "/reset" => {
            let cleared = gateway
                .clear_context(&target.session_id, &target.provider_id, &target.model_name)
                .await;
            if cleared {
                eprintln!("  Context cleared.");
            } else {
                eprintln!("  Nothing to clear yet.");
            }
        }

        "/history" => match gateway.messages(&target.session_id) {
            Ok(messages) => print_transcript(&messages),
            Err(e) => eprintln!("\x1b[31m  {e}\x1b[0m"),
        },

        "/stream" => {
            match args.to_lowercase().as_str() {
                "" => target.stream = !target.stream,
                "on" | "true" | "1" | "yes" => target.stream = true,
                "off" | "false" | "0" | "no" => target.stream = false,
                _ => {
                    eprintln!("\x1b[33m  Unknown value: '{}'. Use: on, off\x1b[0m", args);
                    return;
                }
            }
            eprintln!(
                "  Streaming: {}",
                if target.stream { "on" } else { "off" }
            );
        }

        "/info" => {
            eprintln!("  Session:  {}", target.session_id);
            eprintln!("  Provider: {}", target.provider_id);
            eprintln!("  Model:    {}", target.model_name);
            eprintln!(
                "  Stream:   {}",
                if target.stream { "on" } else { "off" }
            );
            eprintln!("  Agents:   {} live", gateway.live_agents().await);
        }

        _ => {
            eprintln!(
                "\x1b[33mUnknown command: {}. Type /help for available commands.\x1b[0m",
                command
            );
        }
    }
}
