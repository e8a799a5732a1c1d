use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use haven_api::ApiClient;
use haven_core::backend::ChatBackend;
use haven_core::config::ClientConfig;
use haven_core::ids::ParticipantId;
use haven_core::message::{DeliveryStatus, Role};
use haven_engine::{ChatSession, SessionSignal, WelcomeCatalog, DEFAULT_SESSION_BUDGET_SECS};
use haven_socket::{ConnectionManager, WsTransport};
use haven_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser)]
#[command(name = "haven", about = "Demo client for the haven chat engine")]
struct Cli {
    /// HTTP API base URL
    #[arg(long, env = "HAVEN_API_URL", default_value = "http://localhost:8000")]
    api_url: String,

    /// Persistent-connection endpoint
    #[arg(long, env = "HAVEN_SOCKET_URL", default_value = "ws://localhost:8000/ws")]
    socket_url: String,

    /// Bearer token
    #[arg(long, env = "HAVEN_TOKEN", default_value = "")]
    token: String,

    /// Participant identity; minted if omitted
    #[arg(long, env = "HAVEN_USER_ID")]
    user: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List existing conversations
    Chats,
    /// Start a session and chat interactively
    Chat {
        /// Listener category
        #[arg(long, default_value = "TherapyBro")]
        category: String,
        /// Session budget in seconds
        #[arg(long, default_value_t = DEFAULT_SESSION_BUDGET_SECS)]
        budget: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut telemetry = TelemetryConfig::default();
    telemetry.json_output = cli.json_logs;
    init_telemetry(&telemetry);

    let participant = cli
        .user
        .as_deref()
        .map(ParticipantId::from_raw)
        .unwrap_or_default();
    let config = ClientConfig::new(
        cli.api_url.clone(),
        cli.socket_url.clone(),
        cli.token.clone(),
        participant.clone(),
    );

    let backend = Arc::new(ApiClient::new(config.clone()).context("building HTTP client")?);
    let connection = Arc::new(ConnectionManager::new(Arc::new(WsTransport::new(config))));

    match cli.command {
        Command::Chats => {
            let summaries = backend.list_conversations().await?;
            if summaries.is_empty() {
                println!("no conversations yet");
            }
            for summary in summaries {
                println!(
                    "{}  {:20}  {}",
                    summary.conversation_id,
                    summary.category,
                    summary.updated_at.format("%Y-%m-%d %H:%M"),
                );
            }
        }
        Command::Chat { category, budget } => {
            let session = ChatSession::with_options(
                backend,
                connection,
                participant,
                WelcomeCatalog::default(),
                budget,
            );
            session.connect().await.context("connecting")?;
            let conversation = session.start(&category).await.context("starting session")?;
            println!("session {conversation} started ({category}, {budget}s)");
            for message in session.messages() {
                print_message(&message.role, &message.content);
            }

            chat_loop(&session).await?;
            session.close().await;
        }
    }
    Ok(())
}

/// Read lines from stdin and relay them; `/continue <secs>` renews an
/// expired budget, `/notes <text>` updates notes, `/quit` exits.
async fn chat_loop(session: &ChatSession) -> anyhow::Result<()> {
    let mut signals = session.subscribe_signals();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            signal = signals.recv() => {
                if let Ok(SessionSignal::Expired { .. }) = signal {
                    println!("-- session expired; `/continue <secs>` to renew --");
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "/quit" {
                    break;
                }
                if let Some(secs) = line.strip_prefix("/continue") {
                    let secs = secs.trim().parse().unwrap_or(DEFAULT_SESSION_BUDGET_SECS);
                    session.renew(secs);
                    println!("-- renewed for {secs}s --");
                    continue;
                }
                if let Some(notes) = line.strip_prefix("/notes ") {
                    session.set_notes(notes).await?;
                    println!("-- notes saved --");
                    continue;
                }
                match session.send(line).await {
                    Ok(_) => print_reply(session).await,
                    Err(e) => println!("-- cannot send: {e} --"),
                }
            }
        }
    }
    Ok(())
}

/// Wait for the in-flight reply to finalize, then print it.
async fn print_reply(session: &ChatSession) {
    loop {
        let messages = session.messages();
        match messages.last() {
            Some(last) if last.role == Role::Peer && last.status != DeliveryStatus::Pending => {
                print_message(&last.role, &last.content);
                if last.status == DeliveryStatus::Failed {
                    println!("-- reply incomplete --");
                }
                return;
            }
            _ => tokio::time::sleep(std::time::Duration::from_millis(50)).await,
        }
    }
}

fn print_message(role: &Role, content: &str) {
    let tag = match role {
        Role::User => "you",
        Role::Peer => "peer",
        Role::System => "**",
    };
    println!("[{tag}] {content}");
}
