//! insight - chat with the analytics assistant from the terminal

mod config;
mod output;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use insight_api::{ApiClient, ConversationId, ListConversationsParams};
use insight_chat::{ChatSession, SendOutcome};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// insight - chat with the analytics assistant
#[derive(Parser, Debug)]
#[command(name = "insight")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// API base URL (default: from config or INSIGHT_API_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Bearer token (default: from config or INSIGHT_API_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Continue an existing conversation
    #[arg(long)]
    conversation: Option<String>,

    /// Send a single message and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// List conversations
    #[arg(long)]
    list: bool,

    /// Only list conversations matching this text
    #[arg(long, requires = "list")]
    search: Option<String>,

    /// Print the messages of a conversation
    #[arg(long)]
    history: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("insight=debug")
            .with_writer(io::stderr)
            .init();
    } else if let Ok(filter) = tracing_subscriber::EnvFilter::try_from_default_env() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }

    if args.init_config {
        let path = config::Config::init().context("creating config file")?;
        println!("Config file created at: {}", path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(());
    }

    let cfg = config::Config::load();

    let Some(base_url) = args.base_url.clone().or_else(|| cfg.base_url()) else {
        bail!(
            "No API URL configured. Pass --base-url, set {}, or run insight --init-config",
            insight_api::client::BASE_URL_ENV
        );
    };
    let mut client = ApiClient::new(base_url)?;
    if let Some(token) = args.token.clone().or_else(|| cfg.api_token()) {
        client = client.with_token(token);
    }

    if args.list {
        return list_conversations(&client, args.search).await;
    }

    if let Some(ref id) = args.history {
        return print_history(&client, &ConversationId::new(id.as_str())).await;
    }

    let session = ChatSession::new(Arc::new(client.clone()));
    let active = args
        .conversation
        .clone()
        .or_else(|| cfg.default_conversation.clone())
        .map(ConversationId::from);
    session.store().set_active_conversation(active);

    let events = client
        .subscribe(cfg.events_path())
        .context("opening realtime channel")?;
    let cancel = CancellationToken::new();
    let pump_closed = CancellationToken::new();
    let pump = tokio::spawn({
        let session = session.clone();
        let cancel = cancel.clone();
        let pump_closed = pump_closed.clone();
        async move {
            if let Err(e) = session.run(events, cancel).await {
                eprintln!("Realtime channel error: {}", e);
            }
            pump_closed.cancel();
        }
    });

    let result = match args.command {
        Some(ref command) => run_turn(&session, command, &pump_closed).await,
        None => run_interactive(&session, &pump_closed).await,
    };

    cancel.cancel();
    let _ = pump.await;
    result
}

async fn list_conversations(client: &ApiClient, search: Option<String>) -> anyhow::Result<()> {
    let params = ListConversationsParams {
        limit: Some(50),
        search,
        ..Default::default()
    };
    let page = client.list_conversations(&params).await?;

    if page.items.is_empty() {
        println!("No conversations.");
        return Ok(());
    }

    for conversation in &page.items {
        let last = conversation
            .last_message_at
            .as_deref()
            .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<40}  {:>4} msgs  {}",
            conversation.id, conversation.title, conversation.message_count, last
        );
    }
    if page.total as usize > page.items.len() {
        println!("({} of {} shown)", page.items.len(), page.total);
    }
    Ok(())
}

async fn print_history(client: &ApiClient, conversation_id: &ConversationId) -> anyhow::Result<()> {
    let history = client.get_conversation_messages(conversation_id).await?;
    for message in &history.messages {
        let role = match message.role {
            insight_api::ChatMessageRole::User => "you",
            insight_api::ChatMessageRole::Assistant => "assistant",
        };
        let marker = if message.is_complete { "" } else { " (incomplete)" };
        println!("[{}{}] {}\n", role, marker, message.content);
    }
    Ok(())
}

/// Send one message and print the assistant turn as it streams.
async fn run_turn(
    session: &ChatSession,
    content: &str,
    pump_closed: &CancellationToken,
) -> anyhow::Result<()> {
    let mut updates = session.subscribe();

    let conversation_id = match session.send(content).await {
        SendOutcome::Rejected => {
            println!("A message is still being answered; wait for it to finish.");
            return Ok(());
        }
        SendOutcome::Failed { detail } => {
            eprintln!("Error: {}", detail);
            return Ok(());
        }
        SendOutcome::Sent { response, .. } => response.conversation_id,
    };

    let store = session.store();
    let mut printer = output::TurnPrinter::new();
    loop {
        let snapshot = store.snapshot(&conversation_id);
        print!("{}", printer.update(&snapshot));
        io::stdout().flush()?;

        // The send lock is released once the turn has finished streaming.
        if store.send_allowed(Some(&conversation_id)) {
            print!("{}", printer.finish(&snapshot));
            break;
        }

        tokio::select! {
            update = updates.recv() => match update {
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            _ = pump_closed.cancelled() => {
                println!();
                eprintln!("Realtime channel closed before the answer finished.");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }
    io::stdout().flush()?;
    Ok(())
}

async fn run_interactive(
    session: &ChatSession,
    pump_closed: &CancellationToken,
) -> anyhow::Result<()> {
    if io::IsTerminal::is_terminal(&io::stderr()) {
        match session.store().active_conversation() {
            Some(id) => eprintln!("insight (conversation {})", id),
            None => eprintln!("insight (new conversation)"),
        }
        eprintln!("Commands: /new, /dismiss, /exit");
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/exit" | "/quit" => break,
            "/new" => {
                session.store().set_active_conversation(None);
                println!("Started a new conversation.");
                continue;
            }
            "/dismiss" => {
                let cleared = session
                    .store()
                    .active_conversation()
                    .is_some_and(|id| session.store().clear_failure(&id));
                if !cleared {
                    println!("Nothing to dismiss.");
                }
                continue;
            }
            _ => {}
        }

        run_turn(session, input, pump_closed).await?;
        if pump_closed.is_cancelled() {
            break;
        }
    }

    Ok(())
}
