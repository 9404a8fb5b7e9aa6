//! logdx - conversational log diagnosis CLI

mod config;
mod session;
mod tools;

use clap::Parser;
use futures::StreamExt;
use logdx_ai::{ModelConfig, Provider, RetryingClient, SharedClient};
use logdx_workflow::{
    ConversationState, Engine, EventBus, StreamMessage, StreamQueue, WorkflowEvent,
};
use std::sync::Arc;

/// logdx - diagnose logs by chatting with them
#[derive(Parser, Debug)]
#[command(name = "logdx")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model to use (default: gpt-4o-mini)
    #[arg(short, long)]
    model: Option<String>,

    /// Provider (openai, anthropic, groq, openrouter, ollama)
    #[arg(short, long)]
    provider: Option<String>,

    /// Override the provider's API base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Log query service endpoint
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Run a single turn non-interactively
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Resume a previous session by ID
    #[arg(long)]
    resume: Option<String>,

    /// List saved sessions
    #[arg(long)]
    sessions: bool,

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
            .with_env_filter("logdx=debug")
            .with_writer(std::io::stderr)
            .init();
    }

    // Initialize config and exit
    if args.init_config {
        let path = config::Config::init()?;
        println!("Config file created at: {}", path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(());
    }

    let store = session::SessionStore::default();

    // List sessions and exit
    if args.sessions {
        return list_sessions(&store);
    }

    let cfg = config::Config::load();

    // Merge config with CLI args (CLI takes precedence)
    let provider = Provider::parse(
        args.provider
            .as_deref()
            .or(cfg.provider.as_deref())
            .unwrap_or("openai"),
    );
    let model_id = args
        .model
        .or(cfg.model.clone())
        .unwrap_or_else(|| "gpt-4o-mini".to_string());
    let mut model = ModelConfig::new(provider, model_id);
    if let Some(base_url) = args.base_url.or(cfg.base_url.clone()) {
        model = model.with_base_url(base_url);
    }

    let Some(endpoint) = args.endpoint.or(cfg.tool.endpoint.clone()) else {
        eprintln!("Error: No log query endpoint configured");
        eprintln!();
        eprintln!("Pass one with: logdx --endpoint http://host/logs/query");
        eprintln!("Or add it to config file: logdx --init-config");
        std::process::exit(1);
    };

    let client = match logdx_ai::providers::client_for(&model, cfg.get_api_key(provider).as_deref())
    {
        Ok(client) => client,
        Err(logdx_ai::Error::InvalidApiKey) => {
            let api_key_var = provider.api_key_env_var().unwrap_or("OPENAI_API_KEY");
            eprintln!("Error: No API key found for {}", provider.name());
            eprintln!();
            eprintln!("Set your API key with: export {}=your-key", api_key_var);
            eprintln!("Or add it to config file: logdx --init-config");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };
    let reasoning: SharedClient =
        Arc::new(RetryingClient::new(client).with_retry_config(cfg.retry_config()));
    let tool = Arc::new(tools::HttpLogQueryTool::new(endpoint));

    let events = EventBus::default();
    spawn_event_logger(&events);

    let engine = Engine::new(reasoning, tool)?
        .with_config(cfg.engine_config())
        .with_event_bus(events);

    // Resume session if specified
    let state = match args.resume {
        Some(ref session_id) => {
            let saved = store.load(session_id)?;
            println!(
                "Resuming session {} ({} messages)",
                session_id,
                saved.state.messages.len()
            );
            saved.state
        }
        None => session::SessionStore::new_state(),
    };

    if let Some(command) = args.command {
        let state = run_turn(&engine, state, &command).await?;
        save_session(&store, &model.id, &state);
        return Ok(());
    }

    run_interactive(&engine, &store, &model, state).await
}

/// Log workflow events through tracing
fn spawn_event_logger(events: &EventBus) {
    let mut receiver = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = receiver.recv().await {
            match event {
                WorkflowEvent::StepFailed { step, error, .. } => {
                    tracing::warn!(%step, "Step failed: {}", error);
                }
                event => tracing::debug!(?event, "Workflow event"),
            }
        }
    });
}

/// Run one turn, printing stream items as they arrive
async fn run_turn(
    engine: &Engine,
    state: ConversationState,
    input: &str,
) -> anyhow::Result<ConversationState> {
    let queue = Arc::new(StreamQueue::new());
    let mut stream = queue.stream();
    let printer = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            print_stream_message(&message);
        }
    });

    let result = engine.run(state.with_input(input), &queue).await;
    queue.close();
    if let Err(e) = printer.await {
        tracing::warn!("Output task failed: {}", e);
    }

    Ok(result?)
}

fn print_stream_message(message: &StreamMessage) {
    let payload = &message.payload;
    match message.kind.as_str() {
        "message" if payload["role"] == "assistant" => {
            println!("{}\n", payload["content"].as_str().unwrap_or_default());
        }
        "stream_name" => {
            if let Some(stream) = payload["streamName"].as_str() {
                println!("[stream: {}]", stream);
            }
        }
        "tool_result" if payload["isError"] == true => {
            println!("[log query failed]");
        }
        "tool_call" => println!("[querying logs...]"),
        _ => {}
    }
}

fn save_session(store: &session::SessionStore, model: &str, state: &ConversationState) {
    if let Err(e) = store.save(model, state) {
        eprintln!("Warning: Failed to save session: {}", e);
    }
}

async fn run_interactive(
    engine: &Engine,
    store: &session::SessionStore,
    model: &ModelConfig,
    mut state: ConversationState,
) -> anyhow::Result<()> {
    use std::io::{self, Write};

    // Show minimal startup info (only if TTY)
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!("logdx ({}) session: {}", model.id, state.session_id());
        eprintln!("Ask about a log stream, e.g. \"show me error logs\". /exit to quit.");
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
        if matches!(input, "/exit" | "/quit") {
            break;
        }

        match run_turn(engine, state.clone(), input).await {
            Ok(next) => {
                state = next;
                save_session(store, &model.id, &state);
            }
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    Ok(())
}

fn list_sessions(store: &session::SessionStore) -> anyhow::Result<()> {
    let sessions = store.list()?;
    if sessions.is_empty() {
        println!("No saved sessions.");
        return Ok(());
    }

    println!("Recent sessions:\n");
    for session in sessions.iter().take(20) {
        println!(
            "  {}  created {}  updated {}  {} messages  stream: {}  ({})",
            session.id,
            session.created_at_display(),
            session.updated_at_display(),
            session.message_count,
            session.stream_name,
            session.model
        );
    }
    println!("\nResume with: logdx --resume <session-id>");

    Ok(())
}
