//! helpdesk-server: HTTP entry point for the support-bot.
//!
//! Wires the Gemini client, the tool-provider factory, and the session
//! stores together behind an axum router.

mod history;
mod orchestrator;
mod routes;
mod session;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use helpdesk_ai::gemini::{GeminiClient, GeminiConfig};
use helpdesk_ai::AiClient;
use helpdesk_mcp::McpFactory;

use crate::history::HistoryService;
use crate::orchestrator::Orchestrator;
use crate::routes::AppState;
use crate::session::SessionStore;

#[derive(Parser)]
#[command(name = "helpdesk-server", about = "Gemini-backed customer support API")]
struct Args {
    /// Port to listen on (overrides PORT).
    #[arg(short, long)]
    port: Option<u16>,

    /// Log filter directive, e.g. `helpdesk=debug`.
    #[arg(long)]
    log_level: Option<String>,
}

fn load_dotenv() {
    // Try common locations for .env relative to the workspace
    let manifest_dir = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let candidates = [
        // Workspace root, two levels up from crates/helpdesk-server/
        manifest_dir.join("..").join("..").join(".env"),
        // Current directory
        std::path::PathBuf::from(".env"),
    ];

    for path in &candidates {
        if let Ok(contents) = std::fs::read_to_string(path) {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let key = key.trim();
                    let value = value.trim().trim_matches('"').trim_matches('\'');
                    if std::env::var(key).is_err() {
                        std::env::set_var(key, value);
                    }
                }
            }
            return;
        }
    }
}

#[tokio::main]
async fn main() {
    load_dotenv();

    let args = Args::parse();

    let log_directive = args.log_level.as_deref().unwrap_or("helpdesk=info");
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_directive.into()),
        )
        .init();

    let settings = match helpdesk_config::load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    let gemini_config = GeminiConfig::new(settings.gemini.api_key.clone())
        .with_model(settings.gemini.model.clone())
        .with_max_tokens(settings.gemini.max_tokens)
        .with_temperature(settings.gemini.temperature)
        .with_top_k(settings.gemini.top_k)
        .with_top_p(settings.gemini.top_p)
        .with_default_system_instruction(settings.gemini.default_system_instruction.clone());
    let ai: Arc<dyn AiClient> = Arc::new(GeminiClient::new(gemini_config));

    let store = SessionStore::new();
    let history = HistoryService::new(settings.history.ttl);
    let orchestrator = Arc::new(Orchestrator::new(
        ai.clone(),
        store,
        McpFactory::new(settings.mcp.clone()),
    ));

    // Spawn expired-session reaper.
    let reaper = history.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            reaper.reap_expired().await;
        }
    });

    let state = AppState {
        orchestrator,
        history,
        ai,
    };
    let app = routes::router(state);

    let port = args.port.unwrap_or(settings.server.port);
    let addr = format!("0.0.0.0:{port}");
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(model = %settings.gemini.model, "helpdesk-server listening on {addr}");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }
}
