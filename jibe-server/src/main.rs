//! jibe-server: entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Open the SQLite database and run pending migrations.
//! 4. Build the upstream generation client and the content moderator.
//! 5. Start the generation workers and re-enqueue unfinished tasks.
//! 6. Build the Axum router and start the HTTP server with graceful shutdown.

mod config;
mod entities;
mod error;
mod generation;
mod middleware;
mod moderation;
mod orchestrator;
mod routes;
mod schemas;
mod state;
#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::entities::SqliteStore;
use crate::generation::{GenerationClient, GenerationParams, OpenAiCompatibleClient};
use crate::moderation::WordlistModerator;
use crate::orchestrator::{Orchestrator, PipelineSettings};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: JIBE_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "jibe-server starting");

    // ── 3. Database ────────────────────────────────────────────────────────────
    let store = Arc::new(SqliteStore::connect(&cfg.database_url).await?);
    info!(database_url = %cfg.database_url, "database ready");

    // ── 4. Upstream client and moderation ──────────────────────────────────────
    let generator: Option<Arc<dyn GenerationClient>> = match cfg.llm.api_key.as_deref() {
        Some(key) => {
            let client = OpenAiCompatibleClient::new(
                key,
                &cfg.llm.base_url,
                cfg.llm.model.clone(),
                cfg.llm.timeout,
            )?;
            info!(base_url = %cfg.llm.base_url, model = %client.model(), "generation client ready");
            Some(Arc::new(client) as Arc<dyn GenerationClient>)
        }
        None => {
            warn!("JIBE_LLM_API_KEY is not set; generation requests will be refused");
            None
        }
    };
    let moderator = Arc::new(WordlistModerator::new(cfg.banned_phrases.clone()));

    // ── 5. Generation workers ──────────────────────────────────────────────────
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        generator,
        moderator,
        PipelineSettings {
            system_prompt: cfg.llm.system_prompt.clone(),
            timeout: cfg.llm.timeout,
            params: GenerationParams::default(),
        },
        cfg.queue_capacity,
    );
    orchestrator.start_workers(cfg.workers);
    orchestrator.recover().await?;

    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        store,
        orchestrator: Arc::clone(&orchestrator),
    });

    // ── 6. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(Arc::clone(&state));
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    orchestrator.shutdown();
    info!("jibe-server stopped");
    Ok(())
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
