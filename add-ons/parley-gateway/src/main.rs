//! Parley gateway: serves the conversation API (and optionally a static UI) over HTTP.
//!
//! Audio arrives as uploaded utterances and leaves as a queue of synthesized clips, which
//! the browser fetches and plays. Start with `--voice` (built with the `voice` feature) to
//! use the local microphone and speakers instead.

mod routes;
#[cfg(feature = "voice")]
mod voice;

use parley_core::ParleyConfig;
use parley_engine::{
    spawn, ConversationHandle, ConversationResult, HttpBackendFactory, Orchestrator, SessionStore,
};
use parley_voice::{MemoryCapture, MemoryPlayback};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub conversation: ConversationHandle,
    /// Set when audio is played by the browser rather than local speakers.
    pub speech: Option<Arc<MemoryPlayback>>,
    pub config: Arc<ParleyConfig>,
}

fn build_state(config: Arc<ParleyConfig>, local_voice: bool) -> ConversationResult<AppState> {
    let store = SessionStore::new(&config.storage.state_dir);
    let factory = Arc::new(HttpBackendFactory::new(config.clone()));

    if local_voice {
        #[cfg(feature = "voice")]
        return voice::device_state(config, factory, store);
        #[cfg(not(feature = "voice"))]
        warn!(target: "parley::gateway", "--voice needs the `voice` feature; using browser audio");
    }

    let capture = Arc::new(MemoryCapture::new());
    let playback = Arc::new(MemoryPlayback::new());
    let orchestrator = Orchestrator::new(
        config.clone(),
        factory,
        capture,
        playback.clone(),
    )
    .with_store(store)?;
    Ok(AppState {
        conversation: spawn(orchestrator),
        speech: Some(playback),
        config,
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(target: "parley::gateway", error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!(target: "parley::gateway", "shutting down");
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[parley-gateway] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ParleyConfig::load() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!(target: "parley::gateway", error = %e, "configuration could not be loaded");
            std::process::exit(1);
        }
    };

    let local_voice = std::env::args().any(|a| a == "--voice");
    let state = match build_state(config.clone(), local_voice) {
        Ok(state) => state,
        Err(e) => {
            error!(target: "parley::gateway", error = %e, "conversation service failed to start");
            std::process::exit(1);
        }
    };
    let snapshot = state.conversation.snapshot();
    info!(
        target: "parley::gateway",
        state_dir = %config.storage.state_dir.display(),
        restored_turns = snapshot.history.len(),
        "conversation service ready"
    );

    let app = routes::router(state);
    let listener = match tokio::net::TcpListener::bind(&config.gateway.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(target: "parley::gateway", bind = %config.gateway.bind, error = %e, "could not bind");
            std::process::exit(1);
        }
    };
    info!(target: "parley::gateway", bind = %config.gateway.bind, "listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(target: "parley::gateway", error = %e, "server error");
    }
}
