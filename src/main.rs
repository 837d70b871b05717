//! Application entry point: stream TTS relay.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Build the generative moderator, only when an API key is configured.
//! 4. Build the synthesis client and the action dispatcher.
//! 5. Load recent history and spawn the scheduler.
//! 6. Forward scheduler events and actions to connected clients.
//! 7. Accept client connections until the process is stopped.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use stream_tts::{
    actions::ActionDispatcher,
    config::AppConfig,
    llm::{ApiGenerator, Moderator},
    pipeline::{HistoryLog, Scheduler, SchedulerDeps},
    server::{self, BROADCAST_CAPACITY},
    tts::HttpSynthesizer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("stream-tts starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e:#}); using defaults");
        AppConfig::default()
    });
    let config = Arc::new(config);

    // 3. Generative provider
    let moderator = if config.generative.has_api_key() {
        log::info!("Generative processing with model {}", config.generative.model);
        Some(Arc::new(Moderator::new(Arc::new(ApiGenerator::from_config(
            &config.generative,
        )))))
    } else {
        log::warn!("No generative API key configured; moderation and voice direction disabled");
        None
    };

    // 4. Synthesis + actuators
    let synthesizer = Arc::new(HttpSynthesizer::from_config(&config.synthesis));
    let (actions_tx, actions_rx) = mpsc::unbounded_channel();
    let dispatcher = Arc::new(ActionDispatcher::new(config.actions.clone(), actions_tx));

    // 5. Scheduler
    let history = HistoryLog::from_config(&config.history);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let deps = SchedulerDeps {
        moderator,
        synthesizer,
        overlay: dispatcher.clone(),
        refunds: dispatcher,
    };
    let handle = Scheduler::new(Arc::clone(&config), deps, history, events_tx).spawn();

    // 6. Outbound fan-out
    let (outbound, _) = broadcast::channel(BROADCAST_CAPACITY);
    tokio::spawn(server::pump(events_rx, actions_rx, outbound.clone()));

    // 7. Listener
    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    log::info!("Listening on {addr}");

    server::serve(listener, handle, outbound).await
}
