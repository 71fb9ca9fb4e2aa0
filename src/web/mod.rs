//! bazaar-web: chat, inbox and listing-event server.
//!
//! Serves the chat handshake page and WebSocket, the inbox and room history
//! REST endpoints, and forwards listing events to the analytics stream.

pub mod config;
pub mod handlers;
pub mod principal;
pub mod router;
pub mod state;
pub mod utils;

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use crate::events::{Broker, EventPublisher, HttpBroker, LogBroker};
use crate::storage::{ConversationLog, SqliteStore};

use config::{Cli, Config};
use state::{AppState, SharedState};

/// Build the shared state for `config`: open the store and start the event
/// publisher. Must be called inside a Tokio runtime.
pub fn build_state(config: &Config) -> Result<SharedState, Box<dyn std::error::Error>> {
    let store = SqliteStore::open(&config.db_path, config.store_timeout)?;
    let log = ConversationLog::new(Arc::new(store), config.store_timeout);

    let broker: Arc<dyn Broker> = match &config.broker_url {
        Some(url) => Arc::new(HttpBroker::new(url, config.broker_timeout)),
        None => Arc::new(LogBroker),
    };
    let publisher = EventPublisher::spawn(broker, config.event_queue);

    Ok(Arc::new(AppState::new(log, publisher, config.listing_topic.clone())))
}

/// Entry point: parse CLI, open storage, start server.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(cli);

    crate::logging::init();

    info!("bazaar-web starting");
    info!("  database: {}", config.db_path.display());
    match &config.broker_url {
        Some(url) => info!("  broker: {url} (topic {})", config.listing_topic),
        None => warn!("  broker: none configured (events will be logged only)"),
    }

    let state = build_state(&config)?;
    let publisher = state.publisher.clone();

    let app = router::build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("bazaar-web listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    publisher.shutdown().await;
    let stats = publisher.stats();
    info!(
        delivered = stats.delivered,
        failed = stats.failed,
        dropped = stats.dropped,
        "event publisher drained"
    );
    Ok(())
}
