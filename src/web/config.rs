//! Configuration types and constants for the bazaar web server.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::events::LISTING_CREATED_TOPIC;

pub(crate) const DEFAULT_BIND: &str = "127.0.0.1:5000";
pub(crate) const DEFAULT_DB: &str = "bazaar.db";
pub(crate) const DEFAULT_EVENT_QUEUE: usize = 1024;
pub(crate) const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;
pub(crate) const DEFAULT_BROKER_TIMEOUT_MS: u64 = 3_000;

/// Events buffered per WebSocket connection before it counts as stalled.
pub const OUTBOX_CAPACITY: usize = 256;
/// Maximum concurrent WebSocket connections.
pub const MAX_WS_CONNECTIONS: usize = 1024;

/// Header carrying the authenticated username, set by the auth layer in front
/// of this service.
pub const SESSION_USER_HEADER: &str = "x-session-user";
/// Header carrying the authenticated user's role.
pub const SESSION_ROLE_HEADER: &str = "x-session-role";

/// Campus marketplace chat and event server.
///
/// Serves per-listing buyer/seller chat rooms over WebSocket, conversation
/// inboxes, and publishes listing events to the analytics stream.
///
/// Configuration can be set via CLI arguments or environment variables.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug, Default)]
#[command(name = "bazaar-web", version, about)]
pub struct Cli {
    /// HTTP server bind address [env: BAZAAR_BIND] [default: 127.0.0.1:5000]
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// SQLite database holding chat history [env: BAZAAR_DB] [default: bazaar.db]
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Kafka REST proxy base URL; events are only logged when unset [env: BAZAAR_BROKER_URL]
    #[arg(long)]
    pub broker_url: Option<String>,

    /// Topic for listing-created events [env: BAZAAR_LISTING_TOPIC] [default: new_listings]
    #[arg(long)]
    pub listing_topic: Option<String>,

    /// Capacity of the outgoing event queue [env: BAZAAR_EVENT_QUEUE] [default: 1024]
    #[arg(long)]
    pub event_queue: Option<usize>,

    /// Timeout for chat store reads and database lock waits in ms [env: BAZAAR_STORE_TIMEOUT_MS] [default: 5000]
    #[arg(long)]
    pub store_timeout_ms: Option<u64>,

    /// Timeout for a single broker request in ms [env: BAZAAR_BROKER_TIMEOUT_MS] [default: 3000]
    #[arg(long)]
    pub broker_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub broker_url: Option<String>,
    pub listing_topic: String,
    pub event_queue: usize,
    pub store_timeout: Duration,
    pub broker_timeout: Duration,
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> Self {
        let bind_addr = cli
            .bind
            .or_else(|| std::env::var("BAZAAR_BIND").ok())
            .unwrap_or_else(|| DEFAULT_BIND.to_string());

        let db_path = cli
            .db
            .or_else(|| std::env::var("BAZAAR_DB").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB));

        let broker_url = cli
            .broker_url
            .or_else(|| std::env::var("BAZAAR_BROKER_URL").ok())
            .filter(|url| !url.trim().is_empty());

        let listing_topic = cli
            .listing_topic
            .or_else(|| std::env::var("BAZAAR_LISTING_TOPIC").ok())
            .unwrap_or_else(|| LISTING_CREATED_TOPIC.to_string());

        let event_queue = cli
            .event_queue
            .or_else(|| env_parsed("BAZAAR_EVENT_QUEUE"))
            .unwrap_or(DEFAULT_EVENT_QUEUE);

        let store_timeout_ms = cli
            .store_timeout_ms
            .or_else(|| env_parsed("BAZAAR_STORE_TIMEOUT_MS"))
            .unwrap_or(DEFAULT_STORE_TIMEOUT_MS);

        let broker_timeout_ms = cli
            .broker_timeout_ms
            .or_else(|| env_parsed("BAZAAR_BROKER_TIMEOUT_MS"))
            .unwrap_or(DEFAULT_BROKER_TIMEOUT_MS);

        Self {
            bind_addr,
            db_path,
            broker_url,
            listing_topic,
            event_queue,
            store_timeout: Duration::from_millis(store_timeout_ms),
            broker_timeout: Duration::from_millis(broker_timeout_ms),
        }
    }
}
