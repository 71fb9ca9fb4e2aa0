//! Log setup and id formatting.
//!
//! Log lines go through `tracing`; [`init`] installs a fmt subscriber on
//! stderr filtered by `RUST_LOG` (default `bazaar=info`). When stderr is a
//! terminal, user ids and room keys get a stable colour derived from their
//! content so the same conversation is easy to follow across lines:
//!
//! ```text
//! 2026-10-19T09:12:44Z  INFO bazaar::web::handlers::websocket: joined room conn=3 room=L17_alice_bob
//! ```

use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::EnvFilter;

use crate::room::RoomKey;

static COLOUR_ENABLED: AtomicBool = AtomicBool::new(false);

const DEFAULT_FILTER: &str = "bazaar=info";

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init() {
    let is_terminal = std::io::stderr().is_terminal();
    COLOUR_ENABLED.store(is_terminal, Ordering::Relaxed);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(is_terminal)
        .try_init();
}

pub fn colour_enabled() -> bool {
    COLOUR_ENABLED.load(Ordering::Relaxed)
}

const RESET: &str = "\x1b[0m";

/// Colour palette for id hashing: bright, visually distinct colours.
const ID_COLOURS: &[&str] = &[
    "\x1b[91m", // bright red
    "\x1b[92m", // bright green
    "\x1b[93m", // bright yellow
    "\x1b[94m", // bright blue
    "\x1b[95m", // bright magenta
    "\x1b[96m", // bright cyan
    "\x1b[31m", // red
    "\x1b[32m", // green
    "\x1b[33m", // yellow
    "\x1b[34m", // blue
    "\x1b[35m", // magenta
    "\x1b[36m", // cyan
];

fn hash_colour(id: &str) -> &'static str {
    let hash: u32 = id
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    ID_COLOURS[(hash as usize) % ID_COLOURS.len()]
}

const USER_ID_TRUNCATE_LEN: usize = 16;

fn truncate_id(id: &str, max_chars: usize) -> &str {
    let end = id
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(id.len());
    &id[..end]
}

fn paint(id: &str, text: &str) -> String {
    if colour_enabled() {
        format!("{}{text}{RESET}", hash_colour(id))
    } else {
        text.to_string()
    }
}

/// Format a username for log output: truncated, coloured by content.
pub fn user_id(id: &str) -> String {
    paint(id, truncate_id(id, USER_ID_TRUNCATE_LEN))
}

/// Format a room key for log output. The whole key is kept; the colour is
/// derived from it so both participants' lines for a room match.
pub fn room_key(room: &RoomKey) -> String {
    let key = room.to_string();
    paint(&key, &key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colour_choice_is_stable() {
        assert_eq!(hash_colour("L1_alice_bob"), hash_colour("L1_alice_bob"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_id("alice", 16), "alice");
        assert_eq!(truncate_id("ééééé", 2), "éé");
    }

    #[test]
    fn plain_output_without_terminal() {
        COLOUR_ENABLED.store(false, Ordering::Relaxed);
        let room = crate::room::encode("L1", "alice", "bob").unwrap();
        assert_eq!(room_key(&room), "L1_alice_bob");
        assert_eq!(user_id("a-very-long-username-indeed"), "a-very-long-user");
    }
}
