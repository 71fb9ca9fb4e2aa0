//! Inbox projection: the conversations a user takes part in, derived from the
//! distinct room keys in the conversation store.

use serde::Serialize;
use tracing::debug;

use crate::room::{decode, RoomKey, DELIMITER};
use crate::storage::{ConversationLog, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboxEntry {
    pub room: RoomKey,
    pub other_participant: String,
    pub listing_id: String,
}

/// Keep the candidate keys that name `user` as an exact participant.
///
/// Candidates usually come from a substring pre-filter, so false positives
/// (`"al"` inside `"alice"`) and malformed keys are expected and skipped.
/// Output follows input order.
pub fn project<I, S>(user: &str, candidates: I) -> Vec<InboxEntry>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut entries = Vec::new();
    for candidate in candidates {
        let raw = candidate.as_ref();
        let room = match decode(raw) {
            Ok(room) => room,
            Err(e) => {
                debug!(key = raw, error = %e, "skipping undecodable room key");
                continue;
            }
        };
        let Ok(other) = room.other_participant(user) else {
            continue;
        };
        entries.push(InboxEntry {
            other_participant: other.to_string(),
            listing_id: room.listing_id().to_string(),
            room,
        });
    }
    entries
}

/// Build `user`'s inbox from the store.
pub async fn project_inbox(log: &ConversationLog, user: &str) -> Result<Vec<InboxEntry>, StoreError> {
    // Such a user can never appear in an encoded key.
    if user.is_empty() || user.contains(DELIMITER) {
        return Ok(Vec::new());
    }
    let candidates = log.distinct_rooms(user).await?;
    Ok(project(user, candidates))
}
