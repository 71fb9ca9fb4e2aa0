//! Room identity codec.
//!
//! A conversation about a listing between two people is named by a single
//! string key, `listingId_participantA_participantB`. Everything the chat
//! layer knows about membership is derived from that key, so the codec is
//! strict: identifiers may not contain the delimiter and a key must split into
//! exactly three non-empty segments.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Separator between the three segments of a room key.
pub const DELIMITER: char = '_';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomKeyError {
    #[error("invalid identifier {0:?}: must be non-empty and must not contain '_'")]
    InvalidIdentifier(String),
    #[error("malformed room key {0:?}: expected listing_userA_userB")]
    MalformedRoomKey(String),
    #[error("{viewer:?} is not a participant of room {room}")]
    NotAParticipant { room: String, viewer: String },
}

/// Structured room identifier. Participant order is as encoded; it carries no
/// meaning beyond that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomKey {
    listing_id: String,
    participant_a: String,
    participant_b: String,
}

fn check_identifier(value: &str) -> Result<(), RoomKeyError> {
    if value.is_empty() || value.contains(DELIMITER) {
        return Err(RoomKeyError::InvalidIdentifier(value.to_string()));
    }
    Ok(())
}

/// Build a room key from its three identifiers.
pub fn encode(listing_id: &str, user_a: &str, user_b: &str) -> Result<RoomKey, RoomKeyError> {
    check_identifier(listing_id)?;
    check_identifier(user_a)?;
    check_identifier(user_b)?;
    Ok(RoomKey {
        listing_id: listing_id.to_string(),
        participant_a: user_a.to_string(),
        participant_b: user_b.to_string(),
    })
}

/// Parse a serialized key. Exact inverse of [`encode`] followed by `to_string`.
pub fn decode(key: &str) -> Result<RoomKey, RoomKeyError> {
    let segments: Vec<&str> = key.split(DELIMITER).collect();
    match segments.as_slice() {
        [listing, a, b] if !listing.is_empty() && !a.is_empty() && !b.is_empty() => {
            Ok(RoomKey {
                listing_id: listing.to_string(),
                participant_a: a.to_string(),
                participant_b: b.to_string(),
            })
        }
        _ => Err(RoomKeyError::MalformedRoomKey(key.to_string())),
    }
}

/// Return the participant of `key` that is not `viewer`.
///
/// This is the authorization predicate for the chat handshake: a viewer who
/// is neither participant gets [`RoomKeyError::NotAParticipant`].
pub fn other_participant(key: &str, viewer: &str) -> Result<String, RoomKeyError> {
    let room = decode(key)?;
    room.other_participant(viewer).map(str::to_string)
}

impl RoomKey {
    pub fn listing_id(&self) -> &str {
        &self.listing_id
    }

    pub fn participants(&self) -> (&str, &str) {
        (&self.participant_a, &self.participant_b)
    }

    /// Exact field comparison, never substring matching.
    pub fn has_participant(&self, user: &str) -> bool {
        self.participant_a == user || self.participant_b == user
    }

    pub fn other_participant(&self, viewer: &str) -> Result<&str, RoomKeyError> {
        if self.participant_a == viewer {
            Ok(&self.participant_b)
        } else if self.participant_b == viewer {
            Ok(&self.participant_a)
        } else {
            Err(RoomKeyError::NotAParticipant {
                room: self.to_string(),
                viewer: viewer.to_string(),
            })
        }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{DELIMITER}{}{DELIMITER}{}",
            self.listing_id, self.participant_a, self.participant_b
        )
    }
}

impl FromStr for RoomKey {
    type Err = RoomKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

// Wire form is the plain string key.
impl Serialize for RoomKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RoomKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        decode(&raw).map_err(serde::de::Error::custom)
    }
}
