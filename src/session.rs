//! Live room sessions.
//!
//! Tracks which connections are joined to which rooms and delivers events to
//! them. Each room has one critical section (`Room::state`) that covers
//! join + history replay and append + broadcast, so every member sees one
//! delivery order per room and a joiner never receives a message both in its
//! replay batch and live. Different rooms never contend with each other.
//!
//! Outboxes are bounded. Delivery never waits on a slow reader: a connection
//! whose outbox is full is disconnected from every room, and its socket task
//! sees the closed queue once it has drained what was already buffered.
//!
//! Room entries are an ephemeral cache: they appear on first join, are pruned
//! when the last member leaves, and say nothing about stored history.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::logging;
use crate::protocol::ServerEvent;
use crate::room::RoomKey;
use crate::storage::{ConversationLog, Message, StoreError};

pub type ConnectionId = u64;

/// Outbound queue of one connection; drained by its socket task.
pub type Outbox = mpsc::Sender<ServerEvent>;

pub const MAX_BODY_LEN: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),
    #[error("connection {0} is not keeping up and was disconnected")]
    OutboxFull(ConnectionId),
    #[error("not joined to room {0}")]
    NotJoined(RoomKey),
    #[error("message body is empty")]
    EmptyBody,
    #[error("message body exceeds {} bytes", MAX_BODY_LEN)]
    BodyTooLong,
    #[error("message not saved: {0}")]
    Store(#[from] StoreError),
}

struct RoomState {
    members: HashMap<ConnectionId, Outbox>,
    /// Set once the entry has been emptied and is being pruned; a joiner that
    /// finds a closed room retries against a fresh entry.
    closed: bool,
    /// Newest `created_at` seen for this room. New messages never stamp
    /// earlier than this, so stored order matches live order even if the
    /// wall clock steps back.
    last_created_at: u64,
}

struct Room {
    state: Mutex<RoomState>,
}

impl Room {
    fn new() -> Self {
        Self {
            state: Mutex::new(RoomState {
                members: HashMap::new(),
                closed: false,
                last_created_at: 0,
            }),
        }
    }
}

struct ConnectionEntry {
    outbox: Outbox,
    rooms: HashSet<RoomKey>,
}

/// Owner of all live room and connection state.
///
/// Lock order is room state, then `connections`; the `rooms` map lock is only
/// ever held briefly and never while waiting on a room.
pub struct RoomSessions {
    log: ConversationLog,
    rooms: RwLock<HashMap<RoomKey, Arc<Room>>>,
    connections: Mutex<HashMap<ConnectionId, ConnectionEntry>>,
    next_conn_id: AtomicU64,
}

/// Counts for the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SessionStats {
    pub live_rooms: usize,
    pub live_connections: usize,
}

struct Delivery {
    reached: usize,
    /// Members whose outbox was full or closed.
    stalled: Vec<ConnectionId>,
}

impl RoomSessions {
    pub fn new(log: ConversationLog) -> Self {
        Self {
            log,
            rooms: RwLock::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Register a new connection. It starts joined to no rooms.
    pub async fn connect(&self, outbox: Outbox) -> ConnectionId {
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        self.connections.lock().await.insert(
            id,
            ConnectionEntry {
                outbox,
                rooms: HashSet::new(),
            },
        );
        id
    }

    async fn lookup(&self, room: &RoomKey) -> Option<Arc<Room>> {
        self.rooms.read().await.get(room).cloned()
    }

    /// Join `conn` to `room` and replay the room's history to `conn` only.
    ///
    /// Joining twice keeps a single membership but replays again. Returns
    /// whether this call created the membership. A history read failure still
    /// leaves the connection joined; the joiner gets an empty batch plus a
    /// notice.
    pub async fn join(&self, conn: ConnectionId, room: &RoomKey) -> Result<bool, SessionError> {
        loop {
            let handle = {
                let mut rooms = self.rooms.write().await;
                Arc::clone(rooms.entry(room.clone()).or_insert_with(|| Arc::new(Room::new())))
            };
            let mut state = handle.state.lock().await;
            if state.closed {
                continue;
            }

            // Checked under the room lock so a concurrent disconnect_all either
            // sees this membership or makes the join fail.
            let outbox = self.connections.lock().await.get_mut(&conn).map(|entry| {
                entry.rooms.insert(room.clone());
                entry.outbox.clone()
            });
            let Some(outbox) = outbox else {
                self.prune_if_empty(room, &handle, &mut state).await;
                return Err(SessionError::UnknownConnection(conn));
            };
            let newly_joined = state.members.insert(conn, outbox.clone()).is_none();
            debug!(conn, room = %logging::room_key(room), newly_joined, "joined room");

            let replayed = match self.log.find_by_room(room).await {
                Ok(messages) => {
                    if let Some(last) = messages.last() {
                        state.last_created_at = state.last_created_at.max(last.created_at);
                    }
                    outbox.try_send(ServerEvent::history(messages)).is_ok()
                }
                Err(e) => {
                    warn!(conn, room = %logging::room_key(room), error = %e, "history replay failed");
                    outbox.try_send(ServerEvent::history(Vec::new())).is_ok()
                        && outbox
                            .try_send(ServerEvent::notice(format!("history unavailable: {e}")))
                            .is_ok()
                }
            };
            drop(state);

            if !replayed {
                self.evict(vec![conn]).await;
                return Err(SessionError::OutboxFull(conn));
            }
            return Ok(newly_joined);
        }
    }

    /// Remove `conn` from `room`. Returns whether it was a member.
    pub async fn leave(&self, conn: ConnectionId, room: &RoomKey) -> bool {
        if let Some(entry) = self.connections.lock().await.get_mut(&conn) {
            entry.rooms.remove(room);
        }
        self.remove_member(conn, room).await
    }

    async fn remove_member(&self, conn: ConnectionId, room: &RoomKey) -> bool {
        let Some(handle) = self.lookup(room).await else {
            return false;
        };
        let mut state = handle.state.lock().await;
        let was_member = state.members.remove(&conn).is_some();
        self.prune_if_empty(room, &handle, &mut state).await;
        was_member
    }

    async fn prune_if_empty(&self, room: &RoomKey, handle: &Arc<Room>, state: &mut RoomState) {
        if !state.members.is_empty() || state.closed {
            return;
        }
        state.closed = true;
        let mut rooms = self.rooms.write().await;
        if rooms.get(room).is_some_and(|current| Arc::ptr_eq(current, handle)) {
            rooms.remove(room);
            debug!(room = %logging::room_key(room), "pruned empty room");
        }
    }

    /// Drop every membership of `conn` and unregister it. Returns the number
    /// of rooms it was joined to.
    pub async fn disconnect_all(&self, conn: ConnectionId) -> usize {
        let rooms = match self.connections.lock().await.remove(&conn) {
            Some(entry) => entry.rooms,
            None => return 0,
        };
        for room in &rooms {
            self.remove_member(conn, room).await;
        }
        info!(conn, rooms = rooms.len(), "connection closed");
        rooms.len()
    }

    /// Push `event` to every member still registered as a connection. Members
    /// already unregistered by `disconnect_all` are skipped.
    async fn fan_out(&self, state: &RoomState, event: &ServerEvent) -> Delivery {
        let live = self.connections.lock().await;
        let mut delivery = Delivery {
            reached: 0,
            stalled: Vec::new(),
        };
        for (conn, outbox) in &state.members {
            if !live.contains_key(conn) {
                continue;
            }
            match outbox.try_send(event.clone()) {
                Ok(()) => delivery.reached += 1,
                Err(_) => delivery.stalled.push(*conn),
            }
        }
        delivery
    }

    async fn evict(&self, stalled: Vec<ConnectionId>) {
        for conn in stalled {
            warn!(conn, "outbox full, disconnecting");
            self.disconnect_all(conn).await;
        }
    }

    /// Deliver `event` to every connection joined to `room`, sender included.
    /// Returns the number of connections reached; an empty room is a no-op.
    pub async fn broadcast(&self, room: &RoomKey, event: ServerEvent) -> usize {
        let Some(handle) = self.lookup(room).await else {
            return 0;
        };
        let state = handle.state.lock().await;
        let delivery = self.fan_out(&state, &event).await;
        drop(state);
        self.evict(delivery.stalled).await;
        delivery.reached
    }

    /// Persist a message from `conn` and broadcast it to the room.
    ///
    /// The append completes before anything is broadcast; if it fails nothing
    /// is broadcast and the error is returned for the caller to report to the
    /// sender alone. No retry happens here. Once the append has started the
    /// send runs to completion even if `conn` disconnects meanwhile; the
    /// broadcast then skips it.
    pub async fn send(
        &self,
        conn: ConnectionId,
        room: &RoomKey,
        sender: &str,
        body: &str,
    ) -> Result<usize, SessionError> {
        if body.trim().is_empty() {
            return Err(SessionError::EmptyBody);
        }
        if body.len() > MAX_BODY_LEN {
            return Err(SessionError::BodyTooLong);
        }

        let handle = self
            .lookup(room)
            .await
            .ok_or_else(|| SessionError::NotJoined(room.clone()))?;
        let mut state = handle.state.lock().await;
        if state.closed || !state.members.contains_key(&conn) {
            return Err(SessionError::NotJoined(room.clone()));
        }

        let mut message = Message::new(room.clone(), sender, body);
        message.created_at = message.created_at.max(state.last_created_at);
        let created_at = message.created_at;
        if let Err(e) = self.log.append(message).await {
            warn!(conn, room = %logging::room_key(room), error = %e, "message append failed");
            return Err(e.into());
        }
        state.last_created_at = created_at;

        let delivery = self
            .fan_out(
                &state,
                &ServerEvent::ReceiveMessage {
                    sender: sender.to_string(),
                    message: body.to_string(),
                },
            )
            .await;
        drop(state);
        debug!(conn, room = %logging::room_key(room), reached = delivery.reached, "message delivered");
        self.evict(delivery.stalled).await;
        Ok(delivery.reached)
    }

    /// Rooms `conn` is currently joined to.
    pub async fn rooms_of(&self, conn: ConnectionId) -> HashSet<RoomKey> {
        self.connections
            .lock()
            .await
            .get(&conn)
            .map(|entry| entry.rooms.clone())
            .unwrap_or_default()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn stats(&self) -> SessionStats {
        SessionStats {
            live_rooms: self.rooms.read().await.len(),
            live_connections: self.connection_count().await,
        }
    }
}
