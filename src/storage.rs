//! Conversation store: the ordered, append-only message log keyed by room.
//!
//! [`ConversationStore`] is the synchronous storage seam; [`SqliteStore`] is
//! the SQLite implementation used by the server and the tests. Async code
//! goes through [`ConversationLog`], which runs every store call on the
//! blocking pool. Reads are abandoned after a timeout; writes always run to
//! an outcome, with the store itself bounding how long it waits on locks.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::room::RoomKey;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("conversation store unavailable: {0}")]
    Unavailable(String),
    /// Only reads time out; see [`ConversationLog`].
    #[error("conversation store timed out after {after_ms}ms during {op}")]
    Timeout { op: &'static str, after_ms: u64 },
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A chat message as persisted. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub room: RoomKey,
    pub sender: String,
    pub body: String,
    /// Milliseconds since the UNIX epoch.
    pub created_at: u64,
}

impl Message {
    /// Stamp a new message with the current time.
    pub fn new(room: RoomKey, sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            room,
            sender: sender.into(),
            body: body.into(),
            created_at: now_millis(),
        }
    }
}

/// Current time as milliseconds since UNIX epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// Store seam
// ---------------------------------------------------------------------------

pub trait ConversationStore: Send + Sync + 'static {
    /// Append one message. Must be durable before returning `Ok`.
    fn append(&self, message: &Message) -> Result<(), StoreError>;

    /// All messages of `room`, oldest first; ties keep append order.
    fn find_by_room(&self, room: &RoomKey) -> Result<Vec<Message>, StoreError>;

    /// Distinct raw room keys containing `fragment` anywhere in the key.
    ///
    /// This is a coarse pre-filter: callers must decode each key and compare
    /// participants exactly. Keys are returned sorted so the result is stable
    /// for a given store snapshot.
    fn distinct_rooms(&self, fragment: &str) -> Result<Vec<String>, StoreError>;
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

/// SQLite-backed conversation store.
///
/// `rusqlite::Connection` is not `Sync`, so the handle sits behind a mutex;
/// calls already run on the blocking pool via [`ConversationLog`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path. Creates schema if needed.
    ///
    /// `busy_timeout` bounds how long a statement waits on a locked database
    /// before failing with `SQLITE_BUSY`.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<(), StoreError> {
        self.conn()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                room        TEXT NOT NULL,
                sender      TEXT NOT NULL,
                body        TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_room
                ON messages(room, created_at, id);
            ",
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }
}

impl ConversationStore for SqliteStore {
    fn append(&self, message: &Message) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO messages (room, sender, body, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                message.room.to_string(),
                message.sender,
                message.body,
                message.created_at as i64,
            ],
        )?;
        Ok(())
    }

    fn find_by_room(&self, room: &RoomKey) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT sender, body, created_at FROM messages
             WHERE room = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![room.to_string()], |row| {
            Ok(Message {
                room: room.clone(),
                sender: row.get(0)?,
                body: row.get(1)?,
                created_at: row.get::<_, i64>(2)? as u64,
            })
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn distinct_rooms(&self, fragment: &str) -> Result<Vec<String>, StoreError> {
        // instr() rather than LIKE: '_' is both our delimiter and a LIKE wildcard.
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT room FROM messages
             WHERE instr(room, ?1) > 0
             ORDER BY room ASC",
        )?;
        let rows = stmt.query_map(params![fragment], |row| row.get::<_, String>(0))?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Async façade
// ---------------------------------------------------------------------------

/// Cloneable async handle over a [`ConversationStore`].
#[derive(Clone)]
pub struct ConversationLog {
    store: Arc<dyn ConversationStore>,
    timeout: Duration,
}

impl ConversationLog {
    pub fn new(store: Arc<dyn ConversationStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Append a message and wait for the store's verdict.
    ///
    /// Never abandoned on a timer: an `Err` always means nothing was stored,
    /// and `Ok` means the message is durable.
    pub async fn append(&self, message: Message) -> Result<(), StoreError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.append(&message))
            .await
            .map_err(|join_error| StoreError::Unavailable(format!("append task failed: {join_error}")))?
    }

    pub async fn find_by_room(&self, room: &RoomKey) -> Result<Vec<Message>, StoreError> {
        let room = room.clone();
        self.read("find_by_room", move |store| store.find_by_room(&room))
            .await
    }

    pub async fn distinct_rooms(&self, fragment: &str) -> Result<Vec<String>, StoreError> {
        let fragment = fragment.to_string();
        self.read("distinct_rooms", move |store| store.distinct_rooms(&fragment))
            .await
    }

    /// Run a read on the blocking pool. A read that outlives the timeout keeps
    /// running in the background; only the caller stops waiting.
    async fn read<T, F>(&self, op: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ConversationStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || f(store.as_ref()));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(StoreError::Unavailable(format!(
                "{op} task failed: {join_error}"
            ))),
            Err(_) => Err(StoreError::Timeout {
                op,
                after_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}
