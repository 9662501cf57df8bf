//! Session registry
//!
//! Owns the mapping from session identity to session instance, one sub-table
//! per session flavor. Routing must work before a session exists and after it
//! is torn down, so identity resolution lives here rather than on sessions.

use async_trait::async_trait;
use metrics::gauge;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::session::Session;
use crate::stanza::Stanza;

/// Which session type a stanza or session belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFlavor {
    Single,
    Room,
}

impl SessionFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionFlavor::Single => "single",
            SessionFlavor::Room => "room",
        }
    }
}

/// Routing surface of a multi-party (room) session
///
/// The full room flavor lives outside the engine; the router only needs to
/// resolve participants and forward room-scoped stanzas.
#[async_trait]
pub trait RoomRoute: Send + Sync {
    /// sid of the one-to-one sub-session negotiated with this participant
    async fn participant_sid(&self, username: &str) -> Option<String>;

    /// Create the participant sub-session for an inbound session-initiate
    async fn create_participant(&self, username: &str, stanza: Stanza);

    async fn handle_message(&self, stanza: Stanza);

    async fn handle_presence(&self, stanza: Stanza);
}

/// The process-wide session tables
#[derive(Default)]
pub struct SessionRegistry {
    singles: RwLock<HashMap<String, Arc<Session>>>,
    rooms: RwLock<HashMap<String, Arc<dyn RoomRoute>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a one-to-one session; last write wins
    pub async fn register_single(&self, sid: impl Into<String>, session: Arc<Session>) {
        let sid = sid.into();
        let mut singles = self.singles.write().await;
        singles.insert(sid.clone(), session);
        gauge!("yodel_sessions_active", "flavor" => "single").set(singles.len() as f64);
        debug!("registered single session (sid: {})", sid);
    }

    pub async fn lookup_single(&self, sid: &str) -> Option<Arc<Session>> {
        self.singles.read().await.get(sid).cloned()
    }

    /// Remove a one-to-one session; no-op when absent
    pub async fn unregister_single(&self, sid: &str) {
        let mut singles = self.singles.write().await;
        if singles.remove(sid).is_some() {
            debug!("unregistered single session (sid: {})", sid);
        }
        gauge!("yodel_sessions_active", "flavor" => "single").set(singles.len() as f64);
    }

    /// Insert a room route keyed by the room's bare JID; last write wins
    pub async fn register_room(&self, room: impl Into<String>, route: Arc<dyn RoomRoute>) {
        let room = room.into();
        let mut rooms = self.rooms.write().await;
        rooms.insert(room.clone(), route);
        gauge!("yodel_sessions_active", "flavor" => "room").set(rooms.len() as f64);
        debug!("registered room session (room: {})", room);
    }

    pub async fn lookup_room(&self, room: &str) -> Option<Arc<dyn RoomRoute>> {
        self.rooms.read().await.get(room).cloned()
    }

    pub async fn unregister_room(&self, room: &str) {
        let mut rooms = self.rooms.write().await;
        if rooms.remove(room).is_some() {
            debug!("unregistered room session (room: {})", room);
        }
        gauge!("yodel_sessions_active", "flavor" => "room").set(rooms.len() as f64);
    }

    pub async fn single_count(&self) -> usize {
        self.singles.read().await.len()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
