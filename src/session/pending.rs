//! Pending outbound-request correlation
//!
//! Maps (stanza kind, iq type, stanza id) to the typed one-shot handler that
//! resumes the call which issued the request. Every entry is paired with a
//! timeout task; whichever side fires first removes the entry, which makes
//! reply and timeout mutually exclusive.

use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::stanza::{IqType, StanzaKind};

/// Correlation key for a reply stanza
pub type PendingKey = (StanzaKind, IqType, String);

/// Which action's reply an entry is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    Initiate,
    Accept,
    Info,
    Terminate,
    TransportInfo,
}

impl PendingKind {
    pub fn name(&self) -> &'static str {
        match self {
            PendingKind::Initiate => "session-initiate",
            PendingKind::Accept => "session-accept",
            PendingKind::Info => "session-info",
            PendingKind::Terminate => "session-terminate",
            PendingKind::TransportInfo => "transport-info",
        }
    }
}

struct PendingReply {
    kind: PendingKind,
    timeout: JoinHandle<()>,
}

/// The per-session pending-request table
#[derive(Default)]
pub struct PendingReplies {
    inner: Mutex<HashMap<PendingKey, PendingReply>>,
}

impl PendingReplies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a one-shot reply handler together with its armed timeout.
    /// A previous entry under the same key is replaced and its timeout
    /// cancelled.
    pub async fn register(&self, key: PendingKey, kind: PendingKind, timeout: JoinHandle<()>) {
        let mut inner = self.inner.lock().await;
        if let Some(previous) = inner.insert(key.clone(), PendingReply { kind, timeout }) {
            previous.timeout.abort();
        }
        debug!("registered reply handler ({}, id: {})", kind.name(), key.2);
    }

    /// Consume the entry for an arrived reply, cancelling its timeout
    pub async fn take(&self, key: &PendingKey) -> Option<PendingKind> {
        let mut inner = self.inner.lock().await;
        inner.remove(key).map(|entry| {
            entry.timeout.abort();
            entry.kind
        })
    }

    /// Consume the entry from within its own timeout task. Does not abort
    /// the handle, the caller is the task itself.
    pub async fn take_expired(&self, key: &PendingKey) -> Option<PendingKind> {
        let mut inner = self.inner.lock().await;
        inner.remove(key).map(|entry| entry.kind)
    }

    /// Drop every entry and cancel all timeouts
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        for (_, entry) in inner.drain() {
            entry.timeout.abort();
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
