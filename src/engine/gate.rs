//! Deferred execution gate
//!
//! A reference-counted readiness barrier. While bootstrap discovery is in
//! flight the gate is closed; session operations offered to it are queued and
//! replayed in FIFO order once the last outstanding task releases.

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::debug;

/// A queued replay of a deferred operation
pub type DeferredTask = BoxFuture<'static, ()>;

#[derive(Default)]
struct GateInner {
    deferred: bool,
    pending: u32,
    queue: Vec<DeferredTask>,
}

/// The engine-wide deferred gate
///
/// Invariant: `deferred` is true iff `pending > 0`.
#[derive(Default)]
pub struct DeferGate {
    inner: Mutex<GateInner>,
}

impl DeferGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the gate is currently closed
    pub async fn is_deferred(&self) -> bool {
        self.inner.lock().await.deferred
    }

    /// Offer a task to the gate. Queued and `true` when gated; `false` when
    /// open, in which case the caller proceeds immediately.
    pub async fn defer(&self, task: DeferredTask) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.deferred {
            inner.queue.push(task);
            debug!("registered a task to be executed once ready");
            return true;
        }
        false
    }

    /// Mark one more bootstrap task outstanding, closing the gate
    pub async fn acquire(&self) {
        let mut inner = self.inner.lock().await;
        inner.pending += 1;
        inner.deferred = true;
    }

    /// Mark one bootstrap task finished. The last release reopens the gate
    /// and drains the queue in FIFO order, running each task exactly once
    /// before returning.
    pub async fn release(&self) {
        let drained = {
            let mut inner = self.inner.lock().await;
            inner.pending = inner.pending.saturating_sub(1);
            if inner.pending == 0 {
                inner.deferred = false;
                Some(std::mem::take(&mut inner.queue))
            } else {
                None
            }
        };

        if let Some(tasks) = drained {
            if tasks.is_empty() {
                return;
            }
            debug!("executing {} deferred tasks", tasks.len());
            for task in tasks {
                task.await;
            }
            debug!("done executing deferred tasks");
        }
    }
}
