//! Stop coordinator: batch-wide abort flag and live session registry.
//!
//! One coordinator instance is shared by every batch running in the
//! process. It tracks live sessions per workspace, counts batches that
//! are still walking their cursor, and carries the abort flag that halts
//! further task starts everywhere once a stop is requested.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::session::LiveSession;
use crate::models::task::WorkspaceId;

/// Process-wide registry of live sessions plus the global abort state.
#[derive(Default)]
pub struct StopCoordinator {
    sessions: Mutex<HashMap<WorkspaceId, Vec<Arc<LiveSession>>>>,
    aborted: AtomicBool,
    in_flight: AtomicUsize,
}

impl StopCoordinator {
    /// Create a coordinator with no tracked sessions and a clear flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a batch as starting.
    ///
    /// Resets the abort flag: a new batch always begins in a non-aborted
    /// state, even right after a previous batch was stopped.
    pub fn begin_batch(&self) {
        self.aborted.store(false, Ordering::SeqCst);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    /// Mark a batch as done walking its cursor.
    ///
    /// Pairs 1:1 with [`begin_batch`](Self::begin_batch); the counter is
    /// clamped at zero so an unbalanced call cannot wrap.
    pub fn end_batch(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Number of batches currently walking their cursor.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Whether new task starts may proceed.
    #[must_use]
    pub fn can_start(&self) -> bool {
        !self.aborted.load(Ordering::SeqCst)
    }

    /// Whether a stop has been triggered and not yet cleared by a new
    /// batch. Distinguishes "externally stopped" from "naturally
    /// finished" for slot pin decisions.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Track a session for its workspace.
    ///
    /// The abort flag is re-checked under the registry lock: a session
    /// that attaches after a stop sweep has already drained the registry
    /// is force-stopped here instead of being registered, so no session
    /// survives a stop untracked.
    pub async fn register_session(&self, session: Arc<LiveSession>) {
        let mut registry = self.sessions.lock().await;
        if self.aborted.load(Ordering::SeqCst) {
            drop(registry);
            warn!(
                session_id = %session.id(),
                task = %session.task_name(),
                "session attached after stop; force-stopping"
            );
            session.force_stop();
            return;
        }
        registry
            .entry(session.workspace().clone())
            .or_default()
            .push(session);
    }

    /// Stop tracking a session. Idempotent; unknown sessions are ignored.
    pub async fn deregister_session(&self, session: &LiveSession) {
        let mut registry = self.sessions.lock().await;
        if let Some(tracked) = registry.get_mut(session.workspace()) {
            tracked.retain(|other| other.id() != session.id());
        }
    }

    /// Stop every tracked session of `workspace` and halt further starts.
    ///
    /// The abort flag stays set even when there is nothing to stop; only
    /// the next [`begin_batch`](Self::begin_batch) clears it.
    pub async fn stop_all(&self, workspace: &WorkspaceId) {
        self.aborted.store(true, Ordering::SeqCst);
        info!(%workspace, "stop requested");

        let drained = {
            let mut registry = self.sessions.lock().await;
            registry.get_mut(workspace).map(std::mem::take).unwrap_or_default()
        };
        if drained.is_empty() {
            debug!(%workspace, "nothing to stop");
            return;
        }

        for session in &drained {
            session.force_stop();
        }
        info!(%workspace, stopped = drained.len(), "stopped tracked sessions");
    }

    /// Whether a stop control should be enabled for `workspace`: a batch
    /// is in flight, or some tracked session has not yet terminated.
    pub async fn stop_enabled(&self, workspace: &WorkspaceId) -> bool {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            return true;
        }
        let registry = self.sessions.lock().await;
        registry
            .get(workspace)
            .is_some_and(|tracked| tracked.iter().any(|session| !session.is_terminated()))
    }

    /// Number of sessions currently tracked for `workspace`.
    pub async fn tracked_count(&self, workspace: &WorkspaceId) -> usize {
        let registry = self.sessions.lock().await;
        registry.get(workspace).map_or(0, Vec::len)
    }
}
