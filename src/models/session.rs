//! Live session model: one tracked, running instance of a launched task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::display::DisplaySlot;
use crate::models::task::WorkspaceId;
use crate::Result;

/// Events a launcher reports for one accepted launch request.
///
/// Delivered over the launch ticket's `mpsc` channel; the sequencing
/// engine attaches exactly one consumer per launch. A channel that closes
/// without ever delivering [`SessionEvent::Attached`] means the launch
/// produced nothing (spawn failure), which the engine treats the same as
/// a task that never started.
pub enum SessionEvent {
    /// The session exists. Its display slot may be absent when the run is
    /// not observable (e.g. it completed instantaneously).
    Attached(Arc<LiveSession>),
    /// Termination is imminent. Informational only.
    WillTerminate,
    /// The session terminated.
    Terminated {
        /// Process exit code, when one exists.
        exit_code: Option<i32>,
        /// `true` when the session ended on its own rather than through a
        /// force-stop.
        normally: bool,
    },
}

/// Low-level stop surface of a session, in force-stop priority order.
///
/// All operations are best-effort: the stop coordinator logs failures and
/// never propagates them (a stop sweep must not die half-way through).
pub trait SessionControl: Send + Sync {
    /// Whether the session supports an outright kill.
    fn supports_kill(&self) -> bool {
        false
    }

    /// Whether the session is already in a terminating state.
    fn is_terminating(&self) -> bool {
        false
    }

    /// Kill the session outright, skipping any graceful shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Stop`](crate::AppError::Stop) if the kill
    /// signal cannot be delivered.
    fn kill(&self) -> Result<()> {
        Ok(())
    }

    /// Whether disposal should leave the process running untracked.
    fn detach_is_default(&self) -> bool {
        false
    }

    /// Stop tracking the session without terminating it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Stop`](crate::AppError::Stop) if detaching fails.
    fn detach(&self) -> Result<()> {
        Ok(())
    }

    /// Terminate the session, gracefully where the implementation can.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Stop`](crate::AppError::Stop) if the stop
    /// request cannot be issued.
    fn destroy(&self) -> Result<()>;
}

/// One started task instance, shared between the sequencing engine (for
/// pacing decisions) and the stop coordinator (for cancellation).
///
/// The launcher that created the session owns the `terminated` flag: it
/// flips the flag before emitting [`SessionEvent::Terminated`], so pacing
/// waits that poll [`LiveSession::is_terminated`] never observe the event
/// before the flag.
pub struct LiveSession {
    id: String,
    task_name: String,
    workspace: WorkspaceId,
    started_at: DateTime<Utc>,
    terminated: AtomicBool,
    exit_code: Mutex<Option<i32>>,
    slot: Option<Arc<dyn DisplaySlot>>,
    control: Box<dyn SessionControl>,
}

impl LiveSession {
    /// Construct a session for a just-launched task.
    #[must_use]
    pub fn new(
        task_name: impl Into<String>,
        workspace: WorkspaceId,
        slot: Option<Arc<dyn DisplaySlot>>,
        control: Box<dyn SessionControl>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_name: task_name.into(),
            workspace,
            started_at: Utc::now(),
            terminated: AtomicBool::new(false),
            exit_code: Mutex::new(None),
            slot,
            control,
        }
    }

    /// Unique session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the task this session runs.
    #[must_use]
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Workspace the session is registered under.
    #[must_use]
    pub fn workspace(&self) -> &WorkspaceId {
        &self.workspace
    }

    /// When the session was created.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whether the session has terminated (naturally or force-stopped).
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Record termination. Called by the owning launcher before it emits
    /// [`SessionEvent::Terminated`].
    pub fn mark_terminated(&self, exit_code: Option<i32>) {
        match self.exit_code.lock() {
            Ok(mut slot) => *slot = exit_code,
            Err(poisoned) => *poisoned.into_inner() = exit_code,
        }
        self.terminated.store(true, Ordering::SeqCst);
    }

    /// Exit code recorded at termination, if any.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self.exit_code.lock() {
            Ok(code) => *code,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// The session's display slot, when one was attached.
    #[must_use]
    pub fn slot(&self) -> Option<&Arc<dyn DisplaySlot>> {
        self.slot.as_ref()
    }

    /// Force-stop the session, best-effort.
    ///
    /// Priority order: kill when the session is killable and already
    /// terminating, detach when that is the session's default disposal,
    /// otherwise destroy. Failures are logged and swallowed.
    pub fn force_stop(&self) {
        let control = self.control.as_ref();
        if control.supports_kill() && control.is_terminating() {
            if let Err(err) = control.kill() {
                warn!(session_id = %self.id, %err, "kill failed");
            }
            return;
        }
        if control.detach_is_default() {
            if let Err(err) = control.detach() {
                warn!(session_id = %self.id, %err, "detach failed");
            }
        } else if let Err(err) = control.destroy() {
            warn!(session_id = %self.id, %err, "destroy failed");
        }
    }
}
