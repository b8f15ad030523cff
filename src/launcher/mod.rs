//! Launch and validation collaborator contracts.
//!
//! The [`Launcher`] and [`Validator`] traits decouple the sequencing
//! engine from how a task descriptor becomes a running process and from
//! how (or whether) a user is prompted to fix a broken task. The engine
//! only ever drives these traits; the production implementations live in
//! [`process`] and [`validate`].

pub mod process;
pub mod validate;

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::models::session::SessionEvent;
use crate::models::task::{TaskDescriptor, WorkspaceId};
use crate::Result;

/// Outcome of validating one task before launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Task is runnable as-is.
    Ok,
    /// Task is runnable after amendment; launch the amended descriptor.
    Amended(TaskDescriptor),
    /// Task is invalid and the caller declined to fix it; skip it.
    Declined,
}

/// Accepted launch request.
///
/// The launcher reports the session's life asynchronously on `events`:
/// at most one [`SessionEvent::Attached`], then termination. A ticket
/// whose channel closes without an attachment means the launch produced
/// nothing.
pub struct LaunchTicket {
    /// Session event stream; consumed by exactly one watcher.
    pub events: mpsc::Receiver<SessionEvent>,
}

/// Resolves a task descriptor into a running session.
pub trait Launcher: Send + Sync {
    /// Request an asynchronous launch of `task` under `workspace`.
    ///
    /// Returns `Ok(None)` when no runner exists for this task. The
    /// request itself is synchronous acceptance only; session attachment
    /// and termination arrive later on the ticket's channel.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Launch`](crate::AppError::Launch) when the
    /// launch request itself fails; the engine treats this the same as a
    /// missing runner and continues the chain.
    fn request_launch(
        &self,
        task: &TaskDescriptor,
        workspace: &WorkspaceId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<LaunchTicket>>> + Send + '_>>;
}

/// Validates (and possibly amends) a task before launch.
///
/// Implementations may interactively prompt; [`Validation::Declined`]
/// means the user gave up on fixing an invalid task.
pub trait Validator: Send + Sync {
    /// Validate `task`, possibly returning an amended descriptor.
    fn validate(
        &self,
        task: &TaskDescriptor,
    ) -> Pin<Box<dyn Future<Output = Validation> + Send + '_>>;
}
