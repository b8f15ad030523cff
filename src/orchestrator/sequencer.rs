//! Batch sequencing engine.
//!
//! Walks an ordered task list, launching each task through the injected
//! collaborators and deciding when the next task may start: immediately
//! (parallel), after attachment, after a fixed delay, or after the
//! previous session terminates. The walk is a single driver task per
//! batch, so cursor advancement has exactly one writer. Every way a step
//! can complete is named by the private `Advance` enum, which keeps the
//! one-trigger-per-index invariant visible in the control flow.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::launcher::{Launcher, Validation, Validator};
use crate::models::policy::{BatchPolicy, Sequencing};
use crate::models::session::{LiveSession, SessionEvent};
use crate::models::task::{TaskDescriptor, WorkspaceId};
use crate::orchestrator::outcome;
use crate::orchestrator::stop::StopCoordinator;

/// Poll interval of the fixed-delay pacing wait.
const DELAY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poll interval of the wait-for-completion pacing wait.
const COMPLETION_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Why a task never started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Validation failed and the caller declined to fix the task.
    ValidationDeclined,
    /// No launcher exists for this task.
    NoRunner,
    /// The launch request itself failed.
    LaunchFailed,
}

/// Progress events delivered to an optional observer channel.
///
/// Delivery is best-effort: a full channel drops events rather than
/// stalling the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// A task was skipped without starting; the chain continues.
    TaskSkipped {
        /// Cursor position of the skipped task.
        index: usize,
        /// Task name.
        name: String,
        /// Why the task never started.
        reason: SkipReason,
    },
    /// A launch request was issued for a task.
    LaunchRequested {
        /// Cursor position of the task.
        index: usize,
        /// Task name.
        name: String,
    },
    /// The launcher confirmed a session for a task.
    SessionAttached {
        /// Cursor position of the task.
        index: usize,
        /// Task name.
        name: String,
        /// Whether a display slot came with the session.
        has_slot: bool,
    },
    /// Progress of a fixed-delay pacing wait.
    WaitProgress {
        /// Cursor position of the task being waited on.
        index: usize,
        /// Elapsed fraction of the configured delay, `0.0..=1.0`.
        fraction: f64,
    },
    /// A session terminated (naturally or force-stopped).
    TaskTerminated {
        /// Cursor position of the task.
        index: usize,
        /// Task name.
        name: String,
        /// Exit code, when one exists.
        exit_code: Option<i32>,
    },
    /// The batch is done walking its cursor.
    BatchFinished {
        /// Whether the walk ended early through a stop or shutdown.
        aborted: bool,
    },
}

/// The single trigger that completed one cursor step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Advance {
    /// Task never started (validation declined, no runner, launch failed).
    Skipped,
    /// Parallel mode: the launch request was issued; a detached watcher
    /// owns the rest of the session's life.
    Requested,
    /// The launch produced no observable session or slot; nothing to
    /// wait on.
    NoSlot,
    /// Attachment was handled and the pacing condition is satisfied.
    Paced,
    /// External shutdown arrived during a pacing wait; the chain ends
    /// without starting further tasks.
    Abandoned,
}

/// How a pacing wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitOutcome {
    Ready,
    Cancelled,
}

/// Drives batches of tasks through the launch collaborators.
///
/// Cheap to clone; clones share the same coordinator and collaborators,
/// so concurrently started batches stop together.
#[derive(Clone)]
pub struct BatchRunner {
    launcher: Arc<dyn Launcher>,
    validator: Arc<dyn Validator>,
    stop: Arc<StopCoordinator>,
    observer: Option<mpsc::Sender<BatchEvent>>,
    shutdown: CancellationToken,
}

impl BatchRunner {
    /// Construct a runner from its collaborators.
    ///
    /// `shutdown` is the process-wide cancellation token; firing it
    /// abandons in-progress pacing waits without advancing their chains.
    #[must_use]
    pub fn new(
        launcher: Arc<dyn Launcher>,
        validator: Arc<dyn Validator>,
        stop: Arc<StopCoordinator>,
        observer: Option<mpsc::Sender<BatchEvent>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            launcher,
            validator,
            stop,
            observer,
            shutdown,
        }
    }

    /// The stop coordinator shared by every batch this runner starts.
    #[must_use]
    pub fn stop_coordinator(&self) -> &Arc<StopCoordinator> {
        &self.stop
    }

    /// Start a batch. Fire-and-forget: the walk runs on its own task and
    /// per-task failures never surface here.
    pub fn start_batch(
        &self,
        workspace: WorkspaceId,
        tasks: Vec<TaskDescriptor>,
        policy: BatchPolicy,
    ) {
        self.stop.begin_batch();
        let runner = self.clone();
        let span = info_span!("batch", %workspace);
        tokio::spawn(runner.run(workspace, tasks, policy).instrument(span));
    }

    /// The batch driver loop: one step per cursor index, strictly
    /// increasing, never the same index twice.
    async fn run(self, workspace: WorkspaceId, tasks: Vec<TaskDescriptor>, policy: BatchPolicy) {
        let total = tasks.len();
        info!(tasks = total, sequencing = ?policy.sequencing, "batch starting");

        let mut abandoned = false;
        let mut index = 0;
        while index < total {
            if !self.stop.can_start() {
                info!(index, "stop requested; no further tasks start");
                break;
            }
            let advance = self.step(&workspace, &tasks[index], index, total, &policy).await;
            debug!(index, ?advance, "cursor step complete");
            if advance == Advance::Abandoned {
                abandoned = true;
                break;
            }
            index += 1;
        }

        self.stop.end_batch();
        let aborted = abandoned || self.stop.is_aborted();
        info!(reached = index, aborted, "batch finished");
        self.emit(BatchEvent::BatchFinished { aborted });
    }

    /// Execute one cursor step: validate, launch, and (in one-by-one
    /// modes) wait for the pacing condition before returning.
    async fn step(
        &self,
        workspace: &WorkspaceId,
        task: &TaskDescriptor,
        index: usize,
        total: usize,
        policy: &BatchPolicy,
    ) -> Advance {
        let task = match self.validator.validate(task).await {
            Validation::Ok => task.clone(),
            Validation::Amended(amended) => amended,
            Validation::Declined => {
                info!(task = %task.name, index, "validation declined; task skipped");
                return self.skip(index, &task.name, SkipReason::ValidationDeclined);
            }
        };

        let ticket = match self.launcher.request_launch(&task, workspace).await {
            Ok(Some(ticket)) => ticket,
            Ok(None) => {
                info!(task = %task.name, index, "no runner for task; skipped");
                return self.skip(index, &task.name, SkipReason::NoRunner);
            }
            Err(err) => {
                warn!(task = %task.name, index, %err, "launch request failed; task skipped");
                return self.skip(index, &task.name, SkipReason::LaunchFailed);
            }
        };
        self.emit(BatchEvent::LaunchRequested {
            index,
            name: task.name.clone(),
        });

        if !policy.sequencing.is_one_by_one() {
            // Parallel: the watcher owns attachment and termination; the
            // cursor advances as soon as the request is issued.
            self.spawn_session_watcher(index, task.name.clone(), *policy, ticket.events, None);
            return Advance::Requested;
        }

        // One-by-one: this step consumes events until the session attaches.
        let mut events = ticket.events;
        let Some(session) = Self::await_attachment(&task.name, &mut events).await else {
            debug!(task = %task.name, index, "launch produced no session");
            return Advance::NoSlot;
        };

        let has_slot = session.slot().is_some();
        self.on_attached(&session, true).await;
        self.emit(BatchEvent::SessionAttached {
            index,
            name: task.name.clone(),
            has_slot,
        });

        // Hand the remaining events to a watcher for termination handling.
        self.spawn_session_watcher(
            index,
            task.name.clone(),
            *policy,
            events,
            Some(Arc::clone(&session)),
        );

        if !has_slot {
            // Session exists but is not observable; nothing to pace on.
            return Advance::NoSlot;
        }
        if index + 1 >= total {
            return Advance::Paced;
        }
        match policy.sequencing {
            Sequencing::OneByOneDelay { seconds } => {
                match self.delay_wait(&session, index, seconds).await {
                    WaitOutcome::Ready => Advance::Paced,
                    WaitOutcome::Cancelled => Advance::Abandoned,
                }
            }
            Sequencing::WaitForCompletion => match self.completion_wait(&session).await {
                WaitOutcome::Ready => Advance::Paced,
                WaitOutcome::Cancelled => Advance::Abandoned,
            },
            Sequencing::Parallel | Sequencing::OneByOne => Advance::Paced,
        }
    }

    /// Record a task that never started; the chain continues regardless.
    fn skip(&self, index: usize, name: &str, reason: SkipReason) -> Advance {
        self.emit(BatchEvent::TaskSkipped {
            index,
            name: name.to_owned(),
            reason,
        });
        Advance::Skipped
    }

    /// Consume launch events until the session attaches. `None` means the
    /// channel closed without one: the launch produced nothing.
    async fn await_attachment(
        name: &str,
        events: &mut mpsc::Receiver<SessionEvent>,
    ) -> Option<Arc<LiveSession>> {
        loop {
            match events.recv().await? {
                SessionEvent::Attached(session) => return Some(session),
                SessionEvent::WillTerminate => {
                    debug!(task = name, "session will terminate");
                }
                SessionEvent::Terminated { exit_code, normally } => {
                    // Terminated before any attachment was observed; keep
                    // draining until the channel closes.
                    debug!(task = name, exit_code, normally, "terminated before attachment");
                }
            }
        }
    }

    /// Register a freshly attached session and set up its slot.
    async fn on_attached(&self, session: &Arc<LiveSession>, one_by_one: bool) {
        let Some(slot) = session.slot().map(Arc::clone) else {
            return;
        };
        self.stop.register_session(Arc::clone(session)).await;
        if self.stop.is_aborted() {
            // The coordinator has force-stopped the session (or its sweep
            // is about to). Keep the slot when it is pinned or part of a
            // one-by-one flow, where it is about to be shown.
            if !slot.is_pinned() && !one_by_one {
                slot.remove();
            }
        } else {
            slot.set_pinned(false);
            slot.rename(&format!("{}*", session.task_name()));
        }
    }

    /// Spawn the watcher that owns the rest of a launch's event stream.
    ///
    /// With `attached` set (one-by-one flow), attachment was already
    /// handled inline and only termination remains; otherwise the watcher
    /// handles both.
    fn spawn_session_watcher(
        &self,
        index: usize,
        name: String,
        policy: BatchPolicy,
        mut events: mpsc::Receiver<SessionEvent>,
        attached: Option<Arc<LiveSession>>,
    ) {
        let runner = self.clone();
        let span = info_span!("session_watch", task = %name, index);
        tokio::spawn(
            async move {
                let mut session = attached;
                while let Some(event) = events.recv().await {
                    match event {
                        SessionEvent::Attached(new_session) => {
                            if session.is_none() {
                                runner
                                    .on_attached(&new_session, policy.sequencing.is_one_by_one())
                                    .await;
                                runner.emit(BatchEvent::SessionAttached {
                                    index,
                                    name: name.clone(),
                                    has_slot: new_session.slot().is_some(),
                                });
                            }
                            session = Some(new_session);
                        }
                        SessionEvent::WillTerminate => {
                            debug!("session will terminate");
                        }
                        SessionEvent::Terminated { exit_code, normally } => {
                            runner
                                .on_terminated(index, &name, session.take(), &policy, exit_code, normally)
                                .await;
                            break;
                        }
                    }
                }
            }
            .instrument(span),
        );
    }

    /// Apply the outcome policy to a terminated session and stop
    /// tracking it. Runs in every sequencing mode, whether or not the
    /// chain already advanced past this task.
    async fn on_terminated(
        &self,
        index: usize,
        name: &str,
        session: Option<Arc<LiveSession>>,
        policy: &BatchPolicy,
        exit_code: Option<i32>,
        normally: bool,
    ) {
        if let Some(session) = session {
            let decision = outcome::decide(exit_code, normally, policy, self.stop.is_aborted());
            debug!(?decision, exit_code, normally, "applying outcome policy");
            if let Some(slot) = session.slot() {
                outcome::apply(decision, slot.as_ref(), session.task_name());
            }
            self.stop.deregister_session(&session).await;
        } else {
            debug!(task = name, "terminated without a tracked session");
        }
        self.emit(BatchEvent::TaskTerminated {
            index,
            name: name.to_owned(),
            exit_code,
        });
    }

    /// Fixed-delay pacing wait: polls at a short interval, reporting the
    /// elapsed fraction, and ends early when the session terminates.
    async fn delay_wait(&self, session: &LiveSession, index: usize, seconds: f64) -> WaitOutcome {
        if !seconds.is_finite() || seconds <= 0.0 {
            return WaitOutcome::Ready;
        }
        let started = tokio::time::Instant::now();
        let full = Duration::from_secs_f64(seconds);
        loop {
            if session.is_terminated() {
                debug!(index, "session terminated before delay elapsed");
                return WaitOutcome::Ready;
            }
            let elapsed = started.elapsed();
            if elapsed >= full {
                return WaitOutcome::Ready;
            }
            self.emit(BatchEvent::WaitProgress {
                index,
                fraction: (elapsed.as_secs_f64() / seconds).min(1.0),
            });
            tokio::select! {
                () = self.shutdown.cancelled() => return WaitOutcome::Cancelled,
                () = tokio::time::sleep(DELAY_POLL_INTERVAL) => {}
            }
        }
    }

    /// Wait-for-completion pacing wait: polls until the session reports
    /// terminated.
    async fn completion_wait(&self, session: &LiveSession) -> WaitOutcome {
        while !session.is_terminated() {
            tokio::select! {
                () = self.shutdown.cancelled() => return WaitOutcome::Cancelled,
                () = tokio::time::sleep(COMPLETION_POLL_INTERVAL) => {}
            }
        }
        WaitOutcome::Ready
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(observer) = &self.observer {
            if let Err(err) = observer.try_send(event) {
                debug!(%err, "observer channel full or closed; event dropped");
            }
        }
    }
}
