//! Process-backed launcher.
//!
//! Spawns one `tokio::process` child per accepted launch request, with
//! `kill_on_drop(true)` for safety, and supervises it on a background
//! task that reports attachment and termination over the ticket channel.
//!
//! Destroy is graceful: SIGTERM first (on unix), then a grace period,
//! then a hard kill. Kill skips the grace period entirely.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::display::console::ConsoleSlotManager;
use crate::models::session::{LiveSession, SessionControl, SessionEvent};
use crate::models::task::{TaskDescriptor, WorkspaceId};
use crate::{AppError, Result};

use super::{Launcher, LaunchTicket};

/// Grace period between the termination request and a hard kill.
const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Capacity of one launch ticket's event channel.
const EVENT_CHANNEL_CAPACITY: usize = 8;

/// Launcher that runs task descriptors as local child processes.
pub struct ProcessLauncher {
    slots: Arc<ConsoleSlotManager>,
}

impl ProcessLauncher {
    /// Construct a launcher that attaches slots from the given manager.
    #[must_use]
    pub fn new(slots: Arc<ConsoleSlotManager>) -> Self {
        Self { slots }
    }

    /// Spawn the child and supervise it to termination, reporting over `tx`.
    async fn run_task(
        slots: Arc<ConsoleSlotManager>,
        task: TaskDescriptor,
        workspace: WorkspaceId,
        tx: mpsc::Sender<SessionEvent>,
    ) {
        let mut cmd = Command::new(&task.command);
        cmd.args(&task.args)
            .envs(&task.env)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(ref cwd) = task.cwd {
            cmd.current_dir(cwd);
        }

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                // Dropping tx closes the channel with no attachment; the
                // engine treats that as a task that never started.
                warn!(task = %task.name, %err, "failed to spawn process");
                return;
            }
        };
        let pid = child.id();
        info!(task = %task.name, pid = pid.unwrap_or(0), "process spawned");

        let control = ProcessControl::new(pid);
        let slot = slots.create(&task.name);
        let session = Arc::new(LiveSession::new(
            task.name.clone(),
            workspace,
            Some(slot),
            Box::new(control.clone()),
        ));

        // Receiver may already be gone (engine shut down); keep
        // supervising anyway so the child is not orphaned unwatched.
        let _ = tx.send(SessionEvent::Attached(Arc::clone(&session))).await;

        let (exit_code, normally) = Self::supervise(child, &control, &tx).await;
        control.exited.store(true, Ordering::SeqCst);
        session.mark_terminated(exit_code);
        info!(task = %task.name, exit_code, normally, "process terminated");
        let _ = tx.send(SessionEvent::Terminated { exit_code, normally }).await;
    }

    /// Wait for natural exit, a graceful stop request, or a hard kill.
    async fn supervise(
        mut child: Child,
        control: &ProcessControl,
        tx: &mpsc::Sender<SessionEvent>,
    ) -> (Option<i32>, bool) {
        tokio::select! {
            res = child.wait() => (exit_code_of(res), true),
            () = control.graceful.cancelled() => {
                let _ = tx.send(SessionEvent::WillTerminate).await;
                Self::terminate_with_grace(child, control).await
            }
            () = control.hard.cancelled() => {
                let _ = tx.send(SessionEvent::WillTerminate).await;
                if let Err(err) = child.start_kill() {
                    warn!(%err, "kill signal failed");
                }
                (exit_code_of(child.wait().await), false)
            }
        }
    }

    /// SIGTERM, then wait up to [`GRACE_PERIOD`] before a hard kill.
    /// A hard-kill request during the grace period cuts it short.
    async fn terminate_with_grace(mut child: Child, control: &ProcessControl) -> (Option<i32>, bool) {
        request_termination(&mut child, control.pid);

        let graceful_exit = tokio::select! {
            res = child.wait() => Some(exit_code_of(res)),
            () = control.hard.cancelled() => None,
            () = tokio::time::sleep(GRACE_PERIOD) => None,
        };

        match graceful_exit {
            Some(code) => (code, false),
            None => {
                warn!(
                    pid = control.pid.unwrap_or(0),
                    "process did not exit within grace period, forcing kill"
                );
                if let Err(err) = child.start_kill() {
                    warn!(%err, "kill signal failed");
                }
                (exit_code_of(child.wait().await), false)
            }
        }
    }
}

impl Launcher for ProcessLauncher {
    fn request_launch(
        &self,
        task: &TaskDescriptor,
        workspace: &WorkspaceId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<LaunchTicket>>> + Send + '_>> {
        let task = task.clone();
        let workspace = workspace.clone();
        let slots = Arc::clone(&self.slots);
        Box::pin(async move {
            if task.command.is_empty() {
                // No runner for this descriptor.
                return Ok(None);
            }

            let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            let span = info_span!("process_launch", task = %task.name);
            tokio::spawn(Self::run_task(slots, task, workspace, tx).instrument(span));
            Ok(Some(LaunchTicket { events: rx }))
        })
    }
}

/// Stop surface of one spawned process, shared with its supervisor task.
#[derive(Clone)]
struct ProcessControl {
    /// Set once a graceful termination has been requested.
    terminating: Arc<AtomicBool>,
    /// Set by the supervisor once the process has exited.
    exited: Arc<AtomicBool>,
    /// Fired by `destroy`; starts the SIGTERM-then-grace flow.
    graceful: CancellationToken,
    /// Fired by `kill`; skips the grace period.
    hard: CancellationToken,
    pid: Option<u32>,
}

impl ProcessControl {
    fn new(pid: Option<u32>) -> Self {
        Self {
            terminating: Arc::new(AtomicBool::new(false)),
            exited: Arc::new(AtomicBool::new(false)),
            graceful: CancellationToken::new(),
            hard: CancellationToken::new(),
            pid,
        }
    }
}

impl SessionControl for ProcessControl {
    fn supports_kill(&self) -> bool {
        true
    }

    fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::SeqCst) && !self.exited.load(Ordering::SeqCst)
    }

    fn kill(&self) -> Result<()> {
        self.hard.cancel();
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        if self.exited.load(Ordering::SeqCst) {
            return Err(AppError::Stop("process already exited".into()));
        }
        self.terminating.store(true, Ordering::SeqCst);
        self.graceful.cancel();
        Ok(())
    }
}

fn exit_code_of(res: std::io::Result<std::process::ExitStatus>) -> Option<i32> {
    res.ok().and_then(|status| status.code())
}

/// Ask the process to terminate: SIGTERM on unix, hard kill elsewhere.
#[cfg(unix)]
fn request_termination(child: &mut Child, pid: Option<u32>) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = pid.and_then(|p| i32::try_from(p).ok());
    if let Some(raw) = raw {
        if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
            warn!(pid = raw, %err, "SIGTERM failed, falling back to kill");
            if let Err(err) = child.start_kill() {
                warn!(%err, "kill signal failed");
            }
        }
    } else if let Err(err) = child.start_kill() {
        warn!(%err, "kill signal failed");
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child, _pid: Option<u32>) {
    if let Err(err) = child.start_kill() {
        warn!(%err, "kill signal failed");
    }
}
