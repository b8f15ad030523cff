//! Console-backed display slots.
//!
//! The CLI's stand-in for IDE run-content tabs: each slot keeps its state
//! (title, pinned, failed, removed) in memory and logs every transition.
//! The manager retains every slot it created so the final batch summary
//! can report per-task dispositions after the run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::debug;

use super::DisplaySlot;

/// Hands out [`ConsoleSlot`]s and keeps them for later inspection.
#[derive(Default)]
pub struct ConsoleSlotManager {
    slots: Mutex<Vec<Arc<ConsoleSlot>>>,
}

impl ConsoleSlotManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a slot titled after the task it will display.
    #[must_use]
    pub fn create(&self, title: &str) -> Arc<ConsoleSlot> {
        let slot = Arc::new(ConsoleSlot {
            title: Mutex::new(title.to_owned()),
            pinned: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            removed: AtomicBool::new(false),
        });
        debug!(title, "display slot created");
        match self.slots.lock() {
            Ok(mut slots) => slots.push(Arc::clone(&slot)),
            Err(poisoned) => poisoned.into_inner().push(Arc::clone(&slot)),
        }
        slot
    }

    /// Snapshot of every slot ever created, in creation order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<SlotSnapshot> {
        match self.slots.lock() {
            Ok(slots) => slots.iter().map(|slot| slot.snapshot()).collect(),
            Err(poisoned) => poisoned.into_inner().iter().map(|s| s.snapshot()).collect(),
        }
    }
}

/// One console slot; state-only, transitions logged via `tracing`.
pub struct ConsoleSlot {
    title: Mutex<String>,
    pinned: AtomicBool,
    failed: AtomicBool,
    removed: AtomicBool,
}

impl ConsoleSlot {
    /// Point-in-time copy of the slot state.
    #[must_use]
    pub fn snapshot(&self) -> SlotSnapshot {
        let title = match self.title.lock() {
            Ok(title) => title.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        SlotSnapshot {
            title,
            pinned: self.pinned.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            removed: self.removed.load(Ordering::SeqCst),
        }
    }
}

impl DisplaySlot for ConsoleSlot {
    fn set_pinned(&self, pinned: bool) {
        self.pinned.store(pinned, Ordering::SeqCst);
        debug!(pinned, "slot pin state changed");
    }

    fn is_pinned(&self) -> bool {
        self.pinned.load(Ordering::SeqCst)
    }

    fn rename(&self, title: &str) {
        match self.title.lock() {
            Ok(mut current) => *current = title.to_owned(),
            Err(poisoned) => *poisoned.into_inner() = title.to_owned(),
        }
        debug!(title, "slot renamed");
    }

    fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
        debug!("slot marked failed");
    }

    fn remove(&self) {
        self.removed.store(true, Ordering::SeqCst);
        debug!("slot removed");
    }
}

/// Serializable slot state for the end-of-run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotSnapshot {
    /// Current slot title (bare task name once the run marker is cleared).
    pub title: String,
    /// Whether the slot ended pinned.
    pub pinned: bool,
    /// Whether the slot carries the failure badge.
    pub failed: bool,
    /// Whether the slot was removed from the display.
    pub removed: bool,
}
