//! Batch policy model: sequencing mode and slot disposition flags.

use serde::{Deserialize, Serialize};

/// How the engine paces task starts within one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Sequencing {
    /// Launch requests are issued back-to-back without waiting for
    /// attachment or completion. Default mode.
    #[default]
    Parallel,
    /// The next task starts as soon as the previous one has attached.
    OneByOne,
    /// The next task starts after a fixed delay, or earlier if the
    /// previous session terminates before the delay elapses.
    OneByOneDelay {
        /// Delay between consecutive starts, in seconds.
        seconds: f64,
    },
    /// The next task starts only after the previous session terminates.
    WaitForCompletion,
}

impl Sequencing {
    /// Whether this mode forms a chain: each step waits on the previous
    /// task's attachment before the cursor advances.
    #[must_use]
    pub fn is_one_by_one(self) -> bool {
        !matches!(self, Self::Parallel)
    }
}

/// Immutable policy bundle for the lifetime of one batch.
// Four independent disposition toggles mirror the run-configuration
// settings surface; collapsing them into an enum would misrepresent
// that they combine freely.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchPolicy {
    /// Pacing of task starts.
    pub sequencing: Sequencing,
    /// Allow a successful task's slot to be reused (not pinned).
    pub reuse_slot_on_success: bool,
    /// Allow a failed task's slot to be reused (not pinned).
    pub reuse_slot_on_failure: bool,
    /// Badge the slot of a task that exits non-zero.
    pub mark_failed: bool,
    /// Remove the slot of a task that exits zero.
    pub hide_on_success: bool,
}

impl BatchPolicy {
    /// Policy with the given sequencing mode and all slot flags off.
    #[must_use]
    pub fn with_sequencing(sequencing: Sequencing) -> Self {
        Self {
            sequencing,
            ..Self::default()
        }
    }
}
