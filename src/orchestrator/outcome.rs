//! Outcome policy: maps a terminated session to a display transition.

use crate::display::DisplaySlot;
use crate::models::policy::BatchPolicy;

/// Display-state transition for one terminated session's slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotDecision {
    /// Remove the slot entirely; when set, the other fields are moot.
    pub hide_slot: bool,
    /// Pin the slot so later runs cannot reuse it.
    pub pin_slot: bool,
    /// Badge the slot as failed.
    pub mark_failed: bool,
}

/// Decide what happens to a slot when its session terminates.
///
/// Success means the session ended on its own with exit code zero. A slot
/// is pinned when its policy forbids reuse for the observed outcome,
/// except after an abort: stopping a batch must not retroactively pin
/// slots the user asked to have closed.
#[must_use]
pub fn decide(
    exit_code: Option<i32>,
    terminated_normally: bool,
    policy: &BatchPolicy,
    was_aborted: bool,
) -> SlotDecision {
    let success = terminated_normally && exit_code == Some(0);

    if policy.hide_on_success && success {
        return SlotDecision {
            hide_slot: true,
            ..SlotDecision::default()
        };
    }

    let pin_slot = ((success && !policy.reuse_slot_on_success)
        || (!success && !policy.reuse_slot_on_failure))
        && !was_aborted;
    let mark_failed = policy.mark_failed && exit_code != Some(0);

    SlotDecision {
        hide_slot: false,
        pin_slot,
        mark_failed,
    }
}

/// Apply a decision to the slot.
///
/// The running marker is cleared on every termination path except hide,
/// where the slot is removed outright and no further changes apply.
pub fn apply(decision: SlotDecision, slot: &dyn DisplaySlot, task_name: &str) {
    if decision.hide_slot {
        slot.remove();
        return;
    }
    if decision.pin_slot {
        slot.set_pinned(true);
    }
    slot.rename(task_name);
    if decision.mark_failed {
        slot.mark_failed();
    }
}
