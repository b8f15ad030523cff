//! Unit tests for the outcome policy decision table.

use std::sync::Arc;

use volley::display::console::ConsoleSlotManager;
use volley::display::DisplaySlot;
use volley::models::policy::BatchPolicy;
use volley::orchestrator::outcome::{apply, decide, SlotDecision};

fn policy(
    reuse_on_success: bool,
    reuse_on_failure: bool,
    hide_on_success: bool,
    mark_failed: bool,
) -> BatchPolicy {
    BatchPolicy {
        reuse_slot_on_success: reuse_on_success,
        reuse_slot_on_failure: reuse_on_failure,
        hide_on_success,
        mark_failed,
        ..BatchPolicy::default()
    }
}

#[test]
fn success_without_reuse_pins() {
    let decision = decide(Some(0), true, &policy(false, true, false, true), false);
    assert_eq!(
        decision,
        SlotDecision {
            hide_slot: false,
            pin_slot: true,
            mark_failed: false,
        }
    );
}

#[test]
fn failure_without_reuse_pins_and_marks() {
    let decision = decide(Some(1), true, &policy(true, false, false, true), false);
    assert_eq!(
        decision,
        SlotDecision {
            hide_slot: false,
            pin_slot: true,
            mark_failed: true,
        }
    );
}

#[test]
fn hide_on_success_short_circuits() {
    let decision = decide(Some(0), true, &policy(false, true, true, true), false);
    assert!(decision.hide_slot);
    assert!(!decision.pin_slot);
    assert!(!decision.mark_failed);
}

#[test]
fn abort_suppresses_pin_but_not_failure_badge() {
    let decision = decide(Some(1), true, &policy(true, false, false, true), true);
    assert!(!decision.pin_slot, "aborted batch must not pin slots");
    assert!(decision.mark_failed);
    assert!(!decision.hide_slot);
}

#[test]
fn reused_slots_are_never_pinned() {
    let decision = decide(Some(0), true, &policy(true, true, false, false), false);
    assert!(!decision.pin_slot);
    let decision = decide(Some(3), true, &policy(true, true, false, false), false);
    assert!(!decision.pin_slot);
}

#[test]
fn hide_does_not_apply_to_failures() {
    let decision = decide(Some(2), true, &policy(true, true, true, true), false);
    assert!(!decision.hide_slot);
    assert!(decision.mark_failed);
}

#[test]
fn killed_session_counts_as_failure() {
    // No exit code (killed by signal) is never a success.
    let decision = decide(None, false, &policy(true, false, true, true), false);
    assert!(!decision.hide_slot);
    assert!(decision.pin_slot);
    assert!(decision.mark_failed);
}

#[test]
fn force_stopped_zero_exit_is_not_success() {
    // Exit code 0 after a force-stop does not count as a natural success.
    let decision = decide(Some(0), false, &policy(true, true, true, false), false);
    assert!(!decision.hide_slot);
}

#[test]
fn apply_hide_removes_without_other_changes() {
    let slots = ConsoleSlotManager::new();
    let slot = slots.create("build*");
    apply(
        SlotDecision {
            hide_slot: true,
            pin_slot: true,
            mark_failed: true,
        },
        slot.as_ref(),
        "build",
    );
    let snapshot = slot.snapshot();
    assert!(snapshot.removed);
    assert!(!snapshot.pinned, "hide short-circuits pinning");
    assert!(!snapshot.failed, "hide short-circuits the failure badge");
    assert_eq!(snapshot.title, "build*", "hide skips the rename");
}

#[test]
fn apply_clears_running_marker_and_pins() {
    let slots = ConsoleSlotManager::new();
    let slot = slots.create("serve*");
    apply(
        SlotDecision {
            hide_slot: false,
            pin_slot: true,
            mark_failed: true,
        },
        slot.as_ref(),
        "serve",
    );
    let snapshot = slot.snapshot();
    assert_eq!(snapshot.title, "serve");
    assert!(snapshot.pinned);
    assert!(snapshot.failed);
    assert!(!snapshot.removed);
}

#[test]
fn apply_plain_termination_only_renames() {
    let slots = ConsoleSlotManager::new();
    let slot: Arc<_> = slots.create("test*");
    apply(SlotDecision::default(), slot.as_ref(), "test");
    let snapshot = slot.snapshot();
    assert_eq!(snapshot.title, "test");
    assert!(!snapshot.pinned);
    assert!(!snapshot.failed);
    assert!(!snapshot.removed);
}
