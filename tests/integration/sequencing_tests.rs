//! Engine-level tests for the sequencing policies.

use std::time::Duration;

use volley::models::policy::{BatchPolicy, Sequencing};
use volley::orchestrator::sequencer::{BatchEvent, SkipReason};

use super::test_helpers::{
    assert_no_launch_within, attached_of, batch_finished, harness, launch_of, tasks, terminated_of,
    wait_for, AttachScript, LaunchBehavior,
};

#[tokio::test]
async fn parallel_issues_all_launches_in_order_without_waiting() {
    let mut h = harness();
    h.runner.start_batch(
        h.workspace.clone(),
        tasks(&["a", "b", "c"]),
        BatchPolicy::with_sequencing(Sequencing::Parallel),
    );

    // No session ever terminates, yet every request is issued and the
    // walk completes.
    wait_for(&mut h.events, "launch of c", launch_of("c")).await;
    wait_for(&mut h.events, "batch finished", batch_finished).await;

    assert_eq!(h.launcher.launched(), ["a", "b", "c"]);
    assert_eq!(h.stop.in_flight(), 0);
}

#[tokio::test]
async fn wait_for_completion_gates_the_next_launch() {
    let mut h = harness();
    h.runner.start_batch(
        h.workspace.clone(),
        tasks(&["a", "b"]),
        BatchPolicy::with_sequencing(Sequencing::WaitForCompletion),
    );

    wait_for(&mut h.events, "attachment of a", attached_of("a")).await;
    assert_no_launch_within(&mut h.events, Duration::from_millis(500)).await;
    assert_eq!(h.launcher.launched(), ["a"]);

    let a = h.launcher.handle("a").expect("a attached");
    a.terminate(0).await;

    wait_for(&mut h.events, "launch of b", launch_of("b")).await;
    wait_for(&mut h.events, "batch finished", batch_finished).await;
    assert_eq!(h.launcher.launched(), ["a", "b"]);
}

#[tokio::test]
async fn one_by_one_advances_on_attachment_alone() {
    let mut h = harness();
    h.runner.start_batch(
        h.workspace.clone(),
        tasks(&["a", "b"]),
        BatchPolicy::with_sequencing(Sequencing::OneByOne),
    );

    // Neither session terminates; attachment is enough to advance.
    wait_for(&mut h.events, "launch of b", launch_of("b")).await;
    wait_for(&mut h.events, "batch finished", batch_finished).await;
    assert_eq!(h.launcher.launched(), ["a", "b"]);
}

#[tokio::test]
async fn delay_advances_early_when_session_terminates_first() {
    let mut h = harness();
    h.runner.start_batch(
        h.workspace.clone(),
        tasks(&["a", "b"]),
        BatchPolicy::with_sequencing(Sequencing::OneByOneDelay { seconds: 30.0 }),
    );

    wait_for(&mut h.events, "attachment of a", attached_of("a")).await;
    let started = tokio::time::Instant::now();
    let a = h.launcher.handle("a").expect("a attached");
    a.terminate(0).await;

    // The next start must not wait out the 30 s delay.
    wait_for(&mut h.events, "launch of b", launch_of("b")).await;
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "early termination must cut the delay short"
    );
}

#[tokio::test]
async fn delay_elapses_when_session_keeps_running() {
    let mut h = harness();
    h.runner.start_batch(
        h.workspace.clone(),
        tasks(&["a", "b"]),
        BatchPolicy::with_sequencing(Sequencing::OneByOneDelay { seconds: 0.4 }),
    );

    wait_for(&mut h.events, "attachment of a", attached_of("a")).await;
    let started = tokio::time::Instant::now();

    // The wait reports progress while it runs.
    wait_for(&mut h.events, "wait progress", |event| {
        matches!(event, BatchEvent::WaitProgress { .. })
    })
    .await;

    wait_for(&mut h.events, "launch of b", launch_of("b")).await;
    assert!(
        started.elapsed() >= Duration::from_millis(300),
        "delay must pace the next start"
    );
    assert_eq!(h.launcher.launched(), ["a", "b"]);
}

#[tokio::test]
async fn declined_tasks_are_skipped_without_stalling_the_chain() {
    let mut h = harness();
    h.validator.decline("b");
    h.validator.decline("d");
    h.runner.start_batch(
        h.workspace.clone(),
        tasks(&["a", "b", "c", "d", "e"]),
        BatchPolicy::with_sequencing(Sequencing::OneByOne),
    );

    let skipped = wait_for(&mut h.events, "skip of b", |event| {
        matches!(
            event,
            BatchEvent::TaskSkipped { name, .. } if name == "b"
        )
    })
    .await;
    assert!(matches!(
        skipped,
        BatchEvent::TaskSkipped {
            reason: SkipReason::ValidationDeclined,
            ..
        }
    ));

    wait_for(&mut h.events, "batch finished", batch_finished).await;
    assert_eq!(h.launcher.launched(), ["a", "c", "e"]);
    assert_eq!(h.validator.validated(), ["a", "b", "c", "d", "e"]);
}

#[tokio::test]
async fn missing_runner_skips_and_continues() {
    let mut h = harness();
    h.launcher.script("b", LaunchBehavior::NoRunner);
    h.launcher
        .script("a", LaunchBehavior::Attach(AttachScript::exiting(0, Duration::from_millis(50))));
    h.runner.start_batch(
        h.workspace.clone(),
        tasks(&["a", "b", "c"]),
        BatchPolicy::with_sequencing(Sequencing::WaitForCompletion),
    );

    let skipped = wait_for(&mut h.events, "skip of b", |event| {
        matches!(event, BatchEvent::TaskSkipped { name, .. } if name == "b")
    })
    .await;
    assert!(matches!(
        skipped,
        BatchEvent::TaskSkipped {
            reason: SkipReason::NoRunner,
            ..
        }
    ));

    // The chain moved on to c even though b never started.
    wait_for(&mut h.events, "launch of c", launch_of("c")).await;
    assert_eq!(h.launcher.launched(), ["a", "c"]);
}

#[tokio::test]
async fn launch_failure_is_treated_like_a_missing_runner() {
    let mut h = harness();
    h.launcher.script("a", LaunchBehavior::Fail);
    h.runner.start_batch(
        h.workspace.clone(),
        tasks(&["a", "b"]),
        BatchPolicy::with_sequencing(Sequencing::Parallel),
    );

    let skipped = wait_for(&mut h.events, "skip of a", |event| {
        matches!(event, BatchEvent::TaskSkipped { name, .. } if name == "a")
    })
    .await;
    assert!(matches!(
        skipped,
        BatchEvent::TaskSkipped {
            reason: SkipReason::LaunchFailed,
            ..
        }
    ));
    wait_for(&mut h.events, "launch of b", launch_of("b")).await;
    wait_for(&mut h.events, "batch finished", batch_finished).await;
}

#[tokio::test]
async fn launch_without_a_session_advances_the_chain() {
    let mut h = harness();
    h.launcher.script("a", LaunchBehavior::NoSession);
    h.runner.start_batch(
        h.workspace.clone(),
        tasks(&["a", "b"]),
        BatchPolicy::with_sequencing(Sequencing::WaitForCompletion),
    );

    // a's channel closes without an attachment; b must still start.
    wait_for(&mut h.events, "launch of b", launch_of("b")).await;
    assert_eq!(h.launcher.launched(), ["a", "b"]);
}

#[tokio::test]
async fn session_without_a_slot_advances_immediately() {
    let mut h = harness();
    h.launcher.script(
        "a",
        LaunchBehavior::Attach(AttachScript {
            with_slot: false,
            ..AttachScript::default()
        }),
    );
    h.runner.start_batch(
        h.workspace.clone(),
        tasks(&["a", "b"]),
        BatchPolicy::with_sequencing(Sequencing::WaitForCompletion),
    );

    // Nothing observable to wait on for a, so b starts right away.
    wait_for(&mut h.events, "launch of b", launch_of("b")).await;
    assert_eq!(h.launcher.launched(), ["a", "b"]);
}

#[tokio::test]
async fn empty_batch_finishes_and_balances_the_counter() {
    let mut h = harness();
    h.runner.start_batch(
        h.workspace.clone(),
        Vec::new(),
        BatchPolicy::with_sequencing(Sequencing::Parallel),
    );

    let finished = wait_for(&mut h.events, "batch finished", batch_finished).await;
    assert!(matches!(finished, BatchEvent::BatchFinished { aborted: false }));
    assert_eq!(h.stop.in_flight(), 0);
}

#[tokio::test]
async fn counter_balances_even_when_every_task_is_skipped() {
    let mut h = harness();
    for name in ["a", "b", "c"] {
        h.validator.decline(name);
    }
    h.runner.start_batch(
        h.workspace.clone(),
        tasks(&["a", "b", "c"]),
        BatchPolicy::with_sequencing(Sequencing::WaitForCompletion),
    );

    wait_for(&mut h.events, "batch finished", batch_finished).await;
    assert_eq!(h.stop.in_flight(), 0);
    assert!(h.launcher.launched().is_empty());
}

#[tokio::test]
async fn termination_pins_and_marks_per_policy() {
    let mut h = harness();
    h.launcher
        .script("a", LaunchBehavior::Attach(AttachScript::exiting(1, Duration::from_millis(50))));
    let policy = BatchPolicy {
        sequencing: Sequencing::OneByOne,
        mark_failed: true,
        ..BatchPolicy::default()
    };
    h.runner.start_batch(h.workspace.clone(), tasks(&["a"]), policy);

    wait_for(&mut h.events, "termination of a", terminated_of("a")).await;
    let snapshots = h.launcher.slots.snapshots();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].title, "a", "running marker must be cleared");
    assert!(snapshots[0].pinned, "failure without reuse pins the slot");
    assert!(snapshots[0].failed);
    assert!(!snapshots[0].removed);

    // The session is no longer tracked once the outcome is applied.
    assert_eq!(h.stop.tracked_count(&h.workspace).await, 0);
}

#[tokio::test]
async fn hide_on_success_removes_the_slot() {
    let mut h = harness();
    h.launcher
        .script("a", LaunchBehavior::Attach(AttachScript::exiting(0, Duration::from_millis(50))));
    let policy = BatchPolicy {
        sequencing: Sequencing::OneByOne,
        hide_on_success: true,
        ..BatchPolicy::default()
    };
    h.runner.start_batch(h.workspace.clone(), tasks(&["a"]), policy);

    wait_for(&mut h.events, "termination of a", terminated_of("a")).await;
    let snapshots = h.launcher.slots.snapshots();
    assert!(snapshots[0].removed);
    assert!(!snapshots[0].pinned);
}
