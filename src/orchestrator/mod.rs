//! Batch orchestration core.
//!
//! Covers the sequencing engine that walks a batch's task list, the stop
//! coordinator that tracks live sessions and carries the abort flag, and
//! the outcome policy that maps terminated sessions to display-slot
//! transitions.

pub mod outcome;
pub mod sequencer;
pub mod stop;
