//! Non-interactive task validation.
//!
//! The CLI has no edit-and-retry dialog, so an invalid task is simply
//! declined: the sequencing engine skips it and the chain continues.
//! A relative working directory is amended to an absolute one so the
//! launcher never depends on the process-wide current directory.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tracing::warn;

use crate::models::task::TaskDescriptor;

use super::{Validation, Validator};

/// Validates descriptors against the batch file's base directory.
pub struct ConfigValidator {
    base_dir: PathBuf,
}

impl ConfigValidator {
    /// Construct a validator resolving relative paths against `base_dir`.
    #[must_use]
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }
}

impl Validator for ConfigValidator {
    fn validate(
        &self,
        task: &TaskDescriptor,
    ) -> Pin<Box<dyn Future<Output = Validation> + Send + '_>> {
        let task = task.clone();
        let base_dir = self.base_dir.clone();
        Box::pin(async move {
            if task.command.trim().is_empty() {
                warn!(task = %task.name, "task has no command");
                return Validation::Declined;
            }

            let Some(cwd) = task.cwd.clone() else {
                return Validation::Ok;
            };

            let resolved = if cwd.is_absolute() {
                cwd
            } else {
                base_dir.join(cwd)
            };
            if !resolved.is_dir() {
                warn!(task = %task.name, cwd = %resolved.display(), "working directory does not exist");
                return Validation::Declined;
            }
            if Some(&resolved) == task.cwd.as_ref() {
                Validation::Ok
            } else {
                let mut amended = task;
                amended.cwd = Some(resolved);
                Validation::Amended(amended)
            }
        })
    }
}
