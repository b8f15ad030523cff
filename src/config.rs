//! Batch file parsing and validation.
//!
//! A batch file is a TOML document listing an ordered set of tasks plus
//! the policy knobs that shape one batch: whether tasks start one by one,
//! the delay between starts (negative means "wait for the previous task
//! to finish"), and the slot disposition flags.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::models::policy::{BatchPolicy, Sequencing};
use crate::models::task::TaskDescriptor;
use crate::{AppError, Result};

fn default_workspace() -> String {
    "default".into()
}

/// Policy section of a batch file.
///
/// `delay_seconds` is signed: positive values pace one-by-one starts by
/// a fixed delay, zero starts the next task as soon as the previous one
/// attached, and negative values wait for the previous task to
/// terminate. It has no effect unless `start_one_by_one` is set.
// The flags are independent toggles on the settings surface; see
// `BatchPolicy`.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct PolicyConfig {
    /// Start tasks one by one instead of all at once.
    #[serde(default)]
    pub start_one_by_one: bool,
    /// Delay between one-by-one starts, in seconds; negative waits for
    /// completion.
    #[serde(default)]
    pub delay_seconds: f64,
    /// Allow reuse of a successful task's slot.
    #[serde(default)]
    pub reuse_slot_on_success: bool,
    /// Allow reuse of a failed task's slot.
    #[serde(default)]
    pub reuse_slot_on_failure: bool,
    /// Badge slots of tasks that exit non-zero.
    #[serde(default)]
    pub mark_failed: bool,
    /// Remove slots of tasks that exit zero.
    #[serde(default)]
    pub hide_on_success: bool,
}

impl PolicyConfig {
    /// Sequencing mode derived from the one-by-one flag and the delay.
    #[must_use]
    pub fn sequencing(&self) -> Sequencing {
        if !self.start_one_by_one {
            Sequencing::Parallel
        } else if self.delay_seconds > 0.0 {
            Sequencing::OneByOneDelay {
                seconds: self.delay_seconds,
            }
        } else if self.delay_seconds < 0.0 {
            Sequencing::WaitForCompletion
        } else {
            Sequencing::OneByOne
        }
    }

    /// The immutable policy bundle for one batch.
    #[must_use]
    pub fn to_policy(&self) -> BatchPolicy {
        BatchPolicy {
            sequencing: self.sequencing(),
            reuse_slot_on_success: self.reuse_slot_on_success,
            reuse_slot_on_failure: self.reuse_slot_on_failure,
            mark_failed: self.mark_failed,
            hide_on_success: self.hide_on_success,
        }
    }
}

/// One task entry in a batch file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct TaskConfig {
    /// Display name; defaults to the command when omitted.
    #[serde(default)]
    pub name: Option<String>,
    /// Program to launch.
    pub command: String,
    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory, absolute or relative to the batch file.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl TaskConfig {
    /// Descriptor handed to the validator and launcher.
    #[must_use]
    pub fn to_descriptor(&self) -> TaskDescriptor {
        TaskDescriptor {
            name: self.name.clone().unwrap_or_else(|| self.command.clone()),
            command: self.command.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            cwd: self.cwd.clone(),
        }
    }
}

/// Batch file parsed from TOML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct BatchFile {
    /// Workspace identity the batch's sessions are tracked under.
    #[serde(default = "default_workspace")]
    pub workspace: String,
    /// Policy knobs for this batch.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Ordered task list.
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

impl BatchFile {
    /// Load and validate a batch file from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read batch file: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse a batch file from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Ordered descriptors for the sequencing engine.
    #[must_use]
    pub fn descriptors(&self) -> Vec<TaskDescriptor> {
        self.tasks.iter().map(TaskConfig::to_descriptor).collect()
    }

    fn validate(&self) -> Result<()> {
        if self.workspace.trim().is_empty() {
            return Err(AppError::Config("workspace must not be empty".into()));
        }
        if !self.policy.delay_seconds.is_finite() {
            return Err(AppError::Config("delay_seconds must be finite".into()));
        }
        Ok(())
    }
}
