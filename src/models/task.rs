//! Task descriptor and workspace identity.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identity of the workspace a batch runs against.
///
/// Stop sweeps are scoped to one workspace: stopping workspace `a` leaves
/// sessions registered under workspace `b` untouched, while the abort flag
/// itself is coordinator-wide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    /// Construct a workspace identity from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for WorkspaceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One runnable definition in a batch.
///
/// Owned by the caller and read-only to the orchestration core; the engine
/// never interprets the fields beyond handing them to the validator and
/// launcher collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TaskDescriptor {
    /// Display name used for slot titles and logging.
    pub name: String,
    /// Program to launch. An empty command means no runner exists.
    pub command: String,
    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the launched process.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory override.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl TaskDescriptor {
    /// Construct a descriptor with just a name and command.
    #[must_use]
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
        }
    }
}
