//! Per-team-run scratch workspace.
//!
//! A transient temp directory tree shared by all members of one team run:
//! `tasks/` holds one JSON record per finished task, `artifacts/` is free
//! space the agents may use. The whole tree is removed when the run
//! returns, success or failure.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempDir;
use tracing::{debug, warn};

use super::output::sanitize_name;
use crate::domain::models::TaskState;

#[derive(Serialize)]
struct TaskRecord<'a> {
    id: &'a str,
    status: &'a str,
    output: &'a str,
    timestamp: String,
}

/// Scratch directory for one team run.
pub struct TeamWorkspace {
    root: TempDir,
}

impl TeamWorkspace {
    /// Create `<tmpdir>/pi-<safe-name-or-epoch>-*/` with `tasks/` and
    /// `artifacts/`.
    pub fn create(team_name: &str) -> std::io::Result<Self> {
        let label = if team_name.trim().is_empty() {
            chrono::Utc::now().timestamp_millis().to_string()
        } else {
            sanitize_name(team_name)
        };
        let prefix = format!("pi-{label}-");
        let root = tempfile::Builder::new().prefix(&prefix).tempdir()?;
        std::fs::create_dir(root.path().join("tasks"))?;
        std::fs::create_dir(root.path().join("artifacts"))?;
        debug!(path = %root.path().display(), "team workspace created");
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Persist one task result as `tasks/<sanitized-id>.json`.
    pub fn write_task_result(
        &self,
        id: &str,
        output: &str,
        status: TaskState,
    ) -> std::io::Result<PathBuf> {
        let record = TaskRecord {
            id,
            status: status.as_str(),
            output,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let path = self
            .root
            .path()
            .join("tasks")
            .join(format!("{}.json", sanitize_name(id)));
        let body = serde_json::to_vec_pretty(&record)?;
        std::fs::write(&path, body)?;
        Ok(path)
    }

    /// Remove the workspace tree. Removal errors are swallowed; the OS temp
    /// cleaner is the backstop.
    pub fn teardown(self) {
        let path = self.root.path().to_path_buf();
        if let Err(e) = self.root.close() {
            warn!(path = %path.display(), error = %e, "workspace teardown failed");
        }
    }
}
