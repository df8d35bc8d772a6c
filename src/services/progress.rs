//! Serialized progress registry.
//!
//! Progress callbacks fire from many concurrent child watchers; this
//! registry funnels them through one mutex so observers always see a
//! coherent snapshot. Entries keep first-seen order.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::domain::models::TaskProgress;
use crate::domain::ports::ProgressSink;

/// Shared registry of per-task progress, keyed by task id.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    entries: Arc<Mutex<Vec<TaskProgress>>>,
    observer: Option<ProgressSink>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an external observer that receives every update after the
    /// registry has absorbed it.
    pub fn with_observer(observer: ProgressSink) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            observer: Some(observer),
        }
    }

    /// Pre-register an entry so callers can render pending tasks before
    /// their child starts (used by race mode for every candidate model).
    pub fn register(&self, progress: TaskProgress) {
        self.upsert(progress);
    }

    /// The sink handed to agent runners.
    pub fn sink(&self) -> ProgressSink {
        let tracker = self.clone();
        Arc::new(move |progress: TaskProgress| {
            debug!(
                task_id = %progress.id,
                status = progress.status.as_str(),
                tools = progress.tool_count,
                "task progress"
            );
            tracker.upsert(progress);
        })
    }

    fn upsert(&self, progress: TaskProgress) {
        {
            let mut entries = self.entries.lock().expect("progress registry poisoned");
            match entries.iter_mut().find(|e| e.id == progress.id) {
                Some(existing) => *existing = progress.clone(),
                None => entries.push(progress.clone()),
            }
        }
        if let Some(observer) = &self.observer {
            observer(progress);
        }
    }

    /// Defensive copy of all entries, in first-seen order.
    pub fn snapshot(&self) -> Vec<TaskProgress> {
        self.entries
            .lock()
            .expect("progress registry poisoned")
            .clone()
    }
}
