//! Scriptable in-process runner for tests.
//!
//! Stands in for the `pi` subprocess: a script closure maps each
//! invocation to a response, delays are cancellable, and the runner keeps
//! an invocation log plus a concurrency high-water mark so tests can
//! assert scheduling behavior.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::models::{TaskProgress, TaskResult, TaskState, UsageStats};
use crate::domain::ports::{AgentInvocation, AgentRunner, ProgressSink};

/// Scripted response for one mock run.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// Output text; `None` echoes the invocation's task text.
    pub output: Option<String>,
    pub exit_code: i32,
    pub error: Option<String>,
    pub stderr: String,
    pub delay: Duration,
    pub usage: UsageStats,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            output: None,
            exit_code: 0,
            error: None,
            stderr: String::new(),
            delay: Duration::ZERO,
            usage: UsageStats {
                input: 100,
                output: 50,
                turns: 1,
                ..Default::default()
            },
        }
    }
}

impl MockResponse {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            ..Default::default()
        }
    }

    /// Echo the invocation's task text back as the output.
    pub fn echo() -> Self {
        Self::default()
    }

    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            output: None,
            exit_code: 1,
            stderr: error.clone(),
            error: Some(error),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Script = dyn Fn(&AgentInvocation) -> MockResponse + Send + Sync;

/// In-process `AgentRunner` driven by a script closure.
pub struct MockRunner {
    script: Box<Script>,
    invocations: Arc<Mutex<Vec<AgentInvocation>>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockRunner {
    /// Every task succeeds and echoes its task text.
    pub fn echo() -> Self {
        Self::scripted(|_| MockResponse::echo())
    }

    pub fn scripted(
        script: impl Fn(&AgentInvocation) -> MockResponse + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            invocations: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every invocation seen so far, in arrival order.
    pub fn invocations(&self) -> Vec<AgentInvocation> {
        self.invocations.lock().expect("mock log poisoned").clone()
    }

    pub fn run_count(&self) -> usize {
        self.invocations.lock().expect("mock log poisoned").len()
    }

    /// Highest number of simultaneously running invocations observed.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentRunner for MockRunner {
    async fn run(
        &self,
        invocation: AgentInvocation,
        cancel: CancellationToken,
        sink: ProgressSink,
    ) -> TaskResult {
        let response = (self.script)(&invocation);
        self.invocations
            .lock()
            .expect("mock log poisoned")
            .push(invocation.clone());

        let mut progress = TaskProgress::new(invocation.id.clone(), invocation.task.clone())
            .with_name(invocation.name.clone())
            .with_model(invocation.model.clone());
        progress.status = TaskState::Running;
        sink(progress.clone());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let aborted = if response.delay.is_zero() {
            cancel.is_cancelled()
        } else {
            tokio::select! {
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep(response.delay) => false,
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);

        let output = if aborted {
            String::new()
        } else {
            response.output.unwrap_or_else(|| invocation.task.clone())
        };

        let result = TaskResult {
            id: invocation.id.clone(),
            name: invocation.name.clone(),
            task: invocation.task.clone(),
            model: invocation.model.clone(),
            exit_code: if aborted { 1 } else { response.exit_code },
            output,
            full_output_path: None,
            stderr: response.stderr,
            truncated: false,
            duration_ms: response.delay.as_millis() as u64,
            usage: if aborted {
                UsageStats::default()
            } else {
                response.usage
            },
            error: if aborted { None } else { response.error },
            aborted,
            step: invocation.step,
        };

        progress.status = result.state();
        progress.usage = result.usage;
        progress.duration_ms = result.duration_ms;
        sink(progress);

        result
    }
}
