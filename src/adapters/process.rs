//! The `pi` subprocess runner.
//!
//! Spawns one child agent per invocation, streams its NDJSON events into
//! progress updates and usage accounting, and escalates termination on
//! abort: soft signal, grace period, hard kill. Failure never propagates
//! as an error; it lands on the returned `TaskResult`.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::events::{parse_line, ChildEvent, EventMessage};
use super::tool_preview::format_tool_preview;
use crate::domain::models::{TaskProgress, TaskResult, TaskState, ToolCall};
use crate::domain::ports::{AgentInvocation, AgentRunner, ProgressSink};
use crate::services::config::RunnerConfig;
use crate::services::output::{cap_output_within, sanitize_name};

/// Length of output previews pushed onto progress entries.
const OUTPUT_PREVIEW_CHARS: usize = 100;

/// Runs agents by spawning the `pi` CLI.
pub struct PiProcessRunner {
    config: RunnerConfig,
}

impl PiProcessRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Stage a system prompt in a fresh private temp directory. The path,
    /// not the content, goes on the command line; dropping the returned
    /// directory removes both on every exit path.
    fn stage_system_prompt(id: &str, prompt: &str) -> std::io::Result<(TempDir, PathBuf)> {
        let dir = tempfile::Builder::new().prefix("pi-parallel-").tempdir()?;
        let path = dir.path().join(format!("prompt-{}.md", sanitize_name(id)));
        std::fs::write(&path, prompt)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok((dir, path))
    }

    fn build_command(
        &self,
        invocation: &AgentInvocation,
        system_prompt_path: Option<&PathBuf>,
    ) -> Command {
        let mut cmd = Command::new(&self.config.pi_binary);
        cmd.args(["--mode", "json", "-p", "--no-session"]);
        if let Some(provider) = &invocation.provider {
            cmd.arg("--provider").arg(provider);
        }
        if let Some(model) = &invocation.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(tools) = &invocation.tools {
            cmd.arg("--tools").arg(tools.join(","));
        }
        if let Some(thinking) = &invocation.thinking {
            cmd.arg("--thinking").arg(thinking);
        }
        if let Some(path) = system_prompt_path {
            cmd.arg("--append-system-prompt").arg(path);
        }
        cmd.arg(invocation.prompt());
        cmd.current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Send the soft termination signal without reaping the child.
#[cfg(unix)]
fn soft_terminate(child: &Child) {
    if let Some(pid) = child.id() {
        #[allow(clippy::cast_possible_wrap)]
        let ret = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if ret != 0 {
            let err = std::io::Error::last_os_error();
            warn!(pid, error = %err, "failed to send SIGTERM");
        }
    }
}

#[cfg(not(unix))]
fn soft_terminate(_child: &Child) {
    // No soft signal on this platform; the grace timer hard-kills.
}

/// Folds child events into progress and message state for one run.
struct EventWatcher {
    progress: TaskProgress,
    sink: ProgressSink,
    started: Instant,
    messages: Vec<EventMessage>,
    api_error: Option<String>,
}

impl EventWatcher {
    fn new(progress: TaskProgress, sink: ProgressSink, started: Instant) -> Self {
        Self {
            progress,
            sink,
            started,
            messages: Vec::new(),
            api_error: None,
        }
    }

    fn emit(&mut self) {
        self.progress.duration_ms = self.started.elapsed().as_millis() as u64;
        (self.sink)(self.progress.clone());
    }

    fn ingest(&mut self, line: &str) {
        match parse_line(line) {
            Some(ChildEvent::MessageEnd { message }) => self.on_message_end(message),
            Some(ChildEvent::ToolExecutionStart { tool, args }) => {
                self.progress.current_tool_args = Some(format_tool_preview(&tool, &args));
                self.progress.current_tool = Some(tool);
                self.emit();
            }
            Some(ChildEvent::ToolExecutionEnd { tool, args }) => {
                let args = format_tool_preview(&tool, &args);
                self.progress.push_tool(ToolCall { tool, args });
                self.emit();
            }
            Some(ChildEvent::ToolResultEnd { message }) => {
                self.messages.push(message);
                self.emit();
            }
            None => {}
        }
    }

    fn on_message_end(&mut self, message: EventMessage) {
        if !message.is_assistant() {
            return;
        }
        if let Some(usage) = &message.usage {
            self.progress.usage.record_turn(
                usage.input,
                usage.output,
                usage.cache_read,
                usage.cache_write,
                usage.cost.map(|c| c.total).unwrap_or_default(),
                usage.total_tokens,
            );
        }
        for part in &message.content {
            if part.kind == "text" {
                if let Some(text) = part.text.as_deref() {
                    let preview: String = text.chars().take(OUTPUT_PREVIEW_CHARS).collect();
                    self.progress.push_output(preview);
                }
            }
        }
        if message.stop_reason.as_deref() == Some("error") {
            if let Some(error) = message.error_message.as_deref().filter(|e| !e.is_empty()) {
                self.api_error = Some(error.to_string());
            }
        }
        self.messages.push(message);
        self.emit();
    }

    fn mark_aborted(&mut self) {
        self.progress.status = TaskState::Aborted;
        self.emit();
    }

    /// Text of the last assistant message, scanning from the end.
    fn final_output(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| m.is_assistant())
            .and_then(|m| m.last_text())
            .unwrap_or("")
            .to_string()
    }
}

#[async_trait]
impl AgentRunner for PiProcessRunner {
    async fn run(
        &self,
        invocation: AgentInvocation,
        cancel: CancellationToken,
        sink: ProgressSink,
    ) -> TaskResult {
        let started = Instant::now();
        let mut progress = TaskProgress::new(invocation.id.clone(), invocation.task.clone())
            .with_name(invocation.name.clone())
            .with_model(invocation.model.clone());
        progress.status = TaskState::Running;

        // The prompt directory lives on the stack for the whole run, so the
        // file disappears on every exit path.
        let staged = match invocation
            .system_prompt
            .as_deref()
            .filter(|prompt| !prompt.is_empty())
        {
            Some(prompt) => match Self::stage_system_prompt(&invocation.id, prompt) {
                Ok(staged) => Some(staged),
                Err(e) => {
                    let mut result = TaskResult::spawn_failure(
                        invocation.id.clone(),
                        invocation.task.clone(),
                        format!("Failed to stage system prompt: {e}"),
                    );
                    result.name = invocation.name.clone();
                    result.model = invocation.model.clone();
                    progress.status = TaskState::Failed;
                    sink(progress);
                    return result;
                }
            },
            None => None,
        };

        let mut cmd = self.build_command(&invocation, staged.as_ref().map(|(_, path)| path));
        debug!(task_id = %invocation.id, binary = %self.config.pi_binary, "spawning agent");

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let mut result = TaskResult::spawn_failure(
                    invocation.id.clone(),
                    invocation.task.clone(),
                    format!("Failed to spawn {}: {e}", self.config.pi_binary),
                );
                result.name = invocation.name.clone();
                result.model = invocation.model.clone();
                progress.status = TaskState::Failed;
                sink(progress);
                return result;
            }
        };

        let mut watcher = EventWatcher::new(progress, sink, started);
        watcher.emit();

        let stderr_handle = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buffer = String::new();
                let _ = stderr.read_to_string(&mut buffer).await;
                buffer
            })
        });

        let stdout = child.stdout.take().expect("stdout piped above");
        let mut lines = BufReader::new(stdout).lines();

        let grace = Duration::from_secs(self.config.kill_grace_secs);
        let mut aborted = false;
        let mut kill_at: Option<tokio::time::Instant> = None;
        let mut hard_killed = false;

        // Single event loop: the cancellation listener arms the soft kill
        // once; the grace timer escalates to the hard kill while stdout
        // continues draining until the child closes it.
        loop {
            // Branch expressions are evaluated even when their guard is
            // false, so the disarmed timer needs a harmless deadline.
            let deadline = kill_at
                .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(86_400));
            tokio::select! {
                _ = cancel.cancelled(), if !aborted => {
                    aborted = true;
                    watcher.mark_aborted();
                    soft_terminate(&child);
                    kill_at = Some(tokio::time::Instant::now() + grace);
                }
                _ = tokio::time::sleep_until(deadline), if kill_at.is_some() && !hard_killed => {
                    warn!(task_id = %invocation.id, "grace period expired, killing child");
                    hard_killed = true;
                    if let Err(e) = child.start_kill() {
                        warn!(task_id = %invocation.id, error = %e, "hard kill failed");
                    }
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => watcher.ingest(&line),
                    Ok(None) => break,
                    Err(e) => {
                        debug!(task_id = %invocation.id, error = %e, "stdout stream error");
                        break;
                    }
                }
            }
        }

        let status = child.wait().await;
        let stderr = match stderr_handle {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        let exit_code = status
            .ok()
            .and_then(|s| s.code())
            .unwrap_or(if aborted { 1 } else { -1 });

        let shaped = cap_output_within(
            &watcher.final_output(),
            self.config.max_output_lines,
            self.config.max_output_bytes,
        );
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut result = TaskResult {
            id: invocation.id.clone(),
            name: invocation.name.clone(),
            task: invocation.task.clone(),
            model: invocation.model.clone(),
            exit_code,
            output: shaped.text,
            full_output_path: None,
            stderr: stderr.clone(),
            truncated: shaped.truncated,
            duration_ms,
            usage: watcher.progress.usage,
            error: None,
            aborted,
            step: invocation.step,
        };

        if aborted {
            watcher.progress.status = TaskState::Aborted;
        } else if exit_code != 0 {
            result.error = Some(if stderr.trim().is_empty() {
                format!("Exit code: {exit_code}")
            } else {
                stderr
            });
            watcher.progress.status = TaskState::Failed;
        } else if let Some(api_error) = watcher.api_error.clone() {
            // The child exited 0 after reporting a fatal API error in-band;
            // surface it as a failure.
            result.exit_code = 1;
            result.error = Some(api_error);
            watcher.progress.status = TaskState::Failed;
        } else {
            watcher.progress.status = TaskState::Completed;
        }
        watcher.emit();

        drop(staged);
        result
    }
}
