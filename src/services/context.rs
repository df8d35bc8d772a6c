//! Shared-context assembly and task-reference resolution.
//!
//! Builds the context string prepended to child prompts (caller-supplied
//! text, inlined files, git state) and resolves the placeholder forms used
//! across modes: `{task:id}` in team graphs, `{task_N}`/`{result_N}` in
//! parallel task lists.

use std::collections::HashMap;
use std::path::Path;

use tokio::process::Command;
use tracing::warn;

use crate::domain::models::{GitContextSpec, ParallelParams};

/// Section separator used in layered context strings.
pub const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Replace `{task:id}` placeholders with completed-task outputs.
///
/// Unknown ids and empty outputs leave the placeholder literal, so a task
/// can mention tasks that have not run without corrupting its prompt.
pub fn resolve_task_refs(text: &str, outputs: &HashMap<String, String>) -> String {
    let mut resolved = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{task:") {
        resolved.push_str(&rest[..start]);
        let after = &rest[start + "{task:".len()..];
        match after.find('}') {
            Some(end) => {
                let id = &after[..end];
                match outputs.get(id).filter(|output| !output.is_empty()) {
                    Some(output) => resolved.push_str(output),
                    None => {
                        resolved.push_str("{task:");
                        resolved.push_str(id);
                        resolved.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                resolved.push_str("{task:");
                rest = after;
            }
        }
    }
    resolved.push_str(rest);
    resolved
}

/// Does any task text contain a `{task_N}` or `{result_N}` cross-reference?
///
/// Detection is intentionally broad: any syntactic match forces serial
/// execution even if the reference can never resolve, which lets forward
/// references fill in as earlier tasks complete.
pub fn has_cross_refs(texts: &[&str]) -> bool {
    texts
        .iter()
        .any(|text| find_cross_ref(text, 0).is_some())
}

/// Earliest `{task_N}` / `{result_N}` at or after `from`, as
/// `(start, end, N)`.
fn find_cross_ref(text: &str, from: usize) -> Option<(usize, usize, usize)> {
    let mut best: Option<(usize, usize, usize)> = None;
    for prefix in ["{task_", "{result_"] {
        let mut search = from;
        while let Some(offset) = text[search..].find(prefix) {
            let start = search + offset;
            let digits = &text[start + prefix.len()..];
            let len = digits.chars().take_while(|c| c.is_ascii_digit()).count();
            if len > 0 && digits[len..].starts_with('}') {
                if let Ok(index) = digits[..len].parse() {
                    let end = start + prefix.len() + len + 1;
                    if best.map_or(true, |(s, _, _)| start < s) {
                        best = Some((start, end, index));
                    }
                    break;
                }
            }
            search = start + 1;
        }
    }
    best
}

/// Replace `{task_N}` / `{result_N}` with the output of the N-th task
/// (1-based, input order). Unresolved references stay literal.
pub fn resolve_cross_refs(text: &str, outputs: &[Option<String>]) -> String {
    let mut resolved = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some((start, end, index)) = find_cross_ref(text, cursor) {
        resolved.push_str(&text[cursor..start]);
        let output = index
            .checked_sub(1)
            .and_then(|i| outputs.get(i))
            .and_then(|o| o.as_deref())
            .filter(|o| !o.is_empty());
        match output {
            Some(output) => resolved.push_str(output),
            None => resolved.push_str(&text[start..end]),
        }
        cursor = end;
    }
    resolved.push_str(&text[cursor..]);
    resolved
}

/// Build the shared context for a run: caller text, inlined files, then git
/// state. Returns `None` when every source is empty or disabled.
pub async fn build_shared_context(params: &ParallelParams, cwd: &Path) -> Option<String> {
    let mut sections: Vec<String> = Vec::new();

    if let Some(context) = params.context.as_deref().filter(|c| !c.is_empty()) {
        sections.push(context.to_string());
    }

    for file in params.context_files.as_deref().unwrap_or(&[]) {
        let resolved = if file.is_absolute() {
            file.clone()
        } else {
            cwd.join(file)
        };
        match tokio::fs::read_to_string(&resolved).await {
            Ok(body) => sections.push(format!("## File: {}\n```\n{}\n```", file.display(), body)),
            Err(e) => {
                warn!(file = %file.display(), error = %e, "context file unreadable");
                sections.push(format!("## File: {} (unreadable: {})", file.display(), e));
            }
        }
    }

    if let Some(spec) = params.git_context.as_ref().and_then(|opt| opt.resolve()) {
        if let Some(git) = build_git_context(&spec, cwd).await {
            sections.push(git);
        }
    }

    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n\n"))
    }
}

/// Gather the requested git sections. Any git failure degrades to omission.
async fn build_git_context(spec: &GitContextSpec, cwd: &Path) -> Option<String> {
    let mut sections: Vec<String> = Vec::new();

    if spec.branch {
        if let Some(branch) = run_git(cwd, &["rev-parse", "--abbrev-ref", "HEAD"]).await {
            sections.push(format!("## Git Branch\n{}", branch.trim()));
        }
    }
    if spec.status {
        if let Some(status) = run_git(cwd, &["status", "--short"]).await {
            sections.push(format!("## Git Status\n```\n{}```", status));
        }
    }
    if spec.diff_stats {
        if let Some(stats) = run_git(cwd, &["diff", "--stat"]).await {
            sections.push(format!("## Git Diff Stats\n```\n{}```", stats));
        }
    }
    if spec.diff {
        if let Some(diff) = run_git(cwd, &["diff"]).await {
            sections.push(format!("## Git Diff\n```diff\n{}```", diff));
        }
    }
    if let Some(count) = spec.log {
        let count_arg = count.to_string();
        if let Some(log) = run_git(cwd, &["log", "-n", &count_arg, "--oneline"]).await {
            sections.push(format!("## Recent Commits\n```\n{}```", log));
        }
    }

    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n\n"))
    }
}

async fn run_git(cwd: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        warn!(?args, "git command failed, omitting section");
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}
