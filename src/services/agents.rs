//! Agent-definition discovery.
//!
//! Definitions live as Markdown files in `~/.pi/agents` (user scope) and
//! `<cwd>/.pi/agents` (project scope). A file may open with a TOML front
//! matter block fenced by `+++` lines; the remainder of the file is the
//! system prompt. Malformed files are skipped, never fatal.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::models::{AgentDefinition, AgentScope};

#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    name: Option<String>,
    model: Option<String>,
    tools: Option<Vec<String>>,
    thinking: Option<String>,
}

/// Discover agent definitions for the requested scope. Project definitions
/// shadow user definitions of the same name.
pub fn discover_agents(scope: AgentScope, cwd: &Path) -> HashMap<String, AgentDefinition> {
    let mut agents = HashMap::new();

    if matches!(scope, AgentScope::User | AgentScope::Both) {
        if let Some(dir) = user_agents_dir() {
            load_dir(&dir, AgentScope::User, &mut agents);
        }
    }
    if matches!(scope, AgentScope::Project | AgentScope::Both) {
        load_dir(&cwd.join(".pi").join("agents"), AgentScope::Project, &mut agents);
    }

    debug!(count = agents.len(), "agent definitions discovered");
    agents
}

fn user_agents_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".pi").join("agents"))
}

fn load_dir(dir: &Path, scope: AgentScope, agents: &mut HashMap<String, AgentDefinition>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        match parse_agent_file(&path, scope) {
            Ok(agent) => {
                agents.insert(agent.name.clone(), agent);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping malformed agent definition");
            }
        }
    }
}

fn parse_agent_file(path: &Path, scope: AgentScope) -> anyhow::Result<AgentDefinition> {
    let raw = std::fs::read_to_string(path)?;
    let (front, body) = split_front_matter(&raw);

    let meta: FrontMatter = match front {
        Some(front) => toml::from_str(front)?,
        None => FrontMatter::default(),
    };

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("agent")
        .to_string();
    let system_prompt = body.trim();

    Ok(AgentDefinition {
        name: meta.name.unwrap_or(stem),
        model: meta.model,
        tools: meta.tools,
        thinking: meta.thinking,
        system_prompt: (!system_prompt.is_empty()).then(|| system_prompt.to_string()),
        scope,
        path: Some(path.to_path_buf()),
    })
}

/// Split `+++`-fenced TOML front matter from the body.
fn split_front_matter(raw: &str) -> (Option<&str>, &str) {
    let rest = match raw.strip_prefix("+++") {
        Some(rest) => rest.strip_prefix('\n').unwrap_or(rest),
        None => return (None, raw),
    };
    match rest.find("\n+++") {
        Some(end) => {
            let body = &rest[end + "\n+++".len()..];
            (Some(&rest[..end]), body.strip_prefix('\n').unwrap_or(body))
        }
        None => (None, raw),
    }
}
