//! Agent definitions discovered from disk.
//!
//! An agent definition is a Markdown file whose TOML front matter supplies
//! defaults (model, tools, thinking) and whose body is the system prompt.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::params::AgentScope;

/// Defaults supplied by a named agent definition. Inline task fields always
/// take precedence over these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Scope the definition was discovered in.
    #[serde(default)]
    pub scope: AgentScope,
    /// Source file, kept for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl AgentDefinition {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: None,
            tools: None,
            thinking: None,
            system_prompt: None,
            scope: AgentScope::User,
            path: None,
        }
    }
}
