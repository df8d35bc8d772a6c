//! Compact previews of tool-call arguments for progress display.
//!
//! Per-tool heuristics pick the most informative field; everything is
//! capped so a preview never blows up a status line.

use serde_json::Value;

/// Hard cap on any preview.
const PREVIEW_MAX: usize = 60;

/// Fallback key priority when no per-tool rule applies.
const FALLBACK_KEYS: [&str; 10] = [
    "command", "path", "file", "pattern", "query", "url", "task", "prompt", "name", "action",
];

/// Format a preview of `args` for the given tool.
pub fn format_tool_preview(tool: &str, args: &Value) -> String {
    let preview = match tool.to_ascii_lowercase().as_str() {
        "read" => read_preview(args),
        "write" => write_preview(args),
        "edit" => str_field(args, "path").map(|p| elide_left(p, 50)),
        "bash" => str_field(args, "command").map(str::to_string),
        "grep" => grep_preview(args),
        "find" => find_preview(args),
        "mcp" => mcp_preview(args),
        "subagent" => subagent_preview(args),
        "todo" => todo_preview(args),
        _ => None,
    };

    let preview = preview.unwrap_or_else(|| fallback_preview(args));
    truncate_end(&preview, PREVIEW_MAX)
}

fn str_field<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn read_preview(args: &Value) -> Option<String> {
    let path = elide_left(str_field(args, "path")?, 50);
    let offset = args.get("offset").and_then(Value::as_u64);
    let limit = args.get("limit").and_then(Value::as_u64);
    Some(match (offset, limit) {
        (Some(offset), Some(limit)) => format!("{path} [{}-{}]", offset, offset + limit),
        _ => path,
    })
}

fn write_preview(args: &Value) -> Option<String> {
    let path = elide_left(str_field(args, "path")?, 40);
    let chars = args
        .get("content")
        .and_then(Value::as_str)
        .map(|content| content.chars().count());
    Some(match chars {
        Some(chars) => format!("{path} ({chars} chars)"),
        None => path,
    })
}

fn grep_preview(args: &Value) -> Option<String> {
    let pattern = str_field(args, "pattern")?;
    Some(match str_field(args, "path") {
        Some(path) => format!("{pattern} in {path}"),
        None => pattern.to_string(),
    })
}

fn find_preview(args: &Value) -> Option<String> {
    let path = str_field(args, "path")?;
    Some(match str_field(args, "name") {
        Some(name) => format!("{path} -name \"{name}\""),
        None => path.to_string(),
    })
}

fn mcp_preview(args: &Value) -> Option<String> {
    for key in ["tool", "search", "server"] {
        if let Some(value) = str_field(args, key) {
            return Some(format!("{key}: {value}"));
        }
    }
    None
}

fn subagent_preview(args: &Value) -> Option<String> {
    if let Some(task) = str_field(args, "task") {
        return Some(truncate_end(task, 50));
    }
    str_field(args, "agent").map(|agent| format!("agent:{agent}"))
}

fn todo_preview(args: &Value) -> Option<String> {
    let action = str_field(args, "action")?;
    let subject = str_field(args, "title").or_else(|| str_field(args, "id"))?;
    Some(format!("{action}: {subject}"))
}

fn fallback_preview(args: &Value) -> String {
    let Some(map) = args.as_object() else {
        return String::new();
    };
    for key in FALLBACK_KEYS {
        if let Some(value) = map.get(key).and_then(Value::as_str) {
            return value.to_string();
        }
    }
    match map.iter().next() {
        Some((key, value)) => format!("{key}: {}", render_value(value)),
        None => String::new(),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Keep the tail of a long path, prefixing an ellipsis.
fn elide_left(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let tail: String = text
        .chars()
        .skip(count - max_chars.saturating_sub(1))
        .collect();
    format!("…{tail}")
}

fn truncate_end(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{head}…")
}
