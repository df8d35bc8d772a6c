//! Child agent event protocol.
//!
//! The `pi` child emits one JSON object per stdout line. Only the event
//! types below affect the run; anything else, including unparseable lines,
//! is ignored. There is no schema enforcement beyond this dispatch.

use serde::Deserialize;
use serde_json::Value;

/// One part of a message's content array.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagePart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Cost block inside message usage.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct CostTotals {
    #[serde(default)]
    pub total: f64,
}

/// Token accounting reported on each assistant message.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageUsage {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_write: u64,
    /// Cumulative context size, not an increment.
    pub total_tokens: u64,
    pub cost: Option<CostTotals>,
}

/// A message carried on `message_end` / `tool_result_end` events.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventMessage {
    pub role: Option<String>,
    pub content: Vec<MessagePart>,
    pub usage: Option<MessageUsage>,
    pub stop_reason: Option<String>,
    pub error_message: Option<String>,
}

impl EventMessage {
    pub fn is_assistant(&self) -> bool {
        self.role.as_deref() == Some("assistant")
    }

    /// Last text part, scanning from the end.
    pub fn last_text(&self) -> Option<&str> {
        self.content
            .iter()
            .rev()
            .find(|part| part.kind == "text")
            .and_then(|part| part.text.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ToolEventPayload {
    #[serde(default, alias = "name", alias = "toolName")]
    tool: Option<String>,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MessageEventPayload {
    #[serde(default)]
    message: Option<EventMessage>,
}

/// Decoded child event.
#[derive(Debug, Clone)]
pub enum ChildEvent {
    MessageEnd { message: EventMessage },
    ToolExecutionStart { tool: String, args: Value },
    ToolExecutionEnd { tool: String, args: Value },
    ToolResultEnd { message: EventMessage },
}

/// Parse one stdout line. `None` means the line does not affect the run.
pub fn parse_line(line: &str) -> Option<ChildEvent> {
    let value: Value = serde_json::from_str(line.trim()).ok()?;
    let kind = value.get("type")?.as_str()?;
    match kind {
        "message_end" => {
            let payload: MessageEventPayload = serde_json::from_value(value).ok()?;
            Some(ChildEvent::MessageEnd {
                message: payload.message?,
            })
        }
        "tool_execution_start" | "tool_execution_end" => {
            let payload: ToolEventPayload = serde_json::from_value(value.clone()).ok()?;
            let tool = payload.tool.unwrap_or_else(|| "tool".to_string());
            if kind == "tool_execution_start" {
                Some(ChildEvent::ToolExecutionStart {
                    tool,
                    args: payload.args,
                })
            } else {
                Some(ChildEvent::ToolExecutionEnd {
                    tool,
                    args: payload.args,
                })
            }
        }
        "tool_result_end" => {
            let payload: MessageEventPayload = serde_json::from_value(value).ok()?;
            Some(ChildEvent::ToolResultEnd {
                message: payload.message?,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assistant_message_end() {
        let line = r#"{"type":"message_end","message":{"role":"assistant",
            "content":[{"type":"text","text":"hello"}],
            "usage":{"input":10,"output":5,"cacheRead":1,"cacheWrite":2,
                     "totalTokens":1200,"cost":{"total":0.003}},
            "stopReason":"end_turn"}}"#
            .replace('\n', "");
        match parse_line(&line) {
            Some(ChildEvent::MessageEnd { message }) => {
                assert!(message.is_assistant());
                assert_eq!(message.last_text(), Some("hello"));
                let usage = message.usage.unwrap();
                assert_eq!(usage.total_tokens, 1200);
                assert!((usage.cost.unwrap().total - 0.003).abs() < 1e-9);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_parse_tool_events() {
        let start = r#"{"type":"tool_execution_start","tool":"read","args":{"path":"/a"}}"#;
        assert!(matches!(
            parse_line(start),
            Some(ChildEvent::ToolExecutionStart { tool, .. }) if tool == "read"
        ));

        let end = r#"{"type":"tool_execution_end","toolName":"bash","args":{"command":"ls"}}"#;
        assert!(matches!(
            parse_line(end),
            Some(ChildEvent::ToolExecutionEnd { tool, .. }) if tool == "bash"
        ));
    }

    #[test]
    fn test_unknown_and_garbage_lines_ignored() {
        assert!(parse_line(r#"{"type":"heartbeat"}"#).is_none());
        assert!(parse_line("not json at all").is_none());
        assert!(parse_line("").is_none());
        assert!(parse_line(r#"{"no_type":1}"#).is_none());
    }

    #[test]
    fn test_last_text_scans_from_end() {
        let message = EventMessage {
            role: Some("assistant".into()),
            content: vec![
                MessagePart {
                    kind: "text".into(),
                    text: Some("first".into()),
                },
                MessagePart {
                    kind: "thinking".into(),
                    text: Some("hmm".into()),
                },
                MessagePart {
                    kind: "text".into(),
                    text: Some("last".into()),
                },
            ],
            usage: None,
            stop_reason: None,
            error_message: None,
        };
        assert_eq!(message.last_text(), Some("last"));
    }
}
