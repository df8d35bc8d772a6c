//! Reviewer protocol: prompt construction and decision parsing.
//!
//! Reviewers are ordinary agents instructed to end their output with a
//! single marker line, `APPROVED` or `REVISION_NEEDED`. Parsing is
//! deliberately forgiving: models frequently wrap the marker in prose.

use crate::domain::models::ReviewConfig;

/// Window of trailing output inspected when no exact marker line is found.
const DECISION_TAIL_CHARS: usize = 200;

/// Block appended to every reviewer's system prompt.
pub const REVIEW_PROTOCOL: &str = "\n\n## Review Protocol\n\
You are reviewing another agent's work. After your assessment, end your \
response with exactly one of the following markers on its own final line:\n\
APPROVED\n\
REVISION_NEEDED";

/// Parsed reviewer verdict. Never fails; ambiguous output rejects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewDecision {
    pub approved: bool,
    pub feedback: String,
}

/// Parse a reviewer's output into a decision.
///
/// The last non-blank line decides when it is exactly a marker; otherwise
/// the trailing window is scanned case-insensitively, and anything still
/// ambiguous counts as a rejection with the full output as feedback.
pub fn parse_decision(output: &str) -> ReviewDecision {
    let mut remaining = output.trim_end();
    loop {
        let (head, line) = match remaining.rfind('\n') {
            Some(pos) => (&remaining[..pos], remaining[pos + 1..].trim()),
            None => ("", remaining.trim()),
        };
        if line.is_empty() && !remaining.is_empty() {
            remaining = head.trim_end();
            continue;
        }
        match line {
            "APPROVED" => {
                return ReviewDecision {
                    approved: true,
                    feedback: head.trim_end().to_string(),
                }
            }
            "REVISION_NEEDED" => {
                return ReviewDecision {
                    approved: false,
                    feedback: head.trim_end().to_string(),
                }
            }
            _ => break,
        }
    }

    let tail: String = {
        let chars: Vec<char> = output.chars().collect();
        let start = chars.len().saturating_sub(DECISION_TAIL_CHARS);
        chars[start..].iter().collect::<String>().to_lowercase()
    };
    if tail.contains("approved") && !tail.contains("not approved") && !tail.contains("revision") {
        return ReviewDecision {
            approved: true,
            feedback: output.to_string(),
        };
    }

    ReviewDecision {
        approved: false,
        feedback: output.to_string(),
    }
}

/// Build the prompt for one review iteration.
pub fn build_review_prompt(
    review: &ReviewConfig,
    original_task: &str,
    worker_output: &str,
    iteration: u32,
    max_iterations: u32,
    previous_feedback: Option<&str>,
) -> String {
    let mut prompt = match review.task.as_deref() {
        Some(template) => template
            .replace("{output}", worker_output)
            .replace("{task}", original_task),
        None => format!(
            "Review the work below and decide whether it completes the task.\n\n\
             ## Original Task\n{original_task}\n\n\
             ## Submitted Work\n{worker_output}"
        ),
    };

    prompt.push_str(&format!(
        "\n\nThis is review iteration {iteration} of {max_iterations}."
    ));
    if let Some(feedback) = previous_feedback {
        prompt.push_str(&format!("\n\n## Previous Review Feedback\n{feedback}"));
    }
    if iteration >= max_iterations {
        prompt.push_str(
            "\n\nNote: this is the final iteration; the work will be accepted \
             regardless of your decision.",
        );
    }
    prompt
}

/// Build the rerun prompt for a worker after a rejected review.
pub fn build_revision_prompt(
    original_task: &str,
    previous_output: &str,
    reviewer_feedback: &str,
) -> String {
    format!(
        "Revise your previous work on this task.\n\n\
         ## Task\n{original_task}\n\n\
         ## Your Previous Output\n{previous_output}\n\n\
         ## Reviewer Feedback\n{reviewer_feedback}\n\n\
         Address every point of the feedback and produce the complete, \
         revised result."
    )
}
