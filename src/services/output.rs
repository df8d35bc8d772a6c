//! Output shaping: line/byte caps and spill-to-file for long outputs.

use std::io::Write;
use std::path::PathBuf;

use tracing::warn;

/// Maximum lines retained on a task result.
pub const MAX_OUTPUT_LINES: usize = 2000;
/// Maximum UTF-8 bytes retained on a task result.
pub const MAX_OUTPUT_BYTES: usize = 50 * 1024;
/// Summary excerpt length before an output is spilled to a file.
pub const SUMMARY_EXCERPT_CHARS: usize = 2000;

/// A capped output and whether any cap trimmed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapedOutput {
    pub text: String,
    pub truncated: bool,
}

/// Apply the default line and byte caps.
pub fn cap_output(raw: &str) -> ShapedOutput {
    cap_output_within(raw, MAX_OUTPUT_LINES, MAX_OUTPUT_BYTES)
}

/// Apply the line cap, then the byte cap.
///
/// The line cap keeps the newest `max_lines` lines. The byte cap
/// repeatedly drops the older half of the remaining text; that bisection is
/// lossy and not line-aligned, but each trim is re-aligned forward to a
/// `char` boundary so the result stays valid UTF-8.
pub fn cap_output_within(raw: &str, max_lines: usize, max_bytes: usize) -> ShapedOutput {
    let max_lines = max_lines.max(1);
    let max_bytes = max_bytes.max(1);
    let mut truncated = false;

    let mut text = {
        let lines: Vec<&str> = raw.split('\n').collect();
        if lines.len() > max_lines {
            truncated = true;
            lines[lines.len() - max_lines..].join("\n")
        } else {
            raw.to_string()
        }
    };

    while text.len() > max_bytes {
        truncated = true;
        let mut cut = text.len() / 2;
        while !text.is_char_boundary(cut) {
            cut += 1;
        }
        text = text.split_off(cut);
    }

    ShapedOutput { text, truncated }
}

/// Make a string safe for use in a file name.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "task".to_string()
    } else {
        trimmed.chars().take(60).collect()
    }
}

/// Spill a full output to `<tmpdir>/<prefix>-<safeName>-<epoch>.md`.
///
/// Spill files are intentionally not cleaned up; the path is surfaced to
/// the caller.
pub fn spill_output(prefix: &str, name: &str, full: &str) -> std::io::Result<PathBuf> {
    let epoch = chrono::Utc::now().timestamp_millis();
    let path = std::env::temp_dir().join(format!("{}-{}-{}.md", prefix, sanitize_name(name), epoch));
    let mut file = std::fs::File::create(&path)?;
    file.write_all(full.as_bytes())?;
    Ok(path)
}

/// Excerpt used in Markdown summaries. Returns the excerpt and, when the
/// output was long enough to spill, the spill path.
///
/// On spill-write failure the excerpt alone is used; the failure is logged
/// and the caller proceeds.
pub fn summarize_output(prefix: &str, name: &str, output: &str) -> (String, Option<PathBuf>) {
    if output.chars().count() <= SUMMARY_EXCERPT_CHARS {
        return (output.to_string(), None);
    }

    let excerpt: String = output.chars().take(SUMMARY_EXCERPT_CHARS).collect();
    match spill_output(prefix, name, output) {
        Ok(path) => (excerpt, Some(path)),
        Err(e) => {
            warn!(name, error = %e, "failed to spill full output, truncating inline");
            (format!("{excerpt}\n\n*(output truncated)*"), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_output_untouched() {
        let shaped = cap_output("hello\nworld");
        assert_eq!(shaped.text, "hello\nworld");
        assert!(!shaped.truncated);
    }

    #[test]
    fn test_line_cap_keeps_newest() {
        let raw: Vec<String> = (0..2500).map(|i| format!("line {i}")).collect();
        let shaped = cap_output(&raw.join("\n"));
        assert!(shaped.truncated);
        let lines: Vec<&str> = shaped.text.split('\n').collect();
        assert_eq!(lines.len(), MAX_OUTPUT_LINES);
        assert_eq!(lines[0], "line 500");
        assert_eq!(lines[lines.len() - 1], "line 2499");
    }

    #[test]
    fn test_byte_cap_halves() {
        let raw = "x".repeat(MAX_OUTPUT_BYTES * 3);
        let shaped = cap_output(&raw);
        assert!(shaped.truncated);
        assert!(shaped.text.len() <= MAX_OUTPUT_BYTES);
    }

    #[test]
    fn test_byte_cap_respects_char_boundaries() {
        // Multibyte content that a naive halving would split mid-codepoint.
        let raw = "é".repeat(MAX_OUTPUT_BYTES);
        let shaped = cap_output(&raw);
        assert!(shaped.truncated);
        assert!(shaped.text.len() <= MAX_OUTPUT_BYTES);
        assert!(shaped.text.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_truncated_iff_cap_reduced() {
        let exactly = "a\n".repeat(MAX_OUTPUT_LINES - 1);
        assert!(!cap_output(&exactly).truncated);
    }

    #[test]
    fn test_custom_caps_override_defaults() {
        let raw = "one\ntwo\nthree\nfour";
        let shaped = cap_output_within(raw, 2, MAX_OUTPUT_BYTES);
        assert!(shaped.truncated);
        assert_eq!(shaped.text, "three\nfour");

        let shaped = cap_output_within(&"x".repeat(100), MAX_OUTPUT_LINES, 32);
        assert!(shaped.truncated);
        assert!(shaped.text.len() <= 32);
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("data fetch #2"), "data-fetch--2");
        assert_eq!(sanitize_name("///"), "task");
        assert_eq!(sanitize_name("ok_name-1"), "ok_name-1");
    }

    #[test]
    fn test_summarize_spills_long_output() {
        let output = "y".repeat(SUMMARY_EXCERPT_CHARS * 2);
        let (excerpt, path) = summarize_output("parallel", "spill-test", &output);
        assert_eq!(excerpt.chars().count(), SUMMARY_EXCERPT_CHARS);
        let path = path.expect("long output should spill");
        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk, output);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_summarize_short_output_inline() {
        let (excerpt, path) = summarize_output("parallel", "short", "small output");
        assert_eq!(excerpt, "small output");
        assert!(path.is_none());
    }
}
