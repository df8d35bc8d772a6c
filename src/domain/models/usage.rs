//! Token and cost accounting for agent runs.

use serde::{Deserialize, Serialize};

/// Accumulated token/cost counters for one or more agent runs.
///
/// Addition is componentwise except `context_tokens`: the child reports a
/// cumulative context size per turn, so the accumulator keeps the most
/// recent value rather than a sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_write: u64,
    pub cost: f64,
    pub context_tokens: u64,
    pub turns: u32,
}

impl UsageStats {
    /// Record one assistant turn reported by the child.
    pub fn record_turn(
        &mut self,
        input: u64,
        output: u64,
        cache_read: u64,
        cache_write: u64,
        cost: f64,
        context_tokens: u64,
    ) {
        self.turns += 1;
        self.input += input;
        self.output += output;
        self.cache_read += cache_read;
        self.cache_write += cache_write;
        self.cost += cost;
        self.context_tokens = context_tokens;
    }

    /// Fold another accumulator into this one (run-level roll-up).
    ///
    /// `context_tokens` takes the max across tasks since each child reports
    /// its own cumulative window.
    pub fn merge(&mut self, other: &UsageStats) {
        self.input += other.input;
        self.output += other.output;
        self.cache_read += other.cache_read;
        self.cache_write += other.cache_write;
        self.cost += other.cost;
        self.context_tokens = self.context_tokens.max(other.context_tokens);
        self.turns += other.turns;
    }

    pub fn total_tokens(&self) -> u64 {
        self.input + self.output
    }

    /// One-line summary used in Markdown roll-ups.
    pub fn summary(&self) -> String {
        format!(
            "{} in / {} out tokens, {} turns, ${:.4}",
            self.input, self.output, self.turns, self.cost
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_turn_accumulates() {
        let mut usage = UsageStats::default();
        usage.record_turn(100, 50, 10, 5, 0.01, 1000);
        usage.record_turn(200, 80, 0, 0, 0.02, 1400);

        assert_eq!(usage.input, 300);
        assert_eq!(usage.output, 130);
        assert_eq!(usage.cache_read, 10);
        assert_eq!(usage.cache_write, 5);
        assert_eq!(usage.turns, 2);
        assert!((usage.cost - 0.03).abs() < 1e-9);
        // Context is a cumulative gauge, not a counter.
        assert_eq!(usage.context_tokens, 1400);
    }

    #[test]
    fn test_merge_takes_max_context() {
        let mut a = UsageStats {
            input: 10,
            context_tokens: 500,
            turns: 1,
            ..Default::default()
        };
        let b = UsageStats {
            input: 20,
            context_tokens: 300,
            turns: 2,
            ..Default::default()
        };
        a.merge(&b);

        assert_eq!(a.input, 30);
        assert_eq!(a.turns, 3);
        assert_eq!(a.context_tokens, 500);
    }
}
