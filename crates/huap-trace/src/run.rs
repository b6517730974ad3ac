use std::path::Path;

use huap_types::{EventName, RunId, TraceEvent};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum RunLoadError {
    #[error("failed to read trace file: {0}")]
    Io(#[from] std::io::Error),
}

/// Aggregated cost figures derived from a loaded run's `cost_record` and
/// `llm_response.usage` events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostSummary {
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub usd: f64,
    pub cumulative_latency_ms: u64,
    pub llm_call_count: u64,
}

/// A reconstructed trace bundle, loadable from a JSONL file and tolerant of a
/// truncated last line (the last line of a JSONL file that is still being
/// appended to can be cut off mid-write; it is skipped rather than failing
/// the whole load).
#[derive(Debug, Clone)]
pub struct TraceRun {
    pub run_id: RunId,
    pub events: Vec<TraceEvent>,
    pub cost_summary: CostSummary,
    pub error_events: Vec<TraceEvent>,
}

impl TraceRun {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RunLoadError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::from_jsonl(&contents))
    }

    /// Parses a JSONL trace, skipping any line that fails to parse (the
    /// tolerated truncated-last-line case) rather than failing the whole load.
    pub fn from_jsonl(contents: &str) -> Self {
        let mut events = Vec::new();
        for line in contents.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<TraceEvent>(trimmed) {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }
        let run_id = events
            .first()
            .map(|e| e.run_id.clone())
            .unwrap_or_else(RunId::new);
        let cost_summary = derive_cost_summary(&events);
        let error_events = events
            .iter()
            .filter(|e| matches!(e.name, EventName::Error))
            .cloned()
            .collect();
        Self { run_id, events, cost_summary, error_events }
    }

    pub fn run_start(&self) -> Option<&TraceEvent> {
        self.events.first().filter(|e| matches!(e.name, EventName::RunStart))
    }

    pub fn run_end(&self) -> Option<&TraceEvent> {
        self.events.last().filter(|e| matches!(e.name, EventName::RunEnd))
    }

    pub fn is_complete(&self) -> bool {
        self.run_start().is_some() && self.run_end().is_some()
    }

    /// Returns every `tool_call`/`llm_request` event that has no matching
    /// `tool_result`/`llm_response` event with the same `span_id` later in
    /// the run.
    pub fn unmatched_calls(&self) -> Vec<&TraceEvent> {
        let mut unmatched = Vec::new();
        for (i, event) in self.events.iter().enumerate() {
            let expects = match event.name {
                EventName::ToolCall => Some(EventName::ToolResult),
                EventName::LlmRequest => Some(EventName::LlmResponse),
                _ => None,
            };
            let Some(expected_name) = expects else { continue };
            let has_match = self.events[i + 1..]
                .iter()
                .any(|candidate| candidate.span_id == event.span_id && candidate.name == expected_name);
            if !has_match {
                unmatched.push(event);
            }
        }
        unmatched
    }
}

fn derive_cost_summary(events: &[TraceEvent]) -> CostSummary {
    let mut summary = CostSummary::default();
    for event in events {
        match event.name {
            EventName::CostRecord => {
                summary.usd += value_f64(event.data_field("usd"));
                summary.total_tokens += value_u64(event.data_field("tokens"));
            }
            EventName::LlmResponse => {
                summary.llm_call_count += 1;
                summary.cumulative_latency_ms += value_u64(event.data_field("duration_ms"));
                if let Some(usage) = event.data_field("usage") {
                    summary.prompt_tokens += value_u64(usage.get("prompt_tokens"));
                    summary.completion_tokens += value_u64(usage.get("completion_tokens"));
                }
            }
            _ => {}
        }
    }
    summary
}

fn value_u64(value: Option<&Value>) -> u64 {
    value.and_then(Value::as_u64).unwrap_or(0)
}

fn value_f64(value: Option<&Value>) -> f64 {
    value.and_then(Value::as_f64).unwrap_or(0.0)
}

/// Normalises a pod name by stripping a leading `hu-`/`hu_` prefix.
pub fn normalize_pod_name(pod: &str) -> String {
    pod.strip_prefix("hu-")
        .or_else(|| pod.strip_prefix("hu_"))
        .unwrap_or(pod)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerates_truncated_last_line() {
        let good = r#"{"v":"0.1","ts":"2026-01-01T00:00:00Z","run_id":"run_aaaaaaaaaaaa","span_id":"sp_bbbbbbbbbbbb","kind":"lifecycle","name":"run_start","data":{}}"#;
        let truncated = r#"{"v":"0.1","ts":"2026-01-01T00:00:01"#;
        let contents = format!("{good}\n{truncated}");
        let run = TraceRun::from_jsonl(&contents);
        assert_eq!(run.events.len(), 1);
    }

    #[test]
    fn normalizes_pod_prefix() {
        assert_eq!(normalize_pod_name("hu-foo"), "foo");
        assert_eq!(normalize_pod_name("hu_foo"), "foo");
        assert_eq!(normalize_pod_name("bar"), "bar");
    }

    #[test]
    fn empty_run_has_no_cost() {
        let run = TraceRun::from_jsonl("");
        assert_eq!(run.cost_summary, CostSummary::default());
    }
}
