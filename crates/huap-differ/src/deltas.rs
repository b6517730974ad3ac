use huap_trace::{CostSummary, TraceRun};
use huap_types::EventName;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostDelta {
    pub token_delta: i64,
    pub usd_delta: f64,
    pub latency_delta_ms: i64,
}

impl CostDelta {
    pub fn between(baseline: &CostSummary, candidate: &CostSummary) -> Self {
        Self {
            token_delta: candidate.total_tokens as i64 - baseline.total_tokens as i64,
            usd_delta: candidate.usd - baseline.usd,
            latency_delta_ms: candidate.cumulative_latency_ms as i64 - baseline.cumulative_latency_ms as i64,
        }
    }

    /// Percentage cost change relative to the baseline, used against the
    /// policy's `cost_delta_pct_threshold`.
    pub fn usd_delta_pct(&self, baseline_usd: f64) -> f64 {
        if baseline_usd <= 0.0 {
            if self.usd_delta > 0.0 { f64::INFINITY } else { 0.0 }
        } else {
            (self.usd_delta / baseline_usd) * 100.0
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualityDelta {
    pub policy_violation_delta: i64,
    pub tool_error_delta: i64,
    pub metric_deltas: Vec<(String, f64)>,
}

impl QualityDelta {
    pub fn between(baseline: &TraceRun, candidate: &TraceRun) -> Self {
        let baseline_violations = count_policy_denials(baseline);
        let candidate_violations = count_policy_denials(candidate);
        let baseline_errors = count_tool_errors(baseline);
        let candidate_errors = count_tool_errors(candidate);
        Self {
            policy_violation_delta: candidate_violations as i64 - baseline_violations as i64,
            tool_error_delta: candidate_errors as i64 - baseline_errors as i64,
            metric_deltas: metric_deltas(baseline, candidate),
        }
    }
}

fn count_policy_denials(run: &TraceRun) -> usize {
    run.events
        .iter()
        .filter(|e| matches!(e.name, EventName::PolicyCheck))
        .filter(|e| e.data_field("decision").and_then(|v| v.as_str()) == Some("deny"))
        .count()
}

fn count_tool_errors(run: &TraceRun) -> usize {
    run.events
        .iter()
        .filter(|e| matches!(e.name, EventName::ToolResult))
        .filter(|e| e.data_field("status").and_then(|v| v.as_str()) == Some("error"))
        .count()
}

fn metric_values(run: &TraceRun) -> std::collections::HashMap<String, f64> {
    let mut out = std::collections::HashMap::new();
    for event in &run.events {
        if matches!(event.name, EventName::QualityRecord) {
            if let (Some(metric), Some(value)) = (
                event.data_field("metric").and_then(|v| v.as_str()),
                event.data_field("value").and_then(|v| v.as_f64()),
            ) {
                out.insert(metric.to_string(), value);
            }
        }
    }
    out
}

fn metric_deltas(baseline: &TraceRun, candidate: &TraceRun) -> Vec<(String, f64)> {
    let base = metric_values(baseline);
    let cand = metric_values(candidate);
    let mut keys: Vec<&String> = base.keys().chain(cand.keys()).collect();
    keys.sort();
    keys.dedup();
    keys.into_iter()
        .map(|k| (k.clone(), cand.get(k).copied().unwrap_or(0.0) - base.get(k).copied().unwrap_or(0.0)))
        .collect()
}
