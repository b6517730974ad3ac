use std::collections::HashMap;

use huap_trace::TraceRun;
use huap_types::{EventName, TraceEvent, EPHEMERAL_FIELDS};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub baseline: Value,
    pub candidate: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventDiff {
    Added { name: EventName, ordinal: usize },
    Removed { name: EventName, ordinal: usize },
    Changed { name: EventName, ordinal: usize, fields: Vec<FieldChange> },
}

fn group_by_name(run: &TraceRun) -> HashMap<EventName, Vec<&TraceEvent>> {
    let mut groups: HashMap<EventName, Vec<&TraceEvent>> = HashMap::new();
    for event in &run.events {
        groups.entry(event.name).or_default().push(event);
    }
    groups
}

/// Aligns by `(name, ordinal-within-name)` — spans/timestamps are never used
/// for alignment to avoid spurious differences.
pub fn align_and_diff(baseline: &TraceRun, candidate: &TraceRun) -> Vec<EventDiff> {
    let base_groups = group_by_name(baseline);
    let cand_groups = group_by_name(candidate);

    let mut names: Vec<EventName> = base_groups.keys().chain(cand_groups.keys()).copied().collect();
    names.sort_by_key(|n| format!("{n:?}"));
    names.dedup();

    let mut diffs = Vec::new();
    for name in names {
        let empty = Vec::new();
        let base_events = base_groups.get(&name).unwrap_or(&empty);
        let cand_events = cand_groups.get(&name).unwrap_or(&empty);
        let max_len = base_events.len().max(cand_events.len());
        for ordinal in 0..max_len {
            match (base_events.get(ordinal), cand_events.get(ordinal)) {
                (Some(b), Some(c)) => {
                    let fields = diff_fields(b, c);
                    if !fields.is_empty() {
                        diffs.push(EventDiff::Changed { name, ordinal, fields });
                    }
                }
                (Some(_), None) => diffs.push(EventDiff::Removed { name, ordinal }),
                (None, Some(_)) => diffs.push(EventDiff::Added { name, ordinal }),
                (None, None) => unreachable!(),
            }
        }
    }
    diffs
}

fn diff_fields(baseline: &TraceEvent, candidate: &TraceEvent) -> Vec<FieldChange> {
    let mut keys: Vec<&String> = baseline.data.keys().chain(candidate.data.keys()).collect();
    keys.sort();
    keys.dedup();
    keys.into_iter()
        .filter(|k| !EPHEMERAL_FIELDS.contains(&k.as_str()))
        .filter_map(|key| {
            let b = baseline.data.get(key).cloned().unwrap_or(Value::Null);
            let c = candidate.data.get(key).cloned().unwrap_or(Value::Null);
            if b != c {
                Some(FieldChange { field: key.clone(), baseline: b, candidate: c })
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use huap_trace::CostSummary;
    use huap_types::{RunId, SpanId};
    use serde_json::{json, Map};

    fn run_with(events: Vec<TraceEvent>) -> TraceRun {
        TraceRun { run_id: RunId::new(), events, cost_summary: CostSummary::default(), error_events: vec![] }
    }

    fn tool_result(status: &str) -> TraceEvent {
        let mut data = Map::new();
        data.insert("tool".to_string(), json!("x"));
        data.insert("status".to_string(), json!(status));
        TraceEvent::new(RunId::new(), SpanId::new(), None, EventName::ToolResult, data)
    }

    #[test]
    fn drift_detection_flags_changed_status() {
        let baseline = run_with(vec![tool_result("ok")]);
        let candidate = run_with(vec![tool_result("error")]);
        let diffs = align_and_diff(&baseline, &candidate);
        assert_eq!(diffs.len(), 1);
        match &diffs[0] {
            EventDiff::Changed { fields, .. } => {
                assert!(fields.iter().any(|f| f.field == "status"));
            }
            other => panic!("expected Changed, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_counts_produce_added_or_removed() {
        let baseline = run_with(vec![]);
        let candidate = run_with(vec![tool_result("ok")]);
        let diffs = align_and_diff(&baseline, &candidate);
        assert_eq!(diffs, vec![EventDiff::Added { name: EventName::ToolResult, ordinal: 0 }]);
    }
}
