use huap_trace::TraceRun;
use huap_types::EventName;

use crate::align::{align_and_diff, EventDiff};
use crate::deltas::{CostDelta, QualityDelta};
use crate::policy::{DiffPolicy, Verdict};

#[derive(Debug, Clone)]
pub struct DiffReport {
    pub event_diffs: Vec<EventDiff>,
    pub cost_delta: CostDelta,
    pub quality_delta: QualityDelta,
    pub regressions: Vec<String>,
    pub verdict: Verdict,
    pub replay_state_mismatch: bool,
}

/// Compares a baseline trace against a candidate.
pub struct TraceDiffer {
    policy: DiffPolicy,
}

impl TraceDiffer {
    pub fn new(policy: DiffPolicy) -> Self {
        Self { policy }
    }

    pub fn diff(&self, baseline: &TraceRun, candidate: &TraceRun) -> DiffReport {
        self.diff_with_replay_mismatch(baseline, candidate, false)
    }

    pub fn diff_with_replay_mismatch(&self, baseline: &TraceRun, candidate: &TraceRun, replay_state_mismatch: bool) -> DiffReport {
        let event_diffs = align_and_diff(baseline, candidate);
        let cost_delta = CostDelta::between(&baseline.cost_summary, &candidate.cost_summary);
        let quality_delta = QualityDelta::between(baseline, candidate);

        let mut regressions = Vec::new();
        let mut verdict = Verdict::Info;
        let mut bump = |v: Verdict, msg: String, regressions: &mut Vec<String>, verdict: &mut Verdict| {
            regressions.push(msg);
            if v > *verdict {
                *verdict = v;
            }
        };

        let new_errors: Vec<_> = event_diffs
            .iter()
            .filter(|d| matches!(d, EventDiff::Added { name: EventName::Error, .. }))
            .collect();
        if self.policy.fail_on_new_error && !new_errors.is_empty() {
            bump(Verdict::Fail, format!("{} new error event(s)", new_errors.len()), &mut regressions, &mut verdict);
        }

        if self.policy.fail_on_new_policy_violation && quality_delta.policy_violation_delta > 0 {
            bump(
                Verdict::Fail,
                format!("policy violations increased by {}", quality_delta.policy_violation_delta),
                &mut regressions,
                &mut verdict,
            );
        }

        if quality_delta.tool_error_delta > 0 {
            let verdict_for_tool_error = if self.policy.fail_on_new_tool_error { Verdict::Fail } else { Verdict::Warn };
            bump(verdict_for_tool_error, format!("tool errors increased by {}", quality_delta.tool_error_delta), &mut regressions, &mut verdict);
        }

        let cost_pct = cost_delta.usd_delta_pct(baseline.cost_summary.usd);
        if cost_pct > self.policy.cost_delta_pct_threshold {
            let verdict_for_cost = if self.policy.fail_on_cost_delta { Verdict::Fail } else { Verdict::Warn };
            bump(verdict_for_cost, format!("cost increased {cost_pct:.1}%"), &mut regressions, &mut verdict);
        }

        for (metric, delta) in &quality_delta.metric_deltas {
            if *delta < -self.policy.quality_regression_threshold {
                bump(Verdict::Fail, format!("quality metric {metric} regressed by {delta:.3}"), &mut regressions, &mut verdict);
            }
        }

        if replay_state_mismatch && self.policy.fail_on_state_hash_mismatch {
            bump(Verdict::Fail, "replay terminal state hash mismatch".to_string(), &mut regressions, &mut verdict);
        }

        DiffReport { event_diffs, cost_delta, quality_delta, regressions, verdict, replay_state_mismatch }
    }

    pub fn to_markdown(&self, report: &DiffReport) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Trace Diff — verdict: {:?}\n\n", report.verdict));
        out.push_str(&format!(
            "- cost delta: {:+.4} USD ({:+} tokens)\n- quality: {:+} policy violations, {:+} tool errors\n\n",
            report.cost_delta.usd_delta,
            report.cost_delta.token_delta,
            report.quality_delta.policy_violation_delta,
            report.quality_delta.tool_error_delta,
        ));
        if report.regressions.is_empty() {
            out.push_str("No regressions detected.\n");
        } else {
            out.push_str("## Regressions\n\n");
            for regression in &report.regressions {
                out.push_str(&format!("- {regression}\n"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huap_trace::CostSummary;
    use huap_types::{RunId, SpanId, TraceEvent};
    use serde_json::{json, Map};

    fn run_with(events: Vec<TraceEvent>) -> TraceRun {
        TraceRun { run_id: RunId::new(), events, cost_summary: CostSummary::default(), error_events: vec![] }
    }

    fn tool_result(status: &str, error: Option<&str>) -> TraceEvent {
        let mut data = Map::new();
        data.insert("tool".to_string(), json!("x"));
        data.insert("status".to_string(), json!(status));
        if let Some(e) = error {
            data.insert("error".to_string(), json!(e));
        }
        TraceEvent::new(RunId::new(), SpanId::new(), None, EventName::ToolResult, data)
    }

    #[test]
    fn new_tool_error_fails() {
        let baseline = run_with(vec![tool_result("ok", None)]);
        let candidate = run_with(vec![tool_result("error", Some("boom"))]);
        let differ = TraceDiffer::new(DiffPolicy::default());
        let report = differ.diff(&baseline, &candidate);
        assert_eq!(report.verdict, Verdict::Fail);
        assert!(report.regressions.iter().any(|r| r.contains("tool errors")));
    }

    #[test]
    fn new_error_event_fails() {
        let baseline = run_with(vec![]);
        let error_event = TraceEvent::new(RunId::new(), SpanId::new(), None, EventName::Error, Map::new());
        let candidate = run_with(vec![error_event]);
        let differ = TraceDiffer::new(DiffPolicy::default());
        let report = differ.diff(&baseline, &candidate);
        assert_eq!(report.verdict, Verdict::Fail);
    }

    #[test]
    fn no_changes_is_info() {
        let baseline = run_with(vec![tool_result("ok", None)]);
        let candidate = run_with(vec![tool_result("ok", None)]);
        let differ = TraceDiffer::new(DiffPolicy::default());
        let report = differ.diff(&baseline, &candidate);
        assert_eq!(report.verdict, Verdict::Info);
        assert!(report.regressions.is_empty());
    }

    #[test]
    fn markdown_lists_regressions() {
        let baseline = run_with(vec![]);
        let error_event = TraceEvent::new(RunId::new(), SpanId::new(), None, EventName::Error, Map::new());
        let candidate = run_with(vec![error_event]);
        let differ = TraceDiffer::new(DiffPolicy::default());
        let report = differ.diff(&baseline, &candidate);
        let markdown = differ.to_markdown(&report);
        assert!(markdown.contains("Regressions"));
    }
}
