use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use huap_trace::TraceRun;
use huap_types::EventName;
use serde::Serialize;

use crate::budget::BudgetConfig;

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    Load(#[from] huap_trace::RunLoadError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

struct ExtractedMetrics {
    tokens_total: u64,
    usd_total: f64,
    latency_total_ms: f64,
    policy_violations: u64,
    tool_errors: u64,
    quality_metrics: BTreeMap<String, f64>,
}

/// Walks a trace's events once, pulling the raw figures budgets are graded
/// against.
fn extract_metrics(run: &TraceRun) -> ExtractedMetrics {
    let mut tokens_total = 0u64;
    let mut usd_total = 0.0f64;
    let mut latency_total_ms = 0.0f64;
    let mut policy_violations = 0u64;
    let mut tool_errors = 0u64;
    let mut quality_metrics = BTreeMap::new();

    for event in &run.events {
        match event.name {
            EventName::CostRecord => {
                tokens_total += event.data_field("tokens").and_then(|v| v.as_u64()).unwrap_or(0);
                usd_total += event.data_field("usd").and_then(|v| v.as_f64()).unwrap_or(0.0);
            }
            EventName::LlmResponse => {
                if let Some(usage) = event.data_field("usage") {
                    tokens_total += usage.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
                }
                latency_total_ms += event.data_field("duration_ms").and_then(|v| v.as_f64()).unwrap_or(0.0);
            }
            EventName::PolicyCheck => {
                if event.data_field("decision").and_then(|v| v.as_str()) == Some("deny") {
                    policy_violations += 1;
                }
            }
            EventName::ToolResult => {
                if event.data_field("status").and_then(|v| v.as_str()) == Some("error") {
                    tool_errors += 1;
                }
            }
            EventName::QualityRecord => {
                let metric = event.data_field("metric").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
                let value = event.data_field("value").and_then(|v| v.as_f64()).unwrap_or(0.0);
                quality_metrics.insert(metric, value);
            }
            _ => {}
        }
    }

    if usd_total == 0.0 && tokens_total > 0 {
        usd_total = tokens_total as f64 * 0.000_002;
    }

    if !quality_metrics.contains_key("json_valid") {
        let completed_ok = run.run_end().and_then(|e| e.data_field("status")).and_then(|v| v.as_str()) == Some("success");
        quality_metrics.insert("json_valid".to_string(), if completed_ok { 1.0 } else { 0.0 });
    }

    ExtractedMetrics { tokens_total, usd_total, latency_total_ms, policy_violations, tool_errors, quality_metrics }
}

/// Weights quality slightly higher than cost (60/40).
fn combine_grades(cost_grade: &str, quality_grade: &str) -> String {
    let value = |g: &str| match g {
        "A" => 4,
        "B" => 3,
        "C" => 2,
        "D" => 1,
        _ => 0,
    };
    let combined = value(quality_grade) as f64 * 0.6 + value(cost_grade) as f64 * 0.4;
    match combined.round() as i64 {
        4 => "A",
        3 => "B",
        2 => "C",
        1 => "D",
        _ => "F",
    }
    .to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalResult {
    pub trace_path: String,
    pub run_id: String,
    pub scenario: Option<String>,
    pub passed: bool,
    pub cost_passed: bool,
    pub quality_passed: bool,
    pub cost_grade: String,
    pub quality_grade: String,
    pub overall_grade: String,
    pub tokens_total: u64,
    pub usd_total: f64,
    pub latency_total_ms: f64,
    pub policy_violations: u64,
    pub tool_errors: u64,
    pub quality_score: f64,
    pub quality_metrics: BTreeMap<String, f64>,
    pub issues: Vec<String>,
}

/// Grades a single trace against a budget configuration.
pub struct Evaluator {
    budget: BudgetConfig,
}

impl Evaluator {
    pub fn new(budget: BudgetConfig) -> Self {
        Self { budget }
    }

    pub fn evaluate_trace(&self, trace_path: impl AsRef<Path>, scenario: Option<&str>) -> Result<EvalResult, EvalError> {
        let trace_path = trace_path.as_ref();
        let run = TraceRun::load(trace_path)?;
        let metrics = extract_metrics(&run);

        let cost_budget = self.budget.get_cost_budget(scenario);
        let quality_budget = self.budget.get_quality_budget(scenario);

        let cost_result = cost_budget.evaluate(metrics.tokens_total, metrics.usd_total, metrics.latency_total_ms);
        let quality_result = quality_budget.evaluate(metrics.policy_violations, metrics.tool_errors, &metrics.quality_metrics);

        let mut issues = Vec::new();
        if !cost_result.passed {
            issues.push(format!("cost budget exceeded: {:.1}% of budget", cost_result.max_usage_pct * 100.0));
        }
        issues.extend(quality_result.issues.iter().cloned());

        let overall_grade = combine_grades(&cost_result.grade, &quality_result.grade);

        Ok(EvalResult {
            trace_path: trace_path.display().to_string(),
            run_id: run.run_id.to_string(),
            scenario: scenario.map(str::to_string),
            passed: cost_result.passed && quality_result.passed,
            cost_passed: cost_result.passed,
            quality_passed: quality_result.passed,
            cost_grade: cost_result.grade,
            quality_grade: quality_result.grade,
            overall_grade,
            tokens_total: metrics.tokens_total,
            usd_total: metrics.usd_total,
            latency_total_ms: metrics.latency_total_ms,
            policy_violations: metrics.policy_violations,
            tool_errors: metrics.tool_errors,
            quality_score: quality_result.quality_score,
            quality_metrics: metrics.quality_metrics,
            issues,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EvalReport {
    pub suite_name: String,
    pub budget_name: String,
    pub results: Vec<EvalResult>,
    pub total_traces: u64,
    pub passed_traces: u64,
    pub failed_traces: u64,
    pub cost_grades: BTreeMap<String, u64>,
    pub quality_grades: BTreeMap<String, u64>,
}

impl EvalReport {
    pub fn new(suite_name: &str, budget_name: &str) -> Self {
        Self { suite_name: suite_name.to_string(), budget_name: budget_name.to_string(), ..Default::default() }
    }

    pub fn add_result(&mut self, result: EvalResult) {
        self.total_traces += 1;
        if result.passed {
            self.passed_traces += 1;
        } else {
            self.failed_traces += 1;
        }
        *self.cost_grades.entry(result.cost_grade.clone()).or_insert(0) += 1;
        *self.quality_grades.entry(result.quality_grade.clone()).or_insert(0) += 1;
        self.results.push(result);
    }

    pub fn passed(&self) -> bool {
        self.failed_traces == 0
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total_traces == 0 {
            0.0
        } else {
            (self.passed_traces as f64 / self.total_traces as f64) * 100.0
        }
    }
}

/// Batch-evaluates every trace file in a directory.
pub struct SuiteRunner {
    budget: BudgetConfig,
}

impl SuiteRunner {
    pub fn new(budget: BudgetConfig) -> Self {
        Self { budget }
    }

    pub fn run_suite(&self, suite_dir: impl AsRef<Path>, scenario_map: &BTreeMap<String, String>) -> Result<EvalReport, EvalError> {
        let suite_dir = suite_dir.as_ref();
        let evaluator = Evaluator::new(self.budget.clone());
        let mut report = EvalReport::new(
            suite_dir.file_name().and_then(|n| n.to_str()).unwrap_or("suite"),
            &self.budget.name,
        );

        let mut trace_files: Vec<PathBuf> = std::fs::read_dir(suite_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
            .collect();
        trace_files.sort();

        for path in trace_files {
            let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let scenario = scenario_map.get(filename).cloned().or_else(|| {
                self.budget.scenarios.keys().find(|name| filename.contains(name.as_str())).cloned()
            });

            match evaluator.evaluate_trace(&path, scenario.as_deref()) {
                Ok(result) => report.add_result(result),
                Err(err) => report.add_result(EvalResult {
                    trace_path: path.display().to_string(),
                    run_id: "unknown".to_string(),
                    scenario,
                    passed: false,
                    cost_passed: false,
                    quality_passed: false,
                    cost_grade: "F".to_string(),
                    quality_grade: "F".to_string(),
                    overall_grade: "F".to_string(),
                    tokens_total: 0,
                    usd_total: 0.0,
                    latency_total_ms: 0.0,
                    policy_violations: 0,
                    tool_errors: 0,
                    quality_score: 0.0,
                    quality_metrics: BTreeMap::new(),
                    issues: vec![format!("failed to evaluate: {err}")],
                }),
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huap_trace::{TraceService, TraceServiceConfig};
    use serde_json::json;

    fn write_hello_trace(dir: &Path) -> PathBuf {
        let path = dir.join("hello.trace.jsonl");
        let config = TraceServiceConfig { output_dir: dir.to_path_buf(), ..TraceServiceConfig::default() };
        let mut svc = TraceService::new(config).unwrap();
        svc.start_run(None, None, None, Some(json!({"message": "hi"})), None, None, Some(&path)).unwrap();
        svc.llm_request("gpt-test", json!([{"role": "user", "content": "hi"}]), None, None, "test");
        svc.llm_response("gpt-test", "hello back", json!({"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}), 120, "test");
        svc.end_run("success", Some(json!({"message": "hi"})), None);
        path
    }

    #[test]
    fn hello_trace_grades_within_hello_scenario_budget() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_hello_trace(dir.path());
        let evaluator = Evaluator::new(crate::budget::default_budget_config());
        let result = evaluator.evaluate_trace(&path, Some("hello")).unwrap();
        assert!(result.passed, "issues: {:?}", result.issues);
        assert_eq!(result.overall_grade, "A");
    }

    #[test]
    fn suite_runner_aggregates_pass_rate() {
        let dir = tempfile::tempdir().unwrap();
        write_hello_trace(dir.path());
        let runner = SuiteRunner::new(crate::budget::default_budget_config());
        let report = runner.run_suite(dir.path(), &BTreeMap::new()).unwrap();
        assert_eq!(report.total_traces, 1);
        assert_eq!(report.pass_rate(), 100.0);
    }

    #[test]
    fn combine_grades_weights_quality_higher() {
        assert_eq!(combine_grades("D", "A"), "B");
        assert_eq!(combine_grades("A", "A"), "A");
    }
}
