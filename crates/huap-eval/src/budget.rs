use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-grade usage ceilings, expressed as a fraction of the relevant max.
fn default_cost_grade_thresholds() -> BTreeMap<String, f64> {
    [("A", 0.5), ("B", 0.75), ("C", 0.9), ("D", 1.0)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn default_quality_grade_thresholds() -> BTreeMap<String, f64> {
    [("A", 0.95), ("B", 0.85), ("C", 0.75), ("D", 0.65)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn default_required_metrics() -> BTreeMap<String, f64> {
    [("json_valid", 1.0), ("required_fields_present", 1.0)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn default_preferred_metrics() -> BTreeMap<String, f64> {
    [("critique_closed", 0.9)].into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// Token/USD/latency ceilings for a scenario's budget gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostBudget {
    pub tokens_max: u64,
    pub usd_max: f64,
    pub latency_p95_ms: f64,
    pub grade_thresholds: BTreeMap<String, f64>,
}

impl Default for CostBudget {
    fn default() -> Self {
        Self { tokens_max: 100_000, usd_max: 1.0, latency_p95_ms: 30_000.0, grade_thresholds: default_cost_grade_thresholds() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CostResult {
    pub passed: bool,
    pub grade: String,
    pub tokens_pct: f64,
    pub usd_pct: f64,
    pub latency_pct: f64,
    pub max_usage_pct: f64,
}

impl CostBudget {
    pub fn evaluate(&self, tokens: u64, usd: f64, latency_ms: f64) -> CostResult {
        let tokens_pct = if self.tokens_max > 0 { tokens as f64 / self.tokens_max as f64 } else { 0.0 };
        let usd_pct = if self.usd_max > 0.0 { usd / self.usd_max } else { 0.0 };
        let latency_pct = if self.latency_p95_ms > 0.0 { latency_ms / self.latency_p95_ms } else { 0.0 };
        let max_pct = tokens_pct.max(usd_pct).max(latency_pct);

        let mut ordered: Vec<(&String, &f64)> = self.grade_thresholds.iter().collect();
        ordered.sort_by(|a, b| a.1.partial_cmp(b.1).unwrap());
        let grade = ordered
            .iter()
            .find(|(_, threshold)| max_pct <= **threshold)
            .map(|(g, _)| (*g).clone())
            .unwrap_or_else(|| "F".to_string());

        CostResult { passed: max_pct <= 1.0, grade, tokens_pct, usd_pct, latency_pct, max_usage_pct: max_pct }
    }
}

/// Quality-metric thresholds for a scenario's budget gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityBudget {
    pub policy_violations_max: u64,
    pub tool_errors_max: u64,
    pub min_quality_score: f64,
    pub required_metrics: BTreeMap<String, f64>,
    pub preferred_metrics: BTreeMap<String, f64>,
    pub grade_thresholds: BTreeMap<String, f64>,
}

impl Default for QualityBudget {
    fn default() -> Self {
        Self {
            policy_violations_max: 0,
            tool_errors_max: 0,
            min_quality_score: 0.8,
            required_metrics: default_required_metrics(),
            preferred_metrics: default_preferred_metrics(),
            grade_thresholds: default_quality_grade_thresholds(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualityResult {
    pub passed: bool,
    pub hard_fail: bool,
    pub grade: String,
    pub quality_score: f64,
    pub issues: Vec<String>,
}

impl QualityBudget {
    pub fn evaluate(&self, policy_violations: u64, tool_errors: u64, metrics: &BTreeMap<String, f64>) -> QualityResult {
        let mut issues = Vec::new();
        let mut hard_fail = false;

        if policy_violations > self.policy_violations_max {
            hard_fail = true;
            issues.push(format!("policy violations: {policy_violations} > {}", self.policy_violations_max));
        }
        if tool_errors > self.tool_errors_max {
            issues.push(format!("tool errors: {tool_errors} > {}", self.tool_errors_max));
        }
        for (metric, min_val) in &self.required_metrics {
            let actual = metrics.get(metric).copied().unwrap_or(0.0);
            if actual < *min_val {
                issues.push(format!("{metric}: {actual:.2} < {min_val:.2}"));
            }
        }

        let mut scores = Vec::new();
        for (metric, min_val) in &self.required_metrics {
            let actual = metrics.get(metric).copied().unwrap_or(0.0);
            scores.push(if *min_val > 0.0 { (actual / min_val).min(1.0) } else { 1.0 });
        }
        for (metric, target) in &self.preferred_metrics {
            if let Some(actual) = metrics.get(metric) {
                scores.push(if *target > 0.0 { (actual / target).min(1.0) } else { 1.0 });
            }
        }
        if self.tool_errors_max > 0 {
            let error_score = 1.0 - (tool_errors as f64 / (self.tool_errors_max as f64 * 2.0));
            scores.push(error_score.max(0.0));
        }

        let quality_score = if scores.is_empty() { 1.0 } else { scores.iter().sum::<f64>() / scores.len() as f64 };
        if quality_score < self.min_quality_score {
            issues.push(format!("quality score: {quality_score:.2} < {:.2}", self.min_quality_score));
        }

        let grade = if hard_fail {
            "F".to_string()
        } else {
            let mut ordered: Vec<(&String, &f64)> = self.grade_thresholds.iter().collect();
            ordered.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap());
            ordered
                .iter()
                .find(|(_, threshold)| quality_score >= **threshold)
                .map(|(g, _)| (*g).clone())
                .unwrap_or_else(|| if quality_score >= 0.65 { "D".to_string() } else { "F".to_string() })
        };

        let passed = !hard_fail && quality_score >= self.min_quality_score && issues.is_empty();
        QualityResult { passed, hard_fail, grade, quality_score, issues }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetScenario {
    #[serde(default)]
    pub cost: Option<CostBudgetOverride>,
    #[serde(default)]
    pub quality: Option<QualityBudgetOverride>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostBudgetOverride {
    pub tokens_max: Option<u64>,
    pub usd_max: Option<f64>,
    pub latency_p95_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityBudgetOverride {
    pub policy_violations_max: Option<u64>,
    pub tool_errors_max: Option<u64>,
    pub min_quality_score: Option<f64>,
}

/// Full budget config, loadable from YAML/JSON, with per-scenario overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub name: String,
    pub version: String,
    pub cost: CostBudget,
    pub quality: QualityBudget,
    #[serde(default)]
    pub scenarios: BTreeMap<String, BudgetScenario>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self { name: "default".to_string(), version: "0.1".to_string(), cost: CostBudget::default(), quality: QualityBudget::default(), scenarios: BTreeMap::new() }
    }
}

impl BudgetConfig {
    pub fn from_yaml(source: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(source)
    }

    pub fn get_cost_budget(&self, scenario: Option<&str>) -> CostBudget {
        let Some(name) = scenario else { return self.cost.clone() };
        let Some(over) = self.scenarios.get(name).and_then(|s| s.cost.as_ref()) else { return self.cost.clone() };
        CostBudget {
            tokens_max: over.tokens_max.unwrap_or(self.cost.tokens_max),
            usd_max: over.usd_max.unwrap_or(self.cost.usd_max),
            latency_p95_ms: over.latency_p95_ms.unwrap_or(self.cost.latency_p95_ms),
            grade_thresholds: self.cost.grade_thresholds.clone(),
        }
    }

    pub fn get_quality_budget(&self, scenario: Option<&str>) -> QualityBudget {
        let Some(name) = scenario else { return self.quality.clone() };
        let Some(over) = self.scenarios.get(name).and_then(|s| s.quality.as_ref()) else { return self.quality.clone() };
        QualityBudget {
            policy_violations_max: over.policy_violations_max.unwrap_or(self.quality.policy_violations_max),
            tool_errors_max: over.tool_errors_max.unwrap_or(self.quality.tool_errors_max),
            min_quality_score: over.min_quality_score.unwrap_or(self.quality.min_quality_score),
            required_metrics: self.quality.required_metrics.clone(),
            preferred_metrics: self.quality.preferred_metrics.clone(),
            grade_thresholds: self.quality.grade_thresholds.clone(),
        }
    }
}

pub fn default_budget_config() -> BudgetConfig {
    let mut scenarios = BTreeMap::new();
    scenarios.insert(
        "hello".to_string(),
        BudgetScenario {
            cost: Some(CostBudgetOverride { tokens_max: Some(10_000), usd_max: Some(0.10), latency_p95_ms: None }),
            quality: None,
        },
    );
    scenarios.insert(
        "tool_retry".to_string(),
        BudgetScenario { cost: None, quality: Some(QualityBudgetOverride { policy_violations_max: None, tool_errors_max: Some(1), min_quality_score: None }) },
    );

    BudgetConfig {
        name: "default".to_string(),
        version: "0.1".to_string(),
        cost: CostBudget { tokens_max: 50_000, usd_max: 0.50, latency_p95_ms: 15_000.0, grade_thresholds: default_cost_grade_thresholds() },
        quality: QualityBudget {
            policy_violations_max: 0,
            tool_errors_max: 0,
            min_quality_score: 0.8,
            required_metrics: [("json_valid".to_string(), 1.0)].into_iter().collect(),
            preferred_metrics: [("critique_closed".to_string(), 0.9)].into_iter().collect(),
            grade_thresholds: default_quality_grade_thresholds(),
        },
        scenarios,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_budget_grades_by_worst_dimension() {
        let budget = CostBudget::default();
        let result = budget.evaluate(40_000, 0.1, 100.0);
        assert_eq!(result.grade, "B");
        assert!(result.passed);
    }

    #[test]
    fn cost_budget_fails_over_100_pct() {
        let budget = CostBudget::default();
        let result = budget.evaluate(150_000, 0.1, 100.0);
        assert_eq!(result.grade, "F");
        assert!(!result.passed);
    }

    #[test]
    fn quality_budget_hard_fails_on_policy_violation() {
        let budget = QualityBudget::default();
        let result = budget.evaluate(1, 0, &BTreeMap::new());
        assert!(result.hard_fail);
        assert_eq!(result.grade, "F");
        assert!(!result.passed);
    }

    #[test]
    fn scenario_override_narrows_cost_budget() {
        let config = default_budget_config();
        let hello_budget = config.get_cost_budget(Some("hello"));
        assert_eq!(hello_budget.tokens_max, 10_000);
        let default_budget = config.get_cost_budget(None);
        assert_eq!(default_budget.tokens_max, 50_000);
    }
}
