use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Info,
    Warn,
    Fail,
}

/// Loadable thresholds for the differ's default verdict policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffPolicy {
    pub fail_on_new_error: bool,
    pub fail_on_new_policy_violation: bool,
    pub fail_on_new_tool_error: bool,
    pub fail_on_cost_delta: bool,
    pub cost_delta_pct_threshold: f64,
    pub quality_regression_threshold: f64,
    pub fail_on_state_hash_mismatch: bool,
}

impl Default for DiffPolicy {
    fn default() -> Self {
        Self {
            fail_on_new_error: true,
            fail_on_new_policy_violation: true,
            fail_on_new_tool_error: true,
            fail_on_cost_delta: true,
            cost_delta_pct_threshold: 20.0,
            quality_regression_threshold: 0.1,
            fail_on_state_hash_mismatch: true,
        }
    }
}

impl DiffPolicy {
    pub fn from_yaml(source: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(source)
    }

    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_fails_on_new_error() {
        assert!(DiffPolicy::default().fail_on_new_error);
    }

    #[test]
    fn yaml_can_soften_thresholds() {
        let policy = DiffPolicy::from_yaml("cost_delta_pct_threshold: 50.0\nfail_on_new_error: false\n").unwrap();
        assert_eq!(policy.cost_delta_pct_threshold, 50.0);
        assert!(!policy.fail_on_new_error);
    }
}
