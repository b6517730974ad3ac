use serde::{Deserialize, Serialize};

use crate::registry::{ModelRegistry, ModelSpec};

#[derive(Debug, thiserror::Error)]
#[error("no model matches constraints {filters_applied:?}; registry has {registry_size} model(s)")]
pub struct NoCandidate {
    pub filters_applied: Vec<String>,
    pub registry_size: usize,
}

/// A single routing rule loaded from a policy YAML.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RouterRule {
    pub name: String,
    #[serde(default)]
    pub when: RuleCondition,
    #[serde(default)]
    pub prefer: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuleCondition {
    pub capability: Option<String>,
    pub privacy: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PolicyFile {
    rules: Vec<RouterRule>,
}

/// Outcome of a routing decision, with the reasoning kept attached so the
/// choice can be explained, not just returned.
#[derive(Debug, Clone, Serialize)]
pub struct RouterDecision {
    pub model_id: String,
    pub provider: String,
    pub rule_name: String,
    pub reason: String,
    pub candidates_considered: usize,
    pub filters_applied: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouterExplanation {
    pub selected: Option<RouterDecision>,
    pub error: Option<String>,
    pub all_models: Vec<ModelSpec>,
}

/// Deterministic rule-based model router: rules are evaluated in declaration
/// order, ties break by `prefer` list position then by a cheapest-then-id
/// fallback sort.
pub struct ModelRouter {
    registry: ModelRegistry,
    rules: Vec<RouterRule>,
}

impl ModelRouter {
    pub fn new(registry: ModelRegistry, rules: Vec<RouterRule>) -> Self {
        Self { registry, rules }
    }

    pub fn load_rules_yaml(source: &str) -> Result<Vec<RouterRule>, serde_yaml::Error> {
        let file: PolicyFile = serde_yaml::from_str(source)?;
        Ok(file.rules)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn select(
        &self,
        capability: &str,
        privacy: &str,
        max_usd_est: Option<f64>,
        providers_allow: Option<&[String]>,
        models_allow: Option<&[String]>,
    ) -> Result<RouterDecision, NoCandidate> {
        let mut filters = vec![format!("capability={capability}"), format!("privacy={privacy}")];
        if let Some(max) = max_usd_est {
            filters.push(format!("max_usd_est={max}"));
        }
        if let Some(allow) = providers_allow {
            filters.push(format!("providers_allow={allow:?}"));
        }
        if let Some(allow) = models_allow {
            filters.push(format!("models_allow={allow:?}"));
        }

        let mut candidates = self.registry.filter(Some(capability), Some(privacy), max_usd_est, providers_allow, models_allow);
        let total_candidates = candidates.len();

        if candidates.is_empty() {
            return Err(NoCandidate { filters_applied: filters, registry_size: self.registry.list().len() });
        }

        for rule in &self.rules {
            if !rule_matches(rule, capability, privacy) {
                continue;
            }
            for preferred_id in &rule.prefer {
                if let Some(model) = candidates.iter().find(|c| &c.id == preferred_id) {
                    return Ok(RouterDecision {
                        model_id: model.id.clone(),
                        provider: model.provider.clone(),
                        rule_name: rule.name.clone(),
                        reason: format!("matched rule '{}', preferred model '{}'", rule.name, model.id),
                        candidates_considered: total_candidates,
                        filters_applied: filters,
                    });
                }
            }
        }

        candidates.sort_by(|a, b| a.usd_per_1k_tokens_est.partial_cmp(&b.usd_per_1k_tokens_est).unwrap().then_with(|| a.id.cmp(&b.id)));
        let chosen = candidates[0];
        Ok(RouterDecision {
            model_id: chosen.id.clone(),
            provider: chosen.provider.clone(),
            rule_name: "__fallback".to_string(),
            reason: format!("no matching rule; cheapest candidate '{}'", chosen.id),
            candidates_considered: total_candidates,
            filters_applied: filters,
        })
    }

    /// Supplements [`ModelRouter::select`] with a human-readable explanation
    /// surfaced to a CLI/debugging caller even on failure.
    pub fn explain(&self, capability: &str, privacy: &str, max_usd_est: Option<f64>) -> RouterExplanation {
        let all_models: Vec<ModelSpec> = self.registry.list().into_iter().cloned().collect();
        match self.select(capability, privacy, max_usd_est, None, None) {
            Ok(decision) => RouterExplanation { selected: Some(decision), error: None, all_models },
            Err(err) => RouterExplanation { selected: None, error: Some(err.to_string()), all_models },
        }
    }
}

fn rule_matches(rule: &RouterRule, capability: &str, privacy: &str) -> bool {
    if let Some(want) = &rule.when.capability {
        if want != capability {
            return false;
        }
    }
    if let Some(want) = &rule.when.privacy {
        if want != privacy {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_preference_wins_over_cheapest_fallback() {
        let rules = vec![RouterRule {
            name: "prefer_openai".to_string(),
            when: RuleCondition { capability: Some("chat".to_string()), privacy: None },
            prefer: vec!["openai_gpt4omini_chat".to_string()],
        }];
        let router = ModelRouter::new(ModelRegistry::default(), rules);
        let decision = router.select("chat", "cloud_ok", None, None, None).unwrap();
        assert_eq!(decision.model_id, "openai_gpt4omini_chat");
        assert_eq!(decision.rule_name, "prefer_openai");
    }

    #[test]
    fn no_matching_rule_falls_back_to_cheapest_then_id() {
        let router = ModelRouter::new(ModelRegistry::default(), vec![]);
        let decision = router.select("chat", "local", None, None, None).unwrap();
        assert_eq!(decision.rule_name, "__fallback");
        assert_eq!(decision.model_id, "ollama_phi3_chat");
    }

    #[test]
    fn no_candidates_is_explained_not_panicked() {
        let router = ModelRouter::new(ModelRegistry::default(), vec![]);
        let explanation = router.explain("vision", "cloud_ok", None);
        assert!(explanation.selected.is_none());
        assert!(explanation.error.is_some());
        assert_eq!(explanation.all_models.len(), 3);
    }

    #[test]
    fn rules_can_be_loaded_from_yaml() {
        let yaml = "rules:\n  - name: cheap_local\n    when:\n      privacy: local\n    prefer: [stub_chat]\n";
        let rules = ModelRouter::load_rules_yaml(yaml).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].prefer, vec!["stub_chat"]);
    }
}
