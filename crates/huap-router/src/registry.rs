use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Specification for a single model endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub id: String,
    pub provider: String,
    pub model: String,
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<String>,
    #[serde(default = "default_privacy")]
    pub privacy: String,
    #[serde(default)]
    pub usd_per_1k_tokens_est: f64,
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_capabilities() -> Vec<String> {
    vec!["chat".to_string()]
}

fn default_privacy() -> String {
    "cloud_ok".to_string()
}

impl ModelSpec {
    pub fn matches_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// `cloud_ok` accepts anything; any other requested privacy level must
    /// match the model's own privacy tag exactly.
    pub fn matches_privacy(&self, privacy: &str) -> bool {
        privacy == "cloud_ok" || self.privacy == privacy
    }
}

fn builtin_models() -> Vec<ModelSpec> {
    vec![
        ModelSpec {
            id: "stub_chat".to_string(),
            provider: "stub".to_string(),
            model: "stub".to_string(),
            capabilities: vec!["chat".to_string(), "classify".to_string(), "extract".to_string()],
            privacy: "local".to_string(),
            usd_per_1k_tokens_est: 0.0,
            endpoint: None,
        },
        ModelSpec {
            id: "ollama_phi3_chat".to_string(),
            provider: "ollama".to_string(),
            model: "phi3".to_string(),
            capabilities: vec!["chat".to_string(), "classify".to_string(), "extract".to_string()],
            privacy: "local".to_string(),
            usd_per_1k_tokens_est: 0.0,
            endpoint: Some("http://localhost:11434".to_string()),
        },
        ModelSpec {
            id: "openai_gpt4omini_chat".to_string(),
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            capabilities: vec!["chat".to_string(), "classify".to_string(), "extract".to_string()],
            privacy: "cloud_ok".to_string(),
            usd_per_1k_tokens_est: 0.00015,
            endpoint: None,
        },
    ]
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    models: Vec<ModelSpec>,
}

/// Registry of available model specs, loaded from YAML or the built-in
/// defaults.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(builtin_models())
    }
}

impl ModelRegistry {
    pub fn new(models: Vec<ModelSpec>) -> Self {
        Self { models: models.into_iter().map(|m| (m.id.clone(), m)).collect() }
    }

    pub fn from_yaml(source: &str) -> Result<Self, serde_yaml::Error> {
        let file: RegistryFile = serde_yaml::from_str(source)?;
        Ok(Self::new(file.models))
    }

    pub fn list(&self) -> Vec<&ModelSpec> {
        self.models.values().collect()
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelSpec> {
        self.models.get(model_id)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn filter(
        &self,
        capability: Option<&str>,
        privacy: Option<&str>,
        max_usd_est: Option<f64>,
        providers_allow: Option<&[String]>,
        models_allow: Option<&[String]>,
    ) -> Vec<&ModelSpec> {
        self.models
            .values()
            .filter(|m| capability.map_or(true, |c| m.matches_capability(c)))
            .filter(|m| privacy.map_or(true, |p| m.matches_privacy(p)))
            .filter(|m| max_usd_est.map_or(true, |max| m.usd_per_1k_tokens_est <= max))
            .filter(|m| providers_allow.map_or(true, |allow| allow.contains(&m.provider)))
            .filter(|m| models_allow.map_or(true, |allow| allow.contains(&m.id)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_has_three_models() {
        let registry = ModelRegistry::default();
        assert_eq!(registry.list().len(), 3);
    }

    #[test]
    fn filter_by_privacy_local_excludes_cloud_only_models() {
        let registry = ModelRegistry::default();
        let local = registry.filter(Some("chat"), Some("local"), None, None, None);
        assert!(local.iter().all(|m| m.privacy == "local"));
        assert!(local.len() < registry.list().len());
    }

    #[test]
    fn cloud_ok_privacy_accepts_every_model() {
        let registry = ModelRegistry::default();
        let any = registry.filter(Some("chat"), Some("cloud_ok"), None, None, None);
        assert_eq!(any.len(), registry.list().len());
    }
}
