use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A single stored memory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub content: String,
    pub bank_id: String,
    pub timestamp: String,
    pub context: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub score: f64,
}

impl MemoryItem {
    pub fn new(bank_id: &str, content: &str, context: Option<&str>, timestamp: Option<&str>, metadata: Map<String, Value>) -> Self {
        Self {
            id: format!("mem_{}", Uuid::new_v4().simple().to_string().get(..12).unwrap_or_default()),
            content: content.to_string(),
            bank_id: bank_id.to_string(),
            timestamp: timestamp.map(str::to_string).unwrap_or_else(|| Utc::now().to_rfc3339()),
            context: context.map(str::to_string),
            metadata,
            score: 0.0,
        }
    }
}
