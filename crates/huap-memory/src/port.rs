use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::item::MemoryItem;

/// Pluggable memory backend abstraction: retain / recall / reflect.
#[async_trait]
pub trait MemoryPort: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn retain(
        &self,
        bank_id: &str,
        content: &str,
        context: Option<&str>,
        timestamp: Option<&str>,
        metadata: Map<String, Value>,
    ) -> MemoryItem;

    async fn recall(&self, bank_id: &str, query: &str, k: usize, filters: Option<&Map<String, Value>>) -> Vec<MemoryItem>;

    /// Higher-level synthesis over stored memories. Default implementations
    /// may simply alias [`MemoryPort::recall`].
    async fn reflect(&self, bank_id: &str, query: &str, k: usize, filters: Option<&Map<String, Value>>) -> Vec<MemoryItem>;
}

/// Trivial in-process backend with no persistence, used for tests and stub
/// mode.
#[derive(Default)]
pub struct InMemoryPort {
    banks: Mutex<HashMap<String, Vec<MemoryItem>>>,
}

#[async_trait]
impl MemoryPort for InMemoryPort {
    async fn retain(
        &self,
        bank_id: &str,
        content: &str,
        context: Option<&str>,
        timestamp: Option<&str>,
        metadata: Map<String, Value>,
    ) -> MemoryItem {
        let item = MemoryItem::new(bank_id, content, context, timestamp, metadata);
        let mut banks = self.banks.lock().await;
        banks.entry(bank_id.to_string()).or_default().push(item.clone());
        item
    }

    /// `filters` is part of the port contract but this in-process backend has
    /// no indexed fields to filter on, so it is accepted and ignored.
    async fn recall(&self, bank_id: &str, query: &str, k: usize, _filters: Option<&Map<String, Value>>) -> Vec<MemoryItem> {
        let banks = self.banks.lock().await;
        let Some(items) = banks.get(bank_id) else { return Vec::new() };
        let query_lower = query.to_lowercase();
        let mut scored: Vec<MemoryItem> = items
            .iter()
            .cloned()
            .map(|mut item| {
                item.score = if item.content.to_lowercase().contains(&query_lower) { 1.0 } else { 0.0 };
                item
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        scored.truncate(k);
        scored
    }

    async fn reflect(&self, bank_id: &str, query: &str, k: usize, filters: Option<&Map<String, Value>>) -> Vec<MemoryItem> {
        self.recall(bank_id, query, k, filters).await
    }
}
