use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{RunId, SpanId};

/// Current trace schema version written into every event's `v` field.
pub const SCHEMA_VERSION: &str = "0.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Lifecycle,
    Node,
    Tool,
    Llm,
    Policy,
    Memory,
    Cost,
    Quality,
    System,
}

/// The fixed event-name vocabulary for the trace file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    RunStart,
    RunEnd,
    Error,
    NodeEnter,
    NodeExit,
    ToolCall,
    ToolResult,
    LlmRequest,
    LlmResponse,
    PolicyCheck,
    MemoryPut,
    MemoryGet,
    MemorySearch,
    ArtifactCreated,
    CostRecord,
    QualityRecord,
    Stdout,
    Stderr,
}

impl EventName {
    pub fn kind(self) -> EventKind {
        use EventKind as K;
        use EventName as N;
        match self {
            N::RunStart | N::RunEnd => K::Lifecycle,
            N::Error => K::System,
            N::NodeEnter | N::NodeExit => K::Node,
            N::ToolCall | N::ToolResult => K::Tool,
            N::LlmRequest | N::LlmResponse => K::Llm,
            N::PolicyCheck => K::Policy,
            N::MemoryPut | N::MemoryGet | N::MemorySearch => K::Memory,
            N::ArtifactCreated => K::System,
            N::CostRecord => K::Cost,
            N::QualityRecord => K::Quality,
            N::Stdout | N::Stderr => K::System,
        }
    }
}

/// A single line of a trace file.
///
/// `data` is kept as a raw JSON object rather than a closed tagged enum so
/// that unknown fields round-trip untouched on read; typed payload
/// extraction lives in [`payload`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub v: String,
    pub ts: DateTime<Utc>,
    pub run_id: RunId,
    pub span_id: SpanId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    pub kind: EventKind,
    pub name: EventName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Any top-level keys this reader doesn't recognise, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TraceEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: RunId,
        span_id: SpanId,
        parent_span_id: Option<SpanId>,
        name: EventName,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            v: SCHEMA_VERSION.to_string(),
            ts: Utc::now(),
            run_id,
            span_id,
            parent_span_id,
            kind: name.kind(),
            name,
            pod: None,
            engine: None,
            user_id: None,
            session_id: None,
            data,
            extra: Map::new(),
        }
    }

    pub fn data_field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

/// Fields stripped before content hashing and before diff field comparison —
/// both processes need the exact same ephemeral set.
pub const EPHEMERAL_FIELDS: &[&str] = &[
    "ts",
    "timestamp",
    "duration_ms",
    "span_id",
    "run_id",
    "parent_span_id",
];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_top_level_fields_round_trip() {
        let raw = json!({
            "v": "0.1",
            "ts": "2026-01-01T00:00:00Z",
            "run_id": "run_aaaaaaaaaaaa",
            "span_id": "sp_bbbbbbbbbbbb",
            "kind": "lifecycle",
            "name": "run_start",
            "data": {"input": {"message": "hi"}},
            "from_the_future": 42
        });
        let event: TraceEvent = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(event.extra.get("from_the_future"), Some(&json!(42)));
        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back.get("from_the_future"), Some(&json!(42)));
    }

    #[test]
    fn kind_is_derived_from_name() {
        assert_eq!(EventName::ToolCall.kind(), EventKind::Tool);
        assert_eq!(EventName::CostRecord.kind(), EventKind::Cost);
    }
}
