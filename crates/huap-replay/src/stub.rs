use std::collections::HashMap;

use huap_trace::TraceRun;
use huap_types::{content_hash, EventName};
use serde_json::Value;

/// A single recorded call usable as a replay response.
#[derive(Debug, Clone)]
pub struct StubCall {
    pub name: String,
    pub input_hash: String,
    pub result: Value,
    pub duration_ms: u64,
    pub status: String,
    pub error: Option<String>,
}

/// Which matching strategy produced a stub hit. Callers that need strict
/// determinism guarantees can assert every lookup was [`LookupMode::Hash`]
/// rather than silently tolerating a positional fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    Hash,
    Sequence,
}

#[derive(Debug, Clone)]
pub struct StubHit {
    pub stub: StubCall,
    pub mode: LookupMode,
}

/// Two indices over a recorded trace: a hash-keyed primary index and a
/// per-tool/global sequence fallback.
#[derive(Debug, Default)]
pub struct StubRegistry {
    tool_stubs: HashMap<String, Vec<StubCall>>,
    llm_stubs: Vec<StubCall>,
    tool_stubs_by_hash: HashMap<String, StubCall>,
    llm_stubs_by_hash: HashMap<String, StubCall>,
    tool_indices: HashMap<String, usize>,
    llm_index: usize,
}

impl StubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tool_stub(&mut self, tool: &str, stub: StubCall) {
        if !stub.input_hash.is_empty() {
            self.tool_stubs_by_hash.insert(format!("{tool}:{}", stub.input_hash), stub.clone());
        }
        self.tool_stubs.entry(tool.to_string()).or_default().push(stub);
    }

    pub fn add_llm_stub(&mut self, stub: StubCall) {
        if !stub.input_hash.is_empty() {
            self.llm_stubs_by_hash.insert(stub.input_hash.clone(), stub.clone());
        }
        self.llm_stubs.push(stub);
    }

    /// Hash match first; sequence fallback second; `None` is a `StubMiss`.
    pub fn get_tool_stub(&mut self, tool: &str, input: &Value) -> Option<StubHit> {
        let input_hash = content_hash(input);
        let lookup_key = format!("{tool}:{input_hash}");
        if let Some(stub) = self.tool_stubs_by_hash.get(&lookup_key) {
            return Some(StubHit { stub: stub.clone(), mode: LookupMode::Hash });
        }
        let stubs = self.tool_stubs.get(tool)?;
        let idx = *self.tool_indices.get(tool).unwrap_or(&0);
        let stub = stubs.get(idx)?.clone();
        self.tool_indices.insert(tool.to_string(), idx + 1);
        tracing::warn!(tool, "stub matched by sequence fallback, not by hash");
        Some(StubHit { stub, mode: LookupMode::Sequence })
    }

    pub fn get_llm_stub(&mut self, messages: &Value) -> Option<StubHit> {
        let messages_hash = content_hash(messages);
        if let Some(stub) = self.llm_stubs_by_hash.get(&messages_hash) {
            return Some(StubHit { stub: stub.clone(), mode: LookupMode::Hash });
        }
        let stub = self.llm_stubs.get(self.llm_index)?.clone();
        self.llm_index += 1;
        tracing::warn!("llm stub matched by sequence fallback, not by hash");
        Some(StubHit { stub, mode: LookupMode::Sequence })
    }

    pub fn reset(&mut self) {
        self.tool_indices.clear();
        self.llm_index = 0;
    }

    /// Builds a registry by pairing `tool_call`/`tool_result` and
    /// `llm_request`/`llm_response` events on shared `span_id`.
    pub fn from_trace(run: &TraceRun) -> Self {
        let mut registry = Self::new();
        let mut pending_tool_calls: HashMap<String, &huap_types::TraceEvent> = HashMap::new();
        let mut pending_llm_requests: HashMap<String, &huap_types::TraceEvent> = HashMap::new();

        for event in &run.events {
            match event.name {
                EventName::ToolCall => {
                    pending_tool_calls.insert(event.span_id.as_str().to_string(), event);
                }
                EventName::ToolResult => {
                    let Some(call) = pending_tool_calls.get(event.span_id.as_str()) else { continue };
                    let tool_name = call
                        .data_field("tool")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string();
                    let input_hash = call
                        .data_field("input_hash")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .or_else(|| call.data_field("input").map(content_hash))
                        .unwrap_or_default();
                    let stub = StubCall {
                        name: tool_name.clone(),
                        input_hash,
                        result: event.data_field("result").cloned().unwrap_or(Value::Null),
                        duration_ms: event.data_field("duration_ms").and_then(Value::as_u64).unwrap_or(0),
                        status: event.data_field("status").and_then(Value::as_str).unwrap_or("ok").to_string(),
                        error: event.data_field("error").and_then(Value::as_str).map(str::to_string),
                    };
                    registry.add_tool_stub(&tool_name, stub);
                }
                EventName::LlmRequest => {
                    pending_llm_requests.insert(event.span_id.as_str().to_string(), event);
                }
                EventName::LlmResponse => {
                    let request_hash = pending_llm_requests
                        .get(event.span_id.as_str())
                        .and_then(|req| {
                            req.data_field("messages_hash")
                                .and_then(Value::as_str)
                                .map(str::to_string)
                                .or_else(|| req.data_field("messages").map(content_hash))
                        })
                        .unwrap_or_default();
                    let stub = StubCall {
                        name: event.data_field("model").and_then(Value::as_str).unwrap_or("unknown").to_string(),
                        input_hash: request_hash,
                        result: event.data_field("text").cloned().unwrap_or(Value::String(String::new())),
                        duration_ms: event.data_field("duration_ms").and_then(Value::as_u64).unwrap_or(0),
                        status: "ok".to_string(),
                        error: None,
                    };
                    registry.add_llm_stub(stub);
                }
                _ => {}
            }
        }

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn llm_replay_hits_by_hash() {
        let good = r#"{"v":"0.1","ts":"2026-01-01T00:00:00Z","run_id":"run_aaaaaaaaaaaa","span_id":"sp_111111111111","kind":"llm","name":"llm_request","data":{"messages":[{"role":"user","content":"ping"}],"model":"m"}}"#;
        let resp = r#"{"v":"0.1","ts":"2026-01-01T00:00:01Z","run_id":"run_aaaaaaaaaaaa","span_id":"sp_111111111111","kind":"llm","name":"llm_response","data":{"model":"m","text":"pong"}}"#;
        let run = TraceRun::from_jsonl(&format!("{good}\n{resp}"));
        let mut registry = StubRegistry::from_trace(&run);

        let hit = registry.get_llm_stub(&json!([{"role": "user", "content": "ping"}])).unwrap();
        assert_eq!(hit.mode, LookupMode::Hash);
        assert_eq!(hit.stub.result, json!("pong"));

        assert!(registry.get_llm_stub(&json!([{"role": "user", "content": "different"}])).is_none());
    }

    #[test]
    fn sequence_fallback_is_flagged_not_silent() {
        let mut registry = StubRegistry::new();
        registry.add_tool_stub(
            "search",
            StubCall { name: "search".into(), input_hash: String::new(), result: json!("r1"), duration_ms: 1, status: "ok".into(), error: None },
        );
        let hit = registry.get_tool_stub("search", &json!({"q": "anything"})).unwrap();
        assert_eq!(hit.mode, LookupMode::Sequence);
    }

    #[test]
    fn empty_registry_is_all_misses() {
        let mut registry = StubRegistry::new();
        assert!(registry.get_tool_stub("ghost", &json!({})).is_none());
    }
}
