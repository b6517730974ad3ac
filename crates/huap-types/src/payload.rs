//! Typed builders for the fixed data shapes behind each [`crate::EventName`].
//!
//! These build a `serde_json::Map` suitable for [`crate::TraceEvent::new`];
//! they are a construction convenience, not a parse-time contract — readers
//! must tolerate the bag of keys `data` actually holds.

use serde_json::{json, Map, Value};

fn obj(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

pub fn run_start(pod: &str, graph: &str, graph_path: Option<&str>, input: Value) -> Map<String, Value> {
    obj(json!({
        "pod": pod,
        "graph": graph,
        "graph_path": graph_path,
        "input": input,
    }))
}

pub fn run_end(status: &str, state_hash: &str, duration_ms: u64, error: Option<&str>) -> Map<String, Value> {
    obj(json!({
        "status": status,
        "state_hash": state_hash,
        "duration_ms": duration_ms,
        "error": error,
    }))
}

pub fn node_enter(node: &str, state_hash: Option<&str>) -> Map<String, Value> {
    obj(json!({ "node": node, "state_hash": state_hash }))
}

pub fn node_exit(node: &str, output_hash: Option<&str>, duration_ms: u64) -> Map<String, Value> {
    obj(json!({ "node": node, "output_hash": output_hash, "duration_ms": duration_ms }))
}

pub fn tool_call(tool: &str, input: Value, input_hash: &str, permissions: Option<Value>) -> Map<String, Value> {
    obj(json!({
        "tool": tool,
        "input": input,
        "input_hash": input_hash,
        "permissions": permissions,
    }))
}

pub fn tool_result(
    tool: &str,
    result: Option<Value>,
    duration_ms: u64,
    status: &str,
    error: Option<&str>,
) -> Map<String, Value> {
    obj(json!({
        "tool": tool,
        "result": result,
        "duration_ms": duration_ms,
        "status": status,
        "error": error,
    }))
}

pub fn llm_request(
    model: &str,
    messages: Value,
    messages_hash: &str,
    temperature: Option<f64>,
    max_tokens: Option<u64>,
    provider: &str,
) -> Map<String, Value> {
    obj(json!({
        "model": model,
        "messages": messages,
        "messages_hash": messages_hash,
        "temperature": temperature,
        "max_tokens": max_tokens,
        "provider": provider,
    }))
}

pub fn llm_response(
    model: &str,
    text: &str,
    usage: Value,
    duration_ms: u64,
    provider: &str,
) -> Map<String, Value> {
    obj(json!({
        "model": model,
        "text": text,
        "usage": usage,
        "duration_ms": duration_ms,
        "provider": provider,
    }))
}

pub fn policy_check(
    policy: &str,
    decision: &str,
    reason: Option<&str>,
    rule_id: Option<&str>,
    inputs: Option<Value>,
) -> Map<String, Value> {
    obj(json!({
        "policy": policy,
        "decision": decision,
        "reason": reason,
        "rule_id": rule_id,
        "inputs": inputs,
    }))
}

pub fn error(message: &str, node: Option<&str>) -> Map<String, Value> {
    obj(json!({ "message": message, "node": node }))
}

pub fn cost_record(usd: f64, tokens: u64, source: &str) -> Map<String, Value> {
    obj(json!({ "usd": usd, "tokens": tokens, "source": source }))
}

pub fn quality_record(metric: &str, value: f64) -> Map<String, Value> {
    obj(json!({ "metric": metric, "value": value }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_start_carries_input_untouched() {
        let data = run_start("demo", "g1", None, json!({"message": "hi"}));
        assert_eq!(data.get("input"), Some(&json!({"message": "hi"})));
    }
}
