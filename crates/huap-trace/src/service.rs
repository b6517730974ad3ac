use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use huap_types::{content_hash, payload, EventName, RunId, SpanId, TraceEvent};
use serde_json::{Map, Value};

use crate::sanitize::{redact_llm_payload, sanitize_input};
use crate::writer::{NullSink, TraceSink, TraceWriter};

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("a run is already active; call end_run before starting another")]
    AlreadyActive,
    #[error("failed to open trace file at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Active,
}

/// Per-token USD estimate used to derive an automatic `cost_record` from each
/// `llm_response`.
#[derive(Debug, Clone, Copy)]
pub struct CostModel {
    pub usd_per_1k_tokens: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self { usd_per_1k_tokens: 0.002 }
    }
}

pub struct TraceServiceConfig {
    pub output_dir: PathBuf,
    pub enabled: bool,
    pub default_pod: String,
    pub default_engine: String,
    pub redact_llm: bool,
    pub cost_model: CostModel,
}

impl Default for TraceServiceConfig {
    fn default() -> Self {
        let redact_llm = std::env::var("HUAP_TRACE_REDACT_LLM")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);
        Self {
            output_dir: PathBuf::from("traces"),
            enabled: true,
            default_pod: "huap-core".to_string(),
            default_engine: "native_graph".to_string(),
            redact_llm,
            cost_model: CostModel::default(),
        }
    }
}

/// Stateful façade owning the current run's identity, span stack, writer and
/// default labels.
pub struct TraceService {
    config: TraceServiceConfig,
    state: RunState,
    run_id: Option<RunId>,
    span_stack: Vec<SpanId>,
    sink: Box<dyn TraceSink + Send>,
    run_started_at: Option<Instant>,
    user_id: Option<String>,
    session_id: Option<String>,
}

impl TraceService {
    pub fn new(config: TraceServiceConfig) -> std::io::Result<Self> {
        if config.enabled {
            std::fs::create_dir_all(&config.output_dir)?;
        }
        Ok(Self {
            config,
            state: RunState::Idle,
            run_id: None,
            span_stack: Vec::new(),
            sink: Box::new(NullSink::default()),
            run_started_at: None,
            user_id: None,
            session_id: None,
        })
    }

    pub fn run_id(&self) -> Option<&RunId> {
        self.run_id.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.state == RunState::Active
    }

    #[allow(clippy::too_many_arguments)]
    pub fn start_run(
        &mut self,
        pod: Option<&str>,
        graph: Option<&str>,
        graph_path: Option<&str>,
        input: Option<Value>,
        user_id: Option<&str>,
        session_id: Option<&str>,
        trace_path: Option<&Path>,
    ) -> Result<RunId, TraceError> {
        if self.state == RunState::Active {
            return Err(TraceError::AlreadyActive);
        }

        let run_id = RunId::new();
        self.run_id = Some(run_id.clone());
        self.span_stack.clear();
        self.user_id = user_id.map(str::to_string);
        self.session_id = session_id.map(str::to_string);
        self.run_started_at = Some(Instant::now());

        if self.config.enabled {
            let path = match trace_path {
                Some(explicit) => explicit.to_path_buf(),
                None => {
                    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
                    self.config
                        .output_dir
                        .join(format!("{run_id}_{timestamp}.trace.jsonl"))
                }
            };
            let writer = TraceWriter::new(&path, None, true)
                .map_err(|source| TraceError::OpenFailed { path, source })?;
            self.sink = Box::new(writer);
        } else {
            self.sink = Box::new(NullSink::default());
        }

        self.state = RunState::Active;

        let input = input.unwrap_or(Value::Object(Map::new()));
        let sanitized = sanitize_input(&input);
        let data = payload::run_start(pod.unwrap_or(&self.config.default_pod), graph.unwrap_or(""), graph_path, sanitized);
        self.emit(EventName::RunStart, data, None);
        tracing::info!(run_id = %run_id, "started trace run");
        Ok(run_id)
    }

    pub fn end_run(&mut self, status: &str, output: Option<Value>, error: Option<&str>) {
        if self.state != RunState::Active {
            return;
        }
        let duration_ms = self
            .run_started_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        let state_hash = output.as_ref().map(content_hash).unwrap_or_default();
        let data = payload::run_end(status, &state_hash, duration_ms, error);
        self.emit(EventName::RunEnd, data, None);
        self.flush();
        tracing::info!(run_id = ?self.run_id, status, "ended trace run");
        self.state = RunState::Idle;
        self.run_id = None;
        self.span_stack.clear();
        self.sink = Box::new(NullSink::default());
    }

    pub fn node_enter(&mut self, node: &str, state: Option<&Value>) -> SpanId {
        let span_id = self.push_span();
        let state_hash = state.map(content_hash);
        let data = payload::node_enter(node, state_hash.as_deref());
        self.emit(EventName::NodeEnter, data, Some(span_id.clone()));
        span_id
    }

    pub fn node_exit(&mut self, node: &str, output: Option<&Value>, duration_ms: u64) {
        let span_id = self.pop_span();
        let output_hash = output.map(content_hash);
        let data = payload::node_exit(node, output_hash.as_deref(), duration_ms);
        self.emit(EventName::NodeExit, data, span_id);
    }

    pub fn tool_call(&mut self, tool: &str, input: Option<Value>, permissions: Option<Value>) -> SpanId {
        let span_id = self.push_span();
        let input = input.unwrap_or(Value::Object(Map::new()));
        let input_hash = content_hash(&input);
        let sanitized = sanitize_input(&input);
        let data = payload::tool_call(tool, sanitized, &input_hash, permissions);
        self.emit(EventName::ToolCall, data, Some(span_id.clone()));
        span_id
    }

    pub fn tool_result(&mut self, tool: &str, result: Option<Value>, duration_ms: u64, status: &str, error: Option<&str>) {
        let span_id = self.pop_span();
        let data = payload::tool_result(tool, result, duration_ms, status, error);
        self.emit(EventName::ToolResult, data, span_id);
    }

    pub fn llm_request(
        &mut self,
        model: &str,
        messages: Value,
        temperature: Option<f64>,
        max_tokens: Option<u64>,
        provider: &str,
    ) -> SpanId {
        let span_id = self.push_span();
        let messages_hash = content_hash(&messages);
        let mut data = payload::llm_request(model, messages, &messages_hash, temperature, max_tokens, provider);
        if self.config.redact_llm {
            redact_llm_payload(&mut data);
        }
        self.emit(EventName::LlmRequest, data, Some(span_id.clone()));
        span_id
    }

    pub fn llm_response(&mut self, model: &str, text: &str, usage: Value, duration_ms: u64, provider: &str) {
        let span_id = self.pop_span();
        let mut data = payload::llm_response(model, text, usage.clone(), duration_ms, provider);
        if self.config.redact_llm {
            redact_llm_payload(&mut data);
        }
        self.emit(EventName::LlmResponse, data, span_id.clone());

        let total_tokens = usage.get("total_tokens").and_then(Value::as_u64).unwrap_or(0);
        let usd = (total_tokens as f64 / 1000.0) * self.config.cost_model.usd_per_1k_tokens;
        let cost_data = payload::cost_record(usd, total_tokens, "llm_response");
        self.emit(EventName::CostRecord, cost_data, span_id);
    }

    pub fn policy_check(&mut self, policy: &str, decision: &str, reason: Option<&str>, rule_id: Option<&str>, inputs: Option<Value>) {
        let span_id = self.current_span_id();
        let data = payload::policy_check(policy, decision, reason, rule_id, inputs);
        self.emit(EventName::PolicyCheck, data, span_id);
    }

    pub fn error(&mut self, message: &str, node: Option<&str>) {
        let span_id = self.current_span_id();
        let data = payload::error(message, node);
        self.emit(EventName::Error, data, span_id);
    }

    pub fn quality_record(&mut self, metric: &str, value: f64) {
        let span_id = self.current_span_id();
        let data = payload::quality_record(metric, value);
        self.emit(EventName::QualityRecord, data, span_id);
    }

    fn push_span(&mut self) -> SpanId {
        let span_id = SpanId::new();
        self.span_stack.push(span_id.clone());
        span_id
    }

    fn pop_span(&mut self) -> Option<SpanId> {
        self.span_stack.pop()
    }

    fn current_span_id(&self) -> Option<SpanId> {
        self.span_stack.last().cloned()
    }

    fn parent_span_id(&self) -> Option<SpanId> {
        if self.span_stack.len() >= 2 {
            self.span_stack.get(self.span_stack.len() - 2).cloned()
        } else {
            None
        }
    }

    fn emit(&mut self, name: EventName, data: Map<String, Value>, span_id: Option<SpanId>) {
        if self.state != RunState::Active {
            return;
        }
        let Some(run_id) = self.run_id.clone() else { return };
        let span_id = span_id.unwrap_or_else(SpanId::new);
        let parent_span_id = self.parent_span_id();
        let mut event = TraceEvent::new(run_id, span_id, parent_span_id, name, data);
        event.pod = Some(self.config.default_pod.clone());
        event.engine = Some(self.config.default_engine.clone());
        event.user_id = self.user_id.clone();
        event.session_id = self.session_id.clone();
        if let Err(err) = self.sink.write(&event) {
            tracing::warn!(error = %err, "failed to persist trace event; dropping");
        }
    }

    fn flush(&mut self) {
        if let Err(err) = self.sink.flush() {
            tracing::warn!(error = %err, "failed to flush trace writer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service(dir: &Path) -> TraceService {
        TraceService::new(TraceServiceConfig {
            output_dir: dir.to_path_buf(),
            ..TraceServiceConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn second_start_run_without_end_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut svc = service(dir.path());
        svc.start_run(None, None, None, None, None, None, None).unwrap();
        let err = svc.start_run(None, None, None, None, None, None, None).unwrap_err();
        assert!(matches!(err, TraceError::AlreadyActive));
    }

    #[test]
    fn hello_trace_has_matched_spans_and_terminal_events() {
        let dir = tempfile::tempdir().unwrap();
        let trace_path = dir.path().join("hello.trace.jsonl");
        let mut svc = service(dir.path());
        svc.start_run(Some("demo"), Some("hello"), None, Some(json!({"message": "hi"})), None, None, Some(&trace_path))
            .unwrap();
        svc.node_enter("start", None);
        svc.node_exit("start", Some(&json!({"echoed": "hi"})), 1);
        svc.end_run("success", Some(json!({"status": "complete"})), None);

        let contents = std::fs::read_to_string(&trace_path).unwrap();
        let events: Vec<Value> = contents.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(events.first().unwrap()["name"], json!("run_start"));
        assert_eq!(events.last().unwrap()["name"], json!("run_end"));
        let run_id = events[0]["run_id"].clone();
        assert!(events.iter().all(|e| e["run_id"] == run_id));
    }

    #[test]
    fn idle_methods_are_no_ops() {
        let dir = tempfile::tempdir().unwrap();
        let mut svc = service(dir.path());
        svc.node_enter("ghost", None);
        svc.error("should not be recorded", None);
        assert!(svc.run_id().is_none());
    }

    #[test]
    fn llm_response_emits_automatic_cost_record() {
        let dir = tempfile::tempdir().unwrap();
        let trace_path = dir.path().join("llm.trace.jsonl");
        let mut svc = service(dir.path());
        svc.start_run(None, None, None, None, None, None, Some(&trace_path)).unwrap();
        svc.llm_request("gpt", json!([{"role": "user", "content": "hi"}]), None, None, "openai");
        svc.llm_response("gpt", "hello", json!({"total_tokens": 10}), 5, "openai");
        svc.end_run("success", None, None);

        let contents = std::fs::read_to_string(&trace_path).unwrap();
        let names: Vec<Value> = contents
            .lines()
            .map(|l| serde_json::from_str::<Value>(l).unwrap()["name"].clone())
            .collect();
        assert!(names.contains(&json!("cost_record")));
    }
}
