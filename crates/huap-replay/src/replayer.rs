use std::path::Path;

use huap_graph::{Graph, GraphRunner, RunOutcome};
use huap_trace::{CostSummary, RunLoadError, TraceError, TraceRun, TraceService, TraceSink, TraceWriter};
use serde_json::{Map, Value};

use crate::client::StubMiss;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayMode {
    /// Re-emit recorded events verbatim; never executes node code.
    Emit,
    /// Re-run the graph through stub-backed clients.
    Exec,
}

#[derive(Debug)]
pub struct ReplayResult {
    pub mode: ReplayMode,
    pub trace: TraceRun,
    pub misses: Vec<StubMiss>,
    /// `None` in emit mode (nothing to compare); `Some` in exec mode.
    pub state_match: Option<bool>,
    pub cost_original: CostSummary,
    pub cost_replay: CostSummary,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Load(#[from] RunLoadError),
    #[error(transparent)]
    Trace(#[from] TraceError),
}

/// Re-drives a recorded trace in either mode.
pub struct Replayer;

impl Replayer {
    /// Writes every original event to `out_path` unchanged. Useful for
    /// validating trace structure and regenerating artifacts, but never
    /// detects code-level drift.
    pub fn emit(original: &TraceRun, out_path: &Path) -> Result<ReplayResult, ReplayError> {
        let mut writer = TraceWriter::new(out_path, None, true)?;
        for event in &original.events {
            writer.write(event)?;
        }
        writer.flush()?;
        let replay_trace = TraceRun::load(out_path)?;
        let cost_replay = replay_trace.cost_summary.clone();
        Ok(ReplayResult {
            mode: ReplayMode::Emit,
            trace: replay_trace,
            misses: Vec::new(),
            state_match: None,
            cost_original: original.cost_summary.clone(),
            cost_replay,
        })
    }

    /// Re-executes `graph` from `start_node` into a fresh trace file at
    /// `trace_path`, then compares the terminal state hash to the original
    /// run's recorded `run_end.state_hash`.
    pub async fn exec(
        original: &TraceRun,
        graph: &Graph,
        start_node: &str,
        initial_state: Map<String, Value>,
        tracer: &mut TraceService,
        trace_path: &Path,
        misses: Vec<StubMiss>,
    ) -> Result<ReplayResult, ReplayError> {
        tracer.start_run(
            None,
            None,
            None,
            Some(Value::Object(initial_state.clone())),
            None,
            None,
            Some(trace_path),
        )?;
        let run = GraphRunner::new(graph).with_tracer(tracer).run(start_node, initial_state).await;
        let status = if run.outcome == RunOutcome::Success { "success" } else { "error" };
        tracer.end_run(status, Some(Value::Object(run.state.clone())), run.error.as_deref());

        let replay_trace = TraceRun::load(trace_path)?;

        let replay_state_hash = huap_types::content_hash(&Value::Object(run.state));
        let original_state_hash = original
            .run_end()
            .and_then(|e| e.data_field("state_hash"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let state_match = Some(replay_state_hash == original_state_hash);

        Ok(ReplayResult {
            mode: ReplayMode::Exec,
            cost_replay: replay_trace.cost_summary.clone(),
            trace: replay_trace,
            misses,
            state_match,
            cost_original: original.cost_summary.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huap_graph::{Edge, Node};
    use huap_trace::TraceServiceConfig;
    use huap_types::{EventName, RunId, SpanId};
    use std::sync::Arc;

    fn sample_run() -> TraceRun {
        let run_id = RunId::new();
        let start = huap_types::TraceEvent::new(run_id.clone(), SpanId::new(), None, EventName::RunStart, Map::new());
        let end = huap_types::TraceEvent::new(run_id, SpanId::new(), None, EventName::RunEnd, Map::new());
        TraceRun { run_id: start.run_id.clone(), events: vec![start, end], cost_summary: CostSummary::default(), error_events: vec![] }
    }

    #[test]
    fn emit_mode_writes_every_event_unchanged() {
        let original = sample_run();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("replay.trace.jsonl");
        let result = Replayer::emit(&original, &out).unwrap();
        assert_eq!(result.mode, ReplayMode::Emit);
        assert_eq!(result.trace.events.len(), original.events.len());
        assert!(result.state_match.is_none());
    }

    #[tokio::test]
    async fn exec_mode_detects_state_match() {
        let dir = tempfile::tempdir().unwrap();

        let mut graph = Graph::new();
        graph.add_node(Node::new("only", Arc::new(|mut state: Map<String, Value>| async move {
            state.insert("done".to_string(), Value::Bool(true));
            Ok(state)
        })));
        let _ = Edge::new("only", None, None);

        let mut tracer = TraceService::new(TraceServiceConfig { output_dir: dir.path().to_path_buf(), ..TraceServiceConfig::default() }).unwrap();
        let original_path = dir.path().join("original.trace.jsonl");
        tracer.start_run(None, None, None, None, None, None, Some(&original_path)).unwrap();
        let final_state = serde_json::json!({"done": true});
        tracer.end_run("success", Some(final_state), None);
        let original = TraceRun::load(&original_path).unwrap();

        let replay_path = dir.path().join("replay.trace.jsonl");
        let result = Replayer::exec(&original, &graph, "only", Map::new(), &mut tracer, &replay_path, vec![])
            .await
            .unwrap();
        assert_eq!(result.state_match, Some(true));
    }
}
