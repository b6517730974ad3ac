//! File-backed human gate protocol for pausing a run on an external decision.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use huap_types::{payload, GateId, RunId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed gate artifact at {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
    Edit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateRequest {
    pub gate_id: GateId,
    pub run_id: RunId,
    pub title: String,
    pub severity: Severity,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub context: Map<String, Value>,
    pub suggested_options: Vec<String>,
    pub created_at: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub gate_id: GateId,
    pub run_id: RunId,
    pub decision: Decision,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub patch: Option<Map<String, Value>>,
    pub decided_at: String,
    pub decided_by: String,
}

fn inbox_dir(root: &Path, run_id: &RunId) -> PathBuf {
    root.join("inbox").join(run_id.as_str())
}

fn request_path(root: &Path, run_id: &RunId, gate_id: &GateId) -> PathBuf {
    inbox_dir(root, run_id).join(format!("{gate_id}.json"))
}

fn decision_path(root: &Path, run_id: &RunId, gate_id: &GateId) -> PathBuf {
    inbox_dir(root, run_id).join(format!("{gate_id}.decision.json"))
}

/// Writes `<root>/inbox/<run_id>/<gate_id>.json` with status `pending`.
pub fn create_gate(
    root: &Path,
    run_id: &RunId,
    title: &str,
    severity: Severity,
    summary: &str,
    context: Map<String, Value>,
    suggested_options: Option<Vec<String>>,
) -> Result<GateRequest, GateError> {
    let gate_id = GateId::new();
    let request = GateRequest {
        gate_id: gate_id.clone(),
        run_id: run_id.clone(),
        title: title.to_string(),
        severity,
        summary: summary.to_string(),
        context,
        suggested_options: suggested_options.unwrap_or_else(|| vec!["approve".to_string(), "reject".to_string()]),
        created_at: Utc::now().to_rfc3339(),
        status: "pending".to_string(),
    };
    let path = request_path(root, run_id, &gate_id);
    std::fs::create_dir_all(path.parent().expect("request path always has a parent"))?;
    std::fs::write(&path, serde_json::to_vec_pretty(&request).expect("GateRequest always serializes"))?;
    Ok(request)
}

/// Writes `<gate_id>.decision.json` and flips the request's status to
/// `decided`. A gate should have at most one decision, but this call does
/// not enforce it — the second writer simply wins.
pub fn submit_decision(
    root: &Path,
    run_id: &RunId,
    gate_id: &GateId,
    decision: Decision,
    note: &str,
    patch: Option<Map<String, Value>>,
    decided_by: &str,
) -> Result<GateDecision, GateError> {
    let record = GateDecision {
        gate_id: gate_id.clone(),
        run_id: run_id.clone(),
        decision,
        note: note.to_string(),
        patch,
        decided_at: Utc::now().to_rfc3339(),
        decided_by: decided_by.to_string(),
    };
    let path = decision_path(root, run_id, gate_id);
    std::fs::create_dir_all(path.parent().expect("decision path always has a parent"))?;
    std::fs::write(&path, serde_json::to_vec_pretty(&record).expect("GateDecision always serializes"))?;

    let req_path = request_path(root, run_id, gate_id);
    if let Ok(bytes) = std::fs::read(&req_path) {
        if let Ok(mut value) = serde_json::from_slice::<Value>(&bytes) {
            if let Some(obj) = value.as_object_mut() {
                obj.insert("status".to_string(), Value::String("decided".to_string()));
            }
            let _ = std::fs::write(&req_path, serde_json::to_vec_pretty(&value).unwrap_or(bytes));
        }
    }

    Ok(record)
}

/// Returns the decision, or `None` if still pending. A missing decision is
/// indistinguishable from a pending gate.
pub fn get_decision(root: &Path, run_id: &RunId, gate_id: &GateId) -> Result<Option<GateDecision>, GateError> {
    let path = decision_path(root, run_id, gate_id);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(&path)?;
    let decision = serde_json::from_slice(&bytes).map_err(|source| GateError::Malformed { path, source })?;
    Ok(Some(decision))
}

/// Enumerates gate requests, optionally filtered by run / status / severity.
pub fn list_gates(
    root: &Path,
    run_id: Option<&RunId>,
    status_filter: Option<&str>,
    severity_filter: Option<Severity>,
) -> Result<Vec<GateRequest>, GateError> {
    let inbox = root.join("inbox");
    if !inbox.exists() {
        return Ok(Vec::new());
    }
    let run_dirs: Vec<PathBuf> = match run_id {
        Some(id) => vec![inbox.join(id.as_str())],
        None => {
            let mut dirs: Vec<PathBuf> = std::fs::read_dir(&inbox)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|p| p.is_dir())
                .collect();
            dirs.sort();
            dirs
        }
    };

    let mut results = Vec::new();
    for dir in run_dirs {
        if !dir.is_dir() {
            continue;
        }
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension().is_some_and(|ext| ext == "json")
                    && !p.to_string_lossy().ends_with(".decision.json")
            })
            .collect();
        entries.sort();
        for entry in entries {
            let Ok(bytes) = std::fs::read(&entry) else { continue };
            let Ok(request) = serde_json::from_slice::<GateRequest>(&bytes) else { continue };
            let has_decision = decision_path(root, &request.run_id, &request.gate_id).exists();
            let effective_status = if has_decision { "decided" } else { "pending" };
            if let Some(filter) = status_filter {
                if filter != effective_status {
                    continue;
                }
            }
            if let Some(filter) = severity_filter {
                if filter != request.severity {
                    continue;
                }
            }
            results.push(request);
        }
    }
    Ok(results)
}

/// Polls for the decision file at `poll_interval`; returns `None` on
/// timeout expiry rather than raising.
pub async fn wait_for_decision(
    root: &Path,
    run_id: &RunId,
    gate_id: &GateId,
    poll_interval: Duration,
    timeout: Option<Duration>,
) -> Result<Option<GateDecision>, GateError> {
    let started = tokio::time::Instant::now();
    loop {
        if let Some(decision) = get_decision(root, run_id, gate_id)? {
            return Ok(Some(decision));
        }
        if let Some(timeout) = timeout {
            if started.elapsed() >= timeout {
                return Ok(None);
            }
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Builds the `policy_check` trace event data payload for either the initial
/// `pending` transition or the final decided transition, reusing
/// `policy_check` to avoid schema churn.
pub fn gate_trace_event(gate_id: &GateId, decision: &str, reason: &str, inputs: Option<Value>) -> Map<String, Value> {
    payload::policy_check("human_gate", decision, Some(reason), Some(gate_id.as_str()), inputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn approve_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = RunId::new();
        let request = create_gate(dir.path(), &run_id, "send email", Severity::High, "", Map::new(), None).unwrap();
        assert_eq!(request.status, "pending");
        assert!(get_decision(dir.path(), &run_id, &request.gate_id).unwrap().is_none());

        submit_decision(dir.path(), &run_id, &request.gate_id, Decision::Approve, "looks fine", None, "alice").unwrap();

        let decision = get_decision(dir.path(), &run_id, &request.gate_id).unwrap().unwrap();
        assert_eq!(decision.decision, Decision::Approve);

        let path = request_path(dir.path(), &run_id, &request.gate_id);
        let raw: Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(raw["status"], Value::String("decided".to_string()));
    }

    #[tokio::test]
    async fn wait_for_decision_times_out_with_none() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = RunId::new();
        let request = create_gate(dir.path(), &run_id, "noop", Severity::Low, "", Map::new(), None).unwrap();
        let result = wait_for_decision(dir.path(), &run_id, &request.gate_id, Duration::from_millis(10), Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn second_decision_overwrites_first() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = RunId::new();
        let request = create_gate(dir.path(), &run_id, "t", Severity::Medium, "", Map::new(), None).unwrap();
        submit_decision(dir.path(), &run_id, &request.gate_id, Decision::Approve, "", None, "a").unwrap();
        submit_decision(dir.path(), &run_id, &request.gate_id, Decision::Reject, "", None, "b").unwrap();
        let decision = get_decision(dir.path(), &run_id, &request.gate_id).unwrap().unwrap();
        assert_eq!(decision.decision, Decision::Reject);
    }

    #[test]
    fn list_gates_filters_by_status() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = RunId::new();
        let pending = create_gate(dir.path(), &run_id, "pending one", Severity::Low, "", Map::new(), None).unwrap();
        let decided = create_gate(dir.path(), &run_id, "decided one", Severity::Low, "", Map::new(), None).unwrap();
        submit_decision(dir.path(), &run_id, &decided.gate_id, Decision::Approve, "", None, "a").unwrap();

        let pending_only = list_gates(dir.path(), Some(&run_id), Some("pending"), None).unwrap();
        assert_eq!(pending_only.len(), 1);
        assert_eq!(pending_only[0].gate_id, pending.gate_id);
    }
}
