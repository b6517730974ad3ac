//! Trace writer and stateful trace service.

mod run;
mod sanitize;
mod service;
mod writer;

pub use run::{normalize_pod_name, CostSummary, RunLoadError, TraceRun};
pub use sanitize::{redact_llm_payload, sanitize_input, DEFAULT_SIZE_CAP_BYTES};
pub use service::{CostModel, TraceError, TraceService, TraceServiceConfig};
pub use writer::{NullSink, TraceSink, TraceWriter};
