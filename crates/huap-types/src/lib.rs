//! Trace event schema, identifiers and content hashing shared by every HUAP
//! Core crate.

mod event;
mod hash;
mod ids;
pub mod payload;

pub use event::{EventKind, EventName, TraceEvent, EPHEMERAL_FIELDS, SCHEMA_VERSION};
pub use hash::{canonicalize_for_hash, content_hash, sha256_hex, HASH_LEN};
pub use ids::{GateId, InvalidId, RunId, SpanId};
