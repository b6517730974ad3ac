//! Stub registry and deterministic replayer.

mod client;
mod replayer;
mod stub;

pub use client::{LlmClient, StubMiss, StubbedClients, ToolRegistry};
pub use replayer::{ReplayError, ReplayMode, ReplayResult, Replayer};
pub use stub::{LookupMode, StubCall, StubHit, StubRegistry};
