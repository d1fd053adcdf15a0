//! The top-level orchestration layer (spec §4.9-§4.10): one `PhaseExecutor`
//! per phase number, driven in sequence by a `PipelineOrchestrator`.

pub mod executor;
pub mod orchestrator;

pub use executor::PhaseExecutor;
pub use orchestrator::{PipelineOrchestrator, RunOutcome};
