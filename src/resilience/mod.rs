//! Per-request retry/fallback state machine and the circuit breaker that
//! backs it (spec §4.5).

pub mod fallback;

pub use fallback::{FallbackChain, FallbackConfig, FallbackDecision, FallbackReason};
