//! Bounded-concurrency batch queue and processor (spec §4.4).

pub mod processor;
pub mod queue;

pub use processor::{BatchProcessor, BatchStats, DEFAULT_MAX_BATCH_SIZE};
pub use queue::{BatchGroup, BatchQueue, BatchRequest};
