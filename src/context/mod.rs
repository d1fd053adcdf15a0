//! Context-optimization layer: token accounting gate plus on-demand
//! summarization (spec §4.7).

pub mod summarizer;

pub use summarizer::{ContextSummarizer, SummaryConfig, SummaryResult};
