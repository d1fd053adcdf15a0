//! # aigenflow-pipeline
//!
//! Orchestration core for a multi-stage, multi-provider LLM document-generation
//! pipeline: five sequential phases, each dispatching prompts to one of four
//! opaque LLM providers through a static routing table, with content-addressed
//! caching, retry/fallback with circuit breaking, context summarization, and
//! token/cost accounting layered around the phase loop.
//!
//! Providers themselves (headless-browser-driven LLM back ends) are never
//! constructed by this crate — callers implement [`provider::Provider`] and
//! register instances with an [`router::AgentRouter`] before driving a
//! [`pipeline::PipelineOrchestrator`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use aigenflow_pipeline::model::PipelineConfig;
//! use aigenflow_pipeline::pipeline::{PipelineOrchestrator, orchestrator::OrchestratorConfig};
//! use aigenflow_pipeline::router::AgentRouter;
//! use aigenflow_pipeline::template::VerbatimTemplateRenderer;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let router = Arc::new(AgentRouter::new(120));
//! // router.register_provider(ProviderTag::Claude, my_claude_provider);
//!
//! let orchestrator = PipelineOrchestrator::new(
//!     router,
//!     Arc::new(VerbatimTemplateRenderer),
//!     None,
//!     OrchestratorConfig::default(),
//! );
//!
//! let config = PipelineConfig::new("AI-powered sustainable agriculture business")?;
//! let outcome = orchestrator.run_pipeline(config).await?;
//! println!("pipeline finished in state {:?}", outcome.session.state);
//! # Ok(())
//! # }
//! ```

#![allow(clippy::missing_errors_doc)]

pub mod batch;
pub mod cache;
pub mod context;
pub mod error;
pub mod model;
pub mod monitoring;
pub mod pipeline;
pub mod provider;
pub mod resilience;
pub mod router;
pub mod template;
pub mod tokens;

pub(crate) mod logging;

// Core data model
pub use model::{
    AgentResponse, DocumentType, PhaseResult, PhaseStatus, PipelineConfig, PipelineSession,
    PipelineState, ProviderTag,
};

// Errors
pub use error::{ErrorCategory, PipelineError, PipelineResult};

// Provider contract
pub use provider::{GatewayRequest, GatewayResponse, Provider};

// Routing
pub use router::AgentRouter;

// Caching
pub use cache::{CacheManager, CacheStore};

// Resilience
pub use resilience::{FallbackChain, FallbackConfig, FallbackDecision};

// Batch processing
pub use batch::{BatchProcessor, BatchQueue};

// Context summarization
pub use context::summarizer::{ContextSummarizer, SummaryConfig, SummaryResult};

// Token/cost accounting
pub use monitoring::{CostCalculator, StatsCollector, TokenTracker};

// Token counting
pub use tokens::{default_token_counter, window_limit, TokenCount, TokenCounter};

// Top-level orchestration
pub use pipeline::{PhaseExecutor, PipelineOrchestrator, RunOutcome};
