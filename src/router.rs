//! AgentRouter (spec §4.6), grounded on `original_source/src/agents/router.py`.
//! Holds the static (phase, task, doc-type) -> provider table and the registry
//! of constructed provider instances; this is the single seam through which
//! `PhaseExecutor` and `ContextSummarizer` reach a provider, so tests can swap
//! in mock providers here alone.
//!
//! `execute` reproduces the Flow line from spec §2 end to end: a cache lookup
//! before dispatch, the actual send through `FallbackChain` (retry/fallback/
//! circuit-breaking across the provider list) rather than a bare
//! `Provider::send_message`, a cache store on success, and a `TokenTracker`
//! entry for every request that actually reached a provider (cache hits are
//! never tracked — spec §9's open question on cache-hit cost attribution).

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::key::{generate_cache_key, CacheKeyInput};
use crate::cache::manager::CacheManager;
use crate::error::{PipelineError, PipelineResult};
use crate::model::{AgentResponse, DocumentType, ProviderTag};
use crate::monitoring::calculator::CostCalculator;
use crate::monitoring::tracker::{TokenTracker, TokenUsage};
use crate::provider::{GatewayRequest, GatewayResponse, Provider};
use crate::resilience::fallback::{FallbackChain, FallbackConfig};
use crate::tokens::{default_token_counter, TokenCounter};

/// Composite lookup key for the routing table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub phase: u8,
    pub task: &'static str,
    pub doc_type: DocumentType,
}

/// A mapping entry's target: the primary provider tag plus an optional
/// fallback tag, consulted only when the primary has no registered instance
/// (spec §11.1, grounded on `original_source/src/agents/router.py`'s
/// `AgentMapping.fallback` field). The canonical Task Assignments table
/// never sets a fallback; this is additive for routers embedders build
/// themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentMapping {
    pub primary: ProviderTag,
    pub fallback: Option<ProviderTag>,
}

impl AgentMapping {
    pub fn new(primary: ProviderTag) -> Self {
        Self { primary, fallback: None }
    }

    pub fn with_fallback(primary: ProviderTag, fallback: ProviderTag) -> Self {
        Self { primary, fallback: Some(fallback) }
    }
}

/// The canonical (phase, task, doc-type) -> provider assignments (Glossary,
/// §Task Assignments). `doc_type` is always `Bizplan` today; the table is
/// keyed on it anyway so a future document type can extend it without
/// touching callers.
pub fn default_mapping() -> HashMap<RouteKey, AgentMapping> {
    use DocumentType::Bizplan;
    use ProviderTag::*;

    let pairs: &[(u8, &'static str, ProviderTag)] = &[
        (1, "brainstorm_chatgpt", ChatGpt),
        (1, "validate_claude", Claude),
        (2, "deep_search_gemini", Gemini),
        (2, "fact_check_perplexity", Perplexity),
        (3, "swot_chatgpt", ChatGpt),
        (3, "narrative_claude", Claude),
        (4, "business_plan_claude", Claude),
        (4, "outline_chatgpt", ChatGpt),
        (4, "charts_gemini", Gemini),
        (5, "verify_perplexity", Perplexity),
        (5, "final_review_claude", Claude),
        (5, "polish_claude", Claude),
    ];

    pairs
        .iter()
        .map(|(phase, task, agent)| {
            (
                RouteKey {
                    phase: *phase,
                    task,
                    doc_type: Bizplan,
                },
                AgentMapping::new(*agent),
            )
        })
        .collect()
}

pub struct AgentRouter {
    mapping: HashMap<RouteKey, AgentMapping>,
    providers: HashMap<ProviderTag, Arc<dyn Provider>>,
    default_timeout_seconds: u64,
    fallback: FallbackChain,
    cache: Option<Arc<CacheManager>>,
    tracker: Option<Arc<TokenTracker>>,
    cost_calculator: CostCalculator,
    token_counter: Arc<dyn TokenCounter>,
}

impl AgentRouter {
    pub fn new(default_timeout_seconds: u64) -> Self {
        Self {
            mapping: default_mapping(),
            providers: HashMap::new(),
            default_timeout_seconds,
            fallback: FallbackChain::new(FallbackConfig::default()),
            cache: None,
            tracker: None,
            cost_calculator: CostCalculator::default(),
            token_counter: default_token_counter(),
        }
    }

    pub fn register_provider(&mut self, tag: ProviderTag, provider: Arc<dyn Provider>) {
        self.providers.insert(tag, provider);
    }

    /// Enable the cache lookup/store steps of the Flow line (spec §4.3).
    /// Disabled by default, so a bare router dispatches straight through.
    pub fn set_cache(&mut self, cache: Arc<CacheManager>) {
        self.cache = Some(cache);
    }

    /// Enable per-request token/cost accounting (spec §4.8/§11.2). Disabled
    /// by default.
    pub fn set_tracker(&mut self, tracker: Arc<TokenTracker>, cost_calculator: CostCalculator) {
        self.tracker = Some(tracker);
        self.cost_calculator = cost_calculator;
    }

    pub fn set_token_counter(&mut self, token_counter: Arc<dyn TokenCounter>) {
        self.token_counter = token_counter;
    }

    /// Replace the retry/fallback/circuit-breaker policy (spec §4.5); a
    /// fresh chain starts with every circuit closed.
    pub fn set_fallback_config(&mut self, config: FallbackConfig) {
        self.fallback = FallbackChain::new(config);
    }

    /// Attach or replace a fallback tag on an existing mapping entry. A
    /// no-op (silently) if the entry doesn't exist — callers that need this
    /// build their own mapping rather than extend the canonical table.
    pub fn set_fallback(&mut self, phase: u8, task: &'static str, doc_type: DocumentType, fallback: ProviderTag) {
        if let Some(entry) = self
            .mapping
            .iter_mut()
            .find(|(key, _)| key.phase == phase && key.task == task && key.doc_type == doc_type)
            .map(|(_, mapping)| mapping)
        {
            entry.fallback = Some(fallback);
        }
    }

    fn resolve(&self, phase: u8, task: &str, doc_type: DocumentType) -> PipelineResult<AgentMapping> {
        self.mapping
            .iter()
            .find(|(key, _)| key.phase == phase && key.task == task && key.doc_type == doc_type)
            .map(|(_, mapping)| *mapping)
            .ok_or_else(|| PipelineError::no_mapping(phase, task, doc_type_tag(doc_type)))
    }

    /// Resolve a mapping to a registered provider tag: the primary tag
    /// first, falling back to the mapping's fallback tag only when the
    /// primary has no registered instance (spec §4.6/§11.1). This only picks
    /// where `FallbackChain` starts — the actual send, its retries, and any
    /// cross-provider fallback on failure happen inside `execute` below.
    fn resolve_initial_provider(&self, mapping: AgentMapping) -> PipelineResult<ProviderTag> {
        if self.providers.contains_key(&mapping.primary) {
            return Ok(mapping.primary);
        }
        if let Some(fallback) = mapping.fallback {
            if self.providers.contains_key(&fallback) {
                return Ok(fallback);
            }
            return Err(PipelineError::no_provider(format!(
                "{} (fallback {} also unregistered)",
                mapping.primary, fallback
            )));
        }
        Err(PipelineError::no_provider(mapping.primary.as_str()))
    }

    /// Look up the mapping, resolve the starting provider tag, and dispatch
    /// through the Flow line in full: `CacheManager` (lookup) ->
    /// `FallbackChain` -> `Provider` -> `CacheManager` (store) ->
    /// `TokenTracker`. Returns a normalized [`AgentResponse`] — never a raw
    /// provider error; a provider-level failure becomes `success = false`.
    /// A cache hit short-circuits before the provider is ever touched and is
    /// never tracked, matching the open question on cache-hit cost
    /// attribution recorded in the design notes.
    pub async fn execute(
        &self,
        phase: u8,
        task: &str,
        prompt: String,
        doc_type: DocumentType,
    ) -> PipelineResult<AgentResponse> {
        let mapping = self.resolve(phase, task, doc_type)?;
        let initial_tag = self.resolve_initial_provider(mapping)?;

        let cache_key = self.cache.as_ref().map(|_| {
            generate_cache_key(&CacheKeyInput {
                prompt: prompt.clone(),
                context: None,
                agent: Some(initial_tag),
                phase: Some(phase),
                model: None,
            })
        });

        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(cached) = cache.get(key) {
                let mut response = AgentResponse::success(initial_tag, task, cached.content);
                response.tokens_used = cached.tokens_used;
                response.response_time = cached.response_time;
                response.metadata = cached.metadata;
                response
                    .metadata
                    .insert("cache_hit".to_string(), serde_json::Value::Bool(true));
                return Ok(response);
            }
        }

        let request = GatewayRequest::new(task, prompt.clone(), self.default_timeout_seconds);
        let started = std::time::Instant::now();
        let mut response = self.fallback.execute(request, initial_tag, &self.providers).await;
        if response.response_time <= 0.0 {
            response.response_time = started.elapsed().as_secs_f64();
        }

        if response.success {
            if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
                let cacheable = GatewayResponse {
                    content: response.content.clone(),
                    success: true,
                    error: None,
                    tokens_used: response.tokens_used,
                    response_time: response.response_time,
                    metadata: response.metadata.clone(),
                };
                cache.set(key, cacheable, None);
            }

            if let Some(tracker) = &self.tracker {
                let model = response.agent_name.as_str();
                let input_tokens = self.token_counter.count(&prompt, model).total_tokens;
                let output_tokens = self.token_counter.count(&response.content, model).total_tokens;
                tracker.track(TokenUsage::new(
                    response.agent_name,
                    input_tokens,
                    output_tokens,
                    phase,
                    task,
                    &self.cost_calculator,
                ));
            }
        }

        Ok(response)
    }
}

fn doc_type_tag(doc_type: DocumentType) -> &'static str {
    match doc_type {
        DocumentType::Bizplan => "bizplan",
        DocumentType::Rd => "rd",
    }
}
