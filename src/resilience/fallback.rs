//! FallbackChain (spec §4.5), grounded on
//! `original_source/src/resilience/fallback_chain.py`. Circuit breaker state
//! machine shape borrowed from `darval-multi-llm/src/internals/retry.rs`'s
//! `CircuitBreaker`/`CircuitState`, generalized here to one breaker per
//! provider tag behind a single guarded map (spec §5: "process-wide mutable
//! map keyed by provider tag; reads and writes must be mutually exclusive").

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::logging::{log_info, log_warn};
use crate::model::{AgentResponse, ProviderTag};
use crate::provider::{GatewayRequest, Provider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct CircuitEntry {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

impl Default for CircuitEntry {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FallbackConfig {
    pub provider_order: Vec<ProviderTag>,
    pub max_retries: u32,
    pub max_fallbacks: u32,
    pub circuit_breaker_enabled: bool,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_timeout: Duration,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            provider_order: vec![
                ProviderTag::Claude,
                ProviderTag::Gemini,
                ProviderTag::ChatGpt,
                ProviderTag::Perplexity,
            ],
            max_retries: 2,
            max_fallbacks: 3,
            circuit_breaker_enabled: true,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout: Duration::from_secs(60),
        }
    }
}

/// Classification of why a provider call did not succeed (spec §4.5
/// `Decision()` rules).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    Timeout(String),
    ConnectionError(String),
    RateLimit(String),
    ResponseError(String),
    Unknown(String),
}

impl FallbackReason {
    pub fn message(&self) -> &str {
        match self {
            Self::Timeout(m)
            | Self::ConnectionError(m)
            | Self::RateLimit(m)
            | Self::ResponseError(m)
            | Self::Unknown(m) => m,
        }
    }

    fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout(message)
        } else if lower.contains("connection") {
            Self::ConnectionError(message)
        } else if lower.contains("rate limit") {
            Self::RateLimit(message)
        } else {
            Self::ResponseError(message)
        }
    }
}

/// Tagged-union outcome of `Decision()` (spec §9: model as a sum type, not a
/// string).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackDecision {
    Success,
    Retry { reason: Option<FallbackReason> },
    Fallback { next_provider: ProviderTag, reason: Option<FallbackReason> },
    Fail { reason: Option<FallbackReason> },
}

struct FallbackContext {
    current_provider: ProviderTag,
    attempt_number: u32,
    previous_errors: Vec<String>,
    fallback_count: u32,
}

pub struct FallbackChain {
    config: FallbackConfig,
    circuits: Mutex<HashMap<ProviderTag, CircuitEntry>>,
}

impl FallbackChain {
    pub fn new(config: FallbackConfig) -> Self {
        Self {
            config,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    fn next_provider(&self, current: ProviderTag) -> Option<ProviderTag> {
        let index = self.config.provider_order.iter().position(|p| *p == current)?;
        self.config.provider_order.get(index + 1).copied()
    }

    fn is_circuit_open(&self, provider: ProviderTag) -> bool {
        if !self.config.circuit_breaker_enabled {
            return false;
        }
        let mut circuits = self.circuits.lock().unwrap();
        let entry = circuits.entry(provider).or_default();
        match entry.state {
            CircuitState::Open => {
                let elapsed = entry.last_failure.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed > self.config.circuit_breaker_timeout {
                    entry.state = CircuitState::HalfOpen;
                    false
                } else {
                    true
                }
            }
            CircuitState::Closed | CircuitState::HalfOpen => false,
        }
    }

    fn record_success(&self, provider: ProviderTag) {
        let mut circuits = self.circuits.lock().unwrap();
        let entry = circuits.entry(provider).or_default();
        entry.state = CircuitState::Closed;
        entry.consecutive_failures = 0;
        entry.last_failure = None;
    }

    fn record_failure(&self, provider: ProviderTag) {
        if !self.config.circuit_breaker_enabled {
            return;
        }
        let mut circuits = self.circuits.lock().unwrap();
        let entry = circuits.entry(provider).or_default();
        entry.consecutive_failures += 1;
        entry.last_failure = Some(Instant::now());
        if entry.consecutive_failures >= self.config.circuit_breaker_threshold {
            if entry.state != CircuitState::Open {
                log_warn!(%provider, failures = entry.consecutive_failures, "circuit breaker opened");
            }
            entry.state = CircuitState::Open;
        } else if entry.state == CircuitState::HalfOpen {
            entry.state = CircuitState::Open;
        }
    }

    fn decide(
        &self,
        response: Option<&AgentResponse>,
        error: Option<String>,
        context: &FallbackContext,
    ) -> FallbackDecision {
        if let Some(response) = response {
            if response.success {
                return FallbackDecision::Success;
            }
        }

        let reason = error
            .or_else(|| response.and_then(|r| r.error.clone()))
            .map(FallbackReason::classify);

        if context.attempt_number <= self.config.max_retries {
            return FallbackDecision::Retry { reason };
        }

        if let Some(next_provider) = self.next_provider(context.current_provider) {
            if context.fallback_count < self.config.max_fallbacks {
                return FallbackDecision::Fallback { next_provider, reason };
            }
        }

        FallbackDecision::Fail { reason }
    }

    /// Drive `request` through the chain starting at `initial_provider`,
    /// trying the providers registered in `providers` in fallback order.
    pub async fn execute(
        &self,
        request: GatewayRequest,
        initial_provider: ProviderTag,
        providers: &HashMap<ProviderTag, Arc<dyn Provider>>,
    ) -> AgentResponse {
        let original_provider = initial_provider;
        let mut context = FallbackContext {
            current_provider: initial_provider,
            attempt_number: 1,
            previous_errors: Vec::new(),
            fallback_count: 0,
        };

        loop {
            if self.is_circuit_open(context.current_provider) {
                log_info!(provider = %context.current_provider, "circuit open, skipping provider");
                match self.next_provider(context.current_provider) {
                    Some(next) => {
                        context.current_provider = next;
                        context.fallback_count += 1;
                        continue;
                    }
                    None => {
                        return self.synthesize_failure(original_provider, &request.task_name, &context);
                    }
                }
            }

            let Some(provider) = providers.get(&context.current_provider) else {
                context.previous_errors.push(format!("no provider registered for {}", context.current_provider));
                let decision = FallbackDecision::Fail { reason: None };
                if let Some(outcome) = self.apply_decision(
                    decision,
                    &mut context,
                    original_provider,
                    &request.task_name,
                ) {
                    return outcome;
                }
                continue;
            };

            let decision = match provider.send_message(request.clone()).await {
                Ok(gateway_response) if gateway_response.success => {
                    self.record_success(context.current_provider);
                    let mut response = AgentResponse::success(
                        context.current_provider,
                        &request.task_name,
                        gateway_response.content,
                    );
                    response.tokens_used = gateway_response.tokens_used;
                    response.response_time = gateway_response.response_time;
                    response.metadata = gateway_response.metadata;
                    if context.fallback_count > 0 {
                        response.metadata.insert(
                            "fallback_used".to_string(),
                            serde_json::Value::Bool(true),
                        );
                        response.metadata.insert(
                            "original_provider".to_string(),
                            serde_json::Value::String(original_provider.as_str().to_string()),
                        );
                        response.metadata.insert(
                            "final_provider".to_string(),
                            serde_json::Value::String(context.current_provider.as_str().to_string()),
                        );
                    }
                    return response;
                }
                Ok(gateway_response) => {
                    let error = gateway_response.error.unwrap_or_else(|| "request failed".to_string());
                    context.previous_errors.push(error.clone());
                    let response = AgentResponse::failure(context.current_provider, &request.task_name, error);
                    self.decide(Some(&response), None, &context)
                }
                Err(err) => {
                    context.previous_errors.push(err.to_string());
                    self.decide(None, Some(err.to_string()), &context)
                }
            };

            if let Some(outcome) = self.apply_decision(decision, &mut context, original_provider, &request.task_name) {
                return outcome;
            }
        }
    }

    /// Apply a non-success decision: mutate `context` in place and either
    /// return `Some(outcome)` to terminate the loop or `None` to continue it.
    fn apply_decision(
        &self,
        decision: FallbackDecision,
        context: &mut FallbackContext,
        original_provider: ProviderTag,
        task_name: &str,
    ) -> Option<AgentResponse> {
        match decision {
            FallbackDecision::Success => None,
            FallbackDecision::Retry { .. } => {
                context.attempt_number += 1;
                None
            }
            FallbackDecision::Fallback { next_provider, reason } => {
                self.record_failure(context.current_provider);
                log_warn!(
                    from = %context.current_provider,
                    to = %next_provider,
                    reason = reason.as_ref().map(|r| r.message().to_string()).unwrap_or_default(),
                    "fallback triggered"
                );
                context.current_provider = next_provider;
                context.fallback_count += 1;
                context.attempt_number = 1;
                None
            }
            FallbackDecision::Fail { .. } => {
                self.record_failure(context.current_provider);
                let _ = task_name;
                Some(self.synthesize_failure(original_provider, task_name, context))
            }
        }
    }

    fn synthesize_failure(
        &self,
        original_provider: ProviderTag,
        task_name: &str,
        context: &FallbackContext,
    ) -> AgentResponse {
        let tail: Vec<&String> = context.previous_errors.iter().rev().take(3).collect();
        let tail: Vec<String> = tail.into_iter().rev().cloned().collect();
        let mut response = AgentResponse::failure(
            context.current_provider,
            task_name,
            format!("all providers exhausted. errors: {}", tail.join("; ")),
        );
        response.metadata.insert(
            "original_provider".to_string(),
            serde_json::Value::String(original_provider.as_str().to_string()),
        );
        response.metadata.insert(
            "fallback_count".to_string(),
            serde_json::Value::Number(context.fallback_count.into()),
        );
        response.metadata.insert(
            "total_attempts".to_string(),
            serde_json::Value::Number(context.attempt_number.into()),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::GatewayResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedProvider {
        outcomes: Mutex<Vec<bool>>,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(outcomes: Vec<bool>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn send_message(&self, _request: GatewayRequest) -> anyhow::Result<GatewayResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            let succeed = if outcomes.is_empty() { false } else { outcomes.remove(0) };
            if succeed {
                Ok(GatewayResponse::ok("ok"))
            } else {
                Ok(GatewayResponse::fail("mock"))
            }
        }

        async fn check_session(&self) -> anyhow::Result<bool> {
            Ok(true)
        }
        async fn login_flow(&self) -> anyhow::Result<()> {
            Ok(())
        }
        fn save_session(&self) {}
        fn load_session(&self) -> bool {
            true
        }
    }

    fn providers_map(claude_outcomes: Vec<bool>, gemini_outcomes: Vec<bool>) -> HashMap<ProviderTag, Arc<dyn Provider>> {
        let mut map: HashMap<ProviderTag, Arc<dyn Provider>> = HashMap::new();
        map.insert(ProviderTag::Claude, Arc::new(ScriptedProvider::new(claude_outcomes)));
        map.insert(ProviderTag::Gemini, Arc::new(ScriptedProvider::new(gemini_outcomes)));
        map
    }

    #[tokio::test]
    async fn e3_fallback_success_after_retries() {
        let config = FallbackConfig { max_retries: 1, ..Default::default() };
        let chain = FallbackChain::new(config);
        let providers = providers_map(vec![false, false], vec![true]);
        let request = GatewayRequest::new("narrative_claude", "prompt", 30);

        let response = chain.execute(request, ProviderTag::Claude, &providers).await;
        assert!(response.success);
        assert_eq!(
            response.metadata.get("fallback_used"),
            Some(&serde_json::Value::Bool(true))
        );
        assert_eq!(
            response.metadata.get("original_provider"),
            Some(&serde_json::Value::String("claude".to_string()))
        );
        assert_eq!(
            response.metadata.get("final_provider"),
            Some(&serde_json::Value::String("gemini".to_string()))
        );
    }

    #[tokio::test]
    async fn e4_circuit_opens_after_threshold() {
        let config = FallbackConfig {
            circuit_breaker_threshold: 3,
            max_retries: 0,
            ..Default::default()
        };
        let chain = FallbackChain::new(config);

        let claude = Arc::new(ScriptedProvider::new(vec![false, false, false, false]));
        let gemini = Arc::new(ScriptedProvider::new(vec![true, true, true, true]));
        let mut providers: HashMap<ProviderTag, Arc<dyn Provider>> = HashMap::new();
        providers.insert(ProviderTag::Claude, claude.clone());
        providers.insert(ProviderTag::Gemini, gemini.clone());

        for _ in 0..4 {
            let request = GatewayRequest::new("validate_claude", "prompt", 30);
            let response = chain.execute(request, ProviderTag::Claude, &providers).await;
            assert!(response.success);
        }

        assert_eq!(claude.calls.load(Ordering::SeqCst), 3, "claude must not be called once circuit opens");
        assert_eq!(gemini.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn reason_classification() {
        assert_eq!(
            FallbackReason::classify("Connection refused"),
            FallbackReason::ConnectionError("Connection refused".to_string())
        );
        assert_eq!(
            FallbackReason::classify("request timed out"),
            FallbackReason::Timeout("request timed out".to_string())
        );
        assert_eq!(
            FallbackReason::classify("rate limit exceeded"),
            FallbackReason::RateLimit("rate limit exceeded".to_string())
        );
    }
}
