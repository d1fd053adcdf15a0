//! ContextSummarizer (spec §4.7), grounded on
//! `original_source/src/context/summarizer.py`.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;

use crate::logging::{log_debug, log_info, log_warn};
use crate::model::{DocumentType, PhaseResult, PhaseStatus, ProviderTag};
use crate::router::AgentRouter;
use crate::tokens::{window_limit, TokenCounter};

/// Excerpt length per response when building the summarization input, to
/// avoid double-summarizing an already-huge prior output.
const CONTENT_EXCERPT_CHARS: usize = 500;
const MIN_CONTEXT_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct SummaryConfig {
    pub enabled: bool,
    pub target_reduction_ratio: f64,
    pub backing_provider: ProviderTag,
    pub max_retries: u32,
    pub preserve_sections: Vec<String>,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_reduction_ratio: 0.5,
            backing_provider: ProviderTag::Claude,
            max_retries: 2,
            preserve_sections: vec![
                "decisions".to_string(),
                "metrics".to_string(),
                "citations".to_string(),
                "action items".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct SummaryResult {
    pub original_text: String,
    pub summary_text: String,
    pub tokens_original: u64,
    pub tokens_summary: u64,
    pub reduction_ratio: f64,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SummaryResult {
    fn disabled() -> Self {
        Self {
            original_text: String::new(),
            summary_text: String::new(),
            tokens_original: 0,
            tokens_summary: 0,
            reduction_ratio: 0.0,
            success: false,
            error: Some("summarization disabled".to_string()),
            timestamp: Utc::now(),
        }
    }

    fn pass_through(context: String, tokens: u64) -> Self {
        Self {
            original_text: context.clone(),
            summary_text: context,
            tokens_original: tokens,
            tokens_summary: tokens,
            reduction_ratio: 0.0,
            success: true,
            error: None,
            timestamp: Utc::now(),
        }
    }

    fn failure(original_text: String, error: String) -> Self {
        Self {
            original_text,
            summary_text: String::new(),
            tokens_original: 0,
            tokens_summary: 0,
            reduction_ratio: 0.0,
            success: false,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }
}

/// The summarization prompt template: asks for a target-ratio compression
/// while enumerating the section types that must be preserved verbatim.
fn build_prompt(context: &str, target_ratio: f64, preserve_sections: &[String]) -> String {
    format!(
        "Please summarize the following context from previous pipeline phases while preserving:\n\n\
         {}\n\n\
         Target: reduce to approximately {:.0}% of the original token count while maintaining \
         the information above.\n\n\
         Context to summarize:\n-----------\n{}\n-----------\n\n\
         Provide a concise summary that captures the essential information.",
        preserve_sections
            .iter()
            .enumerate()
            .map(|(i, section)| format!("{}. {}", i + 1, section))
            .collect::<Vec<_>>()
            .join("\n"),
        target_ratio * 100.0,
        context
    )
}

pub struct ContextSummarizer {
    config: SummaryConfig,
    token_counter: std::sync::Arc<dyn TokenCounter>,
    summaries: Mutex<std::collections::HashMap<u8, SummaryResult>>,
}

impl ContextSummarizer {
    pub fn new(config: SummaryConfig, token_counter: std::sync::Arc<dyn TokenCounter>) -> Self {
        Self {
            config,
            token_counter,
            summaries: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Serialize all completed/skipped results before `current_phase` into a
    /// single context block. Each response's content is excerpted to
    /// `CONTENT_EXCERPT_CHARS` to avoid summarizing an already-huge output.
    fn extract_context(&self, results: &[PhaseResult], current_phase: u8) -> String {
        let mut sections = Vec::new();
        for result in results.iter().filter(|r| r.phase_number < current_phase) {
            if !matches!(result.status, PhaseStatus::Completed | PhaseStatus::Skipped) {
                continue;
            }
            sections.push(format!("## Phase {}: {}", result.phase_number, result.phase_name));
            for (idx, response) in result.ai_responses.iter().enumerate() {
                sections.push(format!(
                    "\nTask {} ({}): {}",
                    idx + 1,
                    response.agent_name,
                    response.task_name
                ));
                let mut excerpt: String = response.content.chars().take(CONTENT_EXCERPT_CHARS).collect();
                if response.content.chars().count() > CONTENT_EXCERPT_CHARS {
                    excerpt.push_str("\n...(truncated for summary input)");
                }
                sections.push(excerpt);
            }
            if !result.summary.is_empty() {
                sections.push(format!("\nPhase Summary:\n{}", result.summary));
            }
            sections.push(format!("\n{}\n", "-".repeat(50)));
        }
        sections.join("\n")
    }

    /// Spec §4.7: gate whether a phase start should trigger summarization.
    /// False when there are no prior results, independent of token count.
    pub fn should_summarize(
        &self,
        results: &[PhaseResult],
        current_phase: u8,
        provider: ProviderTag,
        threshold: f64,
    ) -> bool {
        let previous_exists = results.iter().any(|r| r.phase_number < current_phase);
        if !previous_exists {
            return false;
        }
        let context = self.extract_context(results, current_phase);
        let count = self.token_counter.count(&context, provider.as_str());
        count.total_tokens as f64 / window_limit(provider) as f64 >= threshold
    }

    async fn invoke_backing_provider(&self, router: &AgentRouter, prompt: String) -> anyhow::Result<String> {
        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            // The pipeline reuses an existing routed task for summarization
            // rather than adding a dedicated one — grounded on
            // `original_source/src/context/summarizer.py`'s reuse of
            // `PhaseTask.NARRATIVE_CLAUDE`.
            let response = router
                .execute(3, "narrative_claude", prompt.clone(), DocumentType::Bizplan)
                .await;

            match response {
                Ok(response) if response.success => return Ok(response.content),
                Ok(response) => {
                    last_error = Some(response.error.unwrap_or_else(|| "summarization failed".to_string()));
                }
                Err(err) => last_error = Some(err.to_string()),
            }

            log_warn!(
                attempt = attempt + 1,
                max_attempts = self.config.max_retries + 1,
                "context summarization attempt failed"
            );
            if attempt < self.config.max_retries {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
        Err(anyhow::anyhow!(
            "summarization failed after {} attempts: {}",
            self.config.max_retries + 1,
            last_error.unwrap_or_default()
        ))
    }

    /// Compress the prior-phase context into a summary, never raising — a
    /// final failure is returned as `success = false` so the orchestrator can
    /// continue with the original, unsummarized context (spec §4.7/§7).
    pub async fn summarize(
        &self,
        router: &AgentRouter,
        results: &[PhaseResult],
        current_phase: u8,
    ) -> SummaryResult {
        if !self.config.enabled {
            return SummaryResult::disabled();
        }

        let backing_model = self.config.backing_provider.as_str();
        let context = self.extract_context(results, current_phase);
        if context.trim().chars().count() < MIN_CONTEXT_CHARS {
            log_debug!(phase = current_phase, "insufficient context to summarize, passing through");
            let tokens = self.token_counter.count(&context, backing_model).total_tokens;
            return SummaryResult::pass_through(context, tokens);
        }

        let original_tokens = self.token_counter.count(&context, backing_model).total_tokens;
        let prompt = build_prompt(&context, self.config.target_reduction_ratio, &self.config.preserve_sections);

        log_info!(
            phase = current_phase,
            original_tokens,
            target_ratio = self.config.target_reduction_ratio,
            "starting context summarization"
        );

        let result = match self.invoke_backing_provider(router, prompt).await {
            Ok(summary_text) => {
                let summary_tokens = self.token_counter.count(&summary_text, backing_model).total_tokens;
                let reduction_ratio = if original_tokens > 0 {
                    1.0 - (summary_tokens as f64 / original_tokens as f64)
                } else {
                    0.0
                };
                SummaryResult {
                    original_text: context,
                    summary_text,
                    tokens_original: original_tokens,
                    tokens_summary: summary_tokens,
                    reduction_ratio,
                    success: true,
                    error: None,
                    timestamp: Utc::now(),
                }
            }
            Err(err) => SummaryResult::failure(context, err.to_string()),
        };

        if result.success {
            self.summaries.lock().unwrap().insert(current_phase, result.clone());
        }
        result
    }

    /// The provider invoked to perform the compression itself — also the
    /// provider whose window limit gates whether summarization triggers.
    pub fn backing_provider(&self) -> ProviderTag {
        self.config.backing_provider
    }

    pub fn summary_for(&self, phase: u8) -> Option<SummaryResult> {
        self.summaries.lock().unwrap().get(&phase).cloned()
    }

    pub fn all_summaries(&self) -> std::collections::HashMap<u8, SummaryResult> {
        self.summaries.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AgentResponse;
    use crate::provider::{GatewayRequest, GatewayResponse, Provider};
    use crate::tokens::EstimatingTokenCounter;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct StubClaude;

    #[async_trait]
    impl Provider for StubClaude {
        async fn send_message(&self, _request: GatewayRequest) -> anyhow::Result<GatewayResponse> {
            Ok(GatewayResponse::ok("a".repeat(20)))
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

    fn completed_result(phase: u8, content: &str) -> PhaseResult {
        let mut result = PhaseResult::new(phase, format!("Phase {phase}"));
        result.status = PhaseStatus::Completed;
        result.ai_responses.push(AgentResponse::success(ProviderTag::Claude, "task", content));
        result
    }

    #[test]
    fn should_summarize_false_with_no_prior_results() {
        let summarizer = ContextSummarizer::new(SummaryConfig::default(), Arc::new(EstimatingTokenCounter));
        assert!(!summarizer.should_summarize(&[], 1, ProviderTag::Claude, 0.8));
    }

    #[test]
    fn should_summarize_true_above_threshold() {
        let summarizer = ContextSummarizer::new(SummaryConfig::default(), Arc::new(EstimatingTokenCounter));
        let huge_content = "x".repeat(900_000); // ~225k estimated tokens > 0.8 * 200k
        let results = vec![completed_result(1, &huge_content)];
        assert!(summarizer.should_summarize(&results, 2, ProviderTag::Claude, 0.8));
    }

    #[tokio::test]
    async fn summarize_passes_through_short_context() {
        let summarizer = ContextSummarizer::new(SummaryConfig::default(), Arc::new(EstimatingTokenCounter));
        let mut router = AgentRouter::new(30);
        router.register_provider(ProviderTag::Claude, Arc::new(StubClaude));
        let results = vec![completed_result(1, "hi")];
        let result = summarizer.summarize(&router, &results, 2).await;
        assert!(result.success);
        assert_eq!(result.summary_text, result.original_text);
    }

    #[tokio::test]
    async fn summarize_reduces_tokens_on_success() {
        let summarizer = ContextSummarizer::new(SummaryConfig::default(), Arc::new(EstimatingTokenCounter));
        let mut router = AgentRouter::new(30);
        router.register_provider(ProviderTag::Claude, Arc::new(StubClaude));
        let long_content = "word ".repeat(500);
        let results = vec![completed_result(1, &long_content)];
        let result = summarizer.summarize(&router, &results, 2).await;
        assert!(result.success);
        assert!(result.tokens_summary < result.tokens_original);
        assert!(result.reduction_ratio >= 0.0 && result.reduction_ratio <= 1.0);
    }
}
