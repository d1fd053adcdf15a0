//! PipelineOrchestrator (spec §4.10), grounded on
//! `original_source/src/pipeline/orchestrator.py`. The top-level state
//! machine: creates sessions, runs phases 1..5 in order, persists state
//! synchronously after every phase, and finalizes to COMPLETED or FAILED.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::context::summarizer::ContextSummarizer;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::{log_error, log_info, log_warn};
use crate::model::{PhaseResult, PhaseStatus, PipelineConfig, PipelineSession, PipelineState};
use crate::pipeline::executor::PhaseExecutor;
use crate::router::AgentRouter;
use crate::template::TemplateRenderer;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Fraction of the backing provider's context window that must be
    /// occupied by prior-phase output before a phase start triggers
    /// summarization (spec §4.7/§4.8, invariant 12).
    pub summarization_threshold: f64,
    /// Route phase 2 through `BatchProcessor` instead of sequential
    /// dispatch (spec §4.9's "MAY enable batch processing").
    pub use_batch_phase2: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            summarization_threshold: 0.8,
            use_batch_phase2: false,
        }
    }
}

/// What `RunPipeline` hands back to the caller: the terminal session plus
/// where its `pipeline_state.json` was written, so a caller can locate it
/// for a later resume without recomputing the path itself.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub session: PipelineSession,
    pub state_path: PathBuf,
}

pub struct PipelineOrchestrator {
    router: Arc<AgentRouter>,
    template: Arc<dyn TemplateRenderer>,
    summarizer: Option<Arc<ContextSummarizer>>,
    executors: Vec<PhaseExecutor>,
    config: OrchestratorConfig,
}

impl PipelineOrchestrator {
    pub fn new(
        router: Arc<AgentRouter>,
        template: Arc<dyn TemplateRenderer>,
        summarizer: Option<Arc<ContextSummarizer>>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            router,
            template,
            summarizer,
            executors: (1..=5u8).map(PhaseExecutor::new).collect(),
            config,
        }
    }

    /// Create a fresh session from `config` and run it to completion (or
    /// failure).
    pub async fn run_pipeline(&self, config: PipelineConfig) -> PipelineResult<RunOutcome> {
        let mut session = PipelineSession::new(config);
        self.drive(&mut session).await?;
        let state_path = session_dir(&session).join("pipeline_state.json");
        Ok(RunOutcome { session, state_path })
    }

    /// Resume a caller-seeded session — typically deserialized from a prior
    /// run's `pipeline_state.json`. Starts at `max(current_phase + 1,
    /// from_phase)`; already-completed PhaseResults are never re-run.
    pub async fn resume(&self, mut session: PipelineSession) -> PipelineResult<RunOutcome> {
        if session.state == PipelineState::Completed {
            return Err(PipelineError::resume_not_possible("session already completed"));
        }
        self.drive(&mut session).await?;
        let state_path = session_dir(&session).join("pipeline_state.json");
        Ok(RunOutcome { session, state_path })
    }

    async fn drive(&self, session: &mut PipelineSession) -> PipelineResult<()> {
        let dir = session_dir(session);
        std::fs::create_dir_all(&dir)
            .map_err(|err| PipelineError::persistence_failed(dir.clone(), err.to_string()))?;

        let start_phase = session
            .current_phase
            .saturating_add(1)
            .max(session.config.from_phase.unwrap_or(0));

        log_info!(session_id = %session.session_id, start_phase, "starting pipeline run");

        for phase in start_phase..=5u8 {
            if phase > 1 {
                self.maybe_summarize(session, phase).await;
            }

            let executor = &self.executors[(phase - 1) as usize];
            let result = if phase == 2 && self.config.use_batch_phase2 {
                executor.execute_batched(session, self.router.clone(), self.template.as_ref()).await
            } else {
                executor.execute(session, &self.router, self.template.as_ref()).await
            };

            let failed = result.status == PhaseStatus::Failed;
            session.add_result(result.clone());
            session.state = PipelineState::for_phase(phase);

            self.persist_phase_result(&dir, phase, &result)?;
            self.persist_state(&dir, session)?;

            if failed {
                log_warn!(session_id = %session.session_id, phase, "phase failed, halting pipeline");
                break;
            }
        }

        session.state = self.finalize_state(session);
        self.persist_state(&dir, session)?;
        log_info!(session_id = %session.session_id, state = ?session.state, "pipeline run finished");
        Ok(())
    }

    fn finalize_state(&self, session: &PipelineSession) -> PipelineState {
        let last_failed = session
            .results
            .last()
            .map(|r| r.status == PhaseStatus::Failed)
            .unwrap_or(false);
        if last_failed || session.current_phase < 5 {
            PipelineState::Failed
        } else {
            PipelineState::Completed
        }
    }

    async fn maybe_summarize(&self, session: &mut PipelineSession, phase: u8) {
        let Some(summarizer) = &self.summarizer else {
            return;
        };
        let provider = summarizer.backing_provider();
        if !summarizer.should_summarize(&session.results, phase, provider, self.config.summarization_threshold) {
            return;
        }

        let outcome = summarizer.summarize(&self.router, &session.results, phase).await;
        if !outcome.success {
            log_warn!(
                session_id = %session.session_id,
                phase,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "context summarization failed, continuing without it"
            );
        }
        let value = serde_json::json!({
            "success": outcome.success,
            "tokens_original": outcome.tokens_original,
            "tokens_summary": outcome.tokens_summary,
            "reduction_ratio": outcome.reduction_ratio,
            "error": outcome.error,
        });
        session.artifacts.insert(format!("context_summary_phase_{phase}"), value);
    }

    fn persist_phase_result(&self, dir: &Path, phase: u8, result: &PhaseResult) -> PipelineResult<()> {
        let path = dir.join(format!("phase{phase}_results.json"));
        write_json(&path, result)
    }

    fn persist_state(&self, dir: &Path, session: &PipelineSession) -> PipelineResult<()> {
        let path = dir.join("pipeline_state.json");
        write_json(&path, session)
    }
}

pub fn session_dir(session: &PipelineSession) -> PathBuf {
    session.config.output_dir.join(session.session_id.to_string())
}

/// Write-then-rename so a reader never observes a half-written file (spec
/// §5's atomicity requirement, applied here the same way `CacheStore` does
/// for its own entries).
fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> PipelineResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|err| PipelineError::persistence_failed(path.to_path_buf(), err.to_string()))?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json).map_err(|err| {
        log_error!(path = %path.display(), error = %err, "failed to write pipeline state");
        PipelineError::persistence_failed(path.to_path_buf(), err.to_string())
    })?;
    std::fs::rename(&tmp_path, path)
        .map_err(|err| PipelineError::persistence_failed(path.to_path_buf(), err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentType, ProviderTag};
    use crate::provider::{GatewayRequest, GatewayResponse, Provider};
    use crate::template::VerbatimTemplateRenderer;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct StubProvider {
        fail: bool,
    }

    #[async_trait]
    impl Provider for StubProvider {
        async fn send_message(&self, request: GatewayRequest) -> anyhow::Result<GatewayResponse> {
            if self.fail {
                Ok(GatewayResponse::fail("mock"))
            } else {
                Ok(GatewayResponse::ok(format!("Mock response for {}", request.task_name)))
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

    fn router_with_all(fail_gemini: bool) -> Arc<AgentRouter> {
        let mut router = AgentRouter::new(30);
        router.register_provider(ProviderTag::Claude, Arc::new(StubProvider { fail: false }));
        router.register_provider(ProviderTag::Gemini, Arc::new(StubProvider { fail: fail_gemini }));
        router.register_provider(ProviderTag::ChatGpt, Arc::new(StubProvider { fail: false }));
        router.register_provider(ProviderTag::Perplexity, Arc::new(StubProvider { fail: false }));
        if fail_gemini {
            // Pin fallback to Gemini alone so a scripted failure is genuinely
            // exhausted rather than silently recovered via ChatGpt/Perplexity.
            router.set_fallback_config(crate::resilience::FallbackConfig {
                provider_order: vec![ProviderTag::Gemini],
                max_retries: 0,
                ..Default::default()
            });
        }
        Arc::new(router)
    }

    fn config(output_dir: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::new("AI-powered sustainable agriculture business").unwrap();
        config.doc_type = DocumentType::Bizplan;
        config.language = "ko".to_string();
        config.output_dir = output_dir.to_path_buf();
        config
    }

    #[tokio::test]
    async fn e1_happy_path_completes_all_five_phases() {
        let dir = tempdir().unwrap();
        let orchestrator = PipelineOrchestrator::new(
            router_with_all(false),
            Arc::new(VerbatimTemplateRenderer),
            None,
            OrchestratorConfig::default(),
        );

        let outcome = orchestrator.run_pipeline(config(dir.path())).await.unwrap();
        assert_eq!(outcome.session.state, PipelineState::Completed);
        assert_eq!(outcome.session.results.len(), 5);
        let counts: Vec<usize> = outcome.session.results.iter().map(|r| r.ai_responses.len()).collect();
        assert_eq!(counts, vec![2, 2, 2, 3, 3]);
        assert!(outcome.state_path.exists());

        let raw = std::fs::read_to_string(&outcome.state_path).unwrap();
        let reloaded: PipelineSession = serde_json::from_str(&raw).unwrap();
        assert_eq!(reloaded.session_id, outcome.session.session_id);
        assert_eq!(reloaded.state, PipelineState::Completed);
    }

    #[tokio::test]
    async fn e2_phase_failure_halts_the_pipeline() {
        let dir = tempdir().unwrap();
        let orchestrator = PipelineOrchestrator::new(
            router_with_all(true),
            Arc::new(VerbatimTemplateRenderer),
            None,
            OrchestratorConfig::default(),
        );

        let outcome = orchestrator.run_pipeline(config(dir.path())).await.unwrap();
        assert_eq!(outcome.session.state, PipelineState::Failed);
        assert_eq!(outcome.session.results.len(), 2);
        assert_eq!(outcome.session.results[1].status, PhaseStatus::Failed);
        // Phase 2's declared order is deep_search_gemini (Gemini, scripted
        // to fail) then fact_check_perplexity (Perplexity, untouched).
        assert!(!outcome.session.results[1].ai_responses[0].success);
        assert!(outcome.session.results[1].ai_responses[1].success);
    }

    #[tokio::test]
    async fn resume_skips_already_completed_phases() {
        let dir = tempdir().unwrap();
        let orchestrator = PipelineOrchestrator::new(
            router_with_all(false),
            Arc::new(VerbatimTemplateRenderer),
            None,
            OrchestratorConfig::default(),
        );

        let mut seed = PipelineSession::new(config(dir.path()));
        let mut phase1 = PhaseResult::new(1, "Framing");
        phase1.status = PhaseStatus::Completed;
        seed.add_result(phase1);
        seed.state = PipelineState::Phase1;

        let outcome = orchestrator.resume(seed).await.unwrap();
        assert_eq!(outcome.session.state, PipelineState::Completed);
        assert_eq!(outcome.session.results.len(), 5);
        assert_eq!(outcome.session.results[0].ai_responses.len(), 0, "phase 1 must not be re-run");
    }
}
