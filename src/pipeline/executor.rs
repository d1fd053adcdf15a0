//! PhaseExecutor (spec §4.9), grounded on `original_source/src/pipeline/base.py`
//! and `original_source/src/pipeline/phase1_framing.py` through
//! `phase5_review.py`. One instance per phase number, each holding the
//! immutable ordered task list the Glossary's Task Assignments table pins
//! to that phase.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::batch::{BatchProcessor, DEFAULT_MAX_BATCH_SIZE};
use crate::batch::queue::PendingItem;
use crate::logging::log_warn;
use crate::model::{AgentResponse, PhaseResult, PhaseStatus, PipelineSession, ProviderTag};
use crate::router::AgentRouter;
use crate::template::TemplateRenderer;

/// `(task tag, provider)` pairs for one phase, in declared order. The
/// provider half is only needed to group work for `BatchProcessor`; the
/// router independently resolves the same provider from its own table.
fn phase_tasks(phase_number: u8) -> (&'static str, Vec<(&'static str, ProviderTag)>) {
    use ProviderTag::*;
    match phase_number {
        1 => ("Framing", vec![("brainstorm_chatgpt", ChatGpt), ("validate_claude", Claude)]),
        2 => ("Research", vec![("deep_search_gemini", Gemini), ("fact_check_perplexity", Perplexity)]),
        3 => ("Narrative", vec![("swot_chatgpt", ChatGpt), ("narrative_claude", Claude)]),
        4 => (
            "Business Plan",
            vec![
                ("business_plan_claude", Claude),
                ("outline_chatgpt", ChatGpt),
                ("charts_gemini", Gemini),
            ],
        ),
        5 => (
            "Review",
            vec![
                ("verify_perplexity", Perplexity),
                ("final_review_claude", Claude),
                ("polish_claude", Claude),
            ],
        ),
        other => panic!("phase out of range: {other}"),
    }
}

pub struct PhaseExecutor {
    phase_number: u8,
    phase_name: &'static str,
    tasks: Vec<(&'static str, ProviderTag)>,
}

impl PhaseExecutor {
    pub fn new(phase_number: u8) -> Self {
        let (phase_name, tasks) = phase_tasks(phase_number);
        Self {
            phase_number,
            phase_name,
            tasks,
        }
    }

    pub fn phase_number(&self) -> u8 {
        self.phase_number
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    fn render_prompt(&self, session: &PipelineSession, template: &dyn TemplateRenderer, task: &str) -> String {
        let mut ctx = HashMap::new();
        ctx.insert("topic".to_string(), session.config.topic.clone());
        ctx.insert("doc_type".to_string(), format!("{:?}", session.config.doc_type));
        ctx.insert("language".to_string(), session.config.language.clone());
        template.render(&format!("phase_{}/{}", self.phase_number, task), &ctx)
    }

    /// Sequential execution: one `AgentRouter::Execute` call per task, in
    /// declared order. Used by every phase except an optionally-batched
    /// phase 2 (see [`Self::execute_batched`]).
    pub async fn execute(
        &self,
        session: &PipelineSession,
        router: &AgentRouter,
        template: &dyn TemplateRenderer,
    ) -> PhaseResult {
        let mut result = PhaseResult::new(self.phase_number, self.phase_name);

        if self.tasks.is_empty() {
            result.status = PhaseStatus::Skipped;
            result.completed_at = Some(Utc::now());
            return result;
        }

        for &(task, _) in &self.tasks {
            let prompt = self.render_prompt(session, template, task);
            let response = match router.execute(self.phase_number, task, prompt, session.config.doc_type).await {
                Ok(response) => response,
                Err(err) => {
                    log_warn!(phase = self.phase_number, task, error = %err, "task execution failed");
                    AgentResponse::failure(
                        self.tasks.iter().find(|(t, _)| *t == task).map(|(_, p)| *p).unwrap(),
                        task,
                        err.to_string(),
                    )
                }
            };
            result.ai_responses.push(response);
        }

        self.finalize(result)
    }

    /// Bounded-concurrency fan-out path for phase 2 (spec §4.9: "Phase 2 MAY
    /// enable batch processing"). Ordering is restored on collection so the
    /// observable contract matches [`Self::execute`] exactly.
    pub async fn execute_batched(
        &self,
        session: &PipelineSession,
        router: Arc<AgentRouter>,
        template: &dyn TemplateRenderer,
    ) -> PhaseResult {
        let mut result = PhaseResult::new(self.phase_number, self.phase_name);

        if self.tasks.is_empty() {
            result.status = PhaseStatus::Skipped;
            result.completed_at = Some(Utc::now());
            return result;
        }

        let mut processor = BatchProcessor::new(router, DEFAULT_MAX_BATCH_SIZE.max(self.tasks.len()));
        for &(task, provider) in &self.tasks {
            let prompt = self.render_prompt(session, template, task);
            processor.enqueue(
                provider,
                PendingItem {
                    task: task.to_string(),
                    prompt,
                    doc_type: session.config.doc_type,
                },
            );
        }

        let mut responses = processor.flush().await;
        // BatchQueue groups by provider, so cross-group ordering can differ
        // from the declared task order; restore it here.
        responses.sort_by_key(|response| {
            self.tasks
                .iter()
                .position(|(task, _)| *task == response.task_name)
                .unwrap_or(usize::MAX)
        });
        result.ai_responses = responses;

        self.finalize(result)
    }

    fn finalize(&self, mut result: PhaseResult) -> PhaseResult {
        result.status = if result.ai_responses.iter().any(|r| !r.success) {
            PhaseStatus::Failed
        } else {
            PhaseStatus::Completed
        };
        result.completed_at = Some(Utc::now());
        result
    }
}
