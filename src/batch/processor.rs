//! BatchProcessor (spec §4.4), grounded on
//! `original_source/src/batch/processor.py`. The open question in spec §9
//! resolves batching as bounded-concurrency fan-out across the router, not
//! wire-level batching: every item still goes through `AgentRouter::execute`
//! one call per item, just dispatched concurrently within a provider group.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::stream::{FuturesOrdered, StreamExt};

use super::queue::{BatchGroup, BatchQueue, PendingItem};
use crate::logging::log_debug;
use crate::model::{AgentResponse, ProviderTag};
use crate::router::AgentRouter;

pub const DEFAULT_MAX_BATCH_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchStats {
    pub total_processed: u64,
    pub total_batches: u64,
    pub total_failures: u64,
}

pub struct BatchProcessor {
    router: Arc<AgentRouter>,
    pub queue: BatchQueue,
    total_processed: AtomicU64,
    total_batches: AtomicU64,
    total_failures: AtomicU64,
}

impl BatchProcessor {
    pub fn new(router: Arc<AgentRouter>, max_batch_size: usize) -> Self {
        Self {
            router,
            queue: BatchQueue::new(max_batch_size),
            total_processed: AtomicU64::new(0),
            total_batches: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
        }
    }

    pub fn enqueue(&mut self, provider: ProviderTag, item: PendingItem) -> Option<uuid::Uuid> {
        self.queue.enqueue(provider, item)
    }

    /// Snapshot the queue, dispatch each group with bounded concurrency
    /// (ordering restored on collection), and drop the snapshotted ids from
    /// the queue. A per-item failure never aborts the rest of its group.
    pub async fn process_batch(&mut self) -> Vec<AgentResponse> {
        let groups = self.queue.get_batches();
        let mut all_responses = Vec::new();
        let mut processed_ids = Vec::new();

        for group in groups {
            let responses = self.process_group(&group).await;
            processed_ids.extend(group.requests.iter().map(|r| r.request_id));
            all_responses.extend(responses);
            self.total_batches.fetch_add(1, Ordering::SeqCst);
        }

        self.queue.remove_processed(&processed_ids);
        all_responses
    }

    async fn process_group(&self, group: &BatchGroup) -> Vec<AgentResponse> {
        log_debug!(provider = %group.provider, count = group.requests.len(), "processing batch group");

        let mut in_flight: FuturesOrdered<_> = group
            .requests
            .iter()
            .map(|request| {
                let router = self.router.clone();
                let task = request.item.task.clone();
                let prompt = request.item.prompt.clone();
                let doc_type = request.item.doc_type;
                let provider = request.provider;
                async move {
                    match router.execute(phase_for(provider), &task, prompt, doc_type).await {
                        Ok(response) => response,
                        Err(err) => AgentResponse::failure(provider, task, err.to_string()),
                    }
                }
            })
            .collect();

        let mut responses = Vec::with_capacity(group.requests.len());
        while let Some(response) = in_flight.next().await {
            self.total_processed.fetch_add(1, Ordering::SeqCst);
            if !response.success {
                self.total_failures.fetch_add(1, Ordering::SeqCst);
            }
            responses.push(response);
        }
        responses
    }

    /// Equivalent to `process_batch` when the queue is non-empty, otherwise a
    /// no-op returning an empty list.
    pub async fn flush(&mut self) -> Vec<AgentResponse> {
        if self.queue.is_empty() {
            return Vec::new();
        }
        self.process_batch().await
    }

    pub fn stats(&self) -> BatchStats {
        BatchStats {
            total_processed: self.total_processed.load(Ordering::SeqCst),
            total_batches: self.total_batches.load(Ordering::SeqCst),
            total_failures: self.total_failures.load(Ordering::SeqCst),
        }
    }
}

/// Phase 2 is the only phase that batches today (spec §4.9), so every queued
/// item is routed as a phase-2 task regardless of which provider it targets.
fn phase_for(_provider: ProviderTag) -> u8 {
    2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DocumentType;
    use crate::provider::{GatewayRequest, GatewayResponse, Provider};
    use async_trait::async_trait;

    struct StubProvider {
        fail: bool,
    }

    #[async_trait]
    impl Provider for StubProvider {
        async fn send_message(&self, request: GatewayRequest) -> anyhow::Result<GatewayResponse> {
            if self.fail {
                Ok(GatewayResponse::fail("mock failure"))
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

    fn item(task: &str) -> PendingItem {
        PendingItem {
            task: task.to_string(),
            prompt: "prompt".to_string(),
            doc_type: DocumentType::Bizplan,
        }
    }

    #[tokio::test]
    async fn processes_group_and_clears_queue() {
        let mut router = AgentRouter::new(30);
        router.register_provider(ProviderTag::Gemini, Arc::new(StubProvider { fail: false }));
        router.register_provider(ProviderTag::Perplexity, Arc::new(StubProvider { fail: false }));
        let mut processor = BatchProcessor::new(Arc::new(router), DEFAULT_MAX_BATCH_SIZE);

        processor.enqueue(ProviderTag::Gemini, item("deep_search_gemini"));
        processor.enqueue(ProviderTag::Perplexity, item("fact_check_perplexity"));

        let responses = processor.process_batch().await;
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|r| r.success));
        assert_eq!(processor.queue.size(), 0);
        assert_eq!(processor.stats().total_batches, 2);
    }

    #[tokio::test]
    async fn per_item_failure_does_not_abort_group() {
        let mut router = AgentRouter::new(30);
        router.register_provider(ProviderTag::Gemini, Arc::new(StubProvider { fail: true }));
        let mut processor = BatchProcessor::new(Arc::new(router), DEFAULT_MAX_BATCH_SIZE);

        processor.enqueue(ProviderTag::Gemini, item("a"));
        processor.enqueue(ProviderTag::Gemini, item("b"));

        let responses = processor.process_batch().await;
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|r| !r.success));
        assert_eq!(processor.stats().total_failures, 2);
    }

    #[tokio::test]
    async fn flush_is_noop_on_empty_queue() {
        let router = AgentRouter::new(30);
        let mut processor = BatchProcessor::new(Arc::new(router), DEFAULT_MAX_BATCH_SIZE);
        assert!(processor.flush().await.is_empty());
        assert_eq!(processor.stats().total_batches, 0);
    }
}
