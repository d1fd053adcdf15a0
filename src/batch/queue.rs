//! BatchQueue (spec §4.4), grounded on `original_source/src/batch/queue.py`.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::model::{DocumentType, ProviderTag};

/// The work a single queued item still needs executed through the router.
#[derive(Debug, Clone)]
pub struct PendingItem {
    pub task: String,
    pub prompt: String,
    pub doc_type: DocumentType,
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub request_id: Uuid,
    pub provider: ProviderTag,
    pub item: PendingItem,
    pub enqueued_at: DateTime<Utc>,
}

/// One provider's group of outstanding requests, in enqueue order.
#[derive(Debug, Clone)]
pub struct BatchGroup {
    pub provider: ProviderTag,
    pub requests: Vec<BatchRequest>,
}

/// Bounded FIFO queue of [`BatchRequest`]s, at most `max_batch_size` at a time
/// across the whole queue (spec invariant 7).
pub struct BatchQueue {
    max_batch_size: usize,
    items: Vec<BatchRequest>,
}

impl BatchQueue {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size,
            items: Vec::new(),
        }
    }

    /// Enqueue a request for `provider`. Returns the new request id, or `None`
    /// when the queue is already at `max_batch_size`.
    pub fn enqueue(&mut self, provider: ProviderTag, item: PendingItem) -> Option<Uuid> {
        if self.items.len() >= self.max_batch_size {
            return None;
        }
        let request_id = Uuid::new_v4();
        self.items.push(BatchRequest {
            request_id,
            provider,
            item,
            enqueued_at: Utc::now(),
        });
        Some(request_id)
    }

    /// Group current contents by provider, each group preserving enqueue
    /// order. Group order is unspecified (spec §4.4).
    pub fn get_batches(&self) -> Vec<BatchGroup> {
        let mut order: Vec<ProviderTag> = Vec::new();
        let mut grouped: HashMap<ProviderTag, Vec<BatchRequest>> = HashMap::new();
        for request in &self.items {
            grouped
                .entry(request.provider)
                .or_insert_with(|| {
                    order.push(request.provider);
                    Vec::new()
                })
                .push(request.clone());
        }
        order
            .into_iter()
            .map(|provider| BatchGroup {
                provider,
                requests: grouped.remove(&provider).unwrap_or_default(),
            })
            .collect()
    }

    pub fn remove_processed(&mut self, ids: &[Uuid]) {
        self.items.retain(|request| !ids.contains(&request.request_id));
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
