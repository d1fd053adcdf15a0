//! StatsCollector (spec §4.8), grounded on
//! `original_source/src/monitoring/stats.py`. Wraps a [`TokenTracker`] and
//! filters its snapshot by period.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;

use super::tracker::{BudgetConfig, TokenTracker, TokenUsage};
use crate::model::ProviderTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
    All,
}

#[derive(Debug, Clone)]
pub struct UsageSummary {
    pub period: Period,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub by_provider: HashMap<ProviderTag, u64>,
    pub by_phase: HashMap<u8, u64>,
    pub request_count: u64,
}

pub struct StatsCollector {
    tracker: TokenTracker,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            tracker: TokenTracker::new(BudgetConfig::default()),
        }
    }

    pub fn track(&self, usage: TokenUsage) {
        self.tracker.track(usage);
    }

    pub fn summary(&self, period: Period) -> UsageSummary {
        let now = Utc::now();
        let start = match period {
            Period::Daily => now - ChronoDuration::days(1),
            Period::Weekly => now - ChronoDuration::weeks(1),
            Period::Monthly => now - ChronoDuration::days(30),
            Period::All => DateTime::<Utc>::MIN_UTC,
        };

        let records: Vec<TokenUsage> = self
            .tracker
            .records_snapshot()
            .into_iter()
            .filter(|r| r.timestamp >= start)
            .collect();

        let mut summary = UsageSummary {
            period,
            start,
            end: now,
            total_tokens: 0,
            total_cost: 0.0,
            by_provider: HashMap::new(),
            by_phase: HashMap::new(),
            request_count: records.len() as u64,
        };

        for record in &records {
            summary.total_tokens += record.total_tokens;
            summary.total_cost += record.cost_usd;
            *summary.by_provider.entry(record.provider).or_insert(0) += record.total_tokens;
            *summary.by_phase.entry(record.phase).or_insert(0) += record.total_tokens;
        }

        summary
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::calculator::CostCalculator;

    #[test]
    fn all_period_includes_every_record() {
        let collector = StatsCollector::new();
        let calculator = CostCalculator::default();
        collector.track(TokenUsage::new(ProviderTag::Claude, 100, 50, 1, "task", &calculator));
        collector.track(TokenUsage::new(ProviderTag::Gemini, 200, 0, 2, "task", &calculator));

        let summary = collector.summary(Period::All);
        assert_eq!(summary.request_count, 2);
        assert_eq!(summary.total_tokens, 350);
    }
}
