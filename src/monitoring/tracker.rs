//! TokenTracker (spec §4.8), grounded on
//! `original_source/src/monitoring/tracker.py`. Append-only usage log plus
//! budget-threshold alerting; the tracker only reports, it never enforces.

use chrono::{DateTime, Utc};
use std::sync::Mutex;

use super::calculator::CostCalculator;
use crate::model::ProviderTag;

/// Immutable record of one request's token usage (spec §3 `TokenUsage`).
#[derive(Debug, Clone)]
pub struct TokenUsage {
    pub provider: ProviderTag,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub phase: u8,
    pub task: String,
    pub timestamp: DateTime<Utc>,
}

impl TokenUsage {
    pub fn new(
        provider: ProviderTag,
        input_tokens: u64,
        output_tokens: u64,
        phase: u8,
        task: impl Into<String>,
        calculator: &CostCalculator,
    ) -> Self {
        Self {
            provider,
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            cost_usd: calculator.calculate(input_tokens, output_tokens, provider),
            phase,
            task: task.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BudgetConfig {
    pub daily_budget_usd: f64,
    pub weekly_budget_usd: f64,
    pub monthly_budget_usd: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_budget_usd: 10.0,
            weekly_budget_usd: 50.0,
            monthly_budget_usd: 200.0,
        }
    }
}

const ALERT_THRESHOLDS: [u32; 4] = [50, 75, 90, 100];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetPeriod {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy)]
pub struct BudgetAlert {
    pub threshold: u32,
    pub current_spending: f64,
    pub budget_limit: f64,
    pub period: BudgetPeriod,
}

#[derive(Debug, Clone, Default)]
pub struct ProviderBreakdown {
    pub total_tokens: u64,
    pub total_cost: f64,
    pub request_count: u64,
}

#[derive(Debug, Clone, Default)]
pub struct UsageSummary {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub request_count: u64,
    pub by_provider: std::collections::HashMap<ProviderTag, ProviderBreakdown>,
    pub by_phase: std::collections::HashMap<u8, u64>,
}

pub struct TokenTracker {
    budget: BudgetConfig,
    records: Mutex<Vec<TokenUsage>>,
}

impl TokenTracker {
    pub fn new(budget: BudgetConfig) -> Self {
        Self {
            budget,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn track(&self, usage: TokenUsage) {
        self.records.lock().unwrap().push(usage);
    }

    /// Snapshot-based aggregation, optionally filtered to one provider.
    pub fn summary(&self, provider: Option<ProviderTag>) -> UsageSummary {
        let records = self.records.lock().unwrap();
        let filtered: Vec<&TokenUsage> = records
            .iter()
            .filter(|r| provider.map(|p| p == r.provider).unwrap_or(true))
            .collect();

        let mut summary = UsageSummary::default();
        for record in &filtered {
            summary.total_input_tokens += record.input_tokens;
            summary.total_output_tokens += record.output_tokens;
            summary.total_cost += record.cost_usd;
            summary.request_count += 1;

            let entry = summary.by_provider.entry(record.provider).or_default();
            entry.total_tokens += record.total_tokens;
            entry.total_cost += record.cost_usd;
            entry.request_count += 1;

            *summary.by_phase.entry(record.phase).or_insert(0) += record.total_tokens;
        }
        summary.total_tokens = summary.total_input_tokens + summary.total_output_tokens;
        summary
    }

    /// Alerts for every threshold (50/75/90/100%) crossed against each of the
    /// daily/weekly/monthly budgets. Reporting only — never enforced here.
    pub fn check_budget(&self) -> Vec<BudgetAlert> {
        let current_cost = self.summary(None).total_cost;
        let mut alerts = Vec::new();
        for (limit, period) in [
            (self.budget.daily_budget_usd, BudgetPeriod::Daily),
            (self.budget.weekly_budget_usd, BudgetPeriod::Weekly),
            (self.budget.monthly_budget_usd, BudgetPeriod::Monthly),
        ] {
            alerts.extend(Self::threshold_alerts(current_cost, limit, period));
        }
        alerts
    }

    fn threshold_alerts(current_cost: f64, limit: f64, period: BudgetPeriod) -> Vec<BudgetAlert> {
        if limit <= 0.0 {
            return Vec::new();
        }
        let usage_percentage = (current_cost / limit) * 100.0;
        ALERT_THRESHOLDS
            .iter()
            .filter(|&&threshold| usage_percentage >= threshold as f64)
            .map(|&threshold| BudgetAlert {
                threshold,
                current_spending: current_cost,
                budget_limit: limit,
                period,
            })
            .collect()
    }

    pub fn records_snapshot(&self) -> Vec<TokenUsage> {
        self.records.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(provider: ProviderTag, input: u64, output: u64, phase: u8) -> TokenUsage {
        let calculator = CostCalculator::default();
        TokenUsage::new(provider, input, output, phase, "task", &calculator)
    }

    #[test]
    fn total_tokens_is_sum_of_input_and_output() {
        let u = usage(ProviderTag::Claude, 100, 50, 1);
        assert_eq!(u.total_tokens, 150);
    }

    #[test]
    fn summary_aggregates_by_provider_and_phase() {
        let tracker = TokenTracker::new(BudgetConfig::default());
        tracker.track(usage(ProviderTag::Claude, 1000, 500, 1));
        tracker.track(usage(ProviderTag::Gemini, 2000, 0, 2));

        let summary = tracker.summary(None);
        assert_eq!(summary.request_count, 2);
        assert_eq!(summary.total_tokens, 3500);
        assert_eq!(summary.by_provider[&ProviderTag::Claude].total_tokens, 1500);
        assert_eq!(summary.by_phase[&2], 2000);
    }

    #[test]
    fn budget_alerts_fire_at_crossed_thresholds() {
        let tracker = TokenTracker::new(BudgetConfig { daily_budget_usd: 0.01, weekly_budget_usd: 50.0, monthly_budget_usd: 200.0 });
        // Claude: 1M in + 1M out = $18, vastly over a $0.01 daily budget.
        tracker.track(usage(ProviderTag::Claude, 1_000_000, 1_000_000, 1));
        let alerts = tracker.check_budget();
        let daily: Vec<_> = alerts.iter().filter(|a| a.period == BudgetPeriod::Daily).collect();
        assert_eq!(daily.len(), 4);
    }
}
