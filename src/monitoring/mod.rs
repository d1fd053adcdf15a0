//! Token/cost accounting layer (spec §4.8): cost calculation, usage tracking,
//! budget alerting, and period-filtered stats.

pub mod calculator;
pub mod stats;
pub mod tracker;

pub use calculator::{CostCalculator, PricingConfig};
pub use stats::{Period, StatsCollector, UsageSummary};
pub use tracker::{BudgetAlert, BudgetConfig, TokenTracker, TokenUsage};
