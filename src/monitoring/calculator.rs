//! CostCalculator (spec §4.8), grounded on
//! `original_source/src/monitoring/calculator.py`. Pricing is USD per 1M
//! tokens.

use std::collections::HashMap;

use crate::model::ProviderTag;

#[derive(Debug, Clone, Copy)]
pub struct ProviderPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

fn default_pricing(provider: ProviderTag) -> ProviderPricing {
    match provider {
        ProviderTag::Claude => ProviderPricing { input_per_million: 3.00, output_per_million: 15.00 },
        ProviderTag::ChatGpt => ProviderPricing { input_per_million: 10.00, output_per_million: 30.00 },
        ProviderTag::Gemini => ProviderPricing { input_per_million: 1.25, output_per_million: 5.00 },
        ProviderTag::Perplexity => ProviderPricing { input_per_million: 1.00, output_per_million: 1.00 },
    }
}

#[derive(Debug, Clone, Default)]
pub struct PricingConfig {
    overrides: HashMap<ProviderTag, ProviderPricing>,
}

impl PricingConfig {
    pub fn with_override(mut self, provider: ProviderTag, pricing: ProviderPricing) -> Self {
        self.overrides.insert(provider, pricing);
        self
    }

    fn pricing_for(&self, provider: ProviderTag) -> ProviderPricing {
        self.overrides.get(&provider).copied().unwrap_or_else(|| default_pricing(provider))
    }
}

#[derive(Debug, Clone, Default)]
pub struct CostCalculator {
    pricing: PricingConfig,
}

impl CostCalculator {
    pub fn new(pricing: PricingConfig) -> Self {
        Self { pricing }
    }

    pub fn calculate(&self, input_tokens: u64, output_tokens: u64, provider: ProviderTag) -> f64 {
        let pricing = self.pricing.pricing_for(provider);
        let input_cost = (input_tokens as f64 * pricing.input_per_million) / 1_000_000.0;
        let output_cost = (output_tokens as f64 * pricing.output_per_million) / 1_000_000.0;
        input_cost + output_cost
    }

    pub fn estimate(&self, tokens: u64, provider: ProviderTag, is_input: bool) -> f64 {
        let pricing = self.pricing.pricing_for(provider);
        let price = if is_input { pricing.input_per_million } else { pricing.output_per_million };
        (tokens as f64 * price) / 1_000_000.0
    }
}
