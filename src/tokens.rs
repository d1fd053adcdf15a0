//! Token counting, grounded on `darval-multi-llm/src/internals/tokens.rs`'s
//! trait-plus-factory shape, with window limits and the cheap fallback estimator
//! taken from spec §4.8 / `original_source/src/context/tokenizer.py`.

use crate::model::ProviderTag;
use std::sync::Arc;
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Context-window limit in tokens for a provider (spec §4.8 / Glossary).
pub fn window_limit(provider: ProviderTag) -> u64 {
    match provider {
        ProviderTag::Claude => 200_000,
        ProviderTag::Gemini => 1_000_000,
        ProviderTag::ChatGpt => 128_000,
        ProviderTag::Perplexity => 128_000,
    }
}

pub fn default_window_limit() -> u64 {
    100_000
}

#[derive(Debug, Clone)]
pub struct TokenCount {
    pub total_tokens: u64,
    pub estimated: bool,
    pub model_name: String,
}

impl TokenCount {
    pub fn get_percentage_used(&self, provider: ProviderTag) -> f64 {
        self.total_tokens as f64 / window_limit(provider) as f64 * 100.0
    }

    pub fn is_near_limit(&self, provider: ProviderTag, threshold: f64) -> bool {
        self.total_tokens as f64 / window_limit(provider) as f64 >= threshold
    }
}

/// Counts tokens for arbitrary text against a named model. A real tokenizer is
/// used when available; the fallback is `max(1, len/4)` with `estimated = true`
/// (spec §4.8). `model` is carried through into the result's `model_name`
/// rather than changing how counting itself works, matching
/// `original_source/src/context/tokenizer.py`'s `count(text, model_name)`.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str, model: &str) -> TokenCount;
}

/// `cl100k_base`-backed counter, used as a stand-in for every provider: none of
/// the four back ends expose a real tokenizer over this trait boundary (they are
/// opaque browser-automation collaborators), so one shared BPE vocabulary is
/// used to produce a best-effort count rather than the `len/4` estimate.
pub struct BpeTokenCounter {
    bpe: CoreBPE,
}

impl BpeTokenCounter {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            bpe: cl100k_base()?,
        })
    }
}

impl TokenCounter for BpeTokenCounter {
    fn count(&self, text: &str, model: &str) -> TokenCount {
        TokenCount {
            total_tokens: self.bpe.encode_ordinary(text).len() as u64,
            estimated: false,
            model_name: model.to_string(),
        }
    }
}

/// The `max(1, len/4)` estimator used when no tokenizer is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct EstimatingTokenCounter;

impl TokenCounter for EstimatingTokenCounter {
    fn count(&self, text: &str, model: &str) -> TokenCount {
        TokenCount {
            total_tokens: (text.len() as u64 / 4).max(1),
            estimated: true,
            model_name: model.to_string(),
        }
    }
}

pub fn default_token_counter() -> Arc<dyn TokenCounter> {
    match BpeTokenCounter::new() {
        Ok(counter) => Arc::new(counter),
        Err(_) => Arc::new(EstimatingTokenCounter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimating_counter_floors_at_one() {
        let counter = EstimatingTokenCounter;
        assert_eq!(counter.count("", "claude").total_tokens, 1);
        assert_eq!(counter.count("abc", "claude").total_tokens, 1);
    }

    #[test]
    fn estimating_counter_is_marked_estimated() {
        let counter = EstimatingTokenCounter;
        assert!(counter.count("hello world", "claude").estimated);
    }

    #[test]
    fn model_name_is_carried_through() {
        let counter = EstimatingTokenCounter;
        assert_eq!(counter.count("hello", "gemini").model_name, "gemini");
    }

    #[test]
    fn window_limits_match_spec_table() {
        assert_eq!(window_limit(ProviderTag::Claude), 200_000);
        assert_eq!(window_limit(ProviderTag::Gemini), 1_000_000);
        assert_eq!(window_limit(ProviderTag::ChatGpt), 128_000);
        assert_eq!(window_limit(ProviderTag::Perplexity), 128_000);
        assert_eq!(default_window_limit(), 100_000);
    }

    #[test]
    fn near_limit_threshold() {
        let count = TokenCount {
            total_tokens: 180_000,
            estimated: false,
            model_name: "claude".to_string(),
        };
        assert!(count.is_near_limit(ProviderTag::Claude, 0.8));
        assert!(!count.is_near_limit(ProviderTag::Gemini, 0.8));
    }
}
