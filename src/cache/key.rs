//! CacheKeyGen (spec §4.1), grounded on
//! `original_source/src/cache/key_generator.py`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::model::{DocumentType, ProviderTag};

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Collapse every run of CR/LF/space (and any other whitespace) into a single
/// space, then trim the ends. Case and all non-whitespace characters are
/// preserved.
fn normalize_prompt(prompt: &str) -> String {
    WHITESPACE_RUN.replace_all(prompt, " ").trim().to_string()
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_lower(&hasher.finalize())
}

fn hex_lower(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Canonical JSON of a serde_json::Value with all object keys sorted
/// recursively, matching Python's `json.dumps(..., sort_keys=True)`.
fn canonical_json(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.iter().map(|(k, v)| (k.clone(), sort(v))).collect();
                let mut out = Map::new();
                for (k, v) in sorted {
                    out.insert(k, v);
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    serde_json::to_string(&sort(value)).expect("serde_json::Value always serializes")
}

/// First 16 hex characters of the SHA-256 of the context's canonical JSON form.
fn hash_context(context: &Value) -> String {
    let digest = hex_digest(canonical_json(context).as_bytes());
    digest[..16].to_string()
}

#[derive(Debug, Default, Clone)]
pub struct CacheKeyInput {
    pub prompt: String,
    pub context: Option<Value>,
    pub agent: Option<ProviderTag>,
    pub phase: Option<u8>,
    pub model: Option<String>,
}

impl CacheKeyInput {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

#[allow(dead_code)]
fn doc_type_tag(doc_type: DocumentType) -> &'static str {
    match doc_type {
        DocumentType::Bizplan => "bizplan",
        DocumentType::Rd => "rd",
    }
}

/// Produce the 64-character lowercase hex cache key for the given inputs.
/// Deterministic across runs and platforms; whitespace-variant prompts
/// collide, case-variant prompts do not, and absent optional fields
/// contribute no bytes to the digest.
pub fn generate_cache_key(input: &CacheKeyInput) -> String {
    let mut components = Map::new();
    components.insert(
        "prompt".to_string(),
        Value::String(normalize_prompt(&input.prompt)),
    );
    if let Some(context) = &input.context {
        components.insert("context".to_string(), Value::String(hash_context(context)));
    }
    if let Some(agent) = input.agent {
        components.insert("agent".to_string(), Value::String(agent.as_str().to_string()));
    }
    if let Some(phase) = input.phase {
        components.insert("phase".to_string(), Value::String(phase.to_string()));
    }
    if let Some(model) = &input.model {
        components.insert("model".to_string(), Value::String(model.clone()));
    }

    let serialized = canonical_json(&Value::Object(components));
    hex_digest(serialized.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_is_64_char_lowercase_hex() {
        let key = generate_cache_key(&CacheKeyInput::new("hello world"));
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn deterministic_across_calls() {
        let input = CacheKeyInput::new("same prompt");
        assert_eq!(generate_cache_key(&input), generate_cache_key(&input));
    }

    #[test]
    fn whitespace_variants_collide() {
        let a = generate_cache_key(&CacheKeyInput::new("hello   world\n\nfoo"));
        let b = generate_cache_key(&CacheKeyInput::new("hello world foo"));
        assert_eq!(a, b);
    }

    #[test]
    fn case_variants_do_not_collide() {
        let a = generate_cache_key(&CacheKeyInput::new("Hello World"));
        let b = generate_cache_key(&CacheKeyInput::new("hello world"));
        assert_ne!(a, b);
    }

    #[test]
    fn missing_optional_fields_do_not_affect_key_vs_other_missing_fields() {
        let mut a = CacheKeyInput::new("prompt");
        a.phase = None;
        let mut b = CacheKeyInput::new("prompt");
        b.phase = None;
        assert_eq!(generate_cache_key(&a), generate_cache_key(&b));
    }

    #[test]
    fn differing_optional_fields_change_the_key() {
        let mut a = CacheKeyInput::new("prompt");
        a.phase = Some(1);
        let mut b = CacheKeyInput::new("prompt");
        b.phase = Some(2);
        assert_ne!(generate_cache_key(&a), generate_cache_key(&b));
    }

    #[test]
    fn context_is_hashed_not_embedded_verbatim() {
        let mut input = CacheKeyInput::new("prompt");
        input.context = Some(json!({"b": 2, "a": 1}));
        let key = generate_cache_key(&input);
        assert_eq!(key.len(), 64);
        // key-order of the context map must not matter
        let mut reordered = CacheKeyInput::new("prompt");
        reordered.context = Some(json!({"a": 1, "b": 2}));
        assert_eq!(key, generate_cache_key(&reordered));
    }
}
