//! The opaque Provider contract (spec §6). Providers are external collaborators —
//! headless-browser-driven LLM back ends — that this core never constructs itself;
//! it only calls through this trait. Grounded on `original_source/src/gateway/base.py`,
//! shaped as an `async_trait` the way `darval-multi-llm/src/core_types/provider.rs`
//! expresses its own provider trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRequest {
    pub task_name: String,
    pub prompt: String,
    pub max_tokens: Option<u32>,
    pub timeout: u64,
}

impl GatewayRequest {
    pub fn new(task_name: impl Into<String>, prompt: impl Into<String>, timeout: u64) -> Self {
        Self {
            task_name: task_name.into(),
            prompt: prompt.into(),
            max_tokens: None,
            timeout,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub content: String,
    pub success: bool,
    pub error: Option<String>,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub response_time: f64,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl GatewayResponse {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            success: true,
            error: None,
            tokens_used: 0,
            response_time: 0.0,
            metadata: HashMap::new(),
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            success: false,
            error: Some(error.into()),
            tokens_used: 0,
            response_time: 0.0,
            metadata: HashMap::new(),
        }
    }
}

/// Capability set shared by every LLM back end the pipeline knows about.
/// Headless-browser session management is part of the contract (`check_session`/
/// `login_flow`/`save_session`/`load_session`) but never invoked from the hot
/// path — see spec §5.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn send_message(&self, request: GatewayRequest) -> anyhow::Result<GatewayResponse>;

    async fn check_session(&self) -> anyhow::Result<bool>;

    async fn login_flow(&self) -> anyhow::Result<()>;

    fn save_session(&self);

    fn load_session(&self) -> bool;
}
