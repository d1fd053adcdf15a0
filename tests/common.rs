//! Test helper utilities shared across the integration suites.
//!
//! IMPORTANT: these helpers are test-only and should never be used in
//! production code.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use aigenflow_pipeline::provider::{GatewayRequest, GatewayResponse, Provider};
use aigenflow_pipeline::resilience::FallbackConfig;
use aigenflow_pipeline::router::AgentRouter;
use aigenflow_pipeline::{DocumentType, PipelineConfig, ProviderTag};
use async_trait::async_trait;

/// A provider stub that always succeeds, echoing the task name into its
/// content the same way the spec's E1 scenario expects
/// (`"Mock <provider> response for <task>"`).
pub struct StubProvider {
    pub tag: &'static str,
    pub fail: bool,
    pub calls: AtomicU32,
}

impl StubProvider {
    pub fn new(tag: &'static str, fail: bool) -> Self {
        Self {
            tag,
            fail,
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for StubProvider {
    async fn send_message(&self, request: GatewayRequest) -> anyhow::Result<GatewayResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Ok(GatewayResponse::fail("mock"))
        } else {
            Ok(GatewayResponse::ok(format!(
                "Mock {} response for {}",
                self.tag, request.task_name
            )))
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

/// A router with all four canonical providers registered, one of which may
/// be scripted to fail every call. When a provider is scripted to fail, the
/// fallback policy is pinned to that provider alone (no other provider to
/// hop to) so the failure is a genuine, fully-exhausted one instead of being
/// silently absorbed by `FallbackChain`'s cross-provider recovery.
pub fn router_with_all(failing: Option<ProviderTag>) -> Arc<AgentRouter> {
    let mut router = AgentRouter::new(30);
    for tag in [
        ProviderTag::Claude,
        ProviderTag::Gemini,
        ProviderTag::ChatGpt,
        ProviderTag::Perplexity,
    ] {
        let fail = failing == Some(tag);
        router.register_provider(tag, Arc::new(StubProvider::new(tag.as_str(), fail)));
    }
    if let Some(tag) = failing {
        router.set_fallback_config(FallbackConfig {
            provider_order: vec![tag],
            max_retries: 0,
            ..Default::default()
        });
    }
    Arc::new(router)
}

pub fn bizplan_config(output_dir: &std::path::Path) -> PipelineConfig {
    let mut config =
        PipelineConfig::new("AI-powered sustainable agriculture business").expect("valid topic");
    config.doc_type = DocumentType::Bizplan;
    config.language = "ko".to_string();
    config.output_dir = output_dir.to_path_buf();
    config
}
