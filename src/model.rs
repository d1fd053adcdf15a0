//! Core data model: sessions, phase results, agent responses, and the small
//! enums that give the state machine its shape.
//!
//! Grounded on `original_source/src/core/models.py`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

/// The four LLM back ends the core knows how to route to. Providers themselves
/// are opaque collaborators (see [`crate::provider::Provider`]); this tag is
/// the only thing the core cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTag {
    Claude,
    Gemini,
    ChatGpt,
    Perplexity,
}

impl ProviderTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Gemini => "gemini",
            Self::ChatGpt => "chatgpt",
            Self::Perplexity => "perplexity",
        }
    }
}

impl std::fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Bizplan,
    Rd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Phase1,
    Phase2,
    Phase3,
    Phase4,
    Phase5,
    Completed,
    Failed,
}

impl PipelineState {
    pub fn for_phase(phase: u8) -> Self {
        match phase {
            1 => Self::Phase1,
            2 => Self::Phase2,
            3 => Self::Phase3,
            4 => Self::Phase4,
            5 => Self::Phase5,
            other => panic!("phase out of range: {other}"),
        }
    }
}

/// One provider's answer to one task. `success == false` iff `error` is set and
/// `content` is empty (spec §3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub agent_name: ProviderTag,
    pub task_name: String,
    pub content: String,
    pub tokens_used: u64,
    pub response_time: f64,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentResponse {
    pub fn success(agent_name: ProviderTag, task_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            agent_name,
            task_name: task_name.into(),
            content: content.into(),
            tokens_used: 0,
            response_time: 0.0,
            success: true,
            error: None,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn failure(agent_name: ProviderTag, task_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            agent_name,
            task_name: task_name.into(),
            content: String::new(),
            tokens_used: 0,
            response_time: 0.0,
            success: false,
            error: Some(error.into()),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase_number: u8,
    pub phase_name: String,
    pub status: PhaseStatus,
    #[serde(default)]
    pub ai_responses: Vec<AgentResponse>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub artifacts: HashMap<String, serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PhaseResult {
    pub fn new(phase_number: u8, phase_name: impl Into<String>) -> Self {
        Self {
            phase_number,
            phase_name: phase_name.into(),
            status: PhaseStatus::Pending,
            ai_responses: Vec::new(),
            summary: String::new(),
            artifacts: HashMap::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Configuration snapshot for a single pipeline run. Validated at construction
/// (spec §3: topic must be ≥10 characters after trimming).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub topic: String,
    pub doc_type: DocumentType,
    pub language: String,
    pub template: String,
    pub output_dir: PathBuf,
    pub from_phase: Option<u8>,
    pub max_retries: u32,
    pub timeout_seconds: u64,
}

impl PipelineConfig {
    pub fn new(topic: impl Into<String>) -> Result<Self, crate::error::PipelineError> {
        let topic = topic.into();
        let trimmed = topic.trim();
        if trimmed.is_empty() || trimmed.chars().count() < 10 {
            return Err(crate::error::PipelineError::ConfigInvalid {
                message: "topic must be at least 10 characters".to_string(),
            });
        }
        Ok(Self {
            topic: trimmed.to_string(),
            doc_type: DocumentType::Bizplan,
            language: "ko".to_string(),
            template: "default".to_string(),
            output_dir: PathBuf::from("output"),
            from_phase: None,
            max_retries: 2,
            timeout_seconds: 120,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSession {
    pub session_id: Uuid,
    pub config: PipelineConfig,
    pub state: PipelineState,
    #[serde(default)]
    pub results: Vec<PhaseResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub current_phase: u8,
    #[serde(default)]
    pub artifacts: HashMap<String, serde_json::Value>,
}

impl PipelineSession {
    pub fn new(config: PipelineConfig) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            config,
            state: PipelineState::Idle,
            results: Vec::new(),
            created_at: now,
            updated_at: now,
            current_phase: 0,
            artifacts: HashMap::new(),
        }
    }

    pub fn add_result(&mut self, result: PhaseResult) {
        self.current_phase = result.phase_number;
        self.results.push(result);
        self.updated_at = Utc::now();
    }

    pub fn phase_result(&self, phase_number: u8) -> Option<&PhaseResult> {
        self.results.iter().find(|r| r.phase_number == phase_number)
    }
}
