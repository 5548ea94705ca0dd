use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::agents::{AgentId, AgentStatus, AgentType};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentRef {
    pub agent_id: AgentId,
    pub agent_type: AgentType,
}

impl From<&AgentStatus> for AgentRef {
    fn from(status: &AgentStatus) -> Self {
        Self {
            agent_id: status.agent_id.clone(),
            agent_type: status.agent_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingDecision {
    pub selected_agents: Vec<AgentRef>,
    pub reasoning: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_agents: Vec<AgentRef>,
    /// Seconds.
    pub estimated_completion_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResponse {
    pub agent_id: AgentId,
    pub agent_type: AgentType,
    pub response: String,
    pub confidence: f64,
    /// Seconds.
    pub processing_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationResponse {
    pub request_id: Uuid,
    pub routing_decision: RoutingDecision,
    pub agent_responses: Vec<AgentResponse>,
    pub synthesized_response: String,
    /// Seconds.
    pub total_processing_time: f64,
    pub quality_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_actions: Option<Vec<String>>,
    pub client_context_used: bool,
    pub sla_violated: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}
