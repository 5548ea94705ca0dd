use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type AgentId = String;

/// Category of work an agent can take on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    ContentResearch,
    TechnicalSeo,
    ProjectPlanning,
    BrdGeneration,
    SocialMedia,
}

impl AgentType {
    pub const ALL: [AgentType; 5] = [
        AgentType::ContentResearch,
        AgentType::TechnicalSeo,
        AgentType::ProjectPlanning,
        AgentType::BrdGeneration,
        AgentType::SocialMedia,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::ContentResearch => "content_research",
            AgentType::TechnicalSeo => "technical_seo",
            AgentType::ProjectPlanning => "project_planning",
            AgentType::BrdGeneration => "brd_generation",
            AgentType::SocialMedia => "social_media",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unavailable,
    Maintenance,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unavailable => "unavailable",
            HealthState::Maintenance => "maintenance",
        };
        f.write_str(label)
    }
}

/// Point-in-time view of one registry entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentStatus {
    pub agent_id: AgentId,
    pub agent_type: AgentType,
    pub status: HealthState,
    pub last_health_check: DateTime<Utc>,
    pub current_load: u32,
    pub max_capacity: u32,
    /// Rolling average, seconds.
    pub average_response_time: f64,
    pub success_rate: f64,
    pub version: String,
    pub endpoint_url: String,
    #[serde(skip)]
    pub sla: std::time::Duration,
}

impl AgentStatus {
    /// Healthy and below capacity.
    pub fn is_eligible(&self) -> bool {
        self.status == HealthState::Healthy && self.current_load < self.max_capacity
    }

    pub fn load_ratio(&self) -> f64 {
        self.current_load as f64 / self.max_capacity.max(1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn status(load: u32, capacity: u32, health: HealthState) -> AgentStatus {
        AgentStatus {
            agent_id: "agent".to_string(),
            agent_type: AgentType::TechnicalSeo,
            status: health,
            last_health_check: Utc::now(),
            current_load: load,
            max_capacity: capacity,
            average_response_time: 0.5,
            success_rate: 1.0,
            version: "1.0.0".to_string(),
            endpoint_url: "http://seo".to_string(),
            sla: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_eligibility() {
        assert!(status(0, 1, HealthState::Healthy).is_eligible());
        assert!(!status(1, 1, HealthState::Healthy).is_eligible());
        assert!(!status(0, 10, HealthState::Degraded).is_eligible());
        assert!(!status(0, 10, HealthState::Maintenance).is_eligible());
    }

    #[test]
    fn test_agent_type_wire_names() {
        let json = serde_json::to_string(&AgentType::ContentResearch).unwrap();
        assert_eq!(json, "\"content_research\"");

        let parsed: AgentType = serde_json::from_str("\"technical_seo\"").unwrap();
        assert_eq!(parsed, AgentType::TechnicalSeo);
        assert_eq!(AgentType::BrdGeneration.to_string(), "brd_generation");
    }

    #[test]
    fn test_load_ratio() {
        assert_eq!(status(25, 100, HealthState::Healthy).load_ratio(), 0.25);
    }
}
