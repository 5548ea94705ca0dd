use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::agents::AgentType;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RequestPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// A unit of work submitted for coordination. Never mutated after submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoordinationRequest {
    pub query: String,
    #[serde(default)]
    pub priority: RequestPriority,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
    #[serde(default)]
    pub preferred_agents: Option<Vec<AgentType>>,
    /// Seconds.
    #[serde(default)]
    pub max_response_time: Option<u64>,
    #[serde(default)]
    pub require_multi_agent: bool,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub use_client_context: bool,
}

impl CoordinationRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            priority: RequestPriority::default(),
            context: None,
            preferred_agents: None,
            max_response_time: None,
            require_multi_agent: false,
            client_id: None,
            use_client_context: false,
        }
    }

    pub fn with_priority(mut self, priority: RequestPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_preferred_agents(mut self, agents: Vec<AgentType>) -> Self {
        self.preferred_agents = Some(agents);
        self
    }

    pub fn with_multi_agent(mut self) -> Self {
        self.require_multi_agent = true;
        self
    }

    pub fn with_max_response_time(mut self, seconds: u64) -> Self {
        self.max_response_time = Some(seconds);
        self
    }

    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self.use_client_context = true;
        self
    }

    /// Client id to resolve, if the caller asked for client context.
    pub fn context_client_id(&self) -> Option<&str> {
        if self.use_client_context {
            self.client_id.as_deref().filter(|id| !id.trim().is_empty())
        } else {
            None
        }
    }

    pub fn response_budget(&self) -> Option<Duration> {
        self.max_response_time.map(Duration::from_secs)
    }
}

/// Identity handed over by the authentication layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub user_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub is_admin: bool,
}

impl User {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: vec!["user".to_string()],
            is_admin: false,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: vec!["user".to_string(), "admin".to_string()],
            is_admin: true,
        }
    }
}
