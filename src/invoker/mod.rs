use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::agents::AgentStatus;
use crate::context::ContextMap;
use crate::error::{CoordinationError, Result};
use crate::models::{AgentResponse, CoordinationRequest};

/// Boundary to whatever actually talks to agents. Implementations return
/// `AgentUnreachable` for transport failures; timeouts are applied by
/// [`invoke_with_timeout`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(
        &self,
        agent: &AgentStatus,
        request: &CoordinationRequest,
        context: &ContextMap,
    ) -> Result<AgentResponse>;
}

/// The request's budget (or `default_budget`) capped by the agent's own SLA.
pub fn invocation_timeout(agent: &AgentStatus, request: &CoordinationRequest, default_budget: Duration) -> Duration {
    request.response_budget().unwrap_or(default_budget).min(agent.sla)
}

pub async fn invoke_with_timeout(
    invoker: &dyn AgentInvoker,
    agent: &AgentStatus,
    request: &CoordinationRequest,
    context: &ContextMap,
    timeout: Duration,
) -> Result<AgentResponse> {
    debug!("Invoking agent {} with timeout {:?}", agent.agent_id, timeout);
    match tokio::time::timeout(timeout, invoker.invoke(agent, request, context)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Agent {} did not answer within {:?}", agent.agent_id, timeout);
            Err(CoordinationError::AgentTimeout {
                agent_id: agent.agent_id.clone(),
                timeout,
            })
        }
    }
}

/// Stand-in used until agents are reachable over a real transport. Produces a
/// deterministic answer after an optional artificial delay.
#[derive(Debug, Clone, Default)]
pub struct SimulatedAgentInvoker {
    latency: Duration,
}

impl SimulatedAgentInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl AgentInvoker for SimulatedAgentInvoker {
    async fn invoke(
        &self,
        agent: &AgentStatus,
        request: &CoordinationRequest,
        context: &ContextMap,
    ) -> Result<AgentResponse> {
        let started = Instant::now();
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }

        let mut response = format!("[{}] analysis for: {}", agent.agent_type, request.query);
        if !context.is_empty() {
            let keys = context.keys().cloned().collect::<Vec<_>>().join(", ");
            response.push_str(&format!(" (client context: {})", keys));
        }

        let mut metadata = Map::new();
        metadata.insert("client_context_used".to_string(), json!(!context.is_empty()));
        metadata.insert(
            "context_keys".to_string(),
            Value::Array(context.keys().cloned().map(Value::String).collect()),
        );
        metadata.insert("agent_version".to_string(), json!(agent.version));

        Ok(AgentResponse {
            agent_id: agent.agent_id.clone(),
            agent_type: agent.agent_type,
            response,
            confidence: 0.9,
            processing_time: started.elapsed().as_secs_f64(),
            sources: None,
            metadata: Some(metadata),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentType, HealthState};
    use chrono::Utc;

    fn agent(sla: Duration) -> AgentStatus {
        AgentStatus {
            agent_id: "technical_seo_agent".to_string(),
            agent_type: AgentType::TechnicalSeo,
            status: HealthState::Healthy,
            last_health_check: Utc::now(),
            current_load: 0,
            max_capacity: 10,
            average_response_time: 0.5,
            success_rate: 1.0,
            version: "1.0.0".to_string(),
            endpoint_url: "http://technical-seo-agent/api".to_string(),
            sla,
        }
    }

    #[test]
    fn test_timeout_is_smaller_of_budget_and_sla() {
        let default_budget = Duration::from_secs(30);

        let request = CoordinationRequest::new("q");
        assert_eq!(
            invocation_timeout(&agent(Duration::from_secs(10)), &request, default_budget),
            Duration::from_secs(10)
        );

        let request = CoordinationRequest::new("q").with_max_response_time(3);
        assert_eq!(
            invocation_timeout(&agent(Duration::from_secs(10)), &request, default_budget),
            Duration::from_secs(3)
        );

        assert_eq!(
            invocation_timeout(&agent(Duration::from_secs(60)), &CoordinationRequest::new("q"), default_budget),
            default_budget
        );
    }

    #[tokio::test]
    async fn test_simulated_invoker_reports_context_use() {
        let invoker = SimulatedAgentInvoker::new();
        let mut context = ContextMap::new();
        context.insert("brand_voice".to_string(), json!("professional"));

        let response = invoker
            .invoke(&agent(Duration::from_secs(1)), &CoordinationRequest::new("audit site"), &context)
            .await
            .unwrap();

        assert_eq!(response.agent_id, "technical_seo_agent");
        assert!(response.response.contains("audit site"));
        assert!(response.response.contains("brand_voice"));
        assert_eq!(response.confidence, 0.9);
        let metadata = response.metadata.unwrap();
        assert_eq!(metadata["client_context_used"], json!(true));
    }

    #[tokio::test]
    async fn test_slow_agent_times_out() {
        let invoker = SimulatedAgentInvoker::new().with_latency(Duration::from_millis(500));
        let result = invoke_with_timeout(
            &invoker,
            &agent(Duration::from_secs(1)),
            &CoordinationRequest::new("q"),
            &ContextMap::new(),
            Duration::from_millis(20),
        )
        .await;

        assert!(matches!(result, Err(CoordinationError::AgentTimeout { .. })));
    }

    #[tokio::test]
    async fn test_invoker_errors_pass_through() {
        let mut invoker = MockAgentInvoker::new();
        invoker.expect_invoke().returning(|agent, _, _| {
            Err(CoordinationError::AgentUnreachable {
                agent_id: agent.agent_id.clone(),
                reason: "connection refused".to_string(),
            })
        });

        let result = invoke_with_timeout(
            &invoker,
            &agent(Duration::from_secs(1)),
            &CoordinationRequest::new("q"),
            &ContextMap::new(),
            Duration::from_secs(1),
        )
        .await;

        assert!(matches!(result, Err(CoordinationError::AgentUnreachable { .. })));
    }
}
