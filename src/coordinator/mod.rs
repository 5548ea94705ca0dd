//! Request lifecycle: route, resolve client context, invoke the selected
//! agents in parallel, synthesize.
//!
//! Per-agent failures are recorded and optionally retried on a fallback
//! agent; only routing and an empty response set fail the whole request.

mod metrics;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agents::{AgentId, AgentRegistry, AgentStatus, HealthState, Reservation};
use crate::config::{Config, CoordinationConfig};
use crate::context::{ClientContext, ClientContextPreview, ClientContextProvider, ClientStore, ContextFilter};
use crate::error::{CoordinationError, RecoveryStrategy, Result};
use crate::invoker::{invocation_timeout, invoke_with_timeout, AgentInvoker};
use crate::models::{AgentRef, AgentResponse, CoordinationRequest, CoordinationResponse, RoutingDecision, User};
use crate::routing::{RoutedPlan, RoutingEngine};
use crate::synthesis::ResponseSynthesizer;

pub use metrics::CoordinationMetrics;
use metrics::MetricsRecorder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Submitted,
    Routed,
    ContextResolved,
    Invoked,
    Synthesized,
    Completed,
    Failed,
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RequestPhase::Submitted => "submitted",
            RequestPhase::Routed => "routed",
            RequestPhase::ContextResolved => "context_resolved",
            RequestPhase::Invoked => "invoked",
            RequestPhase::Synthesized => "synthesized",
            RequestPhase::Completed => "completed",
            RequestPhase::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Registry snapshot served by the health endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub status: HealthState,
    pub total_agents: usize,
    pub healthy_agents: usize,
    pub degraded_agents: usize,
    pub unavailable_agents: usize,
    pub maintenance_agents: usize,
    /// Sum of loads over sum of capacities.
    pub system_load: f64,
    pub agents: Vec<AgentStatus>,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

/// Result of one routed slot: the primary agent plus at most one fallback.
struct SlotOutcome {
    response: Option<AgentResponse>,
    failed_agents: Vec<AgentId>,
    tried_agents: Vec<AgentId>,
}

pub struct CoordinationEngine {
    // Core collaborators
    registry: Arc<AgentRegistry>,
    router: RoutingEngine,
    context_provider: ClientContextProvider,
    context_filter: ContextFilter,
    invoker: Arc<dyn AgentInvoker>,
    synthesizer: ResponseSynthesizer,

    // Configuration
    coordination: CoordinationConfig,

    // Statistics
    metrics: RwLock<MetricsRecorder>,
    start_time: Instant,
}

impl CoordinationEngine {
    pub fn new(
        registry: Arc<AgentRegistry>,
        store: Arc<dyn ClientStore>,
        invoker: Arc<dyn AgentInvoker>,
        coordination: CoordinationConfig,
    ) -> Self {
        if registry.is_empty() {
            warn!("Coordination engine started with no registered agents; every request will fail routing");
        }
        Self {
            router: RoutingEngine::new(registry.clone(), coordination.fallback_to_any_on_preferred_miss),
            registry,
            context_provider: ClientContextProvider::new(store),
            context_filter: ContextFilter::default(),
            invoker,
            synthesizer: ResponseSynthesizer::new(),
            coordination,
            metrics: RwLock::new(MetricsRecorder::default()),
            start_time: Instant::now(),
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn ClientStore>, invoker: Arc<dyn AgentInvoker>) -> Self {
        let registry = Arc::new(AgentRegistry::new(config.agents.clone()));
        Self::new(registry, store, invoker, config.coordination.clone())
    }

    pub fn with_context_filter(mut self, filter: ContextFilter) -> Self {
        self.context_filter = filter;
        self
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Run one coordination request end to end.
    pub async fn process(&self, request: CoordinationRequest, user: &User) -> Result<CoordinationResponse> {
        let request_id = Uuid::new_v4();
        let span = info_span!("coordinate", request_id = %request_id, user_id = %user.user_id);

        async move {
            self.metrics.write().await.record_submitted();

            match self.run(request_id, &request, user).await {
                Ok(response) => {
                    self.metrics.write().await.record_completed(
                        response.total_processing_time,
                        response.quality_score,
                        response.sla_violated,
                    );
                    debug!(phase = %RequestPhase::Completed, "quality {:.2}", response.quality_score);
                    Ok(response)
                }
                Err(e) => {
                    self.metrics.write().await.record_failed();
                    error!(
                        phase = %RequestPhase::Failed,
                        request_id = %request_id,
                        user_id = %user.user_id,
                        kind = e.kind(),
                        "Coordination failed: {}",
                        e
                    );
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, request_id: Uuid, request: &CoordinationRequest, user: &User) -> Result<CoordinationResponse> {
        let started_at = Utc::now();
        let clock = Instant::now();
        debug!(
            phase = %RequestPhase::Submitted,
            "priority {:?}, multi_agent {}",
            request.priority,
            request.require_multi_agent
        );

        let RoutedPlan { decision, reservations } = self.router.route(request).await?;
        debug!(phase = %RequestPhase::Routed, "{}", decision.reasoning);

        let context = match request.context_client_id() {
            Some(client_id) => {
                let context = self.context_provider.resolve(client_id, user).await;
                debug!(
                    phase = %RequestPhase::ContextResolved,
                    "client {} context {}",
                    client_id,
                    if context.is_some() { "attached" } else { "unavailable" }
                );
                context
            }
            None => None,
        };

        let slots = decision
            .selected_agents
            .iter()
            .zip(reservations)
            .map(|(primary, reservation)| {
                let fallbacks = fallbacks_for(primary, &decision, request.require_multi_agent);
                self.invoke_slot(primary, reservation, fallbacks, request, context.as_ref())
            });
        let outcomes = join_all(slots).await;
        debug!(phase = %RequestPhase::Invoked, "{} agent slots finished", outcomes.len());

        let attempted = outcomes.len();
        let mut agent_responses = Vec::with_capacity(attempted);
        let mut failed_agents = Vec::new();
        let mut tried_agents = HashSet::new();
        for outcome in outcomes {
            agent_responses.extend(outcome.response);
            failed_agents.extend(outcome.failed_agents);
            tried_agents.extend(outcome.tried_agents);
        }

        let synthesis = self.synthesizer.synthesize(&agent_responses)?;
        let quality_score = synthesis.quality_score * agent_responses.len() as f64 / attempted as f64;
        debug!(
            phase = %RequestPhase::Synthesized,
            "{}/{} slots answered",
            agent_responses.len(),
            attempted
        );

        let elapsed = clock.elapsed();
        let sla_violated = elapsed > self.coordination.sla_threshold;
        if sla_violated {
            warn!(
                "Request {} took {:.3}s, over the {:?} SLA threshold",
                request_id,
                elapsed.as_secs_f64(),
                self.coordination.sla_threshold
            );
        }

        let recommendations = self.recommendations(&failed_agents, sla_violated);
        let next_actions = next_actions(&decision, &tried_agents);

        info!(
            "Request {} completed by {} agent(s) in {:.3}s",
            request_id,
            agent_responses.len(),
            elapsed.as_secs_f64()
        );

        Ok(CoordinationResponse {
            request_id,
            routing_decision: decision,
            agent_responses,
            synthesized_response: synthesis.text,
            total_processing_time: elapsed.as_secs_f64(),
            quality_score,
            recommendations,
            next_actions,
            client_context_used: context.is_some(),
            sla_violated,
            started_at,
            completed_at: Utc::now(),
        })
    }

    /// Invoke the routed agent; on a recoverable failure reserve and try the
    /// first fallback that still has capacity.
    async fn invoke_slot(
        &self,
        primary: &AgentRef,
        reservation: Reservation,
        fallbacks: Vec<AgentRef>,
        request: &CoordinationRequest,
        context: Option<&ClientContext>,
    ) -> SlotOutcome {
        let mut outcome = SlotOutcome {
            response: None,
            failed_agents: Vec::new(),
            tried_agents: vec![primary.agent_id.clone()],
        };

        let error = match self.attempt(reservation, request, context).await {
            Ok(response) => {
                outcome.response = Some(response);
                return outcome;
            }
            Err(e) => e,
        };
        if error.is_per_agent() {
            warn!("Agent {} failed ({}): {}", primary.agent_id, error.kind(), error);
        } else {
            error!("Agent {} slot failed outside the invocation ({}): {}", primary.agent_id, error.kind(), error);
        }
        outcome.failed_agents.push(primary.agent_id.clone());

        if !self.coordination.retry_with_fallback || error.recovery_strategy() != RecoveryStrategy::TryFallbackAgent {
            return outcome;
        }

        for fallback in fallbacks {
            let reservation = match self.registry.reserve(&fallback.agent_id).await {
                Ok(Some(reservation)) => reservation,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Could not reserve fallback {}: {}", fallback.agent_id, e);
                    continue;
                }
            };

            info!("Retrying {} slot on fallback agent {}", primary.agent_type, fallback.agent_id);
            outcome.tried_agents.push(fallback.agent_id.clone());
            match self.attempt(reservation, request, context).await {
                Ok(response) => outcome.response = Some(response),
                Err(e) => {
                    warn!("Fallback agent {} failed ({}): {}", fallback.agent_id, e.kind(), e);
                    outcome.failed_agents.push(fallback.agent_id.clone());
                }
            }
            break;
        }
        outcome
    }

    /// One invocation of an agent whose load is already reserved. Records
    /// the outcome and gives the load back; if this future is dropped the
    /// reservation guard gives it back instead.
    async fn attempt(
        &self,
        reservation: Reservation,
        request: &CoordinationRequest,
        context: Option<&ClientContext>,
    ) -> Result<AgentResponse> {
        let agent_id = reservation.agent_id().to_string();
        let clock = Instant::now();
        let result = match self.registry.get(&agent_id).await {
            Ok(agent) => {
                let projected = self.context_filter.project(context, agent.agent_type);
                let timeout = invocation_timeout(&agent, request, self.coordination.default_max_response_time);
                invoke_with_timeout(self.invoker.as_ref(), &agent, request, &projected, timeout).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = self.registry.record_outcome(&agent_id, clock.elapsed(), result.is_ok()).await {
            warn!("Could not record outcome for {}: {}", agent_id, e);
        }
        if let Err(e) = reservation.release().await {
            warn!("Could not release {}: {}", agent_id, e);
        }
        result
    }

    fn recommendations(&self, failed_agents: &[AgentId], sla_violated: bool) -> Option<Vec<String>> {
        let mut recommendations: Vec<String> = failed_agents
            .iter()
            .map(|agent_id| format!("Retry later: agent {} did not answer this request", agent_id))
            .collect();
        if sla_violated {
            recommendations.push(format!(
                "Narrow the query or request fewer agents to stay within the {:?} response target",
                self.coordination.sla_threshold
            ));
        }
        (!recommendations.is_empty()).then_some(recommendations)
    }

    pub async fn system_health(&self) -> SystemHealth {
        let agents = self.registry.snapshot().await;
        let count = |state: HealthState| agents.iter().filter(|a| a.status == state).count();

        let total_load: u64 = agents.iter().map(|a| u64::from(a.current_load)).sum();
        let total_capacity: u64 = agents.iter().map(|a| u64::from(a.max_capacity)).sum();

        SystemHealth {
            status: overall_status(&agents),
            total_agents: self.registry.len(),
            healthy_agents: count(HealthState::Healthy),
            degraded_agents: count(HealthState::Degraded),
            unavailable_agents: count(HealthState::Unavailable),
            maintenance_agents: count(HealthState::Maintenance),
            system_load: if total_capacity == 0 {
                0.0
            } else {
                total_load as f64 / total_capacity as f64
            },
            agents,
            uptime_seconds: self.start_time.elapsed().as_secs(),
            timestamp: Utc::now(),
        }
    }

    /// One agent when `agent_id` is given, otherwise every agent ordered by id.
    pub async fn agent_status(&self, agent_id: Option<&str>) -> Result<Vec<AgentStatus>> {
        match agent_id {
            Some(agent_id) => Ok(vec![self.registry.get(agent_id).await?]),
            None => Ok(self.registry.snapshot().await),
        }
    }

    pub async fn restart_agent(&self, agent_id: &str) -> Result<()> {
        self.registry.restart(agent_id).await
    }

    pub async fn enter_maintenance(&self) {
        self.registry.enter_maintenance().await;
    }

    /// Denied and missing clients both surface as `NotFound`.
    pub async fn preview_client_context(&self, client_id: &str, user: &User) -> Result<ClientContextPreview> {
        self.context_provider
            .resolve(client_id, user)
            .await
            .map(|context| ClientContextPreview::from(&context))
            .ok_or_else(|| CoordinationError::NotFound(format!("client context {}", client_id)))
    }

    pub async fn list_accessible_clients(&self, user: &User) -> Result<Vec<String>> {
        self.context_provider.accessible_clients(user).await
    }

    pub async fn metrics(&self) -> CoordinationMetrics {
        self.metrics.read().await.snapshot(self.start_time.elapsed().as_secs())
    }
}

/// Fallbacks eligible to stand in for `primary`. Multi-agent plans only
/// substitute within the same agent type.
fn fallbacks_for(primary: &AgentRef, decision: &RoutingDecision, multi_agent: bool) -> Vec<AgentRef> {
    decision
        .fallback_agents
        .iter()
        .filter(|f| !multi_agent || f.agent_type == primary.agent_type)
        .cloned()
        .collect()
}

fn next_actions(decision: &RoutingDecision, tried_agents: &HashSet<AgentId>) -> Option<Vec<String>> {
    let actions: Vec<String> = decision
        .fallback_agents
        .iter()
        .filter(|f| !tried_agents.contains(&f.agent_id))
        .map(|f| format!("Ask {} ({}) for a second opinion", f.agent_id, f.agent_type))
        .collect();
    (!actions.is_empty()).then_some(actions)
}

/// `maintenance` when every agent is in maintenance, `healthy` when all are
/// healthy, `unavailable` when none is, `degraded` otherwise.
pub fn overall_status(agents: &[AgentStatus]) -> HealthState {
    let healthy = agents.iter().filter(|a| a.status == HealthState::Healthy).count();
    if !agents.is_empty() && agents.iter().all(|a| a.status == HealthState::Maintenance) {
        HealthState::Maintenance
    } else if !agents.is_empty() && healthy == agents.len() {
        HealthState::Healthy
    } else if healthy == 0 {
        HealthState::Unavailable
    } else {
        HealthState::Degraded
    }
}
