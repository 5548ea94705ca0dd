//! Load-aware agent selection.
//!
//! Candidates are ranked by load ratio, then rolling response time, then id,
//! so the same registry state and request always produce the same decision.
//! Selection and the load increment for the chosen agent happen under that
//! agent's write lock (see [`AgentRegistry::try_reserve`]).

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::agents::{AgentRegistry, AgentStatus, AgentType, Reservation};
use crate::error::{CoordinationError, Result};
use crate::models::{AgentRef, CoordinationRequest, RoutingDecision};

/// Pool size at which routing confidence stops growing.
const CONFIDENT_POOL_SIZE: f64 = 3.0;

/// A routing decision plus the load it holds, one reservation per selected
/// agent in the same order.
#[derive(Debug)]
pub struct RoutedPlan {
    pub decision: RoutingDecision,
    pub reservations: Vec<Reservation>,
}

pub struct RoutingEngine {
    registry: Arc<AgentRegistry>,
    fallback_to_any_on_preferred_miss: bool,
}

impl RoutingEngine {
    pub fn new(registry: Arc<AgentRegistry>, fallback_to_any_on_preferred_miss: bool) -> Self {
        Self {
            registry,
            fallback_to_any_on_preferred_miss,
        }
    }

    /// Select agents for `request` and reserve one unit of capacity on each.
    /// The load stays taken until the returned reservations are released or dropped.
    pub async fn route(&self, request: &CoordinationRequest) -> Result<RoutedPlan> {
        let eligible = self.registry.list_eligible(None).await;
        let mut pool = self.restrict_to_preferred(eligible, request)?;
        if pool.is_empty() {
            return Err(CoordinationError::NoEligibleAgent(
                "no healthy agent with spare capacity".to_string(),
            ));
        }
        rank(&mut pool);

        let (selected, reservations): (Vec<AgentStatus>, Vec<Reservation>) = if request.require_multi_agent {
            self.reserve_per_type(&pool, request).await?.into_iter().unzip()
        } else {
            let (agent, reservation) = self.reserve_first(&pool).await?;
            (vec![agent], vec![reservation])
        };

        let decision = build_decision(&pool, &selected, request.require_multi_agent);
        info!(
            "Routed to [{}] with confidence {:.2}",
            decision
                .selected_agents
                .iter()
                .map(|a| a.agent_id.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            decision.confidence
        );
        Ok(RoutedPlan { decision, reservations })
    }

    fn restrict_to_preferred(
        &self,
        eligible: Vec<AgentStatus>,
        request: &CoordinationRequest,
    ) -> Result<Vec<AgentStatus>> {
        let preferred = match request.preferred_agents.as_deref() {
            Some(preferred) if !preferred.is_empty() => preferred,
            _ => return Ok(eligible),
        };

        let matching: Vec<AgentStatus> = eligible
            .iter()
            .filter(|status| preferred.contains(&status.agent_type))
            .cloned()
            .collect();

        if !matching.is_empty() {
            return Ok(matching);
        }

        if self.fallback_to_any_on_preferred_miss {
            warn!(
                "None of the preferred agent types {:?} are eligible, falling back to the full pool",
                preferred
            );
            return Ok(eligible);
        }

        Err(CoordinationError::NoEligibleAgent(format!(
            "none of the preferred agent types {} are eligible",
            preferred.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", ")
        )))
    }

    async fn reserve_first(&self, ranked: &[AgentStatus]) -> Result<(AgentStatus, Reservation)> {
        for candidate in ranked {
            if let Some(reservation) = self.registry.reserve(&candidate.agent_id).await? {
                return Ok((candidate.clone(), reservation));
            }
            debug!("Candidate {} lost eligibility, trying next", candidate.agent_id);
        }
        Err(CoordinationError::NoEligibleAgent(
            "every candidate reached capacity during selection".to_string(),
        ))
    }

    async fn reserve_per_type(
        &self,
        ranked: &[AgentStatus],
        request: &CoordinationRequest,
    ) -> Result<Vec<(AgentStatus, Reservation)>> {
        let groups = group_by_type(ranked, request.preferred_agents.as_deref());
        if groups.len() < 2 {
            return Err(CoordinationError::NoEligibleAgent(format!(
                "multi-agent routing needs at least two distinct agent types, {} eligible",
                groups.len()
            )));
        }

        let mut selected = Vec::with_capacity(groups.len());
        for (_, candidates) in groups {
            if let Ok(picked) = self.reserve_first(&candidates).await {
                selected.push(picked);
            }
        }

        if selected.len() < 2 {
            for (_, reservation) in selected {
                reservation.release().await?;
            }
            return Err(CoordinationError::NoEligibleAgent(
                "multi-agent routing could not reserve two distinct agent types".to_string(),
            ));
        }
        Ok(selected)
    }
}

/// Lower load ratio first, then faster agents, then lexical id.
pub fn compare_candidates(a: &AgentStatus, b: &AgentStatus) -> Ordering {
    a.load_ratio()
        .total_cmp(&b.load_ratio())
        .then_with(|| a.average_response_time.total_cmp(&b.average_response_time))
        .then_with(|| a.agent_id.cmp(&b.agent_id))
}

pub fn rank(candidates: &mut [AgentStatus]) {
    candidates.sort_by(compare_candidates);
}

/// `avg(success_rate of selected) * min(1, eligible_count / 3)`
pub fn routing_confidence(selected: &[AgentStatus], eligible_count: usize) -> f64 {
    if selected.is_empty() {
        return 0.0;
    }
    let mean_success = selected.iter().map(|s| s.success_rate).sum::<f64>() / selected.len() as f64;
    let pool_factor = (eligible_count as f64 / CONFIDENT_POOL_SIZE).min(1.0);
    (mean_success * pool_factor).clamp(0.0, 1.0)
}

/// Ranked candidates per type, keyed by the position the type should take in
/// the routing order: the caller's preference order when given, otherwise the
/// declaration order of [`AgentType`].
fn group_by_type(
    ranked: &[AgentStatus],
    preferred: Option<&[AgentType]>,
) -> BTreeMap<(usize, AgentType), Vec<AgentStatus>> {
    let position = |agent_type: AgentType| {
        preferred
            .and_then(|p| p.iter().position(|t| *t == agent_type))
            .unwrap_or(usize::MAX)
    };

    let mut groups: BTreeMap<(usize, AgentType), Vec<AgentStatus>> = BTreeMap::new();
    for candidate in ranked {
        groups
            .entry((position(candidate.agent_type), candidate.agent_type))
            .or_default()
            .push(candidate.clone());
    }
    groups
}

fn build_decision(pool: &[AgentStatus], selected: &[AgentStatus], multi_agent: bool) -> RoutingDecision {
    let fallback_agents = pool
        .iter()
        .filter(|candidate| !selected.iter().any(|s| s.agent_id == candidate.agent_id))
        .filter(|candidate| !multi_agent || selected.iter().any(|s| s.agent_type == candidate.agent_type))
        .map(AgentRef::from)
        .collect();

    let estimated_completion_time = selected
        .iter()
        .map(|s| s.average_response_time)
        .fold(0.0, f64::max);

    let picks = selected
        .iter()
        .map(|s| format!("{} ({}, load {}/{})", s.agent_id, s.agent_type, s.current_load, s.max_capacity))
        .collect::<Vec<_>>()
        .join(", ");
    let reasoning = if multi_agent {
        format!(
            "Multi-agent plan across {} agent types from {} eligible agents, least-loaded per type: {}",
            selected.len(),
            pool.len(),
            picks
        )
    } else {
        format!("Least-loaded agent among {} eligible: {}", pool.len(), picks)
    };

    RoutingDecision {
        selected_agents: selected.iter().map(AgentRef::from).collect(),
        reasoning,
        confidence: routing_confidence(selected, pool.len()),
        fallback_agents,
        estimated_completion_time,
    }
}
