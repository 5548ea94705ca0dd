use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::agents::{AgentId, AgentStatus, AgentType, HealthState};
use crate::config::AgentDefinition;
use crate::error::{CoordinationError, Result};

/// Weight of the newest sample in the rolling response time.
const RESPONSE_TIME_ALPHA: f64 = 0.2;

#[derive(Debug)]
struct AgentRecord {
    definition: AgentDefinition,
    health: HealthState,
    current_load: u32,
    last_health_check: DateTime<Utc>,
    average_response_time: f64,
    attempts: u64,
    successes: u64,
}

impl AgentRecord {
    fn new(definition: AgentDefinition) -> Self {
        let average_response_time = definition.average_response_time;
        Self {
            definition,
            health: HealthState::Healthy,
            current_load: 0,
            last_health_check: Utc::now(),
            average_response_time,
            attempts: 0,
            successes: 0,
        }
    }

    fn touch(&mut self) {
        self.last_health_check = Utc::now();
    }

    fn is_eligible(&self) -> bool {
        self.health == HealthState::Healthy && self.current_load < self.definition.max_capacity
    }

    fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            1.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }

    fn status(&self) -> AgentStatus {
        AgentStatus {
            agent_id: self.definition.id.clone(),
            agent_type: self.definition.agent_type,
            status: self.health,
            last_health_check: self.last_health_check,
            current_load: self.current_load,
            max_capacity: self.definition.max_capacity,
            average_response_time: self.average_response_time,
            success_rate: self.success_rate(),
            version: self.definition.version.clone(),
            endpoint_url: self.definition.endpoint.clone(),
            sla: self.definition.sla,
        }
    }
}

/// Process-lifetime table of agents. The set of ids is fixed at construction;
/// each entry carries its own lock so writers on one agent never block
/// readers of another.
pub struct AgentRegistry {
    entries: BTreeMap<AgentId, Arc<RwLock<AgentRecord>>>,
}

impl AgentRegistry {
    pub fn new(definitions: Vec<AgentDefinition>) -> Self {
        let entries = definitions
            .into_iter()
            .map(|definition| {
                (
                    definition.id.clone(),
                    Arc::new(RwLock::new(AgentRecord::new(definition))),
                )
            })
            .collect::<BTreeMap<_, _>>();

        info!("Agent registry initialized with {} agents", entries.len());
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, agent_id: &str) -> Result<&Arc<RwLock<AgentRecord>>> {
        self.entries
            .get(agent_id)
            .ok_or_else(|| CoordinationError::NotFound(format!("agent {}", agent_id)))
    }

    pub async fn get(&self, agent_id: &str) -> Result<AgentStatus> {
        let record = self.entry(agent_id)?.read().await;
        Ok(record.status())
    }

    /// Status of every agent, ordered by id.
    pub async fn snapshot(&self) -> Vec<AgentStatus> {
        let mut statuses = Vec::with_capacity(self.entries.len());
        for entry in self.entries.values() {
            statuses.push(entry.read().await.status());
        }
        statuses
    }

    pub async fn list_eligible(&self, required_type: Option<AgentType>) -> Vec<AgentStatus> {
        self.snapshot()
            .await
            .into_iter()
            .filter(|status| status.is_eligible())
            .filter(|status| required_type.map_or(true, |t| status.agent_type == t))
            .collect()
    }

    pub async fn set_health(&self, agent_id: &str, state: HealthState) -> Result<()> {
        let mut record = self.entry(agent_id)?.write().await;
        if record.health != state {
            info!("Agent {} health {} -> {}", agent_id, record.health, state);
        }
        record.health = state;
        record.touch();
        Ok(())
    }

    /// Bring an agent back to a clean healthy state with no in-flight load.
    pub async fn restart(&self, agent_id: &str) -> Result<()> {
        let mut record = self.entry(agent_id)?.write().await;
        info!("Restarting agent {}", agent_id);
        record.health = HealthState::Healthy;
        record.current_load = 0;
        record.touch();
        Ok(())
    }

    pub async fn enter_maintenance(&self) {
        info!("Entering maintenance mode for {} agents", self.entries.len());
        for entry in self.entries.values() {
            let mut record = entry.write().await;
            record.health = HealthState::Maintenance;
            record.touch();
        }
    }

    /// Take one unit of capacity if the agent is still eligible. The check and
    /// the increment happen under the same write guard.
    pub async fn try_reserve(&self, agent_id: &str) -> Result<bool> {
        let mut record = self.entry(agent_id)?.write().await;
        if !record.is_eligible() {
            debug!(
                "Agent {} no longer eligible (health={}, load={}/{})",
                agent_id, record.health, record.current_load, record.definition.max_capacity
            );
            return Ok(false);
        }
        record.current_load += 1;
        record.touch();
        Ok(true)
    }

    /// Like [`AgentRegistry::try_reserve`], but hands the unit back as a
    /// [`Reservation`] that releases itself if dropped.
    pub async fn reserve(self: &Arc<Self>, agent_id: &str) -> Result<Option<Reservation>> {
        if !self.try_reserve(agent_id).await? {
            return Ok(None);
        }
        Ok(Some(Reservation {
            registry: self.clone(),
            agent_id: agent_id.to_string(),
            held: true,
        }))
    }

    pub async fn release(&self, agent_id: &str) -> Result<()> {
        let mut record = self.entry(agent_id)?.write().await;
        if record.current_load == 0 {
            warn!("Release on agent {} with no load recorded", agent_id);
        }
        record.current_load = record.current_load.saturating_sub(1);
        record.touch();
        Ok(())
    }

    pub async fn record_outcome(&self, agent_id: &str, elapsed: Duration, success: bool) -> Result<()> {
        let mut record = self.entry(agent_id)?.write().await;
        record.attempts += 1;
        if success {
            record.successes += 1;
            record.average_response_time = (1.0 - RESPONSE_TIME_ALPHA) * record.average_response_time
                + RESPONSE_TIME_ALPHA * elapsed.as_secs_f64();
        }
        record.touch();
        Ok(())
    }
}

/// One unit of load held on an agent. A reservation dropped without
/// [`Reservation::release`] (cancelled request, panicking invoker) still gives
/// the unit back.
#[must_use = "dropping a reservation releases the load immediately"]
pub struct Reservation {
    registry: Arc<AgentRegistry>,
    agent_id: AgentId,
    held: bool,
}

impl Reservation {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub async fn release(mut self) -> Result<()> {
        let result = self.registry.release(&self.agent_id).await;
        if result.is_ok() {
            self.held = false;
        }
        result
    }
}

impl fmt::Debug for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation")
            .field("agent_id", &self.agent_id)
            .field("held", &self.held)
            .finish()
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.held {
            return;
        }

        let Ok(entry) = self.registry.entry(&self.agent_id) else {
            return;
        };
        if let Ok(mut record) = entry.try_write() {
            debug!("Releasing abandoned reservation on {}", self.agent_id);
            record.current_load = record.current_load.saturating_sub(1);
            record.touch();
            return;
        }

        // entry is busy; hand the release to the runtime
        let registry = self.registry.clone();
        let agent_id = std::mem::take(&mut self.agent_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = registry.release(&agent_id).await {
                        warn!("Failed to release abandoned reservation on {}: {}", agent_id, e);
                    }
                });
            }
            Err(_) => warn!("Reservation on {} dropped outside a runtime, load not released", agent_id),
        }
    }
}
