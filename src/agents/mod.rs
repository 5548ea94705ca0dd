pub mod agent;
pub mod registry;

pub use agent::{AgentId, AgentStatus, AgentType, HealthState};
pub use registry::{AgentRegistry, Reservation};
