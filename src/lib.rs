pub mod agents;
pub mod api;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod invoker;
pub mod models;
pub mod routing;
pub mod synthesis;

pub use agents::{AgentRegistry, AgentStatus, AgentType, HealthState};
pub use config::Config;
pub use coordinator::CoordinationEngine;
pub use error::{CoordinationError, Result};
pub use models::{CoordinationRequest, CoordinationResponse, User};
