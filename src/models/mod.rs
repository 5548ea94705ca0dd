pub mod request;
pub mod response;

pub use request::{CoordinationRequest, RequestPriority, User};
pub use response::{AgentRef, AgentResponse, CoordinationResponse, RoutingDecision};
