//! One controlled vehicle.
//!
//! An [`Agent`] drives a single [`FlightLink`](flotilla_link::FlightLink)
//! through connect, arm, takeoff, navigation and landing, and owns the
//! [`TelemetryCache`](flotilla_telemetry::TelemetryCache) its observers keep
//! current. Every blocking wait honours the agent's [`AgentOptions`] timeout
//! and its cancellation token.

mod agent;
mod error;
mod types;
mod wait;

pub use agent::Agent;
pub use error::AgentError;
pub use types::{AgentOptions, AgentSnapshot, FlightPhase, GotoTarget, Operation, OrbitRequest};
