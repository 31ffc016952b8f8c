//! Link vocabulary for Flotilla.
//!
//! Value types exchanged with an external flight-control link: connection
//! endpoints, telemetry reports and action results. No I/O lives here.

pub mod action;
pub mod telemetry;
pub mod types;

pub use action::{ActionError, ActionResult, OrbitCommand, OrbitYawBehavior};
pub use telemetry::{Health, HomePosition, LandedState, Position, StatusSeverity, StatusText};
pub use types::{AgentDescriptor, Endpoint, LinkKind};
