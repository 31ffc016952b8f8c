//! Fleet coordination for Flotilla.
//!
//! A [`Fleet`] owns an ordered set of [`Agent`](flotilla_agent::Agent)s and
//! applies one [`Phase`] at a time to all of them: every member runs the
//! phase concurrently and the call returns only once all have finished, with
//! a [`PhaseReport`] of each member's outcome. The fleet also holds the
//! write-once local-frame [`Origin`](flotilla_geo::Origin) used for
//! formation flight, and a [`Mission`] runner that chains phases.

mod config;
mod error;
mod fleet;
mod mission;
mod phase;

pub use config::FleetConfig;
pub use error::FleetError;
pub use fleet::Fleet;
pub use mission::{Mission, MissionStep};
pub use phase::{AgentOutcome, Outcome, Phase, PhaseKind, PhasePolicy, PhaseReport};
