use flotilla_agent::AgentError;
use flotilla_geo::GeoError;

use crate::phase::{PhaseKind, PhaseReport};

#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("port for agent {agent_id} overflows base {base}")]
    PortRange { agent_id: u32, base: u16 },

    #[error("fleet has no agents")]
    Empty,

    #[error("origin not set")]
    OriginNotSet,

    #[error("origin already set at {latitude_deg}, {longitude_deg}")]
    OriginAlreadySet { latitude_deg: f64, longitude_deg: f64 },

    #[error("formation has {given} slots for {expected} agents")]
    FormationSize { expected: usize, given: usize },

    #[error("hold of {seconds} s is not a valid duration")]
    InvalidHold { seconds: f64 },

    #[error("geometry error: {0}")]
    Geo(#[from] GeoError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("{phase} failed on {failed} of {total} agents, first: {first}")]
    PhaseFailed {
        phase: PhaseKind,
        first: AgentError,
        failed: usize,
        total: usize,
        report: Box<PhaseReport>,
    },

    #[error("mission step {index} ({step}) failed: {source}")]
    MissionStep {
        index: usize,
        step: String,
        #[source]
        source: Box<FleetError>,
    },

    #[error("cancelled")]
    Cancelled,
}

impl FleetError {
    /// The phase report carried by a failed phase, if this is one.
    pub fn report(&self) -> Option<&PhaseReport> {
        match self {
            Self::PhaseFailed { report, .. } => Some(&**report),
            Self::MissionStep { source, .. } => source.report(),
            _ => None,
        }
    }
}
