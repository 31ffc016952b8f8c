//! Public types for the agent state machine.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use flotilla_geo::GeoPoint;
use flotilla_telemetry::TelemetrySnapshot;

/// Position of an agent in its command state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlightPhase {
    #[default]
    Disconnected,
    Connected,
    Armed,
    Airborne,
    Landing,
    Landed,
    Disarmed,
}

impl fmt::Display for FlightPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Armed => "armed",
            Self::Airborne => "airborne",
            Self::Landing => "landing",
            Self::Landed => "landed",
            Self::Disarmed => "disarmed",
        };
        f.write_str(s)
    }
}

/// Agent operations, as named in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Connect,
    Arm,
    Takeoff,
    Goto,
    Orbit,
    ReturnToLaunch,
    Land,
    Disarm,
    WaitHome,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connect => "connect",
            Self::Arm => "arm",
            Self::Takeoff => "takeoff",
            Self::Goto => "goto",
            Self::Orbit => "orbit",
            Self::ReturnToLaunch => "return_to_launch",
            Self::Land => "land",
            Self::Disarm => "disarm",
            Self::WaitHome => "wait_home",
        };
        f.write_str(s)
    }
}

/// Tunables of one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOptions {
    /// Upper bound on any single telemetry wait. `None` waits indefinitely.
    pub wait_timeout: Option<Duration>,
    /// Pause between the disarm and the second arm attempt.
    pub arm_settle: Duration,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            wait_timeout: None,
            arm_settle: Duration::from_secs(2),
        }
    }
}

/// Destination of a go-to command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum GotoTarget {
    /// Absolute position; `altitude_m` is above mean sea level.
    Global(GeoPoint),
    /// Horizontal position with a height above the agent's own home.
    RelativeToHome {
        latitude_deg: f64,
        longitude_deg: f64,
        relative_altitude_m: f64,
    },
}

/// Parameters of an orbit around a point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbitRequest {
    pub radius_m: f64,
    pub velocity_ms: f64,
    /// Added to the agent's current absolute altitude.
    #[serde(default)]
    pub relative_altitude_m: f64,
    /// `(latitude, longitude)` of the circle center; the current position
    /// when absent.
    #[serde(default)]
    pub center: Option<(f64, f64)>,
}

/// Point-in-time view of one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSnapshot {
    pub id: u32,
    pub phase: FlightPhase,
    pub telemetry: TelemetrySnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let opts = AgentOptions::default();
        assert_eq!(opts.wait_timeout, None);
        assert_eq!(opts.arm_settle, Duration::from_secs(2));
    }

    #[test]
    fn goto_target_is_tagged_by_frame() {
        let target = GotoTarget::RelativeToHome {
            latitude_deg: 47.0,
            longitude_deg: 8.0,
            relative_altitude_m: 10.0,
        };
        let json = serde_json::to_value(target).unwrap();
        assert_eq!(json["frame"], "relative_to_home");
        assert_eq!(json["relative_altitude_m"], 10.0);
    }

    #[test]
    fn phase_display() {
        assert_eq!(FlightPhase::Airborne.to_string(), "airborne");
        assert_eq!(Operation::ReturnToLaunch.to_string(), "return_to_launch");
    }
}
