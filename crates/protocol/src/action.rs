use std::fmt;

use serde::{Deserialize, Serialize};

/// Result code reported by the flight controller for a rejected action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionResult {
    Unknown,
    NoSystem,
    ConnectionError,
    Busy,
    CommandDenied,
    CommandDeniedLandedStateUnknown,
    CommandDeniedNotLanded,
    Timeout,
    ParameterError,
    Unsupported,
    Failed,
    InvalidArgument,
}

impl fmt::Display for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::NoSystem => "no system",
            Self::ConnectionError => "connection error",
            Self::Busy => "busy",
            Self::CommandDenied => "command denied",
            Self::CommandDeniedLandedStateUnknown => "command denied (landed state unknown)",
            Self::CommandDeniedNotLanded => "command denied (not landed)",
            Self::Timeout => "timeout",
            Self::ParameterError => "parameter error",
            Self::Unsupported => "unsupported",
            Self::Failed => "failed",
            Self::InvalidArgument => "invalid argument",
        };
        f.write_str(s)
    }
}

/// A command rejected by the flight controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ActionError {
    pub code: ActionResult,
    #[serde(default)]
    pub message: String,
}

impl ActionError {
    pub fn new(code: ActionResult, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Yaw behaviour while orbiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrbitYawBehavior {
    #[default]
    HoldFrontToCircleCenter,
    HoldInitialHeading,
    Uncontrolled,
    HoldFrontTangentToCircle,
    RcControlled,
}

/// Parameters of a do-orbit command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrbitCommand {
    pub radius_m: f64,
    pub velocity_ms: f64,
    pub yaw_behavior: OrbitYawBehavior,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub absolute_altitude_m: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_error_display_includes_code_and_reason() {
        let err = ActionError::new(ActionResult::CommandDenied, "preflight checks failed");
        assert_eq!(err.to_string(), "command denied: preflight checks failed");
    }

    #[test]
    fn action_result_serialization() {
        assert_eq!(
            serde_json::to_string(&ActionResult::CommandDeniedNotLanded).unwrap(),
            "\"command_denied_not_landed\""
        );
    }

    #[test]
    fn orbit_command_field_names() {
        let cmd = OrbitCommand {
            radius_m: 10.0,
            velocity_ms: 2.0,
            yaw_behavior: OrbitYawBehavior::HoldFrontToCircleCenter,
            latitude_deg: 47.398036,
            longitude_deg: 8.545014,
            absolute_altitude_m: 498.0,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"yawBehavior\":\"hold_front_to_circle_center\""));
        assert!(json.contains("\"velocityMs\""));
    }
}
