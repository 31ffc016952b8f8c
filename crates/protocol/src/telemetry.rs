use serde::{Deserialize, Serialize};

/// Global position report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    /// Altitude above mean sea level.
    pub absolute_altitude_m: f64,
    /// Altitude above the home position.
    #[serde(default)]
    pub relative_altitude_m: f64,
}

/// Home (launch) position report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HomePosition {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub absolute_altitude_m: f64,
}

/// Landed state reported by the flight controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LandedState {
    #[default]
    Unknown,
    OnGround,
    InAir,
    TakingOff,
    Landing,
}

impl LandedState {
    pub fn is_on_ground(self) -> bool {
        self == Self::OnGround
    }
}

/// Estimator health flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    #[serde(default)]
    pub is_global_position_ok: bool,
    #[serde(default)]
    pub is_home_position_ok: bool,
    #[serde(default)]
    pub is_local_position_ok: bool,
    #[serde(default)]
    pub is_armable: bool,
}

impl Health {
    /// Both a global position estimate and a home position are available.
    pub fn is_navigation_ready(&self) -> bool {
        self.is_global_position_ok && self.is_home_position_ok
    }
}

/// Severity attached to a status text message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusSeverity {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

/// Free-form status text from the flight controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusText {
    pub severity: StatusSeverity,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_field_names() {
        let pos = Position {
            latitude_deg: 47.397606,
            longitude_deg: 8.543060,
            absolute_altitude_m: 488.0,
            relative_altitude_m: 0.1,
        };
        let json = serde_json::to_string(&pos).unwrap();
        assert!(json.contains("\"latitudeDeg\""));
        assert!(json.contains("\"absoluteAltitudeM\""));
        let parsed: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(pos, parsed);
    }

    #[test]
    fn position_relative_altitude_optional() {
        let json = r#"{"latitudeDeg":1.0,"longitudeDeg":2.0,"absoluteAltitudeM":3.0}"#;
        let pos: Position = serde_json::from_str(json).unwrap();
        assert_eq!(pos.relative_altitude_m, 0.0);
    }

    #[test]
    fn landed_state_serialization() {
        assert_eq!(
            serde_json::to_string(&LandedState::OnGround).unwrap(),
            "\"on_ground\""
        );
        assert!(LandedState::OnGround.is_on_ground());
        assert!(!LandedState::Landing.is_on_ground());
    }

    #[test]
    fn health_navigation_ready_needs_both_flags() {
        let mut health = Health {
            is_global_position_ok: true,
            ..Health::default()
        };
        assert!(!health.is_navigation_ready());
        health.is_home_position_ok = true;
        assert!(health.is_navigation_ready());
    }

    #[test]
    fn severity_ordering() {
        assert!(StatusSeverity::Warning > StatusSeverity::Info);
        assert!(StatusSeverity::Emergency > StatusSeverity::Critical);
    }
}
