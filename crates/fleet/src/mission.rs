//! Scripted fleet missions: an ordered list of steps run phase by phase.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use flotilla_agent::OrbitRequest;
use flotilla_geo::{FormationSpec, GeoPoint, LocalPoint, Waypoint};

use crate::error::FleetError;
use crate::fleet::Fleet;

fn default_orbit_radius() -> f64 {
    5.0
}

fn default_orbit_velocity() -> f64 {
    2.0
}

fn hold_duration(seconds: f64) -> Result<Duration, FleetError> {
    if seconds < 0.0 {
        return Err(FleetError::InvalidHold { seconds });
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| FleetError::InvalidHold { seconds })
}

/// One step of a mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum MissionStep {
    Connect,
    /// Fix the local frame at the first member's home.
    CaptureOrigin,
    Arm,
    Takeoff,
    Hold {
        seconds: f64,
    },
    /// Fly a planned formation.
    Goto {
        formation: FormationSpec,
    },
    /// Fly member `i` to `points[i]` in the local frame.
    GotoLocal {
        points: Vec<LocalPoint>,
    },
    /// Fly member `i` to `points[i]`, altitudes absolute.
    GotoGlobal {
        points: Vec<GeoPoint>,
    },
    /// Orbit slots spread on a circle of `spacing_m` around `center`.
    Orbit {
        center: Waypoint,
        spacing_m: f64,
        #[serde(default = "default_orbit_radius")]
        radius_m: f64,
        #[serde(default = "default_orbit_velocity")]
        velocity_ms: f64,
        #[serde(default)]
        relative_altitude_m: f64,
    },
    ReturnToLaunch,
    Land,
    Disarm,
}

impl MissionStep {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::CaptureOrigin => "capture_origin",
            Self::Arm => "arm",
            Self::Takeoff => "takeoff",
            Self::Hold { .. } => "hold",
            Self::Goto { .. } => "goto",
            Self::GotoLocal { .. } => "goto_local",
            Self::GotoGlobal { .. } => "goto_global",
            Self::Orbit { .. } => "orbit",
            Self::ReturnToLaunch => "return_to_launch",
            Self::Land => "land",
            Self::Disarm => "disarm",
        }
    }

    /// Checks the step against a fleet of `agents` members without running it.
    pub fn validate(&self, agents: usize) -> Result<(), FleetError> {
        let slots = match self {
            Self::Hold { seconds } => return hold_duration(*seconds).map(drop),
            Self::GotoLocal { points } => points.len(),
            Self::GotoGlobal { points } => points.len(),
            _ => return Ok(()),
        };
        if slots != agents {
            return Err(FleetError::FormationSize {
                expected: agents,
                given: slots,
            });
        }
        Ok(())
    }

    async fn run(&self, fleet: &Fleet) -> Result<(), FleetError> {
        match self {
            Self::Connect => fleet.connect_all().await.map(drop),
            Self::CaptureOrigin => fleet.capture_origin().await.map(drop),
            Self::Arm => fleet.arm_all().await.map(drop),
            Self::Takeoff => fleet.takeoff_all().await.map(drop),
            Self::Hold { seconds } => {
                let pause = hold_duration(*seconds)?;
                tokio::select! {
                    _ = fleet.cancel_token().cancelled() => Err(FleetError::Cancelled),
                    _ = tokio::time::sleep(pause) => Ok(()),
                }
            }
            Self::Goto { formation } => fleet.goto_planned(formation).await.map(drop),
            Self::GotoLocal { points } => fleet.goto_local(points).await.map(drop),
            Self::GotoGlobal { points } => {
                let waypoints: Vec<_> = points.iter().copied().map(Waypoint::Global).collect();
                fleet.goto_formation(&waypoints).await.map(drop)
            }
            Self::Orbit {
                center,
                spacing_m,
                radius_m,
                velocity_ms,
                relative_altitude_m,
            } => {
                let template = OrbitRequest {
                    radius_m: *radius_m,
                    velocity_ms: *velocity_ms,
                    relative_altitude_m: *relative_altitude_m,
                    center: None,
                };
                fleet
                    .orbit_formation(*center, *spacing_m, template)
                    .await
                    .map(drop)
            }
            Self::ReturnToLaunch => fleet.return_all().await.map(drop),
            Self::Land => fleet.land_all().await.map(drop),
            Self::Disarm => fleet.disarm_all().await.map(drop),
        }
    }
}

/// An ordered list of fleet steps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mission {
    pub steps: Vec<MissionStep>,
}

impl Mission {
    pub fn new(steps: Vec<MissionStep>) -> Self {
        Self { steps }
    }

    /// Connect, take off, fly two local line-ups and return home.
    ///
    /// Sized for a three-member fleet.
    pub fn demo() -> Self {
        let column = |east: f64, north: f64| -> Vec<LocalPoint> {
            [20.0, 30.0, 40.0]
                .into_iter()
                .map(|up| LocalPoint::new(east, north, up))
                .collect()
        };
        Self::new(vec![
            MissionStep::Connect,
            MissionStep::CaptureOrigin,
            MissionStep::Hold { seconds: 4.0 },
            MissionStep::Takeoff,
            MissionStep::Hold { seconds: 4.0 },
            MissionStep::GotoLocal {
                points: column(-10.0, 0.0),
            },
            MissionStep::Hold { seconds: 10.0 },
            MissionStep::GotoLocal {
                points: column(0.0, 10.0),
            },
            MissionStep::Hold { seconds: 10.0 },
            MissionStep::ReturnToLaunch,
        ])
    }

    /// Checks every step against a fleet of `agents` members, so a mission
    /// that cannot complete is rejected before anything flies.
    pub fn validate(&self, agents: usize) -> Result<(), FleetError> {
        for (index, step) in self.steps.iter().enumerate() {
            step.validate(agents).map_err(|source| FleetError::MissionStep {
                index,
                step: step.name().to_string(),
                source: Box::new(source),
            })?;
        }
        Ok(())
    }

    /// Runs every step in order. The first failed step stops the mission.
    pub async fn run(&self, fleet: &Fleet) -> Result<(), FleetError> {
        let total = self.steps.len();
        for (index, step) in self.steps.iter().enumerate() {
            info!(step = index + 1, total, name = step.name(), "mission step");
            step.run(fleet).await.map_err(|source| FleetError::MissionStep {
                index,
                step: step.name().to_string(),
                source: Box::new(source),
            })?;
        }
        info!(steps = total, "mission complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::FleetConfig;
    use flotilla_link::FlightLink;
    use flotilla_link::sim::{CommandKind, SimLink};
    use flotilla_protocol::{ActionError, ActionResult};

    fn sim_fleet(agents: u32) -> (Fleet, Vec<SimLink>) {
        let config = FleetConfig {
            agents,
            ..FleetConfig::default()
        };
        let mut sims = Vec::new();
        let fleet = Fleet::new(&config, |_| {
            let sim = SimLink::default();
            sims.push(sim.clone());
            Arc::new(sim) as Arc<dyn FlightLink>
        })
        .unwrap();
        (fleet, sims)
    }

    #[tokio::test(start_paused = true)]
    async fn demo_mission_flies_and_returns() {
        let (fleet, sims) = sim_fleet(3);
        Mission::demo().run(&fleet).await.unwrap();

        assert!(fleet.origin().is_some());
        for sim in &sims {
            let kinds = sim.command_kinds();
            assert_eq!(
                kinds,
                vec![
                    CommandKind::Connect,
                    CommandKind::Arm,
                    CommandKind::Takeoff,
                    CommandKind::Goto,
                    CommandKind::Goto,
                    CommandKind::ReturnToLaunch
                ]
            );
            assert!(!sim.is_in_air());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_step_stops_the_mission() {
        let (fleet, sims) = sim_fleet(2);
        sims[0].fail_next(
            CommandKind::Takeoff,
            ActionError::new(ActionResult::CommandDenied, "no gps"),
        );
        let mission = Mission::new(vec![
            MissionStep::Connect,
            MissionStep::Takeoff,
            MissionStep::ReturnToLaunch,
        ]);
        let err = mission.run(&fleet).await.unwrap_err();
        match &err {
            FleetError::MissionStep { index, step, .. } => {
                assert_eq!(*index, 1);
                assert_eq!(step, "takeoff");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(err.report().map(|r| r.failed()), Some(1));
        assert!(!sims[1].command_kinds().contains(&CommandKind::ReturnToLaunch));
    }

    #[tokio::test(start_paused = true)]
    async fn hold_is_cancelled_by_shutdown() {
        let (fleet, _sims) = sim_fleet(1);
        let fleet = Arc::new(fleet);
        let f = Arc::clone(&fleet);
        let mission = Mission::new(vec![MissionStep::Hold { seconds: 600.0 }]);
        let pending = tokio::spawn(async move { mission.run(&f).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        fleet.shutdown();
        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            FleetError::MissionStep { ref source, .. } if matches!(**source, FleetError::Cancelled)
        ));
    }

    #[test]
    fn demo_fits_three_members_only() {
        let demo = Mission::demo();
        demo.validate(3).unwrap();
        let err = demo.validate(5).unwrap_err();
        match err {
            FleetError::MissionStep { index, source, .. } => {
                assert_eq!(index, 5);
                assert!(matches!(
                    *source,
                    FleetError::FormationSize {
                        expected: 5,
                        given: 3
                    }
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_hold_is_rejected() {
        for seconds in [-1.0, f64::NAN, f64::INFINITY, 1e30] {
            let mission = Mission::new(vec![MissionStep::Hold { seconds }]);
            let err = mission.validate(1).unwrap_err();
            assert!(matches!(
                err,
                FleetError::MissionStep { ref source, .. }
                    if matches!(**source, FleetError::InvalidHold { .. })
            ));
        }
        Mission::new(vec![MissionStep::Hold { seconds: 0.0 }])
            .validate(1)
            .unwrap();
    }

    #[tokio::test]
    async fn negative_hold_fails_when_run() {
        let (fleet, _sims) = sim_fleet(1);
        let mission = Mission::new(vec![MissionStep::Hold { seconds: -2.0 }]);
        let err = mission.run(&fleet).await.unwrap_err();
        assert!(err.to_string().contains("hold"));
    }

    #[test]
    fn steps_deserialize_from_tagged_json() {
        let json = r#"[
            {"step": "connect"},
            {"step": "hold", "seconds": 2.5},
            {"step": "goto_local", "points": [{"x": -10.0, "y": 0.0, "z": 20.0}]},
            {"step": "goto", "formation": {"shape": "circle", "center": {"local": {"x": 0.0, "y": 0.0}}, "radius_m": 10.0}},
            {"step": "orbit", "center": {"local": {"x": 0.0, "y": 0.0}}, "spacing_m": 50.0, "relative_altitude_m": 30.0}
        ]"#;
        let steps: Vec<MissionStep> = serde_json::from_str(json).unwrap();
        assert_eq!(steps.len(), 5);
        assert_eq!(steps[1], MissionStep::Hold { seconds: 2.5 });
        match &steps[4] {
            MissionStep::Orbit {
                radius_m,
                velocity_ms,
                ..
            } => assert_eq!((*radius_m, *velocity_ms), (5.0, 2.0)),
            other => panic!("unexpected {other:?}"),
        }
    }
}
