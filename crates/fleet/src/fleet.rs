use std::sync::{Arc, OnceLock};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use flotilla_agent::{Agent, AgentSnapshot, GotoTarget, OrbitRequest};
use flotilla_geo::{FormationSpec, LocalPoint, Origin, Waypoint, plan, to_global};
use flotilla_link::FlightLink;
use flotilla_protocol::AgentDescriptor;

use crate::config::FleetConfig;
use crate::error::FleetError;
use crate::phase::{AgentOutcome, Outcome, Phase, PhasePolicy, PhaseReport};

/// An ordered set of agents coordinated as a unit.
pub struct Fleet {
    agents: Vec<Arc<Agent>>,
    origin: OnceLock<Origin>,
    policy: PhasePolicy,
    cancel: CancellationToken,
}

impl Fleet {
    /// Builds one agent per configured member, asking `connect_link` for the
    /// link of each.
    pub fn new<F>(config: &FleetConfig, mut connect_link: F) -> Result<Self, FleetError>
    where
        F: FnMut(&AgentDescriptor) -> Arc<dyn FlightLink>,
    {
        let agents = config
            .descriptors()?
            .into_iter()
            .map(|descriptor| {
                let link = connect_link(&descriptor);
                Agent::new(descriptor, link, config.options.clone())
            })
            .collect();
        Ok(Self::from_agents(agents, config.policy))
    }

    /// Wraps existing agents. Fleet order is the order given.
    pub fn from_agents(agents: Vec<Agent>, policy: PhasePolicy) -> Self {
        info!(agents = agents.len(), ?policy, "fleet created");
        Self {
            agents: agents.into_iter().map(Arc::new).collect(),
            origin: OnceLock::new(),
            policy,
            cancel: CancellationToken::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn agents(&self) -> &[Arc<Agent>] {
        &self.agents
    }

    pub fn agent(&self, id: u32) -> Option<&Arc<Agent>> {
        self.agents.iter().find(|a| a.id() == id)
    }

    pub fn policy(&self) -> PhasePolicy {
        self.policy
    }

    pub fn origin(&self) -> Option<Origin> {
        self.origin.get().copied()
    }

    /// Fixes the local-frame origin at the first member's home position.
    ///
    /// The origin can be set once; later calls fail without changing it.
    pub async fn capture_origin(&self) -> Result<Origin, FleetError> {
        if let Some(existing) = self.origin.get() {
            return Err(already_set(existing));
        }
        let first = self.agents.first().ok_or(FleetError::Empty)?;
        let home = first.wait_home_position().await?;
        let origin = Origin::new(home.latitude_deg, home.longitude_deg, home.absolute_altitude_m)?;

        self.origin.set(origin).map_err(|_| match self.origin.get() {
            Some(existing) => already_set(existing),
            None => FleetError::OriginNotSet,
        })?;
        info!(
            lat = origin.latitude_deg,
            lon = origin.longitude_deg,
            alt = origin.altitude_m,
            "origin set"
        );
        Ok(origin)
    }

    /// Runs `phase` on every member with the fleet's policy.
    pub async fn run_phase(&self, phase: Phase) -> Result<PhaseReport, FleetError> {
        self.run_phase_with(phase, self.policy).await
    }

    /// Runs `phase` on every member concurrently and waits for all of them.
    ///
    /// Fails with [`FleetError::PhaseFailed`] if any member failed; the error
    /// carries the full report.
    pub async fn run_phase_with(
        &self,
        phase: Phase,
        policy: PhasePolicy,
    ) -> Result<PhaseReport, FleetError> {
        let kind = phase.kind();
        let total = self.agents.len();
        if let Some(given) = phase.targets().filter(|&given| given != total) {
            return Err(FleetError::FormationSize {
                expected: total,
                given,
            });
        }
        info!(phase = %kind, agents = total, "phase started");

        let mut set = JoinSet::new();
        for (index, (agent, step)) in self.agents.iter().zip(phase.into_steps(total)).enumerate() {
            let agent = Arc::clone(agent);
            set.spawn(async move { (index, step.run(&agent).await) });
        }

        let mut outcomes: Vec<Option<Outcome>> = vec![None; total];
        let mut first_failure = None;
        while let Some(joined) = set.join_next().await {
            let (index, result) = match joined {
                Ok(done) => done,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => std::panic::resume_unwind(e.into_panic()),
            };
            match result {
                Ok(()) => outcomes[index] = Some(Outcome::Completed),
                Err(err) => {
                    warn!(phase = %kind, agent = err.agent_id(), error = %err, "agent failed phase");
                    first_failure.get_or_insert(self.agents[index].id());
                    outcomes[index] = Some(Outcome::Failed(err));
                    if policy == PhasePolicy::FailFast {
                        set.abort_all();
                    }
                }
            }
        }

        let report = PhaseReport {
            phase: kind,
            outcomes: self
                .agents
                .iter()
                .zip(outcomes)
                .map(|(agent, outcome)| AgentOutcome {
                    agent_id: agent.id(),
                    outcome: outcome.unwrap_or(Outcome::Cancelled),
                })
                .collect(),
            first_failure,
        };

        match report.first_error().cloned() {
            None => {
                info!(phase = %kind, agents = total, "phase completed");
                Ok(report)
            }
            Some(first) => {
                warn!(
                    phase = %kind,
                    failed = report.failed(),
                    cancelled = report.cancelled(),
                    "phase failed"
                );
                Err(FleetError::PhaseFailed {
                    phase: kind,
                    first,
                    failed: report.failed(),
                    total,
                    report: Box::new(report),
                })
            }
        }
    }

    pub async fn connect_all(&self) -> Result<PhaseReport, FleetError> {
        self.run_phase(Phase::Connect).await
    }

    pub async fn arm_all(&self) -> Result<PhaseReport, FleetError> {
        self.run_phase(Phase::Arm).await
    }

    pub async fn takeoff_all(&self) -> Result<PhaseReport, FleetError> {
        self.run_phase(Phase::Takeoff).await
    }

    pub async fn land_all(&self) -> Result<PhaseReport, FleetError> {
        self.run_phase(Phase::Land).await
    }

    pub async fn return_all(&self) -> Result<PhaseReport, FleetError> {
        self.run_phase(Phase::ReturnToLaunch).await
    }

    pub async fn disarm_all(&self) -> Result<PhaseReport, FleetError> {
        self.run_phase(Phase::Disarm).await
    }

    /// Sends member `i` to `waypoints[i]`.
    ///
    /// A local waypoint's `z` is flown as height above that member's home; a
    /// global waypoint's altitude is absolute.
    pub async fn goto_formation(&self, waypoints: &[Waypoint]) -> Result<PhaseReport, FleetError> {
        if waypoints.len() != self.len() {
            return Err(FleetError::FormationSize {
                expected: self.len(),
                given: waypoints.len(),
            });
        }
        let targets = waypoints
            .iter()
            .map(|w| self.goto_target(w))
            .collect::<Result<Vec<_>, _>>()?;
        self.run_phase(Phase::Goto(targets)).await
    }

    /// Sends member `i` to local point `points[i]`.
    pub async fn goto_local(&self, points: &[LocalPoint]) -> Result<PhaseReport, FleetError> {
        let waypoints: Vec<_> = points.iter().copied().map(Waypoint::Local).collect();
        self.goto_formation(&waypoints).await
    }

    /// Plans `spec` for the whole fleet and flies it.
    pub async fn goto_planned(&self, spec: &FormationSpec) -> Result<PhaseReport, FleetError> {
        let waypoints = self.plan(spec)?;
        self.goto_formation(&waypoints).await
    }

    /// Expands `spec` into one waypoint per member using the fleet origin.
    pub fn plan(&self, spec: &FormationSpec) -> Result<Vec<Waypoint>, FleetError> {
        plan(spec, self.len(), self.origin.get()).map_err(from_geo)
    }

    /// Spreads the members on a circle of `spacing_m` around `center` and
    /// starts an orbit around each member's slot.
    pub async fn orbit_formation(
        &self,
        center: Waypoint,
        spacing_m: f64,
        orbit: OrbitRequest,
    ) -> Result<PhaseReport, FleetError> {
        let slots = self.plan(&FormationSpec::Circle {
            center,
            radius_m: spacing_m,
        })?;
        let requests = slots
            .iter()
            .map(|slot| {
                let p = slot.to_global(self.origin.get()).map_err(from_geo)?;
                Ok(OrbitRequest {
                    center: Some((p.latitude_deg, p.longitude_deg)),
                    ..orbit
                })
            })
            .collect::<Result<Vec<_>, FleetError>>()?;
        self.run_phase(Phase::Orbit(requests)).await
    }

    pub fn snapshots(&self) -> Vec<AgentSnapshot> {
        self.agents.iter().map(|a| a.snapshot()).collect()
    }

    /// Fleet-wide cancellation, also fired by [`shutdown`](Self::shutdown).
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Shuts every agent down. Idempotent.
    pub fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        for agent in &self.agents {
            agent.shutdown();
        }
        info!("fleet shut down");
    }

    fn goto_target(&self, waypoint: &Waypoint) -> Result<GotoTarget, FleetError> {
        match waypoint {
            Waypoint::Global(p) => Ok(GotoTarget::Global(*p)),
            Waypoint::Local(local) => {
                let origin = self.origin.get().ok_or(FleetError::OriginNotSet)?;
                let p = to_global(local, origin)?;
                Ok(GotoTarget::RelativeToHome {
                    latitude_deg: p.latitude_deg,
                    longitude_deg: p.longitude_deg,
                    relative_altitude_m: local.z,
                })
            }
        }
    }
}

impl Drop for Fleet {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn already_set(origin: &Origin) -> FleetError {
    FleetError::OriginAlreadySet {
        latitude_deg: origin.latitude_deg,
        longitude_deg: origin.longitude_deg,
    }
}

fn from_geo(err: flotilla_geo::GeoError) -> FleetError {
    match err {
        flotilla_geo::GeoError::OriginNotSet => FleetError::OriginNotSet,
        other => FleetError::Geo(other),
    }
}
