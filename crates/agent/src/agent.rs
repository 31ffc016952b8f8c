use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use flotilla_geo::{GeoPoint, bearing_deg, ground_distance_m};
use flotilla_link::FlightLink;
use flotilla_protocol::{
    ActionError, AgentDescriptor, HomePosition, OrbitCommand, OrbitYawBehavior,
};
use flotilla_telemetry::{Observers, TelemetryCache};

use crate::error::AgentError;
use crate::types::{AgentOptions, AgentSnapshot, FlightPhase, GotoTarget, Operation, OrbitRequest};
use crate::wait::WaitScope;

/// One controlled vehicle and its cached state.
///
/// Methods take `&self` so an `Arc<Agent>` can be shared with the fleet's
/// fan-out tasks. Calls on one agent are expected to be issued sequentially.
pub struct Agent {
    descriptor: AgentDescriptor,
    link: Arc<dyn FlightLink>,
    cache: TelemetryCache,
    options: AgentOptions,
    phase: Mutex<FlightPhase>,
    observers: Mutex<Option<Observers>>,
    cancel: CancellationToken,
}

impl Agent {
    pub fn new(descriptor: AgentDescriptor, link: Arc<dyn FlightLink>, options: AgentOptions) -> Self {
        Self {
            descriptor,
            link,
            cache: TelemetryCache::new(),
            options,
            phase: Mutex::new(FlightPhase::Disconnected),
            observers: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.descriptor.id
    }

    pub fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    /// The cache kept current by this agent's observers.
    pub fn telemetry(&self) -> &TelemetryCache {
        &self.cache
    }

    pub fn phase(&self) -> FlightPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id(),
            phase: self.phase(),
            telemetry: self.cache.snapshot(),
        }
    }

    /// Connects the link and waits until it reports connected, then starts
    /// the telemetry observers. A no-op when already connected.
    pub async fn connect(&self) -> Result<(), AgentError> {
        let scope = self.scope(Operation::Connect)?;
        if self.cache.connected() && self.observers_running() {
            debug!(agent = self.id(), "already connected");
            return Ok(());
        }

        let endpoint = &self.descriptor.endpoint;
        info!(agent = self.id(), endpoint = %endpoint.url(), "connecting");
        self.link
            .connect(endpoint)
            .await
            .map_err(|source| AgentError::Link {
                agent_id: self.id(),
                source,
            })?;
        scope
            .until(self.link.connection_state(), "connection_state", |c| *c)
            .await?;

        self.cache.set_connected(true);
        self.start_observers();
        self.set_phase(FlightPhase::Connected);
        Ok(())
    }

    /// Arms the vehicle. A rejected arm is retried once after a disarm and a
    /// settle pause; a second rejection is returned as is.
    pub async fn arm(&self) -> Result<(), AgentError> {
        let scope = self.scope(Operation::Arm)?;
        info!(agent = self.id(), "arming");

        if let Err(first) = self.link.arm().await {
            warn!(agent = self.id(), error = %first, "arm rejected, disarming before retry");
            if let Err(e) = self.link.disarm().await {
                warn!(agent = self.id(), error = %e, "disarm before retry failed");
            }
            scope.sleep(self.options.arm_settle).await?;
            self.link
                .arm()
                .await
                .map_err(|e| self.rejected(Operation::Arm, e))?;
            info!(agent = self.id(), "armed on retry");
        }

        self.cache.set_armed(true);
        self.set_phase(FlightPhase::Armed);
        Ok(())
    }

    /// Takes off, arming first when needed.
    pub async fn takeoff(&self) -> Result<(), AgentError> {
        self.scope(Operation::Takeoff)?;
        if !self.cache.armed() {
            self.arm().await?;
        }
        info!(agent = self.id(), "taking off");
        self.link
            .takeoff()
            .await
            .map_err(|e| self.rejected(Operation::Takeoff, e))?;
        self.cache.set_in_air(true);
        self.set_phase(FlightPhase::Airborne);
        Ok(())
    }

    /// Flies to `target` once the vehicle has a global position and a home.
    pub async fn goto_location(&self, target: GotoTarget, yaw_deg: f64) -> Result<(), AgentError> {
        let scope = self.scope(Operation::Goto)?;
        self.wait_navigation_ready(&scope).await?;

        let (latitude_deg, longitude_deg, absolute_altitude_m) = match target {
            GotoTarget::Global(p) => (p.latitude_deg, p.longitude_deg, p.altitude_m),
            GotoTarget::RelativeToHome {
                latitude_deg,
                longitude_deg,
                relative_altitude_m,
            } => {
                let home = self.home(&scope).await?;
                (
                    latitude_deg,
                    longitude_deg,
                    home.absolute_altitude_m + relative_altitude_m,
                )
            }
        };

        info!(
            agent = self.id(),
            lat = latitude_deg,
            lon = longitude_deg,
            alt = absolute_altitude_m,
            "going to location"
        );
        self.log_leg(&GeoPoint::new(latitude_deg, longitude_deg, absolute_altitude_m));
        self.link
            .goto_location(latitude_deg, longitude_deg, absolute_altitude_m, yaw_deg)
            .await
            .map_err(|e| self.rejected(Operation::Goto, e))
    }

    /// Starts an orbit with the front held towards the circle center.
    pub async fn orbit(&self, request: OrbitRequest) -> Result<(), AgentError> {
        let scope = self.scope(Operation::Orbit)?;
        self.wait_navigation_ready(&scope).await?;

        let position = scope.next(self.link.position(), "position").await?;
        let (latitude_deg, longitude_deg) = request
            .center
            .unwrap_or((position.latitude_deg, position.longitude_deg));
        let command = OrbitCommand {
            radius_m: request.radius_m,
            velocity_ms: request.velocity_ms,
            yaw_behavior: OrbitYawBehavior::HoldFrontToCircleCenter,
            latitude_deg,
            longitude_deg,
            absolute_altitude_m: position.absolute_altitude_m + request.relative_altitude_m,
        };

        info!(
            agent = self.id(),
            radius = command.radius_m,
            velocity = command.velocity_ms,
            alt = command.absolute_altitude_m,
            "orbiting"
        );
        self.link
            .do_orbit(command)
            .await
            .map_err(|e| self.rejected(Operation::Orbit, e))
    }

    /// Lands in place and waits for touchdown.
    pub async fn land(&self) -> Result<(), AgentError> {
        let scope = self.scope(Operation::Land)?;
        info!(agent = self.id(), "landing");
        self.link
            .land()
            .await
            .map_err(|e| self.rejected(Operation::Land, e))?;
        self.wait_touchdown(&scope).await
    }

    /// Returns to the launch point and waits for touchdown.
    pub async fn return_to_launch(&self) -> Result<(), AgentError> {
        let scope = self.scope(Operation::ReturnToLaunch)?;
        info!(agent = self.id(), "returning to launch");
        self.link
            .return_to_launch()
            .await
            .map_err(|e| self.rejected(Operation::ReturnToLaunch, e))?;
        self.wait_touchdown(&scope).await
    }

    pub async fn disarm(&self) -> Result<(), AgentError> {
        self.scope(Operation::Disarm)?;
        info!(agent = self.id(), "disarming");
        self.link
            .disarm()
            .await
            .map_err(|e| self.rejected(Operation::Disarm, e))?;
        self.cache.set_armed(false);
        self.cache.set_in_air(false);
        self.set_phase(FlightPhase::Disarmed);
        Ok(())
    }

    /// The home position, waiting for the first home report if none is cached.
    pub async fn wait_home_position(&self) -> Result<HomePosition, AgentError> {
        let scope = self.scope(Operation::WaitHome)?;
        self.home(&scope).await
    }

    /// Stops the observers and aborts pending waits. Idempotent.
    pub fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        if let Some(observers) = self.observers.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            observers.stop();
        }
        info!(agent = self.id(), "agent shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn scope(&self, operation: Operation) -> Result<WaitScope<'_>, AgentError> {
        if self.cancel.is_cancelled() {
            return Err(AgentError::Cancelled {
                agent_id: self.id(),
                operation,
            });
        }
        Ok(WaitScope {
            agent_id: self.id(),
            operation,
            timeout: self.options.wait_timeout,
            cancel: &self.cancel,
        })
    }

    async fn wait_navigation_ready(&self, scope: &WaitScope<'_>) -> Result<(), AgentError> {
        if self.cache.health().is_navigation_ready() {
            return Ok(());
        }
        debug!(agent = self.id(), "waiting for global position and home");
        scope
            .until(self.link.health(), "health", |h| h.is_navigation_ready())
            .await?;
        Ok(())
    }

    async fn home(&self, scope: &WaitScope<'_>) -> Result<HomePosition, AgentError> {
        if let Some(home) = self.cache.home() {
            return Ok(home);
        }
        let home = scope.next(self.link.home(), "home").await?;
        self.cache.set_home(home);
        Ok(home)
    }

    async fn wait_touchdown(&self, scope: &WaitScope<'_>) -> Result<(), AgentError> {
        self.set_phase(FlightPhase::Landing);
        scope
            .until(self.link.landed_state(), "landed_state", |s| s.is_on_ground())
            .await?;
        self.cache.set_in_air(false);
        self.set_phase(FlightPhase::Landed);
        Ok(())
    }

    fn log_leg(&self, target: &GeoPoint) {
        let Some(p) = self.cache.position() else {
            return;
        };
        let from = GeoPoint::new(p.latitude_deg, p.longitude_deg, p.absolute_altitude_m);
        if let (Ok(distance_m), Ok(bearing)) = (
            ground_distance_m(&from, target),
            bearing_deg(&from, target),
        ) {
            debug!(agent = self.id(), distance_m, bearing, "leg");
        }
    }

    fn start_observers(&self) {
        let mut slot = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(Observers::is_running) {
            return;
        }
        *slot = Some(Observers::start(self.id(), &self.link, &self.cache, &self.cancel));
    }

    fn observers_running(&self) -> bool {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(Observers::is_running)
    }

    fn set_phase(&self, next: FlightPhase) {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        let prev = *phase;
        if prev != next {
            *phase = next;
            info!(agent = self.id(), from = %prev, to = %next, "phase changed");
        }
    }

    fn rejected(&self, operation: Operation, source: ActionError) -> AgentError {
        warn!(agent = self.id(), op = %operation, error = %source, "command rejected");
        AgentError::Action {
            agent_id: self.id(),
            operation,
            source,
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
