//! In-memory simulated vehicle.
//!
//! Every telemetry value lives in a `tokio::sync::watch` channel, so each feed
//! subscription first yields the current value and then every change.
//! Commands are recorded in order and can be scripted to fail.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use flotilla_protocol::{
    ActionError, ActionResult, Endpoint, Health, HomePosition, LandedState, OrbitCommand,
    Position, StatusSeverity, StatusText,
};

use crate::{Feed, FlightLink, LinkError};

/// PX4 SITL default home.
pub const DEFAULT_HOME: HomePosition = HomePosition {
    latitude_deg: 47.397742,
    longitude_deg: 8.545594,
    absolute_altitude_m: 488.0,
};

/// Kind of a recorded command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Connect,
    Arm,
    Disarm,
    Takeoff,
    Land,
    ReturnToLaunch,
    Goto,
    Orbit,
}

/// A recorded command with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect(String),
    Arm,
    Disarm,
    Takeoff,
    Land,
    ReturnToLaunch,
    Goto {
        latitude_deg: f64,
        longitude_deg: f64,
        absolute_altitude_m: f64,
        yaw_deg: f64,
    },
    Orbit(OrbitCommand),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Connect(_) => CommandKind::Connect,
            Self::Arm => CommandKind::Arm,
            Self::Disarm => CommandKind::Disarm,
            Self::Takeoff => CommandKind::Takeoff,
            Self::Land => CommandKind::Land,
            Self::ReturnToLaunch => CommandKind::ReturnToLaunch,
            Self::Goto { .. } => CommandKind::Goto,
            Self::Orbit(_) => CommandKind::Orbit,
        }
    }
}

/// Behaviour knobs of the simulated vehicle.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub home: HomePosition,
    /// Delay between `connect` and the connection feed reporting `true`.
    pub connect_delay: Duration,
    /// Time spent in `Landing` before touching down.
    pub landing_delay: Duration,
    /// Height reached by `takeoff`.
    pub takeoff_altitude_m: f64,
    /// Whether the estimator reports a usable position from the start.
    pub healthy: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            home: DEFAULT_HOME,
            connect_delay: Duration::ZERO,
            landing_delay: Duration::from_millis(200),
            takeoff_altitude_m: 2.5,
            healthy: true,
        }
    }
}

struct SimState {
    config: SimConfig,
    log: Mutex<Vec<Command>>,
    failures: Mutex<HashMap<CommandKind, VecDeque<ActionError>>>,
    connect_failure: Mutex<Option<LinkError>>,
    connected: watch::Sender<bool>,
    armed: watch::Sender<bool>,
    in_air: watch::Sender<bool>,
    position: watch::Sender<Position>,
    home: watch::Sender<HomePosition>,
    landed: watch::Sender<LandedState>,
    health: watch::Sender<Health>,
    status: broadcast::Sender<StatusText>,
}

/// Simulated flight-control link.
#[derive(Clone)]
pub struct SimLink {
    state: Arc<SimState>,
}

impl Default for SimLink {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl SimLink {
    pub fn new(config: SimConfig) -> Self {
        let home = config.home;
        let health = Health {
            is_global_position_ok: config.healthy,
            is_home_position_ok: config.healthy,
            is_local_position_ok: config.healthy,
            is_armable: config.healthy,
        };
        let position = Position {
            latitude_deg: home.latitude_deg,
            longitude_deg: home.longitude_deg,
            absolute_altitude_m: home.absolute_altitude_m,
            relative_altitude_m: 0.0,
        };
        let (status, _) = broadcast::channel(64);
        Self {
            state: Arc::new(SimState {
                config,
                log: Mutex::new(Vec::new()),
                failures: Mutex::new(HashMap::new()),
                connect_failure: Mutex::new(None),
                connected: watch::channel(false).0,
                armed: watch::channel(false).0,
                in_air: watch::channel(false).0,
                position: watch::channel(position).0,
                home: watch::channel(home).0,
                landed: watch::channel(LandedState::OnGround).0,
                health: watch::channel(health).0,
                status,
            }),
        }
    }

    /// A vehicle whose home is `home`, otherwise default behaviour.
    pub fn at(home: HomePosition) -> Self {
        Self::new(SimConfig {
            home,
            ..SimConfig::default()
        })
    }

    /// Makes the next command of `kind` fail with `error`. Calls queue up.
    pub fn fail_next(&self, kind: CommandKind, error: ActionError) {
        if let Ok(mut f) = self.state.failures.lock() {
            f.entry(kind).or_default().push_back(error);
        }
    }

    /// Makes the next `connect` call fail at the transport level.
    pub fn fail_connect(&self, error: LinkError) {
        if let Ok(mut f) = self.state.connect_failure.lock() {
            *f = Some(error);
        }
    }

    /// All commands received so far, in order.
    pub fn commands(&self) -> Vec<Command> {
        self.state
            .log
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default()
    }

    /// Kinds of all commands received so far, in order.
    pub fn command_kinds(&self) -> Vec<CommandKind> {
        self.commands().iter().map(Command::kind).collect()
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.connected.send_replace(connected);
    }

    pub fn set_health(&self, health: Health) {
        self.state.health.send_replace(health);
    }

    pub fn set_position(&self, position: Position) {
        self.state.position.send_replace(position);
    }

    pub fn set_landed_state(&self, landed: LandedState) {
        self.state.landed.send_replace(landed);
    }

    pub fn push_status(&self, severity: StatusSeverity, text: impl Into<String>) {
        self.state.push_status(severity, text);
    }

    /// Current simulated position.
    pub fn current_position(&self) -> Position {
        *self.state.position.borrow()
    }

    pub fn is_armed(&self) -> bool {
        *self.state.armed.borrow()
    }

    pub fn is_in_air(&self) -> bool {
        *self.state.in_air.borrow()
    }

    fn record(&self, command: Command) -> Result<(), ActionError> {
        let kind = command.kind();
        debug!(?command, "sim command");
        if let Ok(mut log) = self.state.log.lock() {
            log.push(command);
        }
        let scripted = self
            .state
            .failures
            .lock()
            .ok()
            .and_then(|mut f| f.get_mut(&kind).and_then(VecDeque::pop_front));
        match scripted {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn require_connected(&self) -> Result<(), ActionError> {
        if *self.state.connected.borrow() {
            Ok(())
        } else {
            Err(ActionError::new(ActionResult::NoSystem, "vehicle not connected"))
        }
    }

    fn require_in_air(&self) -> Result<(), ActionError> {
        if *self.state.in_air.borrow() {
            Ok(())
        } else {
            Err(ActionError::new(ActionResult::CommandDenied, "vehicle is on the ground"))
        }
    }

    fn begin_descent(&self, to_home: bool) {
        if !*self.state.in_air.borrow() {
            self.state.landed.send_replace(LandedState::OnGround);
            return;
        }
        self.state.landed.send_replace(LandedState::Landing);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            tokio::time::sleep(state.config.landing_delay).await;
            state.touch_down(to_home);
        });
    }
}

impl SimState {
    fn push_status(&self, severity: StatusSeverity, text: impl Into<String>) {
        // No subscribers is fine.
        let _ = self.status.send(StatusText {
            severity,
            text: text.into(),
        });
    }

    fn touch_down(&self, to_home: bool) {
        let home = *self.home.borrow();
        self.position.send_modify(|p| {
            if to_home {
                p.latitude_deg = home.latitude_deg;
                p.longitude_deg = home.longitude_deg;
            }
            p.absolute_altitude_m = home.absolute_altitude_m;
            p.relative_altitude_m = 0.0;
        });
        self.in_air.send_replace(false);
        self.landed.send_replace(LandedState::OnGround);
        self.armed.send_replace(false);
        self.push_status(StatusSeverity::Info, "Landing detected");
        self.push_status(StatusSeverity::Info, "Disarmed by auto preflight disarming");
    }
}

fn watch_feed<T>(rx: watch::Receiver<T>) -> Feed<T>
where
    T: Clone + Send + Sync + 'static,
{
    Box::pin(stream::unfold((rx, true), |(mut rx, first)| async move {
        if !first {
            rx.changed().await.ok()?;
        }
        let value = rx.borrow_and_update().clone();
        Some((value, (rx, false)))
    }))
}

#[async_trait]
impl FlightLink for SimLink {
    async fn connect(&self, endpoint: &Endpoint) -> Result<(), LinkError> {
        if let Ok(mut log) = self.state.log.lock() {
            log.push(Command::Connect(endpoint.url()));
        }
        if let Some(err) = self.state.connect_failure.lock().ok().and_then(|mut f| f.take()) {
            return Err(err);
        }
        let delay = self.state.config.connect_delay;
        if delay.is_zero() {
            self.state.connected.send_replace(true);
        } else {
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                state.connected.send_replace(true);
            });
        }
        Ok(())
    }

    async fn arm(&self) -> Result<(), ActionError> {
        self.record(Command::Arm)?;
        self.require_connected()?;
        self.state.armed.send_replace(true);
        self.state.push_status(StatusSeverity::Info, "Armed by external command");
        Ok(())
    }

    async fn disarm(&self) -> Result<(), ActionError> {
        self.record(Command::Disarm)?;
        self.require_connected()?;
        if *self.state.in_air.borrow() {
            return Err(ActionError::new(
                ActionResult::CommandDeniedNotLanded,
                "cannot disarm in flight",
            ));
        }
        self.state.armed.send_replace(false);
        self.state.push_status(StatusSeverity::Info, "Disarmed by external command");
        Ok(())
    }

    async fn takeoff(&self) -> Result<(), ActionError> {
        self.record(Command::Takeoff)?;
        self.require_connected()?;
        if !*self.state.armed.borrow() {
            return Err(ActionError::new(ActionResult::CommandDenied, "vehicle not armed"));
        }
        let climb = self.state.config.takeoff_altitude_m;
        let home = *self.state.home.borrow();
        self.state.landed.send_replace(LandedState::TakingOff);
        self.state.position.send_modify(|p| {
            p.absolute_altitude_m = home.absolute_altitude_m + climb;
            p.relative_altitude_m = climb;
        });
        self.state.in_air.send_replace(true);
        self.state.landed.send_replace(LandedState::InAir);
        self.state.push_status(StatusSeverity::Info, "Takeoff detected");
        Ok(())
    }

    async fn land(&self) -> Result<(), ActionError> {
        self.record(Command::Land)?;
        self.require_connected()?;
        self.begin_descent(false);
        Ok(())
    }

    async fn return_to_launch(&self) -> Result<(), ActionError> {
        self.record(Command::ReturnToLaunch)?;
        self.require_connected()?;
        self.begin_descent(true);
        Ok(())
    }

    async fn goto_location(
        &self,
        latitude_deg: f64,
        longitude_deg: f64,
        absolute_altitude_m: f64,
        yaw_deg: f64,
    ) -> Result<(), ActionError> {
        self.record(Command::Goto {
            latitude_deg,
            longitude_deg,
            absolute_altitude_m,
            yaw_deg,
        })?;
        self.require_connected()?;
        self.require_in_air()?;
        let home = *self.state.home.borrow();
        self.state.position.send_replace(Position {
            latitude_deg,
            longitude_deg,
            absolute_altitude_m,
            relative_altitude_m: absolute_altitude_m - home.absolute_altitude_m,
        });
        Ok(())
    }

    async fn do_orbit(&self, command: OrbitCommand) -> Result<(), ActionError> {
        self.record(Command::Orbit(command))?;
        self.require_connected()?;
        self.require_in_air()?;
        let home = *self.state.home.borrow();
        self.state.position.send_modify(|p| {
            p.absolute_altitude_m = command.absolute_altitude_m;
            p.relative_altitude_m = command.absolute_altitude_m - home.absolute_altitude_m;
        });
        Ok(())
    }

    fn connection_state(&self) -> Feed<bool> {
        watch_feed(self.state.connected.subscribe())
    }

    fn armed(&self) -> Feed<bool> {
        watch_feed(self.state.armed.subscribe())
    }

    fn in_air(&self) -> Feed<bool> {
        watch_feed(self.state.in_air.subscribe())
    }

    fn position(&self) -> Feed<Position> {
        watch_feed(self.state.position.subscribe())
    }

    fn home(&self) -> Feed<HomePosition> {
        watch_feed(self.state.home.subscribe())
    }

    fn landed_state(&self) -> Feed<LandedState> {
        watch_feed(self.state.landed.subscribe())
    }

    fn health(&self) -> Feed<Health> {
        watch_feed(self.state.health.subscribe())
    }

    fn status_text(&self) -> Feed<StatusText> {
        let rx = self.state.status.subscribe();
        Box::pin(stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(status) => return Some((status, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        }))
    }
}
