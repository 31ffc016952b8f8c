//! Copy-on-read telemetry snapshot.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use flotilla_protocol::{Health, HomePosition, LandedState, Position, StatusText};

/// Everything the cache knows about one vehicle.
///
/// Snapshots taken through [`TelemetryCache::snapshot`] hold the flag
/// invariants: `armed` is false while `connected` is false, and `in_air`
/// implies `armed`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub connected: bool,
    pub armed: bool,
    pub in_air: bool,
    pub position: Option<Position>,
    pub home: Option<HomePosition>,
    pub landed_state: LandedState,
    pub health: Health,
    pub last_status: Option<StatusText>,
    /// When any field was last written.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Shared, interior-mutable telemetry snapshot of one agent.
///
/// Cloning shares the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct TelemetryCache {
    inner: Arc<RwLock<TelemetrySnapshot>>,
}

impl TelemetryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the whole snapshot, with the flag invariants applied.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let mut snap = self.read().clone();
        snap.armed = effective_armed(&snap);
        snap.in_air = effective_in_air(&snap);
        snap
    }

    pub fn connected(&self) -> bool {
        self.read().connected
    }

    /// Last armed report, masked by the connection state.
    pub fn armed(&self) -> bool {
        effective_armed(&self.read())
    }

    /// Last in-air report, masked by the armed state.
    pub fn in_air(&self) -> bool {
        effective_in_air(&self.read())
    }

    pub fn position(&self) -> Option<Position> {
        self.read().position
    }

    pub fn home(&self) -> Option<HomePosition> {
        self.read().home
    }

    pub fn landed_state(&self) -> LandedState {
        self.read().landed_state
    }

    pub fn health(&self) -> Health {
        self.read().health
    }

    pub fn last_status(&self) -> Option<StatusText> {
        self.read().last_status.clone()
    }

    // Each setter writes only its own field, so observers of different
    // feeds never overwrite each other. The flag invariants are applied on
    // read.

    pub fn set_connected(&self, connected: bool) {
        self.write(|s| s.connected = connected);
    }

    pub fn set_armed(&self, armed: bool) {
        self.write(|s| s.armed = armed);
    }

    pub fn set_in_air(&self, in_air: bool) {
        self.write(|s| s.in_air = in_air);
    }

    pub fn set_position(&self, position: Position) {
        self.write(|s| s.position = Some(position));
    }

    pub fn set_home(&self, home: HomePosition) {
        self.write(|s| s.home = Some(home));
    }

    pub fn set_landed_state(&self, landed: LandedState) {
        self.write(|s| s.landed_state = landed);
    }

    pub fn set_health(&self, health: Health) {
        self.write(|s| s.health = health);
    }

    pub fn set_last_status(&self, status: StatusText) {
        self.write(|s| s.last_status = Some(status));
    }

    fn read(&self) -> RwLockReadGuard<'_, TelemetrySnapshot> {
        // Every write is a plain assignment, so a poisoned lock still holds
        // a consistent snapshot.
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, f: impl FnOnce(&mut TelemetrySnapshot)) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
        guard.updated_at = Some(Utc::now());
    }
}

fn effective_armed(s: &TelemetrySnapshot) -> bool {
    s.armed && s.connected
}

fn effective_in_air(s: &TelemetrySnapshot) -> bool {
    s.in_air && effective_armed(s)
}
