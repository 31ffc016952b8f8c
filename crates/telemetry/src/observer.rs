//! Long-running feed observers that keep a [`TelemetryCache`] current.

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use flotilla_link::{Feed, FlightLink};
use flotilla_protocol::{StatusSeverity, StatusText};

use crate::cache::TelemetryCache;

/// The set of observer tasks feeding one agent's cache.
///
/// Each feed gets its own task and writes only its own field(s). Tasks stop
/// when the feed ends or [`stop`](Self::stop) is called.
pub struct Observers {
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Observers {
    /// Subscribes to every telemetry feed of `link` and starts one observer
    /// per feed. Cancelling `parent` stops them too.
    pub fn start(
        agent_id: u32,
        link: &Arc<dyn FlightLink>,
        cache: &TelemetryCache,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let mut handles = Vec::with_capacity(8);

        let c = cache.clone();
        handles.push(spawn_observer(agent_id, "connection", link.connection_state(), &cancel, move |v| {
            c.set_connected(v)
        }));
        let c = cache.clone();
        handles.push(spawn_observer(agent_id, "armed", link.armed(), &cancel, move |v| {
            c.set_armed(v)
        }));
        let c = cache.clone();
        handles.push(spawn_observer(agent_id, "in_air", link.in_air(), &cancel, move |v| {
            c.set_in_air(v)
        }));
        let c = cache.clone();
        handles.push(spawn_observer(agent_id, "position", link.position(), &cancel, move |v| {
            c.set_position(v)
        }));
        let c = cache.clone();
        handles.push(spawn_observer(agent_id, "home", link.home(), &cancel, move |v| {
            c.set_home(v)
        }));
        let c = cache.clone();
        handles.push(spawn_observer(agent_id, "landed_state", link.landed_state(), &cancel, move |v| {
            c.set_landed_state(v)
        }));
        let c = cache.clone();
        handles.push(spawn_observer(agent_id, "health", link.health(), &cancel, move |v| {
            c.set_health(v)
        }));
        let c = cache.clone();
        handles.push(spawn_observer(agent_id, "status_text", link.status_text(), &cancel, move |v| {
            log_status(agent_id, &v);
            c.set_last_status(v)
        }));

        info!(agent = agent_id, "telemetry observers started");
        Self {
            cancel,
            handles: Mutex::new(handles),
        }
    }

    /// Stops all observers. Safe to call repeatedly.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
            debug!("telemetry observers stopped");
        }
    }

    /// Returns `true` while at least one observer task is alive.
    pub fn is_running(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.handles
            .lock()
            .map(|h| h.iter().any(|t| !t.is_finished()))
            .unwrap_or(false)
    }

}

impl Drop for Observers {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Runs `apply` on every item of `feed` until it ends or `cancel` fires.
fn spawn_observer<T, F>(
    agent_id: u32,
    name: &'static str,
    mut feed: Feed<T>,
    cancel: &CancellationToken,
    apply: F,
) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Fn(T) + Send + 'static,
{
    let cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                item = feed.next() => match item {
                    Some(value) => {
                        trace!(agent = agent_id, feed = name, "telemetry update");
                        apply(value);
                    }
                    None => {
                        debug!(agent = agent_id, feed = name, "telemetry feed ended");
                        break;
                    }
                },
            }
        }
    })
}

fn log_status(agent_id: u32, status: &StatusText) {
    let text = status.text.as_str();
    match status.severity {
        StatusSeverity::Emergency
        | StatusSeverity::Alert
        | StatusSeverity::Critical
        | StatusSeverity::Error => error!(agent = agent_id, "{text}"),
        StatusSeverity::Warning => warn!(agent = agent_id, "{text}"),
        StatusSeverity::Notice | StatusSeverity::Info => info!(agent = agent_id, "{text}"),
        StatusSeverity::Debug => debug!(agent = agent_id, "{text}"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use flotilla_link::sim::SimLink;
    use flotilla_protocol::{Endpoint, LandedState, LinkKind, Position};
    use futures_util::stream;

    async fn eventually(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !check() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition not reached");
    }

    fn endpoint() -> Endpoint {
        Endpoint {
            kind: LinkKind::Udp,
            host: String::new(),
            port: 14541,
        }
    }

    #[tokio::test]
    async fn observer_applies_every_item_in_order() {
        let cache = TelemetryCache::new();
        let cancel = CancellationToken::new();
        let feed: Feed<Position> = Box::pin(stream::iter(vec![
            Position {
                latitude_deg: 1.0,
                ..Position::default()
            },
            Position {
                latitude_deg: 2.0,
                ..Position::default()
            },
        ]));
        let c = cache.clone();
        let handle = spawn_observer(1, "position", feed, &cancel, move |p| c.set_position(p));
        handle.await.unwrap();
        assert_eq!(cache.position().map(|p| p.latitude_deg), Some(2.0));
    }

    /// Feed that yields each value after its delay.
    fn timed<T: Send + 'static>(items: Vec<(u64, T)>) -> Feed<T> {
        Box::pin(stream::iter(items).then(|(delay, value)| async move {
            tokio::time::sleep(Duration::from_secs(delay)).await;
            value
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn late_flight_report_keeps_connection_lost() {
        let cache = TelemetryCache::new();
        let cancel = CancellationToken::new();

        let c = cache.clone();
        let connection = spawn_observer(
            1,
            "connection",
            timed(vec![(0, true), (1, false)]),
            &cancel,
            move |v| c.set_connected(v),
        );
        let c = cache.clone();
        let armed = spawn_observer(1, "armed", timed(vec![(2, true)]), &cancel, move |v| {
            c.set_armed(v)
        });
        let c = cache.clone();
        let in_air = spawn_observer(1, "in_air", timed(vec![(2, true)]), &cancel, move |v| {
            c.set_in_air(v)
        });
        for handle in [connection, armed, in_air] {
            handle.await.unwrap();
        }

        let snap = cache.snapshot();
        assert!(!snap.connected);
        assert!(!snap.armed && !snap.in_air);
        assert!(!cache.connected());
    }

    #[tokio::test]
    async fn observer_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let feed: Feed<bool> = Box::pin(stream::pending());
        let handle = spawn_observer(1, "armed", feed, &cancel, |_| {});
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn observers_track_sim_link() {
        let sim = SimLink::default();
        let link: Arc<dyn FlightLink> = Arc::new(sim.clone());
        let cache = TelemetryCache::new();
        let parent = CancellationToken::new();
        let observers = Observers::start(7, &link, &cache, &parent);
        assert!(observers.is_running());

        link.connect(&endpoint()).await.unwrap();
        eventually(|| cache.connected()).await;
        eventually(|| cache.home().is_some()).await;

        let target = Position {
            latitude_deg: 47.5,
            longitude_deg: 8.6,
            absolute_altitude_m: 500.0,
            relative_altitude_m: 12.0,
        };
        sim.set_position(target);
        eventually(|| cache.position() == Some(target)).await;
        // No further updates: the value stays put.
        tokio::task::yield_now().await;
        assert_eq!(cache.position(), Some(target));

        sim.set_landed_state(LandedState::Landing);
        eventually(|| cache.landed_state() == LandedState::Landing).await;

        sim.push_status(StatusSeverity::Warning, "Low battery");
        eventually(|| cache.last_status().is_some()).await;
        assert_eq!(cache.last_status().unwrap().text, "Low battery");

        observers.stop();
        assert!(!observers.is_running());
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_parent_cancels() {
        let link: Arc<dyn FlightLink> = Arc::new(SimLink::default());
        let cache = TelemetryCache::new();
        let parent = CancellationToken::new();
        let observers = Observers::start(1, &link, &cache, &parent);
        parent.cancel();
        assert!(!observers.is_running());
        observers.stop();
        observers.stop();
        assert!(!observers.is_running());
    }
}
