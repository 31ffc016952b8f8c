//! Telemetry state for one Flotilla agent.
//!
//! A [`TelemetryCache`] holds the latest known flight state. [`Observers`]
//! spawn one task per telemetry feed that overwrites the matching cache field
//! on every update until cancelled. Readers copy values out and never wait on
//! a feed, so a stalled feed shows up as stale data rather than a blocked
//! caller.

mod cache;
mod observer;

pub use cache::{TelemetryCache, TelemetrySnapshot};
pub use observer::Observers;
