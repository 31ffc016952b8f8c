//! Flight-control link seam.
//!
//! [`FlightLink`] is everything Flotilla needs from an external flight-control
//! client: a connect call, action commands that succeed or fail with an
//! [`ActionError`], and unbounded telemetry [`Feed`]s. Each call to a feed
//! method opens an independent subscription.
//!
//! With the `sim` feature, [`sim::SimLink`] provides an in-memory vehicle for
//! tests and dry runs.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use flotilla_protocol::{
    ActionError, Endpoint, Health, HomePosition, LandedState, OrbitCommand, Position, StatusText,
};

#[cfg(any(test, feature = "sim"))]
pub mod sim;

/// An unbounded sequence of telemetry updates.
pub type Feed<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Errors from the link transport itself (not command rejections).
#[derive(Debug, Clone, thiserror::Error)]
pub enum LinkError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid endpoint {0}")]
    InvalidEndpoint(String),
}

/// Command/telemetry surface of one vehicle.
#[async_trait]
pub trait FlightLink: Send + Sync {
    /// Starts connecting to `endpoint`. Completion is reported on
    /// [`connection_state`](Self::connection_state), not by this call.
    async fn connect(&self, endpoint: &Endpoint) -> Result<(), LinkError>;

    async fn arm(&self) -> Result<(), ActionError>;
    async fn disarm(&self) -> Result<(), ActionError>;
    async fn takeoff(&self) -> Result<(), ActionError>;
    async fn land(&self) -> Result<(), ActionError>;
    async fn return_to_launch(&self) -> Result<(), ActionError>;

    async fn goto_location(
        &self,
        latitude_deg: f64,
        longitude_deg: f64,
        absolute_altitude_m: f64,
        yaw_deg: f64,
    ) -> Result<(), ActionError>;

    async fn do_orbit(&self, command: OrbitCommand) -> Result<(), ActionError>;

    fn connection_state(&self) -> Feed<bool>;
    fn armed(&self) -> Feed<bool>;
    fn in_air(&self) -> Feed<bool>;
    fn position(&self) -> Feed<Position>;
    fn home(&self) -> Feed<HomePosition>;
    fn landed_state(&self) -> Feed<LandedState>;
    fn health(&self) -> Feed<Health>;
    fn status_text(&self) -> Feed<StatusText>;
}
