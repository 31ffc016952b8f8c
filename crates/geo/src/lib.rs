//! Coordinate geometry for Flotilla.
//!
//! Converts between geodetic coordinates and a local East-North-Up frame
//! anchored at an [`Origin`], and expands formation descriptions into one
//! waypoint per fleet member. Everything here is pure.
//!
//! The conversion is an equirectangular small-area approximation: it is good
//! to well under a centimetre for formation-scale offsets (tens to hundreds of
//! metres) and degrades with distance and towards the poles.

pub mod formation;
pub mod transform;

pub use formation::{FormationSpec, Waypoint, circle_offsets, grid_offsets, line_offsets, plan};
pub use transform::{
    EARTH_RADIUS_M, GeoPoint, LocalPoint, Origin, bearing_deg, ground_distance_m, to_global,
    to_local,
};

/// Errors for coordinate and formation operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeoError {
    #[error("degenerate origin at latitude {latitude_deg}° (longitude scale collapses)")]
    DegenerateOrigin { latitude_deg: f64 },

    #[error("latitude {latitude_deg}° is outside the local frame's domain")]
    OutOfDomain { latitude_deg: f64 },

    #[error("non-finite coordinate: {0}")]
    NonFinite(&'static str),

    #[error("invalid formation: {0}")]
    InvalidFormation(String),

    #[error("origin not set")]
    OriginNotSet,
}
