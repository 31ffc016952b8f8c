//! Formation planning: one waypoint per fleet member, in fleet order.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::GeoError;
use crate::transform::{GeoPoint, LocalPoint, Origin, to_global};

/// A target given either globally or in the fleet's local frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waypoint {
    Global(GeoPoint),
    Local(LocalPoint),
}

impl Waypoint {
    /// Resolves to a geodetic point. Local waypoints need the fleet origin.
    pub fn to_global(&self, origin: Option<&Origin>) -> Result<GeoPoint, GeoError> {
        match self {
            Self::Global(p) => Ok(*p),
            Self::Local(l) => to_global(l, origin.ok_or(GeoError::OriginNotSet)?),
        }
    }
}

fn default_heading() -> f64 {
    90.0
}

/// A named formation geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum FormationSpec {
    /// Members spaced along a heading (degrees clockwise from north).
    Line {
        anchor: Waypoint,
        spacing_m: f64,
        #[serde(default = "default_heading")]
        heading_deg: f64,
    },
    /// Row-major grid growing east then north.
    Grid {
        anchor: Waypoint,
        columns: u32,
        spacing_m: f64,
    },
    /// Members evenly spaced on a circle, starting east and turning north.
    Circle { center: Waypoint, radius_m: f64 },
}

/// East/north offsets of a line formation.
pub fn line_offsets(n: usize, spacing_m: f64, heading_deg: f64) -> Vec<(f64, f64)> {
    let (sin, cos) = heading_deg.to_radians().sin_cos();
    (0..n)
        .map(|i| {
            let d = i as f64 * spacing_m;
            (d * sin, d * cos)
        })
        .collect()
}

/// East/north offsets of a grid formation.
pub fn grid_offsets(n: usize, columns: u32, spacing_m: f64) -> Vec<(f64, f64)> {
    let columns = columns.max(1) as usize;
    (0..n)
        .map(|i| {
            let col = (i % columns) as f64;
            let row = (i / columns) as f64;
            (col * spacing_m, row * spacing_m)
        })
        .collect()
}

/// Slot `i` of `n` sits at angle `2π·i/n` around `center`.
pub fn circle_offsets(n: usize, radius_m: f64, center: LocalPoint) -> Vec<LocalPoint> {
    (0..n)
        .map(|i| {
            let angle = 2.0 * PI * i as f64 / n as f64;
            LocalPoint {
                x: center.x + radius_m * angle.cos(),
                y: center.y + radius_m * angle.sin(),
                z: center.z,
            }
        })
        .collect()
}

/// Expands `spec` into `n` waypoints.
///
/// Local anchors give local waypoints and global anchors give global ones,
/// except a circle around a local center, which is converted to global
/// waypoints through `origin`.
pub fn plan(
    spec: &FormationSpec,
    n: usize,
    origin: Option<&Origin>,
) -> Result<Vec<Waypoint>, GeoError> {
    validate(spec)?;
    if n == 0 {
        return Ok(Vec::new());
    }

    match spec {
        FormationSpec::Line {
            anchor,
            spacing_m,
            heading_deg,
        } => place(anchor, &line_offsets(n, *spacing_m, *heading_deg)),
        FormationSpec::Grid {
            anchor,
            columns,
            spacing_m,
        } => place(anchor, &grid_offsets(n, *columns, *spacing_m)),
        FormationSpec::Circle { center, radius_m } => match center {
            Waypoint::Local(c) => {
                let origin = origin.ok_or(GeoError::OriginNotSet)?;
                circle_offsets(n, *radius_m, *c)
                    .iter()
                    .map(|slot| to_global(slot, origin).map(Waypoint::Global))
                    .collect()
            }
            Waypoint::Global(c) => {
                let frame = Origin::from(*c);
                circle_offsets(n, *radius_m, LocalPoint::default())
                    .iter()
                    .map(|slot| to_global(slot, &frame).map(Waypoint::Global))
                    .collect()
            }
        },
    }
}

fn place(anchor: &Waypoint, offsets: &[(f64, f64)]) -> Result<Vec<Waypoint>, GeoError> {
    match anchor {
        Waypoint::Local(a) => Ok(offsets
            .iter()
            .map(|(east, north)| Waypoint::Local(LocalPoint::new(a.x + east, a.y + north, a.z)))
            .collect()),
        Waypoint::Global(a) => {
            let frame = Origin::from(*a);
            offsets
                .iter()
                .map(|(east, north)| {
                    to_global(&LocalPoint::new(*east, *north, 0.0), &frame).map(Waypoint::Global)
                })
                .collect()
        }
    }
}

fn validate(spec: &FormationSpec) -> Result<(), GeoError> {
    let positive = |name: &str, v: f64| {
        if v.is_finite() && v > 0.0 {
            Ok(())
        } else {
            Err(GeoError::InvalidFormation(format!(
                "{name} must be positive, got {v}"
            )))
        }
    };
    match spec {
        FormationSpec::Line {
            spacing_m,
            heading_deg,
            ..
        } => {
            positive("spacing", *spacing_m)?;
            if !heading_deg.is_finite() {
                return Err(GeoError::InvalidFormation("heading must be finite".into()));
            }
            Ok(())
        }
        FormationSpec::Grid {
            columns, spacing_m, ..
        } => {
            if *columns == 0 {
                return Err(GeoError::InvalidFormation("grid needs at least one column".into()));
            }
            positive("spacing", *spacing_m)
        }
        FormationSpec::Circle { radius_m, .. } => positive("radius", *radius_m),
    }
}
