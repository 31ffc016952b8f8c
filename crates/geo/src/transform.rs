//! Geodetic ↔ local East-North-Up conversion.

use serde::{Deserialize, Serialize};

use crate::GeoError;

/// Earth radius used by the local frame (WGS-84 equatorial radius).
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Latitudes closer than this to a pole collapse the longitude scale.
const MIN_POLE_DISTANCE_DEG: f64 = 1e-4;

/// A geodetic position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    /// Altitude in metres (AMSL unless stated otherwise by the caller).
    pub altitude_m: f64,
}

impl GeoPoint {
    pub fn new(latitude_deg: f64, longitude_deg: f64, altitude_m: f64) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
            altitude_m,
        }
    }

    fn check_finite(&self) -> Result<(), GeoError> {
        if !self.latitude_deg.is_finite() {
            return Err(GeoError::NonFinite("latitude"));
        }
        if !self.longitude_deg.is_finite() {
            return Err(GeoError::NonFinite("longitude"));
        }
        if !self.altitude_m.is_finite() {
            return Err(GeoError::NonFinite("altitude"));
        }
        Ok(())
    }
}

/// A position in the local frame: `x` east, `y` north, `z` up, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct LocalPoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl LocalPoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Horizontal distance from the frame origin.
    pub fn horizontal_norm(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

/// Anchor of a local frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_m: f64,
}

impl Origin {
    /// Builds a validated origin.
    pub fn new(latitude_deg: f64, longitude_deg: f64, altitude_m: f64) -> Result<Self, GeoError> {
        let origin = Self {
            latitude_deg,
            longitude_deg,
            altitude_m,
        };
        origin.validate()?;
        Ok(origin)
    }

    /// Checks that the origin can anchor a local frame.
    pub fn validate(&self) -> Result<(), GeoError> {
        self.as_point().check_finite()?;
        if 90.0 - self.latitude_deg.abs() < MIN_POLE_DISTANCE_DEG {
            return Err(GeoError::DegenerateOrigin {
                latitude_deg: self.latitude_deg,
            });
        }
        Ok(())
    }

    pub fn as_point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude_deg, self.longitude_deg, self.altitude_m)
    }
}

impl From<GeoPoint> for Origin {
    fn from(p: GeoPoint) -> Self {
        Self {
            latitude_deg: p.latitude_deg,
            longitude_deg: p.longitude_deg,
            altitude_m: p.altitude_m,
        }
    }
}

/// Converts a geodetic point into the local frame anchored at `origin`.
///
/// `x = R·Δlon·cos((lat₁+lat₂)/2)`, `y = R·Δlat`, `z = alt − origin.alt`.
pub fn to_local(point: &GeoPoint, origin: &Origin) -> Result<LocalPoint, GeoError> {
    origin.validate()?;
    point.check_finite()?;
    if point.latitude_deg.abs() > 90.0 {
        return Err(GeoError::OutOfDomain {
            latitude_deg: point.latitude_deg,
        });
    }

    let d_lat = (point.latitude_deg - origin.latitude_deg).to_radians();
    let d_lon = wrap_degrees(point.longitude_deg - origin.longitude_deg).to_radians();
    let scale = longitude_scale(origin.latitude_deg, point.latitude_deg)?;

    finite_local(LocalPoint {
        x: EARTH_RADIUS_M * d_lon * scale,
        y: EARTH_RADIUS_M * d_lat,
        z: point.altitude_m - origin.altitude_m,
    })
}

/// Converts a local-frame point back to geodetic coordinates.
///
/// Exact inverse of [`to_local`]: the longitude scale uses the mean of the
/// origin latitude and the recovered latitude, which equals `cos(origin.lat)`
/// for points on the origin's parallel.
pub fn to_global(local: &LocalPoint, origin: &Origin) -> Result<GeoPoint, GeoError> {
    origin.validate()?;
    if !(local.x.is_finite() && local.y.is_finite() && local.z.is_finite()) {
        return Err(GeoError::NonFinite("local offset"));
    }

    let latitude_deg = origin.latitude_deg + (local.y / EARTH_RADIUS_M).to_degrees();
    if latitude_deg.abs() > 90.0 {
        return Err(GeoError::OutOfDomain { latitude_deg });
    }
    let scale = longitude_scale(origin.latitude_deg, latitude_deg)?;
    let d_lon = local.x / (EARTH_RADIUS_M * scale);

    let point = GeoPoint {
        latitude_deg,
        longitude_deg: wrap_degrees(origin.longitude_deg + d_lon.to_degrees()),
        altitude_m: origin.altitude_m + local.z,
    };
    point.check_finite()?;
    Ok(point)
}

/// Horizontal distance between two points, measured in the local frame of `a`.
pub fn ground_distance_m(a: &GeoPoint, b: &GeoPoint) -> Result<f64, GeoError> {
    let local = to_local(b, &Origin::from(*a))?;
    Ok(local.horizontal_norm())
}

/// Initial bearing from `a` to `b` in degrees clockwise from north, `[0, 360)`.
pub fn bearing_deg(a: &GeoPoint, b: &GeoPoint) -> Result<f64, GeoError> {
    let local = to_local(b, &Origin::from(*a))?;
    Ok(local.x.atan2(local.y).to_degrees().rem_euclid(360.0))
}

/// `cos` of the mean of the origin latitude and `latitude_deg`.
fn longitude_scale(origin_deg: f64, latitude_deg: f64) -> Result<f64, GeoError> {
    let mean_deg = (origin_deg + latitude_deg) / 2.0;
    if 90.0 - mean_deg.abs() < MIN_POLE_DISTANCE_DEG {
        return Err(GeoError::OutOfDomain { latitude_deg });
    }
    Ok(mean_deg.to_radians().cos())
}

fn finite_local(p: LocalPoint) -> Result<LocalPoint, GeoError> {
    if p.x.is_finite() && p.y.is_finite() && p.z.is_finite() {
        Ok(p)
    } else {
        Err(GeoError::NonFinite("local offset"))
    }
}

/// Wraps an angle in degrees into `[-180, 180)`.
fn wrap_degrees(deg: f64) -> f64 {
    (deg + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const METRES_PER_DEG: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

    fn zurich() -> Origin {
        Origin::new(47.397606, 8.543060, 488.0).unwrap()
    }

    fn error_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
        let north = (a.latitude_deg - b.latitude_deg) * METRES_PER_DEG;
        let east = wrap_degrees(a.longitude_deg - b.longitude_deg)
            * METRES_PER_DEG
            * a.latitude_deg.to_radians().cos();
        let up = a.altitude_m - b.altitude_m;
        (north * north + east * east + up * up).sqrt()
    }

    #[test]
    fn origin_maps_to_zero() {
        let o = zurich();
        let local = to_local(&o.as_point(), &o).unwrap();
        assert_eq!(local, LocalPoint::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn north_offset_is_y() {
        let o = zurich();
        let p = GeoPoint::new(o.latitude_deg + 0.001, o.longitude_deg, 508.0);
        let local = to_local(&p, &o).unwrap();
        assert!(local.x.abs() < 1e-9);
        assert!((local.y - 0.001 * METRES_PER_DEG).abs() < 1e-6);
        assert!((local.z - 20.0).abs() < 1e-9);
    }

    #[test]
    fn east_offset_scaled_by_latitude() {
        let o = zurich();
        let local = LocalPoint::new(100.0, 0.0, 0.0);
        let p = to_global(&local, &o).unwrap();
        let expected = 100.0 / (EARTH_RADIUS_M * o.latitude_deg.to_radians().cos());
        assert!((p.longitude_deg - o.longitude_deg - expected.to_degrees()).abs() < 1e-12);
        assert_eq!(p.latitude_deg, o.latitude_deg);
    }

    #[test]
    fn round_trip_within_a_centimetre() {
        for lat in (-79..=79).step_by(8) {
            for lon in [-170.0, -33.3, 0.0, 8.54306, 120.5] {
                let origin = Origin::new(lat as f64 + 0.123, lon, 100.0).unwrap();
                let scale = origin.latitude_deg.to_radians().cos();
                for (dn, de) in [(0.03, 0.03), (-0.03, 0.01), (0.0, -0.02), (0.02, 0.0)] {
                    let p = GeoPoint::new(
                        origin.latitude_deg + dn,
                        origin.longitude_deg + de / scale,
                        100.0 + dn * 1000.0,
                    );
                    let local = to_local(&p, &origin).unwrap();
                    assert!(local.horizontal_norm() < 5_000.0, "{local:?}");
                    let back = to_global(&local, &origin).unwrap();
                    let err = error_m(&p, &back);
                    assert!(err < 0.01, "lat {lat} lon {lon}: error {err} m");
                }
            }
        }
    }

    #[test]
    fn local_round_trip() {
        let o = zurich();
        let local = LocalPoint::new(-10.0, 35.5, 20.0);
        let back = to_local(&to_global(&local, &o).unwrap(), &o).unwrap();
        assert!((back.x - local.x).abs() < 1e-6);
        assert!((back.y - local.y).abs() < 1e-6);
        assert!((back.z - local.z).abs() < 1e-9);
    }

    #[test]
    fn crossing_the_antimeridian() {
        let o = Origin::new(-16.5, 179.9995, 0.0).unwrap();
        let p = GeoPoint::new(-16.5, -179.9995, 0.0);
        let local = to_local(&p, &o).unwrap();
        assert!(local.x > 0.0 && local.x < 200.0, "{local:?}");
        let back = to_global(&local, &o).unwrap();
        assert!(error_m(&p, &back) < 0.01);
    }

    #[test]
    fn polar_origin_is_rejected() {
        for lat in [90.0, -90.0, 89.99999, -89.99991, 89.99991, 91.0] {
            let origin = Origin {
                latitude_deg: lat,
                longitude_deg: 0.0,
                altitude_m: 0.0,
            };
            let p = GeoPoint::new(lat.signum() * 89.9, 0.0, 0.0);
            assert!(matches!(
                to_local(&p, &origin),
                Err(GeoError::DegenerateOrigin { .. })
            ));
            assert!(matches!(
                to_global(&LocalPoint::new(10.0, 0.0, 0.0), &origin),
                Err(GeoError::DegenerateOrigin { .. })
            ));
            assert!(Origin::new(lat, 0.0, 0.0).is_err());
        }
    }

    #[test]
    fn origin_just_outside_the_polar_cap_is_usable() {
        let o = Origin::new(89.9998, 0.0, 0.0).unwrap();
        let p = to_global(&LocalPoint::new(1.0, 0.0, 0.0), &o).unwrap();
        assert!(p.longitude_deg > 0.0 && p.longitude_deg < 5.0, "{p:?}");
    }

    #[test]
    fn offset_past_the_pole_is_out_of_domain() {
        let o = Origin::new(89.99, 0.0, 0.0).unwrap();
        let err = to_global(&LocalPoint::new(0.0, 5_000.0, 0.0), &o).unwrap_err();
        assert!(matches!(err, GeoError::OutOfDomain { .. }));
    }

    #[test]
    fn non_finite_input_is_rejected() {
        let o = zurich();
        let p = GeoPoint::new(f64::NAN, 8.5, 0.0);
        assert_eq!(to_local(&p, &o), Err(GeoError::NonFinite("latitude")));
        let local = LocalPoint::new(f64::INFINITY, 0.0, 0.0);
        assert_eq!(to_global(&local, &o), Err(GeoError::NonFinite("local offset")));
    }

    #[test]
    fn ground_distance_between_formation_slots() {
        let a = GeoPoint::new(47.397606, 8.543060, 20.0);
        let b = to_global(&LocalPoint::new(30.0, 40.0, 5.0), &Origin::from(a)).unwrap();
        let d = ground_distance_m(&a, &b).unwrap();
        assert!((d - 50.0).abs() < 1e-6);
    }

    #[test]
    fn bearing_points_clockwise_from_north() {
        let a = GeoPoint::new(47.397606, 8.543060, 0.0);
        let o = Origin::from(a);
        let east = to_global(&LocalPoint::new(25.0, 0.0, 0.0), &o).unwrap();
        let south = to_global(&LocalPoint::new(0.0, -25.0, 0.0), &o).unwrap();
        assert!((bearing_deg(&a, &east).unwrap() - 90.0).abs() < 1e-6);
        assert!((bearing_deg(&a, &south).unwrap() - 180.0).abs() < 1e-6);
    }
}
