//! crates/presensi_core/src/geo.rs
//!
//! Great-circle distance and geofence checks. Pure functions, no I/O.

use crate::domain::Coordinate;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Radius applied when no office radius is configured.
pub const DEFAULT_RADIUS_METERS: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("Invalid coordinate: lat={lat}, lng={lng}")]
pub struct InvalidCoordinate {
    pub lat: f64,
    pub lng: f64,
}

fn check(c: Coordinate) -> Result<Coordinate, InvalidCoordinate> {
    if c.is_finite() {
        Ok(c)
    } else {
        Err(InvalidCoordinate { lat: c.lat, lng: c.lng })
    }
}

/// Haversine distance in meters between `a` and `b`.
///
/// Rejects non-finite components instead of returning `NaN`.
pub fn distance_meters(a: Coordinate, b: Coordinate) -> Result<f64, InvalidCoordinate> {
    let a = check(a)?;
    let b = check(b)?;

    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `h` a hair past 1 for antipodal points.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    Ok(EARTH_RADIUS_METERS * c)
}

/// True iff `user` lies within `radius_meters` of `office` (boundary inclusive).
pub fn is_within_radius(
    user: Coordinate,
    office: Coordinate,
    radius_meters: f64,
) -> Result<bool, InvalidCoordinate> {
    Ok(distance_meters(user, office)? <= radius_meters)
}

/// A fixed office location and the radius around it that counts as on site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geofence {
    pub office: Coordinate,
    pub radius_meters: f64,
}

impl Geofence {
    pub fn new(office: Coordinate) -> Self {
        Self {
            office,
            radius_meters: DEFAULT_RADIUS_METERS,
        }
    }

    pub fn with_radius(mut self, radius_meters: f64) -> Self {
        self.radius_meters = radius_meters;
        self
    }

    /// Distance from the office, or the coordinate error.
    pub fn distance_from_office(&self, user: Coordinate) -> Result<f64, InvalidCoordinate> {
        distance_meters(user, self.office)
    }

    pub fn contains(&self, user: Coordinate) -> Result<bool, InvalidCoordinate> {
        is_within_radius(user, self.office, self.radius_meters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFICE: Coordinate = Coordinate { lat: -6.200000, lng: 106.816666 };

    #[test]
    fn nearby_check_in_is_inside_default_radius() {
        let user = Coordinate::new(-6.200500, 106.816700);
        let d = distance_meters(user, OFFICE).unwrap();
        assert!((d - 55.7).abs() < 1.0, "distance was {d}");
        assert!(is_within_radius(user, OFFICE, DEFAULT_RADIUS_METERS).unwrap());
        assert!(!is_within_radius(user, OFFICE, 50.0).unwrap());
    }

    #[test]
    fn one_degree_of_latitude() {
        let d = distance_meters(Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 0.0)).unwrap();
        assert!((d - 111_194.9).abs() < 1.0, "distance was {d}");
    }

    #[test]
    fn antipodal_points_do_not_produce_nan() {
        let d = distance_meters(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 180.0)).unwrap();
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_METERS).abs() < 1e-3);
    }

    #[test]
    fn non_finite_input_is_rejected() {
        let err = distance_meters(Coordinate::new(f64::NAN, 0.0), OFFICE).unwrap_err();
        assert!(err.lat.is_nan());
        assert!(is_within_radius(OFFICE, Coordinate::new(0.0, f64::INFINITY), 100.0).is_err());
    }

    #[test]
    fn boundary_is_inclusive() {
        let user = Coordinate::new(-6.200500, 106.816700);
        let d = distance_meters(user, OFFICE).unwrap();
        let fence = Geofence::new(OFFICE).with_radius(d);
        assert!(fence.contains(user).unwrap());
    }
}
