//! Property-based tests for the geofence calculations.

use presensi_core::geo::{distance_meters, is_within_radius};
use presensi_core::Coordinate;
use proptest::prelude::*;

prop_compose! {
    fn arbitrary_coordinate()(lat in -90.0f64..=90.0, lng in -180.0f64..=180.0) -> Coordinate {
        Coordinate::new(lat, lng)
    }
}

proptest! {
    #[test]
    fn distance_to_self_is_zero(a in arbitrary_coordinate()) {
        let d = distance_meters(a, a).unwrap();
        prop_assert!(d.abs() < 1e-6, "distance was {}", d);
    }

    #[test]
    fn distance_is_symmetric(a in arbitrary_coordinate(), b in arbitrary_coordinate()) {
        let ab = distance_meters(a, b).unwrap();
        let ba = distance_meters(b, a).unwrap();
        prop_assert!((ab - ba).abs() <= 1e-6 * ab.max(1.0), "{} vs {}", ab, ba);
    }

    #[test]
    fn distance_is_bounded_by_half_circumference(
        a in arbitrary_coordinate(),
        b in arbitrary_coordinate(),
    ) {
        let d = distance_meters(a, b).unwrap();
        prop_assert!(d >= 0.0);
        prop_assert!(d <= std::f64::consts::PI * 6_371_000.0 + 1e-6);
    }

    #[test]
    fn radius_check_is_monotonic(
        a in arbitrary_coordinate(),
        b in arbitrary_coordinate(),
        r in 0.0f64..25_000_000.0,
        extra in 0.0f64..1_000_000.0,
    ) {
        if is_within_radius(a, b, r).unwrap() {
            prop_assert!(is_within_radius(a, b, r + extra).unwrap());
        }
    }

    #[test]
    fn non_finite_latitude_is_rejected(b in arbitrary_coordinate()) {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            prop_assert!(distance_meters(Coordinate::new(bad, 0.0), b).is_err());
            prop_assert!(distance_meters(b, Coordinate::new(0.0, bad)).is_err());
        }
    }
}

#[test]
fn office_scenario_is_within_hundred_meters() {
    let office = Coordinate::new(-6.200000, 106.816666);
    let user = Coordinate::new(-6.200500, 106.816700);
    assert!(is_within_radius(user, office, 100.0).unwrap());
}
