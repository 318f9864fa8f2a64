//! Property-based tests for the distance metric and facility ranking.
//!
//! Uses proptest for randomized coordinates and directories with shrinking.

use healthfinder_tui::geo::{haversine_km, Coordinates, EARTH_RADIUS_KM};
use healthfinder_tui::matcher::{find_nearest, MatchOutcome, MatchTier};
use healthfinder_tui::models::{EmergencyCategory, Facility, FacilityKind};
use proptest::prelude::*;

fn coordinates() -> impl Strategy<Value = Coordinates> {
    (-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(lat, lng)| Coordinates::new(lat, lng))
}

fn category() -> impl Strategy<Value = EmergencyCategory> {
    prop_oneof![
        Just(EmergencyCategory::Accident),
        Just(EmergencyCategory::Maternity),
        Just(EmergencyCategory::GeneralMedical),
    ]
}

/// Facilities with a mix of services and occasional missing coordinates.
fn directory() -> impl Strategy<Value = Vec<Facility>> {
    prop::collection::vec(
        (
            prop::option::weighted(0.8, coordinates()),
            prop_oneof![
                Just("Emergency Care"),
                Just("Maternity Ward"),
                Just("Dental"),
                Just("Pharmacy"),
            ],
        ),
        0..25,
    )
    .prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (coords, service))| Facility {
                id: format!("f{i}"),
                name: format!("Facility {i}"),
                address: String::new(),
                coordinates: coords,
                kind: FacilityKind::Clinic,
                services: vec![service.to_string()],
                phone: None,
                opening_hours: None,
                image_url: None,
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn distance_is_symmetric(a in coordinates(), b in coordinates()) {
        prop_assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-9);
    }

    #[test]
    fn distance_is_bounded_and_non_negative(a in coordinates(), b in coordinates()) {
        let d = haversine_km(a, b);
        prop_assert!(d >= 0.0);
        prop_assert!(d <= std::f64::consts::PI * EARTH_RADIUS_KM + 1e-6);
        prop_assert!(haversine_km(a, a) < 1e-9);
    }

    #[test]
    fn match_is_never_beaten_within_its_tier(
        location in coordinates(),
        category in category(),
        facilities in directory(),
    ) {
        let service = category.required_service();
        let mapped: Vec<&Facility> = facilities
            .iter()
            .filter(|f| f.valid_coordinates().is_some())
            .collect();
        let specialised: Vec<&Facility> = mapped
            .iter()
            .copied()
            .filter(|f| f.offers_service(service))
            .collect();

        match find_nearest(location, category, &facilities) {
            MatchOutcome::NotFound => prop_assert!(mapped.is_empty()),
            MatchOutcome::Found(m) => {
                let (pool, tier) = if specialised.is_empty() {
                    (&mapped, MatchTier::AnyFacility)
                } else {
                    (&specialised, MatchTier::Specialized)
                };
                prop_assert_eq!(m.tier, tier);
                prop_assert!(pool.iter().any(|f| f.id == m.facility.id));
                for other in pool.iter() {
                    let coords = other.valid_coordinates().unwrap();
                    prop_assert!(m.distance_km <= haversine_km(location, coords));
                }
            }
        }
    }
}
