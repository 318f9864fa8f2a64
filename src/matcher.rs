//! Nearest-facility selection for an emergency category.
//!
//! Two tiers: facilities advertising the category's required service first,
//! then the whole directory. Only facilities with valid coordinates are ever
//! ranked. Running out of candidates is a result ([`MatchOutcome::NotFound`]),
//! not an error.

use crate::geo::{haversine_km, Coordinates};
use crate::models::{EmergencyCategory, Facility};
use tracing::{debug, warn};

/// Which tier produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    /// The facility advertises the category's required service.
    Specialized,
    /// No specialised facility was usable; nearest facility of any type.
    AnyFacility,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FacilityMatch {
    pub facility: Facility,
    pub distance_km: f64,
    pub tier: MatchTier,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Found(FacilityMatch),
    NotFound,
}

impl MatchOutcome {
    pub fn facility(&self) -> Option<&Facility> {
        match self {
            MatchOutcome::Found(m) => Some(&m.facility),
            MatchOutcome::NotFound => None,
        }
    }
}

/// Finds the facility best suited to `category` nearest to `location`.
///
/// Ties keep the facility seen first in `directory` order.
pub fn find_nearest(
    location: Coordinates,
    category: EmergencyCategory,
    directory: &[Facility],
) -> MatchOutcome {
    let service = category.required_service();

    let specialized = closest(
        location,
        directory.iter().filter(|f| f.offers_service(service)),
    );
    if let Some((facility, distance_km)) = specialized {
        debug!("Matched '{}' offering '{}' at {:.2} km", facility.name, service, distance_km);
        return MatchOutcome::Found(FacilityMatch {
            facility: facility.clone(),
            distance_km,
            tier: MatchTier::Specialized,
        });
    }

    warn!(
        "No facilities found with service \"{}\". Falling back to nearest facility of any type.",
        service
    );
    match closest(location, directory.iter()) {
        Some((facility, distance_km)) => MatchOutcome::Found(FacilityMatch {
            facility: facility.clone(),
            distance_km,
            tier: MatchTier::AnyFacility,
        }),
        None => MatchOutcome::NotFound,
    }
}

// Single pass; strict `<` keeps the earliest of equidistant candidates.
fn closest<'a>(
    location: Coordinates,
    candidates: impl Iterator<Item = &'a Facility>,
) -> Option<(&'a Facility, f64)> {
    let mut best: Option<(&Facility, f64)> = None;
    for facility in candidates {
        let Some(coords) = facility.valid_coordinates() else {
            continue;
        };
        let distance = haversine_km(location, coords);
        if distance.is_nan() {
            continue;
        }
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((facility, distance)),
        }
    }
    best
}
