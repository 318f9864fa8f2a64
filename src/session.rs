//! State machine behind the emergency dialog.
//!
//! ```text
//! Idle --open--> AwaitingCategory --select_category--> LocatingUser
//! LocatingUser --location known--> Resolved(match | NotFound)
//! LocatingUser --location error--> LocationFailed
//! any --close--> Idle
//! ```
//!
//! There is no retry from `Resolved` or `LocationFailed`; the user closes and
//! starts over. Every `open` and `close` advances the [`SessionToken`], so a
//! location result that arrives for an earlier activation is dropped.

use crate::geo::Coordinates;
use crate::location::{LocationError, LocationSource};
use crate::matcher::{find_nearest, FacilityMatch, MatchOutcome};
use crate::models::{EmergencyCategory, Facility};
use chrono::{DateTime, Local};
use tracing::{debug, info};

/// Identifies one dialog activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixOrigin {
    PersistedDefault,
    LiveDevice,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    AwaitingCategory,
    LocatingUser {
        category: EmergencyCategory,
    },
    Resolved {
        category: EmergencyCategory,
        location: Coordinates,
        origin: FixOrigin,
        outcome: MatchOutcome,
    },
    LocationFailed {
        category: EmergencyCategory,
        error: LocationError,
    },
}

/// Everything the dialog needs to draw one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogSnapshot {
    pub dialog_open: bool,
    pub confirmed: bool,
    pub category: Option<EmergencyCategory>,
    pub location_loading: bool,
    pub location_error: Option<LocationError>,
    pub location: Option<(Coordinates, FixOrigin)>,
    pub outcome: Option<MatchOutcome>,
    pub opened_at: Option<DateTime<Local>>,
}

impl DialogSnapshot {
    pub fn matched(&self) -> Option<&FacilityMatch> {
        match &self.outcome {
            Some(MatchOutcome::Found(m)) => Some(m),
            _ => None,
        }
    }

    pub fn matched_facility(&self) -> Option<&Facility> {
        self.matched().map(|m| &m.facility)
    }

    /// Location resolved but the directory had nothing usable.
    pub fn no_facility_found(&self) -> bool {
        matches!(self.outcome, Some(MatchOutcome::NotFound))
    }
}

#[derive(Debug)]
pub struct EmergencySession {
    state: SessionState,
    generation: u64,
    opened_at: Option<DateTime<Local>>,
}

impl Default for EmergencySession {
    fn default() -> Self {
        Self::new()
    }
}

impl EmergencySession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            generation: 0,
            opened_at: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn token(&self) -> SessionToken {
        SessionToken(self.generation)
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.state, SessionState::Idle)
    }

    /// Opens the dialog. Opening an already open dialog starts it over.
    pub fn open(&mut self) -> SessionToken {
        self.generation += 1;
        self.state = SessionState::AwaitingCategory;
        self.opened_at = Some(Local::now());
        info!("Emergency dialog opened (session {})", self.generation);
        self.token()
    }

    /// Records the category and moves to `LocatingUser`.
    ///
    /// Returns the token the caller must hand back to
    /// [`complete_location`](Self::complete_location), or `None` when the
    /// session is not waiting for a category.
    pub fn select_category(&mut self, category: EmergencyCategory) -> Option<SessionToken> {
        if self.state != SessionState::AwaitingCategory {
            debug!("Ignoring category selection in state {:?}", self.state);
            return None;
        }
        info!("Emergency category selected: {:?}", category);
        self.state = SessionState::LocatingUser { category };
        Some(self.token())
    }

    /// Applies a location result and, on success, runs the matcher.
    ///
    /// Returns `false` without touching state when `token` is stale or the
    /// session is no longer locating.
    pub fn complete_location(
        &mut self,
        token: SessionToken,
        source: LocationSource,
        directory: &[Facility],
    ) -> bool {
        if token != self.token() {
            debug!("Discarding location result for stale session {:?}", token);
            return false;
        }
        let SessionState::LocatingUser { category } = self.state else {
            debug!("Discarding location result in state {:?}", self.state);
            return false;
        };

        self.state = match source {
            LocationSource::PersistedDefault(location) => {
                Self::resolved(category, location, FixOrigin::PersistedDefault, directory)
            }
            LocationSource::LiveDevice(location) => {
                Self::resolved(category, location, FixOrigin::LiveDevice, directory)
            }
            LocationSource::Unavailable(error) => {
                info!("Emergency location failed: {}", error);
                SessionState::LocationFailed { category, error }
            }
        };
        true
    }

    fn resolved(
        category: EmergencyCategory,
        location: Coordinates,
        origin: FixOrigin,
        directory: &[Facility],
    ) -> SessionState {
        let outcome = find_nearest(location, category, directory);
        match &outcome {
            MatchOutcome::Found(m) => info!(
                "Nearest facility for {:?}: {} ({:.2} km, {:?})",
                category, m.facility.name, m.distance_km, m.tier
            ),
            MatchOutcome::NotFound => info!("No facility with coordinates for {:?}", category),
        }
        SessionState::Resolved {
            category,
            location,
            origin,
            outcome,
        }
    }

    /// Closes the dialog and forgets everything, including pending lookups.
    pub fn close(&mut self) {
        if self.is_open() {
            info!("Emergency dialog closed (session {})", self.generation);
        }
        self.generation += 1;
        self.state = SessionState::Idle;
        self.opened_at = None;
    }

    pub fn snapshot(&self) -> DialogSnapshot {
        let mut snap = DialogSnapshot {
            dialog_open: self.is_open(),
            confirmed: false,
            category: None,
            location_loading: false,
            location_error: None,
            location: None,
            outcome: None,
            opened_at: self.opened_at,
        };
        match &self.state {
            SessionState::Idle | SessionState::AwaitingCategory => {}
            SessionState::LocatingUser { category } => {
                snap.confirmed = true;
                snap.category = Some(*category);
                snap.location_loading = true;
            }
            SessionState::Resolved {
                category,
                location,
                origin,
                outcome,
            } => {
                snap.confirmed = true;
                snap.category = Some(*category);
                snap.location = Some((*location, *origin));
                snap.outcome = Some(outcome.clone());
            }
            SessionState::LocationFailed { category, error } => {
                snap.confirmed = true;
                snap.category = Some(*category);
                snap.location_error = Some(error.clone());
            }
        }
        snap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::MatchTier;
    use crate::models::FacilityKind;

    fn lagos_directory() -> Vec<Facility> {
        vec![Facility {
            id: "lag-001".into(),
            name: "Lagos Island General Hospital".into(),
            address: "Broad Street".into(),
            coordinates: Some(Coordinates::new(6.5244, 3.3792)),
            kind: FacilityKind::Hospital,
            services: vec!["Emergency Care".into()],
            phone: Some("+234 1 263 0720".into()),
            opening_hours: None,
            image_url: None,
        }]
    }

    #[test]
    fn starts_idle_and_closed() {
        let session = EmergencySession::new();
        let snap = session.snapshot();
        assert!(!snap.dialog_open);
        assert!(!snap.confirmed);
        assert!(snap.outcome.is_none());
    }

    #[test]
    fn full_flow_resolves_to_facility() {
        let directory = lagos_directory();
        let mut session = EmergencySession::new();
        session.open();
        assert_eq!(session.state(), &SessionState::AwaitingCategory);

        let token = session.select_category(EmergencyCategory::Accident).unwrap();
        let snap = session.snapshot();
        assert!(snap.confirmed && snap.location_loading);

        let here = LocationSource::LiveDevice(Coordinates::new(6.5, 3.4));
        assert!(session.complete_location(token, here, &directory));

        let snap = session.snapshot();
        assert!(!snap.location_loading);
        assert_eq!(snap.matched_facility().map(|f| f.id.as_str()), Some("lag-001"));
        assert_eq!(snap.matched().map(|m| m.tier), Some(MatchTier::Specialized));
        assert_eq!(snap.location.map(|(_, o)| o), Some(FixOrigin::LiveDevice));
    }

    #[test]
    fn location_error_is_terminal_and_preserved() {
        let mut session = EmergencySession::new();
        session.open();
        let token = session.select_category(EmergencyCategory::Maternity).unwrap();
        let err = LocationError::Timeout("no response within 10s".into());
        session.complete_location(token, LocationSource::Unavailable(err.clone()), &[]);

        let snap = session.snapshot();
        assert_eq!(snap.location_error, Some(err));
        assert!(snap.outcome.is_none());
        assert!(session.select_category(EmergencyCategory::Accident).is_none());
    }

    #[test]
    fn empty_directory_resolves_not_found_rather_than_failing() {
        let mut session = EmergencySession::new();
        session.open();
        let token = session.select_category(EmergencyCategory::GeneralMedical).unwrap();
        let home = LocationSource::PersistedDefault(Coordinates::new(6.5, 3.4));
        session.complete_location(token, home, &[]);

        assert!(matches!(
            session.state(),
            SessionState::Resolved {
                outcome: MatchOutcome::NotFound,
                ..
            }
        ));
        assert!(session.snapshot().no_facility_found());
    }

    #[test]
    fn late_result_after_close_is_discarded() {
        let directory = lagos_directory();
        let mut session = EmergencySession::new();
        session.open();
        let stale = session.select_category(EmergencyCategory::Accident).unwrap();
        session.close();
        session.open();

        let late = LocationSource::LiveDevice(Coordinates::new(6.5, 3.4));
        assert!(!session.complete_location(stale, late, &directory));
        assert_eq!(session.state(), &SessionState::AwaitingCategory);
    }

    #[test]
    fn second_completion_for_same_token_is_ignored() {
        let directory = lagos_directory();
        let mut session = EmergencySession::new();
        session.open();
        let token = session.select_category(EmergencyCategory::Accident).unwrap();
        let here = LocationSource::LiveDevice(Coordinates::new(6.5, 3.4));
        assert!(session.complete_location(token, here.clone(), &directory));
        assert!(!session.complete_location(token, here, &directory));
    }

    #[test]
    fn reopen_after_close_is_fresh() {
        let directory = lagos_directory();
        let mut session = EmergencySession::new();
        session.open();
        let token = session.select_category(EmergencyCategory::Accident).unwrap();
        session.complete_location(
            token,
            LocationSource::LiveDevice(Coordinates::new(6.5, 3.4)),
            &directory,
        );
        session.close();
        assert!(!session.snapshot().dialog_open);

        session.open();
        let snap = session.snapshot();
        assert!(snap.dialog_open);
        assert!(!snap.confirmed);
        assert!(snap.matched_facility().is_none());
        assert!(snap.opened_at.is_some());
    }

    #[test]
    fn category_selection_requires_open_dialog() {
        let mut session = EmergencySession::new();
        assert!(session.select_category(EmergencyCategory::Accident).is_none());
        assert_eq!(session.state(), &SessionState::Idle);
    }
}
