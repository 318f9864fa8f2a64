//! SQLite-backed preferences.
//!
//! A single key/value table. The emergency flow only reads the saved default
//! location; the settings view is the only writer.

use crate::geo::Coordinates;
use crate::location::SavedLocationStore;
use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{info, warn};

pub const SAVED_LOCATION_KEY: &str = "saved_location";
pub const SAVED_LOCATION_ADDRESS_KEY: &str = "saved_location_address";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Preference database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The saved default location together with its display metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedLocation {
    pub coordinates: Coordinates,
    pub address: Option<String>,
    pub updated_at: Option<DateTime<Local>>,
}

pub struct PreferenceDb {
    conn: Mutex<Connection>,
}

impl PreferenceDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        info!("Opened preference database at {}", path.as_ref().display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves SQLite itself consistent.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT value FROM preferences WHERE key = ?",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?)
    }

    fn get_with_timestamp(
        &self,
        key: &str,
    ) -> Result<Option<(String, Option<String>)>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT value, updated_at FROM preferences WHERE key = ?",
                [key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT OR REPLACE INTO preferences (key, value, updated_at) VALUES (?, ?, ?)",
            params![key, value, Local::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.conn()
            .execute("DELETE FROM preferences WHERE key = ?", [key])?;
        Ok(())
    }

    /// Pins `coordinates` as the emergency default location.
    pub fn save_location(
        &self,
        coordinates: Coordinates,
        address: Option<&str>,
    ) -> Result<(), StoreError> {
        self.set(SAVED_LOCATION_KEY, &serde_json::to_string(&coordinates)?)?;
        match address {
            Some(address) => self.set(SAVED_LOCATION_ADDRESS_KEY, address)?,
            None => self.remove(SAVED_LOCATION_ADDRESS_KEY)?,
        }
        info!("Saved default location {}", coordinates);
        Ok(())
    }

    pub fn clear_saved_location(&self) -> Result<(), StoreError> {
        self.remove(SAVED_LOCATION_KEY)?;
        self.remove(SAVED_LOCATION_ADDRESS_KEY)?;
        info!("Cleared default location");
        Ok(())
    }

    /// Saved location with address and timestamp, for the settings view.
    pub fn saved_location_details(&self) -> Option<SavedLocation> {
        let coordinates = self.saved_location()?;
        let updated_at = self
            .get_with_timestamp(SAVED_LOCATION_KEY)
            .ok()
            .flatten()
            .and_then(|(_, ts)| ts)
            .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
            .map(|ts| ts.with_timezone(&Local));
        let address = self.get(SAVED_LOCATION_ADDRESS_KEY).ok().flatten();
        Some(SavedLocation {
            coordinates,
            address,
            updated_at,
        })
    }
}

impl SavedLocationStore for PreferenceDb {
    fn saved_location(&self) -> Option<Coordinates> {
        let raw = match self.get(SAVED_LOCATION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Could not read saved location: {}", e);
                return None;
            }
        };
        match serde_json::from_str::<Coordinates>(&raw) {
            Ok(coords) if coords.is_valid() => Some(coords),
            Ok(coords) => {
                warn!("Saved location {} is out of range; ignoring it", coords);
                None
            }
            Err(e) => {
                warn!("Failed to parse saved location: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_location_is_none() {
        let db = PreferenceDb::open_in_memory().unwrap();
        assert_eq!(db.saved_location(), None);
        assert!(db.saved_location_details().is_none());
    }

    #[test]
    fn saved_location_round_trips_with_address() {
        let db = PreferenceDb::open_in_memory().unwrap();
        let home = Coordinates::new(4.9757, 8.3417);
        db.save_location(home, Some("12 Marian Road, Calabar")).unwrap();

        assert_eq!(db.saved_location(), Some(home));
        let details = db.saved_location_details().unwrap();
        assert_eq!(details.address.as_deref(), Some("12 Marian Road, Calabar"));
        assert!(details.updated_at.is_some());
    }

    #[test]
    fn malformed_value_is_treated_as_absent() {
        let db = PreferenceDb::open_in_memory().unwrap();
        db.set(SAVED_LOCATION_KEY, "{not json").unwrap();
        assert_eq!(db.saved_location(), None);

        db.set(SAVED_LOCATION_KEY, r#"{"lat": 200.0, "lng": 0.0}"#).unwrap();
        assert_eq!(db.saved_location(), None);
    }

    #[test]
    fn clearing_removes_location_and_address() {
        let db = PreferenceDb::open_in_memory().unwrap();
        db.save_location(Coordinates::new(1.0, 2.0), Some("Somewhere")).unwrap();
        db.clear_saved_location().unwrap();
        assert_eq!(db.saved_location(), None);
        assert_eq!(db.get(SAVED_LOCATION_ADDRESS_KEY).unwrap(), None);
    }

    #[test]
    fn database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.db");
        PreferenceDb::open(&path)
            .unwrap()
            .save_location(Coordinates::new(6.5, 3.4), None)
            .unwrap();
        let reopened = PreferenceDb::open(&path).unwrap();
        assert_eq!(reopened.saved_location(), Some(Coordinates::new(6.5, 3.4)));
    }
}
