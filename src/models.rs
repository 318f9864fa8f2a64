use crate::geo::Coordinates;
use csv::ReaderBuilder;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

/// Facility type as labelled in directory files. Unknown labels become `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FacilityKind {
    Hospital,
    Clinic,
    Pharmacy,
    DiagnosticCenter,
    DentalClinic,
    OpticalCenter,
    Gym,
    Spa,
    SpecialistCenter,
    PhysiotherapyClinic,
    Other,
}

impl From<String> for FacilityKind {
    fn from(label: String) -> Self {
        FacilityKind::from_label(&label)
    }
}

impl From<FacilityKind> for String {
    fn from(kind: FacilityKind) -> Self {
        kind.label().to_string()
    }
}

impl FacilityKind {
    const ALL: [FacilityKind; 10] = [
        FacilityKind::Hospital,
        FacilityKind::Clinic,
        FacilityKind::Pharmacy,
        FacilityKind::DiagnosticCenter,
        FacilityKind::DentalClinic,
        FacilityKind::OpticalCenter,
        FacilityKind::Gym,
        FacilityKind::Spa,
        FacilityKind::SpecialistCenter,
        FacilityKind::PhysiotherapyClinic,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FacilityKind::Hospital => "Hospital",
            FacilityKind::Clinic => "Clinic",
            FacilityKind::Pharmacy => "Pharmacy",
            FacilityKind::DiagnosticCenter => "Diagnostic Center",
            FacilityKind::DentalClinic => "Dental Clinic",
            FacilityKind::OpticalCenter => "Optical Center",
            FacilityKind::Gym => "Gym",
            FacilityKind::Spa => "Spa",
            FacilityKind::SpecialistCenter => "Specialist Center",
            FacilityKind::PhysiotherapyClinic => "Physiotherapy Clinic",
            FacilityKind::Other => "Other",
        }
    }

    /// Case-insensitive label lookup.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.label().eq_ignore_ascii_case(label))
            .unwrap_or(FacilityKind::Other)
    }
}

/// A healthcare facility as loaded from the directory.
///
/// `coordinates` is `None` when the source record had no usable position;
/// such facilities stay listed but are never picked by the matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Facility {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, deserialize_with = "lenient_coordinates")]
    pub coordinates: Option<Coordinates>,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: FacilityKind,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub opening_hours: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

fn default_kind() -> FacilityKind {
    FacilityKind::Other
}

// Directory files are hand-maintained; a bad coordinate pair should drop the
// position, not the whole file.
fn lenient_coordinates<'de, D>(deserializer: D) -> Result<Option<Coordinates>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| {
        let lat = v.get("lat")?.as_f64()?;
        let lng = v.get("lng")?.as_f64()?;
        Some(Coordinates::new(lat, lng))
    }))
}

impl Facility {
    /// Coordinates usable for distance ranking, if any.
    pub fn valid_coordinates(&self) -> Option<Coordinates> {
        self.coordinates.filter(Coordinates::is_valid)
    }

    /// Case-insensitive substring match against every advertised service.
    pub fn offers_service(&self, keyword: &str) -> bool {
        let keyword = keyword.to_lowercase();
        self.services
            .iter()
            .any(|s| s.to_lowercase().contains(&keyword))
    }
}

/// The kind of emergency a user declares in the dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmergencyCategory {
    Accident,
    Maternity,
    GeneralMedical,
}

impl EmergencyCategory {
    pub const ALL: [EmergencyCategory; 3] = [
        EmergencyCategory::Accident,
        EmergencyCategory::Maternity,
        EmergencyCategory::GeneralMedical,
    ];

    /// Service keyword a facility must advertise to count as specialised.
    pub fn required_service(self) -> &'static str {
        match self {
            EmergencyCategory::Accident | EmergencyCategory::GeneralMedical => "emergency care",
            EmergencyCategory::Maternity => "maternity",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EmergencyCategory::Accident => "Accident / Injury",
            EmergencyCategory::Maternity => "Maternity / Labour",
            EmergencyCategory::GeneralMedical => "Other Medical Emergency",
        }
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid facility JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid facility CSV in {}: {source}", path.display())]
    Csv { path: PathBuf, source: csv::Error },

    #[error("{} is missing required column '{column}'", path.display())]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("Unsupported directory file {}; expected .json or .csv", path.display())]
    UnsupportedFormat { path: PathBuf },
}

/// Read-only, ordered collection of facilities.
///
/// Iteration order is the order files were listed in and records appeared in
/// them. The matcher breaks distance ties by this order.
#[derive(Debug, Clone, Default)]
pub struct FacilityDirectory {
    facilities: Vec<Facility>,
}

impl FacilityDirectory {
    /// Builds a directory, keeping the first record for any repeated id.
    pub fn from_facilities(facilities: Vec<Facility>) -> Self {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(facilities.len());
        for facility in facilities {
            if seen.insert(facility.id.clone()) {
                kept.push(facility);
            } else {
                warn!("Duplicate facility id '{}' ignored", facility.id);
            }
        }
        Self { facilities: kept }
    }

    /// Loads every path in order. Files that fail to load are logged and skipped.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Self {
        let mut all = Vec::new();
        for path in paths {
            let path = path.as_ref();
            match load_facility_file(path) {
                Ok(mut facilities) => {
                    info!("Loaded {} facilities from {}", facilities.len(), path.display());
                    all.append(&mut facilities);
                }
                Err(e) => error!("Skipping facility file: {}", e),
            }
        }
        Self::from_facilities(all)
    }

    pub fn facilities(&self) -> &[Facility] {
        &self.facilities
    }

    pub fn get(&self, id: &str) -> Option<&Facility> {
        self.facilities.iter().find(|f| f.id == id)
    }

    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }
}

/// Picks the reader by file extension.
pub fn load_facility_file(path: &Path) -> Result<Vec<Facility>, DirectoryError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("json") => load_facilities_json(path),
        Some("csv") => load_facilities_csv(path),
        _ => Err(DirectoryError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

pub fn load_facilities_json(path: &Path) -> Result<Vec<Facility>, DirectoryError> {
    let content = fs::read_to_string(path).map_err(|source| DirectoryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| DirectoryError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a CSV export with a header row.
///
/// Columns are found case-insensitively; `services` is `;`-separated.
/// Rows with a blank id or unreadable fields are skipped.
pub fn load_facilities_csv(path: &Path) -> Result<Vec<Facility>, DirectoryError> {
    let csv_err = |source| DirectoryError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = rdr.headers().map_err(csv_err)?.clone();

    // Helper to find column index case-insensitively
    let find_col = |name: &str| {
        headers.iter().position(|h| {
            h.trim_start_matches('\u{feff}')
                .trim()
                .eq_ignore_ascii_case(name)
        })
    };
    let required = |column: &'static str| {
        find_col(column).ok_or_else(|| DirectoryError::MissingColumn {
            path: path.to_path_buf(),
            column,
        })
    };

    let id_idx = required("id")?;
    let name_idx = required("name")?;
    let address_idx = find_col("address");
    let lat_idx = find_col("lat");
    let lng_idx = find_col("lng");
    let type_idx = find_col("type");
    let services_idx = find_col("services");
    let phone_idx = find_col("phone");
    let hours_idx = find_col("opening_hours");

    let mut facilities = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("{}: skipping unreadable row {}: {}", path.display(), line + 2, e);
                continue;
            }
        };

        let get_val = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        let Some(id) = get_val(Some(id_idx)) else {
            warn!("{}: skipping row {} with no id", path.display(), line + 2);
            continue;
        };

        let coordinates = match (
            get_val(lat_idx).and_then(|s| s.parse::<f64>().ok()),
            get_val(lng_idx).and_then(|s| s.parse::<f64>().ok()),
        ) {
            (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)),
            _ => None,
        };

        let services = get_val(services_idx)
            .map(|s| {
                s.split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        facilities.push(Facility {
            id: id.to_string(),
            name: get_val(Some(name_idx)).unwrap_or("Unnamed facility").to_string(),
            address: get_val(address_idx).unwrap_or("").to_string(),
            coordinates,
            kind: get_val(type_idx)
                .map(FacilityKind::from_label)
                .unwrap_or(FacilityKind::Other),
            services,
            phone: get_val(phone_idx).map(String::from),
            opening_hours: get_val(hours_idx).map(String::from),
            image_url: None,
        });
    }
    Ok(facilities)
}
