//! Locations registry
//!
//! The registry is a JSON array of locations to query. Entries missing
//! coordinates are geocoded once and the registry file is rewritten so later
//! runs skip the lookup. Two entry shapes are read:
//!
//! ```json
//! [
//!   {"name": "Oslo", "country": "NO", "lat": 59.91, "lon": 10.75},
//!   {"city": {"id": {"$numberLong": "3143244"}, "name": "Bergen",
//!             "coord": {"lat": 60.39, "lon": 5.32}}}
//! ]
//! ```
//!
//! Rewrites always use the first shape.

use crate::api::{Coordinates, OpenWeatherClient};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use wxlake_common::{Result, WxError};

/// A geographic point to query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Display name, also the storage key
    pub name: String,
    /// Free-text geocoding query when it differs from the name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

impl Location {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), query: None, country: None, lat: None, lon: None }
    }

    pub fn key(&self) -> &str {
        &self.name
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(Coordinates { lat, lon }),
            _ => None,
        }
    }

    /// `q` parameter for geocoding: `<query or name>[,<country>]`
    pub fn search_query(&self) -> String {
        let base = self.query.as_deref().unwrap_or(&self.name);
        match &self.country {
            Some(country) if !country.is_empty() => format!("{},{}", base, country),
            _ => base.to_string(),
        }
    }
}

/// A location with coordinates, immutable for the rest of the run
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub key: String,
    pub coordinates: Coordinates,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RegistryEntry {
    Legacy { city: LegacyCity },
    Current(Location),
}

#[derive(Deserialize)]
struct LegacyCity {
    name: String,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    coord: Option<Coordinates>,
}

impl From<RegistryEntry> for Location {
    fn from(entry: RegistryEntry) -> Self {
        match entry {
            RegistryEntry::Current(location) => location,
            RegistryEntry::Legacy { city } => Location {
                name: city.name,
                query: None,
                country: city.country,
                lat: city.coord.map(|c| c.lat),
                lon: city.coord.map(|c| c.lon),
            },
        }
    }
}

/// The registry file and its parsed entries
#[derive(Debug, Clone)]
pub struct LocationRegistry {
    path: PathBuf,
    locations: Vec<Location>,
}

impl LocationRegistry {
    /// Read and validate a registry file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            WxError::config(format!("Cannot read locations file {}: {}", path.display(), e))
        })?;
        let entries: Vec<RegistryEntry> = serde_json::from_str(&raw).map_err(|e| {
            WxError::config(format!("Malformed locations file {}: {}", path.display(), e))
        })?;

        let locations: Vec<Location> = entries.into_iter().map(Location::from).collect();
        validate(&locations)?;

        Ok(Self { path, locations })
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Geocode entries without coordinates and persist them back to the file
    #[instrument(skip(self, client), fields(path = %self.path.display()))]
    pub async fn resolve(&mut self, client: &OpenWeatherClient) -> Result<Vec<ResolvedLocation>> {
        let mut updated = false;

        for location in self.locations.iter_mut() {
            if location.coordinates().is_some() {
                continue;
            }

            let query = location.search_query();
            let coordinates = client.geocode(&query).await?.ok_or_else(|| {
                WxError::config(format!(
                    "Geocoding found no match for location '{}' (query '{}')",
                    location.name, query
                ))
            })?;

            info!(location = %location.name, lat = coordinates.lat, lon = coordinates.lon, "Geocoded location");
            location.lat = Some(coordinates.lat);
            location.lon = Some(coordinates.lon);
            updated = true;
        }

        if updated {
            self.save()?;
        }

        self.locations
            .iter()
            .map(|location| {
                location
                    .coordinates()
                    .map(|coordinates| ResolvedLocation { key: location.name.clone(), coordinates })
                    .ok_or_else(|| {
                        WxError::config(format!("Location '{}' has no coordinates", location.name))
                    })
            })
            .collect()
    }

    /// Rewrite the registry file in the current shape
    pub fn save(&self) -> Result<()> {
        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.locations)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

fn validate(locations: &[Location]) -> Result<()> {
    let mut seen = HashSet::new();
    for location in locations {
        let key = location.key();
        if key.trim().is_empty() {
            return Err(WxError::config("Location with an empty name in locations file"));
        }
        if key.contains('/') || key.contains('\\') {
            return Err(WxError::config(format!(
                "Location name '{}' must not contain path separators",
                key
            )));
        }
        if !seen.insert(key) {
            return Err(WxError::config(format!("Duplicate location '{}'", key)));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_registry(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("locations.json");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_both_shapes() {
        let dir = TempDir::new().unwrap();
        let path = write_registry(
            &dir,
            r#"[
                {"name": "Oslo", "country": "NO", "lat": 59.91, "lon": 10.75},
                {"city": {"id": {"$numberLong": "3161732"}, "name": "Bergen", "country": "NO",
                          "coord": {"lat": 60.39, "lon": 5.32}}},
                {"name": "Lisbon", "query": "Lisboa", "country": "PT"}
            ]"#,
        );

        let registry = LocationRegistry::load(&path).unwrap();
        let locations = registry.locations();

        assert_eq!(locations.len(), 3);
        assert_eq!(locations[1].name, "Bergen");
        assert_eq!(locations[1].coordinates(), Some(Coordinates { lat: 60.39, lon: 5.32 }));
        assert_eq!(locations[2].coordinates(), None);
        assert_eq!(locations[2].search_query(), "Lisboa,PT");
    }

    #[test]
    fn test_malformed_registry_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = write_registry(&dir, r#"{"name": "not an array"}"#);
        assert!(matches!(LocationRegistry::load(&path).unwrap_err(), WxError::Config(_)));

        let missing = dir.path().join("nope.json");
        assert!(matches!(LocationRegistry::load(missing).unwrap_err(), WxError::Config(_)));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_registry(&dir, r#"[{"name": "Oslo"}, {"name": "Oslo"}]"#);
        assert!(LocationRegistry::load(&path).is_err());
    }

    #[test]
    fn test_save_rewrites_in_current_shape() {
        let dir = TempDir::new().unwrap();
        let path = write_registry(
            &dir,
            r#"[{"city": {"name": "Bergen", "coord": {"lat": 60.39, "lon": 5.32}}}]"#,
        );

        LocationRegistry::load(&path).unwrap().save().unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved, serde_json::json!([{"name": "Bergen", "lat": 60.39, "lon": 5.32}]));
    }
}
