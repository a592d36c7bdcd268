//! Region geometry index
//!
//! Normalizes region identifiers and exposes coordinates, polygons and
//! pairwise distances. The index is built once from the geometry feed and
//! passed explicitly to every computation that needs it.

pub mod weights;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{AnalyticsError, Result};

pub use weights::{build_weights, SpatialWeightsMatrix, WeightsPolicy};

/// Mean Earth radius used by the haversine distance
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Canonical form of a region identifier.
///
/// Trims, lowercases, collapses runs of whitespace, `_` and `-` into a single
/// `_`, and strips a trailing `_governorate` suffix, so that "Al Hudaydah",
/// "al-hudaydah" and "AL_HUDAYDAH Governorate" all map to `al_hudaydah`.
pub fn normalize_region_id(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_separator = false;

    for ch in raw.trim().chars() {
        if ch.is_whitespace() || ch == '_' || ch == '-' {
            pending_separator = !out.is_empty();
            continue;
        }
        if pending_separator {
            out.push('_');
            pending_separator = false;
        }
        out.extend(ch.to_lowercase());
    }

    if let Some(stripped) = out.strip_suffix("_governorate") {
        let len = stripped.len();
        out.truncate(len);
    }

    out
}

/// A longitude/latitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Coordinates {
    #[schemars(range(min = -180.0, max = 180.0))]
    pub lon: f64,
    #[schemars(range(min = -90.0, max = 90.0))]
    pub lat: f64,
}

impl Coordinates {
    /// Validate a raw pair; `region` is only used for the error message.
    pub fn validated(region: &str, lon: f64, lat: f64) -> Result<Self> {
        let reason = if !lon.is_finite() || !lat.is_finite() {
            Some("non-finite component".to_string())
        } else if !(-180.0..=180.0).contains(&lon) {
            Some(format!("longitude {} out of range", lon))
        } else if !(-90.0..=90.0).contains(&lat) {
            Some(format!("latitude {} out of range", lat))
        } else {
            None
        };

        match reason {
            Some(reason) => Err(AnalyticsError::MalformedCoordinate {
                region: region.to_string(),
                reason,
            }),
            None => Ok(Self { lon, lat }),
        }
    }

    /// Great-circle distance in kilometres
    pub fn haversine_km(&self, other: &Coordinates) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.lon - self.lon).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// A region with its (optional) point location and boundary ring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Region {
    pub id: String,
    pub coordinates: Option<Coordinates>,
    pub polygon: Option<Vec<Coordinates>>,
}

impl Region {
    pub fn new(id: &str, coordinates: Option<Coordinates>) -> Self {
        Self {
            id: normalize_region_id(id),
            coordinates,
            polygon: None,
        }
    }

    pub fn with_polygon(mut self, polygon: Vec<Coordinates>) -> Self {
        self.polygon = Some(polygon);
        self
    }

    /// Point location, falling back to the vertex mean of the polygon
    pub fn location(&self) -> Option<Coordinates> {
        if let Some(coordinates) = self.coordinates {
            return Some(coordinates);
        }
        let ring = self.polygon.as_ref().filter(|ring| !ring.is_empty())?;
        let n = ring.len() as f64;
        Some(Coordinates {
            lon: ring.iter().map(|c| c.lon).sum::<f64>() / n,
            lat: ring.iter().map(|c| c.lat).sum::<f64>() / n,
        })
    }
}

/// Immutable lookup of regions by normalized identifier
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeometryIndex {
    regions: BTreeMap<String, Region>,
}

impl GeometryIndex {
    /// Build the index. Identifiers are normalized; a later duplicate replaces
    /// an earlier one.
    pub fn from_regions(regions: Vec<Region>) -> Self {
        let mut map = BTreeMap::new();

        for mut region in regions {
            region.id = normalize_region_id(&region.id);
            if region.id.is_empty() {
                tracing::warn!("Dropping geometry record with empty region id");
                continue;
            }
            if map.contains_key(&region.id) {
                tracing::warn!(region = %region.id, "Duplicate geometry record, keeping the last one");
            }
            map.insert(region.id.clone(), region);
        }

        Self { regions: map }
    }

    /// Build the index from raw geometry feed records, dropping malformed ones
    pub fn from_feed(records: &[crate::feeds::GeometryRecord]) -> Self {
        Self::from_regions(crate::feeds::ingest_geometry(records))
    }

    pub fn get(&self, id: &str) -> Option<&Region> {
        self.regions.get(&normalize_region_id(id))
    }

    pub fn coordinates(&self, id: &str) -> Option<Coordinates> {
        self.get(id).and_then(Region::location)
    }

    pub fn polygon(&self, id: &str) -> Option<&[Coordinates]> {
        self.get(id).and_then(|r| r.polygon.as_deref())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Normalized identifiers in ascending order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.regions.keys().map(String::as_str)
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Haversine distance between two regions, if both have a location
    pub fn distance_km(&self, a: &str, b: &str) -> Option<f64> {
        let from = self.coordinates(a)?;
        let to = self.coordinates(b)?;
        Some(from.haversine_km(&to))
    }
}
