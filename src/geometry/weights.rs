//! Spatial weights matrix construction
//!
//! Derives a region-to-neighbor weight matrix from the geometry index using
//! one of several adjacency policies:
//! - Precomputed adjacency supplied by the caller
//! - Shared border (polygons touching at a vertex)
//! - Distance threshold (binary weights within a radius)
//! - Inverse distance (1/d weights within a radius)

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{normalize_region_id, Coordinates, GeometryIndex};

/// Vertex coincidence tolerance for the shared-border test, in degrees
const VERTEX_EPSILON: f64 = 1e-9;

/// Region → (neighbor → weight). Self-weights are always zero (absent).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SpatialWeightsMatrix {
    rows: BTreeMap<String, BTreeMap<String, f64>>,
}

impl SpatialWeightsMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw rows, normalizing identifiers and dropping invalid
    /// weights the same way `set_weight` does.
    pub fn from_rows(rows: BTreeMap<String, BTreeMap<String, f64>>) -> Self {
        let mut matrix = Self::new();
        for (region, neighbors) in rows {
            let region = normalize_region_id(&region);
            matrix.insert_region(&region);
            for (neighbor, weight) in neighbors {
                matrix.set_weight(&region, &normalize_region_id(&neighbor), weight);
            }
        }
        matrix
    }

    /// Ensure `region` is present as a key, possibly with no neighbors
    pub fn insert_region(&mut self, region: &str) {
        if region.is_empty() {
            return;
        }
        self.rows.entry(region.to_string()).or_default();
    }

    /// Set `w(region, neighbor)`. Self-loops, negative and non-finite weights
    /// are dropped; a zero weight only registers both keys.
    pub fn set_weight(&mut self, region: &str, neighbor: &str, weight: f64) {
        if region.is_empty() || neighbor.is_empty() {
            return;
        }
        self.insert_region(region);
        self.insert_region(neighbor);

        if region == neighbor {
            tracing::debug!(region = %region, "Ignoring self-weight");
            return;
        }
        if !weight.is_finite() || weight < 0.0 {
            tracing::warn!(
                region = %region,
                neighbor = %neighbor,
                weight = weight,
                "Dropping invalid spatial weight"
            );
            return;
        }
        if weight == 0.0 {
            return;
        }

        if let Some(row) = self.rows.get_mut(region) {
            row.insert(neighbor.to_string(), weight);
        }
    }

    pub fn neighbors(&self, region: &str) -> Option<&BTreeMap<String, f64>> {
        self.rows.get(region)
    }

    pub fn weight(&self, region: &str, neighbor: &str) -> f64 {
        self.rows
            .get(region)
            .and_then(|row| row.get(neighbor))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn row_sum(&self, region: &str) -> f64 {
        self.rows
            .get(region)
            .map(|row| row.values().sum())
            .unwrap_or(0.0)
    }

    /// Sum of all weights
    pub fn s0(&self) -> f64 {
        self.rows.values().flat_map(|row| row.values()).sum()
    }

    pub fn contains(&self, region: &str) -> bool {
        self.rows.contains_key(region)
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn rows(&self) -> &BTreeMap<String, BTreeMap<String, f64>> {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Copy with every non-empty row scaled to sum to 1
    pub fn row_standardized(&self) -> Self {
        let rows = self
            .rows
            .iter()
            .map(|(region, row)| {
                let total: f64 = row.values().sum();
                let scaled = row
                    .iter()
                    .map(|(neighbor, w)| {
                        let w = if total > 0.0 { w / total } else { 0.0 };
                        (neighbor.clone(), w)
                    })
                    .collect();
                (region.clone(), scaled)
            })
            .collect();
        Self { rows }
    }
}

/// Adjacency source used to derive the weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WeightsPolicy {
    /// Caller-supplied matrix, used as-is after id normalization
    Precomputed { matrix: SpatialWeightsMatrix },
    /// Weight 1 between regions whose polygons share a vertex
    SharedBorder,
    /// Weight 1 between regions within `km` of each other
    DistanceThreshold { km: f64 },
    /// Weight 1/d between regions within `km` of each other
    InverseDistance { km: f64 },
}

impl Default for WeightsPolicy {
    fn default() -> Self {
        Self::DistanceThreshold { km: 100.0 }
    }
}

/// Build the spatial weights matrix for `regions` (typically all regions seen
/// in the time-series data) plus every region of the geometry index.
///
/// Every requested region is a key of the result. Regions without usable
/// geometry get an empty neighbor row.
pub fn build_weights(
    geometry: &GeometryIndex,
    regions: &[String],
    policy: &WeightsPolicy,
) -> SpatialWeightsMatrix {
    let mut matrix = SpatialWeightsMatrix::new();

    let mut keys: Vec<String> = geometry.ids().map(str::to_string).collect();
    keys.extend(regions.iter().map(|r| normalize_region_id(r)));
    keys.sort();
    keys.dedup();
    keys.retain(|k| !k.is_empty());

    for key in &keys {
        matrix.insert_region(key);
    }

    match policy {
        WeightsPolicy::Precomputed { matrix: supplied } => {
            for (region, row) in supplied.rows() {
                let region = normalize_region_id(region);
                matrix.insert_region(&region);
                for (neighbor, weight) in row {
                    matrix.set_weight(&region, &normalize_region_id(neighbor), *weight);
                }
            }
        }
        WeightsPolicy::SharedBorder => {
            let rings: Vec<(&str, &[Coordinates])> = keys
                .iter()
                .filter_map(|k| geometry.polygon(k).map(|ring| (k.as_str(), ring)))
                .collect();

            for (i, (a, ring_a)) in rings.iter().enumerate() {
                for (b, ring_b) in rings.iter().skip(i + 1) {
                    if rings_touch(ring_a, ring_b) {
                        matrix.set_weight(a, b, 1.0);
                        matrix.set_weight(b, a, 1.0);
                    }
                }
            }
        }
        WeightsPolicy::DistanceThreshold { km } | WeightsPolicy::InverseDistance { km } => {
            let inverse = matches!(policy, WeightsPolicy::InverseDistance { .. });
            let located: Vec<(&str, Coordinates)> = keys
                .iter()
                .filter_map(|k| geometry.coordinates(k).map(|c| (k.as_str(), c)))
                .collect();

            for (i, (a, ca)) in located.iter().enumerate() {
                for (b, cb) in located.iter().skip(i + 1) {
                    let d = ca.haversine_km(cb);
                    if d > *km {
                        continue;
                    }
                    let weight = if inverse {
                        if d <= 0.0 {
                            tracing::warn!(region = %a, neighbor = %b, "Co-located regions, skipping inverse-distance weight");
                            continue;
                        }
                        1.0 / d
                    } else {
                        1.0
                    };
                    matrix.set_weight(a, b, weight);
                    matrix.set_weight(b, a, weight);
                }
            }
        }
    }

    let missing = keys
        .iter()
        .filter(|k| geometry.coordinates(k).is_none() && geometry.polygon(k).is_none())
        .count();
    tracing::debug!(
        regions = matrix.len(),
        missing_geometry = missing,
        s0 = matrix.s0(),
        "Built spatial weights"
    );

    matrix
}

fn rings_touch(a: &[Coordinates], b: &[Coordinates]) -> bool {
    a.iter().any(|p| {
        b.iter()
            .any(|q| (p.lon - q.lon).abs() <= VERTEX_EPSILON && (p.lat - q.lat).abs() <= VERTEX_EPSILON)
    })
}
