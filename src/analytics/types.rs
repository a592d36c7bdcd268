//! Core data types for derived spatial analytics
//!
//! This module defines the result entities handed to the presentation layer.
//! Every field is always populated; degenerate inputs produce neutral values
//! plus a `warning`, never absent fields.

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::feeds::Flow;

// ============================================================================
// Supporting Enums
// ============================================================================

/// LISA classification of a region
///
/// - HighHigh: above-mean value surrounded by above-mean neighbors
/// - LowLow: below-mean value surrounded by below-mean neighbors
/// - HighLow / LowHigh: spatial outliers
/// - NotSignificant: p-value above the significance level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ClusterType {
    #[serde(rename = "high-high")]
    HighHigh,
    #[serde(rename = "low-low")]
    LowLow,
    #[serde(rename = "high-low")]
    HighLow,
    #[serde(rename = "low-high")]
    LowHigh,
    #[serde(rename = "not_significant")]
    NotSignificant,
}

impl ClusterType {
    /// Classify from the region's deviation from the mean and its
    /// neighbor-weighted deviation (spatial lag). A strictly positive
    /// deviation counts as "high".
    pub fn classify(deviation: f64, spatial_lag: f64, p_value: f64, significance: f64) -> Self {
        if !(p_value <= significance) {
            return Self::NotSignificant;
        }
        match (deviation > 0.0, spatial_lag > 0.0) {
            (true, true) => Self::HighHigh,
            (false, false) => Self::LowLow,
            (true, false) => Self::HighLow,
            (false, true) => Self::LowHigh,
        }
    }
}

/// Value extracted from time-series observations for autocorrelation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValueField {
    #[default]
    Price,
    ConflictIntensity,
}

// ============================================================================
// Autocorrelation
// ============================================================================

/// Global Moran's I with randomization-based inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GlobalMoranStatistic {
    pub moran_i: f64,

    /// -1/(n-1)
    pub expected: f64,

    pub variance: f64,

    pub z_score: f64,

    #[schemars(range(min = 0.0, max = 1.0))]
    pub p_value: f64,

    /// Regions with a finite value that took part in the statistic
    pub observations: usize,

    pub warning: Option<String>,
}

impl GlobalMoranStatistic {
    /// Neutral statistic: I = 0, z = 0, p = 1
    pub fn neutral(observations: usize, warning: &str) -> Self {
        let expected = if observations > 1 {
            -1.0 / (observations as f64 - 1.0)
        } else {
            0.0
        };
        Self {
            moran_i: 0.0,
            expected,
            variance: 0.0,
            z_score: 0.0,
            p_value: 1.0,
            observations,
            warning: Some(warning.to_string()),
        }
    }

    pub fn is_significant(&self, significance: f64) -> bool {
        self.p_value <= significance
    }
}

impl Default for GlobalMoranStatistic {
    fn default() -> Self {
        Self::neutral(0, "no data")
    }
}

/// Local Moran's I for one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalMoranStatistic {
    pub local_i: f64,

    pub z_score: f64,

    #[schemars(range(min = 0.0, max = 1.0))]
    pub p_value: f64,

    pub cluster_type: ClusterType,

    /// Observed value of the region
    pub value: f64,

    /// Σ_j w_ij (x_j - x̄)
    pub spatial_lag: f64,
}

impl LocalMoranStatistic {
    pub fn not_significant(value: f64) -> Self {
        Self {
            local_i: 0.0,
            z_score: 0.0,
            p_value: 1.0,
            cluster_type: ClusterType::NotSignificant,
            value,
            spatial_lag: 0.0,
        }
    }
}

/// Number of regions per cluster type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterTypeCounts {
    pub high_high: usize,
    pub low_low: usize,
    pub high_low: usize,
    pub low_high: usize,
    pub not_significant: usize,
}

impl ClusterTypeCounts {
    pub fn record(&mut self, cluster_type: ClusterType) {
        match cluster_type {
            ClusterType::HighHigh => self.high_high += 1,
            ClusterType::LowLow => self.low_low += 1,
            ClusterType::HighLow => self.high_low += 1,
            ClusterType::LowHigh => self.low_high += 1,
            ClusterType::NotSignificant => self.not_significant += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.high_high + self.low_low + self.high_low + self.low_high + self.not_significant
    }
}

/// LISA statistics for every region with a value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalMoranResult {
    pub statistics: BTreeMap<String, LocalMoranStatistic>,
    pub summary: ClusterTypeCounts,
    pub warning: Option<String>,
}

// ============================================================================
// Cluster efficiency
// ============================================================================

/// Sub-scores of the cluster efficiency composite, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EfficiencyComponents {
    #[schemars(range(min = 0.0, max = 1.0))]
    pub connectivity: f64,
    #[schemars(range(min = 0.0, max = 1.0))]
    pub price_integration: f64,
    #[schemars(range(min = 0.0, max = 1.0))]
    pub stability: f64,
    #[schemars(range(min = 0.0, max = 1.0))]
    pub conflict_resilience: f64,
}

impl EfficiencyComponents {
    pub const CONNECTIVITY_WEIGHT: f64 = 0.4;
    pub const PRICE_INTEGRATION_WEIGHT: f64 = 0.3;
    pub const STABILITY_WEIGHT: f64 = 0.2;
    pub const CONFLICT_RESILIENCE_WEIGHT: f64 = 0.1;

    /// 0.4·connectivity + 0.3·priceIntegration + 0.2·stability + 0.1·conflictResilience
    pub fn composite(&self) -> f64 {
        (self.connectivity * Self::CONNECTIVITY_WEIGHT
            + self.price_integration * Self::PRICE_INTEGRATION_WEIGHT
            + self.stability * Self::STABILITY_WEIGHT
            + self.conflict_resilience * Self::CONFLICT_RESILIENCE_WEIGHT)
            .clamp(0.0, 1.0)
    }
}

/// Efficiency scoring of one market cluster
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetrics {
    pub cluster_id: String,

    pub main_market: String,

    #[schemars(range(min = 0.0, max = 1.0))]
    pub efficiency: f64,

    pub components: EfficiencyComponents,

    pub avg_price: f64,

    pub avg_conflict: f64,

    pub market_count: usize,

    #[schemars(range(min = 0.0, max = 1.0))]
    pub reliability: f64,

    /// Market pairs whose price correlation passed the significance test
    pub significant_pairs: usize,

    /// Market pairs with price data on both sides
    pub total_pairs: usize,

    pub warning: Option<String>,
}

// ============================================================================
// Flow network
// ============================================================================

/// Inflow/outflow balance of one region
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegionFlowBalance {
    pub inflow: f64,
    pub outflow: f64,
    /// inflow - outflow
    pub net_flow: f64,
}

/// Aggregate statistics over a (filtered) set of flows
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlowNetworkMetrics {
    pub total_volume: f64,

    pub avg_flow_size: f64,

    pub flow_count: usize,

    pub active_markets: usize,

    #[schemars(range(min = 0.0, max = 1.0))]
    pub flow_density: f64,

    /// Ordered descending by the selected metric, ties in input order
    pub top_flows: Vec<Flow>,

    pub per_region: BTreeMap<String, RegionFlowBalance>,
}

/// Flows aggregated over one time bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FlowBucket {
    /// `YYYY-MM-DD`, `YYYY-Wxx` or `YYYY-MM`
    pub period: String,

    /// First day covered by the bucket
    pub period_start: NaiveDate,

    pub total_flow: f64,

    pub avg_price_differential: f64,

    /// Number of flow records in the bucket
    pub flow_count: usize,
}

/// Degree and betweenness centrality of one region
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CentralityMetrics {
    pub in_degree: usize,
    pub out_degree: usize,
    /// Shortest-path betweenness (unnormalized)
    pub betweenness: f64,
}
