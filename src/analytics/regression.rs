//! Spatial regression consumption
//!
//! The regression model is fitted upstream; this module normalizes its output
//! into a fully populated summary and checks the residuals for remaining
//! spatial dependence on the current weights matrix.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::analytics::autocorrelation::global_moran_i_with;
use crate::analytics::types::GlobalMoranStatistic;
use crate::config::AnalyticsConfig;
use crate::geometry::{normalize_region_id, SpatialWeightsMatrix};

/// One residual of the fitted model
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ResidualRecord {
    pub region_id: String,
    pub date: Option<String>,
    pub residual: Option<f64>,
}

/// Moran's I as reported by the fitting process. A missing p-value reads
/// as 1 (not significant).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ReportedMoran {
    #[serde(rename = "I")]
    pub i: f64,
    #[serde(rename = "p-value")]
    pub p_value: f64,
}

impl Default for ReportedMoran {
    fn default() -> Self {
        Self { i: 0.0, p_value: 1.0 }
    }
}

/// Regression output as produced by the upstream model fit
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RegressionResult {
    pub coefficients: BTreeMap<String, f64>,
    pub p_values: BTreeMap<String, f64>,
    pub r_squared: f64,
    pub residuals: Vec<ResidualRecord>,
    pub moran_i: ReportedMoran,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoefficientSummary {
    pub name: String,
    pub estimate: f64,
    /// 1 when the fit reported no p-value for this coefficient
    pub p_value: f64,
    pub significant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegressionSummary {
    pub r_squared: f64,

    /// Ordered by coefficient name
    pub coefficients: Vec<CoefficientSummary>,

    /// Mean residual per region
    pub residuals_by_region: BTreeMap<String, f64>,

    pub residual_count: usize,

    pub reported_moran_i: f64,

    pub reported_moran_p_value: f64,

    /// Moran's I of the per-region mean residuals on the current weights
    pub residual_moran: GlobalMoranStatistic,

    pub spatial_dependence_detected: bool,

    pub warning: Option<String>,
}

impl RegressionSummary {
    /// Summary used when no regression result is available
    pub fn missing() -> Self {
        Self {
            r_squared: 0.0,
            coefficients: Vec::new(),
            residuals_by_region: BTreeMap::new(),
            residual_count: 0,
            reported_moran_i: 0.0,
            reported_moran_p_value: 1.0,
            residual_moran: GlobalMoranStatistic::neutral(0, "no residuals"),
            spatial_dependence_detected: false,
            warning: Some("no regression result available".to_string()),
        }
    }
}

pub fn summarize_regression(
    result: &RegressionResult,
    weights: &SpatialWeightsMatrix,
) -> RegressionSummary {
    summarize_regression_with(result, weights, &AnalyticsConfig::default())
}

/// Summarize a regression result against the current weights matrix
pub fn summarize_regression_with(
    result: &RegressionResult,
    weights: &SpatialWeightsMatrix,
    config: &AnalyticsConfig,
) -> RegressionSummary {
    let coefficients = result
        .coefficients
        .iter()
        .map(|(name, estimate)| {
            let p_value = result
                .p_values
                .get(name)
                .copied()
                .filter(|p| p.is_finite())
                .unwrap_or(1.0);
            CoefficientSummary {
                name: name.clone(),
                estimate: *estimate,
                p_value,
                significant: p_value <= config.significance_level,
            }
        })
        .collect();

    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    let mut dropped = 0usize;
    for record in &result.residuals {
        let region = normalize_region_id(&record.region_id);
        match record.residual {
            Some(residual) if residual.is_finite() && !region.is_empty() => {
                let entry = sums.entry(region).or_insert((0.0, 0));
                entry.0 += residual;
                entry.1 += 1;
            }
            _ => {
                dropped += 1;
                tracing::warn!(
                    region = %record.region_id,
                    "Dropping residual without a finite value"
                );
            }
        }
    }

    let residual_count = sums.values().map(|(_, count)| count).sum();
    let residuals_by_region: BTreeMap<String, f64> = sums
        .into_iter()
        .map(|(region, (sum, count))| (region, sum / count as f64))
        .collect();

    let residual_moran = global_moran_i_with(&residuals_by_region, weights, config);
    let spatial_dependence_detected =
        residual_moran.warning.is_none() && residual_moran.is_significant(config.significance_level);

    let warning = (dropped > 0).then(|| format!("{} residual(s) dropped", dropped));

    tracing::debug!(
        residuals = residual_count,
        regions = residuals_by_region.len(),
        residual_moran_i = residual_moran.moran_i,
        "Summarized regression result"
    );

    RegressionSummary {
        r_squared: if result.r_squared.is_finite() {
            result.r_squared
        } else {
            0.0
        },
        coefficients,
        residuals_by_region,
        residual_count,
        reported_moran_i: result.moran_i.i,
        reported_moran_p_value: result.moran_i.p_value,
        residual_moran,
        spatial_dependence_detected,
        warning,
    }
}
