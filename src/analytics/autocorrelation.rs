//! Spatial autocorrelation (global and local Moran's I)
//!
//! Global Moran's I measures whether similar values cluster across the whole
//! region set; local Moran's I (LISA) decomposes it per region and classifies
//! each region as a high-high / low-low cluster or a high-low / low-high
//! outlier. Inference uses the randomization assumption with kurtosis
//! adjustment.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use crate::analytics::stats::two_tailed_p_value;
use crate::analytics::types::{
    ClusterType, ClusterTypeCounts, GlobalMoranStatistic, LocalMoranResult, LocalMoranStatistic,
    ValueField,
};
use crate::config::AnalyticsConfig;
use crate::feeds::TimeSeriesObservation;
use crate::geometry::SpatialWeightsMatrix;

/// Relative variance below which values are treated as constant
const ZERO_VARIANCE_TOLERANCE: f64 = 1e-12;

/// Values and dense weights restricted to regions with a finite value
struct PreparedData<'a> {
    ids: Vec<&'a str>,
    values: Vec<f64>,
    deviations: Vec<f64>,
    weights: Vec<Vec<f64>>,
    /// Σ d² / n
    m2: f64,
    /// kurtosis m4 / m2²
    b2: f64,
}

impl<'a> PreparedData<'a> {
    fn new(values: &'a BTreeMap<String, f64>, matrix: &SpatialWeightsMatrix) -> Self {
        let mut ids = Vec::with_capacity(values.len());
        let mut raw = Vec::with_capacity(values.len());

        for (region, value) in values {
            if value.is_finite() {
                ids.push(region.as_str());
                raw.push(*value);
            } else {
                tracing::warn!(region = %region, "Ignoring non-finite value in autocorrelation");
            }
        }

        let n = ids.len();
        let index: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut weights = vec![vec![0.0; n]; n];
        for (i, region) in ids.iter().enumerate() {
            if let Some(row) = matrix.neighbors(region) {
                for (neighbor, w) in row {
                    if let Some(&j) = index.get(neighbor.as_str()) {
                        if i != j {
                            weights[i][j] = *w;
                        }
                    }
                }
            }
        }

        let mean = if n > 0 {
            raw.iter().sum::<f64>() / n as f64
        } else {
            0.0
        };
        let deviations: Vec<f64> = raw.iter().map(|x| x - mean).collect();

        let (m2, b2) = if n > 0 {
            let m2 = deviations.iter().map(|d| d * d).sum::<f64>() / n as f64;
            let m4 = deviations.iter().map(|d| d.powi(4)).sum::<f64>() / n as f64;
            let b2 = if m2 > 0.0 { m4 / (m2 * m2) } else { 0.0 };
            (m2, b2)
        } else {
            (0.0, 0.0)
        };

        // Noise-level deviations of a constant series would otherwise yield
        // an arbitrary statistic.
        let m2 = if m2 <= ZERO_VARIANCE_TOLERANCE * mean.powi(2).max(1.0) {
            0.0
        } else {
            m2
        };

        Self {
            ids,
            values: raw,
            deviations,
            weights,
            m2,
            b2,
        }
    }

    fn n(&self) -> usize {
        self.ids.len()
    }

    fn s0(&self) -> f64 {
        self.weights.iter().flatten().sum()
    }
}

/// Global Moran's I with the default configuration
pub fn global_moran_i(
    values: &BTreeMap<String, f64>,
    weights: &SpatialWeightsMatrix,
) -> GlobalMoranStatistic {
    global_moran_i_with(values, weights, &AnalyticsConfig::default())
}

/// Global Moran's I
///
/// `I = (n/S0) · Σ_ij w_ij (x_i-x̄)(x_j-x̄) / Σ_i (x_i-x̄)²`
///
/// Weights towards regions without a finite value are ignored. Fewer than two
/// regions, no neighbor links, or constant values yield a neutral statistic
/// (I = 0, z = 0, p = 1) with a warning.
pub fn global_moran_i_with(
    values: &BTreeMap<String, f64>,
    weights: &SpatialWeightsMatrix,
    config: &AnalyticsConfig,
) -> GlobalMoranStatistic {
    let data = PreparedData::new(values, weights);
    let n = data.n();

    if n < 2 {
        return GlobalMoranStatistic::neutral(n, "insufficient data: fewer than 2 regions with values");
    }

    let s0 = data.s0();
    if s0 <= 0.0 {
        return GlobalMoranStatistic::neutral(n, "no neighbor links between regions with values");
    }
    if data.m2 == 0.0 {
        return GlobalMoranStatistic::neutral(n, "zero variance: all values are equal");
    }

    let nf = n as f64;
    let d = &data.deviations;
    let w = &data.weights;

    let mut cross = 0.0;
    let mut s1 = 0.0;
    let mut s2 = 0.0;
    for i in 0..n {
        let mut row_sum = 0.0;
        let mut col_sum = 0.0;
        for j in 0..n {
            cross += w[i][j] * d[i] * d[j];
            row_sum += w[i][j];
            col_sum += w[j][i];
            if i != j {
                s1 += (w[i][j] + w[j][i]).powi(2);
            }
        }
        s2 += (row_sum + col_sum).powi(2);
    }
    s1 *= 0.5;

    let sum_sq = data.m2 * nf;
    let moran_i = (nf / s0) * cross / sum_sq;
    let expected = -1.0 / (nf - 1.0);

    let variance = if n > 3 {
        let b2 = data.b2;
        let numerator = nf * ((nf * nf - 3.0 * nf + 3.0) * s1 - nf * s2 + 3.0 * s0 * s0)
            - b2 * ((nf * nf - nf) * s1 - 2.0 * nf * s2 + 6.0 * s0 * s0);
        let denominator = (nf - 1.0) * (nf - 2.0) * (nf - 3.0) * s0 * s0;
        numerator / denominator - expected * expected
    } else {
        // The randomization moments need n > 3; use the normality moments
        (nf * nf * s1 - nf * s2 + 3.0 * s0 * s0) / ((nf * nf - 1.0) * s0 * s0) - expected * expected
    };

    if !(variance.is_finite() && variance > 0.0) {
        tracing::debug!(n = n, variance = variance, "Degenerate Moran's I variance");
        return GlobalMoranStatistic {
            moran_i,
            expected,
            variance: 0.0,
            z_score: 0.0,
            p_value: 1.0,
            observations: n,
            warning: Some("degenerate variance: significance not assessed".to_string()),
        };
    }

    let z_score = (moran_i - expected) / variance.sqrt();
    let p_value = two_tailed_p_value(z_score, config.p_value_method);

    tracing::debug!(
        n = n,
        moran_i = moran_i,
        z_score = z_score,
        p_value = p_value,
        "Computed global Moran's I"
    );

    GlobalMoranStatistic {
        moran_i,
        expected,
        variance,
        z_score,
        p_value,
        observations: n,
        warning: None,
    }
}

/// Local Moran's I with the default configuration
pub fn local_moran_i(
    values: &BTreeMap<String, f64>,
    weights: &SpatialWeightsMatrix,
) -> LocalMoranResult {
    local_moran_i_with(values, weights, &AnalyticsConfig::default())
}

/// Local Moran's I (LISA) for every region with a finite value
///
/// `I_i = ((x_i-x̄)/s²) · Σ_j w_ij (x_j-x̄)` with `s² = Σ(x-x̄)²/n`.
/// A region is classified only when `p_value ≤ significance_level`.
pub fn local_moran_i_with(
    values: &BTreeMap<String, f64>,
    weights: &SpatialWeightsMatrix,
    config: &AnalyticsConfig,
) -> LocalMoranResult {
    let data = PreparedData::new(values, weights);
    let n = data.n();

    let degenerate = if n < 2 {
        Some("insufficient data: fewer than 2 regions with values")
    } else if data.m2 == 0.0 {
        Some("zero variance: all values are equal")
    } else {
        None
    };

    if let Some(warning) = degenerate {
        let statistics: BTreeMap<String, LocalMoranStatistic> = data
            .ids
            .iter()
            .zip(&data.values)
            .map(|(id, value)| (id.to_string(), LocalMoranStatistic::not_significant(*value)))
            .collect();
        let summary = ClusterTypeCounts {
            not_significant: statistics.len(),
            ..Default::default()
        };
        return LocalMoranResult {
            statistics,
            summary,
            warning: Some(warning.to_string()),
        };
    }

    let nf = n as f64;
    let b2 = data.b2;
    let mut statistics = BTreeMap::new();
    let mut summary = ClusterTypeCounts::default();
    let mut isolated = 0usize;

    for i in 0..n {
        let row = &data.weights[i];
        let spatial_lag: f64 = row.iter().zip(&data.deviations).map(|(w, d)| w * d).sum();
        let w_i: f64 = row.iter().sum();
        let w_i2: f64 = row.iter().map(|w| w * w).sum();
        let deviation = data.deviations[i];

        let statistic = if w_i <= 0.0 {
            isolated += 1;
            LocalMoranStatistic::not_significant(data.values[i])
        } else {
            let local_i = deviation / data.m2 * spatial_lag;
            let expected = -w_i / (nf - 1.0);
            let cross_term = if n > 2 {
                (w_i * w_i - w_i2) * (2.0 * b2 - nf) / ((nf - 1.0) * (nf - 2.0))
            } else {
                0.0
            };
            let variance = w_i2 * (nf - b2) / (nf - 1.0) + cross_term - expected * expected;

            let (z_score, p_value) = if variance.is_finite() && variance > 0.0 {
                let z = (local_i - expected) / variance.sqrt();
                (z, two_tailed_p_value(z, config.p_value_method))
            } else {
                (0.0, 1.0)
            };

            LocalMoranStatistic {
                local_i,
                z_score,
                p_value,
                cluster_type: ClusterType::classify(
                    deviation,
                    spatial_lag,
                    p_value,
                    config.significance_level,
                ),
                value: data.values[i],
                spatial_lag,
            }
        };

        summary.record(statistic.cluster_type);
        statistics.insert(data.ids[i].to_string(), statistic);
    }

    let warning = (isolated > 0).then(|| format!("{} region(s) without neighbors", isolated));

    tracing::debug!(
        n = n,
        high_high = summary.high_high,
        low_low = summary.low_low,
        outliers = summary.high_low + summary.low_high,
        "Computed local Moran's I"
    );

    LocalMoranResult {
        statistics,
        summary,
        warning,
    }
}

/// Region → value for one month (or averaged over all months when `month`
/// is `None`). Duplicate observations are averaged.
pub fn moran_values_for_month(
    observations: &[TimeSeriesObservation],
    month: Option<NaiveDate>,
    field: ValueField,
) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();

    for obs in observations {
        if month.is_some_and(|m| m != obs.month) {
            continue;
        }
        let value = match field {
            ValueField::Price => obs.price,
            ValueField::ConflictIntensity => obs.conflict_intensity,
        };
        if !value.is_finite() {
            continue;
        }
        let entry = sums.entry(obs.region.clone()).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(region, (sum, count))| (region, sum / count as f64))
        .collect()
}
