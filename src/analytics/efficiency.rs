//! Market cluster efficiency scoring
//!
//! Scores each market cluster on four sub-metrics and combines them into a
//! weighted composite (see [`EfficiencyComponents::composite`]).

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};

use crate::analytics::stats::{
    coefficient_of_variation, correlation_p_value, mean, pearson_correlation,
};
use crate::analytics::types::{ClusterMetrics, EfficiencyComponents};
use crate::config::AnalyticsConfig;
use crate::feeds::{Flow, MarketCluster, TimeSeriesObservation};
use crate::geometry::GeometryIndex;

/// Data points at which the volume part of reliability saturates
const RELIABLE_DATA_POINTS: f64 = 100.0;

/// Observations grouped by region, plus monthly mean prices
struct MarketData<'a> {
    observations: BTreeMap<&'a str, Vec<&'a TimeSeriesObservation>>,
    monthly_prices: BTreeMap<&'a str, BTreeMap<NaiveDate, f64>>,
}

impl<'a> MarketData<'a> {
    fn new(observations: &'a [TimeSeriesObservation]) -> Self {
        let mut grouped: BTreeMap<&str, Vec<&TimeSeriesObservation>> = BTreeMap::new();
        for obs in observations {
            grouped.entry(obs.region.as_str()).or_default().push(obs);
        }

        let monthly_prices = grouped
            .iter()
            .map(|(region, rows)| {
                let mut sums: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
                for obs in rows.iter().filter(|o| o.price.is_finite()) {
                    let entry = sums.entry(obs.month).or_insert((0.0, 0));
                    entry.0 += obs.price;
                    entry.1 += 1;
                }
                let series = sums
                    .into_iter()
                    .map(|(month, (sum, count))| (month, sum / count as f64))
                    .collect::<BTreeMap<_, _>>();
                (*region, series)
            })
            .filter(|(_, series)| !series.is_empty())
            .collect();

        Self {
            observations: grouped,
            monthly_prices,
        }
    }
}

/// Undirected market links present in the flow data
fn flow_links(flows: &[Flow]) -> HashSet<(&str, &str)> {
    flows
        .iter()
        .filter(|f| f.source != f.target)
        .map(|f| {
            let (a, b) = (f.source.as_str(), f.target.as_str());
            if a < b {
                (a, b)
            } else {
                (b, a)
            }
        })
        .collect()
}

/// Score every cluster. Clusters are never dropped; degenerate ones carry a
/// warning.
pub fn score_clusters(
    clusters: &[MarketCluster],
    observations: &[TimeSeriesObservation],
    flows: &[Flow],
    geometry: &GeometryIndex,
    config: &AnalyticsConfig,
) -> Vec<ClusterMetrics> {
    let data = MarketData::new(observations);
    let links = flow_links(flows);

    clusters
        .iter()
        .map(|cluster| score_with(cluster, &data, &links, geometry, config))
        .collect()
}

/// Score a single market cluster
///
/// # Arguments
/// * `cluster` - Scored over its connected markets
/// * `observations` - Time series of every region (non-members are ignored)
/// * `flows` - Flows used for the connectivity sub-score
/// * `geometry` - Used for the coverage part of reliability
///
/// # Returns
/// Fully populated metrics; a cluster with fewer than two connected markets yields
/// zeroed metrics and a warning.
pub fn score_cluster(
    cluster: &MarketCluster,
    observations: &[TimeSeriesObservation],
    flows: &[Flow],
    geometry: &GeometryIndex,
    config: &AnalyticsConfig,
) -> ClusterMetrics {
    let data = MarketData::new(observations);
    let links = flow_links(flows);
    score_with(cluster, &data, &links, geometry, config)
}

fn score_with(
    cluster: &MarketCluster,
    data: &MarketData<'_>,
    links: &HashSet<(&str, &str)>,
    geometry: &GeometryIndex,
    config: &AnalyticsConfig,
) -> ClusterMetrics {
    let markets: Vec<&String> = cluster.connected_markets.iter().collect();
    let n = markets.len();

    if n < 2 {
        tracing::warn!(
            cluster = %cluster.cluster_id,
            markets = n,
            "Cluster has fewer than 2 connected markets"
        );
        return ClusterMetrics {
            cluster_id: cluster.cluster_id.clone(),
            main_market: cluster.main_market.clone(),
            market_count: n,
            warning: Some("fewer than 2 connected markets in cluster".to_string()),
            ..Default::default()
        };
    }

    let mut warnings = Vec::new();

    // Connectivity
    let possible_pairs = n * (n - 1) / 2;
    let mut connected_pairs = 0usize;
    for (i, a) in markets.iter().enumerate() {
        for b in &markets[i + 1..] {
            // markets are sorted so (a, b) is already the canonical order
            if links.contains(&(a.as_str(), b.as_str())) {
                connected_pairs += 1;
            }
        }
    }
    let connectivity = connected_pairs as f64 / possible_pairs as f64;

    // Price integration
    let with_series: Vec<(&str, &BTreeMap<NaiveDate, f64>)> = markets
        .iter()
        .filter_map(|m| data.monthly_prices.get(m.as_str()).map(|s| (m.as_str(), s)))
        .collect();

    let mut total_pairs = 0usize;
    let mut significant_pairs = 0usize;
    let mut integration_sum = 0.0;

    for (i, (_, series_a)) in with_series.iter().enumerate() {
        for (_, series_b) in &with_series[i + 1..] {
            total_pairs += 1;

            let (xs, ys): (Vec<f64>, Vec<f64>) = series_a
                .iter()
                .filter_map(|(month, a)| series_b.get(month).map(|b| (*a, *b)))
                .unzip();
            if xs.len() < config.min_correlation_samples {
                continue;
            }
            let Some(r) = pearson_correlation(&xs, &ys) else {
                continue;
            };
            if correlation_p_value(r, xs.len()) <= config.correlation_significance {
                significant_pairs += 1;
                integration_sum += (r + 1.0) / 2.0;
            }
        }
    }

    let price_integration = if significant_pairs > 0 {
        integration_sum / significant_pairs as f64
    } else {
        0.0
    };

    // Stability
    let stabilities: Vec<f64> = with_series
        .iter()
        .filter_map(|(_, series)| {
            let prices: Vec<f64> = series.values().copied().collect();
            coefficient_of_variation(&prices).map(|cv| 1.0 - cv.min(1.0))
        })
        .collect();
    let stability = mean(&stabilities).unwrap_or(0.0);

    // Averages over every member observation
    let member_observations: Vec<&TimeSeriesObservation> = markets
        .iter()
        .filter_map(|m| data.observations.get(m.as_str()))
        .flatten()
        .copied()
        .collect();

    let prices: Vec<f64> = member_observations
        .iter()
        .map(|o| o.price)
        .filter(|p| p.is_finite())
        .collect();
    let conflicts: Vec<f64> = member_observations
        .iter()
        .map(|o| o.conflict_intensity)
        .filter(|c| c.is_finite())
        .collect();

    let avg_price = mean(&prices).unwrap_or(0.0);
    let avg_conflict = mean(&conflicts).unwrap_or(0.0);

    let conflict_resilience = if conflicts.is_empty() {
        warnings.push("no conflict data for cluster markets");
        0.0
    } else {
        (1.0 - avg_conflict / config.conflict_intensity_scale).clamp(0.0, 1.0)
    };

    // Reliability
    let covered = markets
        .iter()
        .filter(|m| data.monthly_prices.contains_key(m.as_str()) && geometry.coordinates(m).is_some())
        .count();
    let coverage = covered as f64 / n as f64;
    let volume = (member_observations.len() as f64 / RELIABLE_DATA_POINTS).min(1.0);
    let significance_ratio = if total_pairs > 0 {
        significant_pairs as f64 / total_pairs as f64
    } else {
        0.0
    };
    let reliability = ((volume + coverage + significance_ratio) / 3.0).clamp(0.0, 1.0);

    if with_series.len() < n {
        warnings.push("some markets have no price data");
    }

    let components = EfficiencyComponents {
        connectivity,
        price_integration,
        stability,
        conflict_resilience,
    };

    tracing::debug!(
        cluster = %cluster.cluster_id,
        markets = n,
        connectivity = connectivity,
        price_integration = price_integration,
        significant_pairs = significant_pairs,
        total_pairs = total_pairs,
        "Scored market cluster"
    );

    ClusterMetrics {
        cluster_id: cluster.cluster_id.clone(),
        main_market: cluster.main_market.clone(),
        efficiency: components.composite(),
        components,
        avg_price,
        avg_conflict,
        market_count: n,
        reliability,
        significant_pairs,
        total_pairs,
        warning: (!warnings.is_empty()).then(|| warnings.join("; ")),
    }
}
