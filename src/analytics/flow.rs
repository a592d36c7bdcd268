//! Flow network analysis
//!
//! Filtering, aggregate network statistics, top flows, per-region balance
//! and time bucketing of directed trade flows.

use chrono::{Datelike, NaiveDate, Weekday};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::analytics::types::{FlowBucket, FlowNetworkMetrics, RegionFlowBalance};
use crate::feeds::Flow;

/// Flow attribute used for filtering and ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FlowMetric {
    #[default]
    TotalFlow,
    AvgPriceDifferential,
    FlowCount,
}

impl FlowMetric {
    pub fn value(&self, flow: &Flow) -> f64 {
        match self {
            FlowMetric::TotalFlow => flow.total_flow,
            FlowMetric::AvgPriceDifferential => flow.avg_price_differential,
            FlowMetric::FlowCount => f64::from(flow.flow_count),
        }
    }
}

/// Keeps flows whose `metric` value is at least `threshold`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FlowFilter {
    pub metric: FlowMetric,
    pub threshold: f64,
}

impl FlowFilter {
    pub fn new(metric: FlowMetric, threshold: f64) -> Self {
        Self { metric, threshold }
    }

    pub fn accepts(&self, flow: &Flow) -> bool {
        self.metric.value(flow) >= self.threshold
    }
}

/// Time-bucket granularity for flow aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Day,
    Week,
    #[default]
    Month,
}

impl Granularity {
    /// Bucket label and first day of the bucket containing `date`
    pub fn bucket(&self, date: NaiveDate) -> (String, NaiveDate) {
        match self {
            Granularity::Day => (date.format("%Y-%m-%d").to_string(), date),
            Granularity::Week => {
                let iso = date.iso_week();
                let start = NaiveDate::from_isoywd_opt(iso.year(), iso.week(), Weekday::Mon)
                    .unwrap_or(date);
                (format!("{}-W{:02}", iso.year(), iso.week()), start)
            }
            Granularity::Month => {
                let start = date.with_day(1).unwrap_or(date);
                (date.format("%Y-%m").to_string(), start)
            }
        }
    }
}

impl std::str::FromStr for Granularity {
    type Err = crate::error::AnalyticsError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Granularity::Day),
            "week" | "weekly" => Ok(Granularity::Week),
            "month" | "monthly" => Ok(Granularity::Month),
            other => Err(crate::error::AnalyticsError::Config(format!(
                "unknown granularity: {}",
                other
            ))),
        }
    }
}

pub fn filter_flows(flows: &[Flow], filter: &FlowFilter) -> Vec<Flow> {
    flows.iter().filter(|f| filter.accepts(f)).cloned().collect()
}

/// Flows dated exactly `date`
pub fn flows_on(flows: &[Flow], date: NaiveDate) -> Vec<Flow> {
    flows.iter().filter(|f| f.date == date).cloned().collect()
}

/// First `n` flows ordered descending by `metric`; equal values keep their
/// input order.
pub fn top_flows(flows: &[Flow], metric: FlowMetric, n: usize) -> Vec<Flow> {
    let mut ranked: Vec<&Flow> = flows.iter().collect();
    ranked.sort_by(|a, b| {
        metric
            .value(b)
            .partial_cmp(&metric.value(a))
            .unwrap_or(Ordering::Equal)
    });
    ranked.into_iter().take(n).cloned().collect()
}

/// Aggregate statistics over an already-filtered set of flows
///
/// # Arguments
/// * `flows` - Flows to aggregate (no filtering is applied here)
/// * `metric` - Ranking metric for `top_flows`
/// * `top_n` - Number of top flows to report
pub fn network_statistics(flows: &[Flow], metric: FlowMetric, top_n: usize) -> FlowNetworkMetrics {
    let total_volume: f64 = flows.iter().map(|f| f.total_flow).sum();
    let flow_count = flows.len();
    let avg_flow_size = if flow_count > 0 {
        total_volume / flow_count as f64
    } else {
        0.0
    };

    let mut markets: BTreeSet<&str> = BTreeSet::new();
    let mut pairs: HashSet<(&str, &str)> = HashSet::new();
    let mut per_region: BTreeMap<String, RegionFlowBalance> = BTreeMap::new();

    for flow in flows {
        markets.insert(flow.source.as_str());
        markets.insert(flow.target.as_str());
        if flow.source != flow.target {
            pairs.insert((flow.source.as_str(), flow.target.as_str()));
        }
        per_region.entry(flow.source.clone()).or_default().outflow += flow.total_flow;
        per_region.entry(flow.target.clone()).or_default().inflow += flow.total_flow;
    }

    for balance in per_region.values_mut() {
        balance.net_flow = balance.inflow - balance.outflow;
    }

    let active_markets = markets.len();
    let flow_density = if active_markets < 2 {
        0.0
    } else {
        let possible = (active_markets * (active_markets - 1)) as f64;
        (pairs.len() as f64 / possible).clamp(0.0, 1.0)
    };

    FlowNetworkMetrics {
        total_volume,
        avg_flow_size,
        flow_count,
        active_markets,
        flow_density,
        top_flows: top_flows(flows, metric, top_n),
        per_region,
    }
}

/// Filter once, then compute every network statistic on the filtered set
pub fn analyze_flow_network(flows: &[Flow], filter: &FlowFilter, top_n: usize) -> FlowNetworkMetrics {
    let filtered = filter_flows(flows, filter);
    let metrics = network_statistics(&filtered, filter.metric, top_n);

    tracing::debug!(
        input = flows.len(),
        kept = filtered.len(),
        active_markets = metrics.active_markets,
        density = metrics.flow_density,
        "Analyzed flow network"
    );

    metrics
}

/// Bucket flows by day, ISO week or month, in chronological order
///
/// Each bucket sums `total_flow`, averages `avg_price_differential` over its
/// records and counts records.
pub fn aggregate_flows(flows: &[Flow], granularity: Granularity) -> Vec<FlowBucket> {
    struct Accumulator {
        period: String,
        total_flow: f64,
        differential_sum: f64,
        count: usize,
    }

    let mut buckets: BTreeMap<NaiveDate, Accumulator> = BTreeMap::new();

    for flow in flows {
        let (period, start) = granularity.bucket(flow.date);
        let acc = buckets.entry(start).or_insert_with(|| Accumulator {
            period,
            total_flow: 0.0,
            differential_sum: 0.0,
            count: 0,
        });
        acc.total_flow += flow.total_flow;
        acc.differential_sum += flow.avg_price_differential;
        acc.count += 1;
    }

    buckets
        .into_iter()
        .map(|(period_start, acc)| FlowBucket {
            period: acc.period,
            period_start,
            total_flow: acc.total_flow,
            avg_price_differential: acc.differential_sum / acc.count as f64,
            flow_count: acc.count,
        })
        .collect()
}
