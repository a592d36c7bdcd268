//! Validated domain records produced by feed ingestion

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::geometry::normalize_region_id;

/// One month of price and conflict observations for a region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesObservation {
    pub region: String,

    /// First day of the observed month
    pub month: NaiveDate,

    /// Commodity price in USD
    pub price: f64,

    pub conflict_intensity: f64,
}

impl TimeSeriesObservation {
    pub fn new(region: &str, month: NaiveDate, price: f64, conflict_intensity: f64) -> Self {
        Self {
            region: normalize_region_id(region),
            month,
            price,
            conflict_intensity,
        }
    }
}

/// A directed, dated trade flow between two regions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Flow {
    pub source: String,
    pub target: String,
    pub date: NaiveDate,
    pub total_flow: f64,
    pub avg_price_differential: f64,
    pub flow_count: u32,
}

impl Flow {
    pub fn new(source: &str, target: &str, date: NaiveDate, total_flow: f64) -> Self {
        Self {
            source: normalize_region_id(source),
            target: normalize_region_id(target),
            date,
            total_flow,
            avg_price_differential: 0.0,
            flow_count: 1,
        }
    }

    pub fn with_price_differential(mut self, avg_price_differential: f64) -> Self {
        self.avg_price_differential = avg_price_differential;
        self
    }

    pub fn with_flow_count(mut self, flow_count: u32) -> Self {
        self.flow_count = flow_count;
        self
    }
}

/// A market cluster produced upstream: a main market and its connected markets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MarketCluster {
    pub cluster_id: String,
    pub main_market: String,

    /// Scored members. The main market only counts when listed here.
    pub connected_markets: BTreeSet<String>,
}

impl MarketCluster {
    pub fn new<I, S>(cluster_id: &str, main_market: &str, connected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            cluster_id: cluster_id.to_string(),
            main_market: normalize_region_id(main_market),
            connected_markets: connected
                .into_iter()
                .map(|m| normalize_region_id(m.as_ref()))
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }
}
