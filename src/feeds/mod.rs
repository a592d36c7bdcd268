//! External feed ingestion
//!
//! Raw serde models of the geometry, time-series, flow and market-cluster
//! feeds, and their conversion into validated domain records. A malformed
//! record is dropped and logged; ingestion itself never fails.

pub mod records;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::analytics::regression::RegressionResult;
use crate::error::{AnalyticsError, Result};
use crate::geometry::{normalize_region_id, Coordinates, Region, WeightsPolicy};

pub use records::{Flow, MarketCluster, TimeSeriesObservation};

/// `{region_id, coordinates:[lon,lat], polygon?:[[lon,lat], ...]}`
///
/// Fields stay untyped so one mistyped record fails its own conversion
/// instead of the whole feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryRecord {
    #[serde(default)]
    pub region_id: Value,
    #[serde(default)]
    pub coordinates: Value,
    #[serde(default)]
    pub polygon: Value,
}

/// `{region, month:"YYYY-MM", usdPrice, conflictIntensity}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesRecord {
    #[serde(default)]
    pub region: Value,
    #[serde(default)]
    pub month: Value,
    #[serde(rename = "usdPrice", default)]
    pub usd_price: Value,
    #[serde(rename = "conflictIntensity", default)]
    pub conflict_intensity: Value,
}

/// `{source, target, date, total_flow, avg_price_differential, flow_count}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    #[serde(default)]
    pub source: Value,
    #[serde(default)]
    pub target: Value,
    #[serde(default)]
    pub date: Value,
    #[serde(default)]
    pub total_flow: Value,
    #[serde(default)]
    pub avg_price_differential: Value,
    #[serde(default)]
    pub flow_count: Value,
}

/// `{cluster_id, main_market, connected_markets:[region_id]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketClusterRecord {
    #[serde(default)]
    pub cluster_id: Value,
    #[serde(default)]
    pub main_market: Value,
    #[serde(default)]
    pub connected_markets: Value,
}

/// String or number identifier; anything else is empty
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn region_id(value: &Value) -> Result<String> {
    let id = normalize_region_id(&text(value));
    if id.is_empty() {
        return Err(AnalyticsError::EmptyRegionId);
    }
    Ok(id)
}

fn date_text(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(AnalyticsError::InvalidDate {
            value: other.to_string(),
            reason: "expected an ISO-8601 string".to_string(),
        }),
    }
}

/// Interpret a JSON number or numeric string
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn required_number(value: &Value, region: &str, field: &'static str) -> Result<f64> {
    numeric(value).ok_or_else(|| AnalyticsError::NonNumeric {
        region: region.to_string(),
        field,
        value: value.to_string(),
    })
}

fn optional_number(value: &Value, region: &str, field: &'static str, default: f64) -> Result<f64> {
    if value.is_null() {
        return Ok(default);
    }
    required_number(value, region, field)
}

fn coordinate_pair(region: &str, value: &[Value]) -> Result<Coordinates> {
    if value.len() != 2 {
        return Err(AnalyticsError::MalformedCoordinate {
            region: region.to_string(),
            reason: format!("expected [lon, lat], got {} components", value.len()),
        });
    }
    let lon = numeric(&value[0]).unwrap_or(f64::NAN);
    let lat = numeric(&value[1]).unwrap_or(f64::NAN);
    Coordinates::validated(region, lon, lat)
}

/// Parse `YYYY-MM` (or a full ISO date) into the first day of that month
pub fn parse_month(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    let candidate = if trimmed.len() == 7 {
        format!("{}-01", trimmed)
    } else {
        trimmed.get(..10).unwrap_or(trimmed).to_string()
    };

    NaiveDate::parse_from_str(&candidate, "%Y-%m-%d")
        .map(|d| d.with_day(1).unwrap_or(d))
        .map_err(|e| AnalyticsError::InvalidDate {
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

/// Parse an ISO-8601 date or datetime (RFC 3339, naive datetime with `T` or
/// space separator, or plain date)
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];

    let trimmed = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.date_naive());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(dt.date());
        }
    }

    // Any other time suffix: keep the calendar date
    let date_part = match trimmed.get(10..11) {
        Some("T") | Some(" ") => &trimmed[..10],
        _ => trimmed,
    };
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|e| AnalyticsError::InvalidDate {
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

impl GeometryRecord {
    /// Convert into a region. A malformed centroid is dropped (the region is
    /// kept without coordinates); malformed polygon vertices are skipped.
    pub fn to_region(&self) -> Result<Region> {
        let id = region_id(&self.region_id)?;

        let coordinates = match &self.coordinates {
            Value::Null => None,
            value => match coordinate_pair(&id, value.as_array().map(Vec::as_slice).unwrap_or(&[])) {
                Ok(c) => Some(c),
                Err(err) => {
                    tracing::warn!(region = %id, error = %err, "Dropping malformed coordinates");
                    None
                }
            },
        };

        if !self.polygon.is_null() && !self.polygon.is_array() {
            tracing::warn!(region = %id, "Dropping malformed polygon");
        }
        let polygon = self.polygon.as_array().map(|ring| {
            ring.iter()
                .filter_map(|vertex| {
                    let pair = vertex.as_array().map(Vec::as_slice).unwrap_or(&[]);
                    match coordinate_pair(&id, pair) {
                        Ok(c) => Some(c),
                        Err(err) => {
                            tracing::warn!(region = %id, error = %err, "Dropping malformed polygon vertex");
                            None
                        }
                    }
                })
                .collect::<Vec<_>>()
        });

        Ok(Region {
            id,
            coordinates,
            polygon: polygon.filter(|ring| !ring.is_empty()),
        })
    }
}

impl TimeSeriesRecord {
    /// Convert into an observation. A missing conflict intensity counts as 0;
    /// a non-numeric price or intensity rejects the record.
    pub fn to_observation(&self) -> Result<TimeSeriesObservation> {
        let region = region_id(&self.region)?;
        let month = parse_month(&date_text(&self.month)?)?;
        let price = required_number(&self.usd_price, &region, "usdPrice")?;
        let conflict = optional_number(&self.conflict_intensity, &region, "conflictIntensity", 0.0)?;

        Ok(TimeSeriesObservation {
            region,
            month,
            price,
            conflict_intensity: conflict,
        })
    }
}

impl FlowRecord {
    pub fn to_flow(&self) -> Result<Flow> {
        let source = region_id(&self.source)?;
        let target = region_id(&self.target)?;
        let date = parse_date(&date_text(&self.date)?)?;
        let total_flow = required_number(&self.total_flow, &source, "total_flow")?;
        let avg_price_differential =
            optional_number(&self.avg_price_differential, &source, "avg_price_differential", 0.0)?;
        let flow_count = optional_number(&self.flow_count, &source, "flow_count", 1.0)?;

        if flow_count < 0.0 {
            return Err(AnalyticsError::NonNumeric {
                region: source,
                field: "flow_count",
                value: flow_count.to_string(),
            });
        }

        Ok(Flow {
            source,
            target,
            date,
            total_flow,
            avg_price_differential,
            flow_count: flow_count.round().min(u32::MAX as f64) as u32,
        })
    }
}

impl MarketClusterRecord {
    pub fn to_cluster(&self) -> Result<MarketCluster> {
        let cluster_id = text(&self.cluster_id);
        if cluster_id.is_empty() {
            return Err(AnalyticsError::EmptyRegionId);
        }
        let main_market = region_id(&self.main_market)?;

        // Non-identifier members are skipped; the cluster keeps the rest
        let members = self.connected_markets.as_array().map(Vec::as_slice).unwrap_or(&[]);
        let connected: Vec<String> = members.iter().map(text).filter(|m| !m.is_empty()).collect();
        if connected.len() < members.len() {
            tracing::warn!(
                cluster = %cluster_id,
                skipped = members.len() - connected.len(),
                "Skipping malformed connected markets"
            );
        }

        Ok(MarketCluster::new(&cluster_id, &main_market, connected))
    }
}

/// Convert every record with `convert`, dropping and logging failures
fn ingest<R, T, F>(records: &[R], feed: &'static str, convert: F) -> Vec<T>
where
    F: Fn(&R) -> Result<T>,
{
    let mut dropped = 0usize;
    let converted: Vec<T> = records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| match convert(record) {
            Ok(value) => Some(value),
            Err(err) => {
                dropped += 1;
                tracing::warn!(
                    feed = feed,
                    index = index,
                    error_type = err.error_type(),
                    error = %err,
                    "Dropping malformed feed record"
                );
                None
            }
        })
        .collect();

    tracing::debug!(feed = feed, kept = converted.len(), dropped = dropped, "Ingested feed");
    converted
}

pub fn ingest_geometry(records: &[GeometryRecord]) -> Vec<Region> {
    ingest(records, "geometry", GeometryRecord::to_region)
}

/// Observations ordered by region, then month
pub fn ingest_time_series(records: &[TimeSeriesRecord]) -> Vec<TimeSeriesObservation> {
    let mut observations = ingest(records, "time_series", TimeSeriesRecord::to_observation);
    observations.sort_by(|a, b| a.region.cmp(&b.region).then(a.month.cmp(&b.month)));
    observations
}

/// Flows in feed order
pub fn ingest_flows(records: &[FlowRecord]) -> Vec<Flow> {
    ingest(records, "flows", FlowRecord::to_flow)
}

pub fn ingest_clusters(records: &[MarketClusterRecord]) -> Vec<MarketCluster> {
    ingest(records, "market_clusters", MarketClusterRecord::to_cluster)
}

/// Read a feed section row by row. Rows that are not records (a bare number,
/// `null`) are dropped; a section that is not an array reads as empty.
fn lenient_records<'de, D, R>(deserializer: D) -> std::result::Result<Vec<R>, D::Error>
where
    D: Deserializer<'de>,
    R: DeserializeOwned,
{
    let rows = match Value::deserialize(deserializer)? {
        Value::Array(rows) => rows,
        Value::Null => Vec::new(),
        other => {
            tracing::warn!(value = %other, "Feed section is not an array, ignoring it");
            Vec::new()
        }
    };

    Ok(rows
        .into_iter()
        .enumerate()
        .filter_map(|(index, row)| match serde_json::from_value(row) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(index = index, error = %err, "Dropping unreadable feed record");
                None
            }
        })
        .collect())
}

/// Optional section that reads as absent when malformed
fn lenient_optional<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(value) {
        Ok(section) => Ok(Some(section)),
        Err(err) => {
            tracing::warn!(error = %err, "Dropping malformed feed section");
            Ok(None)
        }
    }
}

/// Every feed in one JSON document; all sections optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedBundle {
    #[serde(deserialize_with = "lenient_records")]
    pub geometry: Vec<GeometryRecord>,
    #[serde(deserialize_with = "lenient_records")]
    pub time_series: Vec<TimeSeriesRecord>,
    #[serde(deserialize_with = "lenient_records")]
    pub flows: Vec<FlowRecord>,
    #[serde(deserialize_with = "lenient_records")]
    pub market_clusters: Vec<MarketClusterRecord>,
    #[serde(deserialize_with = "lenient_optional")]
    pub regression: Option<RegressionResult>,
    #[serde(deserialize_with = "lenient_optional")]
    pub weights_policy: Option<WeightsPolicy>,
}

impl FeedBundle {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Validate every feed into the inputs of the derived-state cache
    pub fn into_inputs(self) -> crate::cache::AnalyticsInputs {
        let mut inputs = crate::cache::AnalyticsInputs::new(
            crate::geometry::GeometryIndex::from_feed(&self.geometry),
            ingest_time_series(&self.time_series),
            ingest_flows(&self.flows),
            ingest_clusters(&self.market_clusters),
        )
        .with_weights_policy(self.weights_policy.unwrap_or_default());
        if let Some(regression) = self.regression {
            inputs = inputs.with_regression(regression);
        }
        inputs
    }
}
