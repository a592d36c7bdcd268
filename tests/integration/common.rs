// Shared fixtures for integration tests

use chrono::NaiveDate;
use market_spatial_analytics::feeds::{Flow, MarketCluster, TimeSeriesObservation};
use market_spatial_analytics::geometry::{Coordinates, GeometryIndex, Region};
use market_spatial_analytics::AnalyticsInputs;

pub fn month(m: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, m, 1).unwrap()
}

pub fn day(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, m, d).unwrap()
}

/// Six markets in two spatial groups roughly 40 km apart internally and
/// several hundred km apart from each other
pub fn geometry() -> GeometryIndex {
    let points = [
        ("aden", 45.03, 12.78),
        ("lahj", 44.88, 13.05),
        ("abyan", 45.35, 13.10),
        ("sanaa", 44.20, 15.35),
        ("amran", 43.94, 15.66),
        ("dhamar", 44.40, 14.55),
    ];
    GeometryIndex::from_regions(
        points
            .iter()
            .map(|(id, lon, lat)| Region::new(id, Some(Coordinates { lon: *lon, lat: *lat })))
            .collect(),
    )
}

/// Southern markets are cheap, northern markets expensive
pub fn observations() -> Vec<TimeSeriesObservation> {
    let mut rows = Vec::new();
    for m in 1..=6u32 {
        let drift = m as f64 * 0.1;
        for (region, base, conflict) in [
            ("aden", 1.0, 2.0),
            ("lahj", 1.1, 3.0),
            ("abyan", 1.05, 2.5),
            ("sanaa", 3.0, 6.0),
            ("amran", 3.2, 7.0),
            ("dhamar", 2.9, 5.0),
        ] {
            rows.push(TimeSeriesObservation::new(region, month(m), base + drift, conflict));
        }
    }
    rows
}

pub fn flows() -> Vec<Flow> {
    vec![
        Flow::new("aden", "lahj", day(1, 3), 120.0).with_price_differential(0.1),
        Flow::new("lahj", "abyan", day(1, 3), 40.0).with_price_differential(0.2),
        Flow::new("aden", "sanaa", day(1, 17), 15.0).with_price_differential(2.0),
        Flow::new("sanaa", "amran", day(2, 2), 60.0).with_price_differential(0.3),
        Flow::new("dhamar", "sanaa", day(2, 20), 25.0).with_price_differential(0.4),
    ]
}

pub fn clusters() -> Vec<MarketCluster> {
    vec![
        MarketCluster::new("south", "aden", ["aden", "lahj", "abyan"]),
        MarketCluster::new("north", "sanaa", ["sanaa", "amran", "dhamar"]),
    ]
}

/// A freshly allocated, structurally identical set of inputs on every call
pub fn inputs() -> AnalyticsInputs {
    AnalyticsInputs::new(geometry(), observations(), flows(), clusters())
}
