// End-to-end statistical properties of the derived analytics

use std::collections::BTreeMap;

use market_spatial_analytics::analytics::{
    aggregate_flows, analyze_flow_network, global_moran_i, score_clusters, ClusterType,
    FlowFilter, Granularity,
};
use market_spatial_analytics::feeds::{FeedBundle, Flow, MarketCluster};
use market_spatial_analytics::geometry::{build_weights, GeometryIndex, SpatialWeightsMatrix, WeightsPolicy};
use market_spatial_analytics::{AnalyticsConfig, DerivedState, Selection};
use serde_json::json;

use crate::common::{self, day};

#[test]
fn test_constant_values_on_precomputed_weights() {
    let mut rows: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    rows.entry("A".into()).or_default().insert("B".into(), 1.0);
    rows.entry("B".into()).or_default().insert("A".into(), 1.0);
    rows.entry("B".into()).or_default().insert("C".into(), 1.0);
    rows.entry("C".into()).or_default().insert("B".into(), 1.0);

    let policy = WeightsPolicy::Precomputed {
        matrix: SpatialWeightsMatrix::from_rows(rows),
    };
    let weights = build_weights(&GeometryIndex::default(), &[], &policy);
    assert_eq!(weights.len(), 3);

    let values: BTreeMap<String, f64> = ["a", "b", "c"].iter().map(|r| (r.to_string(), 10.0)).collect();
    let stat = global_moran_i(&values, &weights);

    assert!(stat.moran_i.abs() < 1e-12);
    assert_eq!(stat.p_value, 1.0);
    assert_eq!(stat.z_score, 0.0);
}

#[test]
fn test_regional_price_gap_is_positively_autocorrelated() {
    let state = DerivedState::default();
    let snapshot = state.refresh(&common::inputs(), &Selection::default());

    assert_eq!(snapshot.global_moran.observations, 6);
    assert!(snapshot.global_moran.moran_i > 0.0);
    assert!(snapshot.global_moran.z_score > 0.0);
    assert!(snapshot.global_moran.p_value >= 0.0 && snapshot.global_moran.p_value <= 1.0);

    let local = &snapshot.local_moran;
    assert_eq!(local.statistics.len(), 6);
    assert_eq!(local.summary.total(), 6);
    for stat in local.statistics.values() {
        assert_eq!(stat.cluster_type == ClusterType::NotSignificant, stat.p_value > 0.05);
        if stat.cluster_type != ClusterType::NotSignificant {
            assert!(matches!(stat.cluster_type, ClusterType::HighHigh | ClusterType::LowLow));
        }
    }
}

#[test]
fn test_two_of_three_links_present() {
    let date = day(1, 1);
    let clusters = vec![MarketCluster::new("c", "hub", ["a", "b", "c"])];
    let flows = vec![Flow::new("a", "b", date, 1.0), Flow::new("c", "a", date, 1.0)];

    let metrics = score_clusters(&clusters, &[], &flows, &GeometryIndex::default(), &AnalyticsConfig::default());
    assert!((metrics[0].components.connectivity - 0.667).abs() < 1e-3);
}

#[test]
fn test_efficiency_formula_holds_for_every_cluster() {
    let metrics = score_clusters(
        &common::clusters(),
        &common::observations(),
        &common::flows(),
        &common::geometry(),
        &AnalyticsConfig::default(),
    );
    assert_eq!(metrics.len(), 2);

    for m in &metrics {
        let c = m.components;
        let expected = 0.4 * c.connectivity + 0.3 * c.price_integration + 0.2 * c.stability + 0.1 * c.conflict_resilience;
        assert!((m.efficiency - expected).abs() < 1e-9);
        for part in [c.connectivity, c.price_integration, c.stability, c.conflict_resilience, m.reliability] {
            assert!((0.0..=1.0).contains(&part));
        }
    }

    let south = &metrics[0];
    // aden-lahj and lahj-abyan out of three pairs
    assert!((south.components.connectivity - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(south.total_pairs, 3);
    assert!((south.avg_conflict - 2.5).abs() < 1e-9);
}

#[test]
fn test_same_day_flows_aggregate() {
    let flows = vec![Flow::new("A", "B", day(1, 5), 10.0), Flow::new("A", "B", day(1, 5), 5.0)];
    let buckets = aggregate_flows(&flows, Granularity::Day);

    assert_eq!(buckets.len(), 1);
    assert!((buckets[0].total_flow - 15.0).abs() < f64::EPSILON);
    assert_eq!(buckets[0].flow_count, 2);
}

#[test]
fn test_monthly_buckets_equal_daily_rollup() {
    let flows = common::flows();
    let daily = aggregate_flows(&flows, Granularity::Day);
    let monthly = aggregate_flows(&flows, Granularity::Month);

    for bucket in &monthly {
        let members: Vec<_> = daily.iter().filter(|d| d.period.starts_with(&bucket.period)).collect();
        let total: f64 = members.iter().map(|d| d.total_flow).sum();
        let count: usize = members.iter().map(|d| d.flow_count).sum();
        let differential: f64 = members
            .iter()
            .map(|d| d.avg_price_differential * d.flow_count as f64)
            .sum::<f64>()
            / count as f64;

        assert!((bucket.total_flow - total).abs() < 1e-9);
        assert_eq!(bucket.flow_count, count);
        assert!((bucket.avg_price_differential - differential).abs() < 1e-9);
    }
}

#[test]
fn test_flow_density_bounds() {
    let metrics = analyze_flow_network(&common::flows(), &FlowFilter::default(), 10);
    assert!((0.0..=1.0).contains(&metrics.flow_density));
    assert_eq!(metrics.active_markets, 6);
    assert_eq!(metrics.top_flows[0].total_flow, 120.0);

    // every ordered pair present, some twice
    let date = day(1, 1);
    let mut complete = Vec::new();
    for a in ["x", "y", "z"] {
        for b in ["x", "y", "z"] {
            if a != b {
                complete.push(Flow::new(a, b, date, 1.0));
                complete.push(Flow::new(a, b, date, 2.0));
            }
        }
    }
    let metrics = analyze_flow_network(&complete, &FlowFilter::default(), 10);
    assert!((metrics.flow_density - 1.0).abs() < f64::EPSILON);

    let single = analyze_flow_network(&[], &FlowFilter::default(), 10);
    assert_eq!(single.flow_density, 0.0);
}

#[test]
fn test_bundle_to_presentation_json() {
    let bundle = json!({
        "geometry": [
            {"region_id": "Aden Governorate", "coordinates": [45.03, 12.78]},
            {"region_id": "Lahj", "coordinates": [44.88, 13.05]},
            {"region_id": "Abyan", "coordinates": [45.35, 13.10]}
        ],
        "time_series": [
            {"region": "aden", "month": "2024-01", "usdPrice": 1.0, "conflictIntensity": 2},
            {"region": "lahj", "month": "2024-01", "usdPrice": "1.4", "conflictIntensity": 3},
            {"region": "abyan", "month": "2024-01", "usdPrice": 2.2, "conflictIntensity": 1},
            {"region": "abyan", "month": "2024-01", "usdPrice": "bad", "conflictIntensity": 1}
        ],
        "flows": [
            {"source": "Aden", "target": "Lahj", "date": "2024-01-04T08:00:00Z",
             "total_flow": 12, "avg_price_differential": 0.4, "flow_count": 2}
        ],
        "market_clusters": [
            {"cluster_id": 1, "main_market": "Aden", "connected_markets": ["Aden", "Lahj", "Abyan"]}
        ],
        "regression": {
            "coefficients": {"conflict": 0.2},
            "p_values": {"conflict": 0.01},
            "r_squared": 0.6,
            "residuals": [{"region_id": "Aden", "date": "2024-01-01", "residual": 0.1}],
            "moran_i": {"I": 0.05, "p-value": 0.4}
        }
    });

    let inputs = FeedBundle::from_json_str(&bundle.to_string()).unwrap().into_inputs();
    assert_eq!(inputs.observations.len(), 3);
    assert!(inputs.geometry.contains("aden"));

    let snapshot = DerivedState::default().refresh(&inputs, &Selection::default());

    let global = serde_json::to_value(&*snapshot.global_moran).unwrap();
    assert!(global.get("moranI").is_some());
    assert!(global.get("pValue").is_some());

    let clusters = serde_json::to_value(&*snapshot.clusters).unwrap();
    assert_eq!(clusters[0]["clusterId"], "1");
    assert!(clusters[0]["components"].get("priceIntegration").is_some());

    let network = serde_json::to_value(&*snapshot.flow_network).unwrap();
    assert_eq!(network["flowCount"], 1);
    assert!(network["perRegion"].get("lahj").is_some());

    assert!((snapshot.regression.r_squared - 0.6).abs() < f64::EPSILON);
    assert!(snapshot.regression.coefficients[0].significant);
}
