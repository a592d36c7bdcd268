// Integration tests for the memoized derived state

use std::sync::Arc;

use market_spatial_analytics::analytics::{FlowFilter, FlowMetric, Granularity, RegressionResult};
use market_spatial_analytics::feeds::TimeSeriesObservation;
use market_spatial_analytics::{AnalyticsConfig, DerivedState, Selection};

use crate::common::{self, month};

#[test]
fn test_identical_inputs_return_same_results() {
    let state = DerivedState::default();
    let selection = Selection::default();

    let first = state.refresh(&common::inputs(), &selection);
    let second = state.refresh(&common::inputs(), &selection);

    assert!(Arc::ptr_eq(&first.weights, &second.weights));
    assert!(Arc::ptr_eq(&first.global_moran, &second.global_moran));
    assert!(Arc::ptr_eq(&first.local_moran, &second.local_moran));
    assert!(Arc::ptr_eq(&first.clusters, &second.clusters));
    assert!(Arc::ptr_eq(&first.filtered_flows, &second.filtered_flows));
    assert!(Arc::ptr_eq(&first.flow_network, &second.flow_network));
    assert!(Arc::ptr_eq(&first.flow_buckets, &second.flow_buckets));
    assert!(Arc::ptr_eq(&first.centrality, &second.centrality));
    assert!(Arc::ptr_eq(&first.regression, &second.regression));
}

#[test]
fn test_changed_observation_recomputes_dependents_only() {
    let state = DerivedState::default();
    let selection = Selection::default();
    let first = state.refresh(&common::inputs(), &selection);

    let mut changed = common::inputs();
    let mut observations = common::observations();
    observations[0] = TimeSeriesObservation::new("aden", month(1), 9.0, 2.0);
    changed.observations = Arc::new(observations);
    let second = state.refresh(&changed, &selection);

    // same region set, same geometry
    assert!(Arc::ptr_eq(&first.weights, &second.weights));
    assert!(!Arc::ptr_eq(&first.global_moran, &second.global_moran));
    assert!(!Arc::ptr_eq(&first.clusters, &second.clusters));
    // flows are untouched
    assert!(Arc::ptr_eq(&first.flow_network, &second.flow_network));
    assert!(Arc::ptr_eq(&first.centrality, &second.centrality));
    assert!(Arc::ptr_eq(&first.regression, &second.regression));
}

#[test]
fn test_month_selection_is_keyed() {
    let state = DerivedState::default();
    let inputs = common::inputs();
    let january = Selection {
        month: Some(month(1)),
        ..Default::default()
    };
    let february = Selection {
        month: Some(month(2)),
        ..Default::default()
    };

    let jan_first = state.global_moran(&inputs, &january);
    let feb = state.global_moran(&inputs, &february);
    let jan_again = state.global_moran(&common::inputs(), &january);

    assert!(!Arc::ptr_eq(&jan_first, &feb));
    assert!(Arc::ptr_eq(&jan_first, &jan_again));
}

#[test]
fn test_granularity_change_keeps_network_metrics() {
    let state = DerivedState::default();
    let inputs = common::inputs();

    let monthly = state.refresh(&inputs, &Selection::default());
    let daily = state.refresh(
        &inputs,
        &Selection {
            granularity: Granularity::Day,
            ..Default::default()
        },
    );

    assert!(Arc::ptr_eq(&monthly.flow_network, &daily.flow_network));
    assert!(!Arc::ptr_eq(&monthly.flow_buckets, &daily.flow_buckets));
    assert_eq!(monthly.flow_buckets.len(), 2);
    assert_eq!(daily.flow_buckets.len(), 4);
}

#[test]
fn test_filter_change_isolated_to_flow_nodes() {
    let state = DerivedState::default();
    let first = state.refresh(&common::inputs(), &Selection::default());

    let filtered = common::inputs().with_flow_filter(FlowFilter::new(FlowMetric::TotalFlow, 50.0));
    let second = state.refresh(&filtered, &Selection::default());

    assert!(Arc::ptr_eq(&first.global_moran, &second.global_moran));
    assert!(Arc::ptr_eq(&first.clusters, &second.clusters));
    assert!(!Arc::ptr_eq(&first.flow_network, &second.flow_network));
    assert_eq!(second.filtered_flows.len(), 2);
    assert_eq!(second.flow_network.flow_count, 2);
}

#[test]
fn test_regression_node_tracks_result() {
    let state = DerivedState::default();
    let first = state.refresh(&common::inputs(), &Selection::default());
    assert!(first.regression.warning.is_some());

    let result = RegressionResult {
        r_squared: 0.42,
        ..Default::default()
    };
    let second = state.refresh(&common::inputs().with_regression(result), &Selection::default());

    assert!(!Arc::ptr_eq(&first.regression, &second.regression));
    assert!(Arc::ptr_eq(&first.global_moran, &second.global_moran));
    assert!((second.regression.r_squared - 0.42).abs() < f64::EPSILON);
}

#[test]
fn test_daily_flows_keyed_by_date() {
    let state = DerivedState::default();
    let inputs = common::inputs();

    let third = state.daily_flows(&inputs, common::day(1, 3));
    let again = state.daily_flows(&common::inputs(), common::day(1, 3));

    assert_eq!(third.len(), 2);
    assert!(Arc::ptr_eq(&third, &again));
    assert!(state.daily_flows(&inputs, common::day(3, 1)).is_empty());
}

#[test]
fn test_concurrent_refresh_shares_results() {
    let state = DerivedState::new(AnalyticsConfig::default());
    let selection = Selection::default();

    let snapshots: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| state.refresh(&common::inputs(), &selection)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for snapshot in &snapshots[1..] {
        assert!(Arc::ptr_eq(&snapshots[0].global_moran, &snapshot.global_moran));
        assert!(Arc::ptr_eq(&snapshots[0].clusters, &snapshot.clusters));
    }

    let weights = state.stats().into_iter().find(|s| s.name == "weights").unwrap();
    assert_eq!(weights.misses, 1);
}

#[test]
fn test_invalidate_all_forces_recompute() {
    let state = DerivedState::default();
    let first = state.refresh(&common::inputs(), &Selection::default());
    state.invalidate_all();
    let second = state.refresh(&common::inputs(), &Selection::default());

    assert!(!Arc::ptr_eq(&first.weights, &second.weights));
    assert_eq!(*first.global_moran, *second.global_moran);
}
