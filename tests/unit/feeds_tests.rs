// Unit tests for feed bundle loading

use std::io::Write;

use market_spatial_analytics::feeds::FeedBundle;
use market_spatial_analytics::geometry::WeightsPolicy;
use serde_json::json;

#[test]
fn test_load_bundle_from_file() {
    let bundle = json!({
        "geometry": [
            {"region_id": "Sana'a", "coordinates": [44.2, 15.35],
             "polygon": [[44.0, 15.0], [44.5, 15.0], [44.5, 15.5]]},
            {"region_id": "Amran", "coordinates": [43.94, 95.0]}
        ],
        "time_series": [
            {"region": "Sana'a", "month": "2024-02", "usdPrice": 3.1, "conflictIntensity": 4}
        ],
        "weights_policy": {"type": "shared_border"}
    });

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", bundle).unwrap();

    let loaded = FeedBundle::load(file.path()).unwrap();
    assert_eq!(loaded.geometry.len(), 2);
    assert_eq!(loaded.weights_policy, Some(WeightsPolicy::SharedBorder));

    let inputs = loaded.into_inputs();
    assert_eq!(inputs.weights_policy, WeightsPolicy::SharedBorder);
    assert_eq!(inputs.observations[0].region, "sana'a");
    // latitude out of range: region kept, coordinates dropped
    assert!(inputs.geometry.contains("amran"));
    assert!(inputs.geometry.coordinates("amran").is_none());
    assert!(inputs.regression.is_none());
}

#[test]
fn test_missing_weights_policy_uses_default() {
    let inputs = FeedBundle::from_json_str("{}").unwrap().into_inputs();
    assert_eq!(inputs.weights_policy, WeightsPolicy::default());
    assert!(inputs.flows.is_empty());
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = FeedBundle::load(dir.path().join("absent.json")).unwrap_err();
    assert_eq!(err.error_type(), "io");
    assert!(!err.is_record_level());
}

#[test]
fn test_malformed_bundle_is_json_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{\"flows\": [").unwrap();

    let err = FeedBundle::load(file.path()).unwrap_err();
    assert_eq!(err.error_type(), "json");
}

#[test]
fn test_mistyped_record_drops_only_itself() {
    let bundle = json!({
        "geometry": [
            {"region_id": "Aden", "coordinates": [45.03, 12.78]},
            {"region_id": null, "coordinates": [44.88, 13.05]},
            {"region_id": "Lahj", "coordinates": "44.88,13.05"},
            7
        ],
        "time_series": [
            {"region": "Aden", "month": "2024-01", "usdPrice": 1.2, "conflictIntensity": 2},
            {"region": "Aden", "month": 202401, "usdPrice": 1.3, "conflictIntensity": 2},
            {"region": null, "month": "2024-02", "usdPrice": 1.4}
        ],
        "flows": [
            {"source": "Aden", "target": "Lahj", "date": "2024-01-15 10:30:00", "total_flow": 10},
            {"source": ["Aden"], "target": "Lahj", "date": "2024-01-16", "total_flow": 4},
            {"source": "Aden", "target": "Lahj", "date": 20240117, "total_flow": 4}
        ],
        "market_clusters": [
            {"cluster_id": "south", "main_market": "Aden", "connected_markets": ["Aden", 42, "Lahj", null]},
            {"cluster_id": "bad", "main_market": {"id": "Aden"}, "connected_markets": ["Lahj"]}
        ],
        "regression": {"r_squared": "high"},
        "weights_policy": "nearest"
    });

    let loaded = FeedBundle::from_json_str(&bundle.to_string()).unwrap();
    assert_eq!(loaded.geometry.len(), 3);
    assert!(loaded.regression.is_none());
    assert!(loaded.weights_policy.is_none());

    let inputs = loaded.into_inputs();
    assert_eq!(inputs.geometry.len(), 2);
    assert!(inputs.geometry.coordinates("aden").is_some());
    assert!(inputs.geometry.coordinates("lahj").is_none());

    assert_eq!(inputs.observations.len(), 1);
    assert_eq!(inputs.observations[0].region, "aden");

    assert_eq!(inputs.flows.len(), 1);
    assert!((inputs.flows[0].total_flow - 10.0).abs() < f64::EPSILON);

    assert_eq!(inputs.clusters.len(), 1);
    let members: Vec<&str> = inputs.clusters[0].connected_markets.iter().map(String::as_str).collect();
    assert_eq!(members, vec!["42", "aden", "lahj"]);
    assert_eq!(inputs.weights_policy, WeightsPolicy::default());
}

#[test]
fn test_non_array_section_reads_as_empty() {
    let bundle = json!({
        "flows": {"source": "Aden"},
        "time_series": [
            {"region": "Aden", "month": "2024-01", "usdPrice": 1.2}
        ]
    });

    let inputs = FeedBundle::from_json_str(&bundle.to_string()).unwrap().into_inputs();
    assert!(inputs.flows.is_empty());
    assert_eq!(inputs.observations.len(), 1);
}
