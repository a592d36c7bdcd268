// Unit tests for analytics configuration

use std::collections::HashMap;

use market_spatial_analytics::config::{AnalyticsConfig, PValueMethod};

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_partial_json_falls_back_to_defaults() {
    let config: AnalyticsConfig =
        serde_json::from_str(r#"{"top_flows": 5, "p_value_method": "exact"}"#).unwrap();

    assert_eq!(config.top_flows, 5);
    assert_eq!(config.p_value_method, PValueMethod::Exact);
    assert!((config.significance_level - 0.05).abs() < f64::EPSILON);
    assert_eq!(config.keyed_cache_capacity, 32);
    assert!(config.validate().is_ok());
}

#[test]
fn test_environment_overrides_are_validated() {
    let config = AnalyticsConfig::from_lookup(lookup(&[
        ("ANALYTICS_CONFLICT_SCALE", "5"),
        ("ANALYTICS_P_VALUE_METHOD", "approximate"),
    ]))
    .unwrap();
    assert!((config.conflict_intensity_scale - 5.0).abs() < f64::EPSILON);
    assert_eq!(config.p_value_method, PValueMethod::AbramowitzStegun);

    let err = AnalyticsConfig::from_lookup(lookup(&[("ANALYTICS_TOP_FLOWS", "25")])).unwrap_err();
    assert_eq!(err.error_type(), "config");
    assert!(err.to_string().contains("top_flows"));

    let err = AnalyticsConfig::from_lookup(lookup(&[("ANALYTICS_P_VALUE_METHOD", "bootstrap")])).unwrap_err();
    assert_eq!(err.error_type(), "config");
}

#[test]
fn test_config_round_trips_through_json() {
    let config = AnalyticsConfig {
        correlation_significance: 0.2,
        ..Default::default()
    };
    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"p_value_method\":\"abramowitz_stegun\""));

    let parsed: AnalyticsConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);
}
