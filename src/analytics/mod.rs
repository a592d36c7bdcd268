//! Derived spatial-market analytics
//!
//! This module provides the statistical engines over regional market data:
//! - Spatial autocorrelation (global and local Moran's I)
//! - Market cluster efficiency scoring
//! - Flow network statistics and time buckets
//! - Degree and betweenness centrality
//! - Regression result consumption

pub mod autocorrelation;
pub mod centrality;
pub mod efficiency;
pub mod flow;
pub mod regression;
pub mod stats;
pub mod types;

pub use autocorrelation::{
    global_moran_i, global_moran_i_with, local_moran_i, local_moran_i_with,
    moran_values_for_month,
};
pub use centrality::{betweenness_centrality, compute_centrality, degree_centrality};
pub use efficiency::{score_cluster, score_clusters};
pub use flow::{
    aggregate_flows, analyze_flow_network, filter_flows, flows_on, network_statistics, top_flows,
    FlowFilter, FlowMetric, Granularity,
};
pub use regression::{
    summarize_regression, summarize_regression_with, RegressionResult, RegressionSummary,
};
pub use types::*;
