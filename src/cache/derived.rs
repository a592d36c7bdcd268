//! Dependency-ordered derived state
//!
//! ```text
//! geometry + regions + policy ─▶ weights ─┬─▶ global Moran  (per month/field)
//!                                         ├─▶ local Moran   (per month/field)
//!                                         └─▶ regression summary
//! clusters + observations + flows ───────────▶ cluster efficiency
//! flows + filter ─▶ filtered flows ─┬─▶ network metrics
//!                                   ├─▶ buckets (per granularity)
//!                                   ├─▶ centrality
//!                                   └─▶ daily flows (per date)
//! ```
//!
//! Nodes downstream of another node compare that node's `Arc` by pointer:
//! an upstream hit hands back the same `Arc`, so pointer equality is exact
//! there. Every other input is compared by value.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::{CacheStats, KeyedMemo, Memo};
use crate::analytics::flow::{
    aggregate_flows, filter_flows, flows_on, network_statistics, FlowFilter, FlowMetric,
    Granularity,
};
use crate::analytics::regression::{summarize_regression_with, RegressionResult, RegressionSummary};
use crate::analytics::types::{
    CentralityMetrics, ClusterMetrics, FlowBucket, FlowNetworkMetrics, GlobalMoranStatistic,
    LocalMoranResult, ValueField,
};
use crate::analytics::{
    compute_centrality, global_moran_i_with, local_moran_i_with, moran_values_for_month,
    score_clusters,
};
use crate::config::AnalyticsConfig;
use crate::feeds::{Flow, MarketCluster, TimeSeriesObservation};
use crate::geometry::{build_weights, GeometryIndex, SpatialWeightsMatrix, WeightsPolicy};

/// Raw inputs of one update cycle
///
/// Compared by value: a structurally identical set of freshly allocated
/// inputs reuses every cached result.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalyticsInputs {
    pub geometry: Arc<GeometryIndex>,
    pub observations: Arc<Vec<TimeSeriesObservation>>,
    pub flows: Arc<Vec<Flow>>,
    pub clusters: Arc<Vec<MarketCluster>>,
    pub weights_policy: WeightsPolicy,
    pub flow_filter: FlowFilter,
    pub regression: Option<Arc<RegressionResult>>,
}

impl AnalyticsInputs {
    pub fn new(
        geometry: GeometryIndex,
        observations: Vec<TimeSeriesObservation>,
        flows: Vec<Flow>,
        clusters: Vec<MarketCluster>,
    ) -> Self {
        Self {
            geometry: Arc::new(geometry),
            observations: Arc::new(observations),
            flows: Arc::new(flows),
            clusters: Arc::new(clusters),
            weights_policy: WeightsPolicy::default(),
            flow_filter: FlowFilter::default(),
            regression: None,
        }
    }

    pub fn with_weights_policy(mut self, policy: WeightsPolicy) -> Self {
        self.weights_policy = policy;
        self
    }

    pub fn with_flow_filter(mut self, filter: FlowFilter) -> Self {
        self.flow_filter = filter;
        self
    }

    pub fn with_regression(mut self, regression: RegressionResult) -> Self {
        self.regression = Some(Arc::new(regression));
        self
    }

    /// Distinct regions of the time-series data
    fn observed_regions(&self) -> Vec<String> {
        self.observations
            .iter()
            .map(|o| o.region.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// What the presentation layer currently looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    /// `None` averages every month
    pub month: Option<NaiveDate>,
    pub value_field: ValueField,
    pub granularity: Granularity,
    /// Day whose flows are listed, if any
    pub date: Option<NaiveDate>,
}

/// Every derived result of one refresh
#[derive(Debug, Clone)]
pub struct DerivedSnapshot {
    pub weights: Arc<SpatialWeightsMatrix>,
    pub global_moran: Arc<GlobalMoranStatistic>,
    pub local_moran: Arc<LocalMoranResult>,
    pub clusters: Arc<Vec<ClusterMetrics>>,
    pub filtered_flows: Arc<Vec<Flow>>,
    pub flow_network: Arc<FlowNetworkMetrics>,
    pub flow_buckets: Arc<Vec<FlowBucket>>,
    pub centrality: Arc<BTreeMap<String, CentralityMetrics>>,
    pub daily_flows: Option<Arc<Vec<Flow>>>,
    pub regression: Arc<RegressionSummary>,
}

#[derive(Debug, Clone, PartialEq)]
struct WeightsInputs {
    geometry: Arc<GeometryIndex>,
    regions: Vec<String>,
    policy: WeightsPolicy,
}

#[derive(Debug, Clone)]
struct MoranInputs {
    weights: Arc<SpatialWeightsMatrix>,
    values: Arc<BTreeMap<String, f64>>,
}

fn same_moran_inputs(a: &MoranInputs, b: &MoranInputs) -> bool {
    Arc::ptr_eq(&a.weights, &b.weights) && a.values == b.values
}

#[derive(Debug, Clone, PartialEq)]
struct ClusterInputs {
    clusters: Arc<Vec<MarketCluster>>,
    observations: Arc<Vec<TimeSeriesObservation>>,
    flows: Arc<Vec<Flow>>,
    geometry: Arc<GeometryIndex>,
}

#[derive(Debug, Clone)]
struct NetworkInputs {
    flows: Arc<Vec<Flow>>,
    metric: FlowMetric,
}

fn same_network_inputs(a: &NetworkInputs, b: &NetworkInputs) -> bool {
    Arc::ptr_eq(&a.flows, &b.flows) && a.metric == b.metric
}

fn same_flows(a: &Arc<Vec<Flow>>, b: &Arc<Vec<Flow>>) -> bool {
    Arc::ptr_eq(a, b)
}

#[derive(Debug, Clone)]
struct RegressionInputs {
    result: Option<Arc<RegressionResult>>,
    weights: Arc<SpatialWeightsMatrix>,
}

fn same_regression_inputs(a: &RegressionInputs, b: &RegressionInputs) -> bool {
    Arc::ptr_eq(&a.weights, &b.weights) && a.result == b.result
}

type MoranKey = (Option<NaiveDate>, ValueField);

/// Memoized derived analytics, recomputing each node only when its own
/// inputs changed
pub struct DerivedState {
    config: AnalyticsConfig,
    weights: Memo<WeightsInputs, SpatialWeightsMatrix>,
    global_moran: KeyedMemo<MoranKey, MoranInputs, GlobalMoranStatistic>,
    local_moran: KeyedMemo<MoranKey, MoranInputs, LocalMoranResult>,
    clusters: Memo<ClusterInputs, Vec<ClusterMetrics>>,
    filtered_flows: Memo<(Arc<Vec<Flow>>, FlowFilter), Vec<Flow>>,
    flow_network: Memo<NetworkInputs, FlowNetworkMetrics>,
    flow_buckets: KeyedMemo<Granularity, Arc<Vec<Flow>>, Vec<FlowBucket>>,
    centrality: Memo<Arc<Vec<Flow>>, BTreeMap<String, CentralityMetrics>>,
    daily_flows: KeyedMemo<NaiveDate, Arc<Vec<Flow>>, Vec<Flow>>,
    regression: Memo<RegressionInputs, RegressionSummary>,
}

impl DerivedState {
    pub fn new(config: AnalyticsConfig) -> Self {
        let capacity = config.keyed_cache_capacity;
        Self {
            weights: Memo::new("weights"),
            global_moran: KeyedMemo::with_equality("global_moran", capacity, same_moran_inputs),
            local_moran: KeyedMemo::with_equality("local_moran", capacity, same_moran_inputs),
            clusters: Memo::new("cluster_efficiency"),
            filtered_flows: Memo::new("filtered_flows"),
            flow_network: Memo::with_equality("flow_network", same_network_inputs),
            flow_buckets: KeyedMemo::with_equality("flow_buckets", capacity, same_flows),
            centrality: Memo::with_equality("centrality", same_flows),
            daily_flows: KeyedMemo::with_equality("daily_flows", capacity, same_flows),
            regression: Memo::with_equality("regression", same_regression_inputs),
            config,
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn weights(&self, inputs: &AnalyticsInputs) -> Arc<SpatialWeightsMatrix> {
        let node_inputs = WeightsInputs {
            geometry: Arc::clone(&inputs.geometry),
            regions: inputs.observed_regions(),
            policy: inputs.weights_policy.clone(),
        };
        self.weights.get_or_compute(&node_inputs, |i| {
            build_weights(&i.geometry, &i.regions, &i.policy)
        })
    }

    fn moran_inputs(&self, inputs: &AnalyticsInputs, selection: &Selection) -> MoranInputs {
        MoranInputs {
            weights: self.weights(inputs),
            values: Arc::new(moran_values_for_month(
                &inputs.observations,
                selection.month,
                selection.value_field,
            )),
        }
    }

    pub fn global_moran(
        &self,
        inputs: &AnalyticsInputs,
        selection: &Selection,
    ) -> Arc<GlobalMoranStatistic> {
        let node_inputs = self.moran_inputs(inputs, selection);
        self.global_moran_for(&node_inputs, selection)
    }

    fn global_moran_for(&self, node_inputs: &MoranInputs, selection: &Selection) -> Arc<GlobalMoranStatistic> {
        let config = &self.config;
        self.global_moran.get_or_compute(
            (selection.month, selection.value_field),
            node_inputs,
            |i| global_moran_i_with(&i.values, &i.weights, config),
        )
    }

    pub fn local_moran(&self, inputs: &AnalyticsInputs, selection: &Selection) -> Arc<LocalMoranResult> {
        let node_inputs = self.moran_inputs(inputs, selection);
        self.local_moran_for(&node_inputs, selection)
    }

    fn local_moran_for(&self, node_inputs: &MoranInputs, selection: &Selection) -> Arc<LocalMoranResult> {
        let config = &self.config;
        self.local_moran.get_or_compute(
            (selection.month, selection.value_field),
            node_inputs,
            |i| local_moran_i_with(&i.values, &i.weights, config),
        )
    }

    pub fn cluster_efficiency(&self, inputs: &AnalyticsInputs) -> Arc<Vec<ClusterMetrics>> {
        let node_inputs = ClusterInputs {
            clusters: Arc::clone(&inputs.clusters),
            observations: Arc::clone(&inputs.observations),
            flows: Arc::clone(&inputs.flows),
            geometry: Arc::clone(&inputs.geometry),
        };
        let config = &self.config;
        self.clusters.get_or_compute(&node_inputs, |i| {
            score_clusters(&i.clusters, &i.observations, &i.flows, &i.geometry, config)
        })
    }

    pub fn filtered_flows(&self, inputs: &AnalyticsInputs) -> Arc<Vec<Flow>> {
        let node_inputs = (Arc::clone(&inputs.flows), inputs.flow_filter);
        self.filtered_flows
            .get_or_compute(&node_inputs, |(flows, filter)| filter_flows(flows, filter))
    }

    pub fn flow_network(&self, inputs: &AnalyticsInputs) -> Arc<FlowNetworkMetrics> {
        let flows = self.filtered_flows(inputs);
        self.flow_network_for(flows, inputs.flow_filter.metric)
    }

    fn flow_network_for(&self, flows: Arc<Vec<Flow>>, metric: FlowMetric) -> Arc<FlowNetworkMetrics> {
        let top_n = self.config.top_flows;
        self.flow_network
            .get_or_compute(&NetworkInputs { flows, metric }, |i| {
                network_statistics(&i.flows, i.metric, top_n)
            })
    }

    pub fn flow_buckets(&self, inputs: &AnalyticsInputs, granularity: Granularity) -> Arc<Vec<FlowBucket>> {
        let flows = self.filtered_flows(inputs);
        self.flow_buckets_for(&flows, granularity)
    }

    fn flow_buckets_for(&self, flows: &Arc<Vec<Flow>>, granularity: Granularity) -> Arc<Vec<FlowBucket>> {
        self.flow_buckets
            .get_or_compute(granularity, flows, |f| aggregate_flows(f, granularity))
    }

    pub fn centrality(&self, inputs: &AnalyticsInputs) -> Arc<BTreeMap<String, CentralityMetrics>> {
        let flows = self.filtered_flows(inputs);
        self.centrality_for(&flows)
    }

    fn centrality_for(&self, flows: &Arc<Vec<Flow>>) -> Arc<BTreeMap<String, CentralityMetrics>> {
        self.centrality.get_or_compute(flows, |f| compute_centrality(f))
    }

    pub fn daily_flows(&self, inputs: &AnalyticsInputs, date: NaiveDate) -> Arc<Vec<Flow>> {
        let flows = self.filtered_flows(inputs);
        self.daily_flows_for(&flows, date)
    }

    fn daily_flows_for(&self, flows: &Arc<Vec<Flow>>, date: NaiveDate) -> Arc<Vec<Flow>> {
        self.daily_flows
            .get_or_compute(date, flows, |f| flows_on(f, date))
    }

    pub fn regression(&self, inputs: &AnalyticsInputs) -> Arc<RegressionSummary> {
        let weights = self.weights(inputs);
        self.regression_for(inputs, weights)
    }

    fn regression_for(
        &self,
        inputs: &AnalyticsInputs,
        weights: Arc<SpatialWeightsMatrix>,
    ) -> Arc<RegressionSummary> {
        let node_inputs = RegressionInputs {
            result: inputs.regression.clone(),
            weights,
        };
        let config = &self.config;
        self.regression.get_or_compute(&node_inputs, |i| match &i.result {
            Some(result) => summarize_regression_with(result, &i.weights, config),
            None => RegressionSummary::missing(),
        })
    }

    /// Bring every node up to date for `inputs` and `selection`
    pub fn refresh(&self, inputs: &AnalyticsInputs, selection: &Selection) -> DerivedSnapshot {
        let moran_inputs = self.moran_inputs(inputs, selection);
        let weights = Arc::clone(&moran_inputs.weights);
        let global_moran = self.global_moran_for(&moran_inputs, selection);
        let local_moran = self.local_moran_for(&moran_inputs, selection);

        let clusters = self.cluster_efficiency(inputs);

        let filtered_flows = self.filtered_flows(inputs);
        let flow_network = self.flow_network_for(Arc::clone(&filtered_flows), inputs.flow_filter.metric);
        let flow_buckets = self.flow_buckets_for(&filtered_flows, selection.granularity);
        let centrality = self.centrality_for(&filtered_flows);
        let daily_flows = selection
            .date
            .map(|date| self.daily_flows_for(&filtered_flows, date));

        let regression = self.regression_for(inputs, Arc::clone(&weights));

        tracing::debug!(
            regions = weights.len(),
            flows = filtered_flows.len(),
            clusters = clusters.len(),
            "Refreshed derived state"
        );

        DerivedSnapshot {
            weights,
            global_moran,
            local_moran,
            clusters,
            filtered_flows,
            flow_network,
            flow_buckets,
            centrality,
            daily_flows,
            regression,
        }
    }

    /// Drop every cached entry
    pub fn invalidate_all(&self) {
        self.weights.invalidate();
        self.global_moran.clear();
        self.local_moran.clear();
        self.clusters.invalidate();
        self.filtered_flows.invalidate();
        self.flow_network.invalidate();
        self.flow_buckets.clear();
        self.centrality.invalidate();
        self.daily_flows.clear();
        self.regression.invalidate();
    }

    /// Hit/miss counters in dependency order
    pub fn stats(&self) -> Vec<CacheStats> {
        vec![
            self.weights.stats(),
            self.global_moran.stats(),
            self.local_moran.stats(),
            self.clusters.stats(),
            self.filtered_flows.stats(),
            self.flow_network.stats(),
            self.flow_buckets.stats(),
            self.centrality.stats(),
            self.daily_flows.stats(),
            self.regression.stats(),
        ]
    }
}

impl Default for DerivedState {
    fn default() -> Self {
        Self::new(AnalyticsConfig::default())
    }
}
