use anyhow::{bail, Context};
use market_spatial_analytics::analytics::{Granularity, ValueField};
use market_spatial_analytics::feeds::{parse_date, parse_month, FeedBundle};
use market_spatial_analytics::{AnalyticsConfig, DerivedSnapshot, DerivedState, Selection};
use std::path::PathBuf;

struct CliArgs {
    input: PathBuf,
    selection: Selection,
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cli = parse_args(&args)?;

    // Logs go to stderr; stdout stays free for piping
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = AnalyticsConfig::from_env().context("Invalid ANALYTICS_* configuration")?;
    tracing::info!(
        significance = config.significance_level,
        p_value_method = ?config.p_value_method,
        "Loaded analytics configuration"
    );

    let bundle = FeedBundle::load(&cli.input)
        .with_context(|| format!("Failed to load feed bundle from {}", cli.input.display()))?;
    let inputs = bundle.into_inputs();

    tracing::info!(
        regions = inputs.geometry.len(),
        observations = inputs.observations.len(),
        flows = inputs.flows.len(),
        clusters = inputs.clusters.len(),
        "Ingested feeds"
    );

    let state = DerivedState::new(config);
    let snapshot = state.refresh(&inputs, &cli.selection);
    report(&snapshot);

    // A second refresh over identical inputs must be served from cache
    let cached = state.refresh(&inputs, &cli.selection);
    if !std::sync::Arc::ptr_eq(&snapshot.global_moran, &cached.global_moran) {
        tracing::warn!("Derived state was recomputed for identical inputs");
    }
    for stats in state.stats() {
        tracing::debug!(node = stats.name, hits = stats.hits, misses = stats.misses, "Cache stats");
    }

    Ok(())
}

fn report(snapshot: &DerivedSnapshot) {
    let global = &snapshot.global_moran;
    tracing::info!(
        moran_i = global.moran_i,
        z_score = global.z_score,
        p_value = global.p_value,
        observations = global.observations,
        warning = global.warning.as_deref().unwrap_or(""),
        "Global Moran's I"
    );

    let summary = &snapshot.local_moran.summary;
    tracing::info!(
        high_high = summary.high_high,
        low_low = summary.low_low,
        high_low = summary.high_low,
        low_high = summary.low_high,
        not_significant = summary.not_significant,
        "Local Moran's I clusters"
    );

    for cluster in snapshot.clusters.iter() {
        tracing::info!(
            cluster = %cluster.cluster_id,
            main_market = %cluster.main_market,
            efficiency = cluster.efficiency,
            reliability = cluster.reliability,
            markets = cluster.market_count,
            "Cluster efficiency"
        );
    }

    let network = &snapshot.flow_network;
    tracing::info!(
        total_volume = network.total_volume,
        flows = network.flow_count,
        active_markets = network.active_markets,
        density = network.flow_density,
        buckets = snapshot.flow_buckets.len(),
        "Flow network"
    );

    if let Some((region, metrics)) = snapshot
        .centrality
        .iter()
        .max_by(|a, b| a.1.betweenness.total_cmp(&b.1.betweenness))
    {
        tracing::info!(region = %region, betweenness = metrics.betweenness, "Most central market");
    }

    if let Some(daily) = &snapshot.daily_flows {
        tracing::info!(flows = daily.len(), "Flows on selected date");
    }

    let regression = &snapshot.regression;
    tracing::info!(
        r_squared = regression.r_squared,
        residual_moran_i = regression.residual_moran.moran_i,
        spatial_dependence = regression.spatial_dependence_detected,
        "Regression summary"
    );
}

/// Parse command-line arguments
fn parse_args(args: &[String]) -> anyhow::Result<CliArgs> {
    let mut input = None;
    let mut selection = Selection::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || -> anyhow::Result<String> {
            i += 1;
            args.get(i)
                .cloned()
                .with_context(|| format!("{} requires a value", flag))
        };

        match flag {
            "--input" | "-i" => input = Some(PathBuf::from(value()?)),
            "--month" => selection.month = Some(parse_month(&value()?)?),
            "--date" => selection.date = Some(parse_date(&value()?)?),
            "--granularity" => selection.granularity = value()?.parse::<Granularity>()?,
            "--field" => {
                selection.value_field = match value()?.as_str() {
                    "price" => ValueField::Price,
                    "conflict" | "conflict_intensity" => ValueField::ConflictIntensity,
                    other => bail!("Unknown field: {}", other),
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                print_usage();
                bail!("Unknown argument: {}", other);
            }
        }
        i += 1;
    }

    let Some(input) = input else {
        print_usage();
        bail!("--input is required");
    };

    Ok(CliArgs { input, selection })
}

/// Print usage information
fn print_usage() {
    println!("market-spatial-analytics - derived spatial analytics over regional market feeds");
    println!();
    println!("USAGE:");
    println!("    market-spatial-analytics --input <BUNDLE.json> [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --input, -i <PATH>        JSON feed bundle (geometry, time_series, flows, market_clusters, regression)");
    println!("    --month <YYYY-MM>         Month used for Moran's I (default: mean over all months)");
    println!("    --field <FIELD>           price or conflict (default: price)");
    println!("    --granularity <G>         Flow buckets: day, week or month (default: month)");
    println!("    --date <YYYY-MM-DD>       List the flows of one day");
    println!("    --help, -h                Print this help message");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("    ANALYTICS_SIGNIFICANCE_LEVEL        LISA / Moran cutoff (default: 0.05)");
    println!("    ANALYTICS_CORRELATION_SIGNIFICANCE  Price correlation cutoff (default: 0.10)");
    println!("    ANALYTICS_MIN_CORRELATION_SAMPLES   Overlapping months per pair (default: 3)");
    println!("    ANALYTICS_CONFLICT_SCALE            Conflict intensity scale (default: 10)");
    println!("    ANALYTICS_TOP_FLOWS                 Top flows reported, 5-10 (default: 10)");
    println!("    ANALYTICS_CACHE_CAPACITY            Entries per keyed cache (default: 32)");
    println!("    ANALYTICS_P_VALUE_METHOD            abramowitz_stegun or exact");
    println!("    RUST_LOG                            Logging level (default: info)");
}
