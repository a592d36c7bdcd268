//! Analytics Configuration
//!
//! Tunable constants of the derived-analytics core. Every knob has a default
//! and can be overridden from the environment.

use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};

/// How two-tailed p-values are derived from z-scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PValueMethod {
    /// Abramowitz–Stegun 26.2.17 rational approximation (|error| < 7.5e-8).
    #[default]
    AbramowitzStegun,
    /// Exact normal CDF from statrs.
    Exact,
}

impl std::str::FromStr for PValueMethod {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abramowitz_stegun" | "approximate" => Ok(Self::AbramowitzStegun),
            "exact" => Ok(Self::Exact),
            other => Err(AnalyticsError::Config(format!(
                "unknown p-value method: {}",
                other
            ))),
        }
    }
}

/// Analytics configuration
///
/// ## Environment Variables
///
/// - `ANALYTICS_SIGNIFICANCE_LEVEL`: LISA / Moran significance cutoff (default: 0.05)
/// - `ANALYTICS_CORRELATION_SIGNIFICANCE`: price-correlation t-test cutoff (default: 0.10)
/// - `ANALYTICS_MIN_CORRELATION_SAMPLES`: overlapping months required per pair (default: 3)
/// - `ANALYTICS_CONFLICT_SCALE`: upper end of the conflict-intensity scale (default: 10)
/// - `ANALYTICS_TOP_FLOWS`: number of top flows reported, 5-10 (default: 10)
/// - `ANALYTICS_CACHE_CAPACITY`: entries per keyed cache node (default: 32)
/// - `ANALYTICS_P_VALUE_METHOD`: `abramowitz_stegun` or `exact` (default: abramowitz_stegun)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub significance_level: f64,

    pub correlation_significance: f64,

    pub min_correlation_samples: usize,

    /// Normalization constant for conflict resilience. Tied to the intensity
    /// scale used upstream; change it together with that scale.
    pub conflict_intensity_scale: f64,

    pub top_flows: usize,

    pub keyed_cache_capacity: usize,

    pub p_value_method: PValueMethod,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            significance_level: 0.05,
            correlation_significance: 0.10,
            min_correlation_samples: 3,
            conflict_intensity_scale: 10.0,
            top_flows: 10,
            keyed_cache_capacity: 32,
            p_value_method: PValueMethod::AbramowitzStegun,
        }
    }
}

impl AnalyticsConfig {
    /// Load configuration from environment variables, falling back to defaults
    ///
    /// # Errors
    ///
    /// Returns `AnalyticsError::Config` if a variable is set but unparsable or
    /// the resulting configuration fails validation.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            significance_level: parse_var(
                &lookup,
                "ANALYTICS_SIGNIFICANCE_LEVEL",
                defaults.significance_level,
            )?,
            correlation_significance: parse_var(
                &lookup,
                "ANALYTICS_CORRELATION_SIGNIFICANCE",
                defaults.correlation_significance,
            )?,
            min_correlation_samples: parse_var(
                &lookup,
                "ANALYTICS_MIN_CORRELATION_SAMPLES",
                defaults.min_correlation_samples,
            )?,
            conflict_intensity_scale: parse_var(
                &lookup,
                "ANALYTICS_CONFLICT_SCALE",
                defaults.conflict_intensity_scale,
            )?,
            top_flows: parse_var(&lookup, "ANALYTICS_TOP_FLOWS", defaults.top_flows)?,
            keyed_cache_capacity: parse_var(
                &lookup,
                "ANALYTICS_CACHE_CAPACITY",
                defaults.keyed_cache_capacity,
            )?,
            p_value_method: parse_var(
                &lookup,
                "ANALYTICS_P_VALUE_METHOD",
                defaults.p_value_method,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates ranges of every knob.
    ///
    /// # Validation Rules
    /// - `significance_level`, `correlation_significance`: strictly between 0 and 1
    /// - `min_correlation_samples`: at least 3 (the t-test needs n - 2 > 0)
    /// - `conflict_intensity_scale`: positive and finite
    /// - `top_flows`: between 5 and 10
    /// - `keyed_cache_capacity`: at least 1
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("significance_level", self.significance_level),
            ("correlation_significance", self.correlation_significance),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(AnalyticsError::Config(format!(
                    "{} must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }

        if self.min_correlation_samples < 3 {
            return Err(AnalyticsError::Config(format!(
                "min_correlation_samples must be at least 3, got {}",
                self.min_correlation_samples
            )));
        }

        if !(self.conflict_intensity_scale.is_finite() && self.conflict_intensity_scale > 0.0) {
            return Err(AnalyticsError::Config(format!(
                "conflict_intensity_scale must be positive, got {}",
                self.conflict_intensity_scale
            )));
        }

        if !(5..=10).contains(&self.top_flows) {
            return Err(AnalyticsError::Config(format!(
                "top_flows must be between 5 and 10, got {}",
                self.top_flows
            )));
        }

        if self.keyed_cache_capacity == 0 {
            return Err(AnalyticsError::Config(
                "keyed_cache_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AnalyticsError::Config(format!("{}={:?}: {}", key, raw, e))),
    }
}
