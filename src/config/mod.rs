//! Configuration Management
//!
//! This module handles loading and validating the analytics tuning knobs.

pub mod analytics;

// Re-export
pub use analytics::{AnalyticsConfig, PValueMethod};
