// Library exports for market-spatial-analytics

pub mod error;

// Inputs
pub mod config; // Configuration management
pub mod feeds; // External feed models and ingestion
pub mod geometry; // Region index and spatial weights

// Derived analytics
pub mod analytics; // Moran's I, cluster efficiency, flow networks, regression
pub mod cache; // Memoized dependency-ordered recomputation

pub use cache::{AnalyticsInputs, DerivedSnapshot, DerivedState, Selection};
pub use config::AnalyticsConfig;
pub use error::{AnalyticsError, Result};
