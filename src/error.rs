use thiserror::Error;

/// Record-level and harness-level failures.
///
/// None of these escape the public computations: ingestion absorbs record
/// errors (drops the record and logs), and the statistical engines fold
/// degenerate input into neutral results. Only bundle loading surfaces them.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Malformed coordinate for {region}: {reason}")]
    MalformedCoordinate { region: String, reason: String },

    #[error("Non-numeric {field} for {region}: {value}")]
    NonNumeric {
        region: String,
        field: &'static str,
        value: String,
    },

    #[error("Invalid date {value}: {reason}")]
    InvalidDate { value: String, reason: String },

    #[error("Empty region identifier")]
    EmptyRegionId,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AnalyticsError {
    /// Short machine-readable tag used in log fields.
    pub fn error_type(&self) -> &'static str {
        match self {
            AnalyticsError::MalformedCoordinate { .. } => "malformed_coordinate",
            AnalyticsError::NonNumeric { .. } => "non_numeric",
            AnalyticsError::InvalidDate { .. } => "invalid_date",
            AnalyticsError::EmptyRegionId => "empty_region_id",
            AnalyticsError::Io(_) => "io",
            AnalyticsError::Json(_) => "json",
            AnalyticsError::Config(_) => "config",
        }
    }

    /// Whether the error concerns a single input record (and is therefore
    /// absorbed by dropping that record).
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            AnalyticsError::MalformedCoordinate { .. }
                | AnalyticsError::NonNumeric { .. }
                | AnalyticsError::InvalidDate { .. }
                | AnalyticsError::EmptyRegionId
        )
    }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
