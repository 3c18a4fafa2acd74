//! Error types for JaltolAI.
//!
//! Tool-level failures (location, reducer, empty archive results) are kept
//! typed so the agent can reason about them. Everything else is collapsed
//! into a single fallback message at the session boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JaltolError {
    // Location errors
    #[error("Location not found: {location}")]
    LocationNotFound { location: String },

    #[error("Geocoder error: {0}")]
    Geocoder(String),

    // Temporal errors
    #[error("Unsupported temporal span '{span}' with step '{step}'")]
    UnsupportedTemporalSpan { span: String, step: String },

    #[error("Year {year} is outside the supported calendar range")]
    InvalidYear { year: i32 },

    // Aggregation errors
    #[error("Unknown reducer kind: {name}. Expected one of: mean, sum")]
    UnknownReducerKind { name: String },

    #[error("No data in archive {asset} for the requested window and region")]
    ArchiveEmptyResult { asset: String },

    #[error("Raster archive error: {0}")]
    Archive(String),

    // Session errors
    #[error("Stored conversation memory is unreadable: {0}")]
    MemoryDeserialization(String),

    #[error("Failed to serialize conversation memory: {0}")]
    MemorySerialization(String),

    // Agent errors
    #[error("Language model error: {0}")]
    LanguageModel(String),

    #[error("Invalid arguments for tool {tool}: {reason}")]
    InvalidToolArguments { tool: String, reason: String },

    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Tool {tool} does not support async")]
    AsyncUnsupported { tool: String },

    // Configuration errors
    #[error("Missing required configuration: {key}")]
    ConfigMissing { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },
}

impl JaltolError {
    /// Short, stable name of the error variant for operator logs.
    pub fn kind(&self) -> &'static str {
        match self {
            JaltolError::LocationNotFound { .. } => "LocationNotFound",
            JaltolError::Geocoder(_) => "GeocoderError",
            JaltolError::UnsupportedTemporalSpan { .. } => "UnsupportedTemporalSpan",
            JaltolError::InvalidYear { .. } => "InvalidYear",
            JaltolError::UnknownReducerKind { .. } => "UnknownReducerKind",
            JaltolError::ArchiveEmptyResult { .. } => "ArchiveEmptyResult",
            JaltolError::Archive(_) => "ArchiveError",
            JaltolError::MemoryDeserialization(_) => "MemoryDeserializationFailure",
            JaltolError::MemorySerialization(_) => "MemorySerializationFailure",
            JaltolError::LanguageModel(_) => "LanguageModelError",
            JaltolError::InvalidToolArguments { .. } => "InvalidToolArguments",
            JaltolError::UnknownTool { .. } => "UnknownTool",
            JaltolError::AsyncUnsupported { .. } => "AsyncUnsupported",
            JaltolError::ConfigMissing { .. } => "ConfigMissing",
            JaltolError::ConfigInvalid { .. } => "ConfigInvalid",
        }
    }
}

pub type Result<T> = std::result::Result<T, JaltolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = JaltolError::LocationNotFound {
            location: "Nowhere".to_string(),
        };
        assert_eq!(err.to_string(), "Location not found: Nowhere");
        assert_eq!(err.kind(), "LocationNotFound");

        let err = JaltolError::UnknownReducerKind {
            name: "median".to_string(),
        };
        assert!(err.to_string().contains("median"));
        assert_eq!(err.kind(), "UnknownReducerKind");
    }
}
