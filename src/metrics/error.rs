//! Error types returned by the metrics registry.

use std::string::FromUtf8Error;
use thiserror::Error;

/// Why a dynamic registration was rejected. The registry is left untouched in
/// every case.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// The descriptor is already used by a system instrument.
    #[error("metric '{descriptor}' is already in use by the system, please use a different name")]
    DescriptorCollision { descriptor: String },

    /// The name was registered before with different help text.
    #[error("metric '{name}' has help string '{help}' but should have '{existing}' (help strings must be identical for metrics of the same name)")]
    HelpTextMismatch {
        name: String,
        help: String,
        existing: String,
    },
}

/// The instrument factory was handed an invalid name, label set or buckets.
#[derive(Error, Debug)]
#[error("invalid instrument '{name}': {source}")]
pub struct InstrumentError {
    pub name: String,
    #[source]
    pub source: prometheus::Error,
}

/// Failure while encoding a scrape.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to encode metric family: {0}")]
    Encode(#[from] prometheus::Error),

    #[error("metrics encoding produced invalid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),

    #[error("metric '{name}' has a duplicate series with labels {labels}")]
    DuplicateSeries { name: String, labels: String },

    #[error("metric '{name}' is collected with more than one metric type")]
    InconsistentType { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_error_display() {
        let err = RegistrationError::HelpTextMismatch {
            name: "argo_workflows_duration".to_string(),
            help: "new".to_string(),
            existing: "old".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "metric 'argo_workflows_duration' has help string 'new' but should have 'old' (help strings must be identical for metrics of the same name)"
        );
    }
}
