use thiserror::Error;

use crate::config::ConfigError;
use crate::data::IngestError;

/// Precondition failures of the analytic stages. Each variant names the operation and the
/// offending value so a caller can diagnose without re-running.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("{operation}: insufficient data ({rows} rows available)")]
    InsufficientData { operation: &'static str, rows: usize },
    #[error("{operation}: invalid parameter `{parameter}` = {value}: {reason}")]
    InvalidParameter {
        operation: &'static str,
        parameter: &'static str,
        value: String,
        reason: String,
    },
    #[error("{operation}: recommendation model has not been trained")]
    ModelNotReady { operation: &'static str },
    #[error("{operation}: product catalog is empty (customer `{customer_id}`)")]
    EmptyCatalog { operation: &'static str, customer_id: String },
}

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("report rendering failed: {0}")]
    Rendering(String),
}

impl DomainError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::InsufficientData { .. } => "insufficient_data",
            Self::InvalidParameter { .. } => "invalid_parameter",
            Self::ModelNotReady { .. } => "model_not_ready",
            Self::EmptyCatalog { .. } => "empty_catalog",
        }
    }
}

impl ApplicationError {
    /// Stable snake-case class used in command outcomes.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(error) => error.error_class(),
            Self::Ingest(IngestError::Schema { .. }) => "schema",
            Self::Ingest(IngestError::InvalidAmount { .. }) => "data_quality",
            Self::Ingest(_) => "data_access",
            Self::Configuration(_) => "config_validation",
            Self::Rendering(_) => "rendering",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            Self::Ingest(_) => 3,
            Self::Domain(_) => 4,
            Self::Rendering(_) => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::data::IngestError;
    use crate::errors::{ApplicationError, DomainError};

    #[test]
    fn domain_error_message_carries_operation_and_parameter() {
        let error = DomainError::InvalidParameter {
            operation: "segment_customers",
            parameter: "k",
            value: "9".to_owned(),
            reason: "exceeds 4 distinct customers".to_owned(),
        };

        let message = error.to_string();
        assert!(message.contains("segment_customers"));
        assert!(message.contains("`k` = 9"));
        assert!(message.contains("4 distinct customers"));
    }

    #[test]
    fn schema_error_maps_to_schema_class() {
        let error = ApplicationError::from(IngestError::Schema {
            missing: vec!["PurchaseDate".to_owned()],
        });

        assert_eq!(error.error_class(), "schema");
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn domain_errors_map_to_their_own_classes() {
        let not_ready =
            ApplicationError::from(DomainError::ModelNotReady { operation: "recommend" });
        let empty = ApplicationError::from(DomainError::EmptyCatalog {
            operation: "recommend",
            customer_id: "C1".to_owned(),
        });

        assert_eq!(not_ready.error_class(), "model_not_ready");
        assert_eq!(empty.error_class(), "empty_catalog");
        assert_eq!(empty.exit_code(), 4);
    }

    #[test]
    fn rendering_error_is_distinct_from_domain_failures() {
        let error = ApplicationError::Rendering("template missing".to_owned());

        assert_eq!(error.error_class(), "rendering");
        assert!(error.to_string().contains("template missing"));
    }
}
