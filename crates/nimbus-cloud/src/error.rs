//! Cloud error types

use crate::model::InstanceCreationError;
use thiserror::Error;

/// Errors surfaced by connectors, the inventory bridge and the registry
///
/// Every payload is a plain string so a single in-flight cache load can
/// hand the same outcome to every waiting caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("Size unavailable: {0}")]
    SizeUnavailable(String),

    #[error("Invalid request: {field} {reason}")]
    Validation { field: String, reason: String },

    #[error("{operation} failed for '{target}': {message}")]
    Upstream {
        operation: String,
        target: String,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl CloudError {
    /// Wrap a provider or inventory failure with the operation and target it hit
    pub fn upstream(
        operation: impl Into<String>,
        target: impl Into<String>,
        err: impl std::fmt::Display,
    ) -> Self {
        CloudError::Upstream {
            operation: operation.into(),
            target: target.into(),
            message: err.to_string(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CloudError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// The creation rejection this error represents, if any
    pub fn creation_error(&self) -> Option<InstanceCreationError> {
        match self {
            CloudError::ProviderUnavailable(_) => Some(InstanceCreationError::ProviderUnavailable),
            CloudError::LocationUnavailable(_) => Some(InstanceCreationError::LocationUnavailable),
            CloudError::SizeUnavailable(_) => Some(InstanceCreationError::SizeUnavailable),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_keeps_context() {
        let err = CloudError::upstream("destroy node", "i-42", "connection reset");
        assert_eq!(
            err.to_string(),
            "destroy node failed for 'i-42': connection reset"
        );
        assert!(err.creation_error().is_none());
    }

    #[test]
    fn test_creation_error_mapping() {
        assert_eq!(
            CloudError::LocationUnavailable("missing".into()).creation_error(),
            Some(InstanceCreationError::LocationUnavailable)
        );
        assert_eq!(
            CloudError::SizeUnavailable("m9.huge".into()).creation_error(),
            Some(InstanceCreationError::SizeUnavailable)
        );
    }
}
