//! Deployment pipeline errors
//!
//! Every variant here is fatal: the pipeline aborts before any resource
//! creation is requested, so there is nothing to roll back.

use thiserror::Error;

/// Errors raised by parameter resolution, validation, and reference building
#[derive(Debug, Error)]
pub enum DeployError {
    /// Parameter file does not exist at the resolved path
    #[error("parameter file not found: {path}")]
    ConfigNotFound { path: String },

    /// One or more required parameters absent after resolution
    #[error("missing required parameters: {}", .fields.join(", "))]
    MissingRequiredParameters { fields: Vec<String> },

    /// A supplied identifier cannot be used as a resource reference
    #[error("invalid {kind} reference: '{value}'")]
    InvalidResourceReference { kind: &'static str, value: String },

    /// Failed to parse the parameter file as JSON
    #[error("failed to parse parameter file: {0}")]
    Parse(#[from] serde_json::Error),

    /// Failed to read the parameter file
    #[error("failed to read parameter file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl DeployError {
    /// Create an IO error with path context
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_parameters_display_lists_all_fields() {
        let err = DeployError::MissingRequiredParameters {
            fields: vec!["vpcId".to_string(), "cognitoDomain".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "missing required parameters: vpcId, cognitoDomain"
        );
    }

    #[test]
    fn test_config_not_found_display() {
        let err = DeployError::ConfigNotFound {
            path: "config/params.json".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "parameter file not found: config/params.json"
        );
    }

    #[test]
    fn test_invalid_reference_display() {
        let err = DeployError::InvalidResourceReference {
            kind: "subnet",
            value: "vpc-123".to_string(),
        };
        assert_eq!(err.to_string(), "invalid subnet reference: 'vpc-123'");
    }

    #[test]
    fn test_io_error_includes_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = DeployError::io("/etc/params.json", io_err);
        assert!(err.to_string().contains("/etc/params.json"));
    }
}
