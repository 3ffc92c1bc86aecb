use serde::Serialize;

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("No valid features found in input")]
    NoFeatures,

    #[error("No usable vital signs in snapshot")]
    NoVitalSigns,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::{ValidationError, ValidationErrors};

    #[test]
    fn validation_errors_convert() {
        let mut errors = ValidationErrors::new();
        errors.add("window_size", ValidationError::new("range"));
        let err = ServiceError::from(errors);
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn display_includes_detail() {
        assert_eq!(
            ServiceError::InvalidInput("window_size must be positive".into()).to_string(),
            "Invalid input: window_size must be positive"
        );
        assert_eq!(
            ServiceError::NoVitalSigns.to_string(),
            "No usable vital signs in snapshot"
        );
    }

    #[test]
    fn anyhow_errors_become_other() {
        let err: ServiceError = anyhow::anyhow!("disk full").into();
        assert!(matches!(err, ServiceError::Other(_)));
    }
}
