//! Service-level error taxonomy for DocService.
//!
//! Script failures are not errors: they travel as data inside
//! [`crate::sandbox::ExecutionOutcome`]. The variants here cover setup and
//! infrastructure problems (configuration, prompt files, IO).

/// DocService setup and infrastructure errors.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid prompt set: {0}")]
    Prompts(String),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] crate::sandbox::SandboxError),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http client error: {0}")]
    Http(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::Http(err.to_string())
    }
}

/// Result type for DocService setup operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_display() {
        let err = ServiceError::Config("deadline_secs must be greater than zero".to_string());
        assert!(err.to_string().contains("invalid configuration"));
        assert!(err.to_string().contains("deadline_secs"));

        let err = ServiceError::Prompts("missing {query} in classify".to_string());
        assert!(err.to_string().contains("invalid prompt set"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "prompts.toml");
        let err: ServiceError = io.into();
        assert!(err.to_string().contains("prompts.toml"));
    }
}
