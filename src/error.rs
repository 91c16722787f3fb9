//! Client error types for the Nacos config SDK

/// Error type for config client operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("auth failed: {0}")]
    AuthFailed(String),

    #[error("server returned error: status={status}, body={body}")]
    Remote { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::Configuration("empty server list".to_string());
        assert_eq!(err.to_string(), "configuration error: empty server list");

        let err = ConfigError::Validation("dataId must not be blank".to_string());
        assert_eq!(err.to_string(), "validation error: dataId must not be blank");

        let err = ConfigError::Remote {
            status: 500,
            body: "internal error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "server returned error: status=500, body=internal error"
        );

        let err = ConfigError::Unauthorized("forbidden".to_string());
        assert_eq!(err.to_string(), "unauthorized: forbidden");
    }
}
