//! Cloudflare handler error types

use gasoline_cloud::ProvisionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudflareError {
    #[error("Missing environment variables: {}", .0.join(", "))]
    MissingEnvVars(Vec<String>),

    #[error("Cloudflare API error: {0}")]
    ApiError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Previous output is missing or invalid: {0}")]
    MissingOutput(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudflareError>;

impl From<CloudflareError> for ProvisionError {
    fn from(err: CloudflareError) -> Self {
        match err {
            CloudflareError::MissingEnvVars(_) => ProvisionError::AuthenticationFailed(err.to_string()),
            CloudflareError::InvalidConfig(message) => ProvisionError::InvalidConfig(message),
            CloudflareError::MissingOutput(message) => ProvisionError::MissingOutput(message),
            other => ProvisionError::ApiError(other.to_string()),
        }
    }
}
