//! FusionAuth provider error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FusionAuthError {
    #[error("Environment variable not set: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Cloud error: {0}")]
    CloudError(#[from] keyflow_cloud::CloudError),
}

pub type Result<T> = std::result::Result<T, FusionAuthError>;
