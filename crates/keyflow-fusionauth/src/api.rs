//! FusionAuth API client
//!
//! Thin reqwest wrapper that authenticates with an API key and turns every
//! response into an [`OperationResult`]. It never interprets results; that is
//! the classifier's job.

use crate::error::{FusionAuthError, Result};
use keyflow_cloud::{ApiError, OperationResult};
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;

pub const HOST_ENV: &str = "FUSIONAUTH_HOST";
pub const API_KEY_ENV: &str = "FUSIONAUTH_API_KEY";
pub const TENANT_ID_ENV: &str = "FUSIONAUTH_TENANT_ID";

const TENANT_HEADER: &str = "X-FusionAuth-TenantId";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Code attached to a 2xx response whose body could not be decoded
pub const INVALID_RESPONSE_CODE: &str = "[InvalidResponse]";

/// Connection settings for a FusionAuth instance
#[derive(Clone)]
pub struct FusionAuthConfig {
    pub host: String,
    pub api_key: String,
    pub tenant_id: Option<String>,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for FusionAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionAuthConfig")
            .field("host", &self.host)
            .field("api_key", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl FusionAuthConfig {
    pub fn new(host: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            api_key: api_key.into(),
            tenant_id: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Create FusionAuthConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let host = std::env::var(HOST_ENV)
            .map_err(|_| FusionAuthError::MissingEnvVar(HOST_ENV.to_string()))?;
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| FusionAuthError::MissingEnvVar(API_KEY_ENV.to_string()))?;

        let mut config = Self::new(host, api_key);
        if let Ok(tenant_id) = std::env::var(TENANT_ID_ENV) {
            if !tenant_id.is_empty() {
                config.tenant_id = Some(tenant_id);
            }
        }
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(self.host.starts_with("http://") || self.host.starts_with("https://")) {
            return Err(FusionAuthError::InvalidConfig(format!(
                "host must be an http(s) URL, got {:?}",
                self.host
            )));
        }
        if self.api_key.trim().is_empty() {
            return Err(FusionAuthError::InvalidConfig("API key is empty".to_string()));
        }
        Ok(())
    }
}

/// Error body returned by FusionAuth for rejected requests
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    general_errors: Vec<ApiError>,
    #[serde(default)]
    field_errors: BTreeMap<String, Vec<ApiError>>,
}

impl ErrorBody {
    fn into_errors(self) -> Vec<ApiError> {
        let mut errors = self.general_errors;
        for (field, field_errors) in self.field_errors {
            errors.extend(field_errors.into_iter().map(|e| {
                if e.message.contains(&field) {
                    e
                } else {
                    ApiError::new(e.code, format!("{} ({})", e.message, field))
                }
            }));
        }
        errors
    }
}

/// Parse a FusionAuth error body; anything else yields no structured errors
pub(crate) fn parse_errors(body: &[u8]) -> Vec<ApiError> {
    if body.is_empty() {
        return Vec::new();
    }
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => parsed.into_errors(),
        Err(e) => {
            tracing::debug!(error = %e, "Response body is not a FusionAuth error document");
            Vec::new()
        }
    }
}

/// HTTP client for the FusionAuth administrative API
#[derive(Clone)]
pub struct FusionAuthClient {
    http: reqwest::Client,
    base_url: String,
    config: FusionAuthConfig,
}

impl FusionAuthClient {
    pub fn new(config: FusionAuthConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.host.trim_end_matches('/').to_string(),
            config,
        })
    }

    pub fn config(&self) -> &FusionAuthConfig {
        &self.config
    }

    /// Build an authenticated request for an API path (e.g. "/api/key/{id}")
    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%method, %url, "FusionAuth request");

        let mut request = self
            .http
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, &self.config.api_key);
        if let Some(tenant_id) = &self.config.tenant_id {
            request = request.header(TENANT_HEADER, tenant_id);
        }
        request
    }

    /// Send a request whose success response carries a JSON body
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> OperationResult<T> {
        let (status, body) = match Self::exchange(request).await {
            Ok(response) => response,
            Err(cause) => return OperationResult::transport(cause),
        };

        if !(200..300).contains(&status) {
            return OperationResult::api_error(status, parse_errors(&body));
        }
        if body.is_empty() {
            return OperationResult::Success {
                status,
                payload: None,
            };
        }

        match serde_json::from_slice(&body) {
            Ok(payload) => OperationResult::Success {
                status,
                payload: Some(payload),
            },
            Err(e) => OperationResult::api_error(
                status,
                vec![ApiError::new(
                    INVALID_RESPONSE_CODE,
                    format!("could not decode response: {}", e),
                )],
            ),
        }
    }

    /// Send a request whose success response has no meaningful body
    pub(crate) async fn send_empty(&self, request: RequestBuilder) -> OperationResult<()> {
        match Self::exchange(request).await {
            Ok((status, _)) if (200..300).contains(&status) => OperationResult::acknowledged(status),
            Ok((status, body)) => OperationResult::api_error(status, parse_errors(&body)),
            Err(cause) => OperationResult::transport(cause),
        }
    }

    async fn exchange(request: RequestBuilder) -> std::result::Result<(u16, Vec<u8>), String> {
        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| e.to_string())?;
        tracing::debug!(status, bytes = body.len(), "FusionAuth response");
        Ok((status, body.to_vec()))
    }
}
