//! Cloudflare API plumbing
//!
//! Bearer token authentication against the v4 REST API.

use crate::error::{CloudflareError, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;

pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

const API_TOKEN_VAR: &str = "CLOUDFLARE_API_TOKEN";
const ACCOUNT_ID_VAR: &str = "CLOUDFLARE_ACCOUNT_ID";

/// Credentials and account of the Cloudflare API
#[derive(Debug, Clone)]
pub struct CloudflareConfig {
    pub api_token: String,
    pub account_id: String,
    pub api_base: String,
}

impl CloudflareConfig {
    pub fn new(api_token: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            account_id: account_id.into(),
            api_base: CLOUDFLARE_API_BASE.to_string(),
        }
    }

    /// Read `CLOUDFLARE_API_TOKEN` and `CLOUDFLARE_ACCOUNT_ID`
    ///
    /// Every missing variable is reported in one error.
    pub fn from_env() -> Result<Self> {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let api_token = read(API_TOKEN_VAR);
        let account_id = read(ACCOUNT_ID_VAR);

        match (api_token, account_id) {
            (Some(api_token), Some(account_id)) => Ok(Self::new(api_token, account_id)),
            (api_token, account_id) => {
                let mut missing = Vec::new();
                if api_token.is_none() {
                    missing.push(API_TOKEN_VAR.to_string());
                }
                if account_id.is_none() {
                    missing.push(ACCOUNT_ID_VAR.to_string());
                }
                Err(CloudflareError::MissingEnvVars(missing))
            }
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub(crate) struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    #[serde(default)]
    code: i64,
    message: String,
}

impl<T> ApiResponse<T> {
    /// Unwrap a successful response or surface the first API error
    pub(crate) fn into_result(self) -> Result<Option<T>> {
        if self.success {
            return Ok(self.result);
        }
        let message = self
            .errors
            .first()
            .map(|e| format!("{} (code {})", e.message, e.code))
            .unwrap_or_else(|| "Unknown error".to_string());
        Err(CloudflareError::ApiError(message))
    }
}

/// Decode a response body and unwrap its result
pub(crate) async fn read_result<T: DeserializeOwned>(response: reqwest::Response) -> Result<Option<T>> {
    let api_response: ApiResponse<T> = response.json().await?;
    api_response.into_result()
}
