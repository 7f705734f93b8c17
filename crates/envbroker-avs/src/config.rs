// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

/// AVS client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the evaluation API, without a trailing slash.
    pub api_endpoint: String,
    /// OAuth2 token endpoint.
    pub oauth_token_endpoint: String,
    /// OAuth2 client ID.
    pub oauth_client_id: String,
    /// Username for the password grant. Empty selects the client-credentials grant.
    pub oauth_username: String,
    /// Password for the password grant.
    pub oauth_password: String,
    /// Parent evaluation that groups all runtime evaluations.
    pub parent_id: i64,
    /// Upper bound for every outbound request.
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `AVS_API_ENDPOINT`
    /// - `AVS_OAUTH_TOKEN_ENDPOINT`
    /// - `AVS_OAUTH_CLIENT_ID`
    /// - `AVS_PARENT_ID`
    ///
    /// Optional (with defaults):
    /// - `AVS_OAUTH_USERNAME` / `AVS_OAUTH_PASSWORD` (default: empty)
    /// - `AVS_REQUEST_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_endpoint = required("AVS_API_ENDPOINT")?;
        let oauth_token_endpoint = required("AVS_OAUTH_TOKEN_ENDPOINT")?;
        let oauth_client_id = required("AVS_OAUTH_CLIENT_ID")?;

        let parent_id: i64 = required("AVS_PARENT_ID")?
            .parse()
            .map_err(|_| ConfigError::Invalid("AVS_PARENT_ID", "must be an integer"))?;

        let timeout_secs: u64 = std::env::var("AVS_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("AVS_REQUEST_TIMEOUT_SECS", "must be a positive integer")
            })?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "AVS_REQUEST_TIMEOUT_SECS",
                "must be a positive integer",
            ));
        }

        Ok(Self {
            api_endpoint: api_endpoint.trim_end_matches('/').to_string(),
            oauth_token_endpoint,
            oauth_client_id,
            oauth_username: std::env::var("AVS_OAUTH_USERNAME").unwrap_or_default(),
            oauth_password: std::env::var("AVS_OAUTH_PASSWORD").unwrap_or_default(),
            parent_id,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::Missing(key))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
