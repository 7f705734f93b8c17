// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! OAuth2 token acquisition for the AVS API.
//!
//! The token endpoint answers with
//! `{"access_token": "...", "token_type": "bearer", "scope": "...", "expires_in": 86400}`.
//! [`TokenSource`] keeps the last token until [`EXPIRY_MARGIN`] before it
//! expires, so concurrent workers share one token instead of each fetching
//! their own.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Config;
use crate::error::{AvsError, Result};

/// Tokens are refreshed this long before the expiry reported by the endpoint.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    #[allow(dead_code)]
    scope: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

/// Fetches and caches bearer tokens.
///
/// Uses the password grant when a username is configured and the
/// client-credentials grant otherwise.
pub struct TokenSource {
    http: reqwest::Client,
    token_endpoint: String,
    client_id: String,
    username: String,
    password: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    /// Create a token source sharing the given HTTP client.
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            token_endpoint: config.oauth_token_endpoint.clone(),
            client_id: config.oauth_client_id.clone(),
            username: config.oauth_username.clone(),
            password: config.oauth_password.clone(),
            cached: Mutex::new(None),
        }
    }

    /// Return a valid access token, fetching a new one if needed.
    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && token.is_valid()
        {
            return Ok(token.access_token.clone());
        }

        let fresh = self.fetch().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    /// Drop the cached token so the next call fetches a new one.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn fetch(&self) -> Result<CachedToken> {
        let mut form = vec![("client_id", self.client_id.as_str())];
        if self.username.is_empty() {
            form.push(("grant_type", "client_credentials"));
        } else {
            form.push(("grant_type", "password"));
            form.push(("username", self.username.as_str()));
            form.push(("password", self.password.as_str()));
        }

        debug!(endpoint = %self.token_endpoint, "Requesting AVS access token");

        let response = self
            .http
            .post(&self.token_endpoint)
            .basic_auth(&self.client_id, None::<&str>)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AvsError::Token(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| AvsError::Token(format!("invalid token response: {}", e)))?;

        if parsed.access_token.is_empty() {
            return Err(AvsError::Token("empty access token".to_string()));
        }
        if !parsed.token_type.is_empty() && !parsed.token_type.eq_ignore_ascii_case("bearer") {
            return Err(AvsError::Token(format!(
                "unsupported token type '{}'",
                parsed.token_type
            )));
        }

        let expires_at = parsed
            .expires_in
            .map(|secs| Instant::now() + Duration::from_secs(secs).saturating_sub(EXPIRY_MARGIN));

        Ok(CachedToken {
            access_token: parsed.access_token,
            expires_at,
        })
    }
}
