// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! AVS HTTP client.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AvsError, Result};
use crate::oauth::TokenSource;

/// Evaluation operations the broker needs from AVS.
///
/// Implemented by [`Client`]; tests substitute recording fakes.
#[async_trait]
pub trait EvaluationApi: Send + Sync {
    /// Remove the evaluation from the children of `parent_id`.
    ///
    /// AVS answers 200 even when the evaluation is not a child (anymore).
    async fn remove_reference_from_parent_eval(
        &self,
        parent_id: i64,
        evaluation_id: i64,
    ) -> Result<()>;

    /// Delete the evaluation definition. A missing evaluation counts as deleted.
    async fn delete_evaluation(&self, evaluation_id: i64) -> Result<()>;
}

/// Authenticated AVS client.
pub struct Client {
    http: reqwest::Client,
    api_endpoint: String,
    tokens: TokenSource,
}

impl Client {
    /// Build a client from configuration.
    ///
    /// Every request, including token requests, is bounded by
    /// `config.request_timeout`.
    pub fn new(config: &Config) -> Result<Self> {
        reqwest::Url::parse(&config.api_endpoint).map_err(|e| {
            AvsError::InvalidConfig(format!(
                "api endpoint '{}' is not a valid URL: {}",
                config.api_endpoint, e
            ))
        })?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let tokens = TokenSource::new(http.clone(), config);

        Ok(Self {
            http,
            api_endpoint: config.api_endpoint.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    async fn delete(&self, url: &str) -> Result<reqwest::Response> {
        let token = self.tokens.token().await?;
        let response = self.http.delete(url).bearer_auth(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(url = %url, "AVS rejected the access token, refreshing");
        self.tokens.invalidate().await;
        let token = self.tokens.token().await?;
        Ok(self.http.delete(url).bearer_auth(&token).send().await?)
    }
}

async fn unexpected(url: String, response: reqwest::Response) -> AvsError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    AvsError::UnexpectedStatus { status, url, body }
}

#[async_trait]
impl EvaluationApi for Client {
    async fn remove_reference_from_parent_eval(
        &self,
        parent_id: i64,
        evaluation_id: i64,
    ) -> Result<()> {
        let url = format!("{}/{}/child/{}", self.api_endpoint, parent_id, evaluation_id);
        let response = self.delete(&url).await?;

        if response.status().is_success() {
            debug!(parent_id, evaluation_id, "Removed evaluation from parent");
            return Ok(());
        }
        Err(unexpected(url, response).await)
    }

    async fn delete_evaluation(&self, evaluation_id: i64) -> Result<()> {
        let url = format!("{}/{}", self.api_endpoint, evaluation_id);
        let response = self.delete(&url).await?;

        match response.status() {
            status if status.is_success() => {
                debug!(evaluation_id, "Deleted evaluation");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                debug!(evaluation_id, "Evaluation already deleted");
                Ok(())
            }
            _ => Err(unexpected(url, response).await),
        }
    }
}
