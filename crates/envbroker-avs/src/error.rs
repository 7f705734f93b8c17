// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Errors returned by the AVS client.

use thiserror::Error;

/// Errors that can occur while talking to AVS or its token endpoint.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AvsError {
    /// The request could not be sent or the response could not be read.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// AVS answered with a status code the call does not accept.
    #[error("unexpected status {status} from {url}: {body}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Request URL.
        url: String,
        /// Response body, possibly empty.
        body: String,
    },

    /// The token endpoint refused the credentials or returned garbage.
    #[error("token error: {0}")]
    Token(String),

    /// A configured URL cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AvsError {
    /// Status code of an [`AvsError::UnexpectedStatus`], if that is what this is.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type using [`AvsError`].
pub type Result<T> = std::result::Result<T, AvsError>;
