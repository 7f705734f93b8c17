// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client for the AVS monitoring service.
//!
//! AVS tracks availability checks ("evaluations") for managed runtimes. The
//! broker never creates evaluations from this crate; it only removes them when
//! a runtime is deprovisioned.
//!
//! # Endpoints
//!
//! | Call | Request | Success |
//! |------|---------|---------|
//! | [`EvaluationApi::remove_reference_from_parent_eval`] | `DELETE {api}/{parentId}/child/{evaluationId}` | any 2xx |
//! | [`EvaluationApi::delete_evaluation`] | `DELETE {api}/{evaluationId}` | any 2xx, or 404 |
//!
//! Both calls are idempotent on the AVS side, so they are safe to repeat when
//! a step is re-run after a crash.
//!
//! # Authentication
//!
//! Every request carries a bearer token obtained from the OAuth2 token
//! endpoint. Tokens are cached by [`TokenSource`] until shortly before expiry
//! and refetched once when AVS answers `401 Unauthorized`.

/// AVS connection settings loaded from environment variables.
pub mod config;

/// Error type shared by the token source and the client.
pub mod error;

/// OAuth2 token acquisition and caching.
pub mod oauth;

/// HTTP client and the [`EvaluationApi`] seam.
pub mod client;

pub use client::{Client, EvaluationApi};
pub use config::{Config, ConfigError};
pub use error::{AvsError, Result};
pub use oauth::TokenSource;
