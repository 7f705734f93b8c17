// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Target runtime version resolution.
//!
//! Per-account pins are looked up through [`AccountVersionMapping`]. The
//! worker binary loads them from the JSON file named by
//! `BROKER_ACCOUNT_VERSION_MAPPING` into a [`StaticAccountMapping`]; embedders
//! can plug in any other source.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::operation::Operation;

/// Where a resolved runtime version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionOrigin {
    /// Requested explicitly in the provisioning parameters.
    Parameters,
    /// Broker default.
    #[default]
    Defaults,
    /// Per-account override.
    AccountMapping,
}

/// A resolved runtime version.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuntimeVersionData {
    /// Full version string, e.g. `2.4.1` or `PR-1234`.
    pub version: String,
    /// Leading numeric component of `version`.
    pub major_version: u32,
    /// Source of the version.
    pub origin: VersionOrigin,
}

impl RuntimeVersionData {
    /// Create version data with an explicit major version.
    pub fn new(version: impl Into<String>, origin: VersionOrigin, major_version: u32) -> Self {
        Self {
            version: version.into(),
            major_version,
            origin,
        }
    }

    /// No version has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.version.is_empty()
    }
}

/// Leading numeric component of a version, ignoring an optional `v` prefix.
///
/// Returns `None` for versions such as `main` or `PR-1234`.
pub fn parse_major_version(version: &str) -> Option<u32> {
    version
        .trim_start_matches('v')
        .split('.')
        .next()
        .and_then(|major| major.parse().ok())
}

/// Errors from version resolution.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VersionError {
    /// The account mapping backend could not be queried.
    #[error("account mapping lookup failed: {0}")]
    AccountMapping(String),

    /// A resolved version is unusable.
    #[error("invalid runtime version '{0}'")]
    Invalid(String),
}

/// Resolves the runtime version an operation should target.
#[async_trait]
pub trait VersionConfigurator: Send + Sync {
    /// Version for an update operation.
    async fn for_updating(&self, operation: &Operation) -> Result<RuntimeVersionData, VersionError>;
}

/// Per-account version overrides.
#[async_trait]
pub trait AccountVersionMapping: Send + Sync {
    /// Version pinned for the account, subaccount pins win over global account pins.
    async fn get(
        &self,
        global_account_id: &str,
        subaccount_id: &str,
    ) -> Result<Option<String>, VersionError>;
}

/// Account pins held in memory, keyed by global account or subaccount ID.
///
/// The file form is a flat JSON object:
///
/// ```json
/// { "<global account id>": "2.4.0", "<subaccount id>": "PR-1234" }
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticAccountMapping {
    versions: HashMap<String, String>,
}

impl StaticAccountMapping {
    /// Create a mapping from account ID to pinned version.
    pub fn new(versions: HashMap<String, String>) -> Self {
        Self { versions }
    }

    /// Load pins from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, VersionError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            VersionError::AccountMapping(format!("cannot read {}: {}", path.display(), e))
        })?;
        let versions = serde_json::from_str(&raw).map_err(|e| {
            VersionError::AccountMapping(format!("invalid mapping in {}: {}", path.display(), e))
        })?;
        Ok(Self { versions })
    }

    /// Number of pinned accounts.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

#[async_trait]
impl AccountVersionMapping for StaticAccountMapping {
    async fn get(
        &self,
        global_account_id: &str,
        subaccount_id: &str,
    ) -> Result<Option<String>, VersionError> {
        Ok(self
            .versions
            .get(subaccount_id)
            .or_else(|| self.versions.get(global_account_id))
            .cloned())
    }
}

/// Default [`VersionConfigurator`]: parameters, then account mapping, then default.
pub struct RuntimeVersionConfigurator {
    default_version: String,
    default_major_version: u32,
    account_mapping: Option<Arc<dyn AccountVersionMapping>>,
}

impl RuntimeVersionConfigurator {
    /// Create a configurator falling back to `default_version`.
    pub fn new(default_version: impl Into<String>) -> Result<Self, VersionError> {
        let default_version = default_version.into();
        let default_major_version = parse_major_version(&default_version)
            .ok_or_else(|| VersionError::Invalid(default_version.clone()))?;
        Ok(Self {
            default_version,
            default_major_version,
            account_mapping: None,
        })
    }

    /// Consult `mapping` before falling back to the default.
    pub fn with_account_mapping(mut self, mapping: Arc<dyn AccountVersionMapping>) -> Self {
        self.account_mapping = Some(mapping);
        self
    }

    fn version_data(&self, version: String, origin: VersionOrigin) -> RuntimeVersionData {
        // PR and branch builds carry no number; treat them like the default line
        let major = parse_major_version(&version).unwrap_or(self.default_major_version);
        RuntimeVersionData::new(version, origin, major)
    }
}

#[async_trait]
impl VersionConfigurator for RuntimeVersionConfigurator {
    async fn for_updating(&self, operation: &Operation) -> Result<RuntimeVersionData, VersionError> {
        let params = &operation.provisioning_parameters;
        if let Some(requested) = params.runtime_version.as_deref()
            && !requested.is_empty()
        {
            return Ok(self.version_data(requested.to_string(), VersionOrigin::Parameters));
        }

        if let Some(mapping) = &self.account_mapping
            && let Some(pinned) = mapping
                .get(&params.global_account_id, &params.subaccount_id)
                .await?
        {
            return Ok(self.version_data(pinned, VersionOrigin::AccountMapping));
        }

        Ok(self.version_data(self.default_version.clone(), VersionOrigin::Defaults))
    }
}
