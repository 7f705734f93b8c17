// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Environment broker operation processing.
//!
//! The broker records every lifecycle request (provisioning, deprovisioning,
//! update) as an [`Operation`](operation::Operation). This crate advances
//! those operations by running a fixed pipeline of idempotent steps for each
//! operation type.
//!
//! # Flow
//!
//! ```text
//! Queue ──► Processor ──► Pipeline ──► Step::run(operation)
//!                                          │
//!                     ┌────────────────────┴──────────────┐
//!                     ▼                                   ▼
//!             OperationManager                  external collaborators
//!     (retry_operation, update_operation)        (AVS, version config)
//!                     │
//!                     ▼
//!              OperationStore
//! ```
//!
//! A step returns `(operation, delay)`:
//!
//! | Result | Meaning |
//! |--------|---------|
//! | `Ok((op, 0))` | step done, the pipeline moves on |
//! | `Ok((op, delay))` | run the same step again after `delay` |
//! | `Err(_)` | the operation halts |
//!
//! All writes go through [`OperationManager`](manager::OperationManager),
//! which applies optimistic concurrency on the operation `version`.
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `BROKER_DATABASE_URL` | Yes | - | SQLite connection URL |
//! | `BROKER_DEFAULT_RUNTIME_VERSION` | Yes | - | Fallback runtime version for updates |
//! | `BROKER_WORKERS` | No | `5` | Queue workers |
//! | `BROKER_ACCOUNT_VERSION_MAPPING` | No | - | JSON file with per-account version pins |
//!
//! The AVS client reads its own `AVS_*` variables, see [`envbroker_avs::Config`].

/// Worker configuration loaded from environment variables.
pub mod config;

/// Error types for stores, steps and pipelines.
pub mod error;

/// AVS evaluation assistants and the removal delegator.
pub mod evaluation;

/// Retry scheduling and optimistic operation updates.
pub mod manager;

/// Operation and runtime state records.
pub mod operation;

/// Operation and runtime state stores.
pub mod persistence;

/// Pipelines, the processor and the [`Executor`](pipeline::Executor) seam.
pub mod pipeline;

/// Service plan identifiers.
pub mod plan;

/// Worker pool.
pub mod queue;

/// Runtime version resolution.
pub mod runtime_version;

/// The step contract.
pub mod step;

/// Deprovisioning and update steps.
pub mod steps;

#[cfg(test)]
mod testing;
