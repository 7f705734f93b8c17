// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Environment broker worker
//!
//! Picks up deprovisioning and update operations and runs their pipelines:
//! - Deprovisioning removes the runtime's AVS evaluations
//! - Update resolves the target runtime version and last runtime state

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use envbroker_process::config::Config;
use envbroker_process::manager::OperationManager;
use envbroker_process::operation::OperationType;
use envbroker_process::persistence::{OperationStore, SqliteStore};
use envbroker_process::pipeline::Processor;
use envbroker_process::queue::Queue;
use envbroker_process::runtime_version::{RuntimeVersionConfigurator, StaticAccountMapping};
use envbroker_process::steps::{deprovisioning_pipeline, update_pipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first so RUST_LOG can come from it
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "envbroker_process=info,envbroker_avs=info".into()),
        )
        .init();

    if let Err(e) = dotenv {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;
    let avs_config = envbroker_avs::Config::from_env()?;

    info!(
        workers = config.workers,
        default_runtime_version = %config.default_runtime_version,
        avs_endpoint = %avs_config.api_endpoint,
        "Starting environment broker worker"
    );

    let store = Arc::new(SqliteStore::connect(&config.database_url).await?);
    info!("Connected to database");

    let manager = OperationManager::new(store.clone());
    let avs = Arc::new(envbroker_avs::Client::new(&avs_config)?);
    let mut configurator = RuntimeVersionConfigurator::new(config.default_runtime_version.clone())?;
    if let Some(path) = &config.account_version_mapping {
        let mapping = StaticAccountMapping::from_file(path)?;
        info!(path = %path.display(), pins = mapping.len(), "Loaded account version mapping");
        configurator = configurator.with_account_mapping(Arc::new(mapping));
    }
    let configurator = Arc::new(configurator);

    let processor = Processor::new(store.clone())
        .with_pipeline(deprovisioning_pipeline(
            manager.clone(),
            avs,
            avs_config.parent_id,
        ))
        .with_pipeline(update_pipeline(manager, configurator, store.clone()));

    let shutdown = CancellationToken::new();
    let queue = Queue::new(Arc::new(processor), shutdown.clone());

    // Resume work left behind by a previous run
    for operation_type in [OperationType::Deprovision, OperationType::Update] {
        let unfinished = store.list_unfinished_operations(operation_type).await?;
        info!(
            operation_type = %operation_type,
            count = unfinished.len(),
            "Requeueing unfinished operations"
        );
        for operation in unfinished {
            queue.add(operation.id);
        }
    }

    let running = tokio::spawn(queue.run(config.workers));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    shutdown.cancel();
    running.await?;

    info!("Environment broker worker shut down");

    Ok(())
}
