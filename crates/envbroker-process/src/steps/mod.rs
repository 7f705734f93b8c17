// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Steps run by the deprovisioning and update pipelines.

mod evaluation_removal;
mod init_runtime_version;

pub use evaluation_removal::EvaluationRemovalStep;
pub use init_runtime_version::{InitRuntimeVersionStep, STATE_LOOKUP_CHAIN, StateLookup};

use std::sync::Arc;
use std::time::Duration;

use envbroker_avs::EvaluationApi;

use crate::evaluation::{Delegator, ExternalEvalAssistant, InternalEvalAssistant};
use crate::manager::OperationManager;
use crate::operation::OperationType;
use crate::persistence::RuntimeStateStore;
use crate::pipeline::Pipeline;
use crate::runtime_version::VersionConfigurator;

/// Interval between retries of a failing external call.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Total time a step keeps retrying before the operation fails.
pub const RETRY_MAX_TIME: Duration = Duration::from_secs(60);

/// Deprovisioning: remove the runtime's evaluations under `parent_id`.
pub fn deprovisioning_pipeline(
    manager: OperationManager,
    avs: Arc<dyn EvaluationApi>,
    parent_id: i64,
) -> Pipeline {
    let removal = EvaluationRemovalStep::new(
        Delegator::new(avs, manager.clone()),
        manager.clone(),
        Arc::new(InternalEvalAssistant::new(parent_id)),
        Arc::new(ExternalEvalAssistant::new(parent_id)),
    );
    Pipeline::new(OperationType::Deprovision, manager).with_step(Arc::new(removal))
}

/// Update: resolve the target version and the state the update starts from.
pub fn update_pipeline(
    manager: OperationManager,
    configurator: Arc<dyn VersionConfigurator>,
    runtime_states: Arc<dyn RuntimeStateStore>,
) -> Pipeline {
    let init = InitRuntimeVersionStep::new(manager.clone(), configurator, runtime_states);
    Pipeline::new(OperationType::Update, manager).with_step(Arc::new(init))
}
