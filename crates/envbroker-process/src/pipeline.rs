// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Step pipelines and the processor dispatching operations to them.
//!
//! A [`Pipeline`] owns the fixed, ordered steps of one operation type. Every
//! completed step is recorded in `finished_stages`, so a requeued operation
//! resumes at the first step that has not completed yet. The step that asked
//! for a delay is re-run after it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{Span, debug, error, info, info_span};

use crate::error::{ProcessError, StepError};
use crate::manager::OperationManager;
use crate::operation::{Operation, OperationState, OperationType};
use crate::persistence::OperationStore;
use crate::step::Step;

/// Runs an operation and tells the caller when to run it again.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Process the operation. A non-zero delay asks to be called again after it.
    async fn execute(&self, operation_id: &str) -> Result<Duration, ProcessError>;
}

/// Ordered steps for one operation type.
pub struct Pipeline {
    operation_type: OperationType,
    manager: OperationManager,
    steps: Vec<Arc<dyn Step>>,
}

impl Pipeline {
    /// Create an empty pipeline for `operation_type`, persisting through `manager`.
    pub fn new(operation_type: OperationType, manager: OperationManager) -> Self {
        Self {
            operation_type,
            manager,
            steps: Vec::new(),
        }
    }

    /// Append a step.
    pub fn with_step(mut self, step: Arc<dyn Step>) -> Self {
        self.steps.push(step);
        self
    }

    /// Operation type this pipeline handles.
    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Run the remaining steps of `operation`.
    ///
    /// Returns the delay requested by a step, or zero once the operation has
    /// finished, successfully or not.
    pub async fn run(&self, operation: Operation, log: &Span) -> Result<Duration, ProcessError> {
        if operation.state.is_terminal() {
            debug!(parent: log, state = %operation.state.as_str(), "Operation already finished");
            return Ok(Duration::ZERO);
        }

        let mut operation = operation;
        if operation.state == OperationState::Pending {
            (operation, _) = self
                .manager
                .update_operation(operation, |op| op.state = OperationState::InProgress, log)
                .await
                .map_err(|source| ProcessError::Step {
                    step: "start",
                    source,
                })?;
        }

        for step in &self.steps {
            let name = step.name();
            if operation.is_stage_finished(name) {
                debug!(parent: log, step = name, "Skipping finished step");
                continue;
            }

            let step_log = info_span!(parent: log, "step", step = name);
            match step.run(operation.clone(), &step_log).await {
                Ok((_, delay)) if !delay.is_zero() => {
                    info!(parent: log, step = name, delay_secs = delay.as_secs(), "Step will be retried");
                    return Ok(delay);
                }
                Ok((processed, _)) => {
                    (operation, _) = self
                        .manager
                        .update_operation(
                            processed,
                            |op| {
                                if !op.is_stage_finished(name) {
                                    op.finished_stages.push(name.to_string());
                                }
                            },
                            log,
                        )
                        .await
                        .map_err(|source| ProcessError::Step { step: name, source })?;
                    info!(parent: log, step = name, "Step finished");
                }
                Err(source) => {
                    if !matches!(source, StepError::OperationFailed { .. }) {
                        // the step did not record the failure itself
                        let recorded = self
                            .manager
                            .operation_failed(operation, name, Some(&source), log)
                            .await;
                        if let Err(StepError::Store(e)) = recorded {
                            error!(parent: log, step = name, error = %e, "Unable to mark operation failed");
                        }
                    }
                    error!(parent: log, step = name, error = %source, "Step failed");
                    return Err(ProcessError::Step { step: name, source });
                }
            }
        }

        self.manager
            .operation_succeeded(operation, "Operation succeeded", log)
            .await
            .map_err(|source| ProcessError::Step {
                step: "finish",
                source,
            })?;
        info!(parent: log, "Operation succeeded");
        Ok(Duration::ZERO)
    }
}

/// Loads operations and hands them to the pipeline for their type.
pub struct Processor {
    store: Arc<dyn OperationStore>,
    pipelines: HashMap<OperationType, Pipeline>,
}

impl Processor {
    /// Create a processor loading operations from `store`, with no pipelines yet.
    pub fn new(store: Arc<dyn OperationStore>) -> Self {
        Self {
            store,
            pipelines: HashMap::new(),
        }
    }

    /// Register `pipeline`, replacing any pipeline for the same type.
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipelines.insert(pipeline.operation_type(), pipeline);
        self
    }
}

#[async_trait]
impl Executor for Processor {
    async fn execute(&self, operation_id: &str) -> Result<Duration, ProcessError> {
        let operation = self.store.get_operation_by_id(operation_id).await?;
        let pipeline = self
            .pipelines
            .get(&operation.operation_type)
            .ok_or(ProcessError::NoPipeline(operation.operation_type))?;

        let log = info_span!(
            "operation",
            operation_id = %operation.id,
            operation_type = %operation.operation_type,
        );
        pipeline.run(operation, &log).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::operation::ProvisioningParameters;
    use crate::persistence::MemoryStore;
    use crate::step::StepResult;
    use std::sync::Mutex;

    /// Step returning scripted results and counting its runs.
    struct ScriptedStep {
        name: &'static str,
        delays: Mutex<Vec<Duration>>,
        runs: Mutex<Vec<String>>,
        fail: bool,
    }

    impl ScriptedStep {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                delays: Mutex::new(Vec::new()),
                runs: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        /// Ask for `delay` on the first run, then complete.
        fn delayed_once(name: &'static str, delay: Duration) -> Self {
            let step = Self::new(name);
            step.delays.lock().unwrap().push(delay);
            step
        }

        fn failing(name: &'static str) -> Self {
            Self {
                fail: true,
                ..Self::new(name)
            }
        }

        fn runs(&self) -> usize {
            self.runs.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Step for ScriptedStep {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, operation: Operation, _log: &Span) -> StepResult {
            self.runs.lock().unwrap().push(operation.id.clone());
            if self.fail {
                return Err(StepError::Store(StoreError::Database(
                    "disk full".to_string(),
                )));
            }
            let delay = self.delays.lock().unwrap().pop().unwrap_or(Duration::ZERO);
            Ok((operation, delay))
        }
    }

    /// Store that rejects every write.
    struct ReadOnlyStore(MemoryStore);

    #[async_trait]
    impl OperationStore for ReadOnlyStore {
        async fn insert_operation(&self, operation: &Operation) -> Result<(), StoreError> {
            self.0.insert_operation(operation).await
        }

        async fn get_operation_by_id(&self, id: &str) -> Result<Operation, StoreError> {
            self.0.get_operation_by_id(id).await
        }

        async fn update_operation(&self, _: &Operation) -> Result<Operation, StoreError> {
            Err(StoreError::Database("attempt to write a readonly database".to_string()))
        }

        async fn list_unfinished_operations(
            &self,
            operation_type: OperationType,
        ) -> Result<Vec<Operation>, StoreError> {
            self.0.list_unfinished_operations(operation_type).await
        }
    }

    async fn setup(operation_type: OperationType) -> (Arc<MemoryStore>, Operation) {
        let store = Arc::new(MemoryStore::new());
        let op = Operation::new(
            operation_type,
            "instance-1",
            "runtime-1",
            ProvisioningParameters::default(),
        );
        store.insert_operation(&op).await.unwrap();
        (store, op)
    }

    #[tokio::test]
    async fn test_runs_steps_in_order_and_succeeds() {
        let (store, op) = setup(OperationType::Deprovision).await;
        let first = Arc::new(ScriptedStep::new("first"));
        let second = Arc::new(ScriptedStep::new("second"));
        let processor = Processor::new(store.clone()).with_pipeline(
            Pipeline::new(OperationType::Deprovision, OperationManager::new(store.clone()))
                .with_step(first.clone())
                .with_step(second.clone()),
        );

        let delay = processor.execute(&op.id).await.unwrap();

        assert_eq!(delay, Duration::ZERO);
        assert_eq!(first.runs(), 1);
        assert_eq!(second.runs(), 1);
        let in_db = store.get_operation_by_id(&op.id).await.unwrap();
        assert_eq!(in_db.state, OperationState::Succeeded);
        assert_eq!(in_db.finished_stages, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_delay_stops_and_resumes_at_same_step() {
        let (store, op) = setup(OperationType::Update).await;
        let first = Arc::new(ScriptedStep::new("first"));
        let second = Arc::new(ScriptedStep::delayed_once("second", Duration::from_secs(5)));
        let third = Arc::new(ScriptedStep::new("third"));
        let processor = Processor::new(store.clone()).with_pipeline(
            Pipeline::new(OperationType::Update, OperationManager::new(store.clone()))
                .with_step(first.clone())
                .with_step(second.clone())
                .with_step(third.clone()),
        );

        let delay = processor.execute(&op.id).await.unwrap();
        assert_eq!(delay, Duration::from_secs(5));
        assert_eq!(third.runs(), 0);
        let in_db = store.get_operation_by_id(&op.id).await.unwrap();
        assert_eq!(in_db.state, OperationState::InProgress);
        assert_eq!(in_db.finished_stages, vec!["first"]);

        let delay = processor.execute(&op.id).await.unwrap();
        assert_eq!(delay, Duration::ZERO);
        assert_eq!(first.runs(), 1);
        assert_eq!(second.runs(), 2);
        assert_eq!(third.runs(), 1);
        let in_db = store.get_operation_by_id(&op.id).await.unwrap();
        assert_eq!(in_db.state, OperationState::Succeeded);
    }

    #[tokio::test]
    async fn test_step_error_marks_operation_failed() {
        let (store, op) = setup(OperationType::Deprovision).await;
        let broken = Arc::new(ScriptedStep::failing("broken"));
        let after = Arc::new(ScriptedStep::new("after"));
        let processor = Processor::new(store.clone()).with_pipeline(
            Pipeline::new(OperationType::Deprovision, OperationManager::new(store.clone()))
                .with_step(broken)
                .with_step(after.clone()),
        );

        let err = processor.execute(&op.id).await.unwrap_err();

        assert!(matches!(err, ProcessError::Step { step: "broken", .. }));
        assert_eq!(after.runs(), 0);
        let in_db = store.get_operation_by_id(&op.id).await.unwrap();
        assert_eq!(in_db.state, OperationState::Failed);
        assert_eq!(in_db.description, "broken: database error: disk full");
    }

    #[tokio::test]
    async fn test_finished_operation_is_not_rerun() {
        let (store, op) = setup(OperationType::Deprovision).await;
        let step = Arc::new(ScriptedStep::new("only"));
        let processor = Processor::new(store.clone()).with_pipeline(
            Pipeline::new(OperationType::Deprovision, OperationManager::new(store.clone()))
                .with_step(step.clone()),
        );

        processor.execute(&op.id).await.unwrap();
        processor.execute(&op.id).await.unwrap();

        assert_eq!(step.runs(), 1);
    }

    #[tokio::test]
    async fn test_unknown_operation_type() {
        let (store, op) = setup(OperationType::Provision).await;
        let processor = Processor::new(store.clone()).with_pipeline(Pipeline::new(
            OperationType::Deprovision,
            OperationManager::new(store.clone()),
        ));

        let err = processor.execute(&op.id).await.unwrap_err();
        assert!(matches!(err, ProcessError::NoPipeline(OperationType::Provision)));
    }

    #[tokio::test]
    async fn test_missing_operation() {
        let store = Arc::new(MemoryStore::new());
        let processor = Processor::new(store);

        let err = processor.execute("nope").await.unwrap_err();
        assert!(matches!(err, ProcessError::Store(e) if e.is_not_found()));
    }

    #[test]
    fn test_step_names() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(OperationType::Update, OperationManager::new(store))
            .with_step(Arc::new(ScriptedStep::new("a")))
            .with_step(Arc::new(ScriptedStep::new("b")));
        assert_eq!(pipeline.step_names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_step_error_reported_when_failure_cannot_be_saved() {
        let store = Arc::new(ReadOnlyStore(MemoryStore::new()));
        let mut op = Operation::new(
            OperationType::Deprovision,
            "instance-1",
            "runtime-1",
            ProvisioningParameters::default(),
        );
        op.state = OperationState::InProgress;
        store.insert_operation(&op).await.unwrap();
        let processor = Processor::new(store.clone()).with_pipeline(
            Pipeline::new(OperationType::Deprovision, OperationManager::new(store.clone()))
                .with_step(Arc::new(ScriptedStep::failing("broken"))),
        );

        let err = processor.execute(&op.id).await.unwrap_err();

        assert!(matches!(
            err,
            ProcessError::Step {
                step: "broken",
                source: StepError::Store(StoreError::Database(_)),
            }
        ));
        let in_db = store.get_operation_by_id(&op.id).await.unwrap();
        assert_eq!(in_db.state, OperationState::InProgress);
    }
}
