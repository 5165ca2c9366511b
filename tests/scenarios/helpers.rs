//! Test utilities: a recording remote executor, step doubles and a harness
//! wiring a driver against the in-memory store

use async_trait::async_trait;
use flowstate::access::{AccessChecker, AllowAll, Principal};
use flowstate::core::{FailureInfo, FailureType, NodeContext, Outcome, OutcomeStore, Status};
use flowstate::dispatch::{RemoteExecutor, TaskCorrelator, TaskPayload, TaskResponse};
use flowstate::execution::{
    fold_responses, NodeDriver, StepError, StepExecutable, StepExecution, StepParameters,
    StepRegistry, StepResult,
};
use flowstate::policy::{FreezeConfig, FreezeEvaluator};
use flowstate::store::{ExecutionStore, MemoryStore};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Route engine logs through the test writer; `RUST_LOG` selects the level.
/// `try_init` makes repeated harness construction a no-op.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Remote executor double that records submissions and issues fresh
/// correlation ids
#[derive(Default)]
pub struct RecordingRemote {
    issued: Mutex<Vec<Uuid>>,
    payloads: Mutex<Vec<TaskPayload>>,
}

impl RecordingRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Correlation ids issued so far, in submission order
    pub async fn issued_ids(&self) -> Vec<Uuid> {
        self.issued.lock().await.clone()
    }

    pub async fn submitted_payloads(&self) -> Vec<TaskPayload> {
        self.payloads.lock().await.clone()
    }
}

#[async_trait]
impl RemoteExecutor for RecordingRemote {
    async fn submit(&self, payload: &TaskPayload) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        self.issued.lock().await.push(id);
        self.payloads.lock().await.push(payload.clone());
        Ok(id)
    }
}

/// Step that completes synchronously and publishes one outcome
pub struct EchoStep;

#[async_trait]
impl StepExecutable for EchoStep {
    fn step_type(&self) -> &str {
        "echo"
    }

    async fn validate_resources(
        &self,
        _ctx: &NodeContext,
        _params: &StepParameters,
        _access: &dyn AccessChecker,
    ) -> Result<(), StepError> {
        Ok(())
    }

    async fn execute(
        &self,
        _ctx: &NodeContext,
        params: &StepParameters,
        _outcomes: &OutcomeStore,
    ) -> Result<StepExecution, StepError> {
        Ok(StepExecution::Sync(StepResult::succeeded(vec![
            Outcome::new("echo", params.values.clone()),
        ])))
    }

    async fn handle_response(
        &self,
        _ctx: &NodeContext,
        _params: &StepParameters,
        _responses: HashMap<Uuid, TaskResponse>,
    ) -> Result<StepResult, StepError> {
        Err(StepError::Internal("echo never dispatches".into()))
    }

    async fn handle_abort(&self, _ctx: &NodeContext, _params: &StepParameters) {}
}

/// Step that fans out remote work and folds the responses
pub struct RemoteFetchStep {
    pub shards: usize,
    pub aborted: Arc<AtomicBool>,
}

impl RemoteFetchStep {
    pub fn new(shards: usize) -> Self {
        Self {
            shards,
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl StepExecutable for RemoteFetchStep {
    fn step_type(&self) -> &str {
        "remote_fetch"
    }

    async fn validate_resources(
        &self,
        _ctx: &NodeContext,
        _params: &StepParameters,
        _access: &dyn AccessChecker,
    ) -> Result<(), StepError> {
        Ok(())
    }

    async fn execute(
        &self,
        _ctx: &NodeContext,
        params: &StepParameters,
        _outcomes: &OutcomeStore,
    ) -> Result<StepExecution, StepError> {
        let payloads = (0..self.shards)
            .map(|shard| TaskPayload::new("fetch", json!({ "shard": shard })))
            .collect();
        Ok(StepExecution::Dispatch {
            payloads,
            timeout: params.timeout(Duration::from_secs(600)),
            wait_status: Status::TaskWaiting,
        })
    }

    async fn handle_response(
        &self,
        _ctx: &NodeContext,
        _params: &StepParameters,
        responses: HashMap<Uuid, TaskResponse>,
    ) -> Result<StepResult, StepError> {
        let mut result = fold_responses(&responses);
        if result.status == Status::Succeeded {
            result.outcomes.push(Outcome::new(
                "fetched",
                json!({ "responses": responses.len() }),
            ));
        }
        Ok(result)
    }

    async fn handle_abort(&self, _ctx: &NodeContext, _params: &StepParameters) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}

/// Step whose access check is delegated to the harness's checker
pub struct GuardedStep;

#[async_trait]
impl StepExecutable for GuardedStep {
    fn step_type(&self) -> &str {
        "guarded"
    }

    async fn validate_resources(
        &self,
        ctx: &NodeContext,
        _params: &StepParameters,
        access: &dyn AccessChecker,
    ) -> Result<(), StepError> {
        let resource = format!("environment/{}", ctx.project_id);
        if access
            .check_access(&Principal::new("engine"), &resource, "deploy")
            .await
        {
            Ok(())
        } else {
            Err(StepError::AccessDenied {
                resource,
                permission: "deploy".into(),
            })
        }
    }

    async fn execute(
        &self,
        _ctx: &NodeContext,
        _params: &StepParameters,
        _outcomes: &OutcomeStore,
    ) -> Result<StepExecution, StepError> {
        Ok(StepExecution::Sync(StepResult::succeeded(vec![])))
    }

    async fn handle_response(
        &self,
        _ctx: &NodeContext,
        _params: &StepParameters,
        _responses: HashMap<Uuid, TaskResponse>,
    ) -> Result<StepResult, StepError> {
        Err(StepError::Internal("guarded never dispatches".into()))
    }

    async fn handle_abort(&self, _ctx: &NodeContext, _params: &StepParameters) {}
}

/// Step that fails its first `failures` executions, then succeeds
pub struct FlakyStep {
    failures: usize,
    attempts: AtomicUsize,
}

impl FlakyStep {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StepExecutable for FlakyStep {
    fn step_type(&self) -> &str {
        "flaky"
    }

    async fn validate_resources(
        &self,
        _ctx: &NodeContext,
        _params: &StepParameters,
        _access: &dyn AccessChecker,
    ) -> Result<(), StepError> {
        Ok(())
    }

    async fn execute(
        &self,
        _ctx: &NodeContext,
        _params: &StepParameters,
        _outcomes: &OutcomeStore,
    ) -> Result<StepExecution, StepError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            Ok(StepExecution::Sync(StepResult::broken(
                Status::Failed,
                FailureInfo::single(FailureType::Application, "FLAKY", "transient failure"),
            )))
        } else {
            Ok(StepExecution::Sync(StepResult::succeeded(vec![])))
        }
    }

    async fn handle_response(
        &self,
        _ctx: &NodeContext,
        _params: &StepParameters,
        _responses: HashMap<Uuid, TaskResponse>,
    ) -> Result<StepResult, StepError> {
        Err(StepError::Internal("flaky never dispatches".into()))
    }

    async fn handle_abort(&self, _ctx: &NodeContext, _params: &StepParameters) {}
}

/// Driver plus the collaborators the tests observe
pub struct Harness {
    pub driver: NodeDriver,
    pub store: Arc<dyn ExecutionStore>,
    pub remote: Arc<RecordingRemote>,
    pub outcomes: Arc<OutcomeStore>,
}

/// Harness with a permissive access checker and no freeze windows
pub fn harness(steps: Vec<Arc<dyn StepExecutable>>) -> Harness {
    harness_with(steps, FreezeConfig::default(), Arc::new(AllowAll))
}

pub fn harness_with(
    steps: Vec<Arc<dyn StepExecutable>>,
    freeze: FreezeConfig,
    access: Arc<dyn AccessChecker>,
) -> Harness {
    init_tracing();
    let store: Arc<dyn ExecutionStore> = Arc::new(MemoryStore::new());
    let remote = Arc::new(RecordingRemote::new());
    let outcomes = Arc::new(OutcomeStore::new());

    let mut registry = StepRegistry::new();
    for step in steps {
        registry.register(step);
    }

    let correlator = Arc::new(TaskCorrelator::new(store.clone(), remote.clone()));
    let evaluator =
        Arc::new(FreezeEvaluator::new(freeze, access.clone()).expect("valid freeze config"));

    let driver = NodeDriver::new(
        store.clone(),
        Arc::new(registry),
        correlator,
        evaluator,
        access,
        outcomes.clone(),
    );

    Harness {
        driver,
        store,
        remote,
        outcomes,
    }
}

/// A node context for the given step type with fixed scope identifiers
pub fn context(step_type: &str) -> NodeContext {
    NodeContext::new(
        "deploy",
        "Deploy Service",
        step_type,
        Uuid::new_v4(),
        "acme",
        "storefront",
    )
}

pub fn actor() -> Principal {
    Principal::new("release-bot")
}
