/// Request orchestration: acquire a slot, write the workspace, run, release
use crate::config::engine::EngineConfig;
use crate::config::types::{GradingRequest, GradingResult, Result};
use crate::config::validator::validate_config;
use crate::exec::monitor::MemorySampler;
use crate::exec::runner::ProcessRunner;
use crate::judge::registry::AdapterRegistry;
use crate::safety::slot_store::{PoolStatus, SlotLease, SlotStore};
use crate::safety::workspace::WorkspaceWriter;
use log::{info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Grading engine. `Send + Sync`; share it through `Arc` across request threads.
pub struct Grader {
    store: Arc<SlotStore>,
    workspace: WorkspaceWriter,
    runner: ProcessRunner,
    acquire_timeout: Option<Duration>,
}

impl Grader {
    /// Validate `config`, create the slot layout and build the engine
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let validation = validate_config(config)?;
        for warning in &validation.warnings {
            warn!("Config warning: {}", warning);
        }

        let workspace = WorkspaceWriter::new(config.workspace_root.clone(), config.pool_size);
        let store = Arc::new(SlotStore::init(workspace.clone())?);
        let runner = ProcessRunner::new(
            workspace.clone(),
            AdapterRegistry::from_config(config),
            config.run_limits(),
        );

        Ok(Self {
            store,
            workspace,
            runner,
            acquire_timeout: config.acquire_timeout(),
        })
    }

    /// Replace the memory sampler used by the runner
    pub fn with_sampler(mut self, sampler: Arc<dyn MemorySampler>) -> Self {
        self.runner = self.runner.with_sampler(sampler);
        self
    }

    pub fn store(&self) -> &Arc<SlotStore> {
        &self.store
    }

    pub fn status(&self) -> PoolStatus {
        self.store.status()
    }

    /// Grade one request. The slot is released on every path; when both the
    /// run and the release fail, the run's error is returned.
    pub fn grade(&self, request: GradingRequest) -> Result<GradingResult> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        info!(
            "[{}] grading {} program against {} input(s)",
            request_id,
            request.language,
            request.inputs.len()
        );

        let lease = self.acquire()?;
        let slot_id = lease.slot_id();
        info!("[{}] acquired slot {}", request_id, slot_id);

        let graded = self.grade_in_slot(slot_id, &request);
        let released = lease.release();

        let result = match (graded, released) {
            (Ok(result), Ok(())) => Ok(result),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release_error)) => {
                warn!("[{}] release of slot {} also failed: {}", request_id, slot_id, release_error);
                Err(e)
            }
        };

        match &result {
            Ok(graded) => info!(
                "[{}] finished in {} ms: timeout={} memory={} runtime_errors={}",
                request_id,
                started.elapsed().as_millis(),
                graded.is_timeout,
                graded.is_memory_exceeded,
                graded.has_runtime_errors
            ),
            Err(e) => warn!("[{}] failed after {} ms: {}", request_id, started.elapsed().as_millis(), e),
        }
        result
    }

    fn acquire(&self) -> Result<SlotLease<'_>> {
        match self.acquire_timeout {
            Some(timeout) => self.store.acquire_timeout(timeout),
            None => self.store.acquire(),
        }
    }

    fn grade_in_slot(&self, slot_id: usize, request: &GradingRequest) -> Result<GradingResult> {
        let adapter = self.runner.registry().adapter_for(request.language);
        // Fail before touching the workspace when the language cannot run
        adapter.run_command()?;

        self.workspace
            .write_source(slot_id, request.language, &request.code)?;
        for (index, input) in request.inputs.iter().enumerate() {
            self.workspace.write_input(slot_id, input, index)?;
        }

        let limits = self
            .runner
            .limits()
            .clone()
            .with_time_limit_ms(request.time_limit_ms);
        self.runner.execute(slot_id, adapter, &limits)
    }
}

impl std::fmt::Debug for Grader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grader")
            .field("capacity", &self.store.capacity())
            .field("root", &self.workspace.root())
            .field("acquire_timeout", &self.acquire_timeout)
            .finish_non_exhaustive()
    }
}
