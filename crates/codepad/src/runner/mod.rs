//! Run routing for codepad
//!
//! The [`Router`] owns the selected language and sends each run to exactly one
//! backend: the remote judge, the compile service plus preview assembly, or
//! the live environment. Every run takes a generation ticket; a completion
//! whose ticket is no longer current is dropped without touching the output
//! or the run artifacts.

use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, instrument};

mod bundle;
mod live;
mod remote;

use crate::config::{Config, LanguageDescriptor};
use crate::environment::{
    EnvironmentError, EnvironmentOrchestrator, LiveOutcome, MachineHost,
};
use crate::output::OutputLog;
use crate::sandbox::{ResourceHandle, ResourceStore, SandboxHost, SandboxSurface};
use crate::services::{
    CompilationError, CompileClient, CompileService, CompileServiceError, JudgeClient, JudgeError,
    JudgeService,
};
use crate::types::{ExecutionResult, ExecutionStrategy, PreviewDocument};

/// Errors returned by a run
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no language selected")]
    NoLanguage,

    #[error("judge error: {0}")]
    Judge(#[from] JudgeError),

    #[error("compile error: {0}")]
    Compile(#[from] CompileServiceError),

    #[error("environment error: {0}")]
    Environment(#[from] EnvironmentError),
}

/// What a run produced
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Console result from the remote judge
    Executed(ExecutionResult),
    /// An assembled preview is being shown under `handle`
    Rendered { handle: ResourceHandle },
    /// The live environment handled the run
    Live(LiveOutcome),
    /// A newer run or a language change made this one obsolete
    Superseded,
}

/// Results kept from the most recent run
#[derive(Debug, Clone, Default)]
pub struct RunArtifacts {
    pub result: Option<ExecutionResult>,
    pub preview: Option<PreviewDocument>,
    pub compile_error: Option<CompilationError>,
}

#[derive(Debug, Default)]
struct RouterState {
    descriptor: Option<LanguageDescriptor>,
    generation: u64,
    running: bool,
    artifacts: RunArtifacts,
}

/// Dispatches runs for the selected language
pub struct Router {
    judge: Arc<dyn JudgeService>,
    compiler: Arc<dyn CompileService>,
    environment: Arc<EnvironmentOrchestrator>,
    sandbox: Arc<SandboxHost>,
    output: OutputLog,
    state: Mutex<RouterState>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("state", &*self.state())
            .field("sandbox", &self.sandbox)
            .finish_non_exhaustive()
    }
}

impl Router {
    /// Create a router over existing backends.
    ///
    /// `sandbox` and `environment` should share `output` so every path
    /// publishes into the same log.
    pub fn new(
        judge: Arc<dyn JudgeService>,
        compiler: Arc<dyn CompileService>,
        environment: Arc<EnvironmentOrchestrator>,
        sandbox: Arc<SandboxHost>,
        output: OutputLog,
    ) -> Self {
        Self {
            judge,
            compiler,
            environment,
            sandbox,
            output,
            state: Mutex::new(RouterState::default()),
        }
    }

    /// Wire HTTP clients, a sandbox and an environment from configuration
    pub fn from_config(
        config: &Config,
        surface: Arc<dyn SandboxSurface>,
        store: Arc<dyn ResourceStore>,
        host: Arc<dyn MachineHost>,
    ) -> Result<Self, RunError> {
        let output = OutputLog::new();
        let sandbox = Arc::new(SandboxHost::new(surface, store, output.clone()));
        let environment = Arc::new(EnvironmentOrchestrator::new(
            host,
            Arc::clone(&sandbox),
            output.clone(),
            config.environment.clone(),
        ));

        Ok(Self::new(
            Arc::new(JudgeClient::from_config(&config.services)?),
            Arc::new(CompileClient::from_config(&config.services)?),
            environment,
            sandbox,
            output,
        ))
    }

    /// Make `descriptor` the current language.
    ///
    /// Any run in flight is abandoned, artifacts are dropped and the surface
    /// and output are cleared. A live lifecycle still underway is cancelled,
    /// and a running dev server stops publishing until the next live run.
    /// Returns the starter template for the editor.
    pub fn select_language(&self, descriptor: LanguageDescriptor) -> String {
        debug!(id = %descriptor.id, strategy = descriptor.strategy.label(), "selecting language");
        let template = descriptor.template.clone();
        {
            let mut state = self.state();
            state.generation += 1;
            state.running = false;
            state.artifacts = RunArtifacts::default();
            state.descriptor = Some(descriptor);
        }
        self.environment.detach();
        self.sandbox.clear();
        self.output.clear();
        template
    }

    /// Run `source` with the current language
    #[instrument(skip(self, source), fields(len = source.len()))]
    pub async fn run(&self, source: &str) -> Result<RunOutcome, RunError> {
        let (ticket, strategy) = self.begin()?;
        debug!(ticket, strategy = strategy.label(), "dispatching run");

        match strategy {
            ExecutionStrategy::RemoteJudge { judge_id } => {
                self.run_remote(ticket, source, judge_id).await
            }
            ExecutionStrategy::StaticCompile { framework } => {
                self.run_bundle(ticket, source, framework).await
            }
            ExecutionStrategy::LiveEnvironment { framework } => {
                self.run_live(ticket, source, framework).await
            }
        }
    }

    /// Whether the latest run has not completed yet
    pub fn is_running(&self) -> bool {
        self.state().running
    }

    pub fn descriptor(&self) -> Option<LanguageDescriptor> {
        self.state().descriptor.clone()
    }

    /// Artifacts of the latest completed run
    pub fn artifacts(&self) -> RunArtifacts {
        self.state().artifacts.clone()
    }

    pub fn output(&self) -> &OutputLog {
        &self.output
    }

    pub fn sandbox(&self) -> &Arc<SandboxHost> {
        &self.sandbox
    }

    pub fn environment(&self) -> &Arc<EnvironmentOrchestrator> {
        &self.environment
    }

    /// Take a ticket and clear what the previous run left behind
    fn begin(&self) -> Result<(u64, ExecutionStrategy), RunError> {
        let (ticket, strategy) = {
            let mut state = self.state();
            let strategy = state
                .descriptor
                .as_ref()
                .map(|descriptor| descriptor.strategy)
                .ok_or(RunError::NoLanguage)?;
            state.generation += 1;
            state.running = true;
            state.artifacts = RunArtifacts::default();
            (state.generation, strategy)
        };
        self.sandbox.reset_for_run();
        Ok((ticket, strategy))
    }

    /// Lock the state for completing run `ticket`, or `None` if it is stale.
    ///
    /// A current ticket is marked finished.
    fn complete(&self, ticket: u64) -> Option<MutexGuard<'_, RouterState>> {
        let mut state = self.state();
        if state.generation != ticket {
            debug!(ticket, current = state.generation, "discarding stale completion");
            return None;
        }
        state.running = false;
        Some(state)
    }

    fn state(&self) -> MutexGuard<'_, RouterState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
