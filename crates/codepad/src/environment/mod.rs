//! Live dev-server environment
//!
//! A virtual machine is booted once and reused. Each lifecycle mounts a small
//! Vite project for the selected framework, installs its dependencies, starts
//! the dev server and binds the served URL into the sandbox. While the server
//! is up, further runs only overwrite the component source and let hot module
//! replacement pick it up.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};

pub use crate::environment::local::{LocalHost, LocalMachine, ReadinessScanner};
pub use crate::environment::orchestrator::{
    EnvironmentOrchestrator, EnvironmentSession, EnvironmentState, LiveOutcome,
};
pub use crate::environment::project::{ProjectTree, source_path};

mod local;
mod orchestrator;
mod project;

/// Errors raised while driving the environment.
///
/// Cloneable so one boot failure can be handed to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentError {
    #[error("failed to boot environment: {0}")]
    BootFailed(String),

    #[error("failed to mount project: {0}")]
    MountFailed(String),

    #[error("failed to spawn '{command}': {message}")]
    SpawnFailed { command: String, message: String },

    #[error("dependency install exited with code {exit_code}")]
    InstallFailed { exit_code: i32, log_tail: String },

    #[error("dev server exited with code {exit_code}")]
    StartFailed { exit_code: i32, log_tail: String },

    #[error("dev server readiness signal was lost")]
    ReadySignalLost,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("environment was reset")]
    Cancelled,
}

impl EnvironmentError {
    /// Last chunk of process output for failed commands
    pub fn log_tail(&self) -> Option<&str> {
        match self {
            EnvironmentError::InstallFailed { log_tail, .. }
            | EnvironmentError::StartFailed { log_tail, .. } => Some(log_tail),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EnvironmentError {
    fn from(err: std::io::Error) -> Self {
        EnvironmentError::Io(err.to_string())
    }
}

/// A dev server announcing that it accepts connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReady {
    pub port: u16,
    pub url: String,
}

/// Stops a spawned process when triggered or dropped
#[derive(Debug)]
pub struct KillHandle(Option<oneshot::Sender<()>>);

impl KillHandle {
    pub fn new(tx: oneshot::Sender<()>) -> Self {
        Self(Some(tx))
    }

    pub fn kill(mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// A process running inside the machine
#[derive(Debug)]
pub struct VmProcess {
    /// Raw output chunks; closed when the process stops writing
    pub output: mpsc::Receiver<String>,
    /// Exit code, sent once the process ends
    pub exit: oneshot::Receiver<i32>,
    pub kill: KillHandle,
}

/// A booted virtual machine
#[async_trait]
pub trait VirtualMachine: Send + Sync {
    /// Write a whole project tree into the machine's filesystem
    async fn mount(&self, tree: &ProjectTree) -> Result<(), EnvironmentError>;

    async fn write_file(&self, path: &str, contents: &str) -> Result<(), EnvironmentError>;

    async fn spawn(&self, command: &str, args: &[String]) -> Result<VmProcess, EnvironmentError>;

    /// Subscribe to server readiness announcements
    fn server_ready(&self) -> broadcast::Receiver<ServerReady>;
}

/// Boots virtual machines
#[async_trait]
pub trait MachineHost: Send + Sync {
    async fn boot(&self) -> Result<Arc<dyn VirtualMachine>, EnvironmentError>;
}
