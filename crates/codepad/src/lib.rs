//! Execution and preview orchestration for code playgrounds.
//!
//! Codepad takes source text in a selected language and either runs it on a
//! remote judge, compiles it into a static bundle and hosts the assembled
//! preview, or drives a live dev server in a virtual environment. All paths
//! publish into one shared output log and one sandboxed surface.
//!
//! # Features
//!
//! - **Routing** — One [`Router`] dispatches runs and discards stale completions.
//! - **Remote judge** — Base64 submissions and decoded console results.
//! - **Static previews** — Compile-service bundles assembled into a single self-contained document.
//! - **Sandbox hosting** — Revocable document URLs and a runtime error trap rebound on every load.
//! - **Live environment** — Shared boot, project mount, install, dev server and hot updates.
//! - **Terminal processing** — Raw process output normalized into clean log text.
//! - **TOML configuration** — Service endpoints, environment commands and the language catalog.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Language, LanguageDescriptor};
pub use environment::{
    EnvironmentError, EnvironmentOrchestrator, EnvironmentSession, EnvironmentState, LiveOutcome,
    LocalHost, MachineHost, VirtualMachine,
};
pub use output::OutputLog;
pub use preview::assemble;
pub use runner::{Router, RunArtifacts, RunError, RunOutcome};
pub use sandbox::{HeadlessSurface, MemoryResourceStore, ResourceHandle, SandboxHost};
pub use services::{
    CompilationError, CompileClient, CompileServiceError, JudgeClient, JudgeError,
};
pub use terminal::TerminalBuffer;
pub use types::{
    ExecutionResult, ExecutionStrategy, FileBundle, Framework, JudgeStatus, PreviewDocument,
};

pub mod config;
pub mod environment;
pub mod output;
pub mod preview;
pub mod runner;
pub mod sandbox;
pub mod services;
pub mod terminal;
pub mod types;
