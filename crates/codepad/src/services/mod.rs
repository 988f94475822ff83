//! Remote backends
//!
//! Two services run code on behalf of the playground: a remote judge for
//! console languages and a compile service that turns framework components
//! into static bundles. Both sit behind traits so the router can be driven by
//! in-process fakes.

use async_trait::async_trait;
use thiserror::Error;

pub use crate::services::compiler::{
    CompileClient, UNKNOWN_COMPILATION_ERROR, clean_compiler_log, summarize_compile_error,
};
pub use crate::services::judge::{JudgeClient, decode_base64_text, encode_base64_text};

mod compiler;
mod judge;

use crate::types::{ExecutionResult, FileBundle, Framework};

/// Errors talking to the remote judge
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("invalid judge URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("judge responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed judge response: {0}")]
    Malformed(String),
}

/// A failed compilation reported by the compile service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("compilation failed")]
pub struct CompilationError {
    /// Raw compiler log as returned by the service
    pub log: String,
}

impl CompilationError {
    pub fn new(log: impl Into<String>) -> Self {
        Self { log: log.into() }
    }

    /// One-paragraph message suitable for the output panel
    pub fn summary(&self) -> String {
        summarize_compile_error(&self.log)
    }
}

/// Errors talking to the compile service
#[derive(Debug, Error)]
pub enum CompileServiceError {
    #[error("invalid compile service URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed compile service response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Compilation(#[from] CompilationError),
}

/// Remote code execution service
#[async_trait]
pub trait JudgeService: Send + Sync {
    /// Submit source text for the given judge language id and wait for the result
    async fn submit(&self, source: &str, language_id: u32) -> Result<ExecutionResult, JudgeError>;
}

/// Framework component compiler
#[async_trait]
pub trait CompileService: Send + Sync {
    /// Compile a single component into a bundle of static files
    async fn submit(
        &self,
        source: &str,
        framework: Framework,
    ) -> Result<FileBundle, CompileServiceError>;
}
