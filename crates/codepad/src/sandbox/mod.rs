//! Isolated preview hosting
//!
//! The rendering surface (an iframe in a browser) and the registry of
//! revocable document URLs are reached through the traits below. The
//! [`SandboxHost`] owns both and guarantees that at most one document URL is
//! live at a time and that every load of the surface gets a fresh runtime
//! error trap.

use std::sync::Arc;

pub use crate::sandbox::headless::{HeadlessContext, HeadlessSurface};
pub use crate::sandbox::host::{SandboxHost, format_runtime_error};
pub use crate::sandbox::resource::{MemoryResourceStore, ResourceHandle, ResourceStore};

mod headless;
mod host;
mod resource;

/// Called after every completed load with the context of the loaded page
pub type LoadListener = Arc<dyn Fn(Arc<dyn SurfaceContext>) + Send + Sync>;

/// Called when a load fails, with a description of the failure
pub type LoadErrorListener = Arc<dyn Fn(String) + Send + Sync>;

/// Global error handler installed inside a loaded page
pub type ErrorHandler = Arc<dyn Fn(&RuntimeErrorEvent) -> ErrorDisposition + Send + Sync>;

/// An uncaught error raised by code running in the surface
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeErrorEvent {
    /// Message passed to the global handler, when it is a string
    pub message: Option<String>,
    /// Script the error was raised in
    pub source: Option<String>,
    pub line: u32,
    pub column: u32,
    /// Message of the error object, if one was thrown
    pub error: Option<String>,
}

impl RuntimeErrorEvent {
    pub fn new(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            message: Some(message.into()),
            line,
            column,
            ..Default::default()
        }
    }
}

/// What the surface should do with an error after the handler ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Handled; the surface must not show its own error UI
    Suppress,
    Propagate,
}

/// An isolated rendering surface
pub trait SandboxSurface: Send + Sync {
    /// Replace the load listener; `None` removes it
    fn set_load_listener(&self, listener: Option<LoadListener>);

    fn set_load_error_listener(&self, listener: Option<LoadErrorListener>);

    /// Navigate to `address`, or blank the surface with `None`
    fn assign_address(&self, address: Option<&str>);
}

/// The page context of one completed load
pub trait SurfaceContext: Send + Sync {
    fn install_error_handler(&self, handler: ErrorHandler);
}
