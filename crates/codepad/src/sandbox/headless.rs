//! A surface without a renderer
//!
//! Records navigations and lets the caller drive loads and runtime errors by
//! hand. Used by the CLI and by tests.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::sandbox::{
    ErrorDisposition, ErrorHandler, LoadErrorListener, LoadListener, RuntimeErrorEvent,
    SandboxSurface, SurfaceContext,
};

/// Page context of one headless load
#[derive(Default)]
pub struct HeadlessContext {
    handler: Mutex<Option<ErrorHandler>>,
}

impl HeadlessContext {
    fn handler(&self) -> Option<ErrorHandler> {
        self.handler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl SurfaceContext for HeadlessContext {
    fn install_error_handler(&self, handler: ErrorHandler) {
        *self
            .handler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handler);
    }
}

#[derive(Default)]
struct State {
    address: Option<String>,
    navigations: Vec<Option<String>>,
    load_listener: Option<LoadListener>,
    load_error_listener: Option<LoadErrorListener>,
    context: Option<Arc<HeadlessContext>>,
}

#[derive(Default)]
pub struct HeadlessSurface {
    state: Mutex<State>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current address
    pub fn address(&self) -> Option<String> {
        self.state().address.clone()
    }

    /// Every address assignment so far, including blanking
    pub fn navigations(&self) -> Vec<Option<String>> {
        self.state().navigations.clone()
    }

    /// Finish loading the current address. Returns false when blank.
    pub fn complete_load(&self) -> bool {
        let (listener, context) = {
            let mut state = self.state();
            if state.address.is_none() {
                return false;
            }
            let context = Arc::new(HeadlessContext::default());
            state.context = Some(Arc::clone(&context));
            (state.load_listener.clone(), context)
        };

        if let Some(listener) = listener {
            listener(context);
        }
        true
    }

    /// Fail loading the current address. Returns false when blank.
    pub fn fail_load(&self, message: &str) -> bool {
        let listener = {
            let state = self.state();
            if state.address.is_none() {
                return false;
            }
            state.load_error_listener.clone()
        };

        if let Some(listener) = listener {
            listener(message.to_owned());
        }
        true
    }

    /// Raise an uncaught error in the loaded page.
    ///
    /// Returns `None` when nothing is loaded or no handler was installed.
    pub fn raise_error(&self, event: &RuntimeErrorEvent) -> Option<ErrorDisposition> {
        let context = self.state().context.clone()?;
        let handler = context.handler()?;
        Some(handler(event))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SandboxSurface for HeadlessSurface {
    fn set_load_listener(&self, listener: Option<LoadListener>) {
        self.state().load_listener = listener;
    }

    fn set_load_error_listener(&self, listener: Option<LoadErrorListener>) {
        self.state().load_error_listener = listener;
    }

    fn assign_address(&self, address: Option<&str>) {
        let address = address.map(str::to_owned);
        let mut state = self.state();
        state.navigations.push(address.clone());
        state.address = address;
        // The old page is gone along with its handlers
        state.context = None;
    }
}
