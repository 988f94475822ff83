use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::output::OutputLog;
use crate::sandbox::{
    ErrorDisposition, LoadErrorListener, LoadListener, ResourceHandle, ResourceStore,
    RuntimeErrorEvent, SandboxSurface, SurfaceContext,
};
use crate::types::PreviewDocument;

/// What the surface currently shows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum Address {
    #[default]
    Blank,
    /// An assembled document published in the resource store
    Document(ResourceHandle),
    /// A URL served by the live environment
    Live(String),
}

/// Owner of the preview surface and its document URL
pub struct SandboxHost {
    surface: Arc<dyn SandboxSurface>,
    store: Arc<dyn ResourceStore>,
    output: OutputLog,
    address: Mutex<Address>,
}

impl fmt::Debug for SandboxHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxHost")
            .field("address", &*self.address())
            .field("live_documents", &self.store.live_count())
            .finish_non_exhaustive()
    }
}

impl SandboxHost {
    pub fn new(
        surface: Arc<dyn SandboxSurface>,
        store: Arc<dyn ResourceStore>,
        output: OutputLog,
    ) -> Self {
        Self {
            surface,
            store,
            output,
            address: Mutex::new(Address::Blank),
        }
    }

    /// Show a preview document.
    ///
    /// The previous document URL is revoked before the new one is created,
    /// and the error trap is armed before the surface navigates.
    pub fn present(&self, document: &PreviewDocument) -> ResourceHandle {
        let mut address = self.address();
        self.release(&mut address);

        let handle = self.store.create(document);
        self.trap_errors();
        *address = Address::Document(handle.clone());
        self.surface.assign_address(Some(handle.url()));

        debug!(url = %handle.url(), "presenting document");
        handle
    }

    /// Arm the runtime error trap for every subsequent load of the surface
    pub fn trap_errors(&self) {
        self.surface.set_load_listener(Some(self.error_trap(None)));
        self.surface.set_load_error_listener(None);
    }

    /// Blank the surface and revoke its document
    pub fn clear(&self) {
        let mut address = self.address();
        self.release(&mut address);
        self.surface.set_load_listener(None);
        self.surface.set_load_error_listener(None);
        self.surface.assign_address(None);
    }

    /// Drop the previous run's document. A bound live URL stays.
    pub fn reset_for_run(&self) {
        let mut address = self.address();
        if matches!(*address, Address::Document(_)) {
            self.release(&mut address);
            self.surface.assign_address(None);
        }
    }

    /// Show a URL served by the live environment.
    ///
    /// `on_load` runs after the error trap is installed on every load;
    /// `on_error` receives load failures.
    pub fn bind_url(
        &self,
        url: &str,
        on_load: Arc<dyn Fn() + Send + Sync>,
        on_error: LoadErrorListener,
    ) {
        let mut address = self.address();
        self.release(&mut address);

        self.surface.set_load_listener(Some(self.error_trap(Some(on_load))));
        self.surface.set_load_error_listener(Some(on_error));
        *address = Address::Live(url.to_owned());
        self.surface.assign_address(Some(url));

        debug!(url, "bound live url");
    }

    /// Whether the surface currently shows the live URL `url`
    pub fn is_showing(&self, url: &str) -> bool {
        matches!(&*self.address(), Address::Live(current) if current == url)
    }

    /// Address the surface currently shows
    pub fn current_address(&self) -> Option<String> {
        match &*self.address() {
            Address::Blank => None,
            Address::Document(handle) => Some(handle.url().to_owned()),
            Address::Live(url) => Some(url.clone()),
        }
    }

    fn error_trap(&self, after: Option<Arc<dyn Fn() + Send + Sync>>) -> LoadListener {
        let output = self.output.clone();
        Arc::new(move |context: Arc<dyn SurfaceContext>| {
            let output = output.clone();
            context.install_error_handler(Arc::new(move |event: &RuntimeErrorEvent| {
                output.set(format_runtime_error(event));
                ErrorDisposition::Suppress
            }));
            if let Some(after) = &after {
                after();
            }
        })
    }

    fn release(&self, address: &mut Address) {
        if let Address::Document(handle) = std::mem::take(address) {
            self.store.revoke(&handle);
        }
    }

    fn address(&self) -> MutexGuard<'_, Address> {
        self.address
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Text published for an uncaught error in the preview
pub fn format_runtime_error(event: &RuntimeErrorEvent) -> String {
    let message = event
        .message
        .as_deref()
        .filter(|m| !m.is_empty())
        .or(event.error.as_deref().filter(|m| !m.is_empty()))
        .unwrap_or("Unknown error");
    format!(
        "❌ Runtime Error: {message}\nLine: {}, Column: {}",
        event.line, event.column
    )
}
