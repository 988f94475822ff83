use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;
use uuid::Uuid;

use crate::types::PreviewDocument;

/// URL scheme prefix of in-memory documents
const MEMORY_URL_PREFIX: &str = "blob:codepad/";

/// A revocable URL under which a preview document is served
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    url: String,
}

impl ResourceHandle {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Registry of document URLs
pub trait ResourceStore: Send + Sync {
    /// Publish a document under a fresh URL
    fn create(&self, document: &PreviewDocument) -> ResourceHandle;

    /// Withdraw a URL. Revoking twice is harmless.
    fn revoke(&self, handle: &ResourceHandle);

    /// Number of URLs that are currently published
    fn live_count(&self) -> usize;

    /// Document served under `url`, if it is still published
    fn resolve(&self, url: &str) -> Option<String>;
}

/// Process-local resource store
#[derive(Debug, Default)]
pub struct MemoryResourceStore {
    documents: Mutex<HashMap<String, String>>,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn documents(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ResourceStore for MemoryResourceStore {
    fn create(&self, document: &PreviewDocument) -> ResourceHandle {
        let url = format!("{MEMORY_URL_PREFIX}{}", Uuid::new_v4());
        self.documents()
            .insert(url.clone(), document.html().to_owned());
        debug!(%url, bytes = document.len(), "published document");
        ResourceHandle { url }
    }

    fn revoke(&self, handle: &ResourceHandle) {
        if self.documents().remove(handle.url()).is_some() {
            debug!(url = %handle.url(), "revoked document");
        }
    }

    fn live_count(&self) -> usize {
        self.documents().len()
    }

    fn resolve(&self, url: &str) -> Option<String> {
        self.documents().get(url).cloned()
    }
}
