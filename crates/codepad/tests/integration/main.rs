//! Integration tests for codepad
//!
//! Backends are replaced by in-process fakes: a judge and a compile service
//! implementing the service traits, a machine host recording everything the
//! orchestrator asks of it, and a tiny HTTP responder for the real clients.

use std::path::Path;
use std::sync::Arc;

use codepad::config::EnvironmentConfig;
use codepad::environment::EnvironmentOrchestrator;
use codepad::output::OutputLog;
use codepad::runner::Router;
use codepad::sandbox::{HeadlessSurface, MemoryResourceStore, SandboxHost};
use codepad::types::FileBundle;

mod fakes;
mod http_clients;
mod preview_assembly;
mod routing;

use fakes::{FakeCompiler, FakeHost, FakeJudge};

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Read a fixture directory into a bundle keyed by `/`-separated relative paths
pub(crate) fn fixture_bundle(name: &str) -> FileBundle {
    let root = Path::new(FIXTURES_PATH).join("bundles").join(name);
    let mut bundle = FileBundle::new();
    let mut pending = vec![root.clone()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let relative = path
                .strip_prefix(&root)
                .unwrap()
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            bundle.insert(relative, std::fs::read_to_string(&path).unwrap());
        }
    }
    bundle
}

/// Environment settings that bind the preview as soon as the server is ready
pub(crate) fn test_environment() -> EnvironmentConfig {
    EnvironmentConfig {
        settle_delay_ms: 0,
        ..Default::default()
    }
}

/// Everything a router test needs to drive and observe a run
pub(crate) struct Harness {
    pub judge: Arc<FakeJudge>,
    pub compiler: Arc<FakeCompiler>,
    pub host: Arc<FakeHost>,
    pub surface: Arc<HeadlessSurface>,
    pub store: Arc<MemoryResourceStore>,
    pub output: OutputLog,
    pub sandbox: Arc<SandboxHost>,
    pub environment: Arc<EnvironmentOrchestrator>,
    pub router: Router,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_host(FakeHost::new())
    }

    pub fn with_host(host: FakeHost) -> Self {
        let judge = Arc::new(FakeJudge::new());
        let compiler = Arc::new(FakeCompiler::new());
        let host = Arc::new(host);
        let surface = Arc::new(HeadlessSurface::new());
        let store = Arc::new(MemoryResourceStore::new());
        let output = OutputLog::new();
        let sandbox = Arc::new(SandboxHost::new(
            surface.clone(),
            store.clone(),
            output.clone(),
        ));
        let environment = Arc::new(EnvironmentOrchestrator::new(
            host.clone(),
            sandbox.clone(),
            output.clone(),
            test_environment(),
        ));
        let router = Router::new(
            judge.clone(),
            compiler.clone(),
            environment.clone(),
            sandbox.clone(),
            output.clone(),
        );

        Self {
            judge,
            compiler,
            host,
            surface,
            store,
            output,
            sandbox,
            environment,
            router,
        }
    }
}
