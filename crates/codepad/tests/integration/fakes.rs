//! In-process stand-ins for the remote services and the virtual machine

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use codepad::environment::{
    EnvironmentError, KillHandle, MachineHost, ProjectTree, ServerReady, VirtualMachine,
    VmProcess,
};
use codepad::services::{
    CompilationError, CompileService, CompileServiceError, JudgeError, JudgeService,
};
use codepad::types::{ExecutionResult, FileBundle, Framework};
use tokio::sync::{broadcast, mpsc, oneshot};

/// Source text that makes the fakes fail
pub const FAILING_SOURCE: &str = "fail";

/// Judge echoing the submitted source as stdout.
///
/// Each submission pops one delay from the queue before answering.
#[derive(Default)]
pub struct FakeJudge {
    delays: Mutex<VecDeque<Duration>>,
    submissions: AtomicUsize,
}

impl FakeJudge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay_next(&self, delay: Duration) {
        self.delays.lock().unwrap().push_back(delay);
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JudgeService for FakeJudge {
    async fn submit(&self, source: &str, _language_id: u32) -> Result<ExecutionResult, JudgeError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if source == FAILING_SOURCE {
            return Err(JudgeError::Status {
                status: 503,
                body: "busy".to_owned(),
            });
        }
        Ok(ExecutionResult {
            stdout: Some(source.to_owned()),
            time: Some("0.01".to_owned()),
            memory: Some(1024),
            ..Default::default()
        })
    }
}

/// Compile service producing a one-script bundle that embeds the source
#[derive(Default)]
pub struct FakeCompiler {
    delays: Mutex<VecDeque<Duration>>,
}

impl FakeCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay_next(&self, delay: Duration) {
        self.delays.lock().unwrap().push_back(delay);
    }
}

#[async_trait]
impl CompileService for FakeCompiler {
    async fn submit(
        &self,
        source: &str,
        framework: Framework,
    ) -> Result<FileBundle, CompileServiceError> {
        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if source == FAILING_SOURCE {
            return Err(CompilationError::new(
                "\x1b[2J\x1b[3J\x1b[HBuilding...\nError: Unexpected token (1:4)\n    at parse (compiler.js:10:3)\n    at compile (compiler.js:20:1)",
            )
            .into());
        }
        Ok(FileBundle::new()
            .with_file("index.html", framework.default_mount())
            .with_file("main.js", format!("console.log({source:?});")))
    }
}

/// How the fake dev server behaves after it is spawned
#[derive(Debug, Clone, Copy)]
pub enum DevServer {
    /// Announce readiness on this port and run until killed
    Ready(u16),
    /// Exit with this code without ever becoming ready
    Exit(i32),
}

/// Machine recording mounts, writes and spawned commands
pub struct FakeMachine {
    mounts: Mutex<Vec<ProjectTree>>,
    writes: Mutex<Vec<(String, String)>>,
    spawns: Mutex<Vec<String>>,
    install_exits: Mutex<VecDeque<i32>>,
    dev_server: Mutex<DevServer>,
    kills: Arc<AtomicUsize>,
    ready: broadcast::Sender<ServerReady>,
}

impl FakeMachine {
    fn new() -> Self {
        let (ready, _) = broadcast::channel(4);
        Self {
            mounts: Mutex::default(),
            writes: Mutex::default(),
            spawns: Mutex::default(),
            install_exits: Mutex::default(),
            dev_server: Mutex::new(DevServer::Ready(5173)),
            kills: Arc::new(AtomicUsize::new(0)),
            ready,
        }
    }

    pub fn mounts(&self) -> Vec<ProjectTree> {
        self.mounts.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn spawns(&self) -> Vec<String> {
        self.spawns.lock().unwrap().clone()
    }

    /// Number of processes stopped through their kill handle
    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    /// Make the next install exit with `code`
    pub fn fail_next_install(&self, code: i32) {
        self.install_exits.lock().unwrap().push_back(code);
    }

    pub fn set_dev_server(&self, behavior: DevServer) {
        *self.dev_server.lock().unwrap() = behavior;
    }

    fn spawn_install(&self) -> VmProcess {
        let exit_code = self.install_exits.lock().unwrap().pop_front().unwrap_or(0);
        let (output_tx, output) = mpsc::channel(8);
        let (exit_tx, exit) = oneshot::channel();
        let (kill_tx, _kill_rx) = oneshot::channel();

        tokio::spawn(async move {
            let _ = output_tx.send("\x1b[32madded 42 packages\x1b[0m\n".to_owned()).await;
            if exit_code != 0 {
                let _ = output_tx
                    .send("npm ERR! code ERESOLVE\n".to_owned())
                    .await;
            }
            drop(output_tx);
            let _ = exit_tx.send(exit_code);
        });

        VmProcess {
            output,
            exit,
            kill: KillHandle::new(kill_tx),
        }
    }

    fn spawn_dev_server(&self) -> VmProcess {
        let behavior = *self.dev_server.lock().unwrap();
        let ready = self.ready.clone();
        let kills = Arc::clone(&self.kills);
        let (output_tx, output) = mpsc::channel(8);
        let (exit_tx, exit) = oneshot::channel();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let _ = output_tx.send("\n  VITE v5.4.0  ready\n".to_owned()).await;
            match behavior {
                DevServer::Ready(port) => {
                    let _ = ready.send(ServerReady {
                        port,
                        url: format!("http://localhost:{port}/"),
                    });
                    drop(output_tx);
                    if kill_rx.await.is_ok() {
                        kills.fetch_add(1, Ordering::SeqCst);
                    }
                    let _ = exit_tx.send(143);
                }
                DevServer::Exit(code) => {
                    let _ = output_tx
                        .send("Error: Port 5173 is already in use\n".to_owned())
                        .await;
                    drop(output_tx);
                    let _ = exit_tx.send(code);
                }
            }
        });

        VmProcess {
            output,
            exit,
            kill: KillHandle::new(kill_tx),
        }
    }
}

#[async_trait]
impl VirtualMachine for FakeMachine {
    async fn mount(&self, tree: &ProjectTree) -> Result<(), EnvironmentError> {
        self.mounts.lock().unwrap().push(tree.clone());
        Ok(())
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<(), EnvironmentError> {
        self.writes
            .lock()
            .unwrap()
            .push((path.to_owned(), contents.to_owned()));
        Ok(())
    }

    async fn spawn(&self, command: &str, args: &[String]) -> Result<VmProcess, EnvironmentError> {
        let line = std::iter::once(command.to_owned())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        self.spawns.lock().unwrap().push(line);

        if args.iter().any(|arg| arg == "install") {
            Ok(self.spawn_install())
        } else {
            Ok(self.spawn_dev_server())
        }
    }

    fn server_ready(&self) -> broadcast::Receiver<ServerReady> {
        self.ready.subscribe()
    }
}

/// Host handing out one shared [`FakeMachine`]
pub struct FakeHost {
    machine: Arc<FakeMachine>,
    boots: AtomicUsize,
    failing_boots: AtomicUsize,
    boot_delay: Duration,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            machine: Arc::new(FakeMachine::new()),
            boots: AtomicUsize::new(0),
            failing_boots: AtomicUsize::new(0),
            boot_delay: Duration::ZERO,
        }
    }

    /// Boots take `delay` before they finish
    pub fn with_boot_delay(mut self, delay: Duration) -> Self {
        self.boot_delay = delay;
        self
    }

    /// The first `count` boots fail
    pub fn with_failing_boots(self, count: usize) -> Self {
        self.failing_boots.store(count, Ordering::SeqCst);
        self
    }

    pub fn machine(&self) -> &FakeMachine {
        &self.machine
    }

    pub fn boots(&self) -> usize {
        self.boots.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MachineHost for FakeHost {
    async fn boot(&self) -> Result<Arc<dyn VirtualMachine>, EnvironmentError> {
        self.boots.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.boot_delay).await;

        let failing = self
            .failing_boots
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(EnvironmentError::BootFailed(
                "cross-origin isolation unavailable".to_owned(),
            ));
        }
        Ok(self.machine.clone())
    }
}
