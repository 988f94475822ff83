use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::{Mutex as AsyncMutex, broadcast, mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

use crate::config::EnvironmentConfig;
use crate::environment::project::{ProjectTree, source_path};
use crate::environment::{
    EnvironmentError, KillHandle, MachineHost, ServerReady, VirtualMachine, VmProcess,
};
use crate::output::OutputLog;
use crate::sandbox::SandboxHost;
use crate::types::Framework;

/// Upper bound on waiting for buffered output after a process exits
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

type BootFuture = Shared<BoxFuture<'static, Result<Arc<dyn VirtualMachine>, EnvironmentError>>>;

/// Lifecycle state of the environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnvironmentState {
    #[default]
    Idle,
    Booting,
    Mounting,
    Installing,
    Starting,
    Ready,
    Failed,
}

impl EnvironmentState {
    /// A lifecycle is underway and has not settled yet
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            EnvironmentState::Booting
                | EnvironmentState::Mounting
                | EnvironmentState::Installing
                | EnvironmentState::Starting
        )
    }
}

/// Observable state of the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSession {
    pub state: EnvironmentState,
    /// Framework of the mounted project
    pub framework: Option<Framework>,
    pub ready_url: Option<String>,
    pub port: Option<u16>,
    /// The sandbox has been pointed at the served URL this lifecycle
    pub iframe_bound: bool,
    /// The served page finished loading
    pub interactive: bool,
    pub load_error: Option<String>,
    /// Last output chunk of a failed command
    pub log_tail: Option<String>,
    pub error: Option<EnvironmentError>,
    cycle: u64,
    /// Output and sandbox updates are published for this lifecycle
    attached: bool,
}

impl EnvironmentSession {
    fn is_current(&self, cycle: u64) -> bool {
        self.cycle == cycle && self.attached
    }
}

/// Result of a live run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveOutcome {
    /// A full lifecycle ran and the dev server is serving `url`
    Started { url: String },
    /// The component source was overwritten in the running project
    Updated { path: &'static str, rebound: bool },
    /// Another lifecycle is still underway; nothing was done
    InProgress,
}

enum Plan {
    Update { cycle: u64, url: String },
    Lifecycle { cycle: u64 },
    Busy,
}

/// Drives the virtual environment through boot, mount, install and start
pub struct EnvironmentOrchestrator {
    host: Arc<dyn MachineHost>,
    sandbox: Arc<SandboxHost>,
    output: OutputLog,
    settings: EnvironmentConfig,
    boot: Mutex<Option<BootFuture>>,
    session: Arc<Mutex<EnvironmentSession>>,
    /// Running dev server and the lifecycle that started it
    dev_server: Mutex<Option<(u64, KillHandle)>>,
    /// Serializes source writes on the fast path
    writes: AsyncMutex<()>,
}

impl std::fmt::Debug for EnvironmentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentOrchestrator")
            .field("session", &*lock(&self.session))
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl EnvironmentOrchestrator {
    pub fn new(
        host: Arc<dyn MachineHost>,
        sandbox: Arc<SandboxHost>,
        output: OutputLog,
        settings: EnvironmentConfig,
    ) -> Self {
        Self {
            host,
            sandbox,
            output,
            settings,
            boot: Mutex::new(None),
            session: Arc::new(Mutex::new(EnvironmentSession::default())),
            dev_server: Mutex::new(None),
            writes: AsyncMutex::new(()),
        }
    }

    /// Copy of the current session
    pub fn snapshot(&self) -> EnvironmentSession {
        lock(&self.session).clone()
    }

    pub fn state(&self) -> EnvironmentState {
        lock(&self.session).state
    }

    /// Run `source` as the root component of a `framework` project.
    ///
    /// With the dev server already serving the same framework this only
    /// overwrites the component file. Otherwise a full lifecycle runs on the
    /// (shared) booted machine. A run while a lifecycle is underway returns
    /// [`LiveOutcome::InProgress`] without side effects.
    #[instrument(skip(self, source))]
    pub async fn run(
        &self,
        framework: Framework,
        source: &str,
    ) -> Result<LiveOutcome, EnvironmentError> {
        match self.plan(framework) {
            Plan::Busy => {
                debug!("lifecycle in progress, ignoring run");
                Ok(LiveOutcome::InProgress)
            }
            Plan::Update { cycle, url } => {
                let result = self.update(cycle, framework, source, &url).await;
                if let Err(ref err) = result {
                    self.fail(cycle, err);
                }
                result
            }
            Plan::Lifecycle { cycle } => match self.lifecycle(cycle, framework, source).await {
                Ok(url) => Ok(LiveOutcome::Started { url }),
                Err(err) => {
                    self.fail(cycle, &err);
                    self.stop_dev_server_of(cycle);
                    Err(err)
                }
            },
        }
    }

    /// Stop the dev server and return to `Idle`. The booted machine is kept.
    pub fn reset(&self) {
        {
            let mut session = lock(&self.session);
            let cycle = session.cycle + 1;
            *session = EnvironmentSession {
                cycle,
                ..Default::default()
            };
        }
        self.stop_dev_server();
        debug!("environment reset");
    }

    /// Stop publishing into the shared output and sandbox.
    ///
    /// A lifecycle still underway is abandoned as by [`reset`](Self::reset).
    /// A dev server that is already serving keeps running, but its output is
    /// no longer shown until the next run attaches to it again.
    pub fn detach(&self) {
        let busy = {
            let mut session = lock(&self.session);
            session.attached = false;
            session.state.is_busy()
        };
        if busy {
            debug!("abandoning lifecycle in progress");
            self.reset();
        }
    }

    fn plan(&self, framework: Framework) -> Plan {
        let mut session = lock(&self.session);

        if session.state.is_busy() {
            return Plan::Busy;
        }
        if session.state == EnvironmentState::Ready
            && session.framework == Some(framework)
            && let Some(url) = session.ready_url.clone()
        {
            session.attached = true;
            return Plan::Update {
                cycle: session.cycle,
                url,
            };
        }

        let cycle = session.cycle + 1;
        *session = EnvironmentSession {
            state: EnvironmentState::Booting,
            framework: Some(framework),
            cycle,
            attached: true,
            ..Default::default()
        };
        Plan::Lifecycle { cycle }
    }

    async fn update(
        &self,
        cycle: u64,
        framework: Framework,
        source: &str,
        url: &str,
    ) -> Result<LiveOutcome, EnvironmentError> {
        let path = source_path(framework);
        let machine = self.machine().await?;
        {
            let _write = self.writes.lock().await;
            machine.write_file(path, source).await?;
        }
        debug!(path, "overwrote component source");

        let rebound = !self.sandbox.is_showing(url);
        if rebound {
            {
                let mut session = lock(&self.session);
                if !session.is_current(cycle) {
                    return Err(EnvironmentError::Cancelled);
                }
                session.iframe_bound = true;
                session.interactive = false;
                session.load_error = None;
            }
            self.bind(cycle, url);
        }

        Ok(LiveOutcome::Updated { path, rebound })
    }

    async fn lifecycle(
        &self,
        cycle: u64,
        framework: Framework,
        source: &str,
    ) -> Result<String, EnvironmentError> {
        self.stop_dev_server();
        self.output.set("Booting environment...\n");
        let machine = self.machine().await?;

        self.transition(cycle, EnvironmentState::Mounting)?;
        let tree = ProjectTree::for_framework(framework, source);
        machine.mount(&tree).await?;
        debug!(files = tree.len(), "project mounted");

        self.transition(cycle, EnvironmentState::Installing)?;
        self.emit(cycle, "Installing dependencies...\n")?;
        self.install(cycle, machine.as_ref()).await?;

        self.transition(cycle, EnvironmentState::Starting)?;
        self.emit(cycle, "Starting dev server...\n")?;
        let ready = self.start(cycle, machine.as_ref()).await?;

        {
            let mut session = lock(&self.session);
            if !session.is_current(cycle) {
                return Err(EnvironmentError::Cancelled);
            }
            session.state = EnvironmentState::Ready;
            session.ready_url = Some(ready.url.clone());
            session.port = Some(ready.port);
        }
        info!(url = %ready.url, port = ready.port, "dev server ready");
        self.emit(cycle, &format!("\n✓ Dev server ready at {}\n", ready.url))?;

        tokio::time::sleep(self.settings.settle_delay()).await;
        self.bind_once(cycle, &ready.url);

        Ok(ready.url)
    }

    async fn install(
        &self,
        cycle: u64,
        machine: &dyn VirtualMachine,
    ) -> Result<(), EnvironmentError> {
        let (command, args) = split_command(&self.settings.install_command)?;
        let VmProcess {
            mut output,
            exit,
            kill: _kill,
        } = machine.spawn(command, args).await?;

        let mut log_tail = String::new();
        while let Some(chunk) = output.recv().await {
            self.emit(cycle, &chunk)?;
            log_tail = chunk;
        }

        let exit_code = exit.await.unwrap_or(-1);
        if exit_code != 0 {
            return Err(EnvironmentError::InstallFailed {
                exit_code,
                log_tail,
            });
        }
        debug!("dependencies installed");
        Ok(())
    }

    async fn start(
        &self,
        cycle: u64,
        machine: &dyn VirtualMachine,
    ) -> Result<ServerReady, EnvironmentError> {
        let (command, args) = split_command(&self.settings.start_command)?;

        // Subscribe first so an early announcement is not missed
        let mut ready_rx = machine.server_ready();
        let VmProcess { output, exit, kill } = machine.spawn(command, args).await?;
        {
            let session = lock(&self.session);
            if !session.is_current(cycle) {
                kill.kill();
                return Err(EnvironmentError::Cancelled);
            }
            *lock(&self.dev_server) = Some((cycle, kill));
        }

        let log_tail = Arc::new(Mutex::new(String::new()));
        let mut pump = tokio::spawn(pump_output(
            Arc::clone(&self.session),
            cycle,
            self.output.clone(),
            output,
            Arc::clone(&log_tail),
        ));

        let mut exit = exit;
        let ready = tokio::select! {
            ready = wait_ready(&mut ready_rx) => ready?,
            code = &mut exit => {
                let exit_code = code.unwrap_or(-1);
                let _ = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut pump).await;
                return Err(EnvironmentError::StartFailed {
                    exit_code,
                    log_tail: lock(&log_tail).clone(),
                });
            }
        };

        tokio::spawn(watch_exit(
            Arc::clone(&self.session),
            self.output.clone(),
            cycle,
            exit,
            log_tail,
        ));

        Ok(ready)
    }

    /// Shared boot: concurrent callers wait on the same boot, and a failed
    /// boot is forgotten so the next call tries again.
    async fn machine(&self) -> Result<Arc<dyn VirtualMachine>, EnvironmentError> {
        let boot = {
            let mut slot = lock(&self.boot);
            slot.get_or_insert_with(|| {
                let host = Arc::clone(&self.host);
                async move {
                    debug!("booting machine");
                    host.boot().await
                }
                .boxed()
                .shared()
            })
            .clone()
        };

        let result = boot.clone().await;
        if let Err(ref err) = result {
            warn!(%err, "machine boot failed");
            let mut slot = lock(&self.boot);
            if slot.as_ref().is_some_and(|current| current.ptr_eq(&boot)) {
                *slot = None;
            }
        }
        result
    }

    fn transition(&self, cycle: u64, state: EnvironmentState) -> Result<(), EnvironmentError> {
        let mut session = lock(&self.session);
        if !session.is_current(cycle) {
            return Err(EnvironmentError::Cancelled);
        }
        debug!(from = ?session.state, to = ?state, "environment transition");
        session.state = state;
        Ok(())
    }

    fn fail(&self, cycle: u64, err: &EnvironmentError) {
        {
            let mut session = lock(&self.session);
            if !session.is_current(cycle) {
                return;
            }
            session.state = EnvironmentState::Failed;
            session.log_tail = err.log_tail().map(str::to_owned);
            session.error = Some(err.clone());
        }
        warn!(%err, "environment lifecycle failed");
        self.output.append_chunk(&format!("\n❌ {err}\n"));
        self.stop_dev_server();
    }

    fn bind_once(&self, cycle: u64, url: &str) {
        {
            let mut session = lock(&self.session);
            if !session.is_current(cycle) || session.iframe_bound {
                return;
            }
            session.iframe_bound = true;
        }
        self.bind(cycle, url);
    }

    fn bind(&self, cycle: u64, url: &str) {
        let loaded = Arc::clone(&self.session);
        let failed = Arc::clone(&self.session);

        self.sandbox.bind_url(
            url,
            Arc::new(move || {
                let mut session = lock(&loaded);
                if session.cycle == cycle {
                    session.interactive = true;
                }
            }),
            Arc::new(move |message: String| {
                warn!(%message, "preview failed to load");
                let mut session = lock(&failed);
                if session.cycle == cycle {
                    session.load_error = Some(message);
                }
            }),
        );
    }

    /// Append `text` to the output if `cycle` is still the attached lifecycle
    fn emit(&self, cycle: u64, text: &str) -> Result<(), EnvironmentError> {
        let session = lock(&self.session);
        if !session.is_current(cycle) {
            return Err(EnvironmentError::Cancelled);
        }
        self.output.append_chunk(text);
        Ok(())
    }

    fn stop_dev_server(&self) {
        if let Some((cycle, kill)) = lock(&self.dev_server).take() {
            debug!(cycle, "stopping dev server");
            kill.kill();
        }
    }

    /// Stop the dev server only if lifecycle `cycle` started it
    fn stop_dev_server_of(&self, cycle: u64) {
        let mut slot = lock(&self.dev_server);
        if slot.as_ref().is_some_and(|(owner, _)| *owner == cycle)
            && let Some((_, kill)) = slot.take()
        {
            debug!(cycle, "stopping abandoned dev server");
            kill.kill();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn split_command(command: &[String]) -> Result<(&str, &[String]), EnvironmentError> {
    command
        .split_first()
        .map(|(program, args)| (program.as_str(), args))
        .ok_or_else(|| EnvironmentError::SpawnFailed {
            command: String::new(),
            message: "empty command".to_owned(),
        })
}

async fn wait_ready(
    rx: &mut broadcast::Receiver<ServerReady>,
) -> Result<ServerReady, EnvironmentError> {
    loop {
        match rx.recv().await {
            Ok(ready) => return Ok(ready),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "readiness receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                return Err(EnvironmentError::ReadySignalLost);
            }
        }
    }
}

/// Streams dev server output into the log while its lifecycle is attached
async fn pump_output(
    session: Arc<Mutex<EnvironmentSession>>,
    cycle: u64,
    log: OutputLog,
    mut output: mpsc::Receiver<String>,
    log_tail: Arc<Mutex<String>>,
) {
    while let Some(chunk) = output.recv().await {
        if lock(&session).is_current(cycle) {
            log.append_chunk(&chunk);
        }
        *lock(&log_tail) = chunk;
    }
}

/// Marks the session failed if the dev server dies after it became ready
async fn watch_exit(
    session: Arc<Mutex<EnvironmentSession>>,
    log: OutputLog,
    cycle: u64,
    exit: oneshot::Receiver<i32>,
    log_tail: Arc<Mutex<String>>,
) {
    let Ok(exit_code) = exit.await else {
        return;
    };

    let err = EnvironmentError::StartFailed {
        exit_code,
        log_tail: lock(&log_tail).clone(),
    };
    let attached = {
        let mut session = lock(&session);
        if session.cycle != cycle || session.state != EnvironmentState::Ready {
            return;
        }
        session.state = EnvironmentState::Failed;
        session.log_tail = err.log_tail().map(str::to_owned);
        session.error = Some(err.clone());
        session.attached
    };
    warn!(exit_code, "dev server exited");
    if attached {
        log.append_chunk(&format!("\n❌ {err}\n"));
    }
}
