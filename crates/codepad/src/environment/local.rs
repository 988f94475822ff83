//! Environment backed by the host filesystem and processes
//!
//! The machine's filesystem is a directory on the host and commands run as
//! ordinary child processes inside it. Readiness is detected by scanning
//! process output for the local URL a dev server prints once it listens.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, instrument, warn};

use crate::environment::{
    EnvironmentError, KillHandle, MachineHost, ProjectTree, ServerReady, VirtualMachine,
    VmProcess,
};
use crate::terminal::TerminalBuffer;

const OUTPUT_CHANNEL_CAPACITY: usize = 64;
const READ_BUFFER_SIZE: usize = 4096;

/// URL prefixes dev servers print for their local address
const LOCAL_PREFIXES: [&str; 2] = ["http://localhost:", "http://127.0.0.1:"];

/// Boots [`LocalMachine`]s rooted at a host directory
#[derive(Debug, Clone)]
pub struct LocalHost {
    workdir: PathBuf,
}

impl LocalHost {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}

#[async_trait]
impl MachineHost for LocalHost {
    #[instrument(skip(self), fields(workdir = %self.workdir.display()))]
    async fn boot(&self) -> Result<Arc<dyn VirtualMachine>, EnvironmentError> {
        tokio::fs::create_dir_all(&self.workdir)
            .await
            .map_err(|e| EnvironmentError::BootFailed(e.to_string()))?;
        debug!("local machine ready");
        Ok(Arc::new(LocalMachine::new(self.workdir.clone())))
    }
}

/// A machine whose filesystem is a host directory
#[derive(Debug)]
pub struct LocalMachine {
    root: PathBuf,
    ready: broadcast::Sender<ServerReady>,
}

impl LocalMachine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let (ready, _) = broadcast::channel(8);
        Self {
            root: root.into(),
            ready,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path for a project-relative path
    fn resolve(&self, path: &str) -> Result<PathBuf, EnvironmentError> {
        if path.is_empty() || path.contains("..") || path.starts_with('/') {
            return Err(EnvironmentError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(path))
    }

    async fn write(&self, path: &str, contents: &str) -> Result<(), EnvironmentError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, contents).await?;
        Ok(())
    }
}

#[async_trait]
impl VirtualMachine for LocalMachine {
    async fn mount(&self, tree: &ProjectTree) -> Result<(), EnvironmentError> {
        for (path, contents) in tree.iter() {
            self.write(path, contents).await.map_err(|e| match e {
                EnvironmentError::InvalidPath(_) => e,
                other => EnvironmentError::MountFailed(format!("{path}: {other}")),
            })?;
        }
        debug!(files = tree.len(), root = %self.root.display(), "mounted project");
        Ok(())
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<(), EnvironmentError> {
        self.write(path, contents).await
    }

    #[instrument(skip(self))]
    async fn spawn(&self, command: &str, args: &[String]) -> Result<VmProcess, EnvironmentError> {
        let mut child = Command::new(command)
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EnvironmentError::SpawnFailed {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let scanner = Arc::new(Mutex::new(ReadinessScanner::new()));

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(
                stdout,
                output_tx.clone(),
                Arc::clone(&scanner),
                self.ready.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(
                stderr,
                output_tx,
                scanner,
                self.ready.clone(),
            ));
        }

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let (exit_tx, exit_rx) = oneshot::channel();
        let program = command.to_string();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    debug!(command = %program, "killing process");
                    if let Err(err) = child.kill().await {
                        warn!(%err, "failed to kill process");
                    }
                    child.wait().await
                }
            };
            let code = match status {
                Ok(status) => status.code().unwrap_or(-1),
                Err(err) => {
                    warn!(%err, "failed to wait for process");
                    -1
                }
            };
            debug!(command = %program, code, "process exited");
            let _ = exit_tx.send(code);
        });

        Ok(VmProcess {
            output: output_rx,
            exit: exit_rx,
            kill: KillHandle::new(kill_tx),
        })
    }

    fn server_ready(&self) -> broadcast::Receiver<ServerReady> {
        self.ready.subscribe()
    }
}

/// Read a pipe to its end, forwarding decoded chunks and watching for readiness
async fn forward_output<R>(
    mut reader: R,
    tx: mpsc::Sender<String>,
    scanner: Arc<Mutex<ReadinessScanner>>,
    ready: broadcast::Sender<ServerReady>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut carry = Vec::new();

    loop {
        let text = match reader.read(&mut buf).await {
            Ok(0) => {
                if carry.is_empty() {
                    break;
                }
                String::from_utf8_lossy(&std::mem::take(&mut carry)).into_owned()
            }
            Ok(n) => decode_chunk(&mut carry, &buf[..n]),
            Err(err) => {
                warn!(%err, "failed to read process output");
                break;
            }
        };
        if text.is_empty() {
            continue;
        }

        let found = scanner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .feed(&text);
        if let Some(server) = found {
            debug!(port = server.port, "server ready");
            let _ = ready.send(server);
        }

        // A dropped receiver still needs the pipe drained
        let _ = tx.send(text).await;
    }
}

/// Decode bytes as UTF-8, holding back an incomplete trailing sequence
fn decode_chunk(carry: &mut Vec<u8>, bytes: &[u8]) -> String {
    carry.extend_from_slice(bytes);
    match std::str::from_utf8(carry) {
        Ok(text) => {
            let text = text.to_owned();
            carry.clear();
            text
        }
        Err(err) if err.error_len().is_none() => {
            let valid = err.valid_up_to();
            let text = String::from_utf8_lossy(&carry[..valid]).into_owned();
            carry.drain(..valid);
            text
        }
        Err(_) => String::from_utf8_lossy(&std::mem::take(carry)).into_owned(),
    }
}

/// Watches process output for the local URL of a dev server.
///
/// Output is normalized first so styled port numbers are found. A port is
/// only accepted once a non-digit follows it, which keeps a number split
/// across chunks from matching early. Fires at most once.
#[derive(Debug, Default)]
pub struct ReadinessScanner {
    buffer: TerminalBuffer,
    fired: bool,
}

impl ReadinessScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed an output chunk; returns the announcement the first time one is complete
    pub fn feed(&mut self, chunk: &str) -> Option<ServerReady> {
        if self.fired {
            return None;
        }
        self.buffer.feed(chunk);
        let port = find_port(self.buffer.text())?;
        self.fired = true;
        self.buffer.clear();
        Some(ServerReady {
            port,
            url: format!("http://localhost:{port}/"),
        })
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

fn find_port(text: &str) -> Option<u16> {
    LOCAL_PREFIXES.iter().find_map(|prefix| {
        text.match_indices(prefix).find_map(|(idx, _)| {
            let rest = &text[idx + prefix.len()..];
            let digits = rest.find(|c: char| !c.is_ascii_digit())?;
            if digits == 0 {
                return None;
            }
            rest[..digits].parse().ok()
        })
    })
}
