//! Headless debugger server process.
//!
//! The server is started with captured output and dialled on its listen
//! address. It needs a moment to bind, so connecting retries with a
//! doubling delay until it accepts, exits, or the deadline passes.

use crate::error::{DelveError, DelveResult};
use crate::rpc::DelveClient;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const CONNECT_INITIAL_DELAY: Duration = Duration::from_millis(5);
pub const CONNECT_MAX_DELAY: Duration = Duration::from_secs(1);
/// Give up connecting after this long.
pub const CONNECT_DEADLINE: Duration = Duration::from_secs(30);

/// Delays between connection attempts: 5ms, doubling, capped at 1s.
pub fn backoff() -> impl Iterator<Item = Duration> {
    std::iter::successors(Some(CONNECT_INITIAL_DELAY), |d| {
        Some((*d * 2).min(CONNECT_MAX_DELAY))
    })
}

/// What the debugger starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Build and debug the package.
    Debug,
    /// Build and debug the package's tests.
    Test,
    /// Debug a prebuilt binary.
    Exec,
}

impl StartMode {
    pub const ALL: [StartMode; 3] = [StartMode::Debug, StartMode::Test, StartMode::Exec];

    pub fn as_str(&self) -> &'static str {
        match self {
            StartMode::Debug => "debug",
            StartMode::Test => "test",
            StartMode::Exec => "exec",
        }
    }
}

impl std::fmt::Display for StartMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StartMode {
    type Err = DelveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| DelveError::invalid_argument(format!("unknown debug mode: {s}")))
    }
}

/// Everything needed to launch a server.
#[derive(Debug, Clone)]
pub struct ServerSpec {
    pub binary: String,
    pub mode: StartMode,
    /// Binary to run in exec mode; ignored otherwise.
    pub program: Option<PathBuf>,
    /// Package directory for debug and test, where the server runs.
    pub working_dir: PathBuf,
    pub address: String,
    pub program_args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl ServerSpec {
    /// Arguments for the debugger binary.
    pub fn args(&self) -> DelveResult<Vec<String>> {
        let mut args = vec![self.mode.as_str().to_string()];
        if self.mode == StartMode::Exec {
            let program = self
                .program
                .as_ref()
                .ok_or_else(|| DelveError::invalid_argument("exec needs a binary path"))?;
            args.push(program.to_string_lossy().into_owned());
        }
        args.extend([
            "--headless".to_string(),
            "--api-version=2".to_string(),
            format!("--listen={}", self.address),
        ]);
        if !self.program_args.is_empty() {
            args.push("--".to_string());
            args.extend(self.program_args.iter().cloned());
        }
        Ok(args)
    }
}

/// Stderr lines kept for reporting a failed start.
const STDERR_TAIL: usize = 5;

/// Output the server wrote, kept until drained.
#[derive(Debug, Default)]
struct Captured {
    lines: Mutex<Vec<String>>,
    stderr: Mutex<VecDeque<String>>,
}

impl Captured {
    fn push(&self, line: String, is_stderr: bool) {
        if is_stderr {
            let mut tail = self.stderr.lock().unwrap_or_else(|e| e.into_inner());
            if tail.len() == STDERR_TAIL {
                tail.pop_front();
            }
            tail.push_back(line.clone());
        }
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).push(line);
    }

    fn stderr_tail(&self) -> Option<String> {
        let tail = self.stderr.lock().unwrap_or_else(|e| e.into_inner());
        (!tail.is_empty()).then(|| tail.iter().map(String::as_str).collect::<Vec<_>>().join("\n"))
    }
}

/// A running debugger server.
pub struct DelveServer {
    child: tokio::sync::Mutex<Option<Child>>,
    address: String,
    captured: Arc<Captured>,
    readers: Mutex<Vec<JoinHandle<()>>>,
}

impl DelveServer {
    /// Launch the server described by `spec`.
    pub fn spawn(spec: &ServerSpec) -> DelveResult<Self> {
        let program =
            which::which(&spec.binary).map_err(|_| DelveError::ToolMissing(spec.binary.clone()))?;
        let args = spec.args()?;
        debug!(binary = %program.display(), args = ?args, dir = %spec.working_dir.display(), "Starting debugger");

        let mut child = Command::new(program)
            .args(&args)
            .current_dir(&spec.working_dir)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(DelveError::Spawn)?;

        let captured = Arc::new(Captured::default());
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(capture(stdout, Arc::clone(&captured), false)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(capture(stderr, Arc::clone(&captured), true)));
        }

        info!(mode = %spec.mode, address = %spec.address, pid = ?child.id(), "Debugger started");
        Ok(Self {
            child: tokio::sync::Mutex::new(Some(child)),
            address: spec.address.clone(),
            captured,
            readers: Mutex::new(readers),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Dial the server, retrying while it starts up.
    pub async fn connect(&self, cancel: &CancellationToken) -> DelveResult<DelveClient> {
        let started = Instant::now();
        let mut delays = backoff();

        loop {
            match DelveClient::connect(&self.address).await {
                Ok(client) => {
                    debug!(address = %self.address, elapsed = ?started.elapsed(), "Connected to debugger");
                    return Ok(client);
                }
                Err(e) => debug!(error = %e, "Debugger not accepting yet"),
            }

            if let Some(status) = self.exit_status().await {
                self.finish_capture().await;
                let detail = self.stderr_tail().unwrap_or(status);
                return Err(DelveError::ServerExited(detail));
            }
            if started.elapsed() >= CONNECT_DEADLINE {
                return Err(DelveError::Connect {
                    address: self.address.clone(),
                    detail: format!("no answer after {:?}", CONNECT_DEADLINE),
                });
            }

            let delay = delays.next().unwrap_or(CONNECT_MAX_DELAY);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(DelveError::Cancelled),
            }
        }
    }

    async fn exit_status(&self) -> Option<String> {
        let mut guard = self.child.lock().await;
        let child = guard.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => Some(status.to_string()),
            Ok(None) => None,
            Err(e) => Some(e.to_string()),
        }
    }

    /// Wait briefly for the output readers of an exited server.
    async fn finish_capture(&self) {
        let readers = std::mem::take(&mut *self.readers.lock().unwrap_or_else(|e| e.into_inner()));
        let all = futures::future::join_all(readers);
        if tokio::time::timeout(Duration::from_millis(500), all).await.is_err() {
            debug!("Debugger output still open after exit");
        }
    }

    fn stderr_tail(&self) -> Option<String> {
        self.captured.stderr_tail()
    }

    /// Output written since the last drain, in arrival order.
    pub fn drain_output(&self) -> Vec<String> {
        std::mem::take(&mut *self.captured.lines.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Kill the server. Safe to call more than once.
    pub async fn kill(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill debugger");
            }
            info!(address = %self.address, "Debugger stopped");
        }
    }
}

async fn capture<R>(stream: R, captured: Arc<Captured>, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        captured.push(line, is_stderr);
    }
}
