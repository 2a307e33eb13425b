//! External tool execution.
//!
//! Each invocation is self-contained: the binary is looked up, spawned with
//! its own arguments, directory and extra environment, and its streams are
//! captured in full. Cancelling the invocation's token terminates the
//! process group, waits a short grace period, then kills it.

use crate::error::{CoreError, CoreResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Time a cancelled process gets to exit after SIGTERM.
pub const TERMINATE_GRACE: Duration = Duration::from_millis(250);

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// One run of an external tool.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub binary: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Added to the inherited environment.
    pub env: Vec<(String, String)>,
    pub stdin: Option<Vec<u8>>,
    pub cancel: CancellationToken,
}

impl ToolInvocation {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
            working_dir: PathBuf::from("."),
            env: Vec::new(),
            stdin: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn envs(mut self, env: Vec<(String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Short form for logs: binary plus arguments.
    pub fn command_line(&self) -> String {
        std::iter::once(self.binary.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion; a failure exit status is `NonZeroExit`.
    pub async fn run(self) -> CoreResult<ToolOutput> {
        let tool = self.binary.clone();
        let output = self.output().await?;
        if output.success() {
            return Ok(output);
        }

        Err(CoreError::NonZeroExit {
            tool,
            code: output.code,
            stdout: output.stdout_str(),
            stderr: output.stderr_str(),
        })
    }

    /// Run to completion, returning the output whatever the exit status.
    pub async fn output(self) -> CoreResult<ToolOutput> {
        if self.cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        let program = which::which(&self.binary).map_err(|_| CoreError::ToolMissing {
            tool: self.binary.clone(),
        })?;

        debug!(
            command = %self.command_line(),
            cwd = %self.working_dir.display(),
            "Running tool"
        );

        let mut cmd = Command::new(&program);
        cmd.args(&self.args)
            .current_dir(&self.working_dir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| CoreError::Spawn {
            tool: self.binary.clone(),
            source,
        })?;

        if let (Some(input), Some(mut pipe)) = (self.stdin, child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(&input).await {
                    debug!(error = %e, "Tool stdin closed early");
                }
            });
        }

        let mut stdout = child.stdout.take();
        let mut stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(out) = stdout.as_mut() {
                out.read_to_end(&mut buf).await.ok();
            }
            buf
        });

        let mut stderr = child.stderr.take();
        let mut stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(err) = stderr.as_mut() {
                err.read_to_end(&mut buf).await.ok();
            }
            buf
        });

        // Gone once the child is reaped; the group may outlive it.
        let pid = child.id();

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = self.cancel.cancelled() => {
                debug!(tool = %self.binary, "Cancelling tool");
                terminate(&mut child).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(CoreError::Cancelled);
            }
        };

        // Leftover children may still hold the pipes open.
        let mut drain = Drain::after_exit(&mut stdout_task, &mut stderr_task, &self.cancel).await;
        if drain == Drain::Stalled {
            warn!(tool = %self.binary, "Tool left processes holding its output, killing them");
            kill_group(pid);
            drain = Drain::after_exit(&mut stdout_task, &mut stderr_task, &self.cancel).await;
        }
        let (stdout, stderr) = match drain {
            Drain::Done(stdout, stderr) => (stdout, stderr),
            Drain::Stalled => {
                stdout_task.abort();
                stderr_task.abort();
                (Vec::new(), Vec::new())
            }
            Drain::Cancelled => {
                kill_group(pid);
                stdout_task.abort();
                stderr_task.abort();
                return Err(CoreError::Cancelled);
            }
        };

        debug!(tool = %self.binary, code = ?status.code(), "Tool finished");

        Ok(ToolOutput {
            stdout,
            stderr,
            code: status.code(),
        })
    }
}

/// How reading the output of an exited process ended.
#[derive(Debug, PartialEq, Eq)]
enum Drain {
    Done(Vec<u8>, Vec<u8>),
    /// The pipes stayed open for the whole grace period.
    Stalled,
    Cancelled,
}

impl Drain {
    async fn after_exit(
        stdout: &mut JoinHandle<Vec<u8>>,
        stderr: &mut JoinHandle<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> Self {
        let both = async {
            let out = (&mut *stdout).await.unwrap_or_default();
            let err = (&mut *stderr).await.unwrap_or_default();
            (out, err)
        };
        tokio::select! {
            drained = tokio::time::timeout(TERMINATE_GRACE, both) => match drained {
                Ok((out, err)) => Drain::Done(out, err),
                Err(_) => Drain::Stalled,
            },
            _ = cancel.cancelled() => Drain::Cancelled,
        }
    }
}

fn kill_group(pid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            signal_group(pid, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

/// SIGTERM the process group, then SIGKILL after the grace period.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            signal_group(pid, libc::SIGTERM);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
    }

    if tokio::time::timeout(TERMINATE_GRACE, child.wait()).await.is_err() {
        warn!("Tool ignored SIGTERM, killing");
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                signal_group(pid, libc::SIGKILL);
            }
        }
        let _ = child.kill().await;
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn signal_group(pid: u32, signal: libc::c_int) {
    // SAFETY: killpg only sends a signal; the group was created at spawn.
    unsafe {
        if libc::killpg(pid as libc::pid_t, signal) == -1 {
            libc::kill(pid as libc::pid_t, signal);
        }
    }
}
