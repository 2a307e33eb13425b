//! JSON-RPC client for the debugger server.
//!
//! The server speaks JSON-RPC 1.0 with one JSON document per line:
//! requests carry `method`, a single-element `params` array and an `id`;
//! responses carry `id`, `result` and an `error` string or null. Several
//! requests may be in flight at once, so responses are matched by id.

use crate::api::{
    Breakpoint, BreakpointOut, ClearBreakpointIn, CommandIn, CreateBreakpointIn, DebuggerState, DetachIn, Empty,
    ExecCommand, Ignored, ListBreakpointsOut, ProcessPidOut, Stackframe, StacktraceIn, StacktraceOut,
    StateIn, StateOut,
};
use crate::error::{DelveError, DelveResult};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, trace, warn};

const SERVICE: &str = "RPCServer";

#[derive(Debug, Serialize)]
struct Request<P> {
    method: String,
    params: [P; 1],
    id: u64,
}

#[derive(Debug, Deserialize)]
struct Response {
    id: u64,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>;
type Writer = FramedWrite<Box<dyn AsyncWrite + Unpin + Send>, LinesCodec>;

/// Connection to a running debugger server.
pub struct DelveClient {
    writer: Mutex<Writer>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl DelveClient {
    /// Dial the server at `address`.
    pub async fn connect(address: &str) -> DelveResult<Self> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }

    /// Wrap an established byte stream and start reading responses.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        let writer: Box<dyn AsyncWrite + Unpin + Send> = Box::new(write);
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let reader = {
            let pending = Arc::clone(&pending);
            let closed = Arc::clone(&closed);
            let lines = FramedRead::new(read, LinesCodec::new());
            tokio::spawn(read_loop(lines, pending, closed))
        };

        Self {
            writer: Mutex::new(FramedWrite::new(writer, LinesCodec::new())),
            pending,
            closed,
            next_id: AtomicU64::new(0),
            reader,
        }
    }

    /// Whether the server side has gone away.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Call `RPCServer.<method>` with a single parameter object.
    pub async fn call<P, R>(&self, method: &str, params: P) -> DelveResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let method = format!("{SERVICE}.{method}");
        let line = serde_json::to_string(&Request {
            method: method.clone(),
            params: [params],
            id,
        })?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        if self.closed.load(Ordering::SeqCst) {
            self.pending.lock().await.remove(&id);
            return Err(DelveError::ConnectionClosed);
        }

        trace!(message = %line, "Sending to debugger");
        let sent = self.writer.lock().await.send(line).await;
        if let Err(e) = sent {
            self.pending.lock().await.remove(&id);
            return Err(e.into());
        }

        let response = rx.await.map_err(|_| DelveError::ConnectionClosed)?;
        match response.error {
            Some(message) => Err(DelveError::Remote { method, message }),
            None => Ok(serde_json::from_value(response.result)?),
        }
    }

    pub async fn create_breakpoint(&self, breakpoint: Breakpoint) -> DelveResult<Breakpoint> {
        let out: BreakpointOut = self.call("CreateBreakpoint", CreateBreakpointIn { breakpoint }).await?;
        Ok(out.breakpoint)
    }

    pub async fn clear_breakpoint(&self, id: i64) -> DelveResult<Breakpoint> {
        let out: BreakpointOut = self.call("ClearBreakpoint", ClearBreakpointIn { id }).await?;
        Ok(out.breakpoint)
    }

    pub async fn list_breakpoints(&self) -> DelveResult<Vec<Breakpoint>> {
        let out: ListBreakpointsOut = self.call("ListBreakpoints", Empty {}).await?;
        Ok(out.breakpoints)
    }

    /// Run an execution command and return the state it stopped in.
    pub async fn command(&self, command: ExecCommand) -> DelveResult<DebuggerState> {
        let params = CommandIn {
            name: command.as_str(),
        };
        let out: StateOut = self.call("Command", params).await?;
        Ok(out.state)
    }

    pub async fn state(&self) -> DelveResult<DebuggerState> {
        let out: StateOut = self.call("State", StateIn { non_blocking: true }).await?;
        Ok(out.state)
    }

    pub async fn stacktrace(&self, goroutine: i64, depth: i64) -> DelveResult<Vec<Stackframe>> {
        let params = StacktraceIn {
            id: goroutine,
            depth,
            full: false,
        };
        let out: StacktraceOut = self.call("Stacktrace", params).await?;
        Ok(out.locations)
    }

    pub async fn restart(&self) -> DelveResult<()> {
        let _: Ignored = self.call("Restart", Empty {}).await?;
        Ok(())
    }

    pub async fn process_pid(&self) -> DelveResult<i64> {
        let out: ProcessPidOut = self.call("ProcessPid", Empty {}).await?;
        Ok(out.pid)
    }

    /// Detach from the target; with `kill` the target is terminated.
    pub async fn detach(&self, kill: bool) -> DelveResult<()> {
        let _: Ignored = self.call("Detach", DetachIn { kill }).await?;
        Ok(())
    }
}

impl Drop for DelveClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop<R>(mut lines: FramedRead<R, LinesCodec>, pending: Pending, closed: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin,
{
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Error reading from debugger");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        trace!(message = %line, "Received from debugger");

        let response: Response = match serde_json::from_str(&line) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Unparseable debugger response");
                continue;
            }
        };
        match pending.lock().await.remove(&response.id) {
            Some(sender) => {
                let _ = sender.send(response);
            }
            None => debug!(id = response.id, "Response for unknown request"),
        }
    }

    debug!("Debugger connection closed");
    closed.store(true, Ordering::SeqCst);
    // Dropping the senders fails every waiting call.
    pending.lock().await.clear();
}
