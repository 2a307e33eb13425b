//! A live debug session and the slot holding it.
//!
//! A session owns the server process (when it started one), the RPC
//! connection, the three panes and two signs: one marking breakpoints,
//! keyed by the server's breakpoint id, and one marking the line the
//! process stopped at. Every request races the session's cancel token.

use crate::api::{Breakpoint, DebuggerState, ExecCommand};
use crate::console::{self, ConsoleCommand};
use crate::error::{DelveError, DelveResult};
use crate::panes::Panes;
use crate::render;
use crate::rpc::DelveClient;
use crate::server::{DelveServer, ServerSpec};
use nvgo_editor::{Cursor, Editor, Sign, Window};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sign id of the current-line marker; breakpoint ids stay far below it.
pub const PC_SIGN_ID: i64 = 999_999;
/// Frames shown in the context pane.
pub const STACK_DEPTH: i64 = 20;
const DETACH_TIMEOUT: Duration = Duration::from_secs(5);

const HIGHLIGHTS: &[(&str, &str)] = &[
    ("GoDebugBreakpoint", "Error"),
    ("GoDebugCurrent", "Search"),
    ("GoDebugCurrentLine", "CursorLine"),
];

pub struct DebugSession {
    editor: Editor,
    server: Option<DelveServer>,
    client: DelveClient,
    pid: AtomicI64,
    breakpoints: Mutex<BTreeMap<i64, Breakpoint>>,
    breakpoint_sign: Sign,
    pc_sign: Sign,
    panes: Panes,
    source_window: Window,
    cwd: PathBuf,
    cancel: CancellationToken,
}

impl DebugSession {
    /// Launch a server for `spec` and attach to it.
    pub async fn start(editor: Editor, spec: &ServerSpec, cancel: CancellationToken) -> DelveResult<Self> {
        let server = DelveServer::spawn(spec)?;
        let client = match server.connect(&cancel).await {
            Ok(client) => client,
            Err(e) => {
                server.kill().await;
                return Err(e);
            }
        };
        Self::connect(editor, client, Some(server), spec.working_dir.clone(), cancel).await
    }

    /// Attach to a server already reachable through `client`.
    pub async fn connect(
        editor: Editor,
        client: DelveClient,
        server: Option<DelveServer>,
        cwd: PathBuf,
        cancel: CancellationToken,
    ) -> DelveResult<Self> {
        let pid = client.process_pid().await?;
        let source_window = editor.current_window().await?;
        let panes = Panes::open(&editor, source_window).await?;

        let mut batch = editor.batch();
        for (group, link) in HIGHLIGHTS {
            batch.command(format!("highlight default link {group} {link}"));
        }
        batch.flush().await?;

        let breakpoint_sign = Sign::new(editor.clone(), "GoDebugBreakpoint", "●", "GoDebugBreakpoint", None);
        let pc_sign = Sign::new(
            editor.clone(),
            "GoDebugCurrent",
            "▶",
            "GoDebugCurrent",
            Some("GoDebugCurrentLine".to_string()),
        );
        breakpoint_sign.define().await?;
        pc_sign.define().await?;

        let session = Self {
            editor,
            server,
            client,
            pid: AtomicI64::new(pid),
            breakpoints: Mutex::new(BTreeMap::new()),
            breakpoint_sign,
            pc_sign,
            panes,
            source_window,
            cwd,
            cancel,
        };
        session
            .panes
            .terminal
            .append(vec![
                format!("Attached to process {pid}"),
                "Type help at the DlvStdin prompt for commands".to_string(),
            ])
            .await?;
        info!(pid, "Debug session started");
        Ok(session)
    }

    pub fn pid(&self) -> i64 {
        self.pid.load(Ordering::SeqCst)
    }

    pub fn panes(&self) -> &Panes {
        &self.panes
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Breakpoints set through this session, by id.
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.breakpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    async fn guard<T, F>(&self, cancel: &CancellationToken, fut: F) -> DelveResult<T>
    where
        F: Future<Output = DelveResult<T>>,
    {
        tokio::select! {
            result = fut => result,
            _ = self.cancel.cancelled() => Err(DelveError::Cancelled),
            _ = cancel.cancelled() => Err(DelveError::Cancelled),
        }
    }

    async fn log(&self, lines: Vec<String>) -> DelveResult<()> {
        self.panes.terminal.append(lines).await?;
        Ok(())
    }

    /// Breakpoint at the cursor line of the source window.
    pub async fn breakpoint_at_cursor(&self) -> DelveResult<Breakpoint> {
        let buffer = self.editor.window_buffer(self.source_window).await?;
        let file = self.editor.buffer_name(buffer).await?;
        if file.is_empty() {
            return Err(DelveError::invalid_argument("the current buffer has no file"));
        }
        let cursor = self.editor.window_cursor(self.source_window).await?;
        Ok(Breakpoint::at_line(file, cursor.row))
    }

    /// Set a breakpoint from `file:line`, a function name, or the cursor.
    pub async fn set_breakpoint(&self, spec: Option<&str>, cancel: &CancellationToken) -> DelveResult<Breakpoint> {
        let request = match spec {
            Some(spec) => console::parse_breakpoint(spec, &self.cwd)?,
            None => self.breakpoint_at_cursor().await?,
        };
        let breakpoint = self.guard(cancel, self.client.create_breakpoint(request)).await?;

        if !breakpoint.file.is_empty() && breakpoint.line > 0 {
            self.breakpoint_sign
                .place(breakpoint.id, breakpoint.line, Path::new(&breakpoint.file), false)
                .await?;
        }
        self.breakpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(breakpoint.id, breakpoint.clone());

        debug!(id = breakpoint.id, file = %breakpoint.file, line = breakpoint.line, "Breakpoint set");
        let lines = render::render_breakpoints(std::slice::from_ref(&breakpoint), &self.cwd);
        self.log(lines.into_iter().map(|l| format!("{l} set")).collect()).await?;
        Ok(breakpoint)
    }

    pub async fn clear_breakpoint(&self, id: i64, cancel: &CancellationToken) -> DelveResult<()> {
        let cleared = self.guard(cancel, self.client.clear_breakpoint(id)).await?;
        let known = self
            .breakpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);

        let file = known.map(|b| b.file).unwrap_or(cleared.file);
        if !file.is_empty() {
            self.breakpoint_sign.unplace(id, Path::new(&file)).await?;
        }
        self.log(vec![format!("Breakpoint {id} cleared")]).await
    }

    /// User breakpoints known to the server. Refreshes the local table.
    pub async fn list_breakpoints(&self, cancel: &CancellationToken) -> DelveResult<Vec<Breakpoint>> {
        let all = self.guard(cancel, self.client.list_breakpoints()).await?;
        let user: Vec<Breakpoint> = all.into_iter().filter(Breakpoint::is_user).collect();

        let mut table = self.breakpoints.lock().unwrap_or_else(|e| e.into_inner());
        *table = user.iter().map(|b| (b.id, b.clone())).collect();
        Ok(user)
    }

    /// Run an execution command and show where it stopped.
    pub async fn execute(&self, command: ExecCommand, cancel: &CancellationToken) -> DelveResult<DebuggerState> {
        debug!(command = command.as_str(), "Debugger command");
        let state = self.guard(cancel, self.client.command(command)).await?;
        self.show_state(&state, cancel).await?;
        Ok(state)
    }

    /// Render `state` into the panes and move the current-line marker.
    pub async fn show_state(&self, state: &DebuggerState, cancel: &CancellationToken) -> DelveResult<()> {
        let mut log = self.server.as_ref().map(DelveServer::drain_output).unwrap_or_default();
        log.push(render::state_line(state, &self.cwd));

        if state.exited {
            self.unplace_pc().await?;
            self.panes.context.replace(vec![render::state_line(state, &self.cwd)]).await?;
            self.panes.threads.replace(Vec::new()).await?;
            return self.log(log).await;
        }

        if let Some(thread) = &state.current_thread {
            let frames = self
                .guard(cancel, self.client.stacktrace(thread.goroutine_id, STACK_DEPTH))
                .await?;
            self.panes
                .context
                .replace(render::render_context(thread, &frames, &self.cwd))
                .await?;
            self.panes
                .threads
                .replace(render::render_threads(&state.threads, Some(thread.id), &self.cwd))
                .await?;

            if !thread.file.is_empty() && thread.line > 0 {
                let file = Path::new(&thread.file);
                self.pc_sign.place(PC_SIGN_ID, thread.line, file, true).await?;
                self.jump(file, thread.line).await?;
            }
        }
        self.log(log).await
    }

    /// Show `file` at `line` in the source window.
    async fn jump(&self, file: &Path, line: i64) -> DelveResult<()> {
        if !self.editor.window_is_valid(self.source_window).await? {
            debug!("Source window closed; not following");
            return Ok(());
        }
        self.editor.set_current_window(self.source_window).await?;
        let buffer = self.editor.window_buffer(self.source_window).await?;
        if Path::new(&self.editor.buffer_name(buffer).await?) != file {
            self.editor.command(format!("edit {}", file.display())).await?;
        }
        self.editor
            .set_window_cursor(self.source_window, Cursor { row: line, col: 0 })
            .await?;
        Ok(())
    }

    async fn unplace_pc(&self) -> DelveResult<()> {
        if let Some((id, file)) = self.pc_sign.last_placement() {
            self.pc_sign.unplace(id, &file).await?;
        }
        Ok(())
    }

    /// Restart the process from the beginning.
    pub async fn restart(&self, cancel: &CancellationToken) -> DelveResult<()> {
        self.guard(cancel, self.client.restart()).await?;
        let pid = self.guard(cancel, self.client.process_pid()).await?;
        self.pid.store(pid, Ordering::SeqCst);
        self.unplace_pc().await?;
        info!(pid, "Debug process restarted");
        self.log(vec![format!("Process restarted with PID {pid}")]).await
    }

    /// Stack of the current goroutine.
    pub async fn stack(&self, cancel: &CancellationToken) -> DelveResult<Vec<String>> {
        let state = self.guard(cancel, self.client.state()).await?;
        let Some(thread) = state.current_thread else {
            return Ok(vec![render::state_line(&state, &self.cwd)]);
        };
        let frames = self
            .guard(cancel, self.client.stacktrace(thread.goroutine_id, STACK_DEPTH))
            .await?;
        Ok(render::render_context(&thread, &frames, &self.cwd))
    }

    /// Run one console line, echoing it and its output to the terminal pane.
    pub async fn execute_console(&self, line: &str, cancel: &CancellationToken) -> DelveResult<()> {
        self.log(vec![format!("(dlv) {}", line.trim())]).await?;

        let result = match console::parse_line(line) {
            Ok(command) => self.console(command, cancel).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(output) => self.log(output).await,
            // Bad input and server refusals are shown inline like any other output.
            Err(e @ (DelveError::InvalidArgument(_) | DelveError::Remote { .. })) => {
                self.log(vec![format!("Command failed: {e}")]).await
            }
            Err(e) => Err(e),
        }
    }

    async fn console(&self, command: ConsoleCommand, cancel: &CancellationToken) -> DelveResult<Vec<String>> {
        match command {
            ConsoleCommand::Break(spec) => {
                self.set_breakpoint(spec.as_deref(), cancel).await?;
                Ok(Vec::new())
            }
            ConsoleCommand::Clear(id) => {
                self.clear_breakpoint(id, cancel).await?;
                Ok(Vec::new())
            }
            ConsoleCommand::Breakpoints => {
                let breakpoints = self.list_breakpoints(cancel).await?;
                Ok(render::render_breakpoints(&breakpoints, &self.cwd))
            }
            ConsoleCommand::Continue => self.step(ExecCommand::Continue, cancel).await,
            ConsoleCommand::Next => self.step(ExecCommand::Next, cancel).await,
            ConsoleCommand::Step => self.step(ExecCommand::Step, cancel).await,
            ConsoleCommand::StepOut => self.step(ExecCommand::StepOut, cancel).await,
            ConsoleCommand::Stack => self.stack(cancel).await,
            ConsoleCommand::Restart => {
                self.restart(cancel).await?;
                Ok(Vec::new())
            }
            ConsoleCommand::Help => Ok(console::help()),
        }
    }

    async fn step(&self, command: ExecCommand, cancel: &CancellationToken) -> DelveResult<Vec<String>> {
        self.execute(command, cancel).await?;
        Ok(Vec::new())
    }

    /// End the session: kill the process and server, remove signs, close panes.
    pub async fn detach(&self) -> DelveResult<()> {
        if !self.client.is_closed() {
            match tokio::time::timeout(DETACH_TIMEOUT, self.client.detach(true)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Detach failed"),
                Err(_) => warn!("Detach timed out"),
            }
        }
        self.cancel.cancel();
        if let Some(server) = &self.server {
            server.kill().await;
        }

        self.unplace_pc().await?;
        for breakpoint in self.breakpoints() {
            if !breakpoint.file.is_empty() {
                self.breakpoint_sign
                    .unplace(breakpoint.id, Path::new(&breakpoint.file))
                    .await?;
            }
        }
        self.breakpoints.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.panes.close().await?;
        info!(pid = self.pid(), "Debug session ended");
        Ok(())
    }
}

enum Slot {
    Idle,
    Starting,
    Running(Arc<DebugSession>),
}

/// A claimed `Starting` slot. Dropping it unsettled, as when the start
/// is abandoned mid-way, frees the slot again.
struct Reservation<'a> {
    debugger: &'a Debugger,
    settled: bool,
}

impl Reservation<'_> {
    fn settle(mut self, result: DelveResult<DebugSession>) -> DelveResult<Arc<DebugSession>> {
        self.settled = true;
        let mut slot = self.debugger.slot();
        match result {
            Ok(session) => {
                let session = Arc::new(session);
                *slot = Slot::Running(Arc::clone(&session));
                Ok(session)
            }
            Err(e) => {
                *slot = Slot::Idle;
                Err(e)
            }
        }
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut slot = self.debugger.slot();
        if matches!(*slot, Slot::Starting) {
            debug!("Debugger start abandoned");
            *slot = Slot::Idle;
        }
    }
}

/// Holds at most one debug session.
pub struct Debugger {
    slot: Mutex<Slot>,
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}

impl Debugger {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Idle),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn reserve(&self) -> DelveResult<Reservation<'_>> {
        let mut slot = self.slot();
        match *slot {
            Slot::Idle => {
                *slot = Slot::Starting;
                Ok(Reservation {
                    debugger: self,
                    settled: false,
                })
            }
            _ => Err(DelveError::AlreadyRunning),
        }
    }

    /// Start a server and open a session on it.
    pub async fn start(
        &self,
        editor: Editor,
        spec: &ServerSpec,
        cancel: CancellationToken,
    ) -> DelveResult<Arc<DebugSession>> {
        let reservation = self.reserve()?;
        let result = DebugSession::start(editor, spec, cancel).await;
        reservation.settle(result)
    }

    /// Open a session over an existing connection.
    pub async fn attach(
        &self,
        editor: Editor,
        client: DelveClient,
        cwd: PathBuf,
        cancel: CancellationToken,
    ) -> DelveResult<Arc<DebugSession>> {
        let reservation = self.reserve()?;
        let result = DebugSession::connect(editor, client, None, cwd, cancel).await;
        reservation.settle(result)
    }

    pub fn current(&self) -> DelveResult<Arc<DebugSession>> {
        match &*self.slot() {
            Slot::Running(session) => Ok(Arc::clone(session)),
            _ => Err(DelveError::NotRunning),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.slot(), Slot::Running(_))
    }

    fn take(&self) -> Option<Arc<DebugSession>> {
        let mut slot = self.slot();
        match std::mem::replace(&mut *slot, Slot::Idle) {
            Slot::Running(session) => Some(session),
            other => {
                *slot = other;
                None
            }
        }
    }

    /// Detach and forget the current session.
    pub async fn stop(&self) -> DelveResult<()> {
        let session = self.take().ok_or(DelveError::NotRunning)?;
        session.detach().await
    }

    /// Release any session; errors are logged.
    pub async fn shutdown(&self) {
        if let Some(session) = self.take() {
            if let Err(e) = session.detach().await {
                warn!(error = %e, "Debug session did not shut down cleanly");
            }
        }
    }
}
