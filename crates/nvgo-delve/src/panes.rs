//! Scratch buffers showing the debug session.
//!
//! Three panes are split off the source window: the stack context on the
//! right, the threads below it, and a terminal log under the source. Each
//! pane buffer stays read-only except inside a write, and a write holds
//! the pane lock from unlocking the buffer to locking it again.

use nvgo_editor::{Buffer, Cursor, Editor, EditorResult, Window};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

/// Buffer options of every pane.
fn pane_buffer_options() -> [(&'static str, Value); 5] {
    [
        ("buftype", json!("nofile")),
        ("bufhidden", json!("delete")),
        ("swapfile", json!(false)),
        ("buflisted", json!(false)),
        ("modifiable", json!(false)),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneKind {
    Terminal,
    Context,
    Threads,
}

impl PaneKind {
    pub fn buffer_name(&self) -> &'static str {
        match self {
            PaneKind::Terminal => "__GODEBUG_TERMINAL__",
            PaneKind::Context => "__GODEBUG_CONTEXT__",
            PaneKind::Threads => "__GODEBUG_THREADS__",
        }
    }
}

/// Pane sizes derived from the source window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaneLayout {
    pub context_width: i64,
    pub threads_height: i64,
    pub terminal_height: i64,
}

impl PaneLayout {
    pub fn for_window(width: i64, height: i64) -> Self {
        Self {
            context_width: (width / 3).max(1),
            threads_height: (height / 3).max(1),
            terminal_height: (height / 4).max(1),
        }
    }
}

/// One scratch buffer and the window showing it.
pub struct Pane {
    kind: PaneKind,
    editor: Editor,
    buffer: Buffer,
    window: Window,
    empty: AtomicBool,
    lock: Mutex<()>,
}

impl Pane {
    /// Turn the current window's buffer into a pane.
    async fn adopt(editor: &Editor, kind: PaneKind) -> EditorResult<Self> {
        let window = editor.current_window().await?;
        let buffer = editor.current_buffer().await?;

        let mut batch = editor.batch();
        batch.set_buffer_name(buffer, kind.buffer_name());
        for (name, value) in pane_buffer_options() {
            batch.set_buffer_option(buffer, name, value);
        }
        batch
            .set_window_option(window, "number", json!(false))
            .set_window_option(window, "relativenumber", json!(false))
            .set_window_option(window, "winfixheight", json!(true));
        batch.flush().await?;

        debug!(pane = kind.buffer_name(), buffer = buffer.0, window = window.0, "Opened debug pane");
        Ok(Self {
            kind,
            editor: editor.clone(),
            buffer,
            window,
            empty: AtomicBool::new(true),
            lock: Mutex::new(()),
        })
    }

    pub fn kind(&self) -> PaneKind {
        self.kind
    }

    pub fn buffer(&self) -> Buffer {
        self.buffer
    }

    pub fn window(&self) -> Window {
        self.window
    }

    /// Replace the whole content.
    pub async fn replace(&self, lines: Vec<String>) -> EditorResult<()> {
        let _guard = self.lock.lock().await;
        if !self.editor.buffer_is_valid(self.buffer).await? {
            return Ok(());
        }
        self.write(0, -1, lines).await?;
        self.empty.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Append lines and scroll to the last one.
    pub async fn append(&self, lines: Vec<String>) -> EditorResult<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        if !self.editor.buffer_is_valid(self.buffer).await? {
            return Ok(());
        }
        // A new buffer holds one blank line; overwrite it instead of appending after it.
        let start = if self.empty.load(Ordering::SeqCst) { 0 } else { -1 };
        self.write(start, -1, lines).await?;
        self.empty.store(false, Ordering::SeqCst);

        if self.editor.window_is_valid(self.window).await? {
            let last = self.editor.line_count(self.buffer).await?;
            self.editor
                .set_window_cursor(self.window, Cursor { row: last, col: 0 })
                .await?;
        }
        Ok(())
    }

    async fn write(&self, start: i64, end: i64, lines: Vec<String>) -> EditorResult<()> {
        let mut batch = self.editor.batch();
        batch
            .set_buffer_option(self.buffer, "modifiable", json!(true))
            .set_buffer_lines(self.buffer, start, end, false, lines)
            .set_buffer_option(self.buffer, "modifiable", json!(false));
        batch.flush().await?;
        Ok(())
    }

    pub async fn close(&self) -> EditorResult<()> {
        if self.editor.window_is_valid(self.window).await? {
            self.editor.close_window(self.window, true).await?;
        }
        Ok(())
    }
}

/// The three panes of a session.
pub struct Panes {
    pub terminal: Pane,
    pub context: Pane,
    pub threads: Pane,
}

impl Panes {
    /// Split the panes off `origin` and return focus to it.
    pub async fn open(editor: &Editor, origin: Window) -> EditorResult<Self> {
        let width = editor.window_width(origin).await?;
        let height = editor.window_height(origin).await?;
        let layout = PaneLayout::for_window(width, height);

        editor.set_current_window(origin).await?;
        editor
            .command(format!("botright {}vnew", layout.context_width))
            .await?;
        let context = Pane::adopt(editor, PaneKind::Context).await?;

        editor
            .command(format!("belowright {}new", layout.threads_height))
            .await?;
        let threads = Pane::adopt(editor, PaneKind::Threads).await?;

        editor.set_current_window(origin).await?;
        editor
            .command(format!("belowright {}new", layout.terminal_height))
            .await?;
        let terminal = Pane::adopt(editor, PaneKind::Terminal).await?;

        editor.set_current_window(origin).await?;
        Ok(Self {
            terminal,
            context,
            threads,
        })
    }

    pub async fn close(&self) -> EditorResult<()> {
        for pane in [&self.terminal, &self.context, &self.threads] {
            pane.close().await?;
        }
        Ok(())
    }
}
