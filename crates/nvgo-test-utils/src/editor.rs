//! In-memory editor host.
//!
//! [`FakeEditor`] answers the host API calls issued by the editor surface
//! and records what was asked of it, so commands can be exercised end to
//! end without a running editor.

use async_trait::async_trait;
use nvgo_editor::{Editor, EditorClient, EditorError, EditorResult, ErrlistItem, ErrlistKind};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
struct FakeBuffer {
    name: String,
    lines: Vec<String>,
    options: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
struct FakeWindow {
    buffer: i64,
    cursor: (i64, i64),
    width: i64,
    height: i64,
    options: HashMap<String, Value>,
}

/// A highlight added through `nvim_buf_add_highlight`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub buffer: i64,
    pub namespace: i64,
    pub group: String,
    pub line: i64,
    pub col_start: i64,
    pub col_end: i64,
}

/// A `termopen` request.
#[derive(Debug, Clone, PartialEq)]
pub struct TermOpen {
    pub command: Vec<String>,
    pub cwd: Option<String>,
    pub buffer: i64,
}

#[derive(Debug, Default)]
struct State {
    buffers: BTreeMap<i64, FakeBuffer>,
    windows: BTreeMap<i64, FakeWindow>,
    current_win: i64,
    previous_win: Option<i64>,
    next_buf: i64,
    next_win: i64,
    vars: HashMap<String, Value>,
    loclist: Vec<ErrlistItem>,
    qflist: Vec<ErrlistItem>,
    commands: Vec<String>,
    echoes: Vec<String>,
    calls: Vec<(String, Vec<Value>)>,
    function_results: HashMap<String, VecDeque<Value>>,
    namespaces: HashMap<String, i64>,
    highlights: Vec<Highlight>,
    termopens: Vec<TermOpen>,
    failing: HashMap<String, String>,
}

/// In-memory editor.
///
/// Starts with buffer 1 shown in window 1000.
pub struct FakeEditor {
    state: Mutex<State>,
}

impl Default for FakeEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEditor {
    pub fn new() -> Self {
        let mut state = State {
            next_buf: 2,
            next_win: 1001,
            current_win: 1000,
            ..State::default()
        };
        state.buffers.insert(
            1,
            FakeBuffer {
                lines: vec![String::new()],
                ..FakeBuffer::default()
            },
        );
        state.windows.insert(
            1000,
            FakeWindow {
                buffer: 1,
                cursor: (1, 0),
                width: 160,
                height: 48,
                options: HashMap::new(),
            },
        );
        Self {
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// An [`Editor`] talking to this fake.
    pub fn editor(self: &Arc<Self>) -> Editor {
        Editor::new(Arc::clone(self) as Arc<dyn EditorClient>)
    }

    // ------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------

    /// Show `path` with `content` in the current window.
    pub fn open_file(&self, path: impl AsRef<Path>, content: &str) -> i64 {
        let mut state = self.state();
        let win = state.current_win;
        let buf = state.windows.get(&win).map(|w| w.buffer).unwrap_or(1);
        let entry = state.buffers.entry(buf).or_default();
        entry.name = path.as_ref().display().to_string();
        entry.lines = split_lines(content);
        if let Some(w) = state.windows.get_mut(&win) {
            w.cursor = (1, 0);
        }
        buf
    }

    /// Show the on-disk content of `path` in the current window.
    pub fn open_path(&self, path: impl AsRef<Path>) -> i64 {
        let content = std::fs::read_to_string(path.as_ref()).unwrap_or_default();
        self.open_file(path, &content)
    }

    /// Show `path` in a new buffer in the current window, like `:edit`.
    pub fn edit_file(&self, path: impl AsRef<Path>, content: &str) -> i64 {
        let mut state = self.state();
        let buf = state.new_buffer();
        if let Some(entry) = state.buffers.get_mut(&buf) {
            entry.name = path.as_ref().display().to_string();
            entry.lines = split_lines(content);
        }
        let win = state.current_win;
        if let Some(w) = state.windows.get_mut(&win) {
            w.buffer = buf;
            w.cursor = (1, 0);
        }
        buf
    }

    pub fn set_cursor(&self, row: i64, col: i64) {
        let mut state = self.state();
        let win = state.current_win;
        if let Some(w) = state.windows.get_mut(&win) {
            w.cursor = (row, col);
        }
    }

    pub fn set_window_size(&self, width: i64, height: i64) {
        let mut state = self.state();
        let win = state.current_win;
        if let Some(w) = state.windows.get_mut(&win) {
            w.width = width;
            w.height = height;
        }
    }

    pub fn set_var(&self, name: &str, value: Value) {
        self.state().vars.insert(name.to_string(), value);
    }

    /// Queue the next result of a vimscript function such as `input`.
    pub fn push_function_result(&self, name: &str, value: Value) {
        self.state()
            .function_results
            .entry(name.to_string())
            .or_default()
            .push_back(value);
    }

    /// Make every call of `method` fail with `message`.
    pub fn fail(&self, method: &str, message: &str) {
        self.state()
            .failing
            .insert(method.to_string(), message.to_string());
    }

    /// Let calls of `method` succeed again.
    pub fn clear_failure(&self, method: &str) {
        self.state().failing.remove(method);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn current_buffer(&self) -> i64 {
        let state = self.state();
        state
            .windows
            .get(&state.current_win)
            .map(|w| w.buffer)
            .unwrap_or(1)
    }

    pub fn current_window(&self) -> i64 {
        self.state().current_win
    }

    pub fn cursor(&self) -> (i64, i64) {
        let state = self.state();
        state
            .windows
            .get(&state.current_win)
            .map(|w| w.cursor)
            .unwrap_or((1, 0))
    }

    pub fn window_cursor(&self, win: i64) -> Option<(i64, i64)> {
        self.state().windows.get(&win).map(|w| w.cursor)
    }

    pub fn lines(&self, buf: i64) -> Vec<String> {
        self.state()
            .buffers
            .get(&buf)
            .map(|b| b.lines.clone())
            .unwrap_or_default()
    }

    pub fn buffer_name(&self, buf: i64) -> String {
        self.state()
            .buffers
            .get(&buf)
            .map(|b| b.name.clone())
            .unwrap_or_default()
    }

    pub fn buffer_option(&self, buf: i64, name: &str) -> Option<Value> {
        self.state()
            .buffers
            .get(&buf)
            .and_then(|b| b.options.get(name).cloned())
    }

    pub fn window_option(&self, win: i64, name: &str) -> Option<Value> {
        self.state()
            .windows
            .get(&win)
            .and_then(|w| w.options.get(name).cloned())
    }

    pub fn window_count(&self) -> usize {
        self.state().windows.len()
    }

    pub fn errlist(&self, kind: ErrlistKind) -> Vec<ErrlistItem> {
        let state = self.state();
        match kind {
            ErrlistKind::LocationList => state.loclist.clone(),
            ErrlistKind::Quickfix => state.qflist.clone(),
        }
    }

    /// Every ex command executed, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    /// Every echoed message, chunks joined.
    pub fn echoes(&self) -> Vec<String> {
        self.state().echoes.clone()
    }

    /// Arguments of every call to `method`.
    pub fn calls(&self, method: &str) -> Vec<Vec<Value>> {
        self.state()
            .calls
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, a)| a.clone())
            .collect()
    }

    pub fn highlights(&self) -> Vec<Highlight> {
        self.state().highlights.clone()
    }

    pub fn termopens(&self) -> Vec<TermOpen> {
        self.state().termopens.clone()
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn dispatch(&self, method: &str, args: &[Value]) -> EditorResult<Value> {
        let mut state = self.state();
        state.calls.push((method.to_string(), args.to_vec()));

        if let Some(message) = state.failing.get(method) {
            return Err(remote(method, message.clone()));
        }

        match method {
            "nvim_call_atomic" => {
                drop(state);
                let calls = args.first().and_then(Value::as_array).cloned().unwrap_or_default();
                let mut results = Vec::new();
                for (index, call) in calls.iter().enumerate() {
                    let name = call[0].as_str().unwrap_or_default();
                    let call_args = call[1].as_array().cloned().unwrap_or_default();
                    match self.dispatch(name, &call_args) {
                        Ok(v) => results.push(v),
                        Err(e) => return Ok(json!([results, [index, 0, e.to_string()]])),
                    }
                }
                Ok(json!([results, null]))
            }
            "nvim_command" => {
                let cmd = str_arg(args, 0, method)?;
                state.run_command(&cmd);
                Ok(Value::Null)
            }
            "nvim_call_function" => {
                let name = str_arg(args, 0, method)?;
                let fargs = args.get(1).and_then(Value::as_array).cloned().unwrap_or_default();
                state.call_function(&name, &fargs)
            }
            "nvim_get_var" => {
                let name = str_arg(args, 0, method)?;
                state
                    .vars
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| remote(method, format!("Key not found: {name}")))
            }
            "nvim_echo" => {
                let text: String = args
                    .first()
                    .and_then(Value::as_array)
                    .map(|chunks| {
                        chunks
                            .iter()
                            .filter_map(|c| c[0].as_str())
                            .collect::<Vec<_>>()
                            .join("")
                    })
                    .unwrap_or_default();
                state.echoes.push(text);
                Ok(Value::Null)
            }
            "nvim_out_write" | "nvim_err_writeln" => {
                let text = str_arg(args, 0, method)?;
                state.echoes.push(text.trim_end().to_string());
                Ok(Value::Null)
            }
            "nvim_get_current_buf" => Ok(json!(state.current_buffer())),
            "nvim_get_current_win" => Ok(json!(state.current_win)),
            "nvim_set_current_win" => {
                let win = int_arg(args, 0, method)?;
                if !state.windows.contains_key(&win) {
                    return Err(remote(method, format!("Invalid window id: {win}")));
                }
                state.switch_window(win);
                Ok(Value::Null)
            }
            "nvim_get_current_line" => {
                let buf = state.current_buffer();
                let row = state.windows.get(&state.current_win).map(|w| w.cursor.0).unwrap_or(1);
                let line = state
                    .buffers
                    .get(&buf)
                    .and_then(|b| b.lines.get((row - 1).max(0) as usize).cloned())
                    .unwrap_or_default();
                Ok(json!(line))
            }
            "nvim_buf_is_valid" => {
                let buf = int_arg(args, 0, method)?;
                Ok(json!(state.buffers.contains_key(&buf)))
            }
            "nvim_buf_get_lines" => {
                let buf = state.buffer_mut(int_arg(args, 0, method)?, method)?;
                let (start, end) = range(&buf.lines, int_arg(args, 1, method)?, int_arg(args, 2, method)?);
                Ok(json!(buf.lines[start..end]))
            }
            "nvim_buf_set_lines" => {
                let start = int_arg(args, 1, method)?;
                let end = int_arg(args, 2, method)?;
                let lines: Vec<String> = args
                    .get(4)
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                let buf = state.buffer_mut(int_arg(args, 0, method)?, method)?;
                if buf.options.get("modifiable") == Some(&json!(false)) {
                    return Err(remote(method, "Buffer is not 'modifiable'".to_string()));
                }
                let (start, end) = range(&buf.lines, start, end);
                buf.lines.splice(start..end, lines);
                if buf.lines.is_empty() {
                    buf.lines.push(String::new());
                }
                Ok(Value::Null)
            }
            "nvim_buf_line_count" => {
                let buf = state.buffer_mut(int_arg(args, 0, method)?, method)?;
                Ok(json!(buf.lines.len()))
            }
            "nvim_buf_get_name" => {
                let buf = state.buffer_mut(int_arg(args, 0, method)?, method)?;
                Ok(json!(buf.name))
            }
            "nvim_buf_set_name" => {
                let name = str_arg(args, 1, method)?;
                let buf = state.buffer_mut(int_arg(args, 0, method)?, method)?;
                buf.name = name;
                Ok(Value::Null)
            }
            "nvim_buf_get_option" => {
                let name = str_arg(args, 1, method)?;
                let buf = state.buffer_mut(int_arg(args, 0, method)?, method)?;
                Ok(buf.options.get(&name).cloned().unwrap_or(Value::Null))
            }
            "nvim_buf_set_option" => {
                let name = str_arg(args, 1, method)?;
                let value = args.get(2).cloned().unwrap_or(Value::Null);
                let buf = state.buffer_mut(int_arg(args, 0, method)?, method)?;
                buf.options.insert(name, value);
                Ok(Value::Null)
            }
            "nvim_create_namespace" => {
                let name = str_arg(args, 0, method)?;
                let next = state.namespaces.len() as i64 + 1;
                Ok(json!(*state.namespaces.entry(name).or_insert(next)))
            }
            "nvim_buf_add_highlight" => {
                let h = Highlight {
                    buffer: int_arg(args, 0, method)?,
                    namespace: int_arg(args, 1, method)?,
                    group: str_arg(args, 2, method)?,
                    line: int_arg(args, 3, method)?,
                    col_start: int_arg(args, 4, method)?,
                    col_end: int_arg(args, 5, method)?,
                };
                state.highlights.push(h);
                Ok(json!(0))
            }
            "nvim_buf_clear_namespace" => {
                let buf = int_arg(args, 0, method)?;
                let ns = int_arg(args, 1, method)?;
                state
                    .highlights
                    .retain(|h| !(h.buffer == buf && (ns < 0 || h.namespace == ns)));
                Ok(Value::Null)
            }
            "nvim_win_is_valid" => {
                let win = int_arg(args, 0, method)?;
                Ok(json!(state.windows.contains_key(&win)))
            }
            "nvim_win_get_buf" => {
                let win = state.window_mut(int_arg(args, 0, method)?, method)?;
                Ok(json!(win.buffer))
            }
            "nvim_win_get_cursor" => {
                let win = state.window_mut(int_arg(args, 0, method)?, method)?;
                Ok(json!([win.cursor.0, win.cursor.1]))
            }
            "nvim_win_set_cursor" => {
                let pos = args.get(1).cloned().unwrap_or(Value::Null);
                let row = pos[0].as_i64().unwrap_or(1);
                let col = pos[1].as_i64().unwrap_or(0);
                let win = state.window_mut(int_arg(args, 0, method)?, method)?;
                win.cursor = (row, col);
                Ok(Value::Null)
            }
            "nvim_win_get_width" => {
                let win = state.window_mut(int_arg(args, 0, method)?, method)?;
                Ok(json!(win.width))
            }
            "nvim_win_get_height" => {
                let win = state.window_mut(int_arg(args, 0, method)?, method)?;
                Ok(json!(win.height))
            }
            "nvim_win_set_option" => {
                let name = str_arg(args, 1, method)?;
                let value = args.get(2).cloned().unwrap_or(Value::Null);
                let win = state.window_mut(int_arg(args, 0, method)?, method)?;
                win.options.insert(name, value);
                Ok(Value::Null)
            }
            "nvim_win_close" => {
                let win = int_arg(args, 0, method)?;
                state.close_window(win);
                Ok(Value::Null)
            }
            other => Err(remote(other, "Unsupported method".to_string())),
        }
    }
}

#[async_trait]
impl EditorClient for FakeEditor {
    async fn call(&self, method: &str, args: Vec<Value>) -> EditorResult<Value> {
        self.dispatch(method, &args)
    }
}

impl State {
    fn current_buffer(&self) -> i64 {
        self.windows
            .get(&self.current_win)
            .map(|w| w.buffer)
            .unwrap_or(1)
    }

    fn buffer_mut(&mut self, buf: i64, method: &str) -> EditorResult<&mut FakeBuffer> {
        let buf = if buf == 0 { self.current_buffer() } else { buf };
        self.buffers
            .get_mut(&buf)
            .ok_or_else(|| remote(method, format!("Invalid buffer id: {buf}")))
    }

    fn window_mut(&mut self, win: i64, method: &str) -> EditorResult<&mut FakeWindow> {
        let win = if win == 0 { self.current_win } else { win };
        self.windows
            .get_mut(&win)
            .ok_or_else(|| remote(method, format!("Invalid window id: {win}")))
    }

    fn switch_window(&mut self, win: i64) {
        if win != self.current_win {
            self.previous_win = Some(self.current_win);
            self.current_win = win;
        }
    }

    fn close_window(&mut self, win: i64) {
        if let Some(closed) = self.windows.remove(&win) {
            let hidden_delete = self
                .buffers
                .get(&closed.buffer)
                .and_then(|b| b.options.get("bufhidden"))
                == Some(&json!("delete"));
            if hidden_delete && !self.windows.values().any(|w| w.buffer == closed.buffer) {
                self.buffers.remove(&closed.buffer);
            }
        }
        if self.current_win == win {
            let next = self
                .previous_win
                .filter(|w| self.windows.contains_key(w))
                .or_else(|| self.windows.keys().next().copied());
            if let Some(next) = next {
                self.current_win = next;
            }
        }
    }

    fn new_buffer(&mut self) -> i64 {
        let id = self.next_buf;
        self.next_buf += 1;
        self.buffers.insert(
            id,
            FakeBuffer {
                lines: vec![String::new()],
                ..FakeBuffer::default()
            },
        );
        id
    }

    fn split(&mut self, cmd: &str) {
        let size: i64 = cmd
            .split_whitespace()
            .last()
            .map(|w| w.trim_end_matches(char::is_alphabetic))
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        let vertical = cmd.contains("vnew") || cmd.contains("vsplit");
        let (width, height) = self
            .windows
            .get(&self.current_win)
            .map(|w| (w.width, w.height))
            .unwrap_or((160, 48));

        let buffer = self.new_buffer();
        let id = self.next_win;
        self.next_win += 1;
        self.windows.insert(
            id,
            FakeWindow {
                buffer,
                cursor: (1, 0),
                width: if vertical && size > 0 { size } else { width },
                height: if !vertical && size > 0 { size } else { height },
                options: HashMap::new(),
            },
        );
        self.switch_window(id);
    }

    fn run_command(&mut self, cmd: &str) {
        self.commands.push(cmd.to_string());
        let trimmed = cmd.trim();
        let word = trimmed
            .split_whitespace()
            .find(|w| !matches!(*w, "botright" | "topleft" | "aboveleft" | "belowright" | "silent" | "keepalt"))
            .unwrap_or_default();

        let size_prefix = word
            .strip_suffix("vnew")
            .or_else(|| word.strip_suffix("new"));
        if size_prefix.is_some_and(|p| p.chars().all(|c| c.is_ascii_digit())) {
            self.split(trimmed);
            return;
        }

        match word {
            "enew" => {
                let buffer = self.new_buffer();
                if let Some(w) = self.windows.get_mut(&self.current_win) {
                    w.buffer = buffer;
                    w.cursor = (1, 0);
                }
            }
            "wincmd" if trimmed.ends_with(" p") => {
                if let Some(prev) = self.previous_win.filter(|w| self.windows.contains_key(w)) {
                    self.switch_window(prev);
                }
            }
            "edit" | "edit!" | "e" => {
                let path = trimmed
                    .split_whitespace()
                    .skip_while(|w| *w != word)
                    .skip(1)
                    .collect::<Vec<_>>()
                    .join(" ");
                let buf = self.current_buffer();
                let path = match (path.is_empty(), self.buffers.get(&buf)) {
                    (true, Some(b)) => b.name.clone(),
                    _ => path,
                };
                let content = std::fs::read_to_string(&path).unwrap_or_default();
                if let Some(b) = self.buffers.get_mut(&buf) {
                    b.name = path;
                    b.lines = split_lines(&content);
                }
                if let Some(w) = self.windows.get_mut(&self.current_win) {
                    w.cursor = (1, 0);
                }
            }
            _ => {}
        }

        if trimmed.ends_with("write") || trimmed.ends_with("write!") || trimmed == "w" {
            let buf = self.current_buffer();
            if let Some(b) = self.buffers.get(&buf) {
                if !b.name.is_empty() {
                    let mut content = b.lines.join("\n");
                    content.push('\n');
                    let _ = std::fs::write(PathBuf::from(&b.name), content);
                }
            }
        }
    }

    fn call_function(&mut self, name: &str, args: &[Value]) -> EditorResult<Value> {
        let method = "nvim_call_function";
        match name {
            "setloclist" | "setqflist" => {
                let (items, flag) = if name == "setloclist" {
                    (args.get(1), args.get(2))
                } else {
                    (args.first(), args.get(1))
                };
                let items: Vec<ErrlistItem> = items
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                let append = flag.and_then(Value::as_str) == Some("a");
                let list = if name == "setloclist" {
                    &mut self.loclist
                } else {
                    &mut self.qflist
                };
                if !append {
                    list.clear();
                }
                list.extend(items);
                Ok(json!(0))
            }
            "getloclist" => Ok(json!(self.loclist)),
            "getqflist" => Ok(json!(self.qflist)),
            "termopen" => {
                let command: Vec<String> = args
                    .first()
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                let cwd = args
                    .get(1)
                    .and_then(|o| o.get("cwd"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let buffer = self.current_buffer();
                if let Some(b) = self.buffers.get(&buffer) {
                    if b.options.get("modified") == Some(&json!(true)) {
                        return Err(remote(method, "Can only call this function in an unmodified buffer".to_string()));
                    }
                }
                self.termopens.push(TermOpen {
                    command,
                    cwd,
                    buffer,
                });
                Ok(json!(self.termopens.len()))
            }
            "expand" => {
                let expr = args.first().and_then(Value::as_str).unwrap_or_default();
                let name = self
                    .buffers
                    .get(&self.current_buffer())
                    .map(|b| b.name.clone())
                    .unwrap_or_default();
                if let Some(queued) = self.pop_result("expand") {
                    return Ok(queued);
                }
                Ok(match expr {
                    "%:p" | "%" => json!(name),
                    "%:p:h" => json!(Path::new(&name)
                        .parent()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default()),
                    _ => json!(""),
                })
            }
            "input" => Ok(self
                .pop_result("input")
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or(json!("")))),
            "confirm" => Ok(self.pop_result("confirm").unwrap_or(json!(2))),
            "getcwd" => Ok(self.pop_result("getcwd").unwrap_or(json!(""))),
            "writefile" => {
                let lines: Vec<String> = args
                    .first()
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                let path = args.get(1).and_then(Value::as_str).unwrap_or_default();
                let mut content = lines.join("\n");
                content.push('\n');
                std::fs::write(path, content).map_err(|e| remote(method, e.to_string()))?;
                Ok(json!(0))
            }
            other => Ok(self.pop_result(other).unwrap_or(Value::Null)),
        }
    }

    fn pop_result(&mut self, name: &str) -> Option<Value> {
        self.function_results.get_mut(name).and_then(VecDeque::pop_front)
    }
}

fn remote(method: &str, message: String) -> EditorError {
    EditorError::Remote {
        method: method.to_string(),
        message,
    }
}

fn str_arg(args: &[Value], i: usize, method: &str) -> EditorResult<String> {
    args.get(i)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| remote(method, format!("Wrong type for argument {}", i + 1)))
}

fn int_arg(args: &[Value], i: usize, method: &str) -> EditorResult<i64> {
    args.get(i)
        .and_then(Value::as_i64)
        .ok_or_else(|| remote(method, format!("Wrong type for argument {}", i + 1)))
}

/// Resolve an API line range with negative indices counted from the end.
fn range(lines: &[String], start: i64, end: i64) -> (usize, usize) {
    let len = lines.len() as i64;
    let fix = |i: i64| if i < 0 { len + 1 + i } else { i };
    let start = fix(start).clamp(0, len) as usize;
    let end = fix(end).clamp(0, len) as usize;
    (start, end.max(start))
}

fn split_lines(content: &str) -> Vec<String> {
    let content = content.strip_suffix('\n').unwrap_or(content);
    content.split('\n').map(str::to_string).collect()
}
