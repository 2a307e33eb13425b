//! Terminal buffers running a child command inside the editor.

use crate::editor::{Buffer, Editor, Window};
use crate::error::EditorResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, warn};

/// How the terminal window is split off the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    #[serde(rename = "split")]
    HSplit,
    #[default]
    #[serde(rename = "vsplit")]
    VSplit,
}

/// Placement of a terminal window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalLayout {
    pub split: SplitMode,
    /// Modifier such as `botright` or `topleft`.
    pub position: String,
    /// Rows (hsplit) or columns (vsplit); 0 derives it from the window.
    pub size: i64,
    /// Leave insert mode after opening.
    pub stop_insert: bool,
}

impl Default for TerminalLayout {
    fn default() -> Self {
        Self {
            split: SplitMode::VSplit,
            position: "botright".to_string(),
            size: 0,
            stop_insert: true,
        }
    }
}

impl TerminalLayout {
    /// Ex command that opens an empty split of the configured size.
    pub fn open_command(&self, width: i64, height: i64) -> String {
        let size = match (self.size, self.split) {
            (n, _) if n > 0 => n,
            (_, SplitMode::HSplit) => (height / 3).max(1),
            (_, SplitMode::VSplit) => (width / 2).max(1),
        };
        let new = match self.split {
            SplitMode::HSplit => "new",
            SplitMode::VSplit => "vnew",
        };
        format!("{} {}{}", self.position, size, new).trim().to_string()
    }
}

/// Buffer options applied to every terminal buffer.
pub const TERMINAL_BUFFER_OPTIONS: &[(&str, &str)] = &[
    ("bufhidden", "delete"),
    ("buflisted", "false"),
    ("buftype", "nofile"),
    ("filetype", "terminal"),
    ("modifiable", "false"),
    ("swapfile", "false"),
];

/// Window options applied to every terminal window.
pub const TERMINAL_WINDOW_OPTIONS: &[(&str, &str)] = &[
    ("list", "false"),
    ("number", "false"),
    ("relativenumber", "false"),
    ("winfixheight", "true"),
];

fn option_value(raw: &str) -> Value {
    match raw {
        "true" => json!(true),
        "false" => json!(false),
        other => json!(other),
    }
}

/// A named terminal reused across runs.
///
/// The first run opens a split; later runs respawn the command in the
/// same window while it is still open.
pub struct Terminal {
    editor: Editor,
    name: String,
    layout: TerminalLayout,
    buffer: Option<Buffer>,
    window: Option<Window>,
}

impl Terminal {
    pub fn new(editor: Editor, name: impl Into<String>, layout: TerminalLayout) -> Self {
        Self {
            editor,
            name: name.into(),
            layout,
            buffer: None,
            window: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buffer(&self) -> Option<Buffer> {
        self.buffer
    }

    pub fn window(&self) -> Option<Window> {
        self.window
    }

    pub fn set_layout(&mut self, layout: TerminalLayout) {
        self.layout = layout;
    }

    async fn live_window(&self) -> EditorResult<Option<Window>> {
        match self.window {
            Some(win) if self.editor.window_is_valid(win).await? => Ok(Some(win)),
            _ => Ok(None),
        }
    }

    /// Spawn `cmd` in the terminal with working directory `cwd`.
    pub async fn run(&mut self, cmd: &[String], cwd: &Path) -> EditorResult<()> {
        let origin = self.editor.current_window().await?;

        match self.live_window().await? {
            Some(win) => {
                debug!(terminal = %self.name, "Reusing terminal window");
                self.editor.set_current_window(win).await?;
                if let Some(buf) = self.buffer {
                    // termopen refuses a modified or read-only buffer.
                    let mut batch = self.editor.batch();
                    batch
                        .set_buffer_option(buf, "modifiable", json!(true))
                        .set_buffer_option(buf, "modified", json!(false))
                        .command("enew");
                    batch.flush().await?;
                }
            }
            None => {
                let width = self.editor.window_width(origin).await?;
                let height = self.editor.window_height(origin).await?;
                self.editor
                    .command(self.layout.open_command(width, height))
                    .await?;
            }
        }

        let win = self.editor.current_window().await?;
        let buf = self.editor.current_buffer().await?;

        self.editor
            .call_function(
                "termopen",
                vec![json!(cmd), json!({ "cwd": cwd.to_string_lossy() })],
            )
            .await?;

        if let Err(e) = self.editor.set_buffer_name(buf, &self.name).await {
            // The previous terminal buffer may still hold the name until it is wiped.
            warn!(terminal = %self.name, error = %e, "Could not rename terminal buffer");
        }

        let mut batch = self.editor.batch();
        for (name, value) in TERMINAL_BUFFER_OPTIONS {
            batch.set_buffer_option(buf, name, option_value(value));
        }
        for (name, value) in TERMINAL_WINDOW_OPTIONS {
            batch.set_window_option(win, name, option_value(value));
        }
        batch.flush().await?;

        self.buffer = Some(buf);
        self.window = Some(win);
        self.follow().await?;

        if self.layout.stop_insert {
            self.editor.command("stopinsert").await?;
        }

        self.editor.set_current_window(origin).await
    }

    /// Move the terminal cursor to the last line.
    pub async fn follow(&self) -> EditorResult<()> {
        if let (Some(buf), Some(win)) = (self.buffer, self.window) {
            let last = self.editor.line_count(buf).await?;
            self.editor
                .set_window_cursor(win, crate::Cursor { row: last, col: 0 })
                .await?;
        }
        Ok(())
    }

    /// Close the terminal window if it is open.
    pub async fn close(&mut self) -> EditorResult<()> {
        if let Some(win) = self.live_window().await? {
            self.editor.close_window(win, true).await?;
        }
        self.window = None;
        self.buffer = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_command_derives_size() {
        let layout = TerminalLayout::default();
        assert_eq!(layout.open_command(120, 40), "botright 60vnew");

        let layout = TerminalLayout {
            split: SplitMode::HSplit,
            ..TerminalLayout::default()
        };
        assert_eq!(layout.open_command(120, 40), "botright 13new");
    }

    #[test]
    fn test_open_command_explicit_size() {
        let layout = TerminalLayout {
            split: SplitMode::HSplit,
            position: "topleft".to_string(),
            size: 8,
            stop_insert: false,
        };
        assert_eq!(layout.open_command(120, 40), "topleft 8new");
    }

    #[test]
    fn test_split_mode_serde() {
        assert_eq!(serde_json::to_value(SplitMode::HSplit).unwrap(), json!("split"));
        let mode: SplitMode = serde_json::from_value(json!("vsplit")).unwrap();
        assert_eq!(mode, SplitMode::VSplit);
    }

    #[test]
    fn test_terminal_options_cover_protocol() {
        let names: Vec<&str> = TERMINAL_BUFFER_OPTIONS.iter().map(|(n, _)| *n).collect();
        assert!(names.contains(&"bufhidden"));
        assert!(names.contains(&"modifiable"));
        assert_eq!(option_value("false"), json!(false));
        assert_eq!(option_value("nofile"), json!("nofile"));
    }
}
