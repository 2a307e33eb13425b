//! Typed facade over the host API.

use crate::batch::Batch;
use crate::client::EditorClient;
use crate::diff::minimal_replacement;
use crate::error::{EditorError, EditorResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Buffer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Buffer(pub i64);

/// Window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Window(pub i64);

/// Cursor position: 1-based row, 0-based byte column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub row: i64,
    pub col: i64,
}

/// Highlight groups used by echo helpers.
pub mod hl {
    pub const ERROR: &str = "ErrorMsg";
    pub const WARNING: &str = "WarningMsg";
    pub const IDENTIFIER: &str = "Identifier";
    pub const FUNCTION: &str = "Function";
}

/// Cheap, cloneable handle to the editor.
#[derive(Clone)]
pub struct Editor {
    client: Arc<dyn EditorClient>,
}

impl Editor {
    pub fn new(client: Arc<dyn EditorClient>) -> Self {
        Self { client }
    }

    /// The underlying client.
    pub fn client(&self) -> &Arc<dyn EditorClient> {
        &self.client
    }

    /// Start an atomic batch of calls.
    pub fn batch(&self) -> Batch {
        Batch::new(Arc::clone(&self.client))
    }

    /// Issue a raw call.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> EditorResult<Value> {
        self.client.call(method, args).await
    }

    /// Issue a call and decode its result.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> EditorResult<T> {
        let value = self.client.call(method, args).await?;
        serde_json::from_value(value).map_err(|e| EditorError::unexpected(method, e))
    }

    // ------------------------------------------------------------------
    // General
    // ------------------------------------------------------------------

    /// Execute an ex command.
    pub async fn command(&self, cmd: impl Into<String>) -> EditorResult<()> {
        self.client
            .call("nvim_command", vec![Value::String(cmd.into())])
            .await?;
        Ok(())
    }

    /// Call a vimscript function.
    pub async fn call_function(&self, name: &str, args: Vec<Value>) -> EditorResult<Value> {
        self.client
            .call("nvim_call_function", vec![json!(name), Value::Array(args)])
            .await
    }

    /// Read a global variable, `None` when it is not set.
    pub async fn get_var<T: DeserializeOwned>(&self, name: &str) -> EditorResult<Option<T>> {
        match self.client.call("nvim_get_var", vec![json!(name)]).await {
            Ok(Value::Null) => Ok(None),
            Ok(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| EditorError::unexpected(name, e)),
            Err(EditorError::Remote { message, .. }) if message.contains("Key not found") => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Expand a filename modifier expression such as `%:p`.
    pub async fn expand(&self, expr: &str) -> EditorResult<String> {
        let value = self.call_function("expand", vec![json!(expr)]).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| EditorError::unexpected("expand", value))
    }

    /// Prompt the user for a line of input.
    pub async fn input(&self, prompt: &str, default: &str) -> EditorResult<String> {
        let value = self
            .call_function("input", vec![json!(prompt), json!(default)])
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Ask a yes/no question; returns true when the first choice is picked.
    pub async fn confirm(&self, message: &str) -> EditorResult<bool> {
        let value = self
            .call_function("confirm", vec![json!(message), json!("&Yes\n&No"), json!(2)])
            .await?;
        Ok(value.as_i64() == Some(1))
    }

    // ------------------------------------------------------------------
    // Echo
    // ------------------------------------------------------------------

    /// Echo a plain message.
    pub async fn echo(&self, msg: impl Into<String>) -> EditorResult<()> {
        self.echo_chunks(vec![(msg.into(), None)], true).await
    }

    /// Echo a message in a highlight group.
    pub async fn echo_hl(&self, group: &str, msg: impl Into<String>) -> EditorResult<()> {
        self.echo_chunks(vec![(msg.into(), Some(group.to_string()))], true)
            .await
    }

    /// Echo an error message.
    pub async fn echo_err(&self, msg: impl Into<String>) -> EditorResult<()> {
        self.echo_hl(hl::ERROR, msg).await
    }

    /// Echo a transient progress message that is not kept in history.
    pub async fn echo_progress(&self, prefix: &str, msg: impl Into<String>) -> EditorResult<()> {
        self.echo_chunks(
            vec![
                (prefix.to_string(), Some(hl::IDENTIFIER.to_string())),
                (": ".to_string(), None),
                (msg.into(), None),
            ],
            false,
        )
        .await
    }

    async fn echo_chunks(
        &self,
        chunks: Vec<(String, Option<String>)>,
        history: bool,
    ) -> EditorResult<()> {
        let chunks: Vec<Value> = chunks
            .into_iter()
            .map(|(text, group)| match group {
                Some(group) => json!([text, group]),
                None => json!([text]),
            })
            .collect();
        self.client
            .call("nvim_echo", vec![Value::Array(chunks), json!(history), json!({})])
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Buffers
    // ------------------------------------------------------------------

    pub async fn current_buffer(&self) -> EditorResult<Buffer> {
        self.request("nvim_get_current_buf", vec![]).await
    }

    pub async fn buffer_is_valid(&self, buf: Buffer) -> EditorResult<bool> {
        self.request("nvim_buf_is_valid", vec![json!(buf)]).await
    }

    /// Read lines `[start, end)`; negative indices count from the end.
    pub async fn buffer_lines(&self, buf: Buffer, start: i64, end: i64) -> EditorResult<Vec<String>> {
        self.request(
            "nvim_buf_get_lines",
            vec![json!(buf), json!(start), json!(end), json!(false)],
        )
        .await
    }

    /// Replace lines `[start, end)`. With `strict`, out-of-range indices
    /// are an error instead of being clamped.
    pub async fn set_buffer_lines(
        &self,
        buf: Buffer,
        start: i64,
        end: i64,
        strict: bool,
        lines: Vec<String>,
    ) -> EditorResult<()> {
        self.client
            .call(
                "nvim_buf_set_lines",
                vec![json!(buf), json!(start), json!(end), json!(strict), json!(lines)],
            )
            .await?;
        Ok(())
    }

    /// Append lines after the last line.
    pub async fn append_lines(&self, buf: Buffer, lines: Vec<String>) -> EditorResult<()> {
        self.set_buffer_lines(buf, -1, -1, true, lines).await
    }

    /// Remove all lines.
    pub async fn truncate(&self, buf: Buffer) -> EditorResult<()> {
        self.set_buffer_lines(buf, 0, -1, true, Vec::new()).await
    }

    pub async fn line_count(&self, buf: Buffer) -> EditorResult<i64> {
        self.request("nvim_buf_line_count", vec![json!(buf)]).await
    }

    pub async fn current_line(&self) -> EditorResult<String> {
        self.request("nvim_get_current_line", vec![]).await
    }

    pub async fn buffer_name(&self, buf: Buffer) -> EditorResult<String> {
        self.request("nvim_buf_get_name", vec![json!(buf)]).await
    }

    pub async fn set_buffer_name(&self, buf: Buffer, name: &str) -> EditorResult<()> {
        self.client
            .call("nvim_buf_set_name", vec![json!(buf), json!(name)])
            .await?;
        Ok(())
    }

    pub async fn buffer_option<T: DeserializeOwned>(&self, buf: Buffer, name: &str) -> EditorResult<T> {
        self.request("nvim_buf_get_option", vec![json!(buf), json!(name)])
            .await
    }

    pub async fn set_buffer_option(&self, buf: Buffer, name: &str, value: Value) -> EditorResult<()> {
        self.client
            .call("nvim_buf_set_option", vec![json!(buf), json!(name), value])
            .await?;
        Ok(())
    }

    /// Replace the buffer content with `output`, touching only the lines
    /// that differ. Returns whether anything was written.
    pub async fn update_buffer(&self, buf: Buffer, output: &[String]) -> EditorResult<bool> {
        let input = self.buffer_lines(buf, 0, -1).await?;

        match minimal_replacement(&input, output) {
            None => Ok(false),
            Some(r) => {
                debug!(start = r.start, end = r.end, lines = r.lines.len(), "Updating buffer");
                self.set_buffer_lines(buf, r.start as i64, r.end as i64, true, r.lines)
                    .await?;
                Ok(true)
            }
        }
    }

    /// Write `buf` to its file without firing autocmds, even when another
    /// buffer has become current.
    pub async fn write_buffer(&self, buf: Buffer) -> EditorResult<()> {
        if self.current_buffer().await? == buf {
            return self.command("noautocmd write").await;
        }
        let name = self.buffer_name(buf).await?;
        let lines = self.buffer_lines(buf, 0, -1).await?;
        self.call_function("writefile", vec![json!(lines), json!(name)])
            .await?;
        self.set_buffer_option(buf, "modified", json!(false)).await
    }

    /// Byte offset of the cursor in `win` from the start of its buffer.
    pub async fn byte_offset(&self, win: Window) -> EditorResult<usize> {
        let cursor = self.window_cursor(win).await?;
        let col = cursor.col.max(0) as usize;
        if cursor.row <= 1 {
            return Ok(col);
        }

        let buf = self.window_buffer(win).await?;
        let lines = self.buffer_lines(buf, 0, cursor.row - 1).await?;
        Ok(byte_offset(&lines, col))
    }

    // ------------------------------------------------------------------
    // Highlights
    // ------------------------------------------------------------------

    pub async fn create_namespace(&self, name: &str) -> EditorResult<i64> {
        self.request("nvim_create_namespace", vec![json!(name)]).await
    }

    /// Highlight `[col_start, col_end)` of a 0-based line; `-1` ends at EOL.
    pub async fn add_highlight(
        &self,
        buf: Buffer,
        ns: i64,
        group: &str,
        line: i64,
        col_start: i64,
        col_end: i64,
    ) -> EditorResult<()> {
        self.client
            .call(
                "nvim_buf_add_highlight",
                vec![json!(buf), json!(ns), json!(group), json!(line), json!(col_start), json!(col_end)],
            )
            .await?;
        Ok(())
    }

    pub async fn clear_namespace(&self, buf: Buffer, ns: i64) -> EditorResult<()> {
        self.client
            .call("nvim_buf_clear_namespace", vec![json!(buf), json!(ns), json!(0), json!(-1)])
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Windows
    // ------------------------------------------------------------------

    pub async fn current_window(&self) -> EditorResult<Window> {
        self.request("nvim_get_current_win", vec![]).await
    }

    pub async fn set_current_window(&self, win: Window) -> EditorResult<()> {
        self.client
            .call("nvim_set_current_win", vec![json!(win)])
            .await?;
        Ok(())
    }

    pub async fn window_is_valid(&self, win: Window) -> EditorResult<bool> {
        self.request("nvim_win_is_valid", vec![json!(win)]).await
    }

    pub async fn window_buffer(&self, win: Window) -> EditorResult<Buffer> {
        self.request("nvim_win_get_buf", vec![json!(win)]).await
    }

    pub async fn window_cursor(&self, win: Window) -> EditorResult<Cursor> {
        let (row, col): (i64, i64) = self.request("nvim_win_get_cursor", vec![json!(win)]).await?;
        Ok(Cursor { row, col })
    }

    pub async fn set_window_cursor(&self, win: Window, cursor: Cursor) -> EditorResult<()> {
        self.client
            .call("nvim_win_set_cursor", vec![json!(win), json!([cursor.row, cursor.col])])
            .await?;
        Ok(())
    }

    pub async fn window_width(&self, win: Window) -> EditorResult<i64> {
        self.request("nvim_win_get_width", vec![json!(win)]).await
    }

    pub async fn window_height(&self, win: Window) -> EditorResult<i64> {
        self.request("nvim_win_get_height", vec![json!(win)]).await
    }

    pub async fn set_window_option(&self, win: Window, name: &str, value: Value) -> EditorResult<()> {
        self.client
            .call("nvim_win_set_option", vec![json!(win), json!(name), value])
            .await?;
        Ok(())
    }

    pub async fn close_window(&self, win: Window, force: bool) -> EditorResult<()> {
        self.client
            .call("nvim_win_close", vec![json!(win), json!(force)])
            .await?;
        Ok(())
    }
}

/// Offset of byte column `col` on the line following `lines`.
pub fn byte_offset<S: AsRef<str>>(lines: &[S], col: usize) -> usize {
    lines.iter().map(|l| l.as_ref().len() + 1).sum::<usize>() + col
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockEditorClient;

    #[test]
    fn test_byte_offset_counts_newlines() {
        let lines = ["package main", "", "import \"fmt\""];
        assert_eq!(byte_offset(&lines, 0), 13 + 1 + 13);
        assert_eq!(byte_offset(&lines, 4), 31);
        let none: [&str; 0] = [];
        assert_eq!(byte_offset(&none, 7), 7);
    }

    #[test]
    fn test_byte_offset_multibyte() {
        // "é" is two bytes.
        let lines = ["é"];
        assert_eq!(byte_offset(&lines, 1), 4);
    }

    #[tokio::test]
    async fn test_byte_offset_first_row_short_circuits() {
        let mut mock = MockEditorClient::new();
        mock.expect_call()
            .withf(|method, _| method == "nvim_win_get_cursor")
            .times(1)
            .returning(|_, _| Ok(json!([1, 9])));

        let editor = Editor::new(Arc::new(mock));
        assert_eq!(editor.byte_offset(Window(1000)).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_byte_offset_reads_previous_lines() {
        let mut mock = MockEditorClient::new();
        mock.expect_call()
            .withf(|method, _| method == "nvim_win_get_cursor")
            .returning(|_, _| Ok(json!([3, 2])));
        mock.expect_call()
            .withf(|method, _| method == "nvim_win_get_buf")
            .returning(|_, _| Ok(json!(1)));
        mock.expect_call()
            .withf(|method, args| method == "nvim_buf_get_lines" && args[2] == json!(2))
            .returning(|_, _| Ok(json!(["ab", "cde"])));

        let editor = Editor::new(Arc::new(mock));
        assert_eq!(editor.byte_offset(Window(1000)).await.unwrap(), 3 + 4 + 2);
    }

    #[tokio::test]
    async fn test_update_buffer_writes_only_changed_range() {
        let mut mock = MockEditorClient::new();
        mock.expect_call()
            .withf(|method, _| method == "nvim_buf_get_lines")
            .returning(|_, _| Ok(json!(["a", "b", "c"])));
        mock.expect_call()
            .withf(|method, args| {
                method == "nvim_buf_set_lines"
                    && args[1] == json!(1)
                    && args[2] == json!(2)
                    && args[4] == json!(["B"])
            })
            .times(1)
            .returning(|_, _| Ok(Value::Null));

        let editor = Editor::new(Arc::new(mock));
        let output: Vec<String> = vec!["a".into(), "B".into(), "c".into()];
        assert!(editor.update_buffer(Buffer(1), &output).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_buffer_identical_is_noop() {
        let mut mock = MockEditorClient::new();
        mock.expect_call()
            .withf(|method, _| method == "nvim_buf_get_lines")
            .returning(|_, _| Ok(json!(["a"])));
        mock.expect_call()
            .withf(|method, _| method == "nvim_buf_set_lines")
            .never();

        let editor = Editor::new(Arc::new(mock));
        assert!(!editor.update_buffer(Buffer(1), &["a".to_string()]).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_var_missing_is_none() {
        let mut mock = MockEditorClient::new();
        mock.expect_call().returning(|method, _| {
            Err(EditorError::Remote {
                method: method.to_string(),
                message: "Key not found: go#build#autosave".to_string(),
            })
        });

        let editor = Editor::new(Arc::new(mock));
        let value: Option<bool> = editor.get_var("go#build#autosave").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_echo_progress_is_not_kept_in_history() {
        let mut mock = MockEditorClient::new();
        mock.expect_call()
            .withf(|method, args| method == "nvim_echo" && args[1] == json!(false))
            .times(1)
            .returning(|_, _| Ok(Value::Null));

        let editor = Editor::new(Arc::new(mock));
        editor.echo_progress("GoBuild", "building").await.unwrap();
    }
}
