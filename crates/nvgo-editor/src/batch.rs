//! Atomic batches of editor calls.

use crate::client::EditorClient;
use crate::editor::{Buffer, Window};
use crate::error::{EditorError, EditorResult};
use serde_json::{json, Value};
use std::sync::Arc;

/// Queue of calls flushed in one `nvim_call_atomic` request.
///
/// Nothing is sent until [`Batch::flush`]. Build the batch, flush it, drop
/// it; do not keep one alive across unrelated awaits.
pub struct Batch {
    client: Arc<dyn EditorClient>,
    calls: Vec<(String, Vec<Value>)>,
}

impl Batch {
    pub(crate) fn new(client: Arc<dyn EditorClient>) -> Self {
        Self {
            client,
            calls: Vec::new(),
        }
    }

    /// Queue a raw call.
    pub fn call(&mut self, method: &str, args: Vec<Value>) -> &mut Self {
        self.calls.push((method.to_string(), args));
        self
    }

    pub fn command(&mut self, cmd: impl Into<String>) -> &mut Self {
        self.call("nvim_command", vec![Value::String(cmd.into())])
    }

    pub fn call_function(&mut self, name: &str, args: Vec<Value>) -> &mut Self {
        self.call("nvim_call_function", vec![json!(name), Value::Array(args)])
    }

    pub fn set_buffer_lines(
        &mut self,
        buf: Buffer,
        start: i64,
        end: i64,
        strict: bool,
        lines: Vec<String>,
    ) -> &mut Self {
        self.call(
            "nvim_buf_set_lines",
            vec![json!(buf), json!(start), json!(end), json!(strict), json!(lines)],
        )
    }

    pub fn set_buffer_option(&mut self, buf: Buffer, name: &str, value: Value) -> &mut Self {
        self.call("nvim_buf_set_option", vec![json!(buf), json!(name), value])
    }

    pub fn set_buffer_name(&mut self, buf: Buffer, name: &str) -> &mut Self {
        self.call("nvim_buf_set_name", vec![json!(buf), json!(name)])
    }

    pub fn set_window_option(&mut self, win: Window, name: &str, value: Value) -> &mut Self {
        self.call("nvim_win_set_option", vec![json!(win), json!(name), value])
    }

    pub fn set_window_cursor(&mut self, win: Window, row: i64, col: i64) -> &mut Self {
        self.call("nvim_win_set_cursor", vec![json!(win), json!([row, col])])
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Send every queued call. Returns the per-call results, or the first
    /// failure reported by the editor.
    pub async fn flush(&mut self) -> EditorResult<Vec<Value>> {
        if self.calls.is_empty() {
            return Ok(Vec::new());
        }

        let calls: Vec<Value> = std::mem::take(&mut self.calls)
            .into_iter()
            .map(|(method, args)| json!([method, args]))
            .collect();

        let value = self
            .client
            .call("nvim_call_atomic", vec![Value::Array(calls)])
            .await?;

        let (results, error): (Vec<Value>, Value) = serde_json::from_value(value)
            .map_err(|e| EditorError::unexpected("nvim_call_atomic", e))?;

        // error is [index, kind, message] when a call failed.
        match error {
            Value::Null => Ok(results),
            Value::Array(parts) => Err(EditorError::Batch {
                index: parts.first().and_then(Value::as_u64).unwrap_or_default() as usize,
                message: parts
                    .get(2)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            other => Err(EditorError::unexpected("nvim_call_atomic", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockEditorClient;

    #[tokio::test]
    async fn test_flush_sends_single_atomic_call() {
        let mut mock = MockEditorClient::new();
        mock.expect_call()
            .withf(|method, args| {
                method == "nvim_call_atomic"
                    && args[0].as_array().map(Vec::len) == Some(2)
                    && args[0][0][0] == json!("nvim_command")
            })
            .times(1)
            .returning(|_, _| Ok(json!([[null, null], null])));

        let mut batch = Batch::new(Arc::new(mock));
        batch
            .command("setlocal nomodifiable")
            .set_buffer_option(Buffer(3), "buflisted", json!(false));
        assert_eq!(batch.len(), 2);

        let results = batch.flush().await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_flush_returns_first_error() {
        let mut mock = MockEditorClient::new();
        mock.expect_call()
            .returning(|_, _| Ok(json!([[null], [1, 0, "Invalid window id"]])));

        let mut batch = Batch::new(Arc::new(mock));
        batch.command("a").command("b");
        let err = batch.flush().await.unwrap_err();
        assert!(matches!(err, EditorError::Batch { index: 1, ref message } if message == "Invalid window id"));
    }

    #[tokio::test]
    async fn test_empty_flush_sends_nothing() {
        let mut mock = MockEditorClient::new();
        mock.expect_call().never();

        let mut batch = Batch::new(Arc::new(mock));
        assert!(batch.flush().await.unwrap().is_empty());
    }
}
