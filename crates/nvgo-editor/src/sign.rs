//! Signs placed in the editor's sign column.

use crate::editor::Editor;
use crate::error::EditorResult;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// A sign definition plus the most recent placement made through it.
pub struct Sign {
    editor: Editor,
    name: String,
    glyph: String,
    text_hl: String,
    line_hl: Option<String>,
    last: Mutex<Option<(i64, PathBuf)>>,
}

impl Sign {
    pub fn new(
        editor: Editor,
        name: impl Into<String>,
        glyph: impl Into<String>,
        text_hl: impl Into<String>,
        line_hl: Option<String>,
    ) -> Self {
        Self {
            editor,
            name: name.into(),
            glyph: glyph.into(),
            text_hl: text_hl.into(),
            line_hl,
            last: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock_last(&self) -> MutexGuard<'_, Option<(i64, PathBuf)>> {
        self.last.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ex command defining this sign.
    pub fn define_command(&self) -> String {
        let mut cmd = format!(
            "sign define {} text={} texthl={}",
            self.name, self.glyph, self.text_hl
        );
        if let Some(line_hl) = &self.line_hl {
            cmd.push_str(&format!(" linehl={line_hl}"));
        }
        cmd
    }

    pub async fn define(&self) -> EditorResult<()> {
        self.editor.command(self.define_command()).await
    }

    /// Place the sign with `id` at `line` of `file`. With `clear_previous`
    /// the last placement made through this sign is removed first.
    pub async fn place(
        &self,
        id: i64,
        line: i64,
        file: &Path,
        clear_previous: bool,
    ) -> EditorResult<()> {
        let previous = self.lock_last().take();

        let mut batch = self.editor.batch();
        if clear_previous {
            if let Some((prev_id, prev_file)) = previous {
                batch.command(unplace_command(prev_id, &prev_file));
            }
        }
        batch.command(format!(
            "sign place {id} line={line} name={} file={}",
            self.name,
            file.display()
        ));
        batch.flush().await?;

        *self.lock_last() = Some((id, file.to_path_buf()));
        Ok(())
    }

    /// Remove the placement `id` from `file`.
    pub async fn unplace(&self, id: i64, file: &Path) -> EditorResult<()> {
        {
            let mut last = self.lock_last();
            if matches!(&*last, Some((last_id, _)) if *last_id == id) {
                *last = None;
            }
        }
        self.editor.command(unplace_command(id, file)).await
    }

    /// Remove every sign from `file`. Safe to call repeatedly.
    pub async fn unplace_all(&self, file: &Path) -> EditorResult<()> {
        *self.lock_last() = None;
        self.editor
            .command(format!("sign unplace * file={}", file.display()))
            .await
    }

    /// The last placement, if any.
    pub fn last_placement(&self) -> Option<(i64, PathBuf)> {
        self.lock_last().clone()
    }
}

fn unplace_command(id: i64, file: &Path) -> String {
    format!("sign unplace {id} file={}", file.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockEditorClient;
    use serde_json::json;
    use std::sync::Arc;

    fn sign(mock: MockEditorClient) -> Sign {
        Sign::new(
            Editor::new(Arc::new(mock)),
            "GoDebugPC",
            "->",
            "String",
            Some("CursorLine".to_string()),
        )
    }

    #[test]
    fn test_define_command() {
        let s = sign(MockEditorClient::new());
        assert_eq!(
            s.define_command(),
            "sign define GoDebugPC text=-> texthl=String linehl=CursorLine"
        );
    }

    #[tokio::test]
    async fn test_place_clears_previous() {
        let mut mock = MockEditorClient::new();
        mock.expect_call()
            .withf(|_, args| args[0].as_array().map(Vec::len) == Some(1))
            .times(1)
            .returning(|_, _| Ok(json!([[null], null])));
        mock.expect_call()
            .withf(|_, args| {
                args[0].as_array().map(Vec::len) == Some(2)
                    && args[0][0] == json!(["nvim_command", ["sign unplace 1 file=/p/a.go"]])
            })
            .times(1)
            .returning(|_, _| Ok(json!([[null, null], null])));

        let s = sign(mock);
        s.place(1, 10, Path::new("/p/a.go"), true).await.unwrap();
        s.place(1, 11, Path::new("/p/a.go"), true).await.unwrap();
        assert_eq!(s.last_placement(), Some((1, PathBuf::from("/p/a.go"))));
    }

    #[tokio::test]
    async fn test_unplace_all_forgets_last() {
        let mut mock = MockEditorClient::new();
        mock.expect_call().returning(|_, _| Ok(json!([[null], null])));

        let s = sign(mock);
        s.place(4, 2, Path::new("/p/b.go"), false).await.unwrap();
        s.unplace_all(Path::new("/p/b.go")).await.unwrap();
        s.unplace_all(Path::new("/p/b.go")).await.unwrap();
        assert!(s.last_placement().is_none());
    }
}
