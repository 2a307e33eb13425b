//! Location list and quickfix list.

use crate::editor::Editor;
use crate::error::EditorResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;

/// Which list backs the error list for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrlistKind {
    /// Window-local list.
    #[default]
    #[serde(alias = "location")]
    LocationList,
    /// Global list.
    Quickfix,
}

impl FromStr for ErrlistKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "locationlist" | "location" | "loclist" => Ok(Self::LocationList),
            "quickfix" | "qf" => Ok(Self::Quickfix),
            other => Err(format!("unknown error list type: {other}")),
        }
    }
}

/// How `set` combines new items with the current list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListAction {
    Replace,
    Append,
}

impl ListAction {
    fn as_flag(self) -> &'static str {
        match self {
            ListAction::Replace => "r",
            ListAction::Append => "a",
        }
    }
}

/// One entry as the editor stores it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrlistItem {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub lnum: i64,
    #[serde(default)]
    pub col: i64,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// The session's error list.
#[derive(Clone)]
pub struct ErrorList {
    editor: Editor,
    kind: ErrlistKind,
}

impl ErrorList {
    pub fn new(editor: Editor, kind: ErrlistKind) -> Self {
        Self { editor, kind }
    }

    pub fn kind(&self) -> ErrlistKind {
        self.kind
    }

    /// Replace or extend the list.
    pub async fn set(&self, items: &[ErrlistItem], action: ListAction) -> EditorResult<()> {
        let items = json!(items);
        let flag = json!(action.as_flag());
        match self.kind {
            ErrlistKind::LocationList => {
                self.editor
                    .call_function("setloclist", vec![json!(0), items, flag])
                    .await?
            }
            ErrlistKind::Quickfix => {
                self.editor
                    .call_function("setqflist", vec![items, flag])
                    .await?
            }
        };
        Ok(())
    }

    /// Current entries.
    pub async fn items(&self) -> EditorResult<Vec<ErrlistItem>> {
        let value = match self.kind {
            ErrlistKind::LocationList => self.editor.call_function("getloclist", vec![json!(0)]).await?,
            ErrlistKind::Quickfix => self.editor.call_function("getqflist", vec![]).await?,
        };
        Ok(match value {
            Value::Array(entries) => entries
                .into_iter()
                .filter_map(|e| serde_json::from_value(e).ok())
                .collect(),
            _ => Vec::new(),
        })
    }

    /// Open the list window. With `keep_cursor` focus returns to the
    /// previous window.
    pub async fn open(&self, keep_cursor: bool) -> EditorResult<()> {
        let cmd = match self.kind {
            ErrlistKind::LocationList => "lopen",
            ErrlistKind::Quickfix => "copen",
        };
        if keep_cursor {
            let mut batch = self.editor.batch();
            batch.command(cmd).command("wincmd p");
            batch.flush().await?;
            Ok(())
        } else {
            self.editor.command(cmd).await
        }
    }

    pub async fn close(&self) -> EditorResult<()> {
        let cmd = match self.kind {
            ErrlistKind::LocationList => "lclose",
            ErrlistKind::Quickfix => "cclose",
        };
        self.editor.command(cmd).await
    }

    pub async fn clear(&self) -> EditorResult<()> {
        self.set(&[], ListAction::Replace).await
    }
}
