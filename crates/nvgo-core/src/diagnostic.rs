//! Normalized diagnostic model.

use nvgo_editor::ErrlistItem;
use nvgo_util::path::normalize;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
    Info,
}

impl Severity {
    /// Single-character form used by the editor's lists.
    pub fn as_char(&self) -> char {
        match self {
            Severity::Error => 'E',
            Severity::Warning => 'W',
            Severity::Info => 'I',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'E' => Some(Severity::Error),
            'W' => Some(Severity::Warning),
            'I' => Some(Severity::Info),
            _ => None,
        }
    }
}

/// One reported issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Relative to the cwd the diagnostic was produced for, or absolute.
    pub file: PathBuf,
    /// 1-based.
    pub line: u32,
    /// 0 when the tool reported no column.
    pub column: u32,
    pub text: String,
    pub severity: Severity,
}

impl Diagnostic {
    /// Build a diagnostic; `None` if the text is blank or the line is 0.
    pub fn new(
        file: impl Into<PathBuf>,
        line: u32,
        column: u32,
        text: &str,
        severity: Severity,
    ) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() || line == 0 {
            return None;
        }
        Some(Self {
            file: file.into(),
            line,
            column,
            text: text.to_string(),
            severity,
        })
    }

    /// Shorthand for an error-severity diagnostic.
    pub fn error(file: impl Into<PathBuf>, line: u32, column: u32, text: &str) -> Option<Self> {
        Self::new(file, line, column, text, Severity::Error)
    }

    /// Absolute path of the file given the cwd it was produced for.
    pub fn resolve(&self, cwd: &Path) -> PathBuf {
        if self.file.is_absolute() {
            normalize(&self.file)
        } else {
            normalize(&cwd.join(&self.file))
        }
    }

    /// Entry for the editor's error list.
    pub fn to_errlist_item(&self) -> ErrlistItem {
        ErrlistItem {
            filename: self.file.to_string_lossy().into_owned(),
            lnum: i64::from(self.line),
            col: i64::from(self.column),
            text: self.text.clone(),
            kind: self.severity.as_char().to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)?;
        if self.column > 0 {
            write!(f, ":{}", self.column)?;
        }
        write!(f, ": {}", self.text)
    }
}

/// Diagnostics produced by one named producer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiagnosticSet {
    pub producer: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSet {
    pub fn new(producer: impl Into<String>, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            producer: producer.into(),
            diagnostics,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}
