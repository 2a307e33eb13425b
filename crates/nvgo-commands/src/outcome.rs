//! Command arguments and results.

use nvgo_core::{parse, CoreError, CoreResult, Diagnostic, ParseOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Host expressions evaluated when a command is invoked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Eval {
    /// The editor's working directory.
    pub cwd: PathBuf,
    /// Absolute path of the current buffer, empty for unnamed buffers.
    pub file: PathBuf,
    /// The buffer an autocmd fired for; commands otherwise act on the
    /// current buffer.
    #[serde(skip)]
    pub bufnr: Option<i64>,
}

impl Eval {
    pub fn new(cwd: impl Into<PathBuf>, file: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            file: file.into(),
            bufnr: None,
        }
    }

    pub fn with_buffer(mut self, bufnr: i64) -> Self {
        self.bufnr = Some(bufnr);
        self
    }

    /// Directory of the current file, or the cwd when there is none.
    pub fn dir(&self) -> PathBuf {
        match self.file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => self.cwd.clone(),
        }
    }

    pub fn has_file(&self) -> bool {
        !self.file.as_os_str().is_empty()
    }

    /// The current file, failing when the buffer has no name.
    pub fn require_file(&self) -> CoreResult<&Path> {
        if self.has_file() {
            Ok(&self.file)
        } else {
            Err(CoreError::invalid_argument("current buffer has no file name"))
        }
    }
}

/// Parameters of a `command:<Name>` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CommandArgs {
    pub args: Vec<String>,
    pub bang: bool,
    pub range: Option<(i64, i64)>,
    pub eval: Eval,
    /// Set by the autocmd pipelines; never sent by the host.
    #[serde(skip)]
    pub autosave: bool,
}

impl CommandArgs {
    pub fn new(eval: Eval) -> Self {
        Self {
            eval,
            ..Self::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_bang(mut self, bang: bool) -> Self {
        self.bang = bang;
        self
    }

    pub fn with_range(mut self, start: i64, end: i64) -> Self {
        self.range = Some((start, end));
        self
    }

    pub fn for_autosave(eval: Eval) -> Self {
        Self {
            eval,
            autosave: true,
            ..Self::default()
        }
    }
}

/// Parameters of an `autocmd:<Event>` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AutocmdEval {
    pub bufnr: i64,
    pub winid: i64,
    pub cwd: PathBuf,
    pub file: PathBuf,
    pub dir: PathBuf,
}

impl AutocmdEval {
    pub fn command_eval(&self) -> Eval {
        let eval = Eval::new(self.cwd.clone(), self.file.clone());
        if self.bufnr > 0 {
            eval.with_buffer(self.bufnr)
        } else {
            eval
        }
    }

    /// Directory of the buffer the event fired for.
    pub fn directory(&self) -> PathBuf {
        if self.dir.as_os_str().is_empty() {
            self.command_eval().dir()
        } else {
            self.dir.clone()
        }
    }
}

/// What a finished command leaves behind. Failures travel as the `Err`
/// side of a `CoreResult<Outcome>`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success,
    Diagnostics(Vec<Diagnostic>),
}

impl Outcome {
    /// `Diagnostics` unless the list is empty.
    pub fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        if diagnostics.is_empty() {
            Outcome::Success
        } else {
            Outcome::Diagnostics(diagnostics)
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Outcome::Success => &[],
            Outcome::Diagnostics(d) => d,
        }
    }
}

/// Route a failed tool run through the parser: parsed diagnostics win
/// over the raw error.
pub fn diagnostics_or_error(err: CoreError, opts: &ParseOptions) -> CoreResult<Outcome> {
    let CoreError::NonZeroExit { stdout, stderr, .. } = &err else {
        return Err(err);
    };

    let mut diagnostics = parse(stderr, opts)?;
    if diagnostics.is_empty() {
        diagnostics = parse(stdout, opts)?;
    }

    if diagnostics.is_empty() {
        Err(err)
    } else {
        Ok(Outcome::Diagnostics(diagnostics))
    }
}
