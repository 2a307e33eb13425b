//! Turn compiler and linter output into diagnostics.
//!
//! Recognised lines look like
//!
//! ```text
//! # example.com/pkg
//! file.go:12:5: message
//! file.go:12: message
//! ```
//!
//! A `# <package>` header is sticky: relative files on the following lines
//! are taken to live in that package.

use crate::context::{ContextState, Tool};
use crate::diagnostic::{Diagnostic, Severity};
use crate::error::{CoreError, CoreResult};
use nvgo_util::path::{is_within, normalize, shortest};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::trace;

static LINE_REGEX: OnceLock<Regex> = OnceLock::new();

fn line_regex() -> &'static Regex {
    LINE_REGEX.get_or_init(|| {
        Regex::new(
            r"(?m)^(?:# (?P<pkg>\S+)|[ \t]*(?P<file>[^\s:]+):(?P<line>[^:\s]+)(?::(?P<col>[^:\s]+))?:? (?P<msg>.*))$",
        )
        .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// Everything the parser needs to know about where output came from.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Directory the editor reports paths against.
    pub cwd: PathBuf,
    pub tool: Tool,
    /// Project root; ProjectStyle files resolve under `<root>/src`.
    pub project_root: PathBuf,
    /// GOPATH root; import paths resolve under `<root>/src`.
    pub language_root: Option<PathBuf>,
    /// Paths are shortened against this directory instead of `cwd`.
    pub display_root: Option<PathBuf>,
    /// Diagnostics whose path contains any of these are dropped.
    pub ignore: Vec<String>,
    pub severity: Severity,
}

impl ParseOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            ..Self::default()
        }
    }

    /// Options for output of a tool run in `state`'s project.
    pub fn for_context(cwd: impl Into<PathBuf>, state: &ContextState, language_root: Option<&Path>) -> Self {
        Self {
            cwd: cwd.into(),
            tool: state.tool,
            project_root: state.project_root.clone(),
            language_root: language_root.map(Path::to_path_buf),
            ..Self::default()
        }
    }

    /// Options from a tool name as found in configuration.
    pub fn for_tool_name(cwd: impl Into<PathBuf>, tool: &str) -> CoreResult<Self> {
        Ok(Self::new(cwd).with_tool(tool.parse()?))
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tool = tool;
        self
    }

    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    pub fn with_language_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.language_root = Some(root.into());
        self
    }

    /// The tool ran in `cwd` but the editor reports paths against `root`.
    pub fn with_display_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.display_root = Some(root.into());
        self
    }

    pub fn with_ignore(mut self, ignore: Vec<String>) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// `<language_root>/src` when `cwd` lies inside it.
    fn import_root(&self) -> Option<PathBuf> {
        let src = self.language_root.as_ref()?.join("src");
        is_within(&self.cwd, &src).then_some(src)
    }

    fn absolute(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            return normalize(file);
        }

        match self.tool {
            Tool::ProjectStyle => normalize(&self.project_root.join("src").join(file)),
            Tool::Modular => {
                let has_dir = file.parent().is_some_and(|p| !p.as_os_str().is_empty());
                let explicit_relative = file.starts_with(".") || file.starts_with("..");

                match self.import_root() {
                    Some(src) if has_dir && !explicit_relative => {
                        // An import-path-relative name: <pkg>/<file>.
                        normalize(&src.join(file))
                    }
                    _ => normalize(&self.cwd.join(file)),
                }
            }
        }
    }
}

/// Parse tool output into diagnostics.
///
/// Lines that do not look like diagnostics are skipped. A line number that
/// is not an integer fails the whole parse.
pub fn parse(output: &str, opts: &ParseOptions) -> CoreResult<Vec<Diagnostic>> {
    let mut package: Option<&str> = None;
    let mut diagnostics = Vec::new();

    for caps in line_regex().captures_iter(output) {
        if let Some(pkg) = caps.name("pkg") {
            package = Some(pkg.as_str());
            continue;
        }

        let (Some(file), Some(line), Some(msg)) = (caps.name("file"), caps.name("line"), caps.name("msg"))
        else {
            continue;
        };

        let line_no: u32 = line.as_str().parse().map_err(|_| {
            CoreError::malformed(
                caps.get(0).map(|m| m.as_str()).unwrap_or_default(),
                format!("invalid line number {:?}", line.as_str()),
            )
        })?;
        let column: u32 = caps
            .name("col")
            .and_then(|c| c.as_str().parse().ok())
            .unwrap_or(0);

        let mut file = PathBuf::from(file.as_str());
        if let Some(pkg) = package {
            if !file.is_absolute() && is_package_scoped(opts) {
                if let Some(base) = file.file_name() {
                    file = Path::new(pkg).join(base);
                }
            }
        }

        let base = opts.display_root.as_deref().unwrap_or(&opts.cwd);
        let path = shortest(&opts.absolute(&file), base);
        let shown = path.to_string_lossy();
        if opts.ignore.iter().any(|ig| !ig.is_empty() && shown.contains(ig.as_str())) {
            trace!(file = %shown, "Ignoring diagnostic");
            continue;
        }

        if let Some(d) = Diagnostic::new(path, line_no, column, msg.as_str(), opts.severity) {
            diagnostics.push(d);
        }
    }

    Ok(diagnostics)
}

/// Package headers name import paths only under GOPATH or a ProjectStyle
/// tree; in module mode files are already relative to the cwd.
fn is_package_scoped(opts: &ParseOptions) -> bool {
    match opts.tool {
        Tool::ProjectStyle => true,
        Tool::Modular => opts.import_root().is_some(),
    }
}
