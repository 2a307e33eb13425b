//! Build context: which build tool drives a directory and where its
//! project root is.
//!
//! Two layouts are recognised:
//! - **Modular** (`go`): the root is the nearest package directory or
//!   repository root above the buffer.
//! - **ProjectStyle** (`gb`): a self-contained tree `<root>/src/...` with an
//!   optional `<root>/vendor`, outside every GOPATH entry.

use crate::error::{CoreError, CoreResult};
use nvgo_editor::{Buffer, Window};
use nvgo_util::path::{is_within, normalize, VCS_MARKERS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Compiler driver for a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    #[serde(rename = "go")]
    Modular,
    #[serde(rename = "gb")]
    ProjectStyle,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Modular => "go",
            Tool::ProjectStyle => "gb",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tool {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "go" | "modular" => Ok(Tool::Modular),
            "gb" | "projectstyle" => Ok(Tool::ProjectStyle),
            other => Err(CoreError::UnknownTool(other.to_string())),
        }
    }
}

/// Language installation facts the resolver needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    /// GOPATH entries, in order.
    pub go_path: Vec<PathBuf>,
    /// GOROOT; ascent never goes above it.
    pub go_root: Option<PathBuf>,
    /// Ascent never goes above this directory either.
    pub workspace_root: Option<PathBuf>,
    /// Never pick ProjectStyle.
    pub force_modular: bool,
}

impl Environment {
    /// Read GOPATH and GOROOT from the process environment.
    ///
    /// An unset GOPATH means `$HOME/go`, as for the go command.
    pub fn from_process() -> Self {
        let go_path = match std::env::var_os("GOPATH") {
            Some(v) if !v.is_empty() => std::env::split_paths(&v).collect(),
            _ => std::env::var_os("HOME")
                .map(|home| vec![PathBuf::from(home).join("go")])
                .unwrap_or_default(),
        };
        let go_root = std::env::var_os("GOROOT").map(PathBuf::from);
        Self {
            go_path,
            go_root,
            workspace_root: None,
            force_modular: false,
        }
    }

    /// The first GOPATH entry, where import paths resolve under `src/`.
    pub fn language_root(&self) -> Option<&Path> {
        self.go_path.first().map(PathBuf::as_path)
    }

    fn is_go_path_entry(&self, dir: &Path) -> bool {
        self.go_path.iter().any(|p| normalize(p) == dir)
    }

    fn is_stop(&self, dir: &Path) -> bool {
        let stop = |root: &Option<PathBuf>| root.as_ref().is_some_and(|r| normalize(r) == dir);
        stop(&self.go_root) || stop(&self.workspace_root)
    }
}

/// Outcome of resolving a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub tool: Tool,
    pub project_root: PathBuf,
    /// GOPATH value tools must run with, if it differs from the process one.
    pub language_path: Option<String>,
}

/// Work out the tool and project root for `dir`.
pub fn resolve(dir: &Path, env: &Environment) -> CoreResult<Resolution> {
    let dir = normalize(dir);

    if !env.force_modular {
        if let Some(root) = find_project_style_root(&dir, env) {
            let language_path = std::env::join_paths([root.clone(), root.join("vendor")])
                .ok()
                .map(|p| p.to_string_lossy().into_owned());
            return Ok(Resolution {
                tool: Tool::ProjectStyle,
                project_root: root,
                language_path,
            });
        }
    }

    let project_root = find_package_root(&dir, env)?;
    Ok(Resolution {
        tool: Tool::Modular,
        project_root,
        language_path: None,
    })
}

/// The ancestor `A` with `dir` under `A/src`, unless `A` is a GOPATH entry
/// or a `go.mod` sits between `dir` and `A`.
fn find_project_style_root(dir: &Path, env: &Environment) -> Option<PathBuf> {
    let mut current = dir.to_path_buf();

    loop {
        if current.join("go.mod").is_file() {
            return None;
        }

        if current.file_name().is_some_and(|n| n == "src") {
            let root = current.parent()?.to_path_buf();
            if !env.is_go_path_entry(&root) && !root.join("go.mod").is_file() {
                return Some(root);
            }
            return None;
        }

        if env.is_stop(&current) || !current.pop() {
            return None;
        }
    }
}

/// Nearest directory holding Go files of one package, or a repository root.
fn find_package_root(dir: &Path, env: &Environment) -> CoreResult<PathBuf> {
    let mut current = dir.to_path_buf();

    loop {
        if env.is_stop(&current) {
            break;
        }

        if package_of_dir(&current).is_some() || has_vcs_marker(&current) {
            return Ok(current);
        }

        if !current.pop() {
            break;
        }
    }

    Err(CoreError::NoPackage {
        dir: dir.display().to_string(),
    })
}

fn has_vcs_marker(dir: &Path) -> bool {
    VCS_MARKERS.iter().any(|m| dir.join(m).exists())
}

/// Package name shared by every `.go` file in `dir`, if consistent.
///
/// External test packages (`foo_test` next to `foo`) count as `foo`.
pub fn package_of_dir(dir: &Path) -> Option<String> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut name: Option<String> = None;

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map_or(true, |e| e != "go") || !path.is_file() {
            continue;
        }
        let Some(pkg) = std::fs::read_to_string(&path)
            .ok()
            .and_then(|src| package_clause(&src))
        else {
            continue;
        };
        let pkg = pkg.strip_suffix("_test").unwrap_or(&pkg).to_string();

        match &name {
            None => name = Some(pkg),
            Some(existing) if *existing == pkg => {}
            Some(_) => return None,
        }
    }

    name
}

/// The name in the `package` clause of Go source text.
pub fn package_clause(src: &str) -> Option<String> {
    let mut in_block = false;

    for line in src.lines() {
        let mut line = line.trim();

        if in_block {
            match line.find("*/") {
                Some(end) => {
                    in_block = false;
                    line = line[end + 2..].trim();
                }
                None => continue,
            }
        }

        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        if let Some(rest) = line.strip_prefix("/*") {
            match rest.find("*/") {
                Some(end) => line = rest[end + 2..].trim(),
                None => {
                    in_block = true;
                    continue;
                }
            }
            if line.is_empty() {
                continue;
            }
        }

        let rest = line.strip_prefix("package")?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        return rest
            .split(|c: char| c.is_whitespace() || c == ';' || c == '/')
            .find(|s| !s.is_empty())
            .map(str::to_string);
    }

    None
}

/// Snapshot of the session's build context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextState {
    pub buffer: Option<Buffer>,
    pub window: Option<Window>,
    pub directory: PathBuf,
    pub previous_directory: PathBuf,
    pub tool: Tool,
    pub project_root: PathBuf,
    pub language_path: Option<String>,
}

impl ContextState {
    /// Extra environment for tool invocations.
    pub fn tool_env(&self) -> Vec<(String, String)> {
        match &self.language_path {
            Some(path) => vec![("GOPATH".to_string(), path.clone())],
            None => Vec::new(),
        }
    }

    /// Whether `dir` has been resolved into this state.
    pub fn is_resolved(&self) -> bool {
        !self.project_root.as_os_str().is_empty()
    }
}

/// Per-session build context, updated as buffers are entered.
pub struct BuildContext {
    env: Mutex<Environment>,
    state: Mutex<ContextState>,
}

impl BuildContext {
    pub fn new(env: Environment) -> Self {
        Self {
            env: Mutex::new(env),
            state: Mutex::new(ContextState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn environment(&self) -> Environment {
        self.env.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Swap the resolver environment; the next `set_context` resolves
    /// afresh.
    pub fn set_environment(&self, env: Environment) {
        *self.env.lock().unwrap_or_else(|e| e.into_inner()) = env;
        self.state().previous_directory = PathBuf::new();
    }

    /// Resolve `dir` and make it the current directory.
    ///
    /// Re-entering the previously resolved directory is a no-op. On
    /// failure the previous state is left untouched.
    pub fn set_context(&self, dir: &Path) -> CoreResult<ContextState> {
        let dir = normalize(dir);
        let mut state = self.state();

        if state.is_resolved() && state.previous_directory == dir {
            return Ok(state.clone());
        }

        let resolution = resolve(&dir, &self.environment())?;
        debug_assert!(is_within(&dir, &resolution.project_root));

        state.directory = dir.clone();
        state.previous_directory = dir;
        state.tool = resolution.tool;
        state.project_root = resolution.project_root;
        state.language_path = resolution.language_path;

        info!(
            directory = %state.directory.display(),
            tool = %state.tool,
            root = %state.project_root.display(),
            "Build context updated"
        );
        Ok(state.clone())
    }

    /// Record the buffer and window the user is in.
    pub fn set_handles(&self, buffer: Buffer, window: Window) {
        let mut state = self.state();
        state.buffer = Some(buffer);
        state.window = Some(window);
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> ContextState {
        self.state().clone()
    }

    /// Snapshot for `dir`, resolving it first when it is not current.
    pub fn for_directory(&self, dir: &Path) -> CoreResult<ContextState> {
        let current = self.snapshot();
        if current.is_resolved() && current.directory == normalize(dir) {
            return Ok(current);
        }
        debug!(dir = %dir.display(), "Resolving build context for command");
        self.set_context(dir)
    }
}
