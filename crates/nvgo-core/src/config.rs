//! Configuration management for nvgo.
//!
//! Configuration is assembled from layers, later layers winning key by key:
//! 1. Built-in defaults
//! 2. An optional JSONC file given on the command line
//! 3. Editor variables named `go#<section>#<key>`, read once per session
//!
//! The file supports JSONC comments and variable substitution:
//! - `{env:VAR_NAME}` - Substitute environment variable
//! - `{file:path}` - Substitute file contents (relative to the config file)

use crate::context::Environment;
use crate::error::{ConfigError, CoreResult};
use nvgo_editor::{Editor, EditorResult, ErrlistKind, SplitMode, TerminalLayout};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Static regex for variable substitution, compiled once.
static VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

fn var_regex() -> &'static regex::Regex {
    VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\{(env|file):([^}]+)\}")
            .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// Tool binaries whose names can be overridden in the `tools` section.
pub const KNOWN_TOOLS: &[&str] = &[
    "go",
    "gb",
    "gofmt",
    "goimports",
    "golint",
    "gometalinter",
    "guru",
    "gorename",
    "gotests",
    "dlv",
];

/// Prefix of editor variables holding configuration.
pub const EDITOR_VAR_PREFIX: &str = "go";

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub global: GlobalConfig,
    pub build: BuildConfig,
    pub format: FormatConfig,
    pub iferr: IferrConfig,
    pub lint: LintConfig,
    pub vet: VetConfig,
    pub metalint: MetalintConfig,
    pub test: TestConfig,
    pub guru: GuruConfig,
    pub terminal: TerminalConfig,
    pub debug: DebugConfig,
    pub cover: CoverConfig,
    pub generate_test: GenerateTestConfig,
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub errlist_type: ErrlistKind,
    /// Replaces GOPATH for every tool invocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub go_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub autosave: bool,
    /// Pass `-a` to rebuild everything.
    pub force: bool,
    pub flags: Vec<String>,
    /// Never treat a tree as ProjectStyle.
    pub is_not_gb: bool,
}

/// Formatter used by GoFmt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatMode {
    Fmt,
    #[default]
    Goimports,
}

impl FormatMode {
    /// Binary name before `tools` overrides.
    pub fn binary(&self) -> &'static str {
        match self {
            FormatMode::Fmt => "gofmt",
            FormatMode::Goimports => "goimports",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    pub autosave: bool,
    pub mode: FormatMode,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            autosave: true,
            mode: FormatMode::Goimports,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IferrConfig {
    pub autosave: bool,
}

/// What GoLint looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LintMode {
    #[default]
    CurrentFile,
    CurrentDir,
    Root,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LintConfig {
    pub autosave: bool,
    pub mode: LintMode,
    pub min_confidence: f64,
    pub ignore: Vec<String>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            autosave: false,
            mode: LintMode::CurrentFile,
            min_confidence: 0.8,
            ignore: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VetConfig {
    pub autosave: bool,
    pub flags: Vec<String>,
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetalintConfig {
    pub autosave: bool,
    pub tools: Vec<String>,
    pub deadline: String,
    pub skip_dirs: Vec<String>,
}

impl Default for MetalintConfig {
    fn default() -> Self {
        Self {
            autosave: false,
            tools: vec!["vet".into(), "golint".into(), "errcheck".into()],
            deadline: "5s".to_string(),
            skip_dirs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    pub autosave: bool,
    /// Test every package under the project root.
    pub all: bool,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuruConfig {
    pub reflection: bool,
    /// Per mode: leave the cursor in the source window after listing.
    pub keep_cursor: HashMap<String, bool>,
    pub jump_first: bool,
}

impl GuruConfig {
    pub fn keep_cursor(&self, mode: &str) -> bool {
        self.keep_cursor.get(mode).copied().unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub mode: SplitMode,
    pub position: String,
    /// Rows for `split`; 0 means a third of the window.
    pub height: i64,
    /// Columns for `vsplit`; 0 means half the window.
    pub width: i64,
    pub stop_insert: bool,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            mode: SplitMode::VSplit,
            position: "botright".to_string(),
            height: 0,
            width: 0,
            stop_insert: true,
        }
    }
}

impl TerminalConfig {
    pub fn layout(&self) -> TerminalLayout {
        TerminalLayout {
            split: self.mode,
            position: self.position.clone(),
            size: match self.mode {
                SplitMode::HSplit => self.height,
                SplitMode::VSplit => self.width,
            },
            stop_insert: self.stop_insert,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Listen address of the headless debugger.
    pub address: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:41222".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverConfig {
    pub flags: Vec<String>,
    pub mode: String,
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            flags: Vec::new(),
            mode: "atomic".to_string(),
        }
    }
}

/// Whether GoGenerateTest opens the generated file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAfter {
    #[default]
    Ask,
    Always,
    Never,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateTestConfig {
    pub all_funcs: bool,
    /// Regex of functions to skip.
    pub exclude_funcs: String,
    pub exported_only: bool,
    pub open_after: OpenAfter,
}

impl Default for GenerateTestConfig {
    fn default() -> Self {
        Self {
            all_funcs: true,
            exclude_funcs: String::new(),
            exported_only: false,
            open_after: OpenAfter::Ask,
        }
    }
}

/// Binary overrides keyed by tool name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolsConfig(pub HashMap<String, String>);

impl ToolsConfig {
    /// The binary to run for `tool`.
    pub fn binary<'a>(&'a self, tool: &'a str) -> &'a str {
        self.0.get(tool).map(String::as_str).unwrap_or(tool)
    }
}

impl Config {
    /// Load the configuration file at `path` as a layer over the defaults.
    pub async fn load(path: &Path) -> CoreResult<Self> {
        let layer = Self::load_file(path).await?;
        Self::default().with_layer(layer)
    }

    /// Read a JSONC file into a raw layer.
    pub async fn load_file(path: &Path) -> CoreResult<Value> {
        let content = tokio::fs::read_to_string(path).await?;
        let content = Self::substitute_variables(&content, path)?;
        Self::parse_jsonc(&content, &path.display().to_string())
    }

    fn parse_jsonc(content: &str, source: &str) -> CoreResult<Value> {
        let stripped = Self::strip_comments(content);
        let value: Value =
            serde_json::from_str(&stripped).map_err(|e| ConfigError::InvalidJson {
                path: source.to_string(),
                message: e.to_string(),
            })?;
        if !value.is_object() {
            return Err(ConfigError::InvalidJson {
                path: source.to_string(),
                message: "top level must be an object".to_string(),
            }
            .into());
        }
        Ok(value)
    }

    /// Remove `//` and `/* */` comments outside of strings.
    fn strip_comments(input: &str) -> String {
        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();
        let mut in_string = false;
        let mut escape_next = false;

        while let Some(c) = chars.next() {
            if escape_next {
                result.push(c);
                escape_next = false;
                continue;
            }

            if c == '\\' && in_string {
                result.push(c);
                escape_next = true;
                continue;
            }

            if c == '"' {
                in_string = !in_string;
                result.push(c);
                continue;
            }

            if in_string || c != '/' {
                result.push(c);
                continue;
            }

            match chars.peek() {
                Some('/') => {
                    chars.next();
                    for c in chars.by_ref() {
                        if c == '\n' {
                            result.push('\n');
                            break;
                        }
                    }
                }
                Some('*') => {
                    chars.next();
                    let mut prev = ' ';
                    for c in chars.by_ref() {
                        if prev == '*' && c == '/' {
                            break;
                        }
                        // Keep line numbers stable for error messages
                        if c == '\n' {
                            result.push('\n');
                        }
                        prev = c;
                    }
                }
                _ => result.push(c),
            }
        }

        result
    }

    fn substitute_variables(content: &str, config_path: &Path) -> CoreResult<String> {
        let config_dir = config_path.parent().unwrap_or(Path::new("."));
        let mut result = content.to_string();

        for cap in var_regex().captures_iter(content) {
            let (Some(full), Some(kind), Some(value)) = (cap.get(0), cap.get(1), cap.get(2)) else {
                continue;
            };

            let replacement = match kind.as_str() {
                "env" => std::env::var(value.as_str()).map_err(|_| ConfigError::EnvVarNotFound {
                    name: value.as_str().to_string(),
                })?,
                "file" => {
                    let file_path = config_dir.join(value.as_str());
                    std::fs::read_to_string(&file_path)
                        .map(|v| v.trim().to_string())
                        .map_err(|_| ConfigError::FileRefNotFound {
                            path: file_path.display().to_string(),
                        })?
                }
                _ => continue,
            };

            result = result.replace(full.as_str(), &replacement);
        }

        Ok(result)
    }

    /// Apply a raw layer on top of this configuration.
    pub fn with_layer(&self, layer: Value) -> CoreResult<Self> {
        let mut base = serde_json::to_value(self)?;
        merge_values(&mut base, layer);
        serde_json::from_value(base).map_err(|e| {
            ConfigError::Validation {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Name of the editor variable for `section.key`.
    pub fn editor_var(section: &str, key: &str) -> String {
        format!("{EDITOR_VAR_PREFIX}#{section}#{key}")
    }

    /// Collect every `go#<section>#<key>` variable the editor has set.
    ///
    /// Vim-style `0`/`1` numbers are accepted for boolean keys.
    pub async fn editor_layer(editor: &Editor) -> EditorResult<Value> {
        let defaults = serde_json::to_value(Self::default()).unwrap_or(Value::Null);
        let mut layer = Map::new();

        let Value::Object(sections) = defaults else {
            return Ok(Value::Object(layer));
        };

        for (section, keys) in sections {
            let mut found = Map::new();
            let candidates: Vec<(String, Value)> = match (section.as_str(), keys) {
                ("tools", _) => KNOWN_TOOLS
                    .iter()
                    .map(|t| (t.to_string(), Value::String(String::new())))
                    .collect(),
                ("global", Value::Object(map)) => {
                    let mut keys: Vec<_> = map.into_iter().collect();
                    keys.push(("go_path".to_string(), Value::String(String::new())));
                    keys
                }
                (_, Value::Object(map)) => map.into_iter().collect(),
                _ => continue,
            };

            for (key, default) in candidates {
                let name = Self::editor_var(&section, &key);
                if let Some(value) = editor.get_var::<Value>(&name).await? {
                    debug!(var = %name, "Read editor configuration");
                    found.insert(key, coerce(&default, value));
                }
            }

            if !found.is_empty() {
                layer.insert(section, Value::Object(found));
            }
        }

        Ok(Value::Object(layer))
    }

    /// Apply the session's editor variables.
    pub async fn with_editor_vars(&self, editor: &Editor) -> CoreResult<Self> {
        let layer = Self::editor_layer(editor).await?;
        self.with_layer(layer)
    }

    /// The resolver environment with configured overrides applied.
    pub fn environment(&self, mut base: Environment) -> Environment {
        if let Some(go_path) = self.global.go_path.as_deref().filter(|p| !p.is_empty()) {
            base.go_path = std::env::split_paths(go_path).collect::<Vec<PathBuf>>();
        }
        base.force_modular |= self.build.is_not_gb;
        base
    }

    /// Extra environment for tool invocations.
    pub fn tool_env(&self) -> Vec<(String, String)> {
        self.global
            .go_path
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| ("GOPATH".to_string(), p.clone()))
            .collect()
    }
}

/// Vim has no booleans; accept numbers where the default is a bool.
fn coerce(default: &Value, value: Value) -> Value {
    match (default, &value) {
        (Value::Bool(_), Value::Number(n)) => Value::Bool(n.as_i64().unwrap_or(0) != 0),
        _ => value,
    }
}

/// Deep-merge `overlay` into `base`; objects merge, everything else replaces.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_values(existing, value)
                    }
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
