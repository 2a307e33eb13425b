//! GoGuru: symbol queries through the `guru` analyzer.
//!
//! The analyzer prints one JSON value per result, several for streaming
//! modes such as `freevars` and `referrers`. Each mode has its own shape;
//! a value that does not fit is reported as a type assertion failure
//! instead of being silently skipped. `definition` jumps to the result,
//! every other mode lists its results.

use crate::outcome::{CommandArgs, Outcome};
use crate::registry::{command_opts, Command, Function};
use crate::session::Session;
use async_trait::async_trait;
use nvgo_core::{Config, CoreError, CoreResult, Diagnostic, Severity};
use nvgo_editor::{Cursor, ErrlistKind};
use nvgo_rpc::{CommandOpts, Nargs};
use nvgo_util::path::shortest;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct GuruCommand;
pub struct GuruModesFunction;
pub struct GuruQueryFunction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuruMode {
    Callees,
    Callers,
    Callstack,
    Definition,
    Describe,
    Freevars,
    Implements,
    Peers,
    Pointsto,
    Referrers,
    Whicherrs,
}

impl GuruMode {
    pub const ALL: [GuruMode; 11] = [
        GuruMode::Callees,
        GuruMode::Callers,
        GuruMode::Callstack,
        GuruMode::Definition,
        GuruMode::Describe,
        GuruMode::Freevars,
        GuruMode::Implements,
        GuruMode::Peers,
        GuruMode::Pointsto,
        GuruMode::Referrers,
        GuruMode::Whicherrs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GuruMode::Callees => "callees",
            GuruMode::Callers => "callers",
            GuruMode::Callstack => "callstack",
            GuruMode::Definition => "definition",
            GuruMode::Describe => "describe",
            GuruMode::Freevars => "freevars",
            GuruMode::Implements => "implements",
            GuruMode::Peers => "peers",
            GuruMode::Pointsto => "pointsto",
            GuruMode::Referrers => "referrers",
            GuruMode::Whicherrs => "whicherrs",
        }
    }
}

impl fmt::Display for GuruMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GuruMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GuruMode::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| CoreError::invalid_argument(format!("unknown guru mode: {s}")))
    }
}

/// A `file:line:col` position as printed by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
}

static POS_REGEX: OnceLock<Regex> = OnceLock::new();

fn pos_regex() -> &'static Regex {
    POS_REGEX.get_or_init(|| {
        Regex::new(r"^(?P<file>.+?):(?P<line>\d+)(?::(?P<col>\d+))?(?:-\d+(?::\d+)?)?$")
            .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

impl FromStr for Position {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = pos_regex()
            .captures(s.trim())
            .ok_or_else(|| CoreError::malformed(s, "not a file:line:col position"))?;
        let number = |name: &str| -> CoreResult<u32> {
            caps.name(name)
                .map_or(Ok(0), |m| m.as_str().parse())
                .map_err(|_| CoreError::malformed(s, format!("invalid {name}")))
        };
        Ok(Position {
            file: PathBuf::from(&caps["file"]),
            line: number("line")?,
            column: number("col")?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Definition {
    objpos: String,
    #[serde(default)]
    desc: String,
}

#[derive(Debug, Deserialize)]
struct Callees {
    #[serde(default)]
    desc: String,
    #[serde(default)]
    callees: Vec<NamedPos>,
}

#[derive(Debug, Deserialize)]
struct NamedPos {
    name: String,
    pos: String,
}

#[derive(Debug, Deserialize)]
struct Caller {
    pos: String,
    caller: String,
}

#[derive(Debug, Deserialize)]
struct Callstack {
    #[serde(default)]
    target: String,
    #[serde(default)]
    callers: Vec<Caller>,
}

#[derive(Debug, Deserialize)]
struct Describe {
    desc: String,
    pos: String,
    #[serde(default)]
    value: Option<DescribeValue>,
    #[serde(default, rename = "type")]
    ty: Option<DescribeType>,
}

#[derive(Debug, Deserialize)]
struct DescribeValue {
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    objpos: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DescribeType {
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    namepos: Option<String>,
    #[serde(default)]
    methods: Vec<NamedPos>,
}

#[derive(Debug, Deserialize)]
struct FreeVar {
    pos: String,
    kind: String,
    #[serde(rename = "ref")]
    reference: String,
    #[serde(rename = "type")]
    ty: String,
}

#[derive(Debug, Deserialize)]
struct ImplementsType {
    name: String,
    pos: String,
    kind: String,
}

#[derive(Debug, Deserialize)]
struct Implements {
    #[serde(rename = "type")]
    ty: ImplementsType,
    #[serde(default)]
    to: Vec<ImplementsType>,
    #[serde(default)]
    from: Vec<ImplementsType>,
    #[serde(default)]
    fromptr: Vec<ImplementsType>,
}

#[derive(Debug, Deserialize)]
struct Peers {
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    allocs: Vec<String>,
    #[serde(default)]
    sends: Vec<String>,
    #[serde(default)]
    receives: Vec<String>,
    #[serde(default)]
    closes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PointsTo {
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    namepos: Option<String>,
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct Label {
    pos: String,
    desc: String,
}

#[derive(Debug, Deserialize)]
struct ReferrersHead {
    objpos: String,
    desc: String,
}

#[derive(Debug, Deserialize)]
struct ReferrersPackage {
    #[serde(default)]
    refs: Vec<Reference>,
}

#[derive(Debug, Deserialize)]
struct Reference {
    pos: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct WhichErrs {
    errpos: String,
    #[serde(default)]
    globals: Vec<String>,
    #[serde(default)]
    constants: Vec<String>,
    #[serde(default)]
    types: Vec<ErrType>,
}

#[derive(Debug, Deserialize)]
struct ErrType {
    #[serde(rename = "type")]
    ty: String,
    position: String,
}

/// What a query produced.
#[derive(Debug, Clone, PartialEq)]
pub enum GuruResult {
    Jump { target: Position, desc: String },
    Diagnostics(Vec<Diagnostic>),
}

/// Every JSON value in `stdout`, in order.
pub fn stream_values(stdout: &str) -> CoreResult<Vec<Value>> {
    serde_json::Deserializer::from_str(stdout)
        .into_iter::<Value>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(CoreError::from)
}

fn shape<T: DeserializeOwned>(mode: GuruMode, value: Value) -> CoreResult<T> {
    serde_json::from_value(value).map_err(|e| CoreError::type_assertion(mode.as_str(), e.to_string()))
}

fn first<T: DeserializeOwned>(mode: GuruMode, values: &mut Vec<Value>) -> CoreResult<T> {
    if values.is_empty() {
        return Err(CoreError::type_assertion(mode.as_str(), "empty result"));
    }
    shape(mode, values.remove(0))
}

struct Collector<'a> {
    cwd: &'a Path,
    items: Vec<Diagnostic>,
}

impl Collector<'_> {
    fn add(&mut self, pos: &str, text: &str) -> CoreResult<()> {
        let pos: Position = pos.parse()?;
        let file = shortest(&pos.file, self.cwd);
        if let Some(d) = Diagnostic::new(file, pos.line, pos.column, text, Severity::Info) {
            self.items.push(d);
        }
        Ok(())
    }
}

/// Convert analyzer output for `mode` into a result, with paths shortened
/// against `cwd`.
pub fn parse_output(mode: GuruMode, stdout: &str, cwd: &Path) -> CoreResult<GuruResult> {
    let mut values = stream_values(stdout)?;
    let mut out = Collector { cwd, items: Vec::new() };

    match mode {
        GuruMode::Definition => {
            let def: Definition = first(mode, &mut values)?;
            return Ok(GuruResult::Jump {
                target: def.objpos.parse()?,
                desc: def.desc,
            });
        }
        GuruMode::Callees => {
            let callees: Callees = first(mode, &mut values)?;
            for callee in &callees.callees {
                out.add(&callee.pos, &format!("{}: {}", callees.desc, callee.name))?;
            }
        }
        GuruMode::Callers => {
            let callers: Vec<Caller> = first(mode, &mut values)?;
            for caller in &callers {
                out.add(&caller.pos, &caller.caller)?;
            }
        }
        GuruMode::Callstack => {
            let stack: Callstack = first(mode, &mut values)?;
            for caller in &stack.callers {
                out.add(&caller.pos, &format!("{} -> {}", caller.caller, stack.target))?;
            }
        }
        GuruMode::Describe => {
            let describe: Describe = first(mode, &mut values)?;
            match (&describe.value, &describe.ty) {
                (Some(value), _) => {
                    let pos = value.objpos.as_deref().unwrap_or(&describe.pos);
                    out.add(pos, &format!("{}: {}", describe.desc, value.ty))?;
                }
                (None, Some(ty)) => {
                    let pos = ty.namepos.as_deref().unwrap_or(&describe.pos);
                    out.add(pos, &format!("{}: {}", describe.desc, ty.ty))?;
                    for method in &ty.methods {
                        out.add(&method.pos, &method.name)?;
                    }
                }
                (None, None) => out.add(&describe.pos, &describe.desc)?,
            }
        }
        GuruMode::Freevars => {
            for value in values.drain(..) {
                let var: FreeVar = shape(mode, value)?;
                out.add(&var.pos, &format!("{} {} {}", var.kind, var.reference, var.ty))?;
            }
        }
        GuruMode::Implements => {
            let implements: Implements = first(mode, &mut values)?;
            let name = &implements.ty.name;
            out.add(&implements.ty.pos, &format!("{} type {name}", implements.ty.kind))?;
            for (relation, types) in [
                ("implements", &implements.to),
                ("implemented by", &implements.from),
                ("implemented by pointer", &implements.fromptr),
            ] {
                for t in types {
                    out.add(&t.pos, &format!("{name} {relation} {} type {}", t.kind, t.name))?;
                }
            }
        }
        GuruMode::Peers => {
            let peers: Peers = first(mode, &mut values)?;
            for (op, positions) in [
                ("allocated", &peers.allocs),
                ("sent", &peers.sends),
                ("received", &peers.receives),
                ("closed", &peers.closes),
            ] {
                for pos in positions {
                    out.add(pos, &format!("{} {op}", peers.ty))?;
                }
            }
        }
        GuruMode::Pointsto => {
            let entries: Vec<PointsTo> = first(mode, &mut values)?;
            for entry in &entries {
                if let Some(pos) = &entry.namepos {
                    out.add(pos, &entry.ty)?;
                }
                for label in &entry.labels {
                    out.add(&label.pos, &format!("{}: {}", entry.ty, label.desc))?;
                }
            }
        }
        GuruMode::Referrers => {
            let head: ReferrersHead = first(mode, &mut values)?;
            out.add(&head.objpos, &head.desc)?;
            for value in values.drain(..) {
                let package: ReferrersPackage = shape(mode, value)?;
                for reference in &package.refs {
                    out.add(&reference.pos, &reference.text)?;
                }
            }
        }
        GuruMode::Whicherrs => {
            let errs: WhichErrs = first(mode, &mut values)?;
            out.add(&errs.errpos, "error value")?;
            for pos in &errs.globals {
                out.add(pos, "global")?;
            }
            for pos in &errs.constants {
                out.add(pos, "constant")?;
            }
            for t in &errs.types {
                out.add(&t.position, &format!("type {}", t.ty))?;
            }
        }
    }

    Ok(GuruResult::Diagnostics(out.items))
}

/// Unsaved buffer content in the format `-modified` reads from stdin.
pub fn modified_archive(file: &Path, lines: &[String]) -> String {
    let mut content = lines.join("\n");
    content.push('\n');
    format!("{}\n{}\n{content}", file.display(), content.len())
}

/// Arguments for a query of `mode` at byte `offset` of `file`.
pub fn guru_args(mode: GuruMode, file: &Path, offset: usize, reflection: bool, modified: bool) -> Vec<String> {
    let mut args = vec!["-json".to_string()];
    if reflection {
        args.push("-reflect".to_string());
    }
    if modified {
        args.push("-modified".to_string());
    }
    args.push(mode.as_str().to_string());
    args.push(format!("{}:#{offset}", file.display()));
    args
}

struct Query<'a> {
    mode: GuruMode,
    file: &'a Path,
    dir: &'a Path,
    offset: usize,
    archive: Option<String>,
}

async fn run_query(session: &Session, query: Query<'_>, cancel: &CancellationToken) -> CoreResult<String> {
    let config = session.config();
    let state = session.context().for_directory(query.dir)?;
    let args = guru_args(
        query.mode,
        query.file,
        query.offset,
        config.guru.reflection,
        query.archive.is_some(),
    );

    let mut invocation = session.tool("guru", &state, cancel).args(args).current_dir(query.dir);
    if let Some(archive) = query.archive {
        invocation = invocation.stdin(archive);
    }
    debug!(mode = %query.mode, offset = query.offset, "Running guru query");
    Ok(invocation.run().await?.stdout_str())
}

fn mode_arg(args: &CommandArgs) -> CoreResult<GuruMode> {
    args.args
        .first()
        .ok_or_else(|| CoreError::invalid_argument("missing guru mode"))?
        .parse()
}

#[async_trait]
impl Command for GuruCommand {
    fn name(&self) -> &'static str {
        "GoGuru"
    }

    fn producer(&self) -> Option<&'static str> {
        Some("Guru")
    }

    fn opts(&self) -> CommandOpts {
        CommandOpts {
            complete: Some("customlist,GoGuruModes".to_string()),
            ..command_opts(Nargs::AtLeastOne)
        }
    }

    fn keep_cursor(&self, args: &CommandArgs, config: &Config) -> bool {
        args.args
            .first()
            .is_some_and(|mode| config.guru.keep_cursor(mode))
    }

    async fn run(&self, session: &Session, args: CommandArgs, cancel: CancellationToken) -> CoreResult<Outcome> {
        let mode = mode_arg(&args)?;
        let file = args.eval.require_file()?;
        let dir = args.eval.dir();
        let editor = session.editor();

        let window = editor.current_window().await?;
        let buffer = editor.current_buffer().await?;
        let offset = editor.byte_offset(window).await?;
        let modified = editor
            .buffer_option::<Option<bool>>(buffer, "modified")
            .await?
            .unwrap_or(false);
        let archive = if modified {
            Some(modified_archive(file, &editor.buffer_lines(buffer, 0, -1).await?))
        } else {
            None
        };

        let query = Query {
            mode,
            file,
            dir: &dir,
            offset,
            archive,
        };
        let stdout = run_query(session, query, &cancel).await?;

        match parse_output(mode, &stdout, &args.eval.cwd)? {
            GuruResult::Jump { target, desc } => {
                session.errlist().close().await?;
                editor.command(format!("edit {}", target.file.display())).await?;
                let window = editor.current_window().await?;
                let cursor = Cursor {
                    row: i64::from(target.line),
                    col: i64::from(target.column.saturating_sub(1)),
                };
                editor.set_window_cursor(window, cursor).await?;
                if !desc.is_empty() {
                    editor.echo_progress("GoGuru", desc).await?;
                }
                Ok(Outcome::Success)
            }
            GuruResult::Diagnostics(diagnostics) => {
                if diagnostics.is_empty() {
                    editor.echo_progress("GoGuru", format!("{mode}: no results")).await?;
                }
                Ok(Outcome::from_diagnostics(diagnostics))
            }
        }
    }

    async fn after_publish(&self, session: &Session, _args: &CommandArgs) -> CoreResult<()> {
        let errlist = session.errlist();
        if session.config().guru.jump_first {
            let jump = match errlist.kind() {
                ErrlistKind::LocationList => "silent! lfirst",
                ErrlistKind::Quickfix => "silent! cfirst",
            };
            session.editor().command(jump).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Function for GuruModesFunction {
    fn name(&self) -> &'static str {
        "GoGuruModes"
    }

    /// Completion candidates; the first argument is the word being typed.
    async fn call(&self, _session: &Session, args: Vec<Value>, _eval: Option<Value>) -> CoreResult<Value> {
        let lead = args.first().and_then(Value::as_str).unwrap_or_default();
        let modes: Vec<&str> = GuruMode::ALL
            .iter()
            .map(GuruMode::as_str)
            .filter(|m| m.starts_with(lead))
            .collect();
        Ok(json!(modes))
    }
}

#[derive(Debug, Deserialize)]
struct QueryEval {
    cwd: PathBuf,
    file: PathBuf,
    offset: usize,
}

#[async_trait]
impl Function for GuruQueryFunction {
    fn name(&self) -> &'static str {
        "GoGuruQuery"
    }

    fn eval(&self) -> Option<&'static str> {
        Some("{'cwd': getcwd(), 'file': expand('%:p'), 'offset': line2byte(line('.')) + col('.') - 2}")
    }

    /// Raw analyzer results for `mode` at the cursor, as a list.
    async fn call(&self, session: &Session, args: Vec<Value>, eval: Option<Value>) -> CoreResult<Value> {
        let mode: GuruMode = args
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::invalid_argument("missing guru mode"))?
            .parse()?;
        let eval: QueryEval = serde_json::from_value(eval.unwrap_or(Value::Null))?;
        let dir = eval.file.parent().map_or_else(|| eval.cwd.clone(), Path::to_path_buf);

        let query = Query {
            mode,
            file: &eval.file,
            dir: &dir,
            offset: eval.offset,
            archive: None,
        };
        let stdout = run_query(session, query, session.cancel_token()).await?;
        Ok(Value::Array(stream_values(&stdout)?))
    }
}
