//! Wire types of the debugger's JSON-RPC API (version 2).
//!
//! Field names follow the server's JSON exactly, which mixes lower and
//! upper camel case.

use serde::{Deserialize, Serialize};

fn is_zero(n: &i64) -> bool {
    *n == 0
}

/// A breakpoint as the server reports it. Zero or empty fields are left
/// out of requests so the server picks them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Breakpoint {
    #[serde(skip_serializing_if = "is_zero")]
    pub id: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub line: i64,
    #[serde(rename = "functionName", skip_serializing_if = "String::is_empty")]
    pub function_name: String,
    #[serde(rename = "Cond", skip_serializing_if = "String::is_empty")]
    pub cond: String,
}

impl Breakpoint {
    pub fn at_line(file: impl Into<String>, line: i64) -> Self {
        Self {
            file: file.into(),
            line,
            ..Self::default()
        }
    }

    pub fn at_function(name: impl Into<String>) -> Self {
        Self {
            function_name: name.into(),
            ..Self::default()
        }
    }

    /// Breakpoints the server sets for itself (panics, fatal throws)
    /// carry negative ids.
    pub fn is_user(&self) -> bool {
        self.id > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Function {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub pc: u64,
    pub file: String,
    pub line: i64,
    pub function: Option<Function>,
}

impl Location {
    pub fn function_name(&self) -> &str {
        self.function.as_ref().map_or("?", |f| f.name.as_str())
    }
}

/// One frame of a stacktrace; the location fields are inlined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stackframe {
    #[serde(flatten)]
    pub location: Location,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thread {
    pub id: i64,
    pub pc: u64,
    pub file: String,
    pub line: i64,
    pub function: Option<Function>,
    #[serde(rename = "goroutineID")]
    pub goroutine_id: i64,
    #[serde(rename = "breakPoint")]
    pub breakpoint: Option<Breakpoint>,
}

impl Thread {
    pub fn function_name(&self) -> &str {
        self.function.as_ref().map_or("?", |f| f.name.as_str())
    }
}

/// Process state returned by every execution command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerState {
    #[serde(rename = "Running")]
    pub running: bool,
    #[serde(rename = "currentThread")]
    pub current_thread: Option<Thread>,
    #[serde(rename = "Threads")]
    pub threads: Vec<Thread>,
    pub exited: bool,
    #[serde(rename = "exitStatus")]
    pub exit_status: i64,
}

/// Execution commands understood by `RPCServer.Command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecCommand {
    Continue,
    Next,
    Step,
    StepOut,
    Halt,
}

impl ExecCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecCommand::Continue => "continue",
            ExecCommand::Next => "next",
            ExecCommand::Step => "step",
            ExecCommand::StepOut => "stepOut",
            ExecCommand::Halt => "halt",
        }
    }
}

// Request and response envelopes, one pair per RPC method.

#[derive(Debug, Serialize)]
pub(crate) struct CreateBreakpointIn {
    #[serde(rename = "Breakpoint")]
    pub breakpoint: Breakpoint,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BreakpointOut {
    #[serde(rename = "Breakpoint")]
    pub breakpoint: Breakpoint,
}

#[derive(Debug, Serialize)]
pub(crate) struct ClearBreakpointIn {
    #[serde(rename = "Id")]
    pub id: i64,
}

#[derive(Debug, Default, Serialize)]
pub(crate) struct Empty {}

#[derive(Debug, Deserialize)]
pub(crate) struct ListBreakpointsOut {
    #[serde(rename = "Breakpoints", default)]
    pub breakpoints: Vec<Breakpoint>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CommandIn {
    pub name: &'static str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StateOut {
    #[serde(rename = "State")]
    pub state: DebuggerState,
}

#[derive(Debug, Serialize)]
pub(crate) struct StateIn {
    #[serde(rename = "NonBlocking")]
    pub non_blocking: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProcessPidOut {
    #[serde(rename = "Pid")]
    pub pid: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct DetachIn {
    #[serde(rename = "Kill")]
    pub kill: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct StacktraceIn {
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(rename = "Depth")]
    pub depth: i64,
    #[serde(rename = "Full")]
    pub full: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StacktraceOut {
    #[serde(rename = "Locations", default)]
    pub locations: Vec<Stackframe>,
}

/// Responses whose body is ignored.
#[derive(Debug, Deserialize)]
pub(crate) struct Ignored {}
