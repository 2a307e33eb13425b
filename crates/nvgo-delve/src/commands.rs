//! Editor commands driving the debug session.

use crate::api::ExecCommand;
use crate::error::DelveError;
use crate::render;
use crate::server::{ServerSpec, StartMode};
use crate::session::Debugger;
use async_trait::async_trait;
use nvgo_commands::registry::command_opts;
use nvgo_commands::{CommandArgs, CommandRegistry, Outcome, Session};
use nvgo_commands::{Command, Function};
use nvgo_core::{ContextState, CoreResult};
use nvgo_rpc::{CommandOpts, Nargs};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Register the debugger commands and completion function.
pub fn register(registry: &mut CommandRegistry, debugger: Arc<Debugger>) {
    registry.register(Arc::new(StartCommand {
        debugger: Arc::clone(&debugger),
    }));
    registry.register(Arc::new(BreakpointCommand {
        debugger: Arc::clone(&debugger),
    }));
    registry.register(Arc::new(ClearBreakpointCommand {
        debugger: Arc::clone(&debugger),
    }));
    registry.register(Arc::new(BreakpointsCommand {
        debugger: Arc::clone(&debugger),
    }));
    for &(name, action) in CONTROLS {
        registry.register(Arc::new(ControlCommand {
            name,
            action,
            debugger: Arc::clone(&debugger),
        }));
    }
    registry.register(Arc::new(StdinCommand { debugger }));
    registry.register_function(Arc::new(DebugModesFunction));
}

/// `DlvStart [mode] [target] [args...]`.
///
/// `debug` and `test` build the package in `target` (default: the
/// current file's directory); `exec` runs the binary at `target`.
pub struct StartCommand {
    debugger: Arc<Debugger>,
}

/// Server spec for a start request.
pub fn start_spec(session: &Session, args: &CommandArgs) -> CoreResult<ServerSpec> {
    let mut words = args.args.iter();
    let mode: StartMode = match words.next() {
        Some(mode) => mode.parse()?,
        None => StartMode::Debug,
    };
    let target = words.next().map(|t| {
        let t = PathBuf::from(t);
        if t.is_absolute() {
            t
        } else {
            args.eval.cwd.join(t)
        }
    });
    let program_args: Vec<String> = words.cloned().collect();

    let (program, working_dir) = match mode {
        StartMode::Exec => {
            let program = target.ok_or_else(|| DelveError::invalid_argument("exec needs a binary path"))?;
            (Some(program), args.eval.dir())
        }
        StartMode::Debug | StartMode::Test => (None, target.unwrap_or_else(|| args.eval.dir())),
    };

    let state = session.context_for(&args.eval).unwrap_or_else(|e| {
        debug!(error = %e, "Debugging outside a package");
        ContextState::default()
    });
    let config = session.config();
    Ok(ServerSpec {
        binary: config.tools.binary("dlv").to_string(),
        mode,
        program,
        working_dir,
        address: config.debug.address.clone(),
        program_args,
        env: state.tool_env(),
    })
}

#[async_trait]
impl Command for StartCommand {
    fn name(&self) -> &'static str {
        "DlvStart"
    }

    fn opts(&self) -> CommandOpts {
        CommandOpts {
            complete: Some("customlist,GoDebugModes".to_string()),
            ..command_opts(Nargs::Any)
        }
    }

    async fn run(&self, session: &Session, args: CommandArgs, _cancel: CancellationToken) -> CoreResult<Outcome> {
        let spec = start_spec(session, &args)?;
        info!(mode = %spec.mode, dir = %spec.working_dir.display(), "Starting debug session");

        // The debug session outlives this command, so it hangs off the editor session.
        let debug_session = self
            .debugger
            .start(session.editor().clone(), &spec, session.child_token())
            .await?;
        session
            .editor()
            .echo_progress("GoDebug", format!("process {} started", debug_session.pid()))
            .await?;
        Ok(Outcome::Success)
    }
}

/// `DlvBreakpoint [file:line | function]`; without an argument the cursor line.
pub struct BreakpointCommand {
    debugger: Arc<Debugger>,
}

#[async_trait]
impl Command for BreakpointCommand {
    fn name(&self) -> &'static str {
        "DlvBreakpoint"
    }

    fn opts(&self) -> CommandOpts {
        command_opts(Nargs::Optional)
    }

    async fn run(&self, _session: &Session, args: CommandArgs, cancel: CancellationToken) -> CoreResult<Outcome> {
        let debug_session = self.debugger.current()?;
        debug_session
            .set_breakpoint(args.args.first().map(String::as_str), &cancel)
            .await?;
        Ok(Outcome::Success)
    }
}

pub struct ClearBreakpointCommand {
    debugger: Arc<Debugger>,
}

#[async_trait]
impl Command for ClearBreakpointCommand {
    fn name(&self) -> &'static str {
        "DlvClearBreakpoint"
    }

    fn opts(&self) -> CommandOpts {
        command_opts(Nargs::One)
    }

    async fn run(&self, _session: &Session, args: CommandArgs, cancel: CancellationToken) -> CoreResult<Outcome> {
        let raw = args.args.first().map(String::as_str).unwrap_or_default();
        let id: i64 = raw
            .parse()
            .map_err(|_| DelveError::invalid_argument(format!("invalid breakpoint id: {raw}")))?;
        self.debugger.current()?.clear_breakpoint(id, &cancel).await?;
        Ok(Outcome::Success)
    }
}

/// Print the user breakpoints to the terminal pane.
pub struct BreakpointsCommand {
    debugger: Arc<Debugger>,
}

#[async_trait]
impl Command for BreakpointsCommand {
    fn name(&self) -> &'static str {
        "DlvBreakpoints"
    }

    async fn run(&self, _session: &Session, args: CommandArgs, cancel: CancellationToken) -> CoreResult<Outcome> {
        let debug_session = self.debugger.current()?;
        let breakpoints = debug_session.list_breakpoints(&cancel).await?;
        debug_session
            .panes()
            .terminal
            .append(render::render_breakpoints(&breakpoints, &args.eval.cwd))
            .await?;
        Ok(Outcome::Success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Exec(ExecCommand),
    Restart,
    Detach,
}

const CONTROLS: &[(&str, Control)] = &[
    ("DlvContinue", Control::Exec(ExecCommand::Continue)),
    ("DlvNext", Control::Exec(ExecCommand::Next)),
    ("DlvStep", Control::Exec(ExecCommand::Step)),
    ("DlvStepOut", Control::Exec(ExecCommand::StepOut)),
    ("DlvHalt", Control::Exec(ExecCommand::Halt)),
    ("DlvRestart", Control::Restart),
    ("DlvDetach", Control::Detach),
];

/// Argument-less commands acting on the running session.
pub struct ControlCommand {
    name: &'static str,
    action: Control,
    debugger: Arc<Debugger>,
}

#[async_trait]
impl Command for ControlCommand {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(&self, session: &Session, _args: CommandArgs, cancel: CancellationToken) -> CoreResult<Outcome> {
        match self.action {
            Control::Exec(command) => {
                self.debugger.current()?.execute(command, &cancel).await?;
            }
            Control::Restart => self.debugger.current()?.restart(&cancel).await?,
            Control::Detach => {
                self.debugger.stop().await?;
                session.editor().echo_progress("GoDebug", "detached").await?;
            }
        }
        Ok(Outcome::Success)
    }
}

/// Prompt for a console line and run it.
pub struct StdinCommand {
    debugger: Arc<Debugger>,
}

#[async_trait]
impl Command for StdinCommand {
    fn name(&self) -> &'static str {
        "DlvStdin"
    }

    async fn run(&self, session: &Session, _args: CommandArgs, cancel: CancellationToken) -> CoreResult<Outcome> {
        let debug_session = self.debugger.current()?;
        let line = session.editor().input("dlv> ", "").await?;
        if line.trim().is_empty() {
            return Ok(Outcome::Success);
        }
        debug_session.execute_console(&line, &cancel).await?;
        Ok(Outcome::Success)
    }
}

/// Completion for the `DlvStart` mode argument.
pub struct DebugModesFunction;

#[async_trait]
impl Function for DebugModesFunction {
    fn name(&self) -> &'static str {
        "GoDebugModes"
    }

    async fn call(&self, _session: &Session, args: Vec<Value>, _eval: Option<Value>) -> CoreResult<Value> {
        let lead = args.first().and_then(Value::as_str).unwrap_or_default();
        let modes: Vec<&str> = StartMode::ALL
            .iter()
            .map(StartMode::as_str)
            .filter(|m| m.starts_with(lead))
            .collect();
        Ok(json!(modes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvgo_commands::Eval;
    use nvgo_core::{Config, Environment};
    use nvgo_rpc::HandlerSpec;
    use nvgo_test_utils::FakeEditor;

    fn session() -> Session {
        let fake = Arc::new(FakeEditor::new());
        Session::new(fake.editor(), Config::default(), Environment::default())
    }

    #[test]
    fn test_registers_commands_and_modes() {
        let mut registry = CommandRegistry::new();
        register(&mut registry, Arc::new(Debugger::new()));

        let methods: Vec<String> = registry.specs().iter().map(HandlerSpec::method).collect();
        for expected in [
            "command:DlvStart",
            "command:DlvBreakpoint",
            "command:DlvClearBreakpoint",
            "command:DlvBreakpoints",
            "command:DlvContinue",
            "command:DlvNext",
            "command:DlvStep",
            "command:DlvStepOut",
            "command:DlvHalt",
            "command:DlvRestart",
            "command:DlvDetach",
            "command:DlvStdin",
            "function:GoDebugModes",
        ] {
            assert!(methods.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn test_debug_modes_completion() {
        let session = session();
        let all = DebugModesFunction.call(&session, vec![json!("")], None).await.unwrap();
        assert_eq!(all, json!(["debug", "test", "exec"]));
        let e = DebugModesFunction.call(&session, vec![json!("e")], None).await.unwrap();
        assert_eq!(e, json!(["exec"]));
    }

    #[test]
    fn test_start_spec_defaults_to_package_debug() {
        let session = session();
        let args = CommandArgs::new(Eval::new("/p", "/p/cmd/app/main.go"));
        let spec = start_spec(&session, &args).unwrap();

        assert_eq!(spec.mode, StartMode::Debug);
        assert_eq!(spec.working_dir, PathBuf::from("/p/cmd/app"));
        assert_eq!(spec.address, "127.0.0.1:41222");
        assert_eq!(spec.binary, "dlv");
        assert!(spec.program.is_none());
    }

    #[test]
    fn test_start_spec_exec_resolves_target() {
        let session = session();
        let args = CommandArgs::new(Eval::new("/p", "/p/main.go")).with_args(["exec", "bin/app", "-v", "x"]);
        let spec = start_spec(&session, &args).unwrap();

        assert_eq!(spec.program, Some(PathBuf::from("/p/bin/app")));
        assert_eq!(spec.program_args, vec!["-v", "x"]);

        let missing = CommandArgs::new(Eval::new("/p", "/p/main.go")).with_args(["exec"]);
        assert!(start_spec(&session, &missing).is_err());
        let unknown = CommandArgs::new(Eval::new("/p", "/p/main.go")).with_args(["attach"]);
        assert!(start_spec(&session, &unknown).is_err());
    }

    #[tokio::test]
    async fn test_commands_need_a_session() {
        let session = session();
        let debugger = Arc::new(Debugger::new());
        let command = ControlCommand {
            name: "DlvContinue",
            action: Control::Exec(ExecCommand::Continue),
            debugger,
        };
        let err = command
            .run(&session, CommandArgs::default(), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "debugger: no debug session is running");
    }
}
