//! GoRun and GoRunLast: run the current file in the run terminal.

use crate::outcome::{CommandArgs, Outcome};
use crate::registry::{command_opts, Command};
use crate::session::{RunRequest, Session};
use async_trait::async_trait;
use nvgo_core::{ContextState, CoreError, CoreResult};
use nvgo_rpc::{CommandOpts, Nargs};
use nvgo_util::path::find_vcs_root;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct RunCommand;
pub struct RunLastCommand;

/// `go run` arguments for `file` followed by the program's own arguments.
pub fn run_args(file: &Path, program_args: &[String]) -> Vec<String> {
    let mut args = vec!["run".to_string(), file.to_string_lossy().into_owned()];
    args.extend(program_args.iter().cloned());
    args
}

async fn spawn(session: &Session, request: &RunRequest) -> CoreResult<()> {
    let mut terminal = session.run_terminal().lock().await;
    terminal.set_layout(session.config().terminal.layout());
    terminal.run(&request.command, &request.cwd).await?;
    Ok(())
}

#[async_trait]
impl Command for RunCommand {
    fn name(&self) -> &'static str {
        "GoRun"
    }

    fn opts(&self) -> CommandOpts {
        command_opts(Nargs::Any)
    }

    async fn run(&self, session: &Session, args: CommandArgs, _cancel: CancellationToken) -> CoreResult<Outcome> {
        let file = args.eval.require_file()?;
        let dir = args.eval.dir();
        let state = match session.context_for(&args.eval) {
            Ok(state) => state,
            Err(e) => {
                debug!(error = %e, "Running outside a package");
                ContextState::default()
            }
        };

        let request = RunRequest {
            command: session.terminal_command("go", &state, &run_args(file, &args.args)),
            cwd: find_vcs_root(&dir).unwrap_or(dir),
        };
        info!(cwd = %request.cwd.display(), "Running file");

        spawn(session, &request).await?;
        session.set_last_run(request);
        Ok(Outcome::Success)
    }
}

#[async_trait]
impl Command for RunLastCommand {
    fn name(&self) -> &'static str {
        "GoRunLast"
    }

    async fn run(&self, session: &Session, _args: CommandArgs, _cancel: CancellationToken) -> CoreResult<Outcome> {
        let request = session
            .last_run()
            .ok_or_else(|| CoreError::not_found("nothing has been run yet"))?;
        spawn(session, &request).await?;
        Ok(Outcome::Success)
    }
}
