//! GoTest: run package tests.
//!
//! Invoked by the user, tests run in the test terminal so their output
//! stays visible. From the post-write pipeline they run captured and
//! failures become diagnostics.

use crate::outcome::{diagnostics_or_error, CommandArgs, Outcome};
use crate::registry::{command_opts, Command};
use crate::session::Session;
use async_trait::async_trait;
use nvgo_core::{Config, ContextState, CoreResult, Tool};
use nvgo_rpc::{CommandOpts, Nargs};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct TestCommand;

/// Import path of `dir` inside a ProjectStyle project.
fn project_package(root: &Path, dir: &Path) -> Option<String> {
    let rel = dir.strip_prefix(root.join("src")).ok()?;
    if rel.as_os_str().is_empty() {
        return None;
    }
    Some(rel.to_string_lossy().replace('\\', "/"))
}

/// Binary, arguments and working directory for a test run from `dir`.
pub fn test_command(
    state: &ContextState,
    dir: &Path,
    flags: &[String],
    all: bool,
    targets: &[String],
) -> (&'static str, Vec<String>, PathBuf) {
    let mut args = vec!["test".to_string()];
    args.extend(flags.iter().cloned());

    match state.tool {
        Tool::Modular => {
            let cwd = if all { state.project_root.clone() } else { dir.to_path_buf() };
            if !targets.is_empty() {
                args.extend(targets.iter().cloned());
            } else if all {
                args.push("./...".to_string());
            }
            ("go", args, cwd)
        }
        Tool::ProjectStyle => {
            if !targets.is_empty() {
                args.extend(targets.iter().cloned());
            } else if !all {
                args.extend(project_package(&state.project_root, dir));
            }
            ("gb", args, state.project_root.clone())
        }
    }
}

#[async_trait]
impl Command for TestCommand {
    fn name(&self) -> &'static str {
        "GoTest"
    }

    fn producer(&self) -> Option<&'static str> {
        Some("Test")
    }

    fn opts(&self) -> CommandOpts {
        command_opts(Nargs::Any)
    }

    fn keep_cursor(&self, args: &CommandArgs, _config: &Config) -> bool {
        args.autosave
    }

    async fn run(&self, session: &Session, args: CommandArgs, cancel: CancellationToken) -> CoreResult<Outcome> {
        let state = session.context_for(&args.eval)?;
        let config = session.config();
        let dir = args.eval.dir();
        let (tool, tool_args, cwd) = test_command(&state, &dir, &config.test.flags, config.test.all, &args.args);

        if !args.autosave {
            let command = session.terminal_command(tool, &state, &tool_args);
            let mut terminal = session.test_terminal().lock().await;
            terminal.set_layout(config.terminal.layout());
            terminal.run(&command, &cwd).await?;
            return Ok(Outcome::Success);
        }

        debug!(tool, cwd = %cwd.display(), "Testing on save");
        let result = session
            .tool(tool, &state, &cancel)
            .args(tool_args)
            .current_dir(&cwd)
            .run()
            .await;
        match result {
            Ok(_) => Ok(Outcome::Success),
            Err(e) => diagnostics_or_error(e, &session.parse_options(&cwd, &state, &args.eval)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(tool: Tool) -> ContextState {
        ContextState {
            tool,
            project_root: PathBuf::from("/p"),
            ..ContextState::default()
        }
    }

    #[test]
    fn test_modular_current_package() {
        let flags = vec!["-v".to_string()];
        let (tool, args, cwd) = test_command(&state(Tool::Modular), Path::new("/p/pkg"), &flags, false, &[]);
        assert_eq!(tool, "go");
        assert_eq!(args, vec!["test", "-v"]);
        assert_eq!(cwd, PathBuf::from("/p/pkg"));
    }

    #[test]
    fn test_modular_all_runs_from_root() {
        let (_, args, cwd) = test_command(&state(Tool::Modular), Path::new("/p/pkg"), &[], true, &[]);
        assert_eq!(args, vec!["test", "./..."]);
        assert_eq!(cwd, PathBuf::from("/p"));
    }

    #[test]
    fn test_project_style_targets() {
        let (tool, args, cwd) = test_command(&state(Tool::ProjectStyle), Path::new("/p/src/proj/cmd"), &[], false, &[]);
        assert_eq!(tool, "gb");
        assert_eq!(args, vec!["test", "proj/cmd"]);
        assert_eq!(cwd, PathBuf::from("/p"));

        let (_, args, _) = test_command(&state(Tool::ProjectStyle), Path::new("/p/src/proj/cmd"), &[], true, &[]);
        assert_eq!(args, vec!["test"]);
    }
}
