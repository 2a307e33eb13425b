//! GoBuild: compile the current package or project.

use crate::outcome::{diagnostics_or_error, CommandArgs, Outcome};
use crate::registry::{command_opts, Command};
use crate::session::Session;
use async_trait::async_trait;
use nvgo_core::{ContextState, CoreResult, Tool};
use nvgo_rpc::{CommandOpts, Nargs};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct BuildCommand;

/// Import paths of every package under `<root>/src`, sorted.
pub fn project_packages(root: &Path) -> Vec<String> {
    let src = root.join("src");
    let mut packages = Vec::new();
    let mut stack = vec![src.clone()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut has_go = false;
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if path.is_dir() {
                if !name.starts_with('.') && !name.starts_with('_') && name != "testdata" {
                    stack.push(path);
                }
            } else if name.ends_with(".go") {
                has_go = true;
            }
        }
        if has_go {
            if let Ok(rel) = dir.strip_prefix(&src) {
                if !rel.as_os_str().is_empty() {
                    packages.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }
    }

    packages.sort();
    packages
}

/// Binary, arguments and working directory for a build.
pub fn build_command(
    state: &ContextState,
    flags: &[String],
    force: bool,
    bang: bool,
    targets: &[String],
) -> (&'static str, Vec<String>, PathBuf) {
    let mut args = vec!["build".to_string()];
    args.extend(flags.iter().cloned());
    if force {
        args.push("-a".to_string());
    }

    match state.tool {
        Tool::Modular => {
            if !bang {
                args.push("-o".to_string());
                args.push(null_device().to_string());
            }
            if targets.is_empty() {
                args.push("./...".to_string());
            } else {
                args.extend(targets.iter().cloned());
            }
            ("go", args, state.project_root.clone())
        }
        Tool::ProjectStyle => {
            if targets.is_empty() {
                args.extend(project_packages(&state.project_root));
            } else {
                args.extend(targets.iter().cloned());
            }
            ("gb", args, state.project_root.clone())
        }
    }
}

fn null_device() -> &'static str {
    if cfg!(windows) {
        "NUL"
    } else {
        "/dev/null"
    }
}

#[async_trait]
impl Command for BuildCommand {
    fn name(&self) -> &'static str {
        "GoBuild"
    }

    fn producer(&self) -> Option<&'static str> {
        Some("Build")
    }

    fn opts(&self) -> CommandOpts {
        CommandOpts {
            bang: true,
            ..command_opts(Nargs::Any)
        }
    }

    fn keep_cursor(&self, args: &CommandArgs, _config: &nvgo_core::Config) -> bool {
        args.autosave
    }

    async fn run(&self, session: &Session, args: CommandArgs, cancel: CancellationToken) -> CoreResult<Outcome> {
        let state = session.context_for(&args.eval)?;
        let config = session.config();
        let (tool, tool_args, dir) =
            build_command(&state, &config.build.flags, config.build.force, args.bang, &args.args);
        debug!(tool, dir = %dir.display(), "Building");

        let result = session
            .tool(tool, &state, &cancel)
            .args(tool_args)
            .current_dir(&dir)
            .run()
            .await;

        match result {
            Ok(_) => {
                if !args.autosave {
                    session.editor().echo_progress("GoBuild", "SUCCESS").await?;
                }
                Ok(Outcome::Success)
            }
            Err(e) => diagnostics_or_error(e, &session.parse_options(&dir, &state, &args.eval)),
        }
    }
}
