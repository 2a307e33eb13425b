//! GoRename: rename the identifier under the cursor across the package.

use crate::outcome::{CommandArgs, Outcome};
use crate::registry::{command_opts, Command};
use crate::session::Session;
use async_trait::async_trait;
use nvgo_core::{parse, CoreError, CoreResult};
use nvgo_rpc::{CommandOpts, Nargs};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct RenameCommand;

/// Arguments for `gorename`.
pub fn rename_args(file: &Path, offset: usize, to: &str, force: bool) -> Vec<String> {
    let mut args = vec![
        "-offset".to_string(),
        format!("{}:#{offset}", file.display()),
        "-to".to_string(),
        to.to_string(),
    ];
    if force {
        args.push("-force".to_string());
    }
    args
}

#[async_trait]
impl Command for RenameCommand {
    fn name(&self) -> &'static str {
        "GoRename"
    }

    fn producer(&self) -> Option<&'static str> {
        Some("Rename")
    }

    fn opts(&self) -> CommandOpts {
        CommandOpts {
            bang: true,
            ..command_opts(Nargs::Optional)
        }
    }

    async fn run(&self, session: &Session, args: CommandArgs, cancel: CancellationToken) -> CoreResult<Outcome> {
        let file = args.eval.require_file()?.to_path_buf();
        let editor = session.editor();

        let to = match args.args.first() {
            Some(name) => name.clone(),
            None => {
                let word = editor.expand("<cword>").await?;
                editor.input("GoRename: ", &word).await?
            }
        };
        let to = to.trim().to_string();
        if to.is_empty() {
            return Err(CoreError::invalid_argument("no new name given"));
        }

        let window = editor.current_window().await?;
        let offset = editor.byte_offset(window).await?;
        let state = session.context_for(&args.eval)?;
        let dir = args.eval.dir();

        let output = session
            .tool("gorename", &state, &cancel)
            .args(rename_args(&file, offset, &to, args.bang))
            .current_dir(&dir)
            .output()
            .await?;

        if !output.success() {
            let diagnostics = parse(&output.stderr_str(), &session.parse_options(&dir, &state, &args.eval))?;
            if diagnostics.is_empty() {
                return Err(CoreError::NonZeroExit {
                    tool: "gorename".to_string(),
                    code: output.code,
                    stdout: output.stdout_str(),
                    stderr: output.stderr_str(),
                });
            }
            return Ok(Outcome::Diagnostics(diagnostics));
        }

        info!(to = %to, offset, "Renamed identifier");
        editor.command("silent edit!").await?;
        let summary = output.stderr_str();
        if let Some(line) = summary.lines().find(|l| !l.trim().is_empty()) {
            editor.echo_progress("GoRename", line.trim()).await?;
        }
        Ok(Outcome::Success)
    }
}
