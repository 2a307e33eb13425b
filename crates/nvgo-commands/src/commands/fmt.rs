//! GoFmt: format the current buffer and write it back.
//!
//! The buffer content is piped through the formatter; only lines that
//! changed are replaced so marks and the cursor survive. The result is
//! persisted with a write that skips autocmds, since this usually runs
//! from the pre-write pipeline.

use crate::outcome::{CommandArgs, Outcome};
use crate::registry::{command_opts, Command};
use crate::session::Session;
use async_trait::async_trait;
use nvgo_core::config::FormatMode;
use nvgo_core::{parse, Config, ContextState, CoreError, CoreResult, Diagnostic, ParseOptions};
use nvgo_editor::Buffer;
use nvgo_rpc::{CommandOpts, Nargs};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct FormatCommand;

/// Placeholder the formatters use for the file name when reading stdin.
const STDIN_NAME: &str = "<standard input>";

/// Formatter diagnostics name stdin; point them at `file` instead.
pub fn stdin_diagnostics(stderr: &str, file: &Path, cwd: &Path) -> CoreResult<Vec<Diagnostic>> {
    let file_name = file.to_string_lossy();
    let rewritten = stderr.replace(STDIN_NAME, &file_name);
    parse(&rewritten, &ParseOptions::new(cwd))
}

/// Split formatter output into buffer lines.
pub fn output_lines(stdout: &str) -> Vec<String> {
    let body = stdout.strip_suffix('\n').unwrap_or(stdout);
    if body.is_empty() {
        return Vec::new();
    }
    body.split('\n').map(str::to_string).collect()
}

#[async_trait]
impl Command for FormatCommand {
    fn name(&self) -> &'static str {
        "GoFmt"
    }

    fn producer(&self) -> Option<&'static str> {
        Some("Format")
    }

    fn opts(&self) -> CommandOpts {
        command_opts(Nargs::Zero)
    }

    fn keep_cursor(&self, _args: &CommandArgs, _config: &Config) -> bool {
        true
    }

    async fn run(&self, session: &Session, args: CommandArgs, cancel: CancellationToken) -> CoreResult<Outcome> {
        let file = args.eval.require_file()?.to_path_buf();
        let dir = args.eval.dir();
        let config = session.config();
        let editor = session.editor();

        let buffer = match args.eval.bufnr {
            Some(bufnr) => Buffer(bufnr),
            None => editor.current_buffer().await?,
        };
        let lines = editor.buffer_lines(buffer, 0, -1).await?;
        let mut input = lines.join("\n");
        input.push('\n');

        let mut invocation = session
            .tool(config.format.mode.binary(), &ContextState::default(), &cancel)
            .current_dir(&dir)
            .stdin(input);
        if config.format.mode == FormatMode::Goimports {
            invocation = invocation
                .arg("-srcdir")
                .arg(dir.to_string_lossy().into_owned());
        }

        let output = invocation.output().await?;
        if !output.success() {
            let diagnostics = stdin_diagnostics(&output.stderr_str(), &file, &args.eval.cwd)?;
            if diagnostics.is_empty() {
                return Err(CoreError::NonZeroExit {
                    tool: config.format.mode.binary().to_string(),
                    code: output.code,
                    stdout: String::new(),
                    stderr: output.stderr_str(),
                });
            }
            return Ok(Outcome::Diagnostics(diagnostics));
        }

        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        let formatted = output_lines(&output.stdout_str());
        if editor.update_buffer(buffer, &formatted).await? {
            debug!(file = %file.display(), "Buffer formatted");
            editor.write_buffer(buffer).await?;
        }
        Ok(Outcome::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_stdin_name_is_replaced() {
        let stderr = "<standard input>:3:1: expected declaration, found 'IDENT' x\n";
        let diags = stdin_diagnostics(stderr, Path::new("/p/a.go"), Path::new("/p")).unwrap();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].file, PathBuf::from("a.go"));
        assert_eq!((diags[0].line, diags[0].column), (3, 1));
    }

    #[test]
    fn test_output_lines() {
        assert_eq!(output_lines("a\n\nb\n"), vec!["a", "", "b"]);
        assert_eq!(output_lines("a"), vec!["a"]);
        assert!(output_lines("").is_empty());
    }
}
