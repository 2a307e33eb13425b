//! GoLint: run the linter over a file, a directory or the whole project.

use crate::outcome::{CommandArgs, Outcome};
use crate::registry::{command_opts, Command};
use crate::session::Session;
use async_trait::async_trait;
use nvgo_core::config::LintMode;
use nvgo_core::{parse, Config, ContextState, CoreResult, Severity};
use nvgo_rpc::{CommandOpts, Nargs};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

pub struct LintCommand;

/// Working directory and targets for `mode`.
pub fn lint_targets(mode: LintMode, state: &ContextState, file: &std::path::Path, dir: PathBuf) -> (PathBuf, Vec<String>) {
    match mode {
        LintMode::CurrentFile => {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| ".".to_string());
            (dir, vec![name])
        }
        LintMode::CurrentDir => (dir, vec![".".to_string()]),
        LintMode::Root => (state.project_root.clone(), vec!["./...".to_string()]),
    }
}

#[async_trait]
impl Command for LintCommand {
    fn name(&self) -> &'static str {
        "GoLint"
    }

    fn producer(&self) -> Option<&'static str> {
        Some("Lint")
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

        let (dir, targets) = if args.args.is_empty() {
            lint_targets(config.lint.mode, &state, &args.eval.file, args.eval.dir())
        } else {
            (args.eval.dir(), args.args.clone())
        };

        // golint exits 0 with findings unless -set_exit_status is given.
        let output = session
            .tool("golint", &state, &cancel)
            .arg(format!("-min_confidence={}", config.lint.min_confidence))
            .args(targets)
            .current_dir(&dir)
            .output()
            .await?;

        let opts = session
            .parse_options(&dir, &state, &args.eval)
            .with_ignore(config.lint.ignore.clone())
            .with_severity(Severity::Warning);
        let mut diagnostics = parse(&output.stdout_str(), &opts)?;
        diagnostics.extend(parse(&output.stderr_str(), &opts.clone().with_severity(Severity::Error))?);

        Ok(Outcome::from_diagnostics(diagnostics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_lint_targets_by_mode() {
        let state = ContextState {
            project_root: PathBuf::from("/p"),
            ..ContextState::default()
        };
        let file = Path::new("/p/pkg/a.go");
        let dir = PathBuf::from("/p/pkg");

        assert_eq!(
            lint_targets(LintMode::CurrentFile, &state, file, dir.clone()),
            (dir.clone(), vec!["a.go".to_string()])
        );
        assert_eq!(
            lint_targets(LintMode::CurrentDir, &state, file, dir.clone()),
            (dir.clone(), vec![".".to_string()])
        );
        assert_eq!(
            lint_targets(LintMode::Root, &state, file, dir),
            (PathBuf::from("/p"), vec!["./...".to_string()])
        );
    }
}
