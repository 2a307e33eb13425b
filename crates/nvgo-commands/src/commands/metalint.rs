//! GoMetaLinter: run the aggregating linter and read its JSON report.

use crate::outcome::{CommandArgs, Outcome};
use crate::registry::{command_opts, Command};
use crate::session::Session;
use async_trait::async_trait;
use nvgo_core::config::MetalintConfig;
use nvgo_core::{Config, CoreError, CoreResult, Diagnostic, Severity};
use nvgo_rpc::{CommandOpts, Nargs};
use nvgo_util::path::{normalize, shortest};
use serde::Deserialize;
use std::path::Path;
use tokio_util::sync::CancellationToken;

pub struct MetalintCommand;

/// One entry of the linter's `--json` report.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub linter: String,
    #[serde(default)]
    pub severity: String,
    pub path: String,
    pub line: u32,
    #[serde(default)]
    pub col: u32,
    pub message: String,
}

pub fn metalint_args(config: &MetalintConfig) -> Vec<String> {
    let mut args = vec![
        "--json".to_string(),
        "--disable-all".to_string(),
        format!("--deadline={}", config.deadline),
    ];
    args.extend(config.tools.iter().map(|t| format!("--enable={t}")));
    args.extend(config.skip_dirs.iter().map(|d| format!("--skip={d}")));
    args.push(".".to_string());
    args
}

/// Convert a JSON report produced in `tool_dir` into diagnostics sorted
/// by path, relative to `cwd`.
pub fn parse_report(report: &str, tool_dir: &Path, cwd: &Path) -> CoreResult<Vec<Diagnostic>> {
    let report = report.trim();
    if report.is_empty() {
        return Ok(Vec::new());
    }
    let issues: Vec<Issue> = serde_json::from_str(report)
        .map_err(|e| CoreError::malformed(report.lines().next().unwrap_or_default(), e.to_string()))?;

    let mut diagnostics: Vec<Diagnostic> = issues
        .into_iter()
        .filter_map(|issue| {
            let severity = match issue.severity.as_str() {
                "warning" => Severity::Warning,
                "info" => Severity::Info,
                _ => Severity::Error,
            };
            let file = shortest(&normalize(&tool_dir.join(&issue.path)), cwd);
            let text = format!("{} ({})", issue.message, issue.linter);
            Diagnostic::new(file, issue.line, issue.col, &text, severity)
        })
        .collect();

    diagnostics.sort_by(|a, b| (&a.file, a.line, a.column).cmp(&(&b.file, b.line, b.column)));
    Ok(diagnostics)
}

#[async_trait]
impl Command for MetalintCommand {
    fn name(&self) -> &'static str {
        "GoMetaLinter"
    }

    fn producer(&self) -> Option<&'static str> {
        Some("MetaLint")
    }

    fn opts(&self) -> CommandOpts {
        command_opts(Nargs::Zero)
    }

    fn keep_cursor(&self, args: &CommandArgs, _config: &Config) -> bool {
        args.autosave
    }

    async fn run(&self, session: &Session, args: CommandArgs, cancel: CancellationToken) -> CoreResult<Outcome> {
        let state = session.context_for(&args.eval)?;
        let config = session.config();
        let dir = args.eval.dir();

        // Exits non-zero whenever it found something.
        let output = session
            .tool("gometalinter", &state, &cancel)
            .args(metalint_args(&config.metalint))
            .current_dir(&dir)
            .output()
            .await?;

        let diagnostics = parse_report(&output.stdout_str(), &dir, &args.eval.cwd)?;
        if diagnostics.is_empty() && !output.success() && output.stdout.is_empty() {
            return Err(CoreError::NonZeroExit {
                tool: "gometalinter".to_string(),
                code: output.code,
                stdout: String::new(),
                stderr: output.stderr_str(),
            });
        }
        Ok(Outcome::from_diagnostics(diagnostics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_args_from_config() {
        let config = MetalintConfig {
            skip_dirs: vec!["vendor".into()],
            ..MetalintConfig::default()
        };
        assert_eq!(
            metalint_args(&config),
            vec![
                "--json",
                "--disable-all",
                "--deadline=5s",
                "--enable=vet",
                "--enable=golint",
                "--enable=errcheck",
                "--skip=vendor",
                "."
            ]
        );
    }

    #[test]
    fn test_report_sorted_by_path() {
        let report = r#"[
            {"linter":"golint","severity":"warning","path":"z.go","line":1,"col":1,"message":"comment"},
            {"linter":"vet","severity":"error","path":"a.go","line":9,"col":2,"message":"unreachable"},
            {"linter":"errcheck","severity":"warning","path":"a.go","line":3,"col":0,"message":"unchecked"}
        ]"#;
        let diags = parse_report(report, Path::new("/p/pkg"), Path::new("/p")).unwrap();

        let order: Vec<(PathBuf, u32)> = diags.iter().map(|d| (d.file.clone(), d.line)).collect();
        assert_eq!(
            order,
            vec![
                (PathBuf::from("pkg/a.go"), 3),
                (PathBuf::from("pkg/a.go"), 9),
                (PathBuf::from("pkg/z.go"), 1)
            ]
        );
        assert_eq!(diags[0].text, "unchecked (errcheck)");
        assert_eq!(diags[0].severity, Severity::Warning);
        assert_eq!(diags[1].severity, Severity::Error);
    }

    #[test]
    fn test_empty_report() {
        assert!(parse_report("  \n", Path::new("/p"), Path::new("/p")).unwrap().is_empty());
    }

    #[test]
    fn test_garbage_report_is_malformed() {
        let err = parse_report("panic: oops", Path::new("/p"), Path::new("/p")).unwrap_err();
        assert!(matches!(err, CoreError::MalformedDiagnostic { .. }));
    }
}
