//! GoGenerateTest: scaffold table-driven tests with `gotests`.

use crate::gosrc::scan;
use crate::outcome::{CommandArgs, Outcome};
use crate::registry::{command_opts, Command};
use crate::session::Session;
use async_trait::async_trait;
use nvgo_core::config::{GenerateTestConfig, OpenAfter};
use nvgo_core::{CoreError, CoreResult};
use nvgo_rpc::{CommandOpts, Nargs};
use nvgo_util::path::replace_suffix;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct GenerateTestCommand;

/// Which functions get tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Only(Vec<String>),
}

/// Resolve the selection from explicit names, the line range and config.
pub fn selection(names: &[String], range: Option<(i64, i64)>, src: &str, all_funcs: bool) -> CoreResult<Selection> {
    if !names.is_empty() {
        return Ok(Selection::Only(names.to_vec()));
    }

    let lines = match range {
        Some((start, end)) if start != end => Some((start, end)),
        Some((line, _)) if !all_funcs => Some((line, line)),
        None if !all_funcs => None,
        _ => return Ok(Selection::All),
    };

    let Some((first, last)) = lines else {
        return Err(CoreError::invalid_argument("no functions selected"));
    };
    let file = scan(src);
    let funcs: Vec<String> = file
        .in_lines(first.max(1) as usize, last.max(1) as usize)
        .into_iter()
        .map(|f| f.name.clone())
        .collect();
    if funcs.is_empty() {
        return Err(CoreError::not_found("no functions in the selected lines"));
    }
    Ok(Selection::Only(funcs))
}

/// Arguments for `gotests`.
pub fn gotests_args(selection: &Selection, config: &GenerateTestConfig, file: &Path) -> Vec<String> {
    let mut args = vec!["-w".to_string()];
    match selection {
        Selection::All => args.push("-all".to_string()),
        Selection::Only(names) => {
            args.push("-only".to_string());
            args.push(format!("^({})$", names.join("|")));
        }
    }
    if !config.exclude_funcs.is_empty() {
        args.push("-exclude".to_string());
        args.push(config.exclude_funcs.clone());
    }
    if config.exported_only {
        args.push("-exported".to_string());
    }
    args.push(file.to_string_lossy().into_owned());
    args
}

#[async_trait]
impl Command for GenerateTestCommand {
    fn name(&self) -> &'static str {
        "GoGenerateTest"
    }

    fn opts(&self) -> CommandOpts {
        CommandOpts {
            range: Some(String::new()),
            ..command_opts(Nargs::Any)
        }
    }

    async fn run(&self, session: &Session, args: CommandArgs, cancel: CancellationToken) -> CoreResult<Outcome> {
        let file = args.eval.require_file()?;
        let test_file = replace_suffix(file, ".go", "_test.go")
            .filter(|_| !file.to_string_lossy().ends_with("_test.go"))
            .ok_or_else(|| CoreError::invalid_argument("not a Go source file"))?;
        let config = session.config();
        let editor = session.editor();

        let buffer = editor.current_buffer().await?;
        let src = editor.buffer_lines(buffer, 0, -1).await?.join("\n");
        let selection = selection(&args.args, args.range, &src, config.generate_test.all_funcs)?;

        let dir = args.eval.dir();
        let state = session.context_for(&args.eval)?;
        let output = session
            .tool("gotests", &state, &cancel)
            .args(gotests_args(&selection, &config.generate_test, file))
            .current_dir(&dir)
            .run()
            .await?;

        let generated = output
            .stdout_str()
            .lines()
            .filter(|l| l.starts_with("Generated"))
            .count();
        info!(file = %test_file.display(), generated, "Generated tests");

        let open = match config.generate_test.open_after {
            OpenAfter::Always => true,
            OpenAfter::Never => false,
            OpenAfter::Ask => {
                editor
                    .confirm(&format!("Generated {generated} tests. Open {}?", test_file.display()))
                    .await?
            }
        };
        if open {
            editor.command(format!("edit {}", test_file.display())).await?;
        } else {
            editor
                .echo_progress("GoGenerateTest", format!("{generated} tests written to {}", test_file.display()))
                .await?;
        }
        Ok(Outcome::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &str = "package foo

func A() {}

func B() {
}

func C() {}
";

    #[test]
    fn test_explicit_names_win() {
        let sel = selection(&["X".to_string()], Some((1, 9)), SRC, true).unwrap();
        assert_eq!(sel, Selection::Only(vec!["X".into()]));
    }

    #[test]
    fn test_visual_range_selects_functions() {
        let sel = selection(&[], Some((3, 6)), SRC, true).unwrap();
        assert_eq!(sel, Selection::Only(vec!["A".into(), "B".into()]));
    }

    #[test]
    fn test_single_line_follows_config() {
        assert_eq!(selection(&[], Some((8, 8)), SRC, true).unwrap(), Selection::All);
        assert_eq!(
            selection(&[], Some((8, 8)), SRC, false).unwrap(),
            Selection::Only(vec!["C".into()])
        );
        assert!(selection(&[], Some((1, 1)), SRC, false).is_err());
    }

    #[test]
    fn test_gotests_args() {
        let config = GenerateTestConfig {
            exclude_funcs: "^init$".into(),
            exported_only: true,
            ..GenerateTestConfig::default()
        };
        let args = gotests_args(
            &Selection::Only(vec!["A".into(), "B".into()]),
            &config,
            Path::new("/p/foo.go"),
        );
        assert_eq!(args, vec!["-w", "-only", "^(A|B)$", "-exclude", "^init$", "-exported", "/p/foo.go"]);
        assert_eq!(
            gotests_args(&Selection::All, &GenerateTestConfig::default(), Path::new("f.go")),
            vec!["-w", "-all", "f.go"]
        );
    }
}
