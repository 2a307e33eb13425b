//! GoSwitchTest: jump between a function and its test.

use crate::gosrc::{scan, FuncDecl, SourceFile};
use crate::outcome::{CommandArgs, Outcome};
use crate::registry::{command_opts, Command};
use crate::session::Session;
use async_trait::async_trait;
use nvgo_core::{CoreError, CoreResult};
use nvgo_editor::Cursor;
use nvgo_rpc::{CommandOpts, Nargs};
use nvgo_util::path::replace_suffix;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct SwitchTestCommand;

const TEST_SUFFIX: &str = "_test.go";
const SOURCE_SUFFIX: &str = ".go";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToTest,
    ToSource,
}

/// The file to switch to from `file`, and which way we are going.
pub fn toggle_path(file: &Path) -> Option<(PathBuf, Direction)> {
    if let Some(source) = replace_suffix(file, TEST_SUFFIX, SOURCE_SUFFIX) {
        return Some((source, Direction::ToSource));
    }
    replace_suffix(file, SOURCE_SUFFIX, TEST_SUFFIX).map(|test| (test, Direction::ToTest))
}

fn pascal_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn strip_marker(name: &str) -> &str {
    name.strip_prefix(['_', '-']).unwrap_or(name)
}

/// Find the counterpart of `func` in `target`.
pub fn counterpart<'a>(func: &FuncDecl, direction: Direction, target: &'a SourceFile) -> Option<&'a FuncDecl> {
    match direction {
        Direction::ToTest => {
            let name = strip_marker(&func.name);
            let test_name = format!("Test{}", pascal_case(name));
            let method_test = func
                .receiver
                .as_ref()
                .and_then(|r| target.find(&format!("Test{r}_{}", pascal_case(name))));

            method_test
                .or_else(|| target.find(&test_name))
                .or_else(|| {
                    let fuzzy = Regex::new(&format!("(?i)Test[[:graph:]]*{}", regex::escape(name))).ok()?;
                    target.find_matching(&fuzzy)
                })
        }
        Direction::ToSource => {
            let name = func.name.strip_prefix("Test").unwrap_or(&func.name);
            let name = strip_marker(name);

            target
                .find(name)
                .or_else(|| target.find_ignore_case(name))
                .or_else(|| {
                    target.funcs.iter().find(|f| {
                        f.receiver
                            .as_ref()
                            .is_some_and(|r| name.eq_ignore_ascii_case(&format!("{r}_{}", f.name)))
                    })
                })
        }
    }
}

#[async_trait]
impl Command for SwitchTestCommand {
    fn name(&self) -> &'static str {
        "GoSwitchTest"
    }

    fn opts(&self) -> CommandOpts {
        command_opts(Nargs::Zero)
    }

    async fn run(&self, session: &Session, args: CommandArgs, _cancel: CancellationToken) -> CoreResult<Outcome> {
        let file = args.eval.require_file()?;
        let (target, direction) = toggle_path(file)
            .ok_or_else(|| CoreError::invalid_argument(format!("{} is not a Go file", file.display())))?;
        if !target.exists() {
            return Err(CoreError::not_found(format!("{} does not exist", target.display())));
        }

        let editor = session.editor();
        let window = editor.current_window().await?;
        let buffer = editor.current_buffer().await?;
        let offset = editor.byte_offset(window).await?;
        let source = editor.buffer_lines(buffer, 0, -1).await?.join("\n");

        let current = scan(&source);
        let func = current
            .enclosing(offset)
            .ok_or_else(|| CoreError::not_found("no function under the cursor"))?;

        let target_src = tokio::fs::read_to_string(&target).await?;
        let target_file = scan(&target_src);
        let found = counterpart(func, direction, &target_file);
        debug!(
            from = %func.name,
            to = ?found.map(|f| f.name.as_str()),
            file = %target.display(),
            "Switching test"
        );

        editor.command(format!("edit {}", target.display())).await?;
        if let Some(found) = found {
            let window = editor.current_window().await?;
            editor
                .set_window_cursor(
                    window,
                    Cursor {
                        row: found.line as i64,
                        col: 0,
                    },
                )
                .await?;
        }
        Ok(Outcome::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "package foo

func bar() {}

type S struct{}

func (s *S) DoThing() {}

func _hidden() {}
";

    const TESTS: &str = "package foo

import \"testing\"

func TestBar(t *testing.T) {}

func TestS_DoThing(t *testing.T) {}

func TestHidden(t *testing.T) {}
";

    #[test]
    fn test_toggle_path() {
        assert_eq!(
            toggle_path(Path::new("/p/foo.go")),
            Some((PathBuf::from("/p/foo_test.go"), Direction::ToTest))
        );
        assert_eq!(
            toggle_path(Path::new("/p/foo_test.go")),
            Some((PathBuf::from("/p/foo.go"), Direction::ToSource))
        );
        assert_eq!(toggle_path(Path::new("/p/README.md")), None);
    }

    #[test]
    fn test_source_to_test() {
        let source = scan(SOURCE);
        let tests = scan(TESTS);
        let found = counterpart(source.find("bar").unwrap(), Direction::ToTest, &tests).unwrap();
        assert_eq!(found.name, "TestBar");
    }

    #[test]
    fn test_test_to_source() {
        let source = scan(SOURCE);
        let tests = scan(TESTS);
        let found = counterpart(tests.find("TestBar").unwrap(), Direction::ToSource, &source).unwrap();
        assert_eq!(found.name, "bar");
    }

    #[test]
    fn test_method_receiver_prefix() {
        let source = scan(SOURCE);
        let tests = scan(TESTS);

        let found = counterpart(tests.find("TestS_DoThing").unwrap(), Direction::ToSource, &source).unwrap();
        assert_eq!(found.name, "DoThing");
        assert_eq!(found.receiver.as_deref(), Some("S"));

        let back = counterpart(found, Direction::ToTest, &tests).unwrap();
        assert_eq!(back.name, "TestS_DoThing");
    }

    #[test]
    fn test_leading_underscore_is_dropped() {
        let source = scan(SOURCE);
        let tests = scan(TESTS);
        let found = counterpart(source.find("_hidden").unwrap(), Direction::ToTest, &tests).unwrap();
        assert_eq!(found.name, "TestHidden");
    }

    #[test]
    fn test_fuzzy_match() {
        let source = scan("package foo\n\nfunc parse() {}\n");
        let tests = scan("package foo\n\nfunc TestLineParse(t *T) {}\n");
        let found = counterpart(source.find("parse").unwrap(), Direction::ToTest, &tests).unwrap();
        assert_eq!(found.name, "TestLineParse");
    }
}
