//! GoIferr: add `if err != nil` checks after unchecked error assignments.

use crate::gosrc::{scan, zero_value, FuncDecl};
use crate::outcome::{CommandArgs, Outcome};
use crate::registry::{command_opts, Command};
use crate::session::Session;
use async_trait::async_trait;
use nvgo_core::{CoreError, CoreResult};
use nvgo_rpc::{CommandOpts, Nargs};
use regex::Regex;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct IferrCommand;

static ASSIGN_REGEX: OnceLock<Regex> = OnceLock::new();

fn assign_regex() -> &'static Regex {
    ASSIGN_REGEX.get_or_init(|| {
        Regex::new(r"^\s*(?:[\w.]+\s*,\s*)*err\s*:?=[^=]")
            .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// Net bracket depth change of a line, ignoring string contents.
fn depth_delta(line: &str) -> i32 {
    let mut delta = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' && q != '`' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '(' | '{' | '[' => delta += 1,
            ')' | '}' | ']' => delta -= 1,
            '/' if chars.peek() == Some(&'/') => break,
            _ => {}
        }
    }
    delta
}

fn return_values(func: &FuncDecl) -> String {
    let count = func.results.len();
    func.results
        .iter()
        .take(count.saturating_sub(1))
        .map(|r| zero_value(r))
        .chain(std::iter::once("err".to_string()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_checked(lines: &[String], after: usize) -> bool {
    lines
        .iter()
        .skip(after + 1)
        .find(|l| !l.trim().is_empty())
        .is_some_and(|l| l.trim_start().starts_with("if err"))
}

/// Lines with a check inserted after every unchecked `err` assignment in
/// functions whose last result is `error`.
pub fn insert_checks(lines: &[String]) -> Vec<String> {
    let source = lines.join("\n");
    let file = scan(&source);

    // (index of the statement's last line, indentation, return values)
    let mut inserts: Vec<(usize, String, String)> = Vec::new();
    for func in file.funcs.iter().filter(|f| f.returns_error()) {
        let body_start = func.line; // 0-based index of the line after `func`
        let body_end = func.end_line.saturating_sub(1).min(lines.len());
        let values = return_values(func);

        let mut i = body_start;
        while i < body_end {
            let line = &lines[i];
            if !assign_regex().is_match(line) {
                i += 1;
                continue;
            }

            let mut last = i;
            let mut depth = depth_delta(line);
            while depth > 0 && last + 1 < body_end {
                last += 1;
                depth += depth_delta(&lines[last]);
            }

            if !is_checked(lines, last) {
                let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
                inserts.push((last, indent, values.clone()));
            }
            i = last + 1;
        }
    }

    let mut output = Vec::with_capacity(lines.len() + inserts.len() * 3);
    let mut pending = inserts.into_iter().peekable();
    for (i, line) in lines.iter().enumerate() {
        output.push(line.clone());
        while let Some((_, indent, values)) = pending.next_if(|(at, _, _)| *at == i) {
            output.push(format!("{indent}if err != nil {{"));
            output.push(format!("{indent}\treturn {values}"));
            output.push(format!("{indent}}}"));
        }
    }
    output
}

#[async_trait]
impl Command for IferrCommand {
    fn name(&self) -> &'static str {
        "GoIferr"
    }

    fn opts(&self) -> CommandOpts {
        command_opts(Nargs::Zero)
    }

    async fn run(&self, session: &Session, args: CommandArgs, cancel: CancellationToken) -> CoreResult<Outcome> {
        args.eval.require_file()?;
        let editor = session.editor();
        let buffer = editor.current_buffer().await?;
        let lines = editor.buffer_lines(buffer, 0, -1).await?;

        let updated = insert_checks(&lines);
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        if updated.len() != lines.len() {
            debug!(added = (updated.len() - lines.len()) / 3, "Inserting error checks");
            editor.update_buffer(buffer, &updated).await?;
        }
        Ok(Outcome::Success)
    }
}
