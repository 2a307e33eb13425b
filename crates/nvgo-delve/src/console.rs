//! The `(dlv)` command line typed into the debug terminal.

use crate::api::Breakpoint;
use crate::error::{DelveError, DelveResult};
use std::path::{Path, PathBuf};

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Break(Option<String>),
    Clear(i64),
    Breakpoints,
    Continue,
    Next,
    Step,
    StepOut,
    Stack,
    Restart,
    Help,
}

struct Entry {
    names: &'static [&'static str],
    usage: &'static str,
    help: &'static str,
}

const COMMANDS: &[Entry] = &[
    Entry { names: &["break", "b"], usage: "break [file:line | function]", help: "Set a breakpoint." },
    Entry { names: &["clear"], usage: "clear <id>", help: "Delete a breakpoint." },
    Entry { names: &["breakpoints", "bp"], usage: "breakpoints", help: "List breakpoints." },
    Entry { names: &["continue", "c"], usage: "continue", help: "Run until a breakpoint or exit." },
    Entry { names: &["next", "n"], usage: "next", help: "Step over to the next source line." },
    Entry { names: &["step", "s"], usage: "step", help: "Single step into calls." },
    Entry { names: &["stepout", "so"], usage: "stepout", help: "Run until the current function returns." },
    Entry { names: &["stack", "bt"], usage: "stack", help: "Print the stack of the current goroutine." },
    Entry { names: &["restart", "r"], usage: "restart", help: "Restart the process." },
    Entry { names: &["help", "h"], usage: "help", help: "Show this list." },
];

/// Parse one console line.
pub fn parse_line(line: &str) -> DelveResult<ConsoleCommand> {
    let mut words = line.split_whitespace();
    let name = words
        .next()
        .ok_or_else(|| DelveError::invalid_argument("empty command"))?;
    let rest: Vec<&str> = words.collect();

    let entry = COMMANDS
        .iter()
        .find(|e| e.names.contains(&name))
        .ok_or_else(|| DelveError::invalid_argument(format!("unknown command: {name}")))?;

    let command = match entry.names[0] {
        "break" => ConsoleCommand::Break((!rest.is_empty()).then(|| rest.join(" "))),
        "clear" => {
            let id = rest
                .first()
                .and_then(|id| id.parse().ok())
                .ok_or_else(|| DelveError::invalid_argument(format!("usage: {}", entry.usage)))?;
            ConsoleCommand::Clear(id)
        }
        "breakpoints" => ConsoleCommand::Breakpoints,
        "continue" => ConsoleCommand::Continue,
        "next" => ConsoleCommand::Next,
        "step" => ConsoleCommand::Step,
        "stepout" => ConsoleCommand::StepOut,
        "stack" => ConsoleCommand::Stack,
        "restart" => ConsoleCommand::Restart,
        _ => ConsoleCommand::Help,
    };
    Ok(command)
}

/// Help text, one command per line.
pub fn help() -> Vec<String> {
    COMMANDS
        .iter()
        .map(|e| {
            let aliases = &e.names[1..];
            let aliases = if aliases.is_empty() {
                String::new()
            } else {
                format!(" (alias: {})", aliases.join(", "))
            };
            format!("{:<32}{}{}", e.usage, e.help, aliases)
        })
        .collect()
}

/// Turn `file:line` or a function name into a breakpoint request.
/// Relative files resolve against `cwd`.
pub fn parse_breakpoint(spec: &str, cwd: &Path) -> DelveResult<Breakpoint> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(DelveError::invalid_argument("breakpoint location is empty"));
    }

    if let Some((file, line)) = spec.rsplit_once(':') {
        let line: i64 = line
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| DelveError::invalid_argument(format!("invalid line number: {spec}")))?;
        let file = PathBuf::from(file);
        let file = if file.is_absolute() { file } else { cwd.join(file) };
        return Ok(Breakpoint::at_line(file.to_string_lossy(), line));
    }

    if spec.contains(char::is_whitespace) {
        return Err(DelveError::invalid_argument(format!("invalid breakpoint location: {spec}")));
    }
    Ok(Breakpoint::at_function(spec))
}
