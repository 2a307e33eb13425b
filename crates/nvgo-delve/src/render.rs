//! Text shown in the debug panes.

use crate::api::{Breakpoint, DebuggerState, Stackframe, Thread};
use nvgo_util::path::shortest;
use std::path::Path;

fn display(file: &str, cwd: &Path) -> String {
    if file.is_empty() {
        return "?".to_string();
    }
    shortest(Path::new(file), cwd).display().to_string()
}

/// Stack context of the stopped thread.
pub fn render_context(thread: &Thread, frames: &[Stackframe], cwd: &Path) -> Vec<String> {
    let mut lines = vec![
        format!("Goroutine {} in {}", thread.goroutine_id, thread.function_name()),
        String::new(),
    ];
    for (i, frame) in frames.iter().enumerate() {
        let location = &frame.location;
        lines.push(format!("{i:>2}  {}", location.function_name()));
        lines.push(format!("    at {}:{}", display(&location.file, cwd), location.line));
    }
    lines
}

/// One line per thread, the current one starred.
pub fn render_threads(threads: &[Thread], current: Option<i64>, cwd: &Path) -> Vec<String> {
    let mut sorted: Vec<&Thread> = threads.iter().collect();
    sorted.sort_by_key(|t| t.id);
    sorted
        .into_iter()
        .map(|t| {
            let marker = if Some(t.id) == current { '*' } else { ' ' };
            format!(
                "{marker} Thread {} at {} {}:{}",
                t.id,
                t.function_name(),
                display(&t.file, cwd),
                t.line
            )
        })
        .collect()
}

pub fn render_breakpoints(breakpoints: &[Breakpoint], cwd: &Path) -> Vec<String> {
    if breakpoints.is_empty() {
        return vec!["No breakpoints".to_string()];
    }
    breakpoints
        .iter()
        .map(|bp| {
            let mut line = format!("Breakpoint {} at ", bp.id);
            if !bp.function_name.is_empty() {
                line.push_str(&format!("{}() ", bp.function_name));
            }
            line.push_str(&format!("{}:{}", display(&bp.file, cwd), bp.line));
            if !bp.cond.is_empty() {
                line.push_str(&format!(" if {}", bp.cond));
            }
            line
        })
        .collect()
}

/// Summary of where the process stopped, for the terminal pane.
pub fn state_line(state: &DebuggerState, cwd: &Path) -> String {
    if state.exited {
        return format!("Process exited with status {}", state.exit_status);
    }
    if state.running {
        return "Running".to_string();
    }
    match &state.current_thread {
        Some(thread) => format!(
            "> {}() {}:{}",
            thread.function_name(),
            display(&thread.file, cwd),
            thread.line
        ),
        None => "Stopped".to_string(),
    }
}
