//! Assertion helpers with readable failure output.

use similar::TextDiff;
use std::path::Path;

/// Assert two line sequences are equal, printing a unified diff if not.
pub fn assert_lines_eq<A: AsRef<str>, B: AsRef<str>>(actual: &[A], expected: &[B]) {
    let actual = join(actual);
    let expected = join(expected);
    if actual != expected {
        let diff = TextDiff::from_lines(&expected, &actual)
            .unified_diff()
            .header("expected", "actual")
            .to_string();
        panic!("Lines differ:\n{diff}");
    }
}

/// Assert a file's content equals `expected`, printing a diff if not.
pub fn assert_file_equals(path: &Path, expected: &str) {
    let content = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read file {}: {}", path.display(), e));
    if content != expected {
        let diff = TextDiff::from_lines(expected, &content)
            .unified_diff()
            .header("expected", "actual")
            .to_string();
        panic!("File {} differs:\n{diff}", path.display());
    }
}

/// Assert that some echoed message contains `needle`.
pub fn assert_echoed(echoes: &[String], needle: &str) {
    assert!(
        echoes.iter().any(|e| e.contains(needle)),
        "No echo contains {needle:?}. Echoes:\n{}",
        echoes.join("\n")
    );
}

fn join<S: AsRef<str>>(lines: &[S]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line.as_ref());
        out.push('\n');
    }
    out
}
