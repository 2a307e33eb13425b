//! Stand-in tool executables.

use std::fs;
use std::path::{Path, PathBuf};

/// Write an executable shell script `dir/name` running `body`.
///
/// The script sees the original arguments as `"$@"`.
#[cfg(unix)]
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    fs::create_dir_all(dir)
        .unwrap_or_else(|e| panic!("Failed to create {}: {}", dir.display(), e));
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n"))
        .unwrap_or_else(|e| panic!("Failed to write {}: {}", path.display(), e));
    let mut perms = fs::metadata(&path)
        .unwrap_or_else(|e| panic!("Failed to stat {}: {}", path.display(), e))
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms)
        .unwrap_or_else(|e| panic!("Failed to chmod {}: {}", path.display(), e));
    path
}

/// A script printing `stdout` and `stderr` and exiting with `code`.
#[cfg(unix)]
pub fn canned_tool(dir: &Path, name: &str, stdout: &str, stderr: &str, code: i32) -> PathBuf {
    let body = format!(
        "cat <<'NVGO_OUT'\n{stdout}\nNVGO_OUT\ncat 1>&2 <<'NVGO_ERR'\n{stderr}\nNVGO_ERR\nexit {code}"
    );
    fake_tool(dir, name, &body)
}

/// A script that records its arguments, one per line, into `log`.
#[cfg(unix)]
pub fn recording_tool(dir: &Path, name: &str, log: &Path, code: i32) -> PathBuf {
    let body = format!(
        "for a in \"$@\"; do printf '%s\\n' \"$a\" >> '{}'; done\nexit {code}",
        log.display()
    );
    fake_tool(dir, name, &body)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    #[test]
    fn test_canned_tool_output() {
        let dir = TempDir::new().unwrap();
        let tool = canned_tool(dir.path(), "go", "out", "a.go:1: bad", 2);

        let output = Command::new(&tool).output().unwrap();
        assert_eq!(output.status.code(), Some(2));
        assert_eq!(String::from_utf8_lossy(&output.stdout), "out\n");
        assert_eq!(String::from_utf8_lossy(&output.stderr), "a.go:1: bad\n");
    }

    #[test]
    fn test_recording_tool() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("args.log");
        let tool = recording_tool(dir.path(), "vet", &log, 0);

        Command::new(&tool).args(["-v", "./..."]).status().unwrap();
        assert_eq!(fs::read_to_string(&log).unwrap(), "-v\n./...\n");
    }
}
