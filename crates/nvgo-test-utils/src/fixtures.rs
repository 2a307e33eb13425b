//! Temporary Go project trees.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary project with configurable file structure.
///
/// # Example
///
/// ```rust
/// use nvgo_test_utils::fixtures::TestProject;
///
/// let project = TestProject::new()
///     .with_go_package("cmd/app", "main")
///     .with_git()
///     .build();
///
/// assert!(project.path().join("cmd/app/main.go").exists());
/// ```
pub struct TestProject {
    temp_dir: TempDir,
    files: HashMap<PathBuf, String>,
    dirs: Vec<PathBuf>,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            files: HashMap::new(),
            dirs: Vec::new(),
        }
    }

    /// Add a file; parent directories are created automatically.
    pub fn with_file(mut self, path: impl AsRef<Path>, contents: impl Into<String>) -> Self {
        self.files
            .insert(path.as_ref().to_path_buf(), contents.into());
        self
    }

    /// Add an empty directory.
    pub fn with_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.dirs.push(path.as_ref().to_path_buf());
        self
    }

    /// Mark the root as a git repository.
    pub fn with_git(self) -> Self {
        self.with_dir(".git")
    }

    /// Add `go.mod` declaring `module`.
    pub fn with_go_mod(self, module: &str) -> Self {
        self.with_file("go.mod", format!("module {module}\n\ngo 1.21\n"))
    }

    /// Add a one-file package at `dir`.
    pub fn with_go_package(self, dir: &str, package: &str) -> Self {
        let file = if package == "main" { "main.go" } else { "lib.go" };
        let body = if package == "main" {
            content::GO_MAIN.to_string()
        } else {
            format!("package {package}\n\nfunc Hello() string {{\n\treturn \"hello\"\n}}\n")
        };
        let path = if dir.is_empty() {
            PathBuf::from(file)
        } else {
            Path::new(dir).join(file)
        };
        self.with_file(path, body)
    }

    pub fn build(self) -> BuiltTestProject {
        let root = self.temp_dir.path();

        for dir in &self.dirs {
            let full_path = root.join(dir);
            fs::create_dir_all(&full_path).unwrap_or_else(|e| {
                panic!("Failed to create directory {}: {}", full_path.display(), e)
            });
        }

        for (path, contents) in &self.files {
            let full_path = root.join(path);
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).unwrap_or_else(|e| {
                    panic!(
                        "Failed to create parent directory for {}: {}",
                        full_path.display(),
                        e
                    )
                });
            }
            fs::write(&full_path, contents)
                .unwrap_or_else(|e| panic!("Failed to write file {}: {}", full_path.display(), e));
        }

        BuiltTestProject {
            temp_dir: self.temp_dir,
        }
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// A built project; removed from disk on drop.
pub struct BuiltTestProject {
    temp_dir: TempDir,
}

impl BuiltTestProject {
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn join(&self, path: impl AsRef<Path>) -> PathBuf {
        self.path().join(path)
    }

    pub fn read_file(&self, path: impl AsRef<Path>) -> String {
        let full_path = self.path().join(path.as_ref());
        fs::read_to_string(&full_path)
            .unwrap_or_else(|e| panic!("Failed to read file {}: {}", full_path.display(), e))
    }

    pub fn file_exists(&self, path: impl AsRef<Path>) -> bool {
        self.path().join(path.as_ref()).exists()
    }

    pub fn write_file(&self, path: impl AsRef<Path>, contents: impl AsRef<str>) {
        let full_path = self.path().join(path.as_ref());
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).ok();
        }
        fs::write(&full_path, contents.as_ref())
            .unwrap_or_else(|e| panic!("Failed to write file {}: {}", full_path.display(), e));
    }
}

/// Common Go sources.
pub mod content {
    pub const GO_MAIN: &str = "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"hello\")\n}\n";

    pub const GO_SOURCE: &str = r#"package foo

type S struct{}

func bar(x int) int {
	return x + 1
}

func (s *S) DoThing() error {
	return nil
}
"#;

    pub const GO_TEST: &str = r#"package foo

import "testing"

func TestBar(t *testing.T) {
	if bar(1) != 2 {
		t.Fatal("bad")
	}
}

func TestS_DoThing(t *testing.T) {
	var s S
	if err := s.DoThing(); err != nil {
		t.Fatal(err)
	}
}
"#;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_creates_files_and_dirs() {
        let project = TestProject::new()
            .with_go_mod("example.com/p")
            .with_go_package("", "p")
            .with_go_package("cmd/app", "main")
            .with_git()
            .build();

        assert!(project.file_exists("go.mod"));
        assert!(project.file_exists("lib.go"));
        assert!(project.file_exists("cmd/app/main.go"));
        assert!(project.path().join(".git").is_dir());
        assert!(project.read_file("lib.go").starts_with("package p"));
    }
}
