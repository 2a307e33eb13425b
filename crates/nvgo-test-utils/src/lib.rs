//! Testing utilities, fixtures, and fakes for nvgo.
//!
//! - **Editor**: [`FakeEditor`], an in-memory host answering the editor API
//! - **Fixtures**: temporary Go project trees
//! - **Tools**: shell scripts standing in for Go tool binaries
//! - **Assertions**: diff-printing assertion helpers
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use nvgo_test_utils::{FakeEditor, TestProject};
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn test_build() {
//!     let project = TestProject::new().with_go_package("", "main").build();
//!     let fake = Arc::new(FakeEditor::new());
//!     fake.open_path(project.join("main.go"));
//!     let editor = fake.editor();
//!     // drive commands against `editor`
//! }
//! ```

pub mod assertions;
pub mod editor;
pub mod fixtures;
pub mod tools;

pub use assertions::{assert_echoed, assert_file_equals, assert_lines_eq};
pub use editor::{FakeEditor, Highlight, TermOpen};
pub use fixtures::{BuiltTestProject, TestProject};
#[cfg(unix)]
pub use tools::{canned_tool, fake_tool, recording_tool};
