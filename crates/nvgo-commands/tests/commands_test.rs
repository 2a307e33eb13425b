//! End-to-end command tests against the in-memory editor and stand-in
//! tool scripts.

#![cfg(unix)]

use nvgo_commands::{CommandArgs, CommandRegistry, Dispatched, Dispatcher, Eval, Session};
use nvgo_core::{Config, Diagnostic, Environment};
use nvgo_editor::ErrlistKind;
use nvgo_test_utils::{
    assert_echoed, canned_tool, fake_tool, recording_tool, BuiltTestProject, FakeEditor, TestProject,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const MAIN_GO: &str = "package main

import \"fmt\"

func main() {
\tfmt.Println(\"hi\")
}
";

struct Harness {
    fake: Arc<FakeEditor>,
    dispatcher: Dispatcher,
    project: BuiltTestProject,
    _tools: TempDir,
}

impl Harness {
    fn root(&self) -> PathBuf {
        self.project.path().to_path_buf()
    }

    fn eval(&self, file: &str) -> Eval {
        Eval::new(self.root(), self.project.join(file))
    }

    async fn dispatch(&self, name: &str, args: CommandArgs) -> Dispatched {
        self.dispatcher.dispatch(name, args).await.unwrap()
    }
}

/// Build a harness; `tools` receives the tool directory and returns the
/// binary overrides to install.
fn harness<F>(project: TestProject, configure: F) -> Harness
where
    F: FnOnce(&Path, &mut Config),
{
    let project = project.build();
    let tools = TempDir::new().unwrap();
    let mut config = Config::default();
    configure(tools.path(), &mut config);

    let fake = Arc::new(FakeEditor::new());
    let session = Arc::new(Session::new(fake.editor(), config, Environment::default()));
    let dispatcher = Dispatcher::new(session, Arc::new(CommandRegistry::with_builtins()));
    Harness {
        fake,
        dispatcher,
        project,
        _tools: tools,
    }
}

fn go_project() -> TestProject {
    TestProject::new()
        .with_git()
        .with_go_mod("example.com/p")
        .with_file("main.go", MAIN_GO)
}

fn install(config: &mut Config, name: &str, path: PathBuf) {
    config.tools.0.insert(name.to_string(), path.to_string_lossy().into_owned());
}

#[tokio::test]
async fn test_vet_failure_publishes_diagnostics() {
    let h = harness(go_project(), |dir, config| {
        install(config, "go", canned_tool(dir, "go", "", "main.go:6:2: unreachable code", 1));
    });

    let result = h.dispatch("GoVet", CommandArgs::new(h.eval("main.go"))).await;
    assert_eq!(result, Dispatched::Published(1));

    let list = h.fake.errlist(ErrlistKind::LocationList);
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].filename, "main.go");
    assert_eq!((list[0].lnum, list[0].col), (6, 2));
    assert_eq!(list[0].text, "unreachable code");
}

#[tokio::test]
async fn test_build_success_clears_previous_errors() {
    let log_dir = TempDir::new().unwrap();
    let log = log_dir.path().join("args");
    let h = harness(go_project(), |dir, config| {
        install(config, "go", recording_tool(dir, "go", &log, 0));
    });
    let stale = Diagnostic::error("main.go", 1, 1, "stale").unwrap();
    h.dispatcher.session().aggregator().store("Build", vec![stale]);

    let result = h.dispatch("GoBuild", CommandArgs::new(h.eval("main.go"))).await;
    assert_eq!(result, Dispatched::Success);
    assert!(h.dispatcher.session().aggregator().get("Build").is_none());
    assert_echoed(&h.fake.echoes(), "SUCCESS");

    let args = std::fs::read_to_string(&log).unwrap();
    assert_eq!(args, "build\n-o\n/dev/null\n./...\n");
}

#[tokio::test]
async fn test_format_rewrites_buffer_and_file() {
    let h = harness(go_project(), |dir, config| {
        let tool = fake_tool(dir, "goimports", "sed 's/func main(){/func main() {/'");
        install(config, "goimports", tool);
    });
    let file = h.project.join("main.go");
    let buf = h.fake.open_file(&file, "package main\n\nfunc main(){\n}\n");

    let result = h.dispatch("GoFmt", CommandArgs::new(h.eval("main.go"))).await;
    assert_eq!(result, Dispatched::Success);
    assert_eq!(h.fake.lines(buf), vec!["package main", "", "func main() {", "}"]);
    assert_eq!(h.project.read_file("main.go"), "package main\n\nfunc main() {\n}\n");
}

#[tokio::test]
async fn test_format_syntax_error_becomes_diagnostic() {
    let h = harness(go_project(), |dir, config| {
        let tool = canned_tool(dir, "goimports", "", "<standard input>:3:13: expected '}', found 'EOF'", 2);
        install(config, "goimports", tool);
    });
    h.fake.open_file(h.project.join("main.go"), "package main\n\nfunc main() {\n");

    let result = h.dispatch("GoFmt", CommandArgs::new(h.eval("main.go"))).await;
    assert_eq!(result, Dispatched::Published(1));
    let list = h.fake.errlist(ErrlistKind::LocationList);
    assert_eq!(list[0].filename, "main.go");
    assert_eq!(list[0].lnum, 3);
}

#[tokio::test]
async fn test_missing_tool_is_echoed() {
    let h = harness(go_project(), |_, config| {
        config.tools.0.insert("golint".into(), "/nonexistent/golint".into());
    });
    let result = h.dispatch("GoLint", CommandArgs::new(h.eval("main.go"))).await;
    assert!(matches!(result, Dispatched::Failed(ref m) if m.contains("golint")));
    assert!(h.fake.errlist(ErrlistKind::LocationList).is_empty());
}

#[tokio::test]
async fn test_rename_passes_offset_and_reloads() {
    let log_dir = TempDir::new().unwrap();
    let log = log_dir.path().join("args");
    let h = harness(go_project(), |dir, config| {
        install(config, "gorename", recording_tool(dir, "gorename", &log, 0));
    });
    let file = h.project.join("main.go");
    h.fake.open_path(&file);
    h.fake.set_cursor(5, 5);

    let args = CommandArgs::new(h.eval("main.go")).with_args(["start"]);
    assert_eq!(h.dispatch("GoRename", args).await, Dispatched::Success);

    let offset = MAIN_GO.find("main()").unwrap();
    let recorded = std::fs::read_to_string(&log).unwrap();
    let recorded: Vec<&str> = recorded.lines().collect();
    assert_eq!(
        recorded,
        vec!["-offset", &format!("{}:#{offset}", file.display()), "-to", "start"]
    );
    assert!(h.fake.commands().iter().any(|c| c == "silent edit!"));
}

#[tokio::test]
async fn test_switch_test_jumps_to_test_function() {
    let source = "package foo\n\nfunc bar() int {\n\treturn 1\n}\n";
    let tests = "package foo\n\nimport \"testing\"\n\nfunc TestBar(t *testing.T) {\n}\n";
    let project = TestProject::new()
        .with_go_mod("example.com/foo")
        .with_file("foo.go", source)
        .with_file("foo_test.go", tests);
    let h = harness(project, |_, _| {});
    h.fake.open_path(h.project.join("foo.go"));
    h.fake.set_cursor(4, 1);

    let result = h.dispatch("GoSwitchTest", CommandArgs::new(h.eval("foo.go"))).await;
    assert_eq!(result, Dispatched::Success);

    let current = h.fake.current_buffer();
    assert_eq!(h.fake.buffer_name(current), h.project.join("foo_test.go").display().to_string());
    assert_eq!(h.fake.cursor(), (5, 0));
}

#[tokio::test]
async fn test_switch_test_back_to_source() {
    let source = "package foo\n\ntype S struct{}\n\nfunc (s *S) DoThing() {\n}\n";
    let tests = "package foo\n\nfunc TestS_DoThing(t *T) {\n\tnew(S).DoThing()\n}\n";
    let project = TestProject::new()
        .with_go_mod("example.com/foo")
        .with_file("foo.go", source)
        .with_file("foo_test.go", tests);
    let h = harness(project, |_, _| {});
    h.fake.open_path(h.project.join("foo_test.go"));
    h.fake.set_cursor(4, 1);

    let result = h.dispatch("GoSwitchTest", CommandArgs::new(h.eval("foo_test.go"))).await;
    assert_eq!(result, Dispatched::Success);
    assert_eq!(h.fake.cursor(), (5, 0));
}

#[tokio::test]
async fn test_run_and_run_last_share_the_terminal() {
    let h = harness(go_project(), |_, _| {});
    let file = h.project.join("main.go");
    h.fake.open_path(&file);

    let missing = h.dispatch("GoRunLast", CommandArgs::new(h.eval("main.go"))).await;
    assert!(matches!(missing, Dispatched::Failed(_)));

    let args = CommandArgs::new(h.eval("main.go")).with_args(["-v"]);
    assert_eq!(h.dispatch("GoRun", args).await, Dispatched::Success);
    assert_eq!(h.dispatch("GoRunLast", CommandArgs::new(h.eval("main.go"))).await, Dispatched::Success);

    let opens = h.fake.termopens();
    assert_eq!(opens.len(), 2);
    assert_eq!(opens[0].command, opens[1].command);
    assert!(opens[0]
        .command
        .ends_with(&["run".to_string(), file.display().to_string(), "-v".to_string()]));
    assert_eq!(opens[0].cwd.as_deref(), Some(h.root().to_string_lossy().as_ref()));
    assert_eq!(h.fake.window_count(), 2);
}

#[tokio::test]
async fn test_cover_highlights_lines() {
    let body = r#"for a in "$@"; do case "$a" in -coverprofile=*) f="${a#-coverprofile=}";; esac; done
printf 'mode: atomic\nexample.com/p/main.go:5.13,6.19 1 1\nexample.com/p/main.go:7.1,7.2 1 0\n' > "$f""#;
    let h = harness(go_project(), |dir, config| {
        install(config, "go", fake_tool(dir, "go", body));
    });
    h.fake.open_path(h.project.join("main.go"));

    let result = h.dispatch("GoCover", CommandArgs::new(h.eval("main.go"))).await;
    assert_eq!(result, Dispatched::Success);

    let highlights: Vec<(i64, String)> = h
        .fake
        .highlights()
        .into_iter()
        .map(|hl| (hl.line, hl.group))
        .collect();
    assert_eq!(
        highlights,
        vec![
            (4, "GoCoverHit".to_string()),
            (5, "GoCoverHit".to_string()),
            (6, "GoCoverMiss".to_string()),
        ]
    );

    let cleared = h.dispatch("GoCover", CommandArgs::new(h.eval("main.go")).with_bang(true)).await;
    assert_eq!(cleared, Dispatched::Success);
    assert!(h.fake.highlights().is_empty());
}

#[tokio::test]
async fn test_guru_definition_jumps() {
    let project = go_project().with_file("b.go", "package main\n\n// B does b.\nfunc B() {}\n");
    let built_root = TempDir::new().unwrap();
    let stdout_file = built_root.path().join("out.json");
    let h = harness(project, |dir, config| {
        let body = format!("cat '{}'", stdout_file.display());
        install(config, "guru", fake_tool(dir, "guru", &body));
    });
    let target = h.project.join("b.go");
    std::fs::write(&stdout_file, format!(r#"{{"objpos": "{}:4:6", "desc": "func main.B()"}}"#, target.display()))
        .unwrap();
    h.fake.open_path(h.project.join("main.go"));

    let args = CommandArgs::new(h.eval("main.go")).with_args(["definition"]);
    assert_eq!(h.dispatch("GoGuru", args).await, Dispatched::Success);
    assert_eq!(h.fake.buffer_name(h.fake.current_buffer()), target.display().to_string());
    assert_eq!(h.fake.cursor(), (4, 5));
}

#[tokio::test]
async fn test_guru_referrers_are_listed() {
    let out_dir = TempDir::new().unwrap();
    let stdout_file = out_dir.path().join("out.json");
    let h = harness(go_project(), |dir, config| {
        let body = format!("cat '{}'", stdout_file.display());
        install(config, "guru", fake_tool(dir, "guru", &body));
    });
    let main = h.project.join("main.go");
    std::fs::write(
        &stdout_file,
        format!(
            "{{\"objpos\": \"{f}:5:6\", \"desc\": \"func main()\"}}\n{{\"package\": \"p\", \"refs\": [{{\"pos\": \"{f}:9:1\", \"text\": \"main()\"}}]}}\n",
            f = main.display()
        ),
    )
    .unwrap();
    h.fake.open_path(&main);

    let args = CommandArgs::new(h.eval("main.go")).with_args(["referrers"]);
    assert_eq!(h.dispatch("GoGuru", args).await, Dispatched::Published(2));
    let list = h.fake.errlist(ErrlistKind::LocationList);
    assert_eq!(list[1].text, "main()");
    assert_eq!(list[1].kind, "I");
}

#[tokio::test]
async fn test_guru_rejects_unknown_mode() {
    let h = harness(go_project(), |_, _| {});
    let args = CommandArgs::new(h.eval("main.go")).with_args(["sideways"]);
    let result = h.dispatch("GoGuru", args).await;
    assert!(matches!(result, Dispatched::Failed(ref m) if m.contains("unknown guru mode")));
}

#[tokio::test]
async fn test_generate_test_for_selection() {
    let log_dir = TempDir::new().unwrap();
    let log = log_dir.path().join("args");
    let h = harness(go_project(), |dir, config| {
        install(config, "gotests", recording_tool(dir, "gotests", &log, 0));
        config.generate_test.open_after = nvgo_core::config::OpenAfter::Never;
    });
    let file = h.project.join("main.go");
    h.fake.open_path(&file);

    let args = CommandArgs::new(h.eval("main.go")).with_range(5, 7);
    assert_eq!(h.dispatch("GoGenerateTest", args).await, Dispatched::Success);

    let recorded = std::fs::read_to_string(&log).unwrap();
    let recorded: Vec<&str> = recorded.lines().collect();
    assert_eq!(recorded, vec!["-w", "-only", "^(main)$", &file.display().to_string()]);
    assert_echoed(&h.fake.echoes(), "main_test.go");
}

#[tokio::test]
async fn test_byte_offset_is_echoed() {
    let h = harness(go_project(), |_, _| {});
    h.fake.open_file(h.project.join("main.go"), "ab\ncd\n");
    h.fake.set_cursor(2, 1);

    let result = h.dispatch("GoByteOffset", CommandArgs::new(h.eval("main.go"))).await;
    assert_eq!(result, Dispatched::Success);
    assert_eq!(h.fake.echoes().last().map(String::as_str), Some("4"));
}

#[tokio::test]
async fn test_function_call_returns_modes() {
    let h = harness(go_project(), |_, _| {});
    let value = h
        .dispatcher
        .call_function("GoGuruModes", vec![json!("p")], None)
        .await
        .unwrap();
    assert_eq!(value, json!(["peers", "pointsto"]));
}
