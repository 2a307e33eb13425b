//! Debug session tests against a scripted debugger on an in-memory
//! connection and the in-memory editor.

use nvgo_commands::{CommandArgs, CommandRegistry, Dispatched, Dispatcher, Eval, Session};
use nvgo_core::{Config, Environment};
use nvgo_delve::{DebugSession, Debugger, DelveClient, DelveError, ExecCommand};
use nvgo_test_utils::{FakeEditor, TestProject};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

const MAIN_GO: &str = "package main

import \"fmt\"

func main() {
\tn := 3
\tfmt.Println(n)
}
";

#[derive(Default)]
struct Script {
    requests: Vec<Value>,
    next_breakpoint: i64,
    exit_next: bool,
}

/// A debugger server answering from canned state.
struct FakeDelve {
    script: Arc<Mutex<Script>>,
    file: String,
}

impl FakeDelve {
    fn start(file: &Path) -> (Self, DelveClient) {
        let (client_end, server_end) = tokio::io::duplex(64 * 1024);
        let fake = Self {
            script: Arc::new(Mutex::new(Script::default())),
            file: file.display().to_string(),
        };

        let script = Arc::clone(&fake.script);
        let file = fake.file.clone();
        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server_end);
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let request: Value = serde_json::from_str(&line).unwrap();
                let result = respond(&script, &file, &request);
                let out = json!({"id": request["id"], "result": result.0, "error": result.1});
                write.write_all(format!("{out}\n").as_bytes()).await.unwrap();
            }
        });
        (fake, DelveClient::new(client_end))
    }

    fn methods(&self) -> Vec<String> {
        self.script
            .lock()
            .unwrap()
            .requests
            .iter()
            .map(|r| r["method"].as_str().unwrap().trim_start_matches("RPCServer.").to_string())
            .collect()
    }

    fn last_params(&self, method: &str) -> Value {
        let script = self.script.lock().unwrap();
        let request = script
            .requests
            .iter()
            .rev()
            .find(|r| r["method"] == format!("RPCServer.{method}"))
            .unwrap();
        request["params"][0].clone()
    }

    fn exit_next(&self) {
        self.script.lock().unwrap().exit_next = true;
    }
}

fn stopped_state(file: &str) -> Value {
    let thread = json!({
        "id": 4, "pc": 4_198_400, "file": file, "line": 7,
        "function": {"name": "main.main"}, "goroutineID": 1
    });
    json!({
        "State": {
            "Running": false,
            "currentThread": thread,
            "Threads": [thread, {"id": 5, "file": "", "line": 0, "function": {"name": "runtime.futex"}}],
            "exited": false,
            "exitStatus": 0
        }
    })
}

fn respond(script: &Mutex<Script>, file: &str, request: &Value) -> (Value, Value) {
    let mut script = script.lock().unwrap();
    script.requests.push(request.clone());
    let params = &request["params"][0];

    let result = match request["method"].as_str().unwrap() {
        "RPCServer.ProcessPid" => json!({"Pid": 4242}),
        "RPCServer.CreateBreakpoint" => {
            let mut bp = params["Breakpoint"].clone();
            if bp["file"].as_str() == Some("/nowhere.go") {
                return (Value::Null, json!("could not find /nowhere.go:3"));
            }
            script.next_breakpoint += 1;
            bp["id"] = json!(script.next_breakpoint);
            if bp.get("functionName").is_some() {
                bp["file"] = json!(file);
                bp["line"] = json!(5);
            }
            json!({"Breakpoint": bp})
        }
        "RPCServer.ClearBreakpoint" => json!({"Breakpoint": {"id": params["Id"], "file": file, "line": 7}}),
        "RPCServer.ListBreakpoints" => json!({
            "Breakpoints": [
                {"id": -1, "name": "unrecovered-panic", "functionName": "runtime.fatalpanic"},
                {"id": 1, "file": file, "line": 7}
            ]
        }),
        "RPCServer.Command" if script.exit_next => {
            json!({"State": {"Running": false, "exited": true, "exitStatus": 0}})
        }
        "RPCServer.Command" | "RPCServer.State" => stopped_state(file),
        "RPCServer.Stacktrace" => json!({
            "Locations": [
                {"pc": 1, "file": file, "line": 7, "function": {"name": "main.main"}},
                {"pc": 2, "file": "/usr/lib/go/src/runtime/proc.go", "line": 250, "function": {"name": "runtime.main"}}
            ]
        }),
        "RPCServer.Restart" | "RPCServer.Detach" => json!({}),
        other => return (Value::Null, json!(format!("unknown method {other}"))),
    };
    (result, Value::Null)
}

struct Harness {
    fake: Arc<FakeEditor>,
    delve: FakeDelve,
    debugger: Arc<Debugger>,
    root: PathBuf,
    main: PathBuf,
    _project: nvgo_test_utils::BuiltTestProject,
}

impl Harness {
    async fn attach() -> Self {
        let project = TestProject::new()
            .with_go_mod("example.com/p")
            .with_file("main.go", MAIN_GO)
            .build();
        let root = project.path().to_path_buf();
        let main = project.join("main.go");

        let fake = Arc::new(FakeEditor::new());
        fake.open_path(&main);
        let (delve, client) = FakeDelve::start(&main);
        let debugger = Arc::new(Debugger::new());
        debugger
            .attach(fake.editor(), client, root.clone(), CancellationToken::new())
            .await
            .unwrap();

        Self {
            fake,
            delve,
            debugger,
            root,
            main,
            _project: project,
        }
    }

    fn session(&self) -> Arc<DebugSession> {
        self.debugger.current().unwrap()
    }

    fn terminal(&self) -> Vec<String> {
        self.fake.lines(self.session().panes().terminal.buffer().0)
    }

    fn context(&self) -> Vec<String> {
        self.fake.lines(self.session().panes().context.buffer().0)
    }

    fn threads(&self) -> Vec<String> {
        self.fake.lines(self.session().panes().threads.buffer().0)
    }

    fn dispatcher(&self) -> Dispatcher {
        let mut registry = CommandRegistry::with_builtins();
        nvgo_delve::register(&mut registry, Arc::clone(&self.debugger));
        let session = Arc::new(Session::new(self.fake.editor(), Config::default(), Environment::default()));
        Dispatcher::new(session, Arc::new(registry))
    }

    fn args(&self) -> CommandArgs {
        CommandArgs::new(Eval::new(&self.root, &self.main))
    }
}

#[tokio::test]
async fn test_attach_opens_panes_and_signs() {
    let h = Harness::attach().await;

    assert_eq!(h.session().pid(), 4242);
    assert_eq!(h.fake.window_count(), 4);
    assert_eq!(h.terminal(), vec!["Attached to process 4242", "Type help at the DlvStdin prompt for commands"]);

    let commands = h.fake.commands();
    assert!(commands.contains(&"highlight default link GoDebugCurrentLine CursorLine".to_string()));
    assert!(commands.contains(&"sign define GoDebugBreakpoint text=● texthl=GoDebugBreakpoint".to_string()));
    assert!(commands
        .contains(&"sign define GoDebugCurrent text=▶ texthl=GoDebugCurrent linehl=GoDebugCurrentLine".to_string()));
}

#[tokio::test]
async fn test_breakpoint_at_cursor_places_sign() {
    let h = Harness::attach().await;
    h.fake.set_cursor(7, 0);

    let bp = h.session().set_breakpoint(None, &CancellationToken::new()).await.unwrap();

    assert_eq!(bp.id, 1);
    assert_eq!(
        h.delve.last_params("CreateBreakpoint"),
        json!({"Breakpoint": {"file": h.main.display().to_string(), "line": 7}})
    );
    let place = format!("sign place 1 line=7 name=GoDebugBreakpoint file={}", h.main.display());
    assert!(h.fake.commands().contains(&place));
    assert_eq!(h.terminal().last().unwrap(), "Breakpoint 1 at main.go:7 set");
}

#[tokio::test]
async fn test_function_breakpoint_and_refusal() {
    let h = Harness::attach().await;
    let cancel = CancellationToken::new();

    let bp = h.session().set_breakpoint(Some("main.main"), &cancel).await.unwrap();
    assert_eq!(bp.function_name, "main.main");
    assert_eq!(bp.line, 5);

    let err = h.session().set_breakpoint(Some("/nowhere.go:3"), &cancel).await.unwrap_err();
    assert!(matches!(err, DelveError::Remote { .. }), "{err}");
    assert_eq!(h.session().breakpoints().len(), 1);
}

#[tokio::test]
async fn test_continue_renders_stop() {
    let h = Harness::attach().await;
    let source = h.fake.current_window();

    let state = h
        .session()
        .execute(ExecCommand::Continue, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(state.current_thread.map(|t| t.line), Some(7));

    assert_eq!(h.delve.last_params("Command"), json!({"name": "continue"}));
    assert_eq!(h.delve.last_params("Stacktrace"), json!({"Id": 1, "Depth": 20, "Full": false}));
    assert_eq!(
        h.context(),
        vec![
            "Goroutine 1 in main.main",
            "",
            " 0  main.main",
            "    at main.go:7",
            " 1  runtime.main",
            "    at /usr/lib/go/src/runtime/proc.go:250",
        ]
    );
    assert_eq!(
        h.threads(),
        vec!["* Thread 4 at main.main main.go:7", "  Thread 5 at runtime.futex ?:0"]
    );

    let pc = format!("sign place 999999 line=7 name=GoDebugCurrent file={}", h.main.display());
    assert!(h.fake.commands().contains(&pc));
    assert_eq!(h.fake.window_cursor(source), Some((7, 0)));
    assert_eq!(h.terminal().last().unwrap(), "> main.main() main.go:7");
}

#[tokio::test]
async fn test_next_moves_previous_pc_sign() {
    let h = Harness::attach().await;
    let cancel = CancellationToken::new();
    let session = h.session();

    session.execute(ExecCommand::Next, &cancel).await.unwrap();
    session.execute(ExecCommand::Next, &cancel).await.unwrap();

    let unplace = format!("sign unplace 999999 file={}", h.main.display());
    assert_eq!(h.fake.commands().iter().filter(|c| **c == unplace).count(), 1);
}

#[tokio::test]
async fn test_exit_clears_pc_sign() {
    let h = Harness::attach().await;
    let cancel = CancellationToken::new();
    let session = h.session();

    session.execute(ExecCommand::Step, &cancel).await.unwrap();
    h.delve.exit_next();
    let state = session.execute(ExecCommand::Continue, &cancel).await.unwrap();

    assert!(state.exited);
    assert_eq!(h.terminal().last().unwrap(), "Process exited with status 0");
    assert_eq!(h.context(), vec!["Process exited with status 0"]);
    let unplace = format!("sign unplace 999999 file={}", h.main.display());
    assert!(h.fake.commands().contains(&unplace));
}

#[tokio::test]
async fn test_console_lines() {
    let h = Harness::attach().await;
    let cancel = CancellationToken::new();
    let session = h.session();

    session.execute_console("bp", &cancel).await.unwrap();
    session.execute_console("frobnicate", &cancel).await.unwrap();

    let terminal = h.terminal();
    let tail: Vec<&str> = terminal.iter().skip(2).map(String::as_str).collect();
    assert_eq!(
        tail,
        vec![
            "(dlv) bp",
            "Breakpoint 1 at main.go:7",
            "(dlv) frobnicate",
            "Command failed: unknown command: frobnicate",
        ]
    );
}

#[tokio::test]
async fn test_restart_refreshes_pid() {
    let h = Harness::attach().await;
    h.session().restart(&CancellationToken::new()).await.unwrap();

    let methods = h.delve.methods();
    assert_eq!(methods.iter().filter(|m| *m == "ProcessPid").count(), 2);
    assert_eq!(h.terminal().last().unwrap(), "Process restarted with PID 4242");
}

#[tokio::test]
async fn test_clear_breakpoint_unplaces_sign() {
    let h = Harness::attach().await;
    let cancel = CancellationToken::new();
    let session = h.session();
    h.fake.set_cursor(7, 0);
    session.set_breakpoint(None, &cancel).await.unwrap();

    session.clear_breakpoint(1, &cancel).await.unwrap();

    assert_eq!(h.delve.last_params("ClearBreakpoint"), json!({"Id": 1}));
    let unplace = format!("sign unplace 1 file={}", h.main.display());
    assert!(h.fake.commands().contains(&unplace));
    assert!(session.breakpoints().is_empty());
}

#[tokio::test]
async fn test_single_session_and_stop() {
    let h = Harness::attach().await;

    let (_, second) = FakeDelve::start(&h.main);
    let err = h
        .debugger
        .attach(h.fake.editor(), second, h.root.clone(), CancellationToken::new())
        .await
        .err().expect("second attach should fail");
    assert!(matches!(err, DelveError::AlreadyRunning));

    let session = h.session();
    h.debugger.stop().await.unwrap();

    assert_eq!(h.delve.last_params("Detach"), json!({"Kill": true}));
    assert!(session.cancel_token().is_cancelled());
    assert_eq!(h.fake.window_count(), 1);
    assert!(matches!(h.debugger.stop().await, Err(DelveError::NotRunning)));
}

#[tokio::test]
async fn test_abandoned_start_frees_the_slot() {
    let project = TestProject::new().with_file("main.go", MAIN_GO).build();
    let main = project.join("main.go");
    let fake = Arc::new(FakeEditor::new());
    fake.open_path(&main);
    let debugger = Debugger::new();

    // A server that accepts the connection but never answers.
    let (client_end, _silent) = tokio::io::duplex(1024);
    let abandoned = tokio::time::timeout(
        std::time::Duration::from_millis(100),
        debugger.attach(
            fake.editor(),
            DelveClient::new(client_end),
            project.path().to_path_buf(),
            CancellationToken::new(),
        ),
    )
    .await;
    assert!(abandoned.is_err());
    assert!(matches!(debugger.current(), Err(DelveError::NotRunning)));

    let (_delve, client) = FakeDelve::start(&main);
    debugger
        .attach(fake.editor(), client, project.path().to_path_buf(), CancellationToken::new())
        .await
        .unwrap();
    assert!(debugger.is_running());
}

#[tokio::test]
async fn test_dispatched_commands() {
    let h = Harness::attach().await;
    let dispatcher = h.dispatcher();

    let result = dispatcher.dispatch("DlvNext", h.args()).await.unwrap();
    assert_eq!(result, Dispatched::Success);
    assert_eq!(h.delve.last_params("Command"), json!({"name": "next"}));

    let result = dispatcher
        .dispatch("DlvClearBreakpoint", h.args().with_args(["x"]))
        .await
        .unwrap();
    assert!(matches!(result, Dispatched::Failed(ref m) if m.contains("invalid breakpoint id")));

    let result = dispatcher.dispatch("DlvDetach", h.args()).await.unwrap();
    assert_eq!(result, Dispatched::Success);

    let result = dispatcher.dispatch("DlvContinue", h.args()).await.unwrap();
    assert!(matches!(result, Dispatched::Failed(ref m) if m.contains("no debug session")));
}
