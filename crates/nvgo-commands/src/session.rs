//! Per-editor session state shared by every command.

use crate::outcome::Eval;
use nvgo_core::{
    Aggregator, BuildContext, Config, ContextState, CoreResult, Environment, ParseOptions,
    ToolInvocation,
};
use nvgo_editor::{Editor, ErrorList, Terminal};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Terminal command and directory of the last `GoRun`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub command: Vec<String>,
    pub cwd: PathBuf,
}

/// Everything one editor instance's commands share.
///
/// Construction order is fixed: build context, then aggregator, then the
/// command registry and autocmd orchestrator borrow this value.
pub struct Session {
    editor: Editor,
    context: BuildContext,
    aggregator: Aggregator,
    base_env: Environment,
    config: RwLock<Arc<Config>>,
    editor_config_loaded: AtomicBool,
    cancel: CancellationToken,
    run_terminal: tokio::sync::Mutex<Terminal>,
    test_terminal: tokio::sync::Mutex<Terminal>,
    last_run: Mutex<Option<RunRequest>>,
    coverage_ns: tokio::sync::OnceCell<i64>,
}

impl Session {
    pub fn new(editor: Editor, config: Config, env: Environment) -> Self {
        let layout = config.terminal.layout();
        Self {
            context: BuildContext::new(config.environment(env.clone())),
            aggregator: Aggregator::new(),
            base_env: env,
            run_terminal: tokio::sync::Mutex::new(Terminal::new(editor.clone(), "GoRun", layout.clone())),
            test_terminal: tokio::sync::Mutex::new(Terminal::new(editor.clone(), "GoTest", layout)),
            editor,
            config: RwLock::new(Arc::new(config)),
            editor_config_loaded: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            last_run: Mutex::new(None),
            coverage_ns: tokio::sync::OnceCell::new(),
        }
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Replace the configuration; the resolver environment follows it.
    pub fn set_config(&self, config: Config) {
        self.context.set_environment(config.environment(self.base_env.clone()));
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(config);
    }

    /// Merge editor variables into the configuration, once per session.
    pub async fn load_editor_config(&self) -> CoreResult<bool> {
        if self.editor_config_loaded.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        let merged = self.config().with_editor_vars(&self.editor).await?;
        self.set_config(merged);
        info!("Loaded editor configuration");
        Ok(true)
    }

    /// The session scope; cancelling it cancels every running command.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// A per-request scope derived from the session scope.
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// The error list configured for this session.
    pub fn errlist(&self) -> ErrorList {
        ErrorList::new(self.editor.clone(), self.config().global.errlist_type)
    }

    /// Build context for the buffer described by `eval`.
    pub fn context_for(&self, eval: &Eval) -> CoreResult<ContextState> {
        self.context.for_directory(&eval.dir())
    }

    /// Invocation of `tool` with configured binary overrides and the
    /// environment the build context requires.
    pub fn tool(&self, tool: &str, state: &ContextState, cancel: &CancellationToken) -> ToolInvocation {
        let config = self.config();
        ToolInvocation::new(config.tools.binary(tool))
            .envs(config.tool_env())
            .envs(state.tool_env())
            .cancel(cancel.clone())
    }

    /// Parser options for output of a tool run in `tool_dir`, with paths
    /// reported against the editor's cwd.
    pub fn parse_options(&self, tool_dir: &Path, state: &ContextState, eval: &Eval) -> ParseOptions {
        let env = self.context.environment();
        ParseOptions::for_context(tool_dir, state, env.language_root())
            .with_display_root(eval.cwd.clone())
    }

    /// Argument vector for running `tool` in a terminal. The terminal does
    /// not inherit invocation environment, so it is spelled out via `env`.
    pub fn terminal_command(&self, tool: &str, state: &ContextState, args: &[String]) -> Vec<String> {
        let config = self.config();
        let env: Vec<String> = config
            .tool_env()
            .into_iter()
            .chain(state.tool_env())
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let mut command = Vec::new();
        if !env.is_empty() {
            command.push("env".to_string());
            command.extend(env);
        }
        command.push(config.tools.binary(tool).to_string());
        command.extend(args.iter().cloned());
        command
    }

    pub fn run_terminal(&self) -> &tokio::sync::Mutex<Terminal> {
        &self.run_terminal
    }

    pub fn test_terminal(&self) -> &tokio::sync::Mutex<Terminal> {
        &self.test_terminal
    }

    pub fn last_run(&self) -> Option<RunRequest> {
        self.last_run.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_last_run(&self, request: RunRequest) {
        *self.last_run.lock().unwrap_or_else(|e| e.into_inner()) = Some(request);
    }

    /// Highlight namespace for coverage, created on first use.
    pub async fn coverage_namespace(&self) -> CoreResult<i64> {
        let ns = self
            .coverage_ns
            .get_or_try_init(|| self.editor.create_namespace("nvgo-coverage"))
            .await?;
        Ok(*ns)
    }

    /// Cancel all work and close owned terminals.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        for terminal in [&self.run_terminal, &self.test_terminal] {
            if let Err(e) = terminal.lock().await.close().await {
                tracing::debug!(error = %e, "Terminal already gone");
            }
        }
    }
}
