//! Buffer lifecycle pipelines.
//!
//! Pre-write runs `iferr` to completion and starts `format` in the
//! background; post-write waits for that format result before it fans
//! out the enabled autosave producers and publishes their merged
//! diagnostics once.

use crate::commands::{
    BuildCommand, FormatCommand, IferrCommand, LintCommand, MetalintCommand, TestCommand, VetCommand,
};
use crate::dispatcher::Dispatcher;
use crate::outcome::{AutocmdEval, CommandArgs, Outcome};
use crate::registry::{BoxedCommand, Command};
use crate::session::Session;
use futures::future::join_all;
use nvgo_core::{Config, CoreError, CoreResult};
use nvgo_editor::{Buffer, Window};
use nvgo_rpc::HandlerSpec;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

pub const BUF_ENTER: &str = "BufEnter";
pub const BUF_WRITE_PRE: &str = "BufWritePre";
pub const BUF_WRITE_POST: &str = "BufWritePost";
pub const VIM_LEAVE: &str = "VimLeavePre";

/// Eval bundle sent with every buffer event.
pub const AUTOCMD_EVAL: &str =
    "{'bufnr': bufnr('%'), 'winid': win_getid(), 'cwd': getcwd(), 'file': expand('%:p'), 'dir': expand('%:p:h')}";

const FORMAT_PRODUCER: &str = "Format";

type FormatResult = CoreResult<Outcome>;

/// How a post-write pipeline ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostWrite {
    /// Format reported problems; nothing else ran.
    FormatFailed(usize),
    /// Autosave producers ran; the list now has this many entries.
    Published(usize),
    Cancelled,
}

/// Binds editor lifecycle events to command pipelines.
pub struct Orchestrator {
    dispatcher: Arc<Dispatcher>,
    pending_format: Mutex<HashMap<PathBuf, oneshot::Receiver<FormatResult>>>,
}

impl Orchestrator {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            pending_format: Mutex::new(HashMap::new()),
        }
    }

    fn session(&self) -> &Arc<Session> {
        self.dispatcher.session()
    }

    /// Registration entries for the events handled here.
    pub fn specs() -> Vec<HandlerSpec> {
        [
            (BUF_ENTER, false, "*.go"),
            (BUF_WRITE_PRE, true, "*.go"),
            (BUF_WRITE_POST, false, "*.go"),
            (VIM_LEAVE, true, "*"),
        ]
        .into_iter()
        .map(|(name, sync, pattern)| HandlerSpec::Autocmd {
            name: name.to_string(),
            sync,
            pattern: pattern.to_string(),
            eval: Some(AUTOCMD_EVAL.to_string()),
        })
        .collect()
    }

    /// Route an `autocmd:<event>` request.
    pub async fn handle(&self, event: &str, eval: AutocmdEval) -> CoreResult<()> {
        match event {
            BUF_ENTER => self.on_buffer_enter(&eval).await,
            BUF_WRITE_PRE => self.on_pre_write(&eval).await,
            BUF_WRITE_POST => self.on_post_write(&eval).await.map(|_| ()),
            VIM_LEAVE => {
                self.on_leave().await;
                Ok(())
            }
            other => Err(CoreError::not_found(format!("unknown autocmd: {other}"))),
        }
    }

    /// Materialise configuration on first entry, then track the build
    /// context of the entered buffer.
    pub async fn on_buffer_enter(&self, eval: &AutocmdEval) -> CoreResult<()> {
        let session = self.session();
        if let Err(e) = session.load_editor_config().await {
            warn!(error = %e, "Failed to read editor configuration");
        }

        session
            .context()
            .set_handles(Buffer(eval.bufnr), Window(eval.winid));
        match session.context().set_context(&eval.directory()) {
            Ok(_) => {}
            Err(CoreError::NoPackage { dir }) => debug!(dir = %dir, "Buffer outside any package"),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Run `iferr` to completion, then start formatting in the background.
    pub async fn on_pre_write(&self, eval: &AutocmdEval) -> CoreResult<()> {
        let session = Arc::clone(self.session());
        let config = session.config();
        let command_eval = eval.command_eval();
        if !command_eval.has_file() {
            return Ok(());
        }

        if config.iferr.autosave {
            let args = CommandArgs::for_autosave(command_eval.clone());
            match IferrCommand.run(&session, args, session.child_token()).await {
                Ok(_) => {}
                Err(e) if e.is_cancelled() => return Ok(()),
                Err(e) => warn!(error = %e, "iferr on save failed"),
            }
        }

        if config.format.autosave {
            let (tx, rx) = oneshot::channel();
            self.pending_format
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(command_eval.file.clone(), rx);

            let args = CommandArgs::for_autosave(command_eval);
            let cancel = session.child_token();
            tokio::spawn(async move {
                let result = FormatCommand.run(&session, args, cancel).await;
                let _ = tx.send(result);
            });
        }
        Ok(())
    }

    /// Await formatting, then run every enabled autosave producer and
    /// publish once.
    pub async fn on_post_write(&self, eval: &AutocmdEval) -> CoreResult<PostWrite> {
        let session = Arc::clone(self.session());
        let command_eval = eval.command_eval();
        let cancel = session.child_token();
        let aggregator = session.aggregator();
        let errlist = session.errlist();

        let pending = self
            .pending_format
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&command_eval.file);
        if let Some(rx) = pending {
            let ticket = aggregator.begin(FORMAT_PRODUCER);
            match rx.await {
                Ok(Ok(Outcome::Diagnostics(diagnostics))) => {
                    let count = diagnostics.len();
                    aggregator.store_ticketed(&ticket, diagnostics);
                    aggregator.publish(&errlist, true).await?;
                    return Ok(PostWrite::FormatFailed(count));
                }
                Ok(Ok(Outcome::Success)) => {
                    aggregator.remove_ticketed(&ticket);
                }
                Ok(Err(e)) if e.is_cancelled() => return Ok(PostWrite::Cancelled),
                Ok(Err(e)) => self.report("GoFmt", &e).await,
                Err(_) => debug!("Format task dropped its result"),
            }
        }

        let commands = autosave_commands(&session.config());
        debug!(count = commands.len(), "Running autosave producers");

        let runs = commands.into_iter().map(|command| {
            let session = Arc::clone(&session);
            let args = CommandArgs::for_autosave(command_eval.clone());
            let cancel = cancel.clone();
            async move {
                let ticket = command.producer().map(|p| session.aggregator().begin(p));
                let result = tokio::select! {
                    result = command.run(&session, args, cancel.clone()) => result,
                    _ = cancel.cancelled() => Err(CoreError::Cancelled),
                };
                (command, ticket, result)
            }
        });
        let results = join_all(runs).await;

        if cancel.is_cancelled() {
            return Ok(PostWrite::Cancelled);
        }

        for (command, ticket, result) in results {
            let Some(ticket) = ticket else { continue };
            match result {
                Ok(Outcome::Success) => {
                    aggregator.remove_ticketed(&ticket);
                }
                Ok(Outcome::Diagnostics(diagnostics)) => {
                    aggregator.store_ticketed(&ticket, diagnostics);
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => self.report(command.name(), &e).await,
            }
        }

        let count = aggregator.publish(&errlist, true).await?;
        Ok(PostWrite::Published(count))
    }

    /// Cancel everything the session is running and release its windows.
    pub async fn on_leave(&self) {
        info!("Editor is leaving");
        self.pending_format
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.session().shutdown().await;
    }

    async fn report(&self, name: &str, err: &CoreError) {
        warn!(command = %name, error = %err, "Autosave command failed");
        let message = format!("{name}: {err}");
        let line = message.lines().next().unwrap_or_default();
        if let Err(e) = self.session().editor().echo_err(line).await {
            warn!(error = %e, "Failed to echo error");
        }
    }
}

/// Producers enabled for save, in a fixed order.
pub fn autosave_commands(config: &Config) -> Vec<BoxedCommand> {
    let mut commands: Vec<BoxedCommand> = Vec::new();
    if config.build.autosave {
        commands.push(Arc::new(BuildCommand));
    }
    if config.lint.autosave {
        commands.push(Arc::new(LintCommand));
    }
    if config.vet.autosave {
        commands.push(Arc::new(VetCommand));
    }
    if config.metalint.autosave {
        commands.push(Arc::new(MetalintCommand));
    }
    if config.test.autosave {
        commands.push(Arc::new(TestCommand));
    }
    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specs() {
        let specs = Orchestrator::specs();
        let methods: Vec<String> = specs.iter().map(HandlerSpec::method).collect();
        assert_eq!(
            methods,
            vec![
                "autocmd:BufEnter",
                "autocmd:BufWritePre",
                "autocmd:BufWritePost",
                "autocmd:VimLeavePre"
            ]
        );
        assert!(matches!(&specs[1], HandlerSpec::Autocmd { sync: true, pattern, .. } if pattern == "*.go"));
    }

    #[test]
    fn test_autosave_commands_follow_config() {
        assert!(autosave_commands(&Config::default()).is_empty());

        let mut config = Config::default();
        config.vet.autosave = true;
        config.build.autosave = true;
        let names: Vec<_> = autosave_commands(&config).iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["GoBuild", "GoVet"]);
    }
}
