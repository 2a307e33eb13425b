//! Runs commands with cancellation and routes their results.
//!
//! Each dispatch gets its own cancellation scope derived from the
//! session. The handler runs on a background task; whichever finishes
//! first, the handler or the scope, decides the outcome. A cancelled
//! handler is abandoned and nothing it produced reaches the error list.

use crate::outcome::{CommandArgs, Outcome};
use crate::registry::{BoxedCommand, CommandRegistry};
use crate::session::Session;
use nvgo_core::{CoreError, CoreResult, Ticket};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How a dispatch ended, for callers and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    Success,
    /// Diagnostics were published; the count is the full list length.
    Published(usize),
    /// An error was echoed to the user.
    Failed(String),
    Cancelled,
}

pub struct Dispatcher {
    session: Arc<Session>,
    registry: Arc<CommandRegistry>,
}

impl Dispatcher {
    pub fn new(session: Arc<Session>, registry: Arc<CommandRegistry>) -> Self {
        Self { session, registry }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Run command `name` to completion and route its result.
    pub async fn dispatch(&self, name: &str, args: CommandArgs) -> CoreResult<Dispatched> {
        let command = self
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("unknown command: {name}")))?;

        if !command.opts().nargs.accepts(args.args.len()) {
            let message = format!("{name}: wrong number of arguments");
            self.echo_failure(&message).await;
            return Ok(Dispatched::Failed(message));
        }

        let cancel = self.session.child_token();
        self.dispatch_with(command, args, cancel).await
    }

    /// Run `command` under an explicit scope.
    pub async fn dispatch_with(
        &self,
        command: BoxedCommand,
        args: CommandArgs,
        cancel: CancellationToken,
    ) -> CoreResult<Dispatched> {
        let name = command.name();
        let ticket = command.producer().map(|p| self.session.aggregator().begin(p));
        debug!(command = %name, "Dispatching command");

        let mut handle = {
            let session = Arc::clone(&self.session);
            let command = Arc::clone(&command);
            let args = args.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { command.run(&session, args, cancel).await })
        };

        let result = tokio::select! {
            joined = &mut handle => match joined {
                Ok(result) => result,
                Err(e) => Err(CoreError::invalid_argument(format!("command task failed: {e}"))),
            },
            _ = cancel.cancelled() => {
                handle.abort();
                debug!(command = %name, "Command cancelled");
                return Ok(Dispatched::Cancelled);
            }
        };

        self.route(&command, ticket, &args, result).await
    }

    async fn route(
        &self,
        command: &BoxedCommand,
        ticket: Option<Ticket>,
        args: &CommandArgs,
        result: CoreResult<Outcome>,
    ) -> CoreResult<Dispatched> {
        let name = command.name();
        let aggregator = self.session.aggregator();

        match result {
            Err(e) if e.is_cancelled() => Ok(Dispatched::Cancelled),
            Err(e) => {
                let message = format!("{name}: {e}");
                warn!(command = %name, error = %e, "Command failed");
                self.echo_failure(&message).await;
                Ok(Dispatched::Failed(message))
            }
            Ok(outcome) => {
                let Some(ticket) = ticket else {
                    return Ok(Dispatched::Success);
                };

                let published = match outcome {
                    Outcome::Success => {
                        aggregator.remove_ticketed(&ticket);
                        None
                    }
                    Outcome::Diagnostics(diagnostics) => {
                        aggregator.store_ticketed(&ticket, diagnostics);
                        Some(())
                    }
                };

                let keep_cursor = command.keep_cursor(args, &self.session.config());
                let count = aggregator
                    .publish(&self.session.errlist(), keep_cursor)
                    .await?;

                match published {
                    None => Ok(Dispatched::Success),
                    Some(()) => {
                        command.after_publish(&self.session, args).await?;
                        Ok(Dispatched::Published(count))
                    }
                }
            }
        }
    }

    /// Call function `name` and return its value.
    pub async fn call_function(&self, name: &str, args: Vec<Value>, eval: Option<Value>) -> CoreResult<Value> {
        let function = self
            .registry
            .function(name)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("unknown function: {name}")))?;
        function.call(&self.session, args, eval).await
    }

    async fn echo_failure(&self, message: &str) {
        let line = message.lines().next().unwrap_or_default();
        if let Err(e) = self.session.editor().echo_err(line).await {
            warn!(error = %e, "Failed to echo error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Eval;
    use crate::registry::Command;
    use async_trait::async_trait;
    use nvgo_core::{Config, Diagnostic, Environment};
    use nvgo_editor::ErrlistKind;
    use nvgo_test_utils::FakeEditor;
    use std::time::Duration;

    enum Behavior {
        Report(Vec<Diagnostic>),
        Succeed,
        Fail,
        Hang,
        Delayed(Duration, Vec<Diagnostic>),
    }

    struct Scripted {
        behavior: Behavior,
    }

    #[async_trait]
    impl Command for Scripted {
        fn name(&self) -> &'static str {
            "GoVet"
        }

        fn producer(&self) -> Option<&'static str> {
            Some("Vet")
        }

        fn opts(&self) -> nvgo_rpc::CommandOpts {
            crate::registry::command_opts(nvgo_rpc::Nargs::Any)
        }

        async fn run(&self, _: &Session, _: CommandArgs, cancel: CancellationToken) -> CoreResult<Outcome> {
            match &self.behavior {
                Behavior::Report(d) => Ok(Outcome::Diagnostics(d.clone())),
                Behavior::Succeed => Ok(Outcome::Success),
                Behavior::Fail => Err(CoreError::ToolMissing { tool: "vet".into() }),
                Behavior::Hang => {
                    cancel.cancelled().await;
                    Err(CoreError::Cancelled)
                }
                Behavior::Delayed(delay, d) => {
                    tokio::time::sleep(*delay).await;
                    Ok(Outcome::Diagnostics(d.clone()))
                }
            }
        }
    }

    fn setup(behavior: Behavior) -> (Arc<FakeEditor>, Dispatcher) {
        let fake = Arc::new(FakeEditor::new());
        let session = Arc::new(Session::new(fake.editor(), Config::default(), Environment::default()));
        let mut registry = CommandRegistry::new();
        registry.register(Arc::new(Scripted { behavior }));
        (fake, Dispatcher::new(session, Arc::new(registry)))
    }

    fn diag(text: &str) -> Diagnostic {
        Diagnostic::error("a.go", 1, 1, text).unwrap()
    }

    fn args() -> CommandArgs {
        CommandArgs::new(Eval::new("/p", "/p/a.go"))
    }

    #[tokio::test]
    async fn test_diagnostics_are_stored_and_published() {
        let (fake, dispatcher) = setup(Behavior::Report(vec![diag("shadow")]));
        let result = dispatcher.dispatch("GoVet", args()).await.unwrap();

        assert_eq!(result, Dispatched::Published(1));
        assert_eq!(fake.errlist(ErrlistKind::LocationList)[0].text, "shadow");
        assert_eq!(dispatcher.session().aggregator().producers(), vec!["Vet"]);
    }

    #[tokio::test]
    async fn test_success_clears_previous_diagnostics() {
        let (fake, dispatcher) = setup(Behavior::Succeed);
        dispatcher.session().aggregator().store("Vet", vec![diag("old")]);

        let result = dispatcher.dispatch("GoVet", args()).await.unwrap();
        assert_eq!(result, Dispatched::Success);
        assert!(fake.errlist(ErrlistKind::LocationList).is_empty());
        assert!(dispatcher.session().aggregator().snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_echoed() {
        let (fake, dispatcher) = setup(Behavior::Fail);
        let result = dispatcher.dispatch("GoVet", args()).await.unwrap();

        assert!(matches!(result, Dispatched::Failed(ref m) if m.starts_with("GoVet:")));
        assert!(fake.echoes().iter().any(|e| e.contains("vet")));
    }

    #[tokio::test]
    async fn test_cancelled_dispatch_leaves_aggregator_untouched() {
        let (fake, dispatcher) = setup(Behavior::Hang);
        dispatcher.session().aggregator().store("Vet", vec![diag("kept")]);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let command = dispatcher.registry().get("GoVet").cloned().unwrap();
        let result = dispatcher.dispatch_with(command, args(), cancel).await.unwrap();

        assert_eq!(result, Dispatched::Cancelled);
        assert_eq!(dispatcher.session().aggregator().snapshot()[0].text, "kept");
        assert!(fake.echoes().is_empty());
    }

    #[tokio::test]
    async fn test_session_cancel_reaches_dispatch() {
        let (_fake, dispatcher) = setup(Behavior::Hang);
        let session = Arc::clone(dispatcher.session());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            session.cancel_token().cancel();
        });

        let result = dispatcher.dispatch("GoVet", args()).await.unwrap();
        assert_eq!(result, Dispatched::Cancelled);
    }

    #[tokio::test]
    async fn test_later_run_of_same_producer_wins() {
        let (fake, dispatcher) = setup(Behavior::Succeed);
        let slow: BoxedCommand = Arc::new(Scripted {
            behavior: Behavior::Delayed(Duration::from_millis(200), vec![diag("stale")]),
        });
        let fast: BoxedCommand = Arc::new(Scripted {
            behavior: Behavior::Delayed(Duration::from_millis(10), vec![diag("fresh")]),
        });

        let first = dispatcher.dispatch_with(slow, args(), CancellationToken::new());
        let second = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            dispatcher
                .dispatch_with(fast, args(), CancellationToken::new())
                .await
        };
        let (first, second) = tokio::join!(first, second);
        first.unwrap();
        assert_eq!(second.unwrap(), Dispatched::Published(1));

        let stored = dispatcher.session().aggregator().get("Vet").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].text, "fresh");
        let list = fake.errlist(ErrlistKind::LocationList);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].text, "fresh");
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let (_fake, dispatcher) = setup(Behavior::Succeed);
        let err = dispatcher.dispatch("GoNope", args()).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_wrong_arity_is_reported() {
        let fake = Arc::new(FakeEditor::new());
        let session = Arc::new(Session::new(fake.editor(), Config::default(), Environment::default()));
        let dispatcher = Dispatcher::new(session, Arc::new(CommandRegistry::with_builtins()));

        let result = dispatcher
            .dispatch("GoByteOffset", args().with_args(["extra"]))
            .await
            .unwrap();
        assert!(matches!(result, Dispatched::Failed(_)));
    }
}
