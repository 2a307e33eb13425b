//! Command and function registries.

use crate::outcome::{CommandArgs, Outcome};
use crate::session::Session;
use async_trait::async_trait;
use nvgo_core::{Config, CoreResult};
use nvgo_rpc::{CommandOpts, HandlerSpec, Nargs};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Eval bundle sent with every command.
pub const COMMAND_EVAL: &str = "{'cwd': getcwd(), 'file': expand('%:p')}";

/// An editor command.
#[async_trait]
pub trait Command: Send + Sync {
    /// Name the editor registers, e.g. `GoBuild`.
    fn name(&self) -> &'static str;

    /// Producer under which diagnostics are stored. Commands without one
    /// never touch the error list.
    fn producer(&self) -> Option<&'static str> {
        None
    }

    fn opts(&self) -> CommandOpts {
        command_opts(Nargs::Zero)
    }

    /// Leave the cursor in the source window when the list opens.
    fn keep_cursor(&self, _args: &CommandArgs, _config: &Config) -> bool {
        false
    }

    /// Run the command. It must give up promptly once `cancel` fires.
    async fn run(&self, session: &Session, args: CommandArgs, cancel: CancellationToken) -> CoreResult<Outcome>;

    /// Called after diagnostics have been published.
    async fn after_publish(&self, _session: &Session, _args: &CommandArgs) -> CoreResult<()> {
        Ok(())
    }
}

/// An editor function returning a value.
#[async_trait]
pub trait Function: Send + Sync {
    fn name(&self) -> &'static str;

    fn eval(&self) -> Option<&'static str> {
        None
    }

    async fn call(&self, session: &Session, args: Vec<Value>, eval: Option<Value>) -> CoreResult<Value>;
}

pub type BoxedCommand = Arc<dyn Command>;
pub type BoxedFunction = Arc<dyn Function>;

/// Options with the standard eval bundle.
pub fn command_opts(nargs: Nargs) -> CommandOpts {
    CommandOpts {
        nargs,
        range: None,
        bang: false,
        eval: Some(COMMAND_EVAL.to_string()),
        complete: None,
    }
}

/// Registry of available commands and functions.
#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, BoxedCommand>,
    functions: BTreeMap<String, BoxedFunction>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in command and function.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::commands::register_builtins(&mut registry);
        registry
    }

    pub fn register(&mut self, command: BoxedCommand) {
        self.commands.insert(command.name().to_string(), command);
    }

    pub fn register_function(&mut self, function: BoxedFunction) {
        self.functions.insert(function.name().to_string(), function);
    }

    pub fn get(&self, name: &str) -> Option<&BoxedCommand> {
        self.commands.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&BoxedFunction> {
        self.functions.get(name)
    }

    /// Command names, ascending.
    pub fn list(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }

    /// Registration entries for every command and function.
    pub fn specs(&self) -> Vec<HandlerSpec> {
        let commands = self.commands.values().map(|c| HandlerSpec::Command {
            name: c.name().to_string(),
            sync: false,
            opts: c.opts(),
        });
        let functions = self.functions.values().map(|f| HandlerSpec::Function {
            name: f.name().to_string(),
            sync: true,
            eval: f.eval().map(str::to_string),
        });
        commands.chain(functions).collect()
    }
}
