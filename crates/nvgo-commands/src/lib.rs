//! Editor commands for nvgo.
//!
//! A [`Session`] holds the per-editor state every command shares: build
//! context, diagnostic aggregator, configuration and owned terminals.
//! Commands implement [`Command`] and are collected in a
//! [`CommandRegistry`]; the [`Dispatcher`] runs them under a cancellation
//! scope and routes their [`Outcome`] to the error list. The
//! [`Orchestrator`] drives the same commands from buffer events.

pub mod autocmd;
pub mod commands;
pub mod dispatcher;
pub mod gosrc;
pub mod outcome;
pub mod registry;
pub mod session;

pub use autocmd::{Orchestrator, PostWrite};
pub use dispatcher::{Dispatched, Dispatcher};
pub use outcome::{AutocmdEval, CommandArgs, Eval, Outcome};
pub use registry::{BoxedCommand, BoxedFunction, Command, CommandRegistry, Function, COMMAND_EVAL};
pub use session::{RunRequest, Session};
