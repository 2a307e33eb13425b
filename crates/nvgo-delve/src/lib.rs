//! Debugging Go programs from the editor through a headless delve server.
//!
//! - [`DelveServer`]: the server process and its connect loop
//! - [`DelveClient`]: JSON-RPC over the server's TCP listener
//! - [`DebugSession`]: panes, signs and the operations on a live session
//! - [`Debugger`]: the one-session slot the editor commands act on
//!
//! [`register`] adds the `Dlv*` commands to a command registry.

pub mod api;
pub mod commands;
pub mod console;
pub mod error;
pub mod panes;
pub mod render;
pub mod rpc;
pub mod server;
pub mod session;

pub use api::{Breakpoint, DebuggerState, ExecCommand, Location, Stackframe, Thread};
pub use commands::register;
pub use console::ConsoleCommand;
pub use error::{DelveError, DelveResult};
pub use panes::{Pane, PaneKind, PaneLayout, Panes};
pub use rpc::DelveClient;
pub use server::{DelveServer, ServerSpec, StartMode};
pub use session::{DebugSession, Debugger};
