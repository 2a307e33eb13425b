//! Typed editor surface for nvgo.
//!
//! Every operation here is a thin request to the host editor:
//! - [`Editor`]: buffers, windows, variables, echo, highlights
//! - [`Batch`]: several calls flushed atomically
//! - [`ErrorList`]: location or quickfix list
//! - [`Terminal`]: reusable terminal buffers
//! - [`Sign`]: sign column markers
//!
//! The host is reached through the [`EditorClient`] trait so tests can
//! substitute an in-memory editor.

pub mod batch;
pub mod client;
pub mod diff;
pub mod editor;
pub mod errlist;
pub mod error;
pub mod sign;
pub mod terminal;

pub use batch::Batch;
pub use client::{EditorClient, RpcClient};
pub use diff::{minimal_replacement, Replacement};
pub use editor::{byte_offset, hl, Buffer, Cursor, Editor, Window};
pub use errlist::{ErrlistItem, ErrlistKind, ErrorList, ListAction};
pub use error::{EditorError, EditorResult};
pub use sign::Sign;
pub use terminal::{SplitMode, Terminal, TerminalLayout};
