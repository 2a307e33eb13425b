//! Editor RPC channel for nvgo.
//!
//! The editor launches the sidecar and talks to it over stdio using
//! newline-delimited JSON-RPC 2.0. The channel is bidirectional:
//!
//! 1. **Handlers**: the editor invokes `command:<Name>`, `function:<Name>`
//!    and `autocmd:<Event>` methods registered through the manifest.
//! 2. **Host API**: the sidecar issues `nvim_*` requests back to the editor
//!    to read buffers, set lists, open terminals and echo messages.
//!
//! Both directions share one stream; responses are correlated by id.

mod transport;
pub mod types;

pub use transport::{IncomingMessage, Transport, TransportError, DEFAULT_REQUEST_TIMEOUT};
pub use types::*;
