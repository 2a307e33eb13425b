//! Core logic for nvgo.
//!
//! This crate provides everything between the editor surface and the
//! commands:
//! - Diagnostic model and the compiler-output parser
//! - Build context resolution (Modular vs ProjectStyle trees)
//! - Cancellable external tool invocations
//! - Per-producer diagnostic aggregation into the error list
//! - Configuration management (JSONC file plus editor variables)

pub mod aggregator;
pub mod config;
pub mod context;
pub mod diagnostic;
pub mod error;
pub mod parse;
pub mod runner;

pub use aggregator::{Aggregator, Ticket};
pub use config::Config;
pub use context::{BuildContext, ContextState, Environment, Resolution, Tool};
pub use diagnostic::{Diagnostic, DiagnosticSet, Severity};
pub use error::{ConfigError, CoreError, CoreResult};
pub use parse::{parse, ParseOptions};
pub use runner::{ToolInvocation, ToolOutput};
