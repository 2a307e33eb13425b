//! Shared utilities for nvgo.
//!
//! This crate provides common utilities used across the nvgo workspace:
//! - Logging setup errors
//! - Logging setup with tracing
//! - Path utilities

pub mod error;
pub mod log;
pub mod path;

pub use error::{Error, Result};
pub use log::{LogConfig, LogLevel, LogTarget};
