//! Core utilities shared by the cobalt crates.
//!
//! This crate provides foundational pieces used across the workspace:
//! - Logging initialization on top of `tracing-subscriber`
//! - Contract-check macros ([`check!`]) for programmer errors
//!
//! Library crates only *emit* events through `tracing`; installing a
//! subscriber is left to the binary that owns the process.

mod check;
mod logging;

pub use logging::{LoggingConfig, init_logging, init_logging_with};

#[doc(hidden)]
pub mod __private {
    pub use tracing;
}
