//! Courier core library.
//!
//! Shared building blocks for the broker daemon and the CLI: the wire
//! envelope and newline-delimited frame codec, configuration resolution,
//! error types, and tracing initialization.

pub mod config;
pub mod envelope;
pub mod error;
pub mod tracing_init;

pub use envelope::{CORRELATION_FIELD, Envelope, InboundFrame};
pub use error::{Error, Result};
