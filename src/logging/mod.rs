//! Structured logging through `tracing`.

mod format;

pub use format::StructuredLogger;
