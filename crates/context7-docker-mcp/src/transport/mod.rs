//! Transport layer for talking to the containerized server.

pub mod framing;
pub mod stdio;

pub use stdio::{exchange_over, Exchange, McpChannel, StdioChannel};
