//! Context7 Docker MCP: build, register, probe, and verify the Context7 MCP
//! server packaged as a resource-limited container.

pub mod output;
pub mod probe;
pub mod repl;
pub mod toolkit;
pub mod transport;
pub mod types;
pub mod verify;

pub use toolkit::{BuildSummary, CleanSummary, Toolkit};
pub use transport::{McpChannel, StdioChannel};
pub use verify::{CheckOutcome, Suite, VerificationReport, Verifier};
