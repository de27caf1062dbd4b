//! Error types and JSON-RPC error codes seen by the MCP client.

use std::time::Duration;

use context7_docker::WrapperError;

use super::message::JsonRpcErrorObject;

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// All errors that can occur while talking to the containerized server.
#[derive(thiserror::Error, Debug)]
pub enum McpError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The server answered with a JSON-RPC error object.
    #[error("Server error {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Server closed its output before answering")]
    Closed,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Wrapper(#[from] WrapperError),
}

impl McpError {
    /// JSON-RPC code equivalent of this error.
    pub fn code(&self) -> i32 {
        use error_codes::*;
        match self {
            McpError::ParseError(_) | McpError::Json(_) => PARSE_ERROR,
            McpError::InvalidResponse(_) => INVALID_REQUEST,
            McpError::Remote { code, .. } => *code,
            McpError::Timeout(_)
            | McpError::Closed
            | McpError::Transport(_)
            | McpError::Io(_)
            | McpError::Wrapper(_) => INTERNAL_ERROR,
        }
    }

    /// Whether the error came from the server rather than the channel.
    pub fn is_remote(&self) -> bool {
        matches!(self, McpError::Remote { .. })
    }
}

impl From<JsonRpcErrorObject> for McpError {
    fn from(e: JsonRpcErrorObject) -> Self {
        McpError::Remote {
            code: e.code,
            message: e.message,
        }
    }
}

pub type McpResult<T> = Result<T, McpError>;
