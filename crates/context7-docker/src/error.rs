//! Errors raised while driving the container runtime and the host CLI.

/// Errors that can occur in the wrapper library.
#[derive(thiserror::Error, Debug)]
pub enum WrapperError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Required tool not found on PATH: {0}")]
    ToolMissing(String),

    #[error("`{program}` exited with {}: {stderr}", code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type WrapperResult<T> = Result<T, WrapperError>;
