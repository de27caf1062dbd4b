//! Blocking-style invocation of external CLIs.
//!
//! Every external tool (`docker`, `claude`) is reached through
//! [`CommandRunner`], so adapters can be exercised against scripted output.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{WrapperError, WrapperResult};

/// One invocation of an external program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Space-joined form for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Convert a non-zero exit into [`WrapperError::CommandFailed`].
    pub fn check(self, program: &str) -> WrapperResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(WrapperError::CommandFailed {
                program: program.to_string(),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs external commands to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> WrapperResult<CommandOutput>;
}

/// Runner backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> WrapperResult<CommandOutput> {
        tracing::debug!("exec: {}", spec.display());

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => WrapperError::ToolMissing(spec.program.clone()),
            _ => WrapperError::Io(e),
        })?;

        if let Some(input) = &spec.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await?;
                stdin.shutdown().await?;
            }
        }

        let output = child.wait_with_output().await?;
        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        tracing::debug!("exit: {:?} ({})", result.code, spec.program);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_stdin() {
        let spec = CommandSpec::new("docker", ["build", "-t", "context7-mcp:latest", "-"])
            .with_stdin("FROM scratch\n");
        assert_eq!(spec.display(), "docker build -t context7-mcp:latest -");
        assert_eq!(spec.stdin.as_deref(), Some("FROM scratch\n"));
    }

    #[test]
    fn test_check_maps_failure() {
        let ok = CommandOutput {
            code: Some(0),
            ..Default::default()
        };
        assert!(ok.check("docker").is_ok());

        let failed = CommandOutput {
            code: Some(125),
            stdout: String::new(),
            stderr: "no such image\n".to_string(),
        };
        match failed.check("docker") {
            Err(WrapperError::CommandFailed {
                program,
                code,
                stderr,
            }) => {
                assert_eq!(program, "docker");
                assert_eq!(code, Some(125));
                assert_eq!(stderr, "no such image");
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_tool_missing() {
        let spec = CommandSpec::new("context7-docker-definitely-not-installed", ["--version"]);
        let result = SystemRunner.run(&spec).await;
        assert!(matches!(result, Err(WrapperError::ToolMissing(_))));
    }
}
