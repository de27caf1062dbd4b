//! Host assistant adapter: `claude mcp add/remove/list`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Scope;
use crate::error::WrapperResult;
use crate::registration::RemovalOutcome;
use crate::runner::{CommandRunner, CommandSpec};
use crate::spawn::SpawnCommand;

pub const HOST_CLI: &str = "claude";

/// Health marker the host prints next to each registered server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum Health {
    Connected,
    Failed(String),
    Unknown(String),
}

impl Health {
    pub fn is_connected(&self) -> bool {
        matches!(self, Health::Connected)
    }

    fn parse(text: &str) -> Self {
        let text = text.trim();
        let bare = text
            .trim_start_matches(['✓', '✗', '⚠'])
            .trim();

        if text.starts_with('✓') || bare.eq_ignore_ascii_case("connected") {
            Health::Connected
        } else if text.starts_with('✗') || bare.to_ascii_lowercase().starts_with("failed") {
            Health::Failed(bare.to_string())
        } else {
            Health::Unknown(bare.to_string())
        }
    }
}

/// One server line from the host's registration listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    pub command: String,
    pub health: Health,
}

/// Parse `claude mcp list` output.
///
/// Server lines look like `name: <command> - ✓ Connected`; banner and blank
/// lines are skipped.
pub fn parse_listing(text: &str) -> Vec<RegistryEntry> {
    text.lines().filter_map(parse_listing_line).collect()
}

fn parse_listing_line(line: &str) -> Option<RegistryEntry> {
    let line = line.trim();
    let (name, rest) = line.split_once(": ")?;
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return None;
    }

    let (command, health) = match rest.rsplit_once(" - ") {
        Some((command, health)) => (command.trim(), Health::parse(health)),
        None => (rest.trim(), Health::Unknown(String::new())),
    };

    Some(RegistryEntry {
        name: name.to_string(),
        command: command.to_string(),
        health,
    })
}

/// Registration capability of the host assistant.
#[async_trait]
pub trait ProcessRegistrar: Send + Sync {
    async fn add(&self, name: &str, scope: Scope, command: &SpawnCommand) -> WrapperResult<()>;

    /// Remove a registration. A miss is reported, not raised.
    async fn remove(&self, name: &str) -> WrapperResult<RemovalOutcome>;

    async fn list(&self) -> WrapperResult<Vec<RegistryEntry>>;
}

/// `claude` CLI implementation of [`ProcessRegistrar`].
pub struct ClaudeCli<R> {
    runner: R,
    program: String,
}

impl<R: CommandRunner> ClaudeCli<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            program: HOST_CLI.to_string(),
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }
}

/// Argument vector for `claude mcp add`.
pub fn add_args(name: &str, scope: Scope, command: &SpawnCommand) -> Vec<String> {
    let mut args = vec![
        "mcp".to_string(),
        "add".to_string(),
        name.to_string(),
        "--scope".to_string(),
        scope.to_string(),
        "--".to_string(),
    ];
    args.extend(command.argv());
    args
}

#[async_trait]
impl<R: CommandRunner> ProcessRegistrar for ClaudeCli<R> {
    async fn add(&self, name: &str, scope: Scope, command: &SpawnCommand) -> WrapperResult<()> {
        let spec = CommandSpec::new(&self.program, add_args(name, scope, command));
        self.runner.run(&spec).await?.check(&self.program)?;
        tracing::info!("Registered '{name}' ({scope} scope)");
        Ok(())
    }

    async fn remove(&self, name: &str) -> WrapperResult<RemovalOutcome> {
        let spec = CommandSpec::new(&self.program, ["mcp", "remove", name]);
        let output = self.runner.run(&spec).await?;

        if output.success() {
            tracing::info!("Removed registration '{name}'");
            Ok(RemovalOutcome::Removed)
        } else {
            tracing::debug!(
                "'{name}' was not registered: {}",
                output.stderr.trim()
            );
            Ok(RemovalOutcome::NotPresent)
        }
    }

    async fn list(&self) -> WrapperResult<Vec<RegistryEntry>> {
        let spec = CommandSpec::new(&self.program, ["mcp", "list"]);
        let output = self.runner.run(&spec).await?.check(&self.program)?;
        Ok(parse_listing(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SecretMount, WrapperConfig};

    const LISTING: &str = "Checking MCP server health...

context7: docker run -i --rm --name context7-mcp --memory 2g --cpus 1 context7-mcp:latest --transport stdio - ✓ Connected
github: npx -y @modelcontextprotocol/server-github - ✗ Failed to connect
scratch: node server.js
";

    #[test]
    fn test_parse_listing() {
        let entries = parse_listing(LISTING);
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].name, "context7");
        assert!(entries[0].command.starts_with("docker run -i --rm"));
        assert!(entries[0].command.ends_with("--transport stdio"));
        assert!(entries[0].health.is_connected());

        assert_eq!(entries[1].name, "github");
        assert_eq!(
            entries[1].health,
            Health::Failed("Failed to connect".to_string())
        );

        assert_eq!(entries[2].command, "node server.js");
        assert!(!entries[2].health.is_connected());
    }

    #[test]
    fn test_parse_empty_listing() {
        let text = "No MCP servers configured. Use `claude mcp add` to add a server.\n";
        assert!(parse_listing(text).is_empty());
        assert!(parse_listing("").is_empty());
    }

    #[test]
    fn test_add_args() {
        let config = WrapperConfig {
            secret: SecretMount::new("/nonexistent/api_key"),
            ..Default::default()
        };
        let spawn = SpawnCommand::for_config(&config);
        let args = add_args("context7", Scope::User, &spawn);

        assert_eq!(
            &args[..6],
            &["mcp", "add", "context7", "--scope", "user", "--"]
        );
        assert_eq!(args[6], "docker");
        assert!(args.contains(&"--memory".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("stdio"));
    }
}
