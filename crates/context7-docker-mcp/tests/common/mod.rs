//! In-memory stand-ins for docker, the host CLI, and the containerized server.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use context7_docker::{
    BuildOptions, CommandOutput, ContainerRuntime, Health, ImageBuilder, ImageFacts, ImageRecipe,
    ImageRef, ProcessRegistrar, RegistryEntry, RemovalOutcome, ResourceLimits, Scope,
    SecretMount, SpawnCommand, WrapperConfig, WrapperError, WrapperResult,
};
use context7_docker_mcp::transport::{Exchange, McpChannel};
use context7_docker_mcp::types::*;

// ─────────────────────── config ───────────────────────

/// Default configuration with a secret path that never exists.
pub fn test_config() -> WrapperConfig {
    WrapperConfig {
        secret: SecretMount::new("/nonexistent/context7/api_key"),
        ..Default::default()
    }
}

pub fn tool(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema: Some(json!({ "type": "object" })),
    }
}

pub fn context7_tools() -> Vec<ToolDefinition> {
    vec![
        tool(
            TOOL_RESOLVE_LIBRARY_ID,
            "Resolves a package name to a Context7-compatible library ID",
        ),
        tool(
            TOOL_GET_LIBRARY_DOCS,
            "Fetches up-to-date documentation for a library",
        ),
    ]
}

// ─────────────────────── docker ───────────────────────

pub struct FakeDocker {
    pub size_bytes: u64,
    pub architecture: String,
    pub user: String,
    /// Memory limit reported back; `None` echoes the requested limit.
    pub memory_override: Option<u64>,
    pub help_output: String,
    pub image_present: Mutex<bool>,
    pub builds: Mutex<Vec<BuildOptions>>,
    pub removed_containers: Mutex<Vec<String>>,
}

impl Default for FakeDocker {
    fn default() -> Self {
        Self {
            size_bytes: 182_000_000,
            architecture: "arm64".to_string(),
            user: "context7".to_string(),
            memory_override: None,
            help_output: "Usage: context7-mcp [options]\n\nOptions:\n  --transport <stdio|http>\n"
                .to_string(),
            image_present: Mutex::new(true),
            builds: Mutex::new(Vec::new()),
            removed_containers: Mutex::new(Vec::new()),
        }
    }
}

fn not_found(what: &str) -> WrapperError {
    WrapperError::CommandFailed {
        program: "docker".to_string(),
        code: Some(1),
        stderr: format!("Error: No such image: {what}"),
    }
}

#[async_trait]
impl ImageBuilder for FakeDocker {
    async fn build(
        &self,
        _recipe: &ImageRecipe,
        _image: &ImageRef,
        options: &BuildOptions,
    ) -> WrapperResult<()> {
        self.builds.lock().unwrap().push(options.clone());
        *self.image_present.lock().unwrap() = true;
        Ok(())
    }

    async fn inspect(&self, image: &ImageRef) -> WrapperResult<ImageFacts> {
        if !*self.image_present.lock().unwrap() {
            return Err(not_found(&image.to_string()));
        }
        Ok(ImageFacts {
            size_bytes: self.size_bytes,
            architecture: self.architecture.clone(),
            os: "linux".to_string(),
        })
    }

    async fn remove(&self, image: &ImageRef) -> WrapperResult<()> {
        let mut present = self.image_present.lock().unwrap();
        if !*present {
            return Err(not_found(&image.to_string()));
        }
        *present = false;
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeDocker {
    async fn default_user(&self, _image: &ImageRef) -> WrapperResult<String> {
        Ok(self.user.clone())
    }

    async fn memory_limit(
        &self,
        _image: &ImageRef,
        _container_name: &str,
        limits: &ResourceLimits,
    ) -> WrapperResult<u64> {
        match self.memory_override {
            Some(bytes) => Ok(bytes),
            None => limits.memory_bytes(),
        }
    }

    async fn run_once(&self, spawn: &SpawnCommand) -> WrapperResult<CommandOutput> {
        let help = spawn.args.iter().any(|a| a == "--help");
        Ok(CommandOutput {
            code: Some(0),
            stdout: if help { self.help_output.clone() } else { String::new() },
            stderr: String::new(),
        })
    }

    async fn remove_container(&self, name: &str) -> WrapperResult<bool> {
        self.removed_containers.lock().unwrap().push(name.to_string());
        Ok(true)
    }
}

// ─────────────────────── host registry ───────────────────────

/// Registry that behaves like `claude mcp`: adding an existing name fails.
pub struct FakeRegistrar {
    pub entries: Mutex<Vec<RegistryEntry>>,
    pub healthy: bool,
    pub calls: Mutex<Vec<String>>,
}

impl Default for FakeRegistrar {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            healthy: true,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeRegistrar {
    pub fn names(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }
}

#[async_trait]
impl ProcessRegistrar for FakeRegistrar {
    async fn add(&self, name: &str, scope: Scope, command: &SpawnCommand) -> WrapperResult<()> {
        self.calls.lock().unwrap().push(format!("add {name} {scope}"));
        let mut entries = self.entries.lock().unwrap();
        if entries.iter().any(|e| e.name == name) {
            return Err(WrapperError::CommandFailed {
                program: "claude".to_string(),
                code: Some(1),
                stderr: format!("MCP server {name} already exists in {scope} config"),
            });
        }
        entries.push(RegistryEntry {
            name: name.to_string(),
            command: command.to_string(),
            health: if self.healthy {
                Health::Connected
            } else {
                Health::Failed("Failed to connect".to_string())
            },
        });
        Ok(())
    }

    async fn remove(&self, name: &str) -> WrapperResult<RemovalOutcome> {
        self.calls.lock().unwrap().push(format!("remove {name}"));
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| e.name != name);
        Ok(if entries.len() < before {
            RemovalOutcome::Removed
        } else {
            RemovalOutcome::NotPresent
        })
    }

    async fn list(&self) -> WrapperResult<Vec<RegistryEntry>> {
        Ok(self.entries.lock().unwrap().clone())
    }
}

// ─────────────────────── server ───────────────────────

/// How the fake server answers a `tools/call` made without network access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offline {
    RemoteError,
    ToolError,
    Success,
    Crash,
}

/// Answers requests the way the Context7 server does.
pub struct FakeServer {
    /// Successive `tools/list` answers; the last one repeats.
    pub listings: Mutex<VecDeque<Vec<ToolDefinition>>>,
    /// Lines written before the first answer.
    pub preamble: usize,
    pub offline: Offline,
    pub exit_code: Option<i32>,
    pub spawns: Mutex<Vec<SpawnCommand>>,
    pub sent: Mutex<Vec<Vec<String>>>,
}

impl Default for FakeServer {
    fn default() -> Self {
        Self {
            listings: Mutex::new(VecDeque::from([context7_tools()])),
            preamble: 0,
            offline: Offline::ToolError,
            exit_code: Some(0),
            spawns: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl FakeServer {
    pub fn with_listings(listings: Vec<Vec<ToolDefinition>>) -> Self {
        Self {
            listings: Mutex::new(listings.into()),
            ..Default::default()
        }
    }

    fn next_listing(&self) -> Vec<ToolDefinition> {
        let mut listings = self.listings.lock().unwrap();
        if listings.len() > 1 {
            listings.pop_front().unwrap_or_default()
        } else {
            listings.front().cloned().unwrap_or_default()
        }
    }

    fn answer(&self, spawn: &SpawnCommand, request: &JsonRpcRequest) -> McpResult<JsonRpcMessage> {
        let id = request.id.clone();
        let message = match request.method.as_str() {
            METHOD_TOOLS_LIST => JsonRpcMessage::Response(JsonRpcResponse::new(
                id,
                json!({ "tools": self.next_listing() }),
            )),
            METHOD_INITIALIZE => JsonRpcMessage::Response(JsonRpcResponse::new(
                id,
                json!({
                    "protocolVersion": MCP_VERSION,
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "Context7", "version": "1.0.13" }
                }),
            )),
            METHOD_TOOLS_CALL if spawn.flag_value("--network") == Some("none") => {
                match self.offline {
                    Offline::RemoteError => JsonRpcMessage::Error(JsonRpcError::new(
                        id,
                        error_codes::INTERNAL_ERROR,
                        "fetch failed".to_string(),
                    )),
                    Offline::ToolError => JsonRpcMessage::Response(JsonRpcResponse::new(
                        id,
                        json!({
                            "content": [{ "type": "text", "text": "Failed to retrieve library documentation data from Context7" }],
                            "isError": true
                        }),
                    )),
                    Offline::Success => JsonRpcMessage::Response(JsonRpcResponse::new(
                        id,
                        json!({ "content": [{ "type": "text", "text": "/facebook/react" }] }),
                    )),
                    Offline::Crash => return Err(McpError::Closed),
                }
            }
            METHOD_TOOLS_CALL => {
                let text = match request
                    .params
                    .as_ref()
                    .and_then(|p| p.get("name"))
                    .and_then(|n| n.as_str())
                {
                    Some(TOOL_RESOLVE_LIBRARY_ID) => {
                        "- Title: React\n- Context7-compatible library ID: /facebook/react\n- Trust Score: 9"
                            .to_string()
                    }
                    Some(TOOL_GET_LIBRARY_DOCS) => {
                        let args = request.params.as_ref().and_then(|p| p.get("arguments"));
                        format!(
                            "docs for {} topic={}",
                            args.and_then(|a| a.get("context7CompatibleLibraryID"))
                                .and_then(|v| v.as_str())
                                .unwrap_or("?"),
                            args.and_then(|a| a.get("topic"))
                                .and_then(|v| v.as_str())
                                .unwrap_or("-")
                        )
                    }
                    _ => "unknown tool".to_string(),
                };
                JsonRpcMessage::Response(JsonRpcResponse::new(
                    id,
                    json!({ "content": [{ "type": "text", "text": text }] }),
                ))
            }
            other => JsonRpcMessage::Error(JsonRpcError::new(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        };
        Ok(message)
    }
}

#[async_trait]
impl McpChannel for FakeServer {
    async fn exchange(
        &self,
        spawn: &SpawnCommand,
        messages: &[Outgoing],
        _timeout: Duration,
    ) -> McpResult<Exchange> {
        self.spawns.lock().unwrap().push(spawn.clone());
        self.sent.lock().unwrap().push(
            messages
                .iter()
                .map(|m| match m {
                    Outgoing::Request(r) => r.method.clone(),
                    Outgoing::Notification(n) => n.method.clone(),
                })
                .collect(),
        );

        let mut responses = Vec::new();
        for message in messages {
            if let Outgoing::Request(request) = message {
                responses.push(self.answer(spawn, request)?);
            }
        }

        Ok(Exchange {
            responses,
            skipped: self.preamble,
            exit_code: self.exit_code,
        })
    }
}
