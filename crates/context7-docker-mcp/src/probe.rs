//! One-shot sessions against the containerized server: list tools, call a tool.

use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::Value;

use context7_docker::SpawnCommand;

use crate::transport::{Exchange, McpChannel};
use crate::types::*;

/// Upper bound for a `tools/list` round trip, container start included.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for a `tools/call`; documentation fetches go over the network.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// A successful `tools/list` session.
#[derive(Debug, Clone)]
pub struct ToolListing {
    pub tools: Vec<ToolDefinition>,
    /// The answer was the first line the server wrote.
    pub first_line: bool,
    pub exit_code: Option<i32>,
}

impl ToolListing {
    pub fn names(&self) -> BTreeSet<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }
}

/// Send a bare `tools/list` request and decode the answer.
pub async fn list_tools(
    channel: &dyn McpChannel,
    spawn: &SpawnCommand,
    timeout: Duration,
) -> McpResult<ToolListing> {
    let request = JsonRpcRequest::tools_list(1);
    let messages = [Outgoing::from(request)];
    let exchange = channel.exchange(spawn, &messages, timeout).await?;

    let result = single_result(&exchange)?;
    let listing: ToolListResult = serde_json::from_value(result)
        .map_err(|e| McpError::InvalidResponse(format!("tools/list result: {e}")))?;

    Ok(ToolListing {
        tools: listing.tools,
        first_line: exchange.skipped == 0,
        exit_code: exchange.exit_code,
    })
}

/// Run the initialize handshake, then call `name` with `arguments`.
///
/// A JSON-RPC error becomes [`McpError::Remote`]; a tool result flagged
/// `isError` is returned as-is for the caller to render.
pub async fn call_tool(
    channel: &dyn McpChannel,
    spawn: &SpawnCommand,
    name: &str,
    arguments: Value,
    timeout: Duration,
) -> McpResult<ToolCallResult> {
    let init = JsonRpcRequest::new(
        0,
        METHOD_INITIALIZE,
        Some(serde_json::to_value(InitializeParams::default())?),
    );
    let initialized = JsonRpcNotification::new(METHOD_INITIALIZED.to_string(), None);
    let call = JsonRpcRequest::new(
        1,
        METHOD_TOOLS_CALL,
        Some(serde_json::to_value(ToolCallParams {
            name: name.to_string(),
            arguments: Some(arguments),
        })?),
    );

    let messages = [
        Outgoing::from(init),
        Outgoing::from(initialized),
        Outgoing::from(call),
    ];
    let exchange = channel.exchange(spawn, &messages, timeout).await?;

    match exchange.responses.as_slice() {
        [first, second] => {
            let server = result_of(first)?;
            if let Ok(info) = serde_json::from_value::<InitializeResult>(server) {
                tracing::debug!(
                    "Server {} v{} (protocol {})",
                    info.server_info.name,
                    info.server_info.version,
                    info.protocol_version
                );
            }
            let result = result_of(second)?;
            serde_json::from_value(result)
                .map_err(|e| McpError::InvalidResponse(format!("tools/call result: {e}")))
        }
        other => Err(McpError::InvalidResponse(format!(
            "expected 2 responses, got {}",
            other.len()
        ))),
    }
}

/// Resolve a library name, then fetch its documentation.
pub async fn fetch_docs(
    channel: &dyn McpChannel,
    spawn: &SpawnCommand,
    library: &str,
    topic: Option<&str>,
    tokens: Option<u32>,
) -> McpResult<ToolCallResult> {
    let library_id = if library.starts_with('/') {
        library.to_string()
    } else {
        let resolved = call_tool(
            channel,
            spawn,
            TOOL_RESOLVE_LIBRARY_ID,
            serde_json::json!({ "libraryName": library }),
            CALL_TIMEOUT,
        )
        .await?;
        if resolved.is_error() {
            return Ok(resolved);
        }
        first_library_id(&resolved.text()).ok_or_else(|| {
            McpError::InvalidResponse(format!("no library id found for '{library}'"))
        })?
    };

    tracing::info!("Fetching docs for {library_id}");

    let mut arguments = serde_json::json!({ "context7CompatibleLibraryID": library_id });
    if let Some(topic) = topic {
        arguments["topic"] = Value::String(topic.to_string());
    }
    if let Some(tokens) = tokens {
        arguments["tokens"] = Value::from(tokens);
    }

    call_tool(channel, spawn, TOOL_GET_LIBRARY_DOCS, arguments, CALL_TIMEOUT).await
}

/// Required tool names absent from `tools`.
pub fn missing_required_tools(tools: &[ToolDefinition]) -> Vec<&'static str> {
    REQUIRED_TOOLS
        .iter()
        .copied()
        .filter(|required| !tools.iter().any(|t| t.name == *required))
        .collect()
}

/// Tools lacking a name or a description.
pub fn incomplete_tools(tools: &[ToolDefinition]) -> Vec<String> {
    tools
        .iter()
        .filter(|t| {
            t.name.trim().is_empty() || t.description.as_deref().map_or(true, |d| d.trim().is_empty())
        })
        .map(|t| {
            if t.name.is_empty() {
                "<unnamed>".to_string()
            } else {
                t.name.clone()
            }
        })
        .collect()
}

/// First `/org/project` style id mentioned in resolver output.
pub fn first_library_id(text: &str) -> Option<String> {
    text.split(|c: char| c.is_whitespace() || c == '`' || c == '"' || c == '\'')
        .map(|token| token.trim_end_matches([',', '.', ')', ';']))
        .find(|token| {
            token.starts_with('/')
                && token.len() > 1
                && token[1..].contains('/')
                && !token.ends_with('/')
                && !token.contains("//")
        })
        .map(str::to_string)
}

/// Human-readable rendering of a tool result.
pub fn render_result(result: &ToolCallResult) -> String {
    let text = result.text();
    if result.is_error() {
        format!("Tool reported an error: {text}")
    } else {
        text
    }
}

fn single_result(exchange: &Exchange) -> McpResult<Value> {
    match exchange.responses.as_slice() {
        [only] => result_of(only),
        other => Err(McpError::InvalidResponse(format!(
            "expected 1 response, got {}",
            other.len()
        ))),
    }
}

fn result_of(message: &JsonRpcMessage) -> McpResult<Value> {
    match message {
        JsonRpcMessage::Response(r) => Ok(r.result.clone()),
        JsonRpcMessage::Error(e) => Err(e.error.clone().into()),
        _ => Err(McpError::InvalidResponse(
            "expected a response object".to_string(),
        )),
    }
}
