//! Packaging verification suites.
//!
//! Checks run strictly in order. The first failure stops the suite and
//! removes whatever the run still has on its cleanup ledger; passing checks
//! clean up after themselves.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use context7_docker::config::{DEFAULT_CPUS, DEFAULT_MEMORY};
use context7_docker::{
    deregister, entry_count, register, status, ContainerRuntime, ImageBuilder, ImageFacts,
    ProcessRegistrar, SpawnCommand, WrapperConfig, WrapperError,
};

use crate::probe::{self, PROBE_TIMEOUT};
use crate::transport::McpChannel;
use crate::types::{McpError, TOOL_RESOLVE_LIBRARY_ID};

/// Largest acceptable image, in bytes as the runtime reports them.
pub const MAX_IMAGE_BYTES: u64 = 300_000_000;

/// Architectures the image may be built for.
pub const SUPPORTED_ARCHITECTURES: &[&str] = &["amd64", "arm64"];

/// Substring the server's `--help` output must contain.
pub const HELP_MARKER: &str = "context7";

const OFFLINE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Suite {
    Image,
    Container,
    Protocol,
    Registration,
    All,
}

impl Suite {
    pub const NAMES: &'static [&'static str] =
        &["image", "container", "protocol", "registration", "all"];

    pub fn checks(&self) -> Vec<Check> {
        use Check::*;
        match self {
            Suite::Image => vec![ImageSize, ImageArchitecture],
            Suite::Container => vec![NonRootUser, MemoryLimit, HelpText, SpawnLimits],
            Suite::Protocol => vec![
                ToolsListFirstLine,
                RequiredTools,
                ToolsListIdempotent,
                OfflineError,
            ],
            Suite::Registration => vec![RegisterIdempotent, RegistrationLifecycle],
            Suite::All => [
                Suite::Image,
                Suite::Container,
                Suite::Protocol,
                Suite::Registration,
            ]
            .iter()
            .flat_map(Suite::checks)
            .collect(),
        }
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Suite::Image => "image",
            Suite::Container => "container",
            Suite::Protocol => "protocol",
            Suite::Registration => "registration",
            Suite::All => "all",
        };
        f.write_str(name)
    }
}

impl FromStr for Suite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "image" => Ok(Suite::Image),
            "container" => Ok(Suite::Container),
            "protocol" => Ok(Suite::Protocol),
            "registration" => Ok(Suite::Registration),
            "all" => Ok(Suite::All),
            other => Err(format!(
                "unknown suite '{other}' (expected one of: {})",
                Suite::NAMES.join(", ")
            )),
        }
    }
}

/// A single verification step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    ImageSize,
    ImageArchitecture,
    NonRootUser,
    MemoryLimit,
    HelpText,
    SpawnLimits,
    ToolsListFirstLine,
    RequiredTools,
    ToolsListIdempotent,
    OfflineError,
    RegisterIdempotent,
    RegistrationLifecycle,
}

impl Check {
    pub fn name(&self) -> &'static str {
        match self {
            Check::ImageSize => "image size under ceiling",
            Check::ImageArchitecture => "image architecture supported",
            Check::NonRootUser => "runs as restricted user",
            Check::MemoryLimit => "memory limit enforced",
            Check::HelpText => "--help identifies the server",
            Check::SpawnLimits => "spawn command carries limits",
            Check::ToolsListFirstLine => "tools/list answers on first line",
            Check::RequiredTools => "required tools advertised",
            Check::ToolsListIdempotent => "tools/list is repeatable",
            Check::OfflineError => "network failure reported as error",
            Check::RegisterIdempotent => "re-registration leaves one entry",
            Check::RegistrationLifecycle => "register, connect, deregister",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
    pub detail: String,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub suite: Suite,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub checks: Vec<CheckOutcome>,
    /// Checks never reached because an earlier one failed.
    pub skipped: Vec<String>,
    pub passed: bool,
}

impl VerificationReport {
    pub fn failure(&self) -> Option<&CheckOutcome> {
        self.checks.iter().find(|c| !c.passed)
    }
}

/// Why a check did not pass.
#[derive(thiserror::Error, Debug)]
enum CheckError {
    #[error("{0}")]
    Assertion(String),

    #[error(transparent)]
    Mcp(#[from] McpError),

    #[error(transparent)]
    Wrapper(#[from] WrapperError),
}

type CheckResult = Result<String, CheckError>;

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), CheckError> {
    if condition {
        Ok(())
    } else {
        Err(CheckError::Assertion(message()))
    }
}

/// Something a check created that must not outlive a failed run.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Resource {
    Container(String),
    Registration(String),
}

/// Runs suites against the capability traits.
pub struct Verifier<'a> {
    builder: &'a dyn ImageBuilder,
    runtime: &'a dyn ContainerRuntime,
    registrar: &'a dyn ProcessRegistrar,
    channel: &'a dyn McpChannel,
    config: &'a WrapperConfig,
    help_marker: String,
    probe_timeout: Duration,
    ledger: Vec<Resource>,
    facts: Option<ImageFacts>,
    tool_names: Option<BTreeSet<String>>,
}

impl<'a> Verifier<'a> {
    pub fn new(
        builder: &'a dyn ImageBuilder,
        runtime: &'a dyn ContainerRuntime,
        registrar: &'a dyn ProcessRegistrar,
        channel: &'a dyn McpChannel,
        config: &'a WrapperConfig,
    ) -> Self {
        Self {
            builder,
            runtime,
            registrar,
            channel,
            config,
            help_marker: HELP_MARKER.to_string(),
            probe_timeout: PROBE_TIMEOUT,
            ledger: Vec::new(),
            facts: None,
            tool_names: None,
        }
    }

    pub fn with_help_marker(mut self, marker: impl Into<String>) -> Self {
        self.help_marker = marker.into();
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Run `suite`, stopping at the first failing check.
    pub async fn run(&mut self, suite: Suite) -> VerificationReport {
        let started_at = Utc::now();
        let checks = suite.checks();
        let mut outcomes = Vec::with_capacity(checks.len());
        let mut skipped = Vec::new();

        tracing::info!("Verifying suite '{suite}' ({} checks)", checks.len());

        for (index, check) in checks.iter().enumerate() {
            let start = Instant::now();
            let result = self.run_check(*check).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(detail) => {
                    tracing::info!("PASS {}: {detail}", check.name());
                    outcomes.push(CheckOutcome {
                        name: check.name().to_string(),
                        passed: true,
                        detail,
                        elapsed_ms,
                    });
                }
                Err(e) => {
                    tracing::error!("FAIL {}: {e}", check.name());
                    outcomes.push(CheckOutcome {
                        name: check.name().to_string(),
                        passed: false,
                        detail: e.to_string(),
                        elapsed_ms,
                    });
                    skipped = checks[index + 1..]
                        .iter()
                        .map(|c| c.name().to_string())
                        .collect();
                    self.cleanup().await;
                    break;
                }
            }
        }

        let passed = outcomes.iter().all(|o| o.passed);
        VerificationReport {
            suite,
            started_at,
            finished_at: Utc::now(),
            checks: outcomes,
            skipped,
            passed,
        }
    }

    /// Remove everything left on the ledger, newest first.
    async fn cleanup(&mut self) {
        while let Some(resource) = self.ledger.pop() {
            match &resource {
                Resource::Container(name) => match self.runtime.remove_container(name).await {
                    Ok(true) => tracing::info!("Cleanup: removed container {name}"),
                    Ok(false) => tracing::debug!("Cleanup: container {name} already gone"),
                    Err(e) => tracing::warn!("Cleanup: could not remove container {name}: {e}"),
                },
                Resource::Registration(name) => match deregister(self.registrar, name).await {
                    Ok(outcome) => tracing::info!("Cleanup: registration {name}: {outcome:?}"),
                    Err(e) => tracing::warn!("Cleanup: could not deregister {name}: {e}"),
                },
            }
        }
    }

    fn track(&mut self, resource: Resource) {
        self.ledger.push(resource);
    }

    fn release(&mut self, resource: &Resource) {
        self.ledger.retain(|r| r != resource);
    }

    fn probe_spawn(&self, purpose: &str) -> (SpawnCommand, Resource) {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("{}-{purpose}-{}", self.config.container_name, &suffix[..8]);
        let spawn = SpawnCommand::for_config(self.config).with_container_name(name.clone());
        (spawn, Resource::Container(name))
    }

    async fn run_check(&mut self, check: Check) -> CheckResult {
        match check {
            Check::ImageSize => self.check_image_size().await,
            Check::ImageArchitecture => self.check_image_architecture().await,
            Check::NonRootUser => self.check_non_root_user().await,
            Check::MemoryLimit => self.check_memory_limit().await,
            Check::HelpText => self.check_help_text().await,
            Check::SpawnLimits => self.check_spawn_limits(),
            Check::ToolsListFirstLine => self.check_tools_list_first_line().await,
            Check::RequiredTools => self.check_required_tools().await,
            Check::ToolsListIdempotent => self.check_tools_list_idempotent().await,
            Check::OfflineError => self.check_offline_error().await,
            Check::RegisterIdempotent => self.check_register_idempotent().await,
            Check::RegistrationLifecycle => self.check_registration_lifecycle().await,
        }
    }

    async fn image_facts(&mut self) -> Result<ImageFacts, CheckError> {
        if let Some(facts) = &self.facts {
            return Ok(facts.clone());
        }
        let facts = self.builder.inspect(&self.config.image).await?;
        self.facts = Some(facts.clone());
        Ok(facts)
    }

    async fn check_image_size(&mut self) -> CheckResult {
        let facts = self.image_facts().await?;
        let mb = facts.size_bytes as f64 / 1_000_000.0;
        ensure(facts.size_bytes < MAX_IMAGE_BYTES, || {
            format!("{} is {mb:.1} MB, limit is 300 MB", self.config.image)
        })?;
        Ok(format!("{mb:.1} MB"))
    }

    async fn check_image_architecture(&mut self) -> CheckResult {
        let facts = self.image_facts().await?;
        ensure(
            SUPPORTED_ARCHITECTURES.contains(&facts.architecture.as_str()),
            || {
                format!(
                    "architecture '{}' is not one of {}",
                    facts.architecture,
                    SUPPORTED_ARCHITECTURES.join(", ")
                )
            },
        )?;
        Ok(facts.architecture)
    }

    async fn check_non_root_user(&mut self) -> CheckResult {
        let user = self.runtime.default_user(&self.config.image).await?;
        ensure(user != "root", || "container runs as root".to_string())?;
        ensure(user == self.config.user, || {
            format!("runs as '{user}', expected '{}'", self.config.user)
        })?;
        Ok(user)
    }

    async fn check_memory_limit(&mut self) -> CheckResult {
        let expected = self.config.limits.memory_bytes()?;
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("{}-limits-{}", self.config.container_name, &suffix[..8]);

        let bytes = self
            .runtime
            .memory_limit(&self.config.image, &name, &self.config.limits)
            .await?;
        ensure(bytes == expected, || {
            format!("memory limit is {bytes} bytes, expected {expected}")
        })?;
        Ok(format!("{bytes} bytes"))
    }

    async fn check_help_text(&mut self) -> CheckResult {
        let (spawn, container) = self.probe_spawn("help");
        let spawn = spawn.with_entry_args(["--help"]);

        self.track(container.clone());
        let output = self.runtime.run_once(&spawn).await?;

        ensure(output.success(), || {
            format!("--help exited with {:?}: {}", output.code, output.stderr.trim())
        })?;
        let text = format!("{}{}", output.stdout, output.stderr).to_lowercase();
        ensure(text.contains(&self.help_marker.to_lowercase()), || {
            format!("--help output does not mention '{}'", self.help_marker)
        })?;
        self.release(&container);
        Ok(format!("mentions '{}'", self.help_marker))
    }

    fn check_spawn_limits(&mut self) -> CheckResult {
        let spawn = SpawnCommand::for_config(self.config);
        for flag in ["-i", "--rm"] {
            ensure(spawn.has_flag(flag), || format!("spawn command lacks {flag}"))?;
        }
        ensure(spawn.flag_value("--memory") == Some(DEFAULT_MEMORY), || {
            format!("--memory is {:?}, expected {DEFAULT_MEMORY}", spawn.flag_value("--memory"))
        })?;
        ensure(spawn.flag_value("--cpus") == Some(DEFAULT_CPUS), || {
            format!("--cpus is {:?}, expected {DEFAULT_CPUS}", spawn.flag_value("--cpus"))
        })?;
        Ok(format!("--memory {DEFAULT_MEMORY} --cpus {DEFAULT_CPUS}"))
    }

    async fn list_tool_names(
        &mut self,
        require_first_line: bool,
    ) -> Result<BTreeSet<String>, CheckError> {
        let (spawn, container) = self.probe_spawn("probe");

        self.track(container.clone());
        let listing = probe::list_tools(self.channel, &spawn, self.probe_timeout).await?;

        if require_first_line {
            ensure(listing.first_line, || {
                "response was not the first line on stdout".to_string()
            })?;
        }
        ensure(!listing.tools.is_empty(), || "result.tools is empty".to_string())?;

        let incomplete = probe::incomplete_tools(&listing.tools);
        ensure(incomplete.is_empty(), || {
            format!("tools without name or description: {}", incomplete.join(", "))
        })?;
        ensure(listing.exit_code.is_some(), || {
            "server did not exit after stdin closed".to_string()
        })?;

        // A probe that failed an assertion may still have a live container.
        self.release(&container);
        Ok(listing.names())
    }

    async fn check_tools_list_first_line(&mut self) -> CheckResult {
        let names = self.list_tool_names(true).await?;
        let detail = format!("{} tools", names.len());
        self.tool_names = Some(names);
        Ok(detail)
    }

    async fn check_required_tools(&mut self) -> CheckResult {
        let names = match self.tool_names.clone() {
            Some(names) => names,
            None => {
                let names = self.list_tool_names(false).await?;
                self.tool_names = Some(names.clone());
                names
            }
        };

        let missing: Vec<&str> = crate::types::REQUIRED_TOOLS
            .iter()
            .copied()
            .filter(|t| !names.contains(*t))
            .collect();
        ensure(missing.is_empty(), || {
            format!("missing tools: {}", missing.join(", "))
        })?;
        Ok(crate::types::REQUIRED_TOOLS.join(", "))
    }

    async fn check_tools_list_idempotent(&mut self) -> CheckResult {
        let first = match self.tool_names.clone() {
            Some(names) => names,
            None => self.list_tool_names(false).await?,
        };
        let second = self.list_tool_names(false).await?;

        ensure(first == second, || {
            let added: Vec<_> = second.difference(&first).cloned().collect();
            let removed: Vec<_> = first.difference(&second).cloned().collect();
            format!(
                "tool set changed (added: [{}], removed: [{}])",
                added.join(", "),
                removed.join(", ")
            )
        })?;
        Ok(format!("{} tools both times", second.len()))
    }

    async fn check_offline_error(&mut self) -> CheckResult {
        let (spawn, container) = self.probe_spawn("offline");
        let spawn = spawn.with_network("none");

        self.track(container.clone());
        let result = probe::call_tool(
            self.channel,
            &spawn,
            TOOL_RESOLVE_LIBRARY_ID,
            serde_json::json!({ "libraryName": "react" }),
            OFFLINE_TIMEOUT,
        )
        .await;

        match result {
            Err(McpError::Remote { code, message }) => {
                self.release(&container);
                Ok(format!("JSON-RPC error {code}: {message}"))
            }
            Ok(result) if result.is_error() => {
                self.release(&container);
                Ok(format!("tool error: {}", result.text()))
            }
            Ok(_) => Err(CheckError::Assertion(
                "offline call returned a successful result".to_string(),
            )),
            Err(e) => Err(CheckError::Assertion(format!(
                "offline call broke the channel: {e}"
            ))),
        }
    }

    async fn check_register_idempotent(&mut self) -> CheckResult {
        let name = self.config.test_registration_name.clone();
        let spawn = SpawnCommand::for_config(self.config);
        let resource = Resource::Registration(name.clone());

        self.track(resource.clone());
        register(self.registrar, &name, self.config.scope, &spawn).await?;
        register(self.registrar, &name, self.config.scope, &spawn).await?;

        let entries = self.registrar.list().await?;
        let count = entry_count(&entries, &name);
        ensure(count == 1, || {
            format!("'{name}' listed {count} times after re-registration")
        })?;

        deregister(self.registrar, &name).await?;
        self.release(&resource);
        Ok("1 entry".to_string())
    }

    async fn check_registration_lifecycle(&mut self) -> CheckResult {
        let name = self.config.test_registration_name.clone();
        let spawn = SpawnCommand::for_config(self.config);
        let resource = Resource::Registration(name.clone());

        self.track(resource.clone());
        register(self.registrar, &name, self.config.scope, &spawn).await?;

        let registered = status(self.registrar, &name).await?;
        ensure(registered.present, || format!("'{name}' not listed after register"))?;
        ensure(registered.connected, || format!("'{name}' listed but not connected"))?;

        deregister(self.registrar, &name).await?;
        let removed = status(self.registrar, &name).await?;
        ensure(!removed.present, || format!("'{name}' still listed after deregister"))?;
        self.release(&resource);

        Ok("listed, connected, removed".to_string())
    }
}
