//! Configuration loading and resolution.
//!
//! Every overridable value resolves as: explicit flag, then environment
//! variable, then the built-in default.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{WrapperError, WrapperResult};

pub const DEFAULT_IMAGE_NAME: &str = "context7-mcp";
pub const DEFAULT_IMAGE_VERSION: &str = "latest";
pub const DEFAULT_CONTAINER_NAME: &str = "context7-mcp";
pub const DEFAULT_REGISTRATION_NAME: &str = "context7";
pub const TEST_REGISTRATION_NAME: &str = "context7-test";

pub const BASE_IMAGE: &str = "node:20-alpine";
pub const PACKAGE: &str = "@upstash/context7-mcp";
pub const SERVER_BINARY: &str = "context7-mcp";
pub const RUNTIME_USER: &str = "context7";
pub const TRANSPORT: &str = "stdio";
pub const SUPPORTED_PLATFORMS: &[&str] = &["linux/amd64", "linux/arm64"];

pub const DEFAULT_MEMORY: &str = "2g";
pub const DEFAULT_CPUS: &str = "1";

pub const SECRET_FILE_NAME: &str = "api_key";
pub const SECRET_CONTAINER_PATH: &str = "/run/secrets/context7_api_key";

pub const ENV_IMAGE: &str = "CONTEXT7_IMAGE";
pub const ENV_CONTAINER_NAME: &str = "CONTEXT7_CONTAINER_NAME";
pub const ENV_SCOPE: &str = "CONTEXT7_SCOPE";
pub const ENV_SECRET_FILE: &str = "CONTEXT7_SECRET_FILE";

/// An image reference of the form `name:version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub name: String,
    pub version: String,
}

impl ImageRef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl Default for ImageRef {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_NAME, DEFAULT_IMAGE_VERSION)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

impl FromStr for ImageRef {
    type Err = WrapperError;

    fn from_str(s: &str) -> WrapperResult<Self> {
        let s = s.trim();
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(WrapperError::InvalidConfig(format!(
                "invalid image reference '{s}'"
            )));
        }

        // A colon inside a registry host (`host:5000/name`) is not a tag separator.
        let (name, version) = match s.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') => (name, tag),
            _ => (s, DEFAULT_IMAGE_VERSION),
        };

        if name.is_empty() || version.is_empty() {
            return Err(WrapperError::InvalidConfig(format!(
                "invalid image reference '{s}'"
            )));
        }

        Ok(Self::new(name, version))
    }
}

/// Registration scope for the host assistant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    User,
    Project,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::User => "user",
            Scope::Project => "project",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = WrapperError;

    fn from_str(s: &str) -> WrapperResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Scope::User),
            "project" => Ok(Scope::Project),
            other => Err(WrapperError::InvalidConfig(format!(
                "unknown scope '{other}' (expected user or project)"
            ))),
        }
    }
}

/// Memory and CPU ceiling applied to every spawned container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub memory: String,
    pub cpus: String,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory: DEFAULT_MEMORY.to_string(),
            cpus: DEFAULT_CPUS.to_string(),
        }
    }
}

impl ResourceLimits {
    /// Memory limit in bytes, using the runtime's binary suffixes (`2g` = 2 GiB).
    pub fn memory_bytes(&self) -> WrapperResult<u64> {
        parse_memory(&self.memory)
    }
}

fn parse_memory(value: &str) -> WrapperResult<u64> {
    let value = value.trim().to_ascii_lowercase();
    let invalid = || WrapperError::InvalidConfig(format!("invalid memory limit '{value}'"));

    let (digits, multiplier) = match value.chars().last() {
        Some('b') => (&value[..value.len() - 1], 1u64),
        Some('k') => (&value[..value.len() - 1], 1u64 << 10),
        Some('m') => (&value[..value.len() - 1], 1u64 << 20),
        Some('g') => (&value[..value.len() - 1], 1u64 << 30),
        Some(c) if c.is_ascii_digit() => (value.as_str(), 1u64),
        _ => return Err(invalid()),
    };

    let amount: u64 = digits.parse().map_err(|_| invalid())?;
    amount.checked_mul(multiplier).ok_or_else(invalid)
}

/// Optional secret file mounted read-only into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretMount {
    pub host_path: PathBuf,
    pub container_path: String,
}

impl SecretMount {
    pub fn new(host_path: impl Into<PathBuf>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: SECRET_CONTAINER_PATH.to_string(),
        }
    }

    /// Whether the host file exists; the mount is omitted otherwise.
    pub fn is_present(&self) -> bool {
        self.host_path.is_file()
    }
}

/// Everything needed to build, spawn, and register the server container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrapperConfig {
    pub image: ImageRef,
    pub container_name: String,
    pub limits: ResourceLimits,
    pub scope: Scope,
    pub registration_name: String,
    pub test_registration_name: String,
    pub secret: SecretMount,
    pub base_image: String,
    pub package: String,
    pub user: String,
    pub platforms: Vec<String>,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            image: ImageRef::default(),
            container_name: DEFAULT_CONTAINER_NAME.to_string(),
            limits: ResourceLimits::default(),
            scope: Scope::default(),
            registration_name: DEFAULT_REGISTRATION_NAME.to_string(),
            test_registration_name: TEST_REGISTRATION_NAME.to_string(),
            secret: SecretMount::new(resolve_default_secret_path()),
            base_image: BASE_IMAGE.to_string(),
            package: PACKAGE.to_string(),
            user: RUNTIME_USER.to_string(),
            platforms: SUPPORTED_PLATFORMS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Explicit overrides, usually taken from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub image: Option<String>,
    pub container_name: Option<String>,
    pub scope: Option<String>,
    pub secret_file: Option<String>,
}

impl WrapperConfig {
    /// Resolve the configuration from overrides and the process environment.
    pub fn resolve(overrides: &Overrides) -> WrapperResult<Self> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve against an arbitrary environment lookup.
    pub fn resolve_with<F>(overrides: &Overrides, env: F) -> WrapperResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(image) = pick(&overrides.image, &env, ENV_IMAGE) {
            config.image = image.parse()?;
        }

        if let Some(name) = pick(&overrides.container_name, &env, ENV_CONTAINER_NAME) {
            if name.trim().is_empty() {
                return Err(WrapperError::InvalidConfig(
                    "container name must not be empty".to_string(),
                ));
            }
            config.container_name = name;
        }

        if let Some(scope) = pick(&overrides.scope, &env, ENV_SCOPE) {
            config.scope = scope.parse()?;
        }

        if let Some(path) = pick(&overrides.secret_file, &env, ENV_SECRET_FILE) {
            config.secret = SecretMount::new(path);
        } else if let Some(home) = env("HOME").or_else(|| env("USERPROFILE")) {
            config.secret = SecretMount::new(secret_path_under(&home));
        }

        tracing::debug!(
            "Resolved config: image={} container={} scope={}",
            config.image,
            config.container_name,
            config.scope
        );

        Ok(config)
    }
}

fn pick<F>(explicit: &Option<String>, env: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    explicit
        .clone()
        .or_else(|| env(key).filter(|v| !v.is_empty()))
}

fn secret_path_under(home: &str) -> PathBuf {
    PathBuf::from(home).join(".context7").join(SECRET_FILE_NAME)
}

fn resolve_default_secret_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());

    secret_path_under(&home)
}
