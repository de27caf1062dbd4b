//! Idempotent registration of the server with the host assistant.
//!
//! `register` is remove-then-add: a stale entry under the same name is
//! dropped first, and a missing entry is an expected outcome rather than an
//! error. Only the `add` step can fail the operation.

use serde::{Deserialize, Serialize};

use crate::claude::{ProcessRegistrar, RegistryEntry};
use crate::config::Scope;
use crate::error::WrapperResult;
use crate::spawn::SpawnCommand;

/// Result of removing a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalOutcome {
    Removed,
    NotPresent,
}

/// Result of a successful `register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub name: String,
    pub scope: Scope,
    pub command: String,
    /// A previous entry under the same name was removed first.
    pub replaced: bool,
}

/// Read-only view of one name in the host listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationStatus {
    pub name: String,
    pub present: bool,
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// Register `name` with `command`, replacing any existing entry.
pub async fn register(
    registrar: &dyn ProcessRegistrar,
    name: &str,
    scope: Scope,
    command: &SpawnCommand,
) -> WrapperResult<Registration> {
    let removal = registrar.remove(name).await?;
    registrar.add(name, scope, command).await?;

    Ok(Registration {
        name: name.to_string(),
        scope,
        command: command.to_string(),
        replaced: removal == RemovalOutcome::Removed,
    })
}

/// Remove `name`; absence is tolerated.
pub async fn deregister(
    registrar: &dyn ProcessRegistrar,
    name: &str,
) -> WrapperResult<RemovalOutcome> {
    registrar.remove(name).await
}

/// Report whether `name` is registered and connected.
pub async fn status(
    registrar: &dyn ProcessRegistrar,
    name: &str,
) -> WrapperResult<RegistrationStatus> {
    let entries = registrar.list().await?;
    let entry = entries.iter().find(|e| e.name == name);

    Ok(RegistrationStatus {
        name: name.to_string(),
        present: entry.is_some(),
        connected: entry.is_some_and(|e| e.health.is_connected()),
        command: entry.map(|e| e.command.clone()),
    })
}

/// Number of listing entries registered under `name`.
pub fn entry_count(entries: &[RegistryEntry], name: &str) -> usize {
    entries.iter().filter(|e| e.name == name).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claude::Health;
    use crate::config::{SecretMount, WrapperConfig};
    use crate::error::WrapperError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory host registry; `add` of an existing name fails like the real CLI.
    #[derive(Default)]
    struct MemoryRegistrar {
        entries: Mutex<Vec<RegistryEntry>>,
        fail_add: bool,
    }

    #[async_trait]
    impl ProcessRegistrar for MemoryRegistrar {
        async fn add(&self, name: &str, _scope: Scope, command: &SpawnCommand) -> WrapperResult<()> {
            let mut entries = self.entries.lock().unwrap();
            if self.fail_add || entries.iter().any(|e| e.name == name) {
                return Err(WrapperError::CommandFailed {
                    program: "claude".to_string(),
                    code: Some(1),
                    stderr: format!("MCP server {name} already exists"),
                });
            }
            entries.push(RegistryEntry {
                name: name.to_string(),
                command: command.to_string(),
                health: Health::Connected,
            });
            Ok(())
        }

        async fn remove(&self, name: &str) -> WrapperResult<RemovalOutcome> {
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

    fn spawn() -> SpawnCommand {
        SpawnCommand::for_config(&WrapperConfig {
            secret: SecretMount::new("/nonexistent/api_key"),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_register_twice_leaves_one_entry() {
        let registrar = MemoryRegistrar::default();

        let first = register(&registrar, "context7", Scope::User, &spawn())
            .await
            .unwrap();
        assert!(!first.replaced);

        let second = register(&registrar, "context7", Scope::User, &spawn())
            .await
            .unwrap();
        assert!(second.replaced);

        let entries = registrar.list().await.unwrap();
        assert_eq!(entry_count(&entries, "context7"), 1);
    }

    #[tokio::test]
    async fn test_deregister_tolerates_absence() {
        let registrar = MemoryRegistrar::default();
        let outcome = deregister(&registrar, "context7").await.unwrap();
        assert_eq!(outcome, RemovalOutcome::NotPresent);
    }

    #[tokio::test]
    async fn test_status_lifecycle() {
        let registrar = MemoryRegistrar::default();

        let before = status(&registrar, "context7-test").await.unwrap();
        assert!(!before.present);
        assert!(!before.connected);
        assert!(before.command.is_none());

        register(&registrar, "context7-test", Scope::Project, &spawn())
            .await
            .unwrap();
        let during = status(&registrar, "context7-test").await.unwrap();
        assert!(during.present);
        assert!(during.connected);
        assert_eq!(during.command, Some(spawn().to_string()));

        assert_eq!(
            deregister(&registrar, "context7-test").await.unwrap(),
            RemovalOutcome::Removed
        );
        let after = status(&registrar, "context7-test").await.unwrap();
        assert!(!after.present);
    }

    #[tokio::test]
    async fn test_add_failure_propagates() {
        let registrar = MemoryRegistrar {
            fail_add: true,
            ..Default::default()
        };
        let result = register(&registrar, "context7", Scope::User, &spawn()).await;
        tokio_test::assert_err!(result);
    }
}
