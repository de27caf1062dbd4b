//! Operations shared by the command line and the console, wired to the
//! capability traits.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use context7_docker::{
    deregister, register, status, BuildOptions, ClaudeCli, ContainerRuntime, DockerCli,
    ImageBuilder, ImageFacts, ImageRecipe, ProcessRegistrar, Registration, RegistrationStatus,
    RemovalOutcome, SpawnCommand, SystemRunner, WrapperConfig, WrapperError,
};

use crate::probe::{self, PROBE_TIMEOUT};
use crate::transport::{McpChannel, StdioChannel};
use crate::types::{McpResult, ToolCallResult, ToolDefinition};
use crate::verify::{Suite, VerificationReport, Verifier};

/// What a build produced.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub image: String,
    pub platforms: Vec<String>,
    pub pushed: bool,
    /// Local image facts; absent when the result was only pushed.
    pub facts: Option<ImageFacts>,
    pub dockerfile: Option<PathBuf>,
}

/// Result of `clean`.
#[derive(Debug, Clone, Serialize)]
pub struct CleanSummary {
    pub registration: RemovalOutcome,
    pub container_removed: bool,
    pub image_removed: bool,
}

/// Resolved configuration plus the collaborators it drives.
pub struct Toolkit {
    config: WrapperConfig,
    builder: Arc<dyn ImageBuilder>,
    runtime: Arc<dyn ContainerRuntime>,
    registrar: Arc<dyn ProcessRegistrar>,
    channel: Arc<dyn McpChannel>,
}

impl Toolkit {
    pub fn new(
        config: WrapperConfig,
        builder: Arc<dyn ImageBuilder>,
        runtime: Arc<dyn ContainerRuntime>,
        registrar: Arc<dyn ProcessRegistrar>,
        channel: Arc<dyn McpChannel>,
    ) -> Self {
        Self {
            config,
            builder,
            runtime,
            registrar,
            channel,
        }
    }

    /// Real `docker`, `claude`, and child-process stdio.
    pub fn system(config: WrapperConfig) -> Self {
        let docker = Arc::new(DockerCli::new(SystemRunner));
        Self::new(
            config,
            docker.clone(),
            docker,
            Arc::new(ClaudeCli::new(SystemRunner)),
            Arc::new(StdioChannel::new()),
        )
    }

    pub fn config(&self) -> &WrapperConfig {
        &self.config
    }

    pub fn spawn_command(&self) -> SpawnCommand {
        SpawnCommand::for_config(&self.config)
    }

    /// Build the image. A push with no explicit platforms publishes every
    /// configured platform; a local build with none targets the host.
    pub async fn build(
        &self,
        platforms: &[String],
        push: bool,
        context_dir: Option<&Path>,
    ) -> McpResult<BuildSummary> {
        let allowed = &self.config.platforms;
        if let Some(bad) = platforms.iter().find(|p| !allowed.contains(p)) {
            return Err(WrapperError::InvalidConfig(format!(
                "unsupported platform '{bad}' (expected one of: {})",
                allowed.join(", ")
            ))
            .into());
        }
        let platforms: &[String] = if platforms.is_empty() && push {
            allowed
        } else {
            platforms
        };
        if platforms.len() > 1 && !push {
            return Err(WrapperError::InvalidConfig(
                "building several platforms requires --push".to_string(),
            )
            .into());
        }

        let recipe = ImageRecipe::from_config(&self.config);
        let dockerfile = match context_dir {
            Some(dir) => Some(recipe.write_to(dir)?),
            None => None,
        };

        let options = BuildOptions {
            platforms: platforms.to_vec(),
            push,
        };
        self.builder
            .build(&recipe, &self.config.image, &options)
            .await?;

        let facts = if push {
            None
        } else {
            Some(self.builder.inspect(&self.config.image).await?)
        };

        Ok(BuildSummary {
            image: self.config.image.to_string(),
            platforms: platforms.to_vec(),
            pushed: push,
            facts,
            dockerfile,
        })
    }

    pub async fn register(&self, name: Option<&str>) -> McpResult<Registration> {
        let name = name.unwrap_or(self.config.registration_name.as_str());
        if !self.config.secret.is_present() {
            tracing::info!(
                "No secret at {}; registering without the key mount",
                self.config.secret.host_path.display()
            );
        }
        Ok(register(
            self.registrar.as_ref(),
            name,
            self.config.scope,
            &self.spawn_command(),
        )
        .await?)
    }

    pub async fn deregister(&self, name: Option<&str>) -> McpResult<RemovalOutcome> {
        let name = name.unwrap_or(self.config.registration_name.as_str());
        Ok(deregister(self.registrar.as_ref(), name).await?)
    }

    pub async fn status(&self, name: Option<&str>) -> McpResult<RegistrationStatus> {
        let name = name.unwrap_or(self.config.registration_name.as_str());
        Ok(status(self.registrar.as_ref(), name).await?)
    }

    pub async fn tools(&self) -> McpResult<Vec<ToolDefinition>> {
        let listing =
            probe::list_tools(self.channel.as_ref(), &self.session_spawn(), PROBE_TIMEOUT).await?;
        Ok(listing.tools)
    }

    pub async fn docs(
        &self,
        library: &str,
        topic: Option<&str>,
        tokens: Option<u32>,
    ) -> McpResult<ToolCallResult> {
        probe::fetch_docs(
            self.channel.as_ref(),
            &self.session_spawn(),
            library,
            topic,
            tokens,
        )
        .await
    }

    pub async fn verify(&self, suite: Suite) -> VerificationReport {
        Verifier::new(
            self.builder.as_ref(),
            self.runtime.as_ref(),
            self.registrar.as_ref(),
            self.channel.as_ref(),
            &self.config,
        )
        .run(suite)
        .await
    }

    /// Deregister, remove a lingering container, and remove the image.
    pub async fn clean(&self) -> McpResult<CleanSummary> {
        let registration =
            deregister(self.registrar.as_ref(), &self.config.registration_name).await?;
        let container_removed = self
            .runtime
            .remove_container(&self.config.container_name)
            .await?;
        let image_removed = match self.builder.remove(&self.config.image).await {
            Ok(()) => true,
            Err(WrapperError::CommandFailed { stderr, .. }) => {
                tracing::debug!("Image not removed: {}", stderr.trim());
                false
            }
            Err(e) => return Err(e.into()),
        };

        Ok(CleanSummary {
            registration,
            container_removed,
            image_removed,
        })
    }

    /// One-off sessions get their own container name so they never collide
    /// with a host-spawned server.
    fn session_spawn(&self) -> SpawnCommand {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        self.spawn_command()
            .with_container_name(format!("{}-{}", self.config.container_name, &suffix[..8]))
    }
}
