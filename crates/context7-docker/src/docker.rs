//! Container runtime adapter: image build, inspection, and one-shot runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ImageRef, ResourceLimits};
use crate::error::{WrapperError, WrapperResult};
use crate::recipe::ImageRecipe;
use crate::runner::{CommandOutput, CommandRunner, CommandSpec};
use crate::spawn::{SpawnCommand, CONTAINER_RUNTIME};

/// How long the limit-inspection container stays alive.
const INSPECT_SLEEP_SECS: &str = "30";

/// Facts reported by the runtime about a built image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFacts {
    pub size_bytes: u64,
    pub architecture: String,
    pub os: String,
}

/// Platform and publishing options for an image build.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub platforms: Vec<String>,
    pub push: bool,
}

/// Builds and inspects images.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    async fn build(
        &self,
        recipe: &ImageRecipe,
        image: &ImageRef,
        options: &BuildOptions,
    ) -> WrapperResult<()>;

    async fn inspect(&self, image: &ImageRef) -> WrapperResult<ImageFacts>;

    async fn remove(&self, image: &ImageRef) -> WrapperResult<()>;
}

/// Starts containers from a built image.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Account the image runs as when no `--user` override is given.
    async fn default_user(&self, image: &ImageRef) -> WrapperResult<String>;

    /// Start a detached container with `limits`, read back the enforced
    /// memory limit in bytes, and force-remove the container.
    async fn memory_limit(
        &self,
        image: &ImageRef,
        container_name: &str,
        limits: &ResourceLimits,
    ) -> WrapperResult<u64>;

    /// Run a spawn command to completion with stdin closed.
    async fn run_once(&self, spawn: &SpawnCommand) -> WrapperResult<CommandOutput>;

    /// Force-remove a container; `false` if it did not exist.
    async fn remove_container(&self, name: &str) -> WrapperResult<bool>;
}

/// `docker` CLI implementation of [`ImageBuilder`] and [`ContainerRuntime`].
pub struct DockerCli<R> {
    runner: R,
}

impl<R: CommandRunner> DockerCli<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    async fn docker<I, S>(&self, args: I) -> WrapperResult<CommandOutput>
    where
        I: IntoIterator<Item = S> + Send,
        S: Into<String>,
    {
        self.runner
            .run(&CommandSpec::new(CONTAINER_RUNTIME, args))
            .await
    }
}

#[derive(Debug, Deserialize)]
struct InspectEntry {
    #[serde(rename = "Size")]
    size: u64,
    #[serde(rename = "Architecture")]
    architecture: String,
    #[serde(rename = "Os", default)]
    os: String,
}

/// Parse `docker image inspect` output (a JSON array with one entry per image).
pub fn parse_image_inspect(text: &str) -> WrapperResult<ImageFacts> {
    let entries: Vec<InspectEntry> = serde_json::from_str(text.trim())?;
    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| WrapperError::Parse("image inspect returned no entries".to_string()))?;

    Ok(ImageFacts {
        size_bytes: entry.size,
        architecture: entry.architecture,
        os: entry.os,
    })
}

fn build_spec(recipe: &ImageRecipe, image: &ImageRef, options: &BuildOptions) -> CommandSpec {
    let tag = image.to_string();
    let args: Vec<String> = if options.platforms.is_empty() {
        vec!["build".into(), "-t".into(), tag, "-".into()]
    } else {
        let mut args: Vec<String> = vec![
            "buildx".into(),
            "build".into(),
            "--platform".into(),
            options.platforms.join(","),
            "-t".into(),
            tag,
        ];
        if options.push {
            args.push("--push".into());
        } else if options.platforms.len() == 1 {
            args.push("--load".into());
        }
        args.push("-".into());
        args
    };

    CommandSpec::new(CONTAINER_RUNTIME, args).with_stdin(recipe.render())
}

#[async_trait]
impl<R: CommandRunner> ImageBuilder for DockerCli<R> {
    async fn build(
        &self,
        recipe: &ImageRecipe,
        image: &ImageRef,
        options: &BuildOptions,
    ) -> WrapperResult<()> {
        if options.platforms.len() > 1 && !options.push {
            tracing::warn!(
                "Multi-platform build without --push stays in the build cache; {} will not be loaded locally",
                image
            );
        }

        let spec = build_spec(recipe, image, options);
        tracing::info!("Building {image}");
        self.runner.run(&spec).await?.check(CONTAINER_RUNTIME)?;
        tracing::info!("Built {image}");
        Ok(())
    }

    async fn inspect(&self, image: &ImageRef) -> WrapperResult<ImageFacts> {
        let output = self
            .docker(["image".to_string(), "inspect".to_string(), image.to_string()])
            .await?
            .check(CONTAINER_RUNTIME)?;
        parse_image_inspect(&output.stdout)
    }

    async fn remove(&self, image: &ImageRef) -> WrapperResult<()> {
        self.docker(["image".to_string(), "rm".to_string(), image.to_string()])
            .await?
            .check(CONTAINER_RUNTIME)?;
        tracing::info!("Removed image {image}");
        Ok(())
    }
}

#[async_trait]
impl<R: CommandRunner> ContainerRuntime for DockerCli<R> {
    async fn default_user(&self, image: &ImageRef) -> WrapperResult<String> {
        let output = self
            .docker([
                "run".to_string(),
                "--rm".to_string(),
                "--entrypoint".to_string(),
                "whoami".to_string(),
                image.to_string(),
            ])
            .await?
            .check(CONTAINER_RUNTIME)?;
        Ok(output.stdout.trim().to_string())
    }

    async fn memory_limit(
        &self,
        image: &ImageRef,
        container_name: &str,
        limits: &ResourceLimits,
    ) -> WrapperResult<u64> {
        self.docker([
            "run".to_string(),
            "-d".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            container_name.to_string(),
            "--memory".to_string(),
            limits.memory.clone(),
            "--cpus".to_string(),
            limits.cpus.clone(),
            "--entrypoint".to_string(),
            "sleep".to_string(),
            image.to_string(),
            INSPECT_SLEEP_SECS.to_string(),
        ])
        .await?
        .check(CONTAINER_RUNTIME)?;

        let inspected = self
            .docker([
                "inspect".to_string(),
                "--format".to_string(),
                "{{.HostConfig.Memory}}".to_string(),
                container_name.to_string(),
            ])
            .await;

        // The container is removed whether or not the inspection worked.
        if let Err(e) = self.remove_container(container_name).await {
            tracing::warn!("Failed to remove {container_name}: {e}");
        }

        let output = inspected?.check(CONTAINER_RUNTIME)?;
        let text = output.stdout.trim();
        text.parse::<u64>()
            .map_err(|_| WrapperError::Parse(format!("unexpected memory limit '{text}'")))
    }

    async fn run_once(&self, spawn: &SpawnCommand) -> WrapperResult<CommandOutput> {
        self.runner
            .run(&CommandSpec::new(&spawn.program, spawn.args.clone()))
            .await
    }

    async fn remove_container(&self, name: &str) -> WrapperResult<bool> {
        let output = self
            .docker(["rm".to_string(), "-f".to_string(), name.to_string()])
            .await?;
        Ok(output.success())
    }
}
