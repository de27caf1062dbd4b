//! context7-docker: container recipe, spawn command, and host registration plumbing
//! for running the Context7 MCP server inside a resource-limited container.

pub mod claude;
pub mod config;
pub mod docker;
pub mod error;
pub mod recipe;
pub mod registration;
pub mod runner;
pub mod spawn;

pub use claude::{parse_listing, ClaudeCli, Health, ProcessRegistrar, RegistryEntry};
pub use config::{ImageRef, ResourceLimits, Scope, SecretMount, WrapperConfig};
pub use docker::{parse_image_inspect, BuildOptions, ContainerRuntime, DockerCli, ImageBuilder, ImageFacts};
pub use error::{WrapperError, WrapperResult};
pub use recipe::ImageRecipe;
pub use registration::{
    deregister, entry_count, register, status, Registration, RegistrationStatus, RemovalOutcome,
};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use spawn::SpawnCommand;
