//! context7-docker-mcp entry point.

use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use context7_docker::config::Overrides;
use context7_docker::{RemovalOutcome, WrapperConfig};
use context7_docker_mcp::output;
use context7_docker_mcp::probe;
use context7_docker_mcp::types::{MCP_VERSION, REQUIRED_TOOLS};
use context7_docker_mcp::{Suite, Toolkit};

#[derive(Parser)]
#[command(
    name = "context7-docker-mcp",
    about = "Build, register, and verify the Context7 MCP server as a resource-limited container",
    version
)]
struct Cli {
    /// Image reference (name:version). Also reads CONTEXT7_IMAGE.
    #[arg(long, global = true)]
    image: Option<String>,

    /// Container name used in the spawn command. Also reads CONTEXT7_CONTAINER_NAME.
    #[arg(long, global = true)]
    container_name: Option<String>,

    /// Registration scope (user, project). Also reads CONTEXT7_SCOPE.
    #[arg(long, global = true)]
    scope: Option<String>,

    /// API key file mounted into the container when it exists.
    /// Also reads CONTEXT7_SECRET_FILE; defaults to ~/.context7/api_key.
    #[arg(long, global = true)]
    secret_file: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the server image.
    Build {
        /// Target platform (linux/amd64, linux/arm64). Repeat for several;
        /// with --push and none given, every configured platform is built.
        #[arg(long = "platform")]
        platforms: Vec<String>,

        /// Push the result instead of loading it locally.
        #[arg(long)]
        push: bool,

        /// Also write the Dockerfile into this directory.
        #[arg(long)]
        context_dir: Option<PathBuf>,

        /// Print the build summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Register the container with the host assistant (replaces any existing entry).
    Register {
        /// Registration name.
        #[arg(long)]
        name: Option<String>,
    },

    /// Remove the registration; absence is not an error.
    Deregister {
        /// Registration name.
        #[arg(long)]
        name: Option<String>,
    },

    /// Show whether the server is registered and connected.
    Status {
        /// Registration name.
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Print the command line the host uses to launch the server.
    SpawnCommand,

    /// Start a container and list the tools it advertises.
    Tools {
        #[arg(long)]
        json: bool,
    },

    /// Fetch library documentation through the containerized server.
    ///
    /// Examples:
    ///   context7-docker-mcp docs react --topic hooks
    ///   context7-docker-mcp docs /vercel/next.js --tokens 5000
    Docs {
        /// Library name, or a `/org/project` library id.
        library: String,

        /// Focus the documentation on a topic.
        #[arg(long)]
        topic: Option<String>,

        /// Maximum tokens of documentation to return.
        #[arg(long)]
        tokens: Option<u32>,
    },

    /// Run a verification suite, stopping at the first failure.
    Verify {
        /// Suite to run (image, container, protocol, registration, all).
        #[arg(long, default_value = "all")]
        suite: Suite,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Deregister, remove any lingering container, and remove the image.
    Clean,

    /// Print the resolved configuration as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   context7-docker-mcp completions bash > ~/.local/share/bash-completion/completions/context7-docker-mcp
    ///   context7-docker-mcp completions zsh > ~/.zfunc/_context7-docker-mcp
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },

    /// Launch interactive REPL mode.
    Repl,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        output::failure(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(
            shell,
            &mut cmd,
            "context7-docker-mcp",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    let overrides = Overrides {
        image: cli.image,
        container_name: cli.container_name,
        scope: cli.scope,
        secret_file: cli.secret_file,
    };
    let config = WrapperConfig::resolve(&overrides).context("invalid configuration")?;
    let toolkit = Toolkit::system(config);

    match cli.command {
        Commands::Build {
            platforms,
            push,
            context_dir,
            json,
        } => {
            let summary = toolkit
                .build(&platforms, push, context_dir.as_deref())
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                if let Some(path) = &summary.dockerfile {
                    output::note(&format!("Dockerfile written to {}", path.display()));
                }
                match &summary.facts {
                    Some(facts) => output::success(&format!(
                        "Built {} ({:.1} MB, {}/{})",
                        summary.image,
                        facts.size_bytes as f64 / 1_000_000.0,
                        facts.os,
                        facts.architecture
                    )),
                    None => output::success(&format!(
                        "Built and pushed {} for {}",
                        summary.image,
                        summary.platforms.join(", ")
                    )),
                }
            }
        }

        Commands::Register { name } => {
            let registration = toolkit.register(name.as_deref()).await?;
            if registration.replaced {
                output::note(&format!("Replaced existing '{}' entry", registration.name));
            }
            output::success(&format!(
                "Registered '{}' ({} scope)",
                registration.name, registration.scope
            ));
            output::note(&registration.command);
        }

        Commands::Deregister { name } => {
            let name = name.unwrap_or_else(|| toolkit.config().registration_name.clone());
            match toolkit.deregister(Some(&name)).await? {
                RemovalOutcome::Removed => output::success(&format!("Removed '{name}'")),
                RemovalOutcome::NotPresent => output::note(&format!("'{name}' was not registered")),
            }
        }

        Commands::Status { name, json } => {
            let status = toolkit.status(name.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                eprintln!("{}", output::status_line(&status));
                if let Some(command) = &status.command {
                    output::note(command);
                }
            }
        }

        Commands::SpawnCommand => {
            println!("{}", toolkit.spawn_command());
        }

        Commands::Tools { json } => {
            let tools = toolkit.tools().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tools)?);
            } else {
                output::print_tools(&tools);
                let missing = probe::missing_required_tools(&tools);
                if !missing.is_empty() {
                    output::failure(&format!("missing required tools: {}", missing.join(", ")));
                }
            }
        }

        Commands::Docs {
            library,
            topic,
            tokens,
        } => {
            let result = toolkit.docs(&library, topic.as_deref(), tokens).await?;
            if result.is_error() {
                anyhow::bail!(probe::render_result(&result));
            }
            println!("{}", probe::render_result(&result));
        }

        Commands::Verify { suite, json } => {
            let report = toolkit.verify(suite).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                output::print_report(&report);
            }
            if let Some(failed) = report.failure() {
                anyhow::bail!("{}: {}", failed.name, failed.detail);
            }
        }

        Commands::Clean => {
            let summary = toolkit.clean().await?;
            match summary.registration {
                RemovalOutcome::Removed => output::success("Registration removed"),
                RemovalOutcome::NotPresent => output::note("No registration to remove"),
            }
            if summary.container_removed {
                output::success("Container removed");
            }
            if summary.image_removed {
                output::success(&format!("Image {} removed", toolkit.config().image));
            } else {
                output::note(&format!("Image {} not present", toolkit.config().image));
            }
        }

        Commands::Info => {
            let config = toolkit.config();
            let info = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "protocol_version": MCP_VERSION,
                "config": config,
                "secret_mounted": config.secret.is_present(),
                "spawn_command": toolkit.spawn_command().to_string(),
                "required_tools": REQUIRED_TOOLS,
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Repl => {
            let runtime = tokio::runtime::Handle::current();
            tokio::task::block_in_place(|| context7_docker_mcp::repl::run(&toolkit, &runtime))?;
        }

        Commands::Completions { .. } => {}
    }

    Ok(())
}
