mod bootstrap;
mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::instances::CreateArgs;
use nimbus_config::Settings;
use nimbus_cloud::ProviderRegistry;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nimbus")]
#[command(about = "Manage compute instances across cloud providers", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (defaults to NIMBUS_CONFIG_PATH, ./nimbus.yaml, ~/.config/nimbus/nimbus.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured providers
    Providers,
    /// List the locations of a provider
    Locations {
        /// Provider key
        provider: String,
    },
    /// List the sizes available in a location
    Sizes {
        /// Provider key
        provider: String,
        /// Location id
        location: String,
    },
    /// List instances across every provider
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one instance
    Show {
        /// Instance id
        id: String,
        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Create an instance
    Create {
        /// Provider key
        #[arg(short, long)]
        provider: String,
        /// Location id (defaults to the provider's default location)
        #[arg(short, long)]
        location: Option<String>,
        /// Size name
        #[arg(short, long)]
        size: String,
        /// Name prefix
        #[arg(short, long, default_value = "nimbus")]
        name: String,
        /// Inventory role (repeatable)
        #[arg(short, long = "role")]
        roles: Vec<String>,
    },
    /// Destroy an instance
    Destroy {
        /// Instance id
        id: String,
    },
    /// Manage instance tags
    Tag {
        #[command(subcommand)]
        command: TagCommands,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum TagCommands {
    /// Add a tag
    Add {
        /// Instance id
        id: String,
        tag: String,
    },
    /// Remove a tag
    Rm {
        /// Instance id
        id: String,
        tag: String,
    },
}

/// Load settings and connect every configured provider
async fn connect(config: Option<&Path>) -> anyhow::Result<ProviderRegistry> {
    let settings = Settings::load(config)?;
    bootstrap::build_registry(&settings).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Providers => commands::providers::handle_providers(&connect(config).await?)?,
        Commands::Locations { provider } => {
            commands::providers::handle_locations(&connect(config).await?, &provider)?
        }
        Commands::Sizes { provider, location } => {
            commands::providers::handle_sizes(&connect(config).await?, &provider, &location)?
        }
        Commands::List { json } => {
            commands::instances::handle_list(&connect(config).await?, json).await?
        }
        Commands::Show { id, json } => {
            commands::instances::handle_show(&connect(config).await?, &id, json).await?
        }
        Commands::Create {
            provider,
            location,
            size,
            name,
            roles,
        } => {
            commands::instances::handle_create(
                &connect(config).await?,
                CreateArgs {
                    provider,
                    location,
                    size,
                    name,
                    roles,
                },
            )
            .await?
        }
        Commands::Destroy { id } => {
            commands::instances::handle_destroy(&connect(config).await?, &id).await?
        }
        Commands::Tag { command } => {
            let registry = connect(config).await?;
            match command {
                TagCommands::Add { id, tag } => {
                    commands::tags::handle_add(&registry, &id, &tag).await?
                }
                TagCommands::Rm { id, tag } => {
                    commands::tags::handle_remove(&registry, &id, &tag).await?
                }
            }
        }
        Commands::Version => {
            println!("{} {}", "nimbus".bold(), env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
