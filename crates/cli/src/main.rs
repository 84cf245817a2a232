//! deskpilot CLI, the main entry point.
//!
//! Commands:
//! - `run`     Multi-turn headless session, or one message with `--message`
//! - `tools`   List the tool descriptors a session would publish
//! - `config`  Print the default configuration, its path, or validate it

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "deskpilot",
    about = "deskpilot: a computer-use agent that drives a desktop through model tool calls",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent in the terminal
    Run(commands::run::RunArgs),

    /// List the tools a session would publish to the model
    Tools {
        /// Also connect the configured remote tool servers
        #[arg(long)]
        remote: bool,

        /// Print descriptors as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: commands::config_cmd::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => commands::run::run(args).await?,
        Commands::Tools { remote, json } => commands::tools::run(remote, json).await?,
        Commands::Config { action } => commands::config_cmd::run(action)?,
    }

    Ok(())
}
