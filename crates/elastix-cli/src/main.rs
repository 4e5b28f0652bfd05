mod commands;
mod progress;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "elastix-rs", about = "Image registration with elastix")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a moving image onto a fixed image
    Register(commands::register::RegisterArgs),
    /// Register a group of images to their common mean
    Groupwise(commands::groupwise::GroupwiseArgs),
    /// Apply a saved transform to an image
    Transform(commands::transform::TransformArgs),
    /// Print default or compiled registration parameters
    Params(commands::params::ParamsArgs),
    /// Show where elastix and transformix were found
    Locate(commands::locate::LocateArgs),
    /// Print or save a default registration config (TOML)
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Register(args) => commands::register::run(args),
        Commands::Groupwise(args) => commands::groupwise::run(args),
        Commands::Transform(args) => commands::transform::run(args),
        Commands::Params(args) => commands::params::run(args),
        Commands::Locate(args) => commands::locate::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
