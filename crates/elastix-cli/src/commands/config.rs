use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use elastix_core::config::RegistrationConfig;
use elastix_core::get_default_params;

#[derive(Args)]
pub struct ConfigArgs {
    /// Write config to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Include the transform's default parameters in the `parameters` table
    #[arg(long)]
    pub with_defaults: bool,
}

/// Print or save a default RegistrationConfig as TOML.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let mut config = RegistrationConfig::default();
    if args.with_defaults {
        config.parameters = get_default_params(config.transform);
    }
    let toml_str = toml::to_string_pretty(&config)?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &toml_str)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        println!("Default config saved to {}", path.display());
    } else {
        print!("{}", toml_str);
    }

    Ok(())
}
