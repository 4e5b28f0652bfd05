use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use elastix_core::params::compile_params;
use elastix_core::{get_advanced_params, get_default_params, TransformType};

#[derive(Args)]
pub struct ParamsArgs {
    /// Transform type: rigid, affine or bspline
    #[arg(short, long, default_value = "bspline")]
    pub transform: TransformType,

    /// Print the advanced parameters instead of the defaults
    #[arg(long, conflicts_with = "ndim")]
    pub advanced: bool,

    /// Print the parameters as sent to elastix for an image of this dimensionality
    #[arg(long)]
    pub ndim: Option<usize>,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Print or save a parameter set in elastix parameter-file syntax.
pub fn run(args: &ParamsArgs) -> Result<()> {
    let params = if args.advanced {
        get_advanced_params()
    } else {
        let defaults = get_default_params(args.transform);
        match args.ndim {
            Some(n) => compile_params(&defaults, Some(n)),
            None => defaults,
        }
    };
    let text = params.to_elastix_text();

    if let Some(ref path) = args.output {
        std::fs::write(path, &text)
            .with_context(|| format!("Failed to write parameters to {}", path.display()))?;
        println!("{} parameters saved to {}", params.len(), path.display());
    } else {
        print!("{}", text);
    }

    Ok(())
}
