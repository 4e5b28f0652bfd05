use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use elastix_core::io::image_io::save_image;
use elastix_core::{
    ExecutableLocator, Parameters, RegisterOptions, Registrar, Verbosity, Workspace,
};

use super::register::{input_source, ToolOutputArg};
use crate::progress::SpinnerReporter;

#[derive(Args)]
pub struct TransformArgs {
    /// Image to resample
    pub image: PathBuf,

    /// Transform parameter file written by a registration
    pub transform_parameters: PathBuf,

    /// Output image path (.tiff, .png or .mhd)
    #[arg(short, long, default_value = "transformed.mhd")]
    pub output: PathBuf,

    /// How much transformix output to show
    #[arg(long, value_enum)]
    pub elastix_output: Option<ToolOutputArg>,

    /// elastix install directory or binary (overrides ELASTIX_PATH)
    #[arg(long)]
    pub elastix_path: Option<PathBuf>,

    /// Leave transformix's files (including its log) in the workspace
    #[arg(long)]
    pub keep_workspace: bool,
}

pub fn run(args: &TransformArgs) -> Result<()> {
    let text = fs::read_to_string(&args.transform_parameters).with_context(|| {
        format!("Failed to read {}", args.transform_parameters.display())
    })?;
    let tp = Parameters::parse_elastix_text(&text).with_context(|| {
        format!(
            "Invalid transform parameter file {}",
            args.transform_parameters.display()
        )
    })?;

    let mut locator = ExecutableLocator::from_env();
    if args.elastix_path.is_some() {
        locator = locator.with_override(args.elastix_path.clone());
    }
    let exes = locator
        .locate()
        .context("elastix is not installed or could not be found")?;

    println!(
        "Applying {} to {}",
        tp.transform().unwrap_or("transform"),
        args.image.display()
    );

    let image = input_source(&args.image)?;
    let options = RegisterOptions {
        verbosity: args.elastix_output.map(Verbosity::from).unwrap_or_default(),
        keep_workspace: args.keep_workspace,
        ..Default::default()
    };
    let registrar = Registrar::new(exes, Workspace::for_current_thread())
        .with_reporter(Arc::new(SpinnerReporter::new()));
    let result = registrar
        .apply_transform(&image, &tp, &options)
        .context("transformix failed")?;

    save_image(&result, &args.output)
        .with_context(|| format!("Failed to save {}", args.output.display()))?;
    println!("Saved to {}", args.output.display());
    Ok(())
}
