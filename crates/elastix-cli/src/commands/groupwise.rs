use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use elastix_core::config::RegistrationConfig;
use elastix_core::io::image_io::{load_image, save_image};
use elastix_core::{MovingImages, Registrar, TransformType, Workspace};

use super::register::{save_fields, ToolArgs};
use crate::progress::SpinnerReporter;
use crate::summary::{self, RunSummary};

#[derive(Args)]
pub struct GroupwiseArgs {
    /// Images to register jointly (same shape, at least two)
    #[arg(required = true, num_args = 2..)]
    pub images: Vec<PathBuf>,

    #[command(flatten)]
    pub tool: ToolArgs,

    /// Output path for the deformed stack
    #[arg(short, long, default_value = "groupwise.mhd")]
    pub output: PathBuf,

    /// Directory for the per-image deformation field components
    #[arg(long)]
    pub field_output: Option<PathBuf>,
}

pub fn run(args: &GroupwiseArgs) -> Result<()> {
    let mut config = RegistrationConfig {
        transform: TransformType::BSpline,
        output: args.output.clone(),
        field_output: args.field_output.clone(),
        ..Default::default()
    };
    args.tool.apply(&mut config)?;

    let exes = config
        .locator()
        .locate()
        .context("elastix is not installed or could not be found")?;
    let params = config.effective_params();
    let options = config.options();

    let labels: Vec<String> = (0..args.images.len())
        .map(|i| format!("Image {}", i))
        .collect();
    summary::print_run_summary(&RunSummary {
        title: "elastix Groupwise Registration",
        inputs: labels
            .iter()
            .map(String::as_str)
            .zip(args.images.iter().map(PathBuf::as_path))
            .collect(),
        output: &config.output,
        exes: &exes,
        params: &params,
        exact_params: options.exact_params,
        verbosity: options.verbosity,
    });

    let images = args
        .images
        .iter()
        .map(|p| load_image(p).with_context(|| format!("Failed to load {}", p.display())))
        .collect::<Result<Vec<_>>>()?;

    let registrar = Registrar::new(exes, Workspace::for_current_thread())
        .with_reporter(Arc::new(SpinnerReporter::new()));
    let result = registrar
        .register(MovingImages::Group(images), None, &params, &options)
        .context("Groupwise registration failed")?;

    save_image(&result.deformed, &config.output)
        .with_context(|| format!("Failed to save {}", config.output.display()))?;
    println!("Saved deformed stack to {}", config.output.display());

    if let Some(ref dir) = config.field_output {
        save_fields(&result.fields, dir, "field")?;
        println!(
            "{} deformation fields saved to {}",
            result.fields.len(),
            dir.display()
        );
    }

    summary::print_registration_result(&result);
    Ok(())
}
