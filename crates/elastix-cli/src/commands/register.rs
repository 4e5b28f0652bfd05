use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use elastix_core::config::RegistrationConfig;
use elastix_core::io::image_io::{load_image, save_image};
use elastix_core::{
    DeformationField, Image, ImageSource, Parameters, Registrar, TransformType, Verbosity,
    Workspace,
};
use tracing::debug;

use crate::progress::SpinnerReporter;
use crate::summary::{self, RunSummary};

#[derive(Clone, Copy, ValueEnum)]
pub enum ToolOutputArg {
    Quiet,
    Progress,
    Full,
}

impl From<ToolOutputArg> for Verbosity {
    fn from(arg: ToolOutputArg) -> Self {
        match arg {
            ToolOutputArg::Quiet => Verbosity::Quiet,
            ToolOutputArg::Progress => Verbosity::Progress,
            ToolOutputArg::Full => Verbosity::Full,
        }
    }
}

/// Flags shared by the commands that run elastix.
#[derive(Args)]
pub struct ToolArgs {
    /// Extra parameter, e.g. -P MaximumNumberOfIterations=200 (repeatable)
    #[arg(short = 'P', long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// elastix parameter file merged over the defaults
    #[arg(long)]
    pub params_file: Option<PathBuf>,

    /// Pass parameters to elastix exactly as given
    #[arg(long)]
    pub exact_params: bool,

    /// Leave the run's files (including elastix.log) in the workspace
    #[arg(long)]
    pub keep_workspace: bool,

    /// How much elastix output to show
    #[arg(long, value_enum)]
    pub elastix_output: Option<ToolOutputArg>,

    /// elastix install directory or binary (overrides ELASTIX_PATH)
    #[arg(long)]
    pub elastix_path: Option<PathBuf>,
}

impl ToolArgs {
    /// Parameters from `--params-file`, then `--param` flags on top.
    pub fn extra_params(&self) -> Result<Parameters> {
        let mut params = match self.params_file {
            Some(ref path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Parameters::parse_elastix_text(&text)
                    .with_context(|| format!("Invalid parameter file {}", path.display()))?
            }
            None => Parameters::new(),
        };
        for pair in &self.params {
            params = params.merge(&parse_param(pair)?);
        }
        Ok(params)
    }

    pub fn apply(&self, config: &mut RegistrationConfig) -> Result<()> {
        config.parameters = config.parameters.merge(&self.extra_params()?);
        config.exact_params |= self.exact_params;
        config.keep_workspace |= self.keep_workspace;
        if let Some(v) = self.elastix_output {
            config.verbosity = v.into();
        }
        if let Some(ref p) = self.elastix_path {
            config.elastix_path = Some(p.clone());
        }
        Ok(())
    }
}

/// Parse `KEY=VALUE`. The value uses parameter-file syntax; commas may
/// separate list entries.
fn parse_param(pair: &str) -> Result<Parameters> {
    let (key, value) = pair
        .split_once('=')
        .with_context(|| format!("Expected KEY=VALUE, got {:?}", pair))?;
    let line = format!("({} {})", key.trim(), value.replace(',', " "));
    Parameters::parse_elastix_text(&line).with_context(|| format!("Invalid --param {:?}", pair))
}

#[derive(Args)]
pub struct RegisterArgs {
    /// Moving image (.mhd, .png, .tiff, ...)
    #[arg(required_unless_present = "config")]
    pub moving: Option<PathBuf>,

    /// Fixed (reference) image
    #[arg(required_unless_present = "config")]
    pub fixed: Option<PathBuf>,

    /// Registration config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Transform type: rigid, affine or bspline
    #[arg(short, long)]
    pub transform: Option<TransformType>,

    #[command(flatten)]
    pub tool: ToolArgs,

    /// Output path for the deformed image (.tiff, .png or .mhd)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory for the deformation field components
    #[arg(long)]
    pub field_output: Option<PathBuf>,

    /// Save the estimated transform parameters to this file
    #[arg(long)]
    pub transform_output: Option<PathBuf>,
}

pub fn run(args: &RegisterArgs) -> Result<()> {
    let mut config = match args.config {
        Some(ref path) => RegistrationConfig::load(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => RegistrationConfig::default(),
    };
    if let Some(ref moving) = args.moving {
        config.moving = moving.clone();
        if args.config.is_none() && args.output.is_none() {
            config.output = default_output(moving);
        }
    }
    if let Some(ref fixed) = args.fixed {
        config.fixed = fixed.clone();
    }
    if let Some(transform) = args.transform {
        config.transform = transform;
    }
    if let Some(ref output) = args.output {
        config.output = output.clone();
    }
    if let Some(ref dir) = args.field_output {
        config.field_output = Some(dir.clone());
    }
    args.tool.apply(&mut config)?;

    let exes = config
        .locator()
        .locate()
        .context("elastix is not installed or could not be found")?;
    let params = config.effective_params();
    let options = config.options();

    summary::print_run_summary(&RunSummary {
        title: "elastix Registration",
        inputs: vec![("Moving", config.moving.as_path()), ("Fixed", config.fixed.as_path())],
        output: &config.output,
        exes: &exes,
        params: &params,
        exact_params: options.exact_params,
        verbosity: options.verbosity,
    });

    let moving = input_source(&config.moving)?;
    let fixed = input_source(&config.fixed)?;

    let workspace = Workspace::for_current_thread();
    debug!(workspace = %workspace.path().display(), "Using workspace");
    let registrar = Registrar::new(exes, workspace).with_reporter(Arc::new(SpinnerReporter::new()));
    let result = registrar
        .register(moving, Some(fixed), &params, &options)
        .context("Registration failed")?;

    save_image(&result.deformed, &config.output)
        .with_context(|| format!("Failed to save {}", config.output.display()))?;
    println!("Saved to {}", config.output.display());

    if let Some(ref dir) = config.field_output {
        save_fields(&result.fields, dir, "field")?;
        println!("Deformation field saved to {}", dir.display());
    }
    if let Some(ref path) = args.transform_output {
        fs::write(path, result.transform_parameters.to_elastix_text())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Transform parameters saved to {}", path.display());
    }

    summary::print_registration_result(&result);
    Ok(())
}

/// `.mhd` files go to elastix as they are; anything else is loaded first.
pub fn input_source(path: &Path) -> Result<ImageSource> {
    if path.extension().and_then(|e| e.to_str()) == Some("mhd") {
        return Ok(ImageSource::Path(path.to_path_buf()));
    }
    let image = load_image(path).with_context(|| format!("Failed to load {}", path.display()))?;
    Ok(ImageSource::Array(image))
}

fn default_output(moving: &Path) -> PathBuf {
    match moving.extension().and_then(|e| e.to_str()) {
        Some("mhd") => PathBuf::from("registered.mhd"),
        _ => PathBuf::from("registered.tiff"),
    }
}

/// Save each displacement component as `<prefix>_<axis>.mhd` in `dir`.
pub fn save_fields(fields: &[DeformationField], dir: &Path, prefix: &str) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    for (i, field) in fields.iter().enumerate() {
        for (component, axis) in field.components.iter().zip(["x", "y", "z"]) {
            let name = if fields.len() > 1 {
                format!("{}{}_{}.mhd", prefix, i, axis)
            } else {
                format!("{}_{}.mhd", prefix, axis)
            };
            let path = dir.join(name);
            save_image(&Image::new(component.clone()), &path)
                .with_context(|| format!("Failed to save {}", path.display()))?;
        }
    }
    Ok(())
}
