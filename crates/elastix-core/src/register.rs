//! Registration orchestration.
//!
//! One call runs: validate inputs → normalize parameters → write inputs to
//! the workspace → `elastix` → read the result image → `transformix -def all`
//! → read the deformation field. The workspace is cleared afterwards on
//! success and on failure alike.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use ndarray::Axis;
use tracing::info;

use crate::consts::{
    DEFORMATION_FIELD_FILE, FIXED_IMAGE_STEM, MOVING_IMAGE_STEM, PARAMETER_FILE,
    RESULT_IMAGE_FILE, TRANSFORMED_IMAGE_FILE, TRANSFORM_PARAMETERS_FILE,
};
use crate::error::{ElastixError, Result};
use crate::image::{DeformationField, Image, ImageSource, MovingImages};
use crate::io::mhd::{read_header, read_mhd, write_mhd};
use crate::locate::{ElastixExecutables, ExecutableLocator};
use crate::params::{apply_groupwise, compile_params, Parameters};
use crate::process::run_tool;
use crate::progress::{LogReporter, OutputRelay, ProgressReporter, Verbosity};
use crate::workspace::{Workspace, WorkspaceSession};

/// Per-call switches.
#[derive(Clone, Debug, Default)]
pub struct RegisterOptions {
    /// Pass the parameters to elastix exactly as given.
    pub exact_params: bool,
    pub verbosity: Verbosity,
    /// Leave the run's files (including elastix.log) in the workspace.
    pub keep_workspace: bool,
}

/// Output of a registration.
#[derive(Clone, Debug)]
pub struct Registration {
    /// The moving image resampled onto the fixed image (for groupwise runs,
    /// the whole deformed stack).
    pub deformed: Image,
    /// One field for pairwise runs; one per input image for groupwise runs.
    pub fields: Vec<DeformationField>,
    /// The transform elastix estimated (`TransformParameters.0.txt`).
    pub transform_parameters: Parameters,
}

impl Registration {
    /// The first (for pairwise runs, the only) deformation field.
    pub fn field(&self) -> Option<&DeformationField> {
        self.fields.first()
    }
}

enum Plan {
    Pairwise {
        moving: ImageSource,
        fixed: ImageSource,
        ndim: Option<usize>,
    },
    Groupwise {
        stack: Image,
        ndim: usize,
    },
}

/// Runs elastix/transformix inside a workspace.
pub struct Registrar {
    exes: ElastixExecutables,
    workspace: Workspace,
    reporter: Arc<dyn ProgressReporter>,
}

impl Registrar {
    pub fn new(exes: ElastixExecutables, workspace: Workspace) -> Self {
        Self {
            exes,
            workspace,
            reporter: Arc::new(LogReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn executables(&self) -> &ElastixExecutables {
        &self.exes
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Register `moving` onto `fixed`.
    ///
    /// With [`MovingImages::Group`] the images are registered jointly to their
    /// mean and `fixed` must be `None`.
    pub fn register(
        &self,
        moving: impl Into<MovingImages>,
        fixed: Option<ImageSource>,
        params: &Parameters,
        options: &RegisterOptions,
    ) -> Result<Registration> {
        let plan = plan(moving.into(), fixed)?;

        let (ndim, mut params) = match &plan {
            Plan::Pairwise { ndim, .. } => (*ndim, params.clone()),
            // elastix sees the stack as one image with an extra dimension
            Plan::Groupwise { ndim, .. } => (Some(*ndim + 1), params.clone()),
        };
        if !options.exact_params {
            params = compile_params(&params, ndim);
        }
        if let Plan::Groupwise { ndim, .. } = &plan {
            apply_groupwise(&mut params, *ndim)?;
        }

        let mut session = self.workspace.session()?;
        if options.keep_workspace {
            session.keep();
        }

        let (moving_path, fixed_path) = match &plan {
            Plan::Pairwise { moving, fixed, .. } => (
                input_path(&session, moving, MOVING_IMAGE_STEM)?,
                input_path(&session, fixed, FIXED_IMAGE_STEM)?,
            ),
            Plan::Groupwise { stack, .. } => {
                // The stack is both fixed and moving image.
                let p = write_mhd(stack, session.path(), MOVING_IMAGE_STEM)?;
                (p.clone(), p)
            }
        };
        let params_path = session.path().join(PARAMETER_FILE);
        fs::write(&params_path, params.to_elastix_text())?;

        let mut relay = OutputRelay::new(options.verbosity, self.reporter.as_ref());

        info!(moving = %moving_path.display(), fixed = %fixed_path.display(), "Calling elastix to register images");
        let mut cmd = Command::new(&self.exes.elastix);
        cmd.arg("-m")
            .arg(&moving_path)
            .arg("-f")
            .arg(&fixed_path)
            .arg("-out")
            .arg(session.path())
            .arg("-p")
            .arg(&params_path)
            .current_dir(session.path());
        run_tool(cmd, &mut relay)?;

        let deformed = read_output(&session, RESULT_IMAGE_FILE, "registration")?;
        let tp_path = session.path().join(TRANSFORM_PARAMETERS_FILE);
        let transform_parameters = read_transform_parameters(&tp_path)?;

        info!("Computing deformation field with transformix");
        let mut cmd = Command::new(&self.exes.transformix);
        cmd.arg("-def")
            .arg("all")
            .arg("-out")
            .arg(session.path())
            .arg("-tp")
            .arg(&tp_path)
            .current_dir(session.path());
        run_tool(cmd, &mut relay)?;

        let vectors = read_output(&session, DEFORMATION_FIELD_FILE, "transformation")?;
        let fields = match &plan {
            Plan::Pairwise { ndim, .. } => {
                let ndim = ndim.unwrap_or_else(|| vectors.ndim().saturating_sub(1));
                vec![DeformationField::from_vector_image(&vectors.data, ndim)?]
            }
            Plan::Groupwise { stack, ndim } => {
                let count = stack.shape()[0];
                if vectors.ndim() < 1 || vectors.shape()[0] != count {
                    return Err(ElastixError::OutputParse(format!(
                        "groupwise deformation field of shape {:?} does not hold {} images",
                        vectors.shape(),
                        count
                    )));
                }
                vectors
                    .data
                    .axis_iter(Axis(0))
                    .map(|v| DeformationField::from_vector_image(&v.to_owned(), *ndim))
                    .collect::<Result<Vec<_>>>()?
            }
        };

        info!(fields = fields.len(), "Registration complete");
        Ok(Registration {
            deformed,
            fields,
            transform_parameters,
        })
    }

    /// Resample `image` with a previously estimated transform.
    ///
    /// Only `verbosity` and `keep_workspace` of `options` apply here.
    pub fn apply_transform(
        &self,
        image: &ImageSource,
        transform_parameters: &Parameters,
        options: &RegisterOptions,
    ) -> Result<Image> {
        validate_source(image)?;

        let tp = transform_parameters
            .clone()
            .with("ResultImageFormat", "mhd")
            .with("ResultImagePixelType", "float");

        let mut session = self.workspace.session()?;
        if options.keep_workspace {
            session.keep();
        }
        let input = input_path(&session, image, MOVING_IMAGE_STEM)?;
        let tp_path = session.path().join(TRANSFORM_PARAMETERS_FILE);
        fs::write(&tp_path, tp.to_elastix_text())?;

        let mut relay = OutputRelay::new(options.verbosity, self.reporter.as_ref());
        info!(input = %input.display(), "Calling transformix to apply transform");
        let mut cmd = Command::new(&self.exes.transformix);
        cmd.arg("-in")
            .arg(&input)
            .arg("-out")
            .arg(session.path())
            .arg("-tp")
            .arg(&tp_path)
            .current_dir(session.path());
        run_tool(cmd, &mut relay)?;

        read_output(&session, TRANSFORMED_IMAGE_FILE, "transformation")
    }
}

/// Register using the executables found by [`crate::locate::get_elastix_exes`] and the
/// calling thread's workspace.
pub fn register(
    moving: impl Into<MovingImages>,
    fixed: Option<ImageSource>,
    params: &Parameters,
    options: &RegisterOptions,
) -> Result<Registration> {
    register_with(
        &ExecutableLocator::from_env(),
        Workspace::for_current_thread(),
        moving,
        fixed,
        params,
        options,
    )
}

/// Like [`register`] with an explicit locator and workspace.
///
/// The executables are resolved before anything is written to disk.
pub fn register_with(
    locator: &ExecutableLocator,
    workspace: Workspace,
    moving: impl Into<MovingImages>,
    fixed: Option<ImageSource>,
    params: &Parameters,
    options: &RegisterOptions,
) -> Result<Registration> {
    let exes = locator.locate()?;
    Registrar::new(exes, workspace).register(moving, fixed, params, options)
}

fn plan(moving: MovingImages, fixed: Option<ImageSource>) -> Result<Plan> {
    match moving {
        MovingImages::Single(moving) => {
            let fixed = fixed.ok_or_else(|| {
                ElastixError::InvalidArgument(
                    "a fixed image is required unless registering a group of images".into(),
                )
            })?;
            let m = validate_source(&moving)?;
            let f = validate_source(&fixed)?;
            if let (Some(m), Some(f)) = (m, f) {
                if m != f {
                    return Err(ElastixError::DimensionMismatch {
                        moving: m,
                        fixed: f,
                    });
                }
            }
            Ok(Plan::Pairwise {
                moving,
                fixed,
                ndim: m.or(f),
            })
        }
        MovingImages::Group(images) => {
            if fixed.is_some() {
                return Err(ElastixError::InvalidArgument(
                    "groupwise registration takes no fixed image".into(),
                ));
            }
            if images.len() < 2 {
                return Err(ElastixError::InvalidArgument(format!(
                    "groupwise registration needs at least 2 images (got {})",
                    images.len()
                )));
            }
            for im in &images {
                check_ndim(im.ndim())?;
            }
            let ndim = images[0].ndim();
            let stack = Image::stack(&images)?;
            Ok(Plan::Groupwise { stack, ndim })
        }
    }
}

fn check_ndim(ndim: usize) -> Result<usize> {
    match ndim {
        2 | 3 => Ok(ndim),
        n => Err(ElastixError::UnsupportedDimensions(n)),
    }
}

/// Check an input and return its dimensionality when it can be known
/// without handing the file to elastix.
fn validate_source(source: &ImageSource) -> Result<Option<usize>> {
    match source {
        ImageSource::Array(im) => check_ndim(im.ndim()).map(Some),
        ImageSource::Path(p) => {
            if !p.is_file() {
                return Err(ElastixError::ImageNotFound(p.clone()));
            }
            if p.extension().and_then(|e| e.to_str()) == Some("mhd") {
                let header = read_header(p)?;
                return check_ndim(header.ndims()).map(Some);
            }
            Ok(None)
        }
    }
}

fn input_path(session: &WorkspaceSession, source: &ImageSource, stem: &str) -> Result<PathBuf> {
    match source {
        ImageSource::Array(im) => write_mhd(im, session.path(), stem),
        // Tools run with the workspace as working directory
        ImageSource::Path(p) => Ok(fs::canonicalize(p)?),
    }
}

/// Read an output image the tool should have produced after exiting cleanly.
fn read_output(session: &WorkspaceSession, name: &str, stage: &str) -> Result<Image> {
    let path = session.path().join(name);
    read_mhd(&path).map_err(|e| {
        ElastixError::OutputParse(format!(
            "an error occurred during {}: could not read {}: {}",
            stage,
            path.display(),
            e
        ))
    })
}

fn read_transform_parameters(path: &Path) -> Result<Parameters> {
    let text = fs::read_to_string(path).map_err(|e| {
        ElastixError::OutputParse(format!("could not read {}: {}", path.display(), e))
    })?;
    Parameters::parse_elastix_text(&text)
        .map_err(|e| ElastixError::OutputParse(format!("{}: {}", path.display(), e)))
}
