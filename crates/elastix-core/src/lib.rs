//! Parameter handling and process orchestration for the elastix
//! image-registration toolkit.
//!
//! The registration itself runs in the external `elastix` and `transformix`
//! executables; this crate prepares their inputs, runs them, and reads the
//! results back into arrays.

pub mod config;
pub mod consts;
pub mod error;
pub mod image;
pub mod io;
pub mod locate;
pub mod params;
pub mod process;
pub mod progress;
pub mod register;
pub mod workspace;

pub use error::{ElastixError, Result};
pub use image::{DeformationField, Image, ImageSource, MovingImages};
pub use locate::{get_elastix_exes, ElastixExecutables, ExecutableLocator};
pub use params::{get_advanced_params, get_default_params, ParamValue, Parameters, Scalar, TransformType};
pub use progress::{ProgressReporter, Verbosity};
pub use register::{register, register_with, RegisterOptions, Registrar, Registration};
pub use workspace::{get_tempdir, Workspace};
