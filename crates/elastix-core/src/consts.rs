/// Environment variable that overrides the executable search.
pub const ELASTIX_PATH_ENV: &str = "ELASTIX_PATH";

/// Base names of the two external executables (platform suffix added at lookup).
pub const ELASTIX_NAME: &str = "elastix";
pub const TRANSFORMIX_NAME: &str = "transformix";

/// Directory under the system temp dir holding per-thread workspaces.
pub const WORKSPACE_DIR_NAME: &str = "elastix-rs";

/// Prefix of per-process workspace directories (`pid<PID>_t<SLOT>`).
pub const WORKSPACE_PID_PREFIX: &str = "pid";

/// Parameter file written for each registration.
pub const PARAMETER_FILE: &str = "params.txt";

/// Stems of the input images written into the workspace.
pub const MOVING_IMAGE_STEM: &str = "im1";
pub const FIXED_IMAGE_STEM: &str = "im2";

/// Output files produced by elastix / transformix.
pub const RESULT_IMAGE_FILE: &str = "result.0.mhd";
pub const TRANSFORMED_IMAGE_FILE: &str = "result.mhd";
pub const TRANSFORM_PARAMETERS_FILE: &str = "TransformParameters.0.txt";
pub const DEFORMATION_FIELD_FILE: &str = "deformationField.mhd";

/// Parameters whose value must be given once per spatial dimension.
pub const PER_DIMENSION_PARAMS: [&str; 2] = [
    "FinalGridSpacingInPhysicalUnits",
    "FinalGridSpacingInVoxels",
];

/// Parameters only meaningful for B-spline transforms.
pub const BSPLINE_ONLY_PARAMS: [&str; 3] = [
    "FinalGridSpacingInPhysicalUnits",
    "FinalGridSpacingInVoxels",
    "GridSpacingSchedule",
];

/// Parameters only meaningful for rigid/affine transforms.
pub const LINEAR_ONLY_PARAMS: [&str; 2] = [
    "AutomaticScalesEstimation",
    "AutomaticTransformInitialization",
];

/// Default number of resolution levels in the image pyramid.
pub const DEFAULT_NUMBER_OF_RESOLUTIONS: i64 = 4;

/// Upper bound on pyramid levels; the coarsest level shrinks by 2^(levels - 1).
pub const MAX_NUMBER_OF_RESOLUTIONS: i64 = 32;

/// Default maximum number of optimizer iterations per resolution level.
/// 200-2000 works for most nonrigid registrations.
pub const DEFAULT_MAX_ITERATIONS: i64 = 500;

/// Default final B-spline grid spacing, in physical units.
pub const DEFAULT_GRID_SPACING: i64 = 16;

/// Number of random stack slices sampled per iteration in groupwise mode.
pub const GROUPWISE_SAMPLES_LAST_DIMENSION: i64 = 5;
