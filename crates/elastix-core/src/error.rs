use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ElastixError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Could not find the {name} executable; searched:\n{}", format_searched(.searched))]
    ExecutableNotFound { name: String, searched: Vec<PathBuf> },

    #[error("Invalid transform type {0:?} (expected RIGID, AFFINE or BSPLINE)")]
    InvalidTransformType(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Dimension mismatch: moving image is {moving}D, fixed image is {fixed}D")]
    DimensionMismatch { moving: usize, fixed: usize },

    #[error("Unsupported image dimensionality: {0}D (expected 2D or 3D)")]
    UnsupportedDimensions(usize),

    #[error("Image location does not exist: {0}")]
    ImageNotFound(PathBuf),

    #[error("{tool} exited with {}:\n{output}", describe_code(.code))]
    ProcessFailed {
        tool: String,
        code: Option<i32>,
        output: String,
    },

    #[error("Unexpected output from elastix: {0}")]
    OutputParse(String),

    #[error("Config error: {0}")]
    Config(String),
}

fn format_searched(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("  {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {}", c),
        None => "no status (terminated by signal)".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, ElastixError>;
