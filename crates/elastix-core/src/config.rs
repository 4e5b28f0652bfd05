use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ElastixError, Result};
use crate::locate::ExecutableLocator;
use crate::params::{get_default_params, Parameters, TransformType};
use crate::progress::Verbosity;
use crate::register::RegisterOptions;

/// A pairwise registration job, loadable from TOML.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistrationConfig {
    pub moving: PathBuf,
    pub fixed: PathBuf,
    /// Where the deformed image is saved (format from the extension).
    pub output: PathBuf,
    /// Directory for the deformation field components, if wanted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_output: Option<PathBuf>,
    #[serde(default)]
    pub transform: TransformType,
    #[serde(default)]
    pub verbosity: Verbosity,
    #[serde(default)]
    pub exact_params: bool,
    #[serde(default)]
    pub keep_workspace: bool,
    /// Overrides `ELASTIX_PATH`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elastix_path: Option<PathBuf>,
    /// Merged over the transform's default parameters.
    #[serde(default)]
    pub parameters: Parameters,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            moving: PathBuf::from("moving.png"),
            fixed: PathBuf::from("fixed.png"),
            output: PathBuf::from("registered.tiff"),
            field_output: None,
            transform: TransformType::default(),
            verbosity: Verbosity::default(),
            exact_params: false,
            keep_workspace: false,
            elastix_path: None,
            parameters: Parameters::new(),
        }
    }
}

impl RegistrationConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ElastixError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ElastixError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Default parameters for `transform` with `parameters` merged on top.
    pub fn effective_params(&self) -> Parameters {
        get_default_params(self.transform).merge(&self.parameters)
    }

    pub fn options(&self) -> RegisterOptions {
        RegisterOptions {
            exact_params: self.exact_params,
            verbosity: self.verbosity,
            keep_workspace: self.keep_workspace,
        }
    }

    /// Executable locator honoring `elastix_path` before `ELASTIX_PATH`.
    pub fn locator(&self) -> ExecutableLocator {
        let locator = ExecutableLocator::from_env();
        match &self.elastix_path {
            Some(p) => locator.with_override(Some(p.clone())),
            None => locator,
        }
    }
}
