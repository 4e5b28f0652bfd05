//! Discovery of the `elastix` and `transformix` executables.

use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::consts::{ELASTIX_NAME, ELASTIX_PATH_ENV, TRANSFORMIX_NAME};
use crate::error::{ElastixError, Result};

/// Resolved paths of the two external tools.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElastixExecutables {
    /// The registration driver.
    pub elastix: PathBuf,
    /// The transform-application tool.
    pub transformix: PathBuf,
}

/// Searches for the executables in a fixed order:
/// the override path, well-known install directories, the directory of the
/// running program, then `PATH`. The first match wins.
#[derive(Clone, Debug)]
pub struct ExecutableLocator {
    override_path: Option<PathBuf>,
    search_dirs: Vec<PathBuf>,
}

impl Default for ExecutableLocator {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ExecutableLocator {
    /// Locator using `ELASTIX_PATH` and the platform's default directories.
    pub fn from_env() -> Self {
        let override_path = env::var_os(ELASTIX_PATH_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self {
            override_path,
            search_dirs: default_search_dirs(),
        }
    }

    /// Locator that only looks at the given directories.
    pub fn with_search_dirs(dirs: Vec<PathBuf>) -> Self {
        Self {
            override_path: None,
            search_dirs: dirs,
        }
    }

    /// Set (or clear) the override path. It may name the directory holding
    /// both tools or the `elastix` binary itself.
    pub fn with_override(mut self, path: Option<PathBuf>) -> Self {
        self.override_path = path;
        self
    }

    /// Directories probed, in order.
    pub fn candidate_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if let Some(ref p) = self.override_path {
            if p.is_file() {
                if let Some(parent) = p.parent() {
                    dirs.push(parent.to_path_buf());
                }
            } else {
                dirs.push(p.clone());
            }
        }
        for d in &self.search_dirs {
            if !dirs.contains(d) {
                dirs.push(d.clone());
            }
        }
        dirs
    }

    /// Resolve both executables, or fail listing every path that was probed.
    pub fn locate(&self) -> Result<ElastixExecutables> {
        let dirs = self.candidate_dirs();

        let elastix = match self.override_path.as_deref() {
            Some(p) if p.is_file() && is_executable(p) => p.to_path_buf(),
            _ => find_in(&dirs, ELASTIX_NAME)?,
        };
        let transformix = find_in(&dirs, TRANSFORMIX_NAME)?;

        debug!(elastix = %elastix.display(), transformix = %transformix.display(), "Located elastix executables");
        Ok(ElastixExecutables {
            elastix,
            transformix,
        })
    }
}

/// Find both tools using `ELASTIX_PATH` and the default search locations.
pub fn get_elastix_exes() -> Result<ElastixExecutables> {
    ExecutableLocator::from_env().locate()
}

fn exe_name(base: &str) -> String {
    format!("{}{}", base, env::consts::EXE_SUFFIX)
}

fn find_in(dirs: &[PathBuf], base: &str) -> Result<PathBuf> {
    let name = exe_name(base);
    let searched: Vec<PathBuf> = dirs.iter().map(|d| d.join(&name)).collect();
    match searched.iter().find(|p| is_executable(p)) {
        Some(found) => Ok(found.clone()),
        None => Err(ElastixError::ExecutableNotFound { name, searched }),
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn default_search_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = well_known_dirs();

    // Next to the program using this library
    if let Some(dir) = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        dirs.push(dir);
    }

    if let Some(path) = env::var_os("PATH") {
        dirs.extend(env::split_paths(&path).filter(|p| !p.as_os_str().is_empty()));
    }
    dirs
}

#[cfg(windows)]
fn well_known_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from(r"C:\Program Files\elastix"),
        PathBuf::from(r"C:\Program Files (x86)\elastix"),
    ];
    for var in ["PROGRAMFILES", "PROGRAMFILES(X86)"] {
        if let Some(base) = env::var_os(var) {
            let dir = PathBuf::from(base).join("elastix");
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
    }
    dirs
}

#[cfg(not(windows))]
fn well_known_dirs() -> Vec<PathBuf> {
    [
        "/usr/bin",
        "/usr/local/bin",
        "/opt/local/bin",
        "/usr/elastix",
        "/usr/local/elastix",
        "/usr/bin/elastix",
        "/usr/local/bin/elastix",
        "/opt/elastix/bin",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}
