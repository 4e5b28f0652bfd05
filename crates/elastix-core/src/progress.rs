//! Routing of elastix/transformix console output.
//!
//! Progress detection scrapes the tool's incidental text (`Resolution: N`
//! lines and tab-separated iteration rows). It is cosmetic and best effort.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{ElastixError, Result};

/// How much of the tool's output is relayed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Only lines that mention an error.
    Quiet,
    /// Resolution/iteration progress events, plus errors.
    #[default]
    Progress,
    /// Every line.
    Full,
}

impl TryFrom<u8> for Verbosity {
    type Error = ElastixError;

    fn try_from(level: u8) -> Result<Self> {
        match level {
            0 => Ok(Self::Quiet),
            1 => Ok(Self::Progress),
            2 => Ok(Self::Full),
            _ => Err(ElastixError::InvalidArgument(format!(
                "verbosity must be 0, 1 or 2 (got {})",
                level
            ))),
        }
    }
}

impl From<Verbosity> for u8 {
    fn from(v: Verbosity) -> u8 {
        match v {
            Verbosity::Quiet => 0,
            Verbosity::Progress => 1,
            Verbosity::Full => 2,
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quiet => write!(f, "Quiet"),
            Self::Progress => write!(f, "Progress"),
            Self::Full => write!(f, "Full"),
        }
    }
}

/// Receives output events from a running tool.
///
/// Implementors can drive progress bars, logging, or any other UI feedback.
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A tool (`elastix` or `transformix`) was started.
    fn begin(&self, _tool: &str) {}

    /// The tool moved to resolution level `level`.
    fn resolution(&self, _level: u32) {}

    /// An optimizer iteration finished within the current resolution.
    fn iteration(&self, _level: u32, _iteration: u32) {}

    /// A raw output line (only at [`Verbosity::Full`]).
    fn line(&self, _line: &str) {}

    /// A line mentioning an error; delivered at every verbosity.
    fn error_line(&self, _line: &str) {}

    /// The tool exited.
    fn finish(&self) {}
}

/// Reporter that discards everything.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Reporter that forwards events to `tracing`.
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn begin(&self, tool: &str) {
        info!("Running {}", tool);
    }

    fn resolution(&self, level: u32) {
        info!(level, "Resolution level");
    }

    fn iteration(&self, level: u32, iteration: u32) {
        debug!(level, iteration, "Iteration");
    }

    fn line(&self, line: &str) {
        info!("{}", line);
    }

    fn error_line(&self, line: &str) {
        error!("{}", line);
    }
}

/// Captures a tool's output and forwards it to a reporter according to
/// the verbosity.
pub struct OutputRelay<'a> {
    verbosity: Verbosity,
    reporter: &'a dyn ProgressReporter,
    level: u32,
    captured: String,
}

impl<'a> OutputRelay<'a> {
    pub fn new(verbosity: Verbosity, reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            verbosity,
            reporter,
            level: 0,
            captured: String::new(),
        }
    }

    pub fn reporter(&self) -> &dyn ProgressReporter {
        self.reporter
    }

    /// Everything fed so far, one line per entry.
    pub fn captured(&self) -> &str {
        &self.captured
    }

    /// Forget captured text (between two tool runs).
    pub fn reset(&mut self) {
        self.captured.clear();
        self.level = 0;
    }

    /// Handle one line of tool output.
    pub fn feed(&mut self, line: &str) {
        let line = line.trim_end_matches(['\r', '\n']);
        self.captured.push_str(line);
        self.captured.push('\n');

        if line.to_ascii_lowercase().contains("error") {
            self.reporter.error_line(line);
            return;
        }

        match self.verbosity {
            Verbosity::Quiet => {}
            Verbosity::Full => self.reporter.line(line),
            Verbosity::Progress => self.scan_progress(line),
        }
    }

    fn scan_progress(&mut self, line: &str) {
        if let Some(rest) = line.strip_prefix("Resolution:") {
            if let Ok(level) = rest.trim().parse::<u32>() {
                self.level = level;
                self.reporter.resolution(level);
            }
            return;
        }
        if let Some((first, _)) = line.split_once('\t') {
            if let Ok(iteration) = first.trim().parse::<u32>() {
                if iteration > 0 {
                    self.reporter.iteration(self.level, iteration);
                }
            }
        }
    }
}
