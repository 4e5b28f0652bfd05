use std::sync::Mutex;
use std::time::Duration;

use console::Style;
use elastix_core::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};

/// Spinner showing which tool is running and how far elastix got.
/// Each tool run gets a fresh spinner.
pub struct SpinnerReporter {
    pb: Mutex<Option<ProgressBar>>,
    error: Style,
}

impl SpinnerReporter {
    pub fn new() -> Self {
        Self {
            pb: Mutex::new(None),
            error: Style::new().red().bold(),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.pb.lock() {
            if let Some(pb) = guard.as_ref() {
                f(pb);
            }
        }
    }
}

impl ProgressReporter for SpinnerReporter {
    fn begin(&self, tool: &str) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner} {msg:40} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("Running {}", tool));
        if let Ok(mut guard) = self.pb.lock() {
            *guard = Some(pb);
        }
    }

    fn resolution(&self, level: u32) {
        self.with_bar(|pb| pb.set_message(format!("Resolution {}", level)));
    }

    fn iteration(&self, level: u32, iteration: u32) {
        self.with_bar(|pb| {
            pb.set_message(format!("Resolution {}, iteration {}", level, iteration))
        });
    }

    fn line(&self, line: &str) {
        self.with_bar(|pb| pb.println(line));
    }

    fn error_line(&self, line: &str) {
        let styled = self.error.apply_to(line).to_string();
        self.with_bar(|pb| pb.println(styled));
    }

    fn finish(&self) {
        if let Ok(mut guard) = self.pb.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }
}
