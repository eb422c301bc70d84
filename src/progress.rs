//! Progress reporting utilities using indicatif.
//!
//! This module provides the [`Progress`] struct which implements
//! [`ProgressCallback`] to display progress bars for each deduplication pass,
//! and [`ResolveProgressCallback`] for the removal phase.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::actions::{RemovalReport, ResolveProgressCallback};

/// Progress callback for the deduplication passes.
///
/// Implement this trait to receive progress updates while files are walked,
/// fingerprinted and compared.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (e.g., "exact", "perceptual")
    /// * `total` - Total number of items to process
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called for each item processed.
    ///
    /// # Arguments
    ///
    /// * `current` - Number of items processed so far (1-based)
    /// * `label` - Short description of the current item
    fn on_progress(&self, current: usize, label: &str);

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);

    /// Called to update the progress message.
    fn on_message(&self, _message: &str) {}
}

/// Progress reporter using indicatif.
pub struct Progress {
    multi: MultiProgress,
    walking: Mutex<Option<ProgressBar>>,
    current: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress bars will be displayed.
    ///
    /// # Examples
    ///
    /// ```
    /// use photodupe::progress::Progress;
    ///
    /// let progress = Progress::new(true);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            walking: Mutex::new(None),
            current: Mutex::new(None),
            quiet,
        }
    }

    fn walking_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn phase_message(phase: &str) -> String {
        match phase {
            "exact" => "Hashing contents".to_string(),
            "perceptual" => "Hashing images".to_string(),
            "video-probe" => "Probing videos".to_string(),
            "video" => "Comparing videos".to_string(),
            "resolve" => "Resolving duplicates".to_string(),
            other => other.to_string(),
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }

        if phase == "walking" {
            let pb = self.multi.add(ProgressBar::new_spinner());
            pb.set_style(Self::walking_style());
            pb.set_message("Walking directory");
            pb.enable_steady_tick(Duration::from_millis(100));
            if let Ok(mut walking) = self.walking.lock() {
                *walking = Some(pb);
            }
            return;
        }

        let pb = self.multi.add(ProgressBar::new(total as u64));
        pb.set_style(Self::bar_style());
        pb.set_message(Self::phase_message(phase));
        if let Ok(mut current) = self.current.lock() {
            *current = Some(pb);
        }
    }

    fn on_progress(&self, current: usize, label: &str) {
        if self.quiet {
            return;
        }

        let display_msg = truncate_path(label, 30);
        if let Ok(guard) = self.current.lock() {
            if let Some(ref pb) = *guard {
                pb.set_position(current as u64);
                pb.set_message(display_msg);
                return;
            }
        }
        if let Ok(guard) = self.walking.lock() {
            if let Some(ref pb) = *guard {
                pb.set_position(current as u64);
                pb.set_message(display_msg);
            }
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }

        let slot = if phase == "walking" {
            &self.walking
        } else {
            &self.current
        };
        if let Some(pb) = slot.lock().ok().and_then(|mut s| s.take()) {
            pb.finish_with_message(format!("{} complete", Self::phase_message(phase)));
        }
    }

    fn on_message(&self, message: &str) {
        if self.quiet {
            return;
        }

        if let Ok(guard) = self.current.lock() {
            if let Some(ref pb) = *guard {
                pb.set_message(message.to_string());
            }
        }
    }
}

impl ResolveProgressCallback for Progress {
    fn on_before_action(&self, path: &Path, index: usize, total: usize) {
        if index == 0 {
            self.on_phase_start("resolve", total);
        }
        self.on_progress(index + 1, path.to_string_lossy().as_ref());
    }

    fn on_action_success(&self, _path: &Path, _size: u64) {}

    fn on_action_failure(&self, path: &Path, error: &str) {
        self.on_message(&format!("failed: {} ({})", truncate_path(&path.to_string_lossy(), 30), error));
    }

    fn on_complete(&self, _report: &RemovalReport) {
        self.on_phase_end("resolve");
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if name_len + 4 > max_len {
        let tail: String = file_name.chars().skip(name_len + 3 - max_len).collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}
