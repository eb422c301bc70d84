//! Duplicate finder orchestrating the three grouping passes.
//!
//! # Pipeline
//!
//! 1. **Exact** - every file is digested with SHA-256; equal digests form
//!    groups.
//! 2. **Perceptual** - images not yet grouped are hashed with pHash. Hashes
//!    are visited largest image first; each unvisited hash seeds a group and
//!    absorbs every later unvisited hash within the distance threshold.
//! 3. **Video** - videos not yet grouped are profiled, then each unvisited
//!    video seeds a group and is compared against a bounded number of later
//!    unvisited videos.
//!
//! Each file ends up in at most one group. Fingerprinting failures skip the
//! file and are counted in the [`ScanSummary`].

use std::convert::Infallible;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytesize::ByteSize;

use super::executor::{ExecutorError, ParallelExecutor};
use super::groups::{
    group_by_key, select_original, sort_groups, ConsumedSet, DuplicateGroup, MatchKind, PassStats,
};
use super::similarity::{compare_videos, is_similar_image, perceptual_threshold};
use crate::progress::ProgressCallback;
use crate::scanner::{
    video_profile, ClassifiedFiles, FfmpegSampler, FileRecord, Hasher, ImageCrateDecoder,
    ImageDecoder, PerceptualHash, VideoFrameSampler, VideoProfile, Walker, WalkerConfig,
};

/// Default sensitivity for perceptual and video comparison.
pub const DEFAULT_SENSITIVITY: f64 = 0.9;

/// Default number of later videos compared against each seed.
pub const DEFAULT_VIDEO_COMPARE_LIMIT: usize = 50;

/// Configuration for the duplicate finder.
#[derive(Clone)]
pub struct FinderConfig {
    /// Similarity sensitivity in `[0, 1]`; 1.0 means identical.
    pub sensitivity: f64,
    /// Worker count; `None` uses one per CPU core.
    pub threads: Option<usize>,
    /// Maximum number of later videos compared against each seed.
    pub video_compare_limit: usize,
    /// Walker configuration for directory traversal.
    pub walker_config: WalkerConfig,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback for reporting.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for FinderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinderConfig")
            .field("sensitivity", &self.sensitivity)
            .field("threads", &self.threads)
            .field("video_compare_limit", &self.video_compare_limit)
            .field("walker_config", &self.walker_config)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            sensitivity: DEFAULT_SENSITIVITY,
            threads: None,
            video_compare_limit: DEFAULT_VIDEO_COMPARE_LIMIT,
            walker_config: WalkerConfig::default(),
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl FinderConfig {
    /// Set the similarity sensitivity.
    #[must_use]
    pub fn with_sensitivity(mut self, sensitivity: f64) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    /// Set the worker count (`None` for one per core).
    #[must_use]
    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    /// Set how many later videos each seed is compared against.
    #[must_use]
    pub fn with_video_compare_limit(mut self, limit: usize) -> Self {
        self.video_compare_limit = limit;
        self
    }

    /// Set the walker configuration.
    #[must_use]
    pub fn with_walker_config(mut self, config: WalkerConfig) -> Self {
        self.walker_config = config;
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Reject values no pass can work with.
    ///
    /// # Errors
    ///
    /// Returns an error for a sensitivity outside `[0, 1]` (or NaN), a
    /// worker count of zero or a video compare limit of zero.
    pub fn validate(&self) -> Result<(), FinderError> {
        if !(0.0..=1.0).contains(&self.sensitivity) {
            return Err(FinderError::InvalidSensitivity(self.sensitivity));
        }
        if self.threads == Some(0) {
            return Err(FinderError::Executor(ExecutorError::ZeroThreads));
        }
        if self.video_compare_limit == 0 {
            return Err(FinderError::InvalidCompareLimit);
        }
        Ok(())
    }

    /// Check if shutdown has been requested.
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Summary statistics from a deduplication scan.
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    /// Total number of files in the listing
    pub total_files: usize,
    /// Number of image files
    pub images: usize,
    /// Number of video files
    pub videos: usize,
    /// Total size of all listed files in bytes
    pub total_size: u64,
    /// Exact pass counters
    pub exact: PassStats,
    /// Perceptual pass counters
    pub perceptual: PassStats,
    /// Video pass counters
    pub video: PassStats,
    /// Passes that did not run and why
    pub skipped_passes: Vec<String>,
    /// Number of confirmed duplicate groups
    pub duplicate_groups: usize,
    /// Total number of duplicate files (excluding originals)
    pub duplicate_files: usize,
    /// Total space that can be reclaimed by removing duplicates
    pub reclaimable_space: u64,
    /// Errors encountered while walking the directory
    pub scan_errors: usize,
    /// Duration of the entire scan
    pub scan_duration: Duration,
}

impl ScanSummary {
    /// Calculate the percentage of space that is wasted by duplicates.
    #[must_use]
    pub fn wasted_percentage(&self) -> f64 {
        if self.total_size == 0 {
            0.0
        } else {
            (self.reclaimable_space as f64 / self.total_size as f64) * 100.0
        }
    }

    /// Files whose fingerprint could not be computed, across all passes.
    #[must_use]
    pub fn skipped_files(&self) -> usize {
        self.exact.failed + self.perceptual.failed + self.video.failed
    }

    /// Format reclaimable space as human-readable string.
    #[must_use]
    pub fn reclaimable_display(&self) -> String {
        ByteSize(self.reclaimable_space).to_string()
    }

    /// Format total size as human-readable string.
    #[must_use]
    pub fn total_size_display(&self) -> String {
        ByteSize(self.total_size).to_string()
    }

    fn record_groups(&mut self, groups: &[DuplicateGroup]) {
        self.duplicate_groups = groups.len();
        self.duplicate_files = groups.iter().map(DuplicateGroup::duplicate_count).sum();
        self.reclaimable_space = groups.iter().map(DuplicateGroup::reclaimable_bytes).sum();
    }
}

/// Errors that can occur during duplicate finding.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// The scan was interrupted by user (Ctrl+C or shutdown signal).
    #[error("Scan interrupted by user")]
    Interrupted,

    /// The provided path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(std::path::PathBuf),

    /// The provided path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(std::path::PathBuf),

    /// Sensitivity outside `[0, 1]`.
    #[error("Sensitivity must be between 0 and 1, got {0}")]
    InvalidSensitivity(f64),

    /// Video compare limit of zero.
    #[error("Video compare limit must be at least 1")]
    InvalidCompareLimit,

    /// The worker pool could not be set up.
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Duplicate finder that runs the exact, perceptual and video passes.
///
/// The perceptual and video passes need a decoder and a sampler; without
/// them the pass is skipped and the reason recorded in the summary.
///
/// # Example
///
/// ```no_run
/// use photodupe::duplicates::{DuplicateFinder, FinderConfig};
/// use std::path::Path;
///
/// let finder = DuplicateFinder::with_defaults(FinderConfig::default());
/// let (groups, summary) = finder.find_duplicates(Path::new("/photos")).unwrap();
///
/// println!("Found {} duplicate groups", groups.len());
/// println!("Reclaimable space: {}", summary.reclaimable_display());
/// ```
pub struct DuplicateFinder {
    config: FinderConfig,
    hasher: Hasher,
    image_decoder: Option<Arc<dyn ImageDecoder>>,
    video_sampler: Option<Arc<dyn VideoFrameSampler>>,
}

impl std::fmt::Debug for DuplicateFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplicateFinder")
            .field("config", &self.config)
            .field("image_decoder", &self.image_decoder.as_ref().map(|_| "<decoder>"))
            .field("video_sampler", &self.video_sampler.as_ref().map(|_| "<sampler>"))
            .finish()
    }
}

impl DuplicateFinder {
    /// Create a finder that only runs the exact pass until a decoder or
    /// sampler is attached.
    #[must_use]
    pub fn new(config: FinderConfig) -> Self {
        let mut hasher = Hasher::new();
        if let Some(ref flag) = config.shutdown_flag {
            hasher = hasher.with_shutdown_flag(flag.clone());
        }
        Self {
            config,
            hasher,
            image_decoder: None,
            video_sampler: None,
        }
    }

    /// Create a finder with the `image` crate decoder and, when `ffmpeg` is
    /// installed, the ffmpeg frame sampler.
    #[must_use]
    pub fn with_defaults(config: FinderConfig) -> Self {
        let finder = Self::new(config).with_image_decoder(Arc::new(ImageCrateDecoder::new()));
        match FfmpegSampler::locate() {
            Some(sampler) => finder.with_video_sampler(Arc::new(sampler)),
            None => finder,
        }
    }

    /// Attach the decoder used by the perceptual pass.
    #[must_use]
    pub fn with_image_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.image_decoder = Some(decoder);
        self
    }

    /// Attach the sampler used by the video pass.
    #[must_use]
    pub fn with_video_sampler(mut self, sampler: Arc<dyn VideoFrameSampler>) -> Self {
        self.video_sampler = Some(sampler);
        self
    }

    /// The finder configuration.
    #[must_use]
    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Walk `path` and find every duplicate group under it.
    ///
    /// # Errors
    ///
    /// Returns `FinderError` if:
    /// - The configuration is invalid
    /// - The path does not exist or is not a directory
    /// - The scan is interrupted by shutdown signal
    pub fn find_duplicates(
        &self,
        path: &Path,
    ) -> Result<(Vec<DuplicateGroup>, ScanSummary), FinderError> {
        self.config.validate()?;

        if !path.exists() {
            return Err(FinderError::PathNotFound(path.to_path_buf()));
        }
        if !path.is_dir() {
            return Err(FinderError::NotADirectory(path.to_path_buf()));
        }

        let mut walker = Walker::new(path, self.config.walker_config.clone());
        if let Some(ref flag) = self.config.shutdown_flag {
            walker = walker.with_shutdown_flag(flag.clone());
        }

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start("walking", 0);
        }
        let (files, errors) = walker.classify();
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end("walking");
        }
        self.check_interrupted()?;

        let (groups, mut summary) = self.find_duplicates_in(&files)?;
        summary.scan_errors = errors.len();
        Ok((groups, summary))
    }

    /// Find duplicate groups in an already classified listing.
    ///
    /// Groups are returned in pass order (exact, perceptual, video), each
    /// pass sorted by original path.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration, a worker pool that
    /// cannot be built, or an interrupted scan.
    pub fn find_duplicates_in(
        &self,
        files: &ClassifiedFiles,
    ) -> Result<(Vec<DuplicateGroup>, ScanSummary), FinderError> {
        self.config.validate()?;
        let start_time = Instant::now();

        let mut executor = ParallelExecutor::new(self.config.threads)?;
        if let Some(ref flag) = self.config.shutdown_flag {
            executor = executor.with_shutdown_flag(flag.clone());
        }
        if let Some(ref callback) = self.config.progress_callback {
            executor = executor.with_progress_callback(callback.clone());
        }

        let mut summary = ScanSummary {
            total_files: files.len(),
            images: files.images.len(),
            videos: files.videos.len(),
            total_size: files.total_size(),
            ..Default::default()
        };
        let mut consumed = ConsumedSet::new();
        let mut all_groups = Vec::new();

        // Exact pass
        let candidates: Vec<FileRecord> = files.iter().cloned().collect();
        let (groups, stats) = self.exact_pass(&executor, &candidates);
        self.check_interrupted()?;
        log::info!(
            "Exact pass: {} files, {} groups, {} duplicates, {} unreadable",
            stats.candidates,
            stats.groups,
            stats.duplicates,
            stats.failed
        );
        consumed.consume_all(&groups);
        summary.exact = stats;
        all_groups.extend(groups);

        // Perceptual pass
        match self.image_decoder {
            Some(ref decoder) => {
                let candidates = consumed.unconsumed(&files.images);
                let (groups, stats) = self.perceptual_pass(&executor, decoder.as_ref(), &candidates);
                self.check_interrupted()?;
                log::info!(
                    "Perceptual pass: {} images, {} groups, {} duplicates, {} undecodable",
                    stats.candidates,
                    stats.groups,
                    stats.duplicates,
                    stats.failed
                );
                consumed.consume_all(&groups);
                summary.perceptual = stats;
                all_groups.extend(groups);
            }
            None => summary
                .skipped_passes
                .push("perceptual: no image decoder".to_string()),
        }

        // Video pass
        match self.video_sampler {
            Some(ref sampler) => {
                let candidates = consumed.unconsumed(&files.videos);
                let (groups, stats) = self.video_pass(&executor, sampler.as_ref(), &candidates);
                self.check_interrupted()?;
                log::info!(
                    "Video pass: {} videos, {} groups, {} duplicates, {} unreadable",
                    stats.candidates,
                    stats.groups,
                    stats.duplicates,
                    stats.failed
                );
                consumed.consume_all(&groups);
                summary.video = stats;
                all_groups.extend(groups);
            }
            None => summary
                .skipped_passes
                .push("video: ffmpeg not available".to_string()),
        }

        summary.record_groups(&all_groups);
        summary.scan_duration = start_time.elapsed();

        log::info!(
            "Found {} duplicate groups ({} files, {} reclaimable) in {:.2}s",
            summary.duplicate_groups,
            summary.duplicate_files,
            summary.reclaimable_display(),
            summary.scan_duration.as_secs_f64()
        );

        Ok((all_groups, summary))
    }

    fn check_interrupted(&self) -> Result<(), FinderError> {
        if self.config.is_shutdown_requested() {
            log::info!("Scan interrupted");
            return Err(FinderError::Interrupted);
        }
        Ok(())
    }

    fn exact_pass(
        &self,
        executor: &ParallelExecutor,
        candidates: &[FileRecord],
    ) -> (Vec<DuplicateGroup>, PassStats) {
        let digests = executor.map_parallel_reporting("exact", candidates, |file| {
            self.hasher.digest(&file.path).map(|d| (file.clone(), d))
        });

        let stats = PassStats {
            candidates: candidates.len(),
            failed: candidates.len() - digests.len(),
            ..Default::default()
        };
        let groups = group_by_key(digests, MatchKind::Exact);
        let stats = stats.with_groups(&groups);
        (groups, stats)
    }

    fn perceptual_pass(
        &self,
        executor: &ParallelExecutor,
        decoder: &dyn ImageDecoder,
        candidates: &[FileRecord],
    ) -> (Vec<DuplicateGroup>, PassStats) {
        let mut hashed: Vec<(FileRecord, PerceptualHash)> = executor
            .map_parallel_reporting("perceptual", candidates, |file| {
                decoder.perceptual_hash(&file.path).map(|h| (file.clone(), h))
            });
        let failed = candidates.len() - hashed.len();

        // Larger images seed first so they tend to absorb their smaller copies
        hashed.sort_by(|(fa, ha), (fb, hb)| {
            hb.area()
                .cmp(&ha.area())
                .then_with(|| fb.size().cmp(&fa.size()))
                .then_with(|| fa.path.cmp(&fb.path))
        });

        let threshold = perceptual_threshold(self.config.sensitivity);
        let mut visited = vec![false; hashed.len()];
        let mut groups = Vec::new();

        for seed in 0..hashed.len() {
            if visited[seed] {
                continue;
            }
            visited[seed] = true;

            let mut members = vec![hashed[seed].0.clone()];
            for other in (seed + 1)..hashed.len() {
                if !visited[other] && is_similar_image(&hashed[seed].1, &hashed[other].1, threshold)
                {
                    visited[other] = true;
                    members.push(hashed[other].0.clone());
                }
            }

            if let Some(group) = select_original(members, MatchKind::Perceptual) {
                groups.push(group);
            }
        }

        sort_groups(&mut groups);
        let stats = PassStats {
            candidates: candidates.len(),
            failed,
            ..Default::default()
        }
        .with_groups(&groups);
        (groups, stats)
    }

    fn video_pass(
        &self,
        executor: &ParallelExecutor,
        sampler: &dyn VideoFrameSampler,
        candidates: &[FileRecord],
    ) -> (Vec<DuplicateGroup>, PassStats) {
        let mut profiled: Vec<(FileRecord, VideoProfile)> = executor
            .map_parallel_reporting("video-probe", candidates, |file| {
                video_profile(sampler, &file.path).map(|p| (file.clone(), p))
            });
        let failed = candidates.len() - profiled.len();

        profiled.sort_by(|(a, _), (b, _)| b.size().cmp(&a.size()).then_with(|| a.path.cmp(&b.path)));

        let sensitivity = self.config.sensitivity;
        let limit = self.config.video_compare_limit;
        let mut visited = vec![false; profiled.len()];
        let mut groups = Vec::new();

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start("video", profiled.len());
        }

        for seed in 0..profiled.len() {
            if self.config.is_shutdown_requested() {
                break;
            }
            if let Some(ref callback) = self.config.progress_callback {
                callback.on_progress(seed + 1, &profiled[seed].0.path.to_string_lossy());
            }
            if visited[seed] {
                continue;
            }
            visited[seed] = true;

            let others: Vec<usize> = ((seed + 1)..profiled.len())
                .filter(|&i| !visited[i])
                .take(limit)
                .collect();

            let (seed_file, seed_profile) = &profiled[seed];
            let mut similar: Vec<usize> = executor
                .map_parallel(&others, |&i| {
                    let (file, profile) = &profiled[i];
                    let matched = compare_videos(
                        sampler,
                        (&seed_file.path, *seed_profile),
                        (&file.path, *profile),
                        sensitivity,
                    );
                    Ok::<_, Infallible>(matched.then_some(i))
                })
                .into_iter()
                .flatten()
                .collect();
            similar.sort_unstable();

            let mut members = vec![seed_file.clone()];
            for i in similar {
                visited[i] = true;
                members.push(profiled[i].0.clone());
            }

            if let Some(group) = select_original(members, MatchKind::Video) {
                groups.push(group);
            }
        }

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end("video");
        }

        sort_groups(&mut groups);
        let stats = PassStats {
            candidates: candidates.len(),
            failed,
            ..Default::default()
        }
        .with_groups(&groups);
        (groups, stats)
    }
}
