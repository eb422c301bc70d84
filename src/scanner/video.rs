//! Video frame sampling.
//!
//! # Overview
//!
//! The video similarity pass needs two things from a video file: its total
//! frame count, and individual grayscale frames at chosen positions. Both are
//! provided through the [`VideoFrameSampler`] trait so the grouping engine can
//! be tested with an in-memory fake.
//!
//! The production implementation, [`FfmpegSampler`], shells out to the
//! `ffprobe` and `ffmpeg` binaries found on `PATH`. When they are missing the
//! sampler cannot be constructed and the video pass is skipped.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use image::imageops::{self, FilterType};
use image::GrayImage;
use serde::Deserialize;
use thiserror::Error;

/// Height (in pixels) frames are resized to before comparison.
pub const COMPARE_HEIGHT: u32 = 200;

/// Errors that can occur while probing or sampling a video.
#[derive(Debug, Error)]
pub enum VideoError {
    /// The external tool could not be started.
    #[error("Failed to run {tool} for {path}: {source}")]
    Spawn {
        /// Name of the binary
        tool: String,
        /// Video being processed
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The container could not be probed.
    #[error("Cannot probe video {path}: {message}")]
    Probe {
        /// Video being probed
        path: PathBuf,
        /// Diagnostic from the prober
        message: String,
    },

    /// The container reports no frames.
    #[error("Video has no frames: {0}")]
    NoFrames(PathBuf),

    /// A frame at the given position could not be decoded.
    #[error("Frame {index} unavailable in {path}")]
    FrameUnavailable {
        /// Video being sampled
        path: PathBuf,
        /// Requested frame index
        index: u64,
    },
}

/// Capability to read frame counts and grayscale frames from videos.
pub trait VideoFrameSampler: Send + Sync {
    /// Total number of frames in the video's first video stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be opened or probed.
    fn frame_count(&self, path: &Path) -> Result<u64, VideoError>;

    /// Decode the frame at `index` as a grayscale image.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be decoded.
    fn grab_frame(&self, path: &Path, index: u64) -> Result<GrayImage, VideoError>;
}

/// Opaque handle for a video that can take part in similarity comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoProfile {
    /// Total frame count
    pub frame_count: u64,
}

/// Open a video through `sampler` and read its frame count.
///
/// # Errors
///
/// Fails when the container cannot be probed or reports zero frames; such
/// videos are treated as non-comparable.
pub fn video_profile(
    sampler: &dyn VideoFrameSampler,
    path: &Path,
) -> Result<VideoProfile, VideoError> {
    let frame_count = sampler.frame_count(path)?;
    if frame_count == 0 {
        return Err(VideoError::NoFrames(path.to_path_buf()));
    }
    Ok(VideoProfile { frame_count })
}

/// Dimensions a frame is resized to: fixed height, width keeping the aspect ratio.
#[must_use]
pub fn compare_dimensions(frame: &GrayImage) -> (u32, u32) {
    let (width, height) = frame.dimensions();
    if height == 0 {
        return (width.max(1), COMPARE_HEIGHT);
    }
    let scaled = (f64::from(width) * f64::from(COMPARE_HEIGHT) / f64::from(height)).round();
    ((scaled as u32).max(1), COMPARE_HEIGHT)
}

/// Resize a frame to the given dimensions (no-op copy if already that size).
#[must_use]
pub fn normalize_frame(frame: &GrayImage, width: u32, height: u32) -> GrayImage {
    if frame.dimensions() == (width, height) {
        return frame.clone();
    }
    imageops::resize(frame, width, height, FilterType::Triangle)
}

/// 256-bin histogram of grayscale intensities.
#[must_use]
pub fn gray_histogram(frame: &GrayImage) -> [f64; 256] {
    let mut bins = [0.0f64; 256];
    for pixel in frame.pixels() {
        bins[usize::from(pixel.0[0])] += 1.0;
    }
    bins
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    nb_frames: Option<String>,
    nb_read_packets: Option<String>,
}

impl ProbeStream {
    fn frames(&self) -> Option<u64> {
        self.nb_frames
            .as_deref()
            .and_then(|n| n.parse().ok())
            .filter(|&n: &u64| n > 0)
            .or_else(|| self.nb_read_packets.as_deref().and_then(|n| n.parse().ok()))
    }
}

/// Frame sampler backed by the `ffprobe` and `ffmpeg` command-line tools.
#[derive(Debug, Clone)]
pub struct FfmpegSampler {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegSampler {
    /// Use explicit binary paths.
    #[must_use]
    pub fn with_binaries(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Find `ffmpeg` and `ffprobe` on `PATH`.
    ///
    /// Returns `None` when either binary cannot be executed.
    #[must_use]
    pub fn locate() -> Option<Self> {
        let sampler = Self::with_binaries("ffmpeg", "ffprobe");
        let available = [&sampler.ffmpeg, &sampler.ffprobe].iter().all(|bin| {
            Command::new(bin)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok_and(|s| s.success())
        });

        if available {
            log::debug!("Found ffmpeg and ffprobe on PATH");
            Some(sampler)
        } else {
            log::warn!("ffmpeg/ffprobe not found on PATH, video similarity will be skipped");
            None
        }
    }

    fn probe(&self, path: &Path, count_packets: bool) -> Result<Option<u64>, VideoError> {
        let mut command = Command::new(&self.ffprobe);
        command.args(["-v", "error", "-select_streams", "v:0"]);
        if count_packets {
            command.arg("-count_packets");
        }
        let output = command
            .args([
                "-show_entries",
                "stream=nb_frames,nb_read_packets",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .map_err(|e| VideoError::Spawn {
                tool: "ffprobe".to_string(),
                path: path.to_path_buf(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(VideoError::Probe {
                path: path.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let parsed: ProbeOutput =
            serde_json::from_slice(&output.stdout).map_err(|e| VideoError::Probe {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        Ok(parsed.streams.first().and_then(ProbeStream::frames))
    }
}

impl VideoFrameSampler for FfmpegSampler {
    fn frame_count(&self, path: &Path) -> Result<u64, VideoError> {
        // Some containers (mkv, webm) carry no frame count in the header.
        match self.probe(path, false)? {
            Some(count) => Ok(count),
            None => self
                .probe(path, true)?
                .ok_or_else(|| VideoError::NoFrames(path.to_path_buf())),
        }
    }

    fn grab_frame(&self, path: &Path, index: u64) -> Result<GrayImage, VideoError> {
        let filter = format!("select=eq(n\\,{index}),scale=-2:{COMPARE_HEIGHT},format=gray");
        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-vf", &filter, "-vframes", "1", "-f", "rawvideo", "-pix_fmt", "gray", "-"])
            .output()
            .map_err(|e| VideoError::Spawn {
                tool: "ffmpeg".to_string(),
                path: path.to_path_buf(),
                source: e,
            })?;

        let unavailable = || VideoError::FrameUnavailable {
            path: path.to_path_buf(),
            index,
        };

        if !output.status.success() || output.stdout.is_empty() {
            return Err(unavailable());
        }

        let height = COMPARE_HEIGHT as usize;
        if output.stdout.len() % height != 0 {
            return Err(unavailable());
        }
        let width = u32::try_from(output.stdout.len() / height).map_err(|_| unavailable())?;

        GrayImage::from_raw(width, COMPARE_HEIGHT, output.stdout).ok_or_else(unavailable)
    }
}
