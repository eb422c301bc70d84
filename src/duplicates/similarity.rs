//! Similarity rules for images and videos.
//!
//! # Images
//!
//! Two images are similar when the Hamming distance between their 64-bit
//! perceptual hashes is at most `round(64 * (1 - sensitivity))`.
//!
//! # Videos
//!
//! Two videos are compared only when their frame counts differ by at most
//! 20% of the larger count. Up to 50 frame positions are then sampled from
//! both, resized to a common 200 pixel high frame and compared by the
//! correlation of their grayscale histograms. A position counts as similar
//! when the correlation exceeds the sensitivity, and the videos are similar
//! when the fraction of similar positions reaches the sensitivity.

use std::path::Path;

use crate::scanner::video::{compare_dimensions, gray_histogram, normalize_frame};
use crate::scanner::{PerceptualHash, VideoFrameSampler, VideoProfile};

/// Maximum relative difference between frame counts of comparable videos.
pub const FRAME_COUNT_TOLERANCE: f64 = 0.2;

/// Lower bound on the number of sampled positions.
pub const MIN_SAMPLES: u64 = 5;

/// Upper bound on the number of sampled positions.
pub const MAX_SAMPLES: u64 = 50;

/// Hamming distance threshold for a sensitivity in `[0, 1]`.
///
/// ```
/// use photodupe::duplicates::similarity::perceptual_threshold;
///
/// assert_eq!(perceptual_threshold(0.9), 6);
/// assert_eq!(perceptual_threshold(1.0), 0);
/// assert_eq!(perceptual_threshold(0.0), 64);
/// ```
#[must_use]
pub fn perceptual_threshold(sensitivity: f64) -> u32 {
    let raw = (64.0 * (1.0 - sensitivity.clamp(0.0, 1.0))).round();
    raw as u32
}

/// Check whether two image hashes are within `threshold` bits.
#[must_use]
pub fn is_similar_image(a: &PerceptualHash, b: &PerceptualHash, threshold: u32) -> bool {
    a.distance(b) <= threshold
}

/// Cheap pre-check on frame counts; no frame is read.
///
/// Zero counts are never compatible.
#[must_use]
pub fn frame_counts_compatible(a: u64, b: u64) -> bool {
    if a == 0 || b == 0 {
        return false;
    }
    let larger = a.max(b);
    let diff = a.abs_diff(b);
    diff as f64 <= FRAME_COUNT_TOLERANCE * larger as f64
}

/// Number of sampled positions for two frame counts.
#[must_use]
pub fn sample_count(a: u64, b: u64) -> u64 {
    let shorter = a.min(b);
    (shorter / 10).clamp(MIN_SAMPLES, MAX_SAMPLES)
}

/// Frame positions to sample, plus the denominator of the similarity ratio.
///
/// Positions are evenly spaced by `max(1, longer / samples)` and never reach
/// past the shorter video. The denominator is always the full sample count,
/// so very short videos cannot reach a high ratio.
#[must_use]
pub fn sample_positions(a: u64, b: u64) -> (Vec<u64>, u64) {
    let samples = sample_count(a, b);
    let step = (a.max(b) / samples).max(1);
    let shorter = a.min(b);

    let positions = (0..samples)
        .map(|k| k * step)
        .take_while(|&pos| pos < shorter)
        .collect();
    (positions, samples)
}

/// Pearson correlation between two histograms.
///
/// Returns 1.0 when either histogram has zero variance, matching the
/// usual histogram comparison convention.
#[must_use]
pub fn histogram_correlation(h1: &[f64; 256], h2: &[f64; 256]) -> f64 {
    let n = h1.len() as f64;
    let mean1 = h1.iter().sum::<f64>() / n;
    let mean2 = h2.iter().sum::<f64>() / n;

    let mut cross = 0.0;
    let mut var1 = 0.0;
    let mut var2 = 0.0;
    for (a, b) in h1.iter().zip(h2.iter()) {
        let da = a - mean1;
        let db = b - mean2;
        cross += da * db;
        var1 += da * da;
        var2 += db * db;
    }

    let denom = var1 * var2;
    if denom.abs() > f64::EPSILON {
        cross / denom.sqrt()
    } else {
        1.0
    }
}

/// Decide whether two profiled videos are similar.
///
/// Incompatible frame counts return `false` without sampling. A position
/// whose frames cannot be read is skipped and counts as dissimilar.
pub fn compare_videos(
    sampler: &dyn VideoFrameSampler,
    first: (&Path, VideoProfile),
    second: (&Path, VideoProfile),
    sensitivity: f64,
) -> bool {
    let (path_a, profile_a) = first;
    let (path_b, profile_b) = second;

    if !frame_counts_compatible(profile_a.frame_count, profile_b.frame_count) {
        return false;
    }

    let (positions, samples) = sample_positions(profile_a.frame_count, profile_b.frame_count);
    let mut similar = 0u64;

    for pos in positions {
        let frames = sampler
            .grab_frame(path_a, pos)
            .and_then(|a| sampler.grab_frame(path_b, pos).map(|b| (a, b)));
        let (frame_a, frame_b) = match frames {
            Ok(pair) => pair,
            Err(e) => {
                log::debug!(
                    "Skipping frame {} of {} / {}: {}",
                    pos,
                    path_a.display(),
                    path_b.display(),
                    e
                );
                continue;
            }
        };

        let (width, height) = compare_dimensions(&frame_a);
        let hist_a = gray_histogram(&normalize_frame(&frame_a, width, height));
        let hist_b = gray_histogram(&normalize_frame(&frame_b, width, height));

        if histogram_correlation(&hist_a, &hist_b) > sensitivity {
            similar += 1;
        }
    }

    let ratio = similar as f64 / samples as f64;
    log::trace!(
        "Video ratio {:.3} for {} / {}",
        ratio,
        path_a.display(),
        path_b.display()
    );
    ratio >= sensitivity
}
