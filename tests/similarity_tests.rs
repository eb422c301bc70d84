use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{GrayImage, Luma};
use photodupe::duplicates::similarity::{compare_videos, sample_positions};
use photodupe::duplicates::{DuplicateFinder, FinderConfig, MatchKind};
use photodupe::scanner::{
    ClassifiedFiles, FileRecord, ImageDecoder, PerceptualError, PerceptualHash, VideoError,
    VideoFrameSampler, VideoProfile,
};

struct FixedHashes(HashMap<PathBuf, u64>);

impl ImageDecoder for FixedHashes {
    fn perceptual_hash(&self, path: &Path) -> Result<PerceptualHash, PerceptualError> {
        self.0
            .get(path)
            .map(|bits| PerceptualHash::new(*bits, 640, 480))
            .ok_or_else(|| PerceptualError::UnexpectedHashLength(path.display().to_string(), 0))
    }
}

/// Sampler counting every call; frames are a gradient shifted per video.
#[derive(Default)]
struct CountingSampler {
    frames: HashMap<PathBuf, (u64, u8)>,
    broken_from: Option<u64>,
    broken_at: Option<u64>,
    probes: AtomicUsize,
    grabs: AtomicUsize,
}

impl CountingSampler {
    fn with(mut self, path: &str, frames: u64, shift: u8) -> Self {
        self.frames.insert(PathBuf::from(path), (frames, shift));
        self
    }
}

impl VideoFrameSampler for CountingSampler {
    fn frame_count(&self, path: &Path) -> Result<u64, VideoError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.frames
            .get(path)
            .map(|(count, _)| *count)
            .ok_or_else(|| VideoError::NoFrames(path.to_path_buf()))
    }

    fn grab_frame(&self, path: &Path, index: u64) -> Result<GrayImage, VideoError> {
        self.grabs.fetch_add(1, Ordering::SeqCst);
        let unavailable = || VideoError::FrameUnavailable {
            path: path.to_path_buf(),
            index,
        };
        if self.broken_from.is_some_and(|from| index >= from) || self.broken_at == Some(index) {
            return Err(unavailable());
        }
        let (_, shift) = self.frames.get(path).ok_or_else(unavailable)?;
        Ok(GrayImage::from_fn(100, 200, |x, _| {
            Luma([(x as u8).wrapping_mul(2).wrapping_add(*shift)])
        }))
    }
}

fn virtual_files(paths: &[(&str, u64)]) -> ClassifiedFiles {
    ClassifiedFiles::classify(
        paths
            .iter()
            .map(|(path, size)| FileRecord::with_size(*path, *size)),
    )
}

// ==================== Perceptual Tests ====================

#[test]
fn test_distance_three_depends_on_sensitivity() {
    let files = virtual_files(&[("/lib/a.jpg", 300), ("/lib/b.jpg", 200)]);
    let decoder = Arc::new(FixedHashes(HashMap::from([
        (PathBuf::from("/lib/a.jpg"), 0b1010_0000),
        (PathBuf::from("/lib/b.jpg"), 0b1010_0111),
    ])));

    let run = |sensitivity: f64| {
        DuplicateFinder::new(FinderConfig::default().with_sensitivity(sensitivity))
            .with_image_decoder(decoder.clone())
            .find_duplicates_in(&files)
            .unwrap()
            .0
    };

    let groups = run(0.95);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].kind, MatchKind::Perceptual);
    assert_eq!(groups[0].original.path, PathBuf::from("/lib/a.jpg"));

    assert!(run(0.99).is_empty());
}

#[test]
fn test_undecodable_image_is_skipped() {
    let files = virtual_files(&[("/lib/a.jpg", 1), ("/lib/b.jpg", 1), ("/lib/broken.jpg", 1)]);
    let decoder = Arc::new(FixedHashes(HashMap::from([
        (PathBuf::from("/lib/a.jpg"), 7),
        (PathBuf::from("/lib/b.jpg"), 7),
    ])));

    let (groups, summary) = DuplicateFinder::new(FinderConfig::default())
        .with_image_decoder(decoder)
        .find_duplicates_in(&files)
        .unwrap();

    assert_eq!(groups.len(), 1);
    assert!(!groups[0].contains(Path::new("/lib/broken.jpg")));
    assert_eq!(summary.perceptual.failed, 1);
}

// ==================== Video Tests ====================

#[test]
fn test_frame_count_gate_skips_sampling() {
    let sampler = CountingSampler::default()
        .with("/v/a.mp4", 1000, 0)
        .with("/v/b.mp4", 500, 0);

    let similar = compare_videos(
        &sampler,
        (Path::new("/v/a.mp4"), VideoProfile { frame_count: 1000 }),
        (Path::new("/v/b.mp4"), VideoProfile { frame_count: 500 }),
        0.9,
    );

    assert!(!similar);
    assert_eq!(sampler.grabs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_identical_videos_sample_both() {
    let sampler = CountingSampler::default()
        .with("/v/a.mp4", 100, 0)
        .with("/v/b.mp4", 100, 0);

    let similar = compare_videos(
        &sampler,
        (Path::new("/v/a.mp4"), VideoProfile { frame_count: 100 }),
        (Path::new("/v/b.mp4"), VideoProfile { frame_count: 100 }),
        0.9,
    );

    let (positions, _) = sample_positions(100, 100);
    assert!(similar);
    assert_eq!(sampler.grabs.load(Ordering::SeqCst), positions.len() * 2);
}

#[test]
fn test_unreadable_frames_count_as_dissimilar() {
    let sampler = CountingSampler {
        broken_from: Some(1),
        ..Default::default()
    }
    .with("/v/a.mp4", 500, 0)
    .with("/v/b.mp4", 500, 0);

    let similar = compare_videos(
        &sampler,
        (Path::new("/v/a.mp4"), VideoProfile { frame_count: 500 }),
        (Path::new("/v/b.mp4"), VideoProfile { frame_count: 500 }),
        0.5,
    );

    // One of 50 sampled positions is readable
    assert!(!similar);
}

#[test]
fn test_single_unreadable_frame_is_skipped() {
    let sampler = CountingSampler {
        broken_at: Some(250),
        ..Default::default()
    }
    .with("/v/a.mp4", 500, 0)
    .with("/v/b.mp4", 500, 0);

    let similar = compare_videos(
        &sampler,
        (Path::new("/v/a.mp4"), VideoProfile { frame_count: 500 }),
        (Path::new("/v/b.mp4"), VideoProfile { frame_count: 500 }),
        0.9,
    );

    // 49 of 50 positions match; sampling continues past the broken one
    assert!(similar);
    assert_eq!(sampler.grabs.load(Ordering::SeqCst), 49 * 2 + 1);
}

#[test]
fn test_video_pass_with_mock_sampler() {
    let files = virtual_files(&[
        ("/v/a.mp4", 3000),
        ("/v/b.mp4", 2000),
        ("/v/c.mp4", 1000),
        ("/v/notes.txt", 10),
    ]);
    let sampler = Arc::new(
        CountingSampler::default()
            .with("/v/a.mp4", 300, 0)
            .with("/v/b.mp4", 290, 0)
            .with("/v/c.mp4", 100, 0),
    );

    let (groups, summary) = DuplicateFinder::new(FinderConfig::default().with_threads(Some(2)))
        .with_video_sampler(sampler.clone())
        .find_duplicates_in(&files)
        .unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].kind, MatchKind::Video);
    assert_eq!(groups[0].original.path, PathBuf::from("/v/a.mp4"));
    assert_eq!(groups[0].duplicates[0].path, PathBuf::from("/v/b.mp4"));
    assert_eq!(summary.videos, 3);
    assert_eq!(summary.video.candidates, 3);
    assert_eq!(sampler.probes.load(Ordering::SeqCst), 3);
}
