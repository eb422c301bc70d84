//! Perceptual image hashing for similarity detection.
//!
//! This module defines the [`ImageDecoder`] capability used by the perceptual
//! grouping pass, and its production implementation [`ImageCrateDecoder`]
//! which decodes with the `image` crate and hashes with `image_hasher`.
//!
//! The hash is a 64-bit pHash (8x8 DCT, median threshold), which remains
//! stable under resizing and recompression. Visually similar images have a
//! small Hamming distance between their hashes.

use image_hasher::{HashAlg, HasherConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during perceptual hashing.
#[derive(Debug, Error)]
pub enum PerceptualError {
    /// Failed to open or decode the image.
    #[error("Failed to load image {0}: {1}")]
    LoadError(String, #[source] image::ImageError),

    /// The hasher produced a hash of unexpected width.
    #[error("Unexpected hash length {1} for {0}")]
    UnexpectedHashLength(String, usize),
}

/// A 64-bit perceptual hash plus the dimensions of the decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerceptualHash {
    /// Hash bits
    pub bits: u64,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl PerceptualHash {
    /// Create a hash value.
    #[must_use]
    pub fn new(bits: u64, width: u32, height: u32) -> Self {
        Self {
            bits,
            width,
            height,
        }
    }

    /// Hamming distance between two hashes (0..=64).
    #[must_use]
    pub fn distance(&self, other: &Self) -> u32 {
        (self.bits ^ other.bits).count_ones()
    }

    /// Pixel area, used to consider larger images first.
    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Capability that turns an image file into a [`PerceptualHash`].
///
/// The grouping engine only depends on this trait, so tests can inject
/// fakes that return fixed hashes without decoding anything.
pub trait ImageDecoder: Send + Sync {
    /// Decode the image at `path` and compute its perceptual hash.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be decoded; such files are
    /// excluded from perceptual comparison.
    fn perceptual_hash(&self, path: &Path) -> Result<PerceptualHash, PerceptualError>;
}

/// Production decoder backed by the `image` and `image_hasher` crates.
pub struct ImageCrateDecoder {
    hasher: image_hasher::Hasher,
}

impl ImageCrateDecoder {
    /// Create a decoder computing 8x8 DCT median hashes.
    #[must_use]
    pub fn new() -> Self {
        let hasher = HasherConfig::new()
            .hash_size(8, 8)
            .hash_alg(HashAlg::Median)
            .preproc_dct()
            .to_hasher();
        Self { hasher }
    }
}

impl Default for ImageCrateDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageDecoder for ImageCrateDecoder {
    fn perceptual_hash(&self, path: &Path) -> Result<PerceptualHash, PerceptualError> {
        let img = image::open(path)
            .map_err(|e| PerceptualError::LoadError(path.display().to_string(), e))?;

        let hash = self.hasher.hash_image(&img);
        let bytes = hash.as_bytes();
        let bits: [u8; 8] = bytes.try_into().map_err(|_| {
            PerceptualError::UnexpectedHashLength(path.display().to_string(), bytes.len())
        })?;

        Ok(PerceptualHash::new(
            u64::from_be_bytes(bits),
            img.width(),
            img.height(),
        ))
    }
}
