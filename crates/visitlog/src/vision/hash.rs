//! Perceptual image hashing.
//!
//! A 64-bit difference hash: the image is reduced to a 9x8 grayscale
//! thumbnail and each bit records whether a pixel is darker than its right
//! neighbour. Similar photos of the same face give hashes a small Hamming
//! distance apart.

use std::fmt;
use std::str::FromStr;

use image::{imageops::FilterType, DynamicImage};
use serde::{Serialize, Serializer};

use crate::error::{Error, Result};

const HASH_WIDTH: u32 = 9;
const HASH_HEIGHT: u32 = 8;

/// A 64-bit perceptual hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHash(u64);

impl ImageHash {
    /// Wrap raw hash bits.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw hash bits.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Number of differing bits.
    #[must_use]
    pub const fn distance(self, other: Self) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

impl fmt::Display for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for ImageHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 16 {
            return Err(Error::validation(format!(
                "image hash must be 16 hex characters, got {}",
                s.len()
            )));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| Error::validation(format!("invalid image hash {s}: {e}")))
    }
}

impl Serialize for ImageHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Compute the difference hash of an image.
#[must_use]
pub fn perceptual_hash(img: &DynamicImage) -> ImageHash {
    let thumb = img
        .grayscale()
        .resize_exact(HASH_WIDTH, HASH_HEIGHT, FilterType::Triangle)
        .to_luma8();

    let mut bits = 0u64;
    for y in 0..HASH_HEIGHT {
        for x in 0..HASH_WIDTH - 1 {
            let left = thumb.get_pixel(x, y)[0];
            let right = thumb.get_pixel(x + 1, y)[0];
            bits = (bits << 1) | u64::from(left < right);
        }
    }
    ImageHash(bits)
}
