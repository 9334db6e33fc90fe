//! Content Hashing
//!
//! Fingerprints a region of texture memory. The algorithm and how much of
//! the texture gets hashed both come from the pack configuration.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use xxhash_rust::xxh32::xxh32;
use xxhash_rust::xxh64::xxh64;

use crate::config::PackConfig;
use crate::key::TextureFormat;

/// Seed shared by the xxHash variants
pub const HASH_SEED: u32 = 0xBACD_7814;

/// Nominal height that may really be a partially drawn framebuffer
const FULL_HEIGHT: u32 = 512;

/// Fingerprint algorithm selected by a pack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacedTextureHash {
    /// Cheap add/xor over 32-bit words
    #[default]
    Quick,
    Xxh32,
    /// 64-bit xxHash truncated to 32 bits
    Xxh64,
}

impl ReplacedTextureHash {
    /// Name as written in `textures.ini`
    pub fn name(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Xxh32 => "xxh32",
            Self::Xxh64 => "xxh64",
        }
    }

    /// Hash one span of bytes
    pub fn hash(&self, data: &[u8]) -> u32 {
        match self {
            Self::Quick => quick_tex_hash(data),
            Self::Xxh32 => xxh32(data, HASH_SEED),
            Self::Xxh64 => xxh64(data, HASH_SEED as u64) as u32,
        }
    }
}

impl FromStr for ReplacedTextureHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("quick") {
            Ok(Self::Quick)
        } else if s.eq_ignore_ascii_case("xxh32") {
            Ok(Self::Xxh32)
        } else if s.eq_ignore_ascii_case("xxh64") {
            Ok(Self::Xxh64)
        } else {
            Err(s.to_string())
        }
    }
}

impl fmt::Display for ReplacedTextureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fast, non-cryptographic hash over raw texture bytes.
///
/// Alternately adds and xors little-endian words. Trailing bytes that do not
/// fill a word pair are not hashed, so fingerprints match existing packs.
pub fn quick_tex_hash(data: &[u8]) -> u32 {
    let mut check = 0u32;
    for pair in data.chunks_exact(8) {
        let a = u32::from_le_bytes([pair[0], pair[1], pair[2], pair[3]]);
        let b = u32::from_le_bytes([pair[4], pair[5], pair[6], pair[7]]);
        check = check.wrapping_add(a);
        check ^= b;
    }
    check
}

/// Parameters of one hash computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashRequest {
    /// Texture address, used for `[hashranges]` lookups
    pub addr: u32,
    /// Row stride in texels
    pub buf_w: u32,
    pub w: u32,
    pub h: u32,
    pub format: TextureFormat,
    /// Highest V coordinate seen while drawing; 0 if unknown
    pub max_seen_v: u16,
}

/// Dimensions actually hashed for a request
pub fn effective_hash_size(config: &PackConfig, req: &HashRequest) -> (u32, u32) {
    if let Some(size) = config.overrides.lookup_hash_range(req.addr, req.w, req.h) {
        return size;
    }
    let max_seen = req.max_seen_v as u32;
    if req.h == FULL_HEIGHT && max_seen < FULL_HEIGHT && max_seen != 0 {
        (req.w, max_seen)
    } else {
        (req.w, req.h)
    }
}

/// Fingerprint a texture.
///
/// `memory` starts at the texture address; reads past its end are clipped.
pub fn compute_hash(config: &PackConfig, memory: &[u8], req: &HashRequest) -> u32 {
    let (w, h) = effective_hash_size(config, req);
    let factor = config.reduce_hash_factor(w, h) as f64;
    let bpp = req.format.bits_per_pixel() as u64;
    let (w, h, buf_w) = (w as u64, h as u64, req.buf_w as u64);

    if buf_w <= w {
        // Contiguous: hash every used texel in one pass.
        let total_pixels = buf_w * h + (w - buf_w);
        let size = scaled(bpp * total_pixels / 8, factor);
        return config.hash.hash(clip(memory, 0, size));
    }

    let bytes_per_line = scaled(bpp * w / 8, factor);
    let stride = (bpp * buf_w / 8) as usize;
    (0..h as usize).fold(0u32, |result, y| {
        let row_hash = config.hash.hash(clip(memory, y * stride, bytes_per_line));
        result.wrapping_mul(11) ^ row_hash
    })
}

fn scaled(bytes: u64, factor: f64) -> usize {
    (bytes as f64 * factor) as usize
}

fn clip(memory: &[u8], start: usize, len: usize) -> &[u8] {
    let start = start.min(memory.len());
    let end = start.saturating_add(len).min(memory.len());
    &memory[start..end]
}
