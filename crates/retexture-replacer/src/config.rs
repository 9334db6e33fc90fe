//! Host settings and the per-pack configuration snapshot.

use std::path::PathBuf;

use ahash::AHashMap;
use serde::Serialize;

use crate::hash::ReplacedTextureHash;
use crate::key::{ReplacementKey, TextureFiltering};

/// Host-side switches, owned by the emulator's settings
#[derive(Debug, Clone)]
pub struct ReplacerSettings {
    /// Look up and hand out replacements
    pub replace_textures: bool,
    /// Dump newly seen textures to `new/`
    pub save_new_textures: bool,
    /// Skip the cross-platform filename check on `[hashes]`
    pub ignore_texture_filenames: bool,
    /// Directory holding one pack directory per title
    pub textures_root: PathBuf,
    /// Title identifier; the pack lives at `textures_root/game_id`
    pub game_id: String,
    /// Textures strictly inside `(reserved_start, reserved_end)` are
    /// system-owned and never dumped
    pub reserved_start: u32,
    pub reserved_end: u32,
}

impl Default for ReplacerSettings {
    fn default() -> Self {
        Self {
            replace_textures: false,
            save_new_textures: false,
            ignore_texture_filenames: false,
            textures_root: PathBuf::from("textures"),
            game_id: String::new(),
            reserved_start: 0x0500_0000,
            reserved_end: 0x0840_0000,
        }
    }
}

impl ReplacerSettings {
    /// Directory of the pack for the configured title
    pub fn pack_dir(&self) -> PathBuf {
        self.textures_root.join(&self.game_id)
    }

    /// Whether an address belongs to the reserved system region
    pub fn is_reserved(&self, addr: u32) -> bool {
        addr > self.reserved_start && addr < self.reserved_end
    }
}

/// Key of the `[hashranges]` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashRangeKey {
    pub addr: u32,
    pub w: u32,
    pub h: u32,
}

/// Override tables read from the pack. Read-only until the next reload.
#[derive(Debug, Clone, Default)]
pub struct OverrideTables {
    /// `[hashes]`: key to `|`-joined level filenames; empty means ignored
    pub aliases: AHashMap<ReplacementKey, String>,
    /// `[hashranges]`: original to hashed dimensions
    pub hash_ranges: AHashMap<HashRangeKey, (u32, u32)>,
    /// `[filtering]`
    pub filtering: AHashMap<ReplacementKey, TextureFiltering>,
    /// `[reducehashranges]`: `(w, h)` to reduction factor
    pub reduce_hash_ranges: AHashMap<(u32, u32), f32>,
}

/// Immutable configuration snapshot of one loaded pack
#[derive(Debug, Clone)]
pub struct PackConfig {
    /// Bumped on every reload
    pub generation: u64,
    pub hash: ReplacedTextureHash,
    /// Dump video frames too
    pub allow_video: bool,
    /// Drop the address half of location keys
    pub ignore_address: bool,
    /// Hash only part of each texture
    pub reduce_hash: bool,
    /// Reduction factor when no per-size override exists
    pub reduce_hash_global: f32,
    /// Never dump levels above 0
    pub ignore_mipmap: bool,
    pub overrides: OverrideTables,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            generation: 0,
            hash: ReplacedTextureHash::Quick,
            allow_video: false,
            ignore_address: false,
            reduce_hash: false,
            reduce_hash_global: 0.5,
            ignore_mipmap: false,
            overrides: OverrideTables::default(),
        }
    }
}

impl PackConfig {
    /// Fraction of each texture's bytes that gets hashed
    pub fn reduce_hash_factor(&self, w: u32, h: u32) -> f32 {
        if !self.reduce_hash {
            return 1.0;
        }
        self.overrides
            .lookup_reduce_hash_range(w, h)
            .unwrap_or(self.reduce_hash_global)
    }

    /// Location key used for resolution and naming
    pub fn effective_location(&self, location_key: u64) -> u64 {
        if self.ignore_address {
            location_key & crate::key::LOW_MASK
        } else {
            location_key
        }
    }

    /// Serializable overview of the snapshot
    pub fn summary(&self) -> PackSummary {
        let ignored = self.overrides.aliases.values().filter(|v| v.is_empty()).count();
        PackSummary {
            generation: self.generation,
            hash: self.hash,
            allow_video: self.allow_video,
            ignore_address: self.ignore_address,
            reduce_hash: self.reduce_hash,
            reduce_hash_global: self.reduce_hash_global,
            ignore_mipmap: self.ignore_mipmap,
            aliases: self.overrides.aliases.len() - ignored,
            ignored,
            hash_ranges: self.overrides.hash_ranges.len(),
            filtering: self.overrides.filtering.len(),
            reduce_hash_ranges: self.overrides.reduce_hash_ranges.len(),
        }
    }
}

/// Counts and options of a loaded pack
#[derive(Debug, Clone, Serialize)]
pub struct PackSummary {
    pub generation: u64,
    pub hash: ReplacedTextureHash,
    pub allow_video: bool,
    pub ignore_address: bool,
    pub reduce_hash: bool,
    pub reduce_hash_global: f32,
    pub ignore_mipmap: bool,
    pub aliases: usize,
    pub ignored: usize,
    pub hash_ranges: usize,
    pub filtering: usize,
    pub reduce_hash_ranges: usize,
}
