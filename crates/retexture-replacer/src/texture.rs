//! Replacement Assets
//!
//! A [`ReplacedTexture`] is created as soon as a fingerprint resolves to a
//! new set of files, but its pixel data is only read on demand. The payload
//! can be dropped by decimation and read again later; the object itself
//! lives as long as the cache.

use parking_lot::Mutex;
use retexture_platform::VfsBackend;
use smallvec::SmallVec;

use crate::key::{ReplacementKey, TextureFiltering};
use crate::{ReplacerError, ReplacerResult};

/// Everything needed to find and describe a replacement
#[derive(Debug, Clone, Default)]
pub struct ReplacementDesc {
    /// Hashed dimensions, after `[hashranges]`
    pub new_w: u32,
    pub new_h: u32,
    /// Dimensions as drawn
    pub w: u32,
    pub h: u32,
    /// Key the asset was first resolved for
    pub key: ReplacementKey,
    pub force_filtering: Option<TextureFiltering>,
    /// One file per mip level, level 0 first
    pub filenames: SmallVec<[String; 4]>,
    /// Name used in log messages
    pub log_id: String,
    /// Dedup key shared by every fingerprint that resolves to these files
    pub hash_files: String,
}

/// Load state of an asset's payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementState {
    /// No pixel data resident; a poll starts a load
    Unloaded,
    /// A background load is in flight
    Loading,
    /// Pixel data is resident
    Active,
    /// Level 0 could not be read or decoded
    NotFound,
}

/// One decoded mip level, tightly packed RGBA8
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacedLevel {
    pub w: u32,
    pub h: u32,
    pub data: Vec<u8>,
}

/// Turns file bytes into pixels
pub trait TextureDecoder: Send + Sync {
    fn decode(&self, name: &str, bytes: &[u8]) -> ReplacerResult<ReplacedLevel>;
}

/// Decoder for every format the `image` crate can sniff
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl TextureDecoder for ImageDecoder {
    fn decode(&self, name: &str, bytes: &[u8]) -> ReplacerResult<ReplacedLevel> {
        let image = image::load_from_memory(bytes).map_err(|err| ReplacerError::Decode {
            name: name.to_string(),
            reason: err.to_string(),
        })?;
        let rgba = image.to_rgba8();
        let (w, h) = rgba.dimensions();
        Ok(ReplacedLevel {
            w,
            h,
            data: rgba.into_raw(),
        })
    }
}

#[derive(Debug)]
struct Payload {
    state: ReplacementState,
    levels: Vec<ReplacedLevel>,
    last_used: f64,
}

impl Payload {
    fn data_size(&self) -> usize {
        self.levels.iter().map(|level| level.data.len()).sum()
    }
}

/// Shared replacement asset
#[derive(Debug)]
pub struct ReplacedTexture {
    desc: ReplacementDesc,
    payload: Mutex<Payload>,
}

impl ReplacedTexture {
    /// Create an asset with no resident data
    pub fn new(desc: ReplacementDesc) -> Self {
        Self {
            desc,
            payload: Mutex::new(Payload {
                state: ReplacementState::Unloaded,
                levels: Vec::new(),
                last_used: 0.0,
            }),
        }
    }

    pub fn desc(&self) -> &ReplacementDesc {
        &self.desc
    }

    pub fn state(&self) -> ReplacementState {
        self.payload.lock().state
    }

    /// Whether pixel data is resident
    pub fn is_ready(&self) -> bool {
        self.state() == ReplacementState::Active
    }

    pub fn num_levels(&self) -> usize {
        self.payload.lock().levels.len()
    }

    /// Stamp the asset as used at `now`
    pub fn mark_used(&self, now: f64) {
        self.payload.lock().last_used = now;
    }

    pub fn last_used(&self) -> f64 {
        self.payload.lock().last_used
    }

    /// Claim the asset for loading. Returns `false` if it is not unloaded.
    pub fn begin_load(&self) -> bool {
        let mut payload = self.payload.lock();
        if payload.state == ReplacementState::Unloaded {
            payload.state = ReplacementState::Loading;
            true
        } else {
            false
        }
    }

    /// Give up a claimed load without reading anything
    pub fn abort_load(&self) {
        let mut payload = self.payload.lock();
        if payload.state == ReplacementState::Loading {
            payload.state = ReplacementState::NotFound;
        }
    }

    /// Read and decode every level.
    ///
    /// Levels are read in order and reading stops at the first level above 0
    /// that is missing, undecodable or not half the size of the one before.
    /// The lock is only held to publish the result.
    pub fn load(&self, vfs: &dyn VfsBackend, decoder: &dyn TextureDecoder, now: f64) -> ReplacementState {
        let levels = self.read_levels(vfs, decoder);

        let mut payload = self.payload.lock();
        payload.state = if levels.is_empty() {
            ReplacementState::NotFound
        } else {
            ReplacementState::Active
        };
        payload.levels = levels;
        payload.last_used = now;
        payload.state
    }

    fn read_levels(&self, vfs: &dyn VfsBackend, decoder: &dyn TextureDecoder) -> Vec<ReplacedLevel> {
        let mut levels: Vec<ReplacedLevel> = Vec::new();

        for (index, name) in self.desc.filenames.iter().enumerate() {
            if name.is_empty() {
                break;
            }

            let bytes = match vfs.read_file(name) {
                Ok(bytes) => bytes,
                Err(err) if err.is_not_found() => {
                    if index == 0 {
                        log::debug!("Replacement not found: {}", name);
                    }
                    break;
                }
                Err(err) => {
                    log::error!("Failed to read replacement {}: {}", name, err);
                    break;
                }
            };

            let level = match decoder.decode(name, &bytes) {
                Ok(level) => level,
                Err(err) => {
                    log::warn!("{}", err);
                    break;
                }
            };

            if let Some(first) = levels.first() {
                let expected = (mip_size(first.w, index), mip_size(first.h, index));
                if (level.w, level.h) != expected {
                    log::warn!(
                        "Replacement {} level {} is {}x{}, expected {}x{}; ignoring further levels",
                        self.desc.log_id,
                        index,
                        level.w,
                        level.h,
                        expected.0,
                        expected.1
                    );
                    break;
                }
            }

            levels.push(level);
        }

        levels
    }

    /// Drop resident data unless it was used at or after `threshold`
    pub fn purge_if_not_used_since(&self, threshold: f64) -> bool {
        let mut payload = self.payload.lock();
        Self::purge_locked(&mut payload, threshold)
    }

    /// Purge as [`purge_if_not_used_since`](Self::purge_if_not_used_since)
    /// and report what is still resident, under a single lock.
    pub fn purge_and_measure(&self, threshold: f64) -> (bool, usize) {
        let mut payload = self.payload.lock();
        let purged = Self::purge_locked(&mut payload, threshold);
        (purged, payload.data_size())
    }

    fn purge_locked(payload: &mut Payload, threshold: f64) -> bool {
        if payload.last_used >= threshold {
            return false;
        }
        match payload.state {
            // NotFound gets another chance at the next poll.
            ReplacementState::Active | ReplacementState::NotFound => {
                payload.levels = Vec::new();
                payload.state = ReplacementState::Unloaded;
                true
            }
            ReplacementState::Unloaded | ReplacementState::Loading => false,
        }
    }

    /// Resident pixel bytes across all levels
    pub fn total_data_size(&self) -> usize {
        self.payload.lock().data_size()
    }

    /// Run `f` on a resident level
    pub fn with_level<R>(&self, level: usize, f: impl FnOnce(&ReplacedLevel) -> R) -> Option<R> {
        let payload = self.payload.lock();
        payload.levels.get(level).map(f)
    }
}

fn mip_size(size: u32, level: usize) -> u32 {
    size.checked_shr(level as u32).unwrap_or(0).max(1)
}
