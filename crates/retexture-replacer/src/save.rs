//! Save Pipeline
//!
//! Dumps newly decoded textures to the pack's `new/` directory so they can
//! be edited into replacements. Each `(key, level)` is submitted at most once
//! per session; encoding and writing happen on the task pool and are never
//! waited on.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use image::{ExtendedColorType, ImageFormat};
use parking_lot::Mutex;
use retexture_core::{Task, TaskKind, TaskPool, TaskPriority};
use retexture_platform::ensure_save_dir;
use serde::Serialize;

use crate::config::PackConfig;
use crate::key::ReplacementKey;
use crate::{ReplacerError, ReplacerResult};

/// Identity of a decoded texture, as seen by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplacedTextureDecodeInfo {
    pub cache_key: u64,
    pub hash: u32,
    pub addr: u32,
    pub is_video: bool,
}

/// One freshly decoded RGBA8 level
#[derive(Debug, Clone, Copy)]
pub struct DecodedTexture<'a> {
    pub data: &'a [u8],
    /// Bytes between row starts in `data`
    pub pitch: usize,
    pub level: usize,
    pub orig_w: u32,
    pub orig_h: u32,
    pub scaled_w: u32,
    pub scaled_h: u32,
}

/// What happened to a save request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
    /// A write task was queued
    Submitted,
    /// This level was already queued this session
    AlreadySaved,
    /// The pack already has an alias for the texture
    Aliased,
    /// The pack explicitly ignores the texture
    Ignored,
    /// Mip levels are not dumped
    SkippedMipmap,
    /// Saving disabled, reserved address or video frame
    NotSaving,
    /// Empty texture, or a pixel buffer smaller than its dimensions claim
    InvalidData,
}

/// Levels of one texture queued this session
#[derive(Debug, Clone, Default)]
pub struct SaveRecord {
    /// Saved size per level
    pub levels: BTreeMap<usize, (u32, u32)>,
    pub last_saved: f64,
}

impl SaveRecord {
    pub fn is_saved(&self, level: usize) -> bool {
        self.levels.contains_key(&level)
    }
}

/// Paths and policy a save request needs
pub struct SaveContext<'a> {
    pub config: &'a PackConfig,
    /// Pack root, where finished replacements live
    pub base_path: &'a Path,
    /// Destination of dumps
    pub new_texture_dir: &'a Path,
    pub pool: &'a TaskPool,
    pub now: f64,
}

/// Session save records
#[derive(Debug)]
pub struct SavePipeline {
    records: Mutex<AHashMap<ReplacementKey, SaveRecord>>,
    /// Skip a dump when the pack already has a replacement file for it
    skip_if_replaced: bool,
}

impl Default for SavePipeline {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SavePipeline {
    pub fn new(skip_if_replaced: bool) -> Self {
        Self {
            records: Mutex::new(AHashMap::new()),
            skip_if_replaced,
        }
    }

    /// Queue a decoded level for saving unless it is aliased, ignored or
    /// already queued.
    pub fn notify(
        &self,
        ctx: &SaveContext<'_>,
        info: &ReplacedTextureDecodeInfo,
        texture: &DecodedTexture<'_>,
    ) -> SaveOutcome {
        let config = ctx.config;
        if config.ignore_mipmap && texture.level > 0 {
            return SaveOutcome::SkippedMipmap;
        }

        let location = config.effective_location(info.cache_key);
        let alias = config
            .overrides
            .lookup_hash_file(location, info.hash, config.ignore_address);
        if alias.ignored() {
            return SaveOutcome::Ignored;
        }
        if alias.found_alias() {
            return SaveOutcome::Aliased;
        }

        let key = ReplacementKey::new(location, info.hash);
        let mut records = self.records.lock();
        if records.get(&key).is_some_and(|record| record.is_saved(texture.level)) {
            return SaveOutcome::AlreadySaved;
        }

        let (w, h) = save_size(config, info.addr, texture);
        let Some(rgba) = compact_rows(texture.data, texture.pitch, w, h) else {
            log::error!(
                "Texture {} level {} has {} bytes, not enough for {}x{} at pitch {}",
                key,
                texture.level,
                texture.data.len(),
                w,
                h,
                texture.pitch
            );
            return SaveOutcome::InvalidData;
        };

        let filename = format!("{}.png", key.hash_name(texture.level));
        ctx.pool.submit(SaveTextureTask {
            rgba,
            w,
            h,
            replacement_path: ctx.base_path.join(&filename),
            save_path: ctx.new_texture_dir.join(&filename),
            hash: info.hash,
            skip_if_replaced: self.skip_if_replaced,
        });

        // Recorded on submission; the write may still be in flight.
        let record = records.entry(key).or_default();
        record.levels.insert(texture.level, (w, h));
        record.last_saved = ctx.now;
        SaveOutcome::Submitted
    }

    pub fn is_saved(&self, key: &ReplacementKey, level: usize) -> bool {
        self.records
            .lock()
            .get(key)
            .is_some_and(|record| record.is_saved(level))
    }

    pub fn record(&self, key: &ReplacementKey) -> Option<SaveRecord> {
        self.records.lock().get(key).cloned()
    }

    /// Number of textures with at least one queued level
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every record
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

/// Size to save: the scaled size, clipped to any `[hashranges]` entry
fn save_size(config: &PackConfig, addr: u32, texture: &DecodedTexture<'_>) -> (u32, u32) {
    let range = config
        .overrides
        .lookup_hash_range(addr, texture.orig_w, texture.orig_h);
    match range {
        Some((w, h)) if texture.orig_w > 0 && texture.orig_h > 0 => (
            w * (texture.scaled_w / texture.orig_w),
            h * (texture.scaled_h / texture.orig_h),
        ),
        _ => (texture.scaled_w, texture.scaled_h),
    }
}

/// Copy `h` rows of `w` RGBA8 texels out of a pitched buffer
pub fn compact_rows(data: &[u8], pitch: usize, w: u32, h: u32) -> Option<Vec<u8>> {
    let row_bytes = w as usize * 4;
    let h = h as usize;
    if h == 0 || row_bytes == 0 || pitch < row_bytes || data.len() < (h - 1) * pitch + row_bytes {
        return None;
    }

    let mut out = Vec::with_capacity(row_bytes * h);
    for row in data.chunks(pitch).take(h) {
        out.extend_from_slice(&row[..row_bytes]);
    }
    Some(out)
}

/// Encode and write one dumped level
#[derive(Debug)]
pub struct SaveTextureTask {
    pub rgba: Vec<u8>,
    pub w: u32,
    pub h: u32,
    /// Finished replacement in the pack
    pub replacement_path: PathBuf,
    /// Dump destination under `new/`
    pub save_path: PathBuf,
    pub hash: u32,
    pub skip_if_replaced: bool,
}

impl Task for SaveTextureTask {
    fn run(self: Box<Self>) {
        if self.save_path.exists() {
            log::debug!("Already dumped: {}", self.save_path.display());
            return;
        }
        if self.skip_if_replaced && self.replacement_path.exists() {
            log::debug!("Already replaced: {}", self.replacement_path.display());
            return;
        }

        if let Some(dir) = self.save_path.parent() {
            if let Err(err) = ensure_save_dir(dir) {
                log::error!("Failed to create {}: {}", dir.display(), err);
                return;
            }
        }

        match write_png(&self.save_path, &self.rgba, self.w, self.h) {
            Ok(()) => log::info!(
                "Saving texture for replacement: {:08x} / {}x{} in '{}'",
                self.hash,
                self.w,
                self.h,
                self.save_path.display()
            ),
            Err(err) => log::error!("{}", err),
        }
    }

    fn name(&self) -> &str {
        "save-texture"
    }

    fn priority(&self) -> TaskPriority {
        TaskPriority::Low
    }

    fn kind(&self) -> TaskKind {
        TaskKind::IoBlocking
    }
}

/// Write RGBA8 pixels as PNG, removing any partial file on failure
pub fn write_png(path: &Path, rgba: &[u8], w: u32, h: u32) -> ReplacerResult<()> {
    let result = image::save_buffer_with_format(path, rgba, w, h, ExtendedColorType::Rgba8, ImageFormat::Png);
    result.map_err(|err| {
        if let Err(remove_err) = std::fs::remove_file(path) {
            if remove_err.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove partial {}: {}", path.display(), remove_err);
            }
        }
        ReplacerError::Encode {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    })
}
