//! Replacement Cache
//!
//! Two-level index over replacement assets:
//! - **First level**: fingerprint key to asset reference, including cached
//!   negative results for ignored textures
//! - **Second level**: dedup key (resolved filename set) to the asset,
//!   which owns the only long-lived handle
//!
//! Entries are only ever added, or dropped wholesale by a reload or
//! teardown, so a handed-out [`TextureHandle`] always stays valid.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::key::ReplacementKey;
use crate::texture::ReplacedTexture;

/// Shared handle to a replacement asset
pub type TextureHandle = Arc<ReplacedTexture>;

/// First-level entry
#[derive(Debug, Clone)]
pub struct ReplacedTextureRef {
    /// Dedup key; empty for an ignored texture
    pub hash_files: String,
    pub texture: Option<TextureHandle>,
}

/// Result of a first-level lookup
#[derive(Debug, Clone)]
pub enum CacheLookup {
    /// Never resolved
    Miss,
    /// Resolved before and explicitly ignored
    Ignored,
    Hit(TextureHandle),
}

/// Two-level replacement index
#[derive(Debug, Default)]
pub struct ReplacementCache {
    index: RwLock<AHashMap<ReplacementKey, ReplacedTextureRef>>,
    levels: RwLock<AHashMap<String, TextureHandle>>,
}

impl ReplacementCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// First-level lookup
    pub fn lookup(&self, key: &ReplacementKey) -> CacheLookup {
        match self.index.read().get(key) {
            None => CacheLookup::Miss,
            Some(ReplacedTextureRef { texture: None, .. }) => CacheLookup::Ignored,
            Some(ReplacedTextureRef {
                texture: Some(texture),
                ..
            }) => CacheLookup::Hit(texture.clone()),
        }
    }

    /// Remember that `key` is ignored
    pub fn insert_ignored(&self, key: ReplacementKey) {
        self.index.write().entry(key).or_insert(ReplacedTextureRef {
            hash_files: String::new(),
            texture: None,
        });
    }

    /// Find the asset for `hash_files`, creating it with `make` if this is
    /// the first time the file set is seen, and point `key` at it.
    ///
    /// Returns the handle and whether a new asset was created.
    pub fn get_or_create(
        &self,
        key: ReplacementKey,
        hash_files: &str,
        make: impl FnOnce() -> ReplacedTexture,
    ) -> (TextureHandle, bool) {
        let (texture, created) = {
            let mut levels = self.levels.write();
            match levels.get(hash_files) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let texture = Arc::new(make());
                    levels.insert(hash_files.to_string(), texture.clone());
                    (texture, true)
                }
            }
        };

        self.index.write().insert(
            key,
            ReplacedTextureRef {
                hash_files: hash_files.to_string(),
                texture: Some(texture.clone()),
            },
        );
        (texture, created)
    }

    /// Asset registered under a dedup key
    pub fn asset(&self, hash_files: &str) -> Option<TextureHandle> {
        self.levels.read().get(hash_files).cloned()
    }

    /// Snapshot of every asset
    pub fn assets(&self) -> Vec<TextureHandle> {
        self.levels.read().values().cloned().collect()
    }

    /// Visit every asset while holding the second-level read lock
    pub fn for_each_asset(&self, mut f: impl FnMut(&str, &TextureHandle)) {
        for (hash_files, texture) in self.levels.read().iter() {
            f(hash_files, texture);
        }
    }

    /// Drop first-level entries, keeping the assets
    pub fn clear_index(&self) {
        self.index.write().clear();
    }

    /// Drop both levels
    pub fn clear_all(&self) {
        self.index.write().clear();
        self.levels.write().clear();
    }

    /// Number of first-level entries
    pub fn index_len(&self) -> usize {
        self.index.read().len()
    }

    /// Number of distinct assets
    pub fn asset_len(&self) -> usize {
        self.levels.read().len()
    }
}
