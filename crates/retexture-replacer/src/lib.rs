//! # Retexture Replacer
//!
//! Texture replacement cache for an emulated fixed-function graphics unit.
//!
//! ## Features
//! - Content hashing of texture memory (quick, xxh32, xxh64)
//! - Wildcard override resolution for aliases and forced filtering
//! - Two-level replacement cache sharing assets between fingerprints
//! - Age-based decimation that tightens under memory pressure
//! - Asynchronous, deduplicated dumping of newly seen textures

pub mod cache;
pub mod config;
pub mod decimate;
pub mod hash;
pub mod key;
pub mod loader;
pub mod overrides;
pub mod replacer;
pub mod save;
pub mod texture;

pub use cache::{CacheLookup, ReplacementCache, TextureHandle};
pub use config::{HashRangeKey, OverrideTables, PackConfig, PackSummary, ReplacerSettings};
pub use decimate::{DecimateMode, DecimationReport};
pub use hash::{HashRequest, ReplacedTextureHash};
pub use key::{ReplacementKey, TextureFiltering, TextureFormat};
pub use loader::{generate_ini, ini_exists, load_pack_config, LoadedPack};
pub use overrides::AliasLookup;
pub use replacer::{HostNotifier, LogNotifier, TextureReplacer};
pub use save::{DecodedTexture, ReplacedTextureDecodeInfo, SaveOutcome};
pub use texture::{ImageDecoder, ReplacedTexture, ReplacementState, TextureDecoder};

use std::path::PathBuf;

use retexture_platform::PlatformError;
use thiserror::Error;

/// Replacement errors
#[derive(Error, Debug)]
pub enum ReplacerError {
    #[error("Texture pack lacking ini file: {0}")]
    MissingIni(String),

    #[error("Failed to parse {file}: {reason}")]
    IniSyntax { file: String, reason: String },

    #[error("Failed to load extra texture ini {file}: {reason}")]
    OverrideIni { file: String, reason: String },

    #[error("Ignoring invalid [{section}] entry '{entry}': {reason}")]
    InvalidEntry {
        section: &'static str,
        entry: String,
        reason: String,
    },

    #[error("Unsupported hash type: {0}")]
    UnsupportedHash(String),

    #[error("Failed to decode {name}: {reason}")]
    Decode { name: String, reason: String },

    #[error("Failed to write {}: {reason}", .path.display())]
    Encode { path: PathBuf, reason: String },

    #[error("No game ID set")]
    MissingGameId,

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for replacement operations
pub type ReplacerResult<T> = Result<T, ReplacerError>;
