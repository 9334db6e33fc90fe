//! # Retexture Platform
//!
//! Platform abstraction for texture packs.
//!
//! This crate provides:
//! - **Virtual file sources**: read-only access to a pack stored either as a
//!   plain directory or as a `textures.zip` archive
//! - **Disk helpers**: save-directory creation with media-scanner markers

pub mod filesystem;

pub use filesystem::{
    DirectoryReader, PackSource, VfsBackend, ZipReader, ensure_save_dir, open_pack,
    INI_FILENAME, NEW_TEXTURE_DIR, NOMEDIA_FILENAME, ZIP_FILENAME,
};

use thiserror::Error;

/// Platform-specific errors
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("File not found in pack: {0}")]
    NotFound(String),

    #[error("File I/O error: {0}")]
    FileIO(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(String),
}

impl PlatformError {
    /// Whether the error only means the entry is absent
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::FileIO(err) => err.kind() == std::io::ErrorKind::NotFound,
            Self::Archive(_) => false,
        }
    }
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(PlatformError::NotFound("a.png".into()).is_not_found());

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(PlatformError::from(io).is_not_found());

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
        assert!(!PlatformError::from(denied).is_not_found());
        assert!(!PlatformError::Archive("bad".into()).is_not_found());
    }
}
