//! File System Abstraction
//!
//! Read-only pack sources and the few disk writes the replacer needs.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::{PlatformError, PlatformResult};

/// Pack configuration file name
pub const INI_FILENAME: &str = "textures.ini";
/// Archive probed before falling back to the plain directory
pub const ZIP_FILENAME: &str = "textures.zip";
/// Subdirectory receiving newly dumped textures
pub const NEW_TEXTURE_DIR: &str = "new";
/// Marker that keeps media scanners out of dump directories
pub const NOMEDIA_FILENAME: &str = ".nomedia";

/// Read-only hierarchical byte source
pub trait VfsBackend: Send + Sync {
    /// Read a whole file. A missing entry is `PlatformError::NotFound`.
    fn read_file(&self, path: &str) -> PlatformResult<Vec<u8>>;

    /// Check whether an entry exists
    fn exists(&self, path: &str) -> bool;

    /// Human readable location, for logs
    fn describe(&self) -> String;
}

/// Plain directory source
#[derive(Debug, Clone)]
pub struct DirectoryReader {
    base: PathBuf,
}

impl DirectoryReader {
    /// Serve files below `base`
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Get the base directory
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base.join(path.trim_start_matches('/'))
    }
}

impl VfsBackend for DirectoryReader {
    fn read_file(&self, path: &str) -> PlatformResult<Vec<u8>> {
        match std::fs::read(self.resolve(path)) {
            Ok(data) => Ok(data),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(PlatformError::NotFound(path.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }

    fn describe(&self) -> String {
        self.base.display().to_string()
    }
}

/// Zip archive source
///
/// `ZipArchive` needs `&mut` to read entries, so access is serialized.
pub struct ZipReader {
    path: PathBuf,
    archive: Mutex<ZipArchive<File>>,
}

impl ZipReader {
    /// Open an archive, failing if it is missing or not a zip file
    pub fn open(path: impl Into<PathBuf>) -> PlatformResult<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        let archive = ZipArchive::new(file).map_err(|err| PlatformError::Archive(err.to_string()))?;
        Ok(Self {
            path,
            archive: Mutex::new(archive),
        })
    }

    /// Number of entries in the archive
    pub fn len(&self) -> usize {
        self.archive.lock().len()
    }

    /// Whether the archive has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VfsBackend for ZipReader {
    fn read_file(&self, path: &str) -> PlatformResult<Vec<u8>> {
        let mut archive = self.archive.lock();
        let mut entry = match archive.by_name(path.trim_start_matches('/')) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Err(PlatformError::NotFound(path.to_string())),
            Err(err) => return Err(PlatformError::Archive(err.to_string())),
        };

        let mut buffer = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn exists(&self, path: &str) -> bool {
        self.archive
            .lock()
            .index_for_name(path.trim_start_matches('/'))
            .is_some()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Result of probing a pack directory
#[derive(Clone)]
pub struct PackSource {
    /// Where pack files are read from
    pub vfs: Arc<dyn VfsBackend>,
    /// Whether the pack is archive-backed
    pub is_archive: bool,
}

impl std::fmt::Debug for PackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackSource")
            .field("vfs", &self.vfs.describe())
            .field("is_archive", &self.is_archive)
            .finish()
    }
}

/// Open a pack rooted at `base`, preferring `textures.zip` when it is a
/// readable archive.
pub fn open_pack(base: &Path) -> PackSource {
    let zip_path = base.join(ZIP_FILENAME);
    match ZipReader::open(&zip_path) {
        Ok(reader) => PackSource {
            vfs: Arc::new(reader),
            is_archive: true,
        },
        Err(err) => {
            log::info!(
                "{} wasn't a zip file ({}) - opening the directory {} instead.",
                zip_path.display(),
                err,
                base.display()
            );
            PackSource {
                vfs: Arc::new(DirectoryReader::new(base)),
                is_archive: false,
            }
        }
    }
}

/// Create `dir` (and parents) if missing, dropping a `.nomedia` marker in it.
///
/// Returns `true` if the directory was created by this call.
pub fn ensure_save_dir(dir: &Path) -> PlatformResult<bool> {
    if dir.exists() {
        return Ok(false);
    }
    std::fs::create_dir_all(dir)?;
    File::create(dir.join(NOMEDIA_FILENAME))?;
    Ok(true)
}
