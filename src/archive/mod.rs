//! Archive container boundary
//!
//! The virtual filesystem never touches zip structures directly. It talks to
//! an [`ArchiveContainer`]: something that can enumerate entries, read and
//! write byte ranges, distinguish directories from files, and be closed.
//! [`ZipContainer`] is the implementation used by bundles.

mod matcher;
mod path;
mod zipfs;

pub use matcher::PathMatcher;
pub use path::ContainerPath;
pub use zipfs::{ZipContainer, MIMETYPE_ENTRY};

use crate::error::Result;
use chrono::{DateTime, Utc};

/// Kind of entry inside a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Basic attributes of a container entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    pub kind: EntryKind,
    /// Uncompressed size in bytes (0 for directories)
    pub size: u64,
    /// Last modification time, when the container knows it
    pub modified: Option<DateTime<Utc>>,
}

impl EntryMetadata {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Storage summary of a container, exposed through the bundle file store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
    pub name: String,
    pub kind: String,
    pub total_space: u64,
    pub usable_space: u64,
    pub read_only: bool,
}

/// An open archive: entry tree, byte-range I/O, and an open/close lifecycle.
///
/// Every method except `is_open` and `close` may fail with
/// [`BundleError::Closed`](crate::BundleError::Closed) once the container
/// has been closed.
pub trait ArchiveContainer: Send {
    /// Name separator used by this container's paths
    fn separator(&self) -> &str {
        "/"
    }

    fn is_open(&self) -> bool;

    fn is_read_only(&self) -> Result<bool>;

    /// Close the container, flushing pending changes. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;

    /// The single root directory
    fn root(&self) -> Result<ContainerPath>;

    /// Join name segments into a container path (no filesystem access)
    fn get_path(&self, first: &str, more: &[&str]) -> Result<ContainerPath>;

    /// Compile a `glob:` or `regex:` pattern
    fn path_matcher(&self, syntax_and_pattern: &str) -> Result<PathMatcher>;

    fn store(&self) -> Result<StoreInfo>;

    fn supported_attribute_views(&self) -> Result<Vec<String>>;

    fn metadata(&self, path: &ContainerPath) -> Result<EntryMetadata>;

    fn exists(&self, path: &ContainerPath) -> Result<bool> {
        match self.metadata(path) {
            Ok(_) => Ok(true),
            Err(crate::BundleError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Children of a directory, in container order. Directory children carry
    /// a trailing separator, as zip entry names do.
    fn list_dir(&self, dir: &ContainerPath) -> Result<Vec<ContainerPath>>;

    /// Read up to `len` bytes starting at `offset`
    fn read_range(&self, path: &ContainerPath, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Read a whole file
    fn read(&self, path: &ContainerPath) -> Result<Vec<u8>> {
        let meta = self.metadata(path)?;
        self.read_range(path, 0, meta.size as usize)
    }

    /// Create or truncate a file with the given content
    fn write(&mut self, path: &ContainerPath, data: &[u8]) -> Result<()>;

    /// Write `data` at `offset`, creating the file and zero-filling gaps as needed
    fn write_at(&mut self, path: &ContainerPath, offset: u64, data: &[u8]) -> Result<()>;

    fn create_dir(&mut self, path: &ContainerPath) -> Result<()>;

    /// Remove a file or an empty directory
    fn remove(&mut self, path: &ContainerPath) -> Result<()>;
}
