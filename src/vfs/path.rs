use super::filesystem::{without_slash, BundleFileSystem, FsShared};
use crate::archive::{ContainerPath, EntryMetadata};
use crate::error::{BundleError, Result};
use crate::locator::Locator;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use std::sync::Arc;

/// Either kind of path value, for APIs that must tell them apart at runtime
pub trait AnyPath: fmt::Debug {
    fn as_container_path(&self) -> Option<&ContainerPath> {
        None
    }

    fn as_bundle_path(&self) -> Option<&BundlePath> {
        None
    }
}

impl AnyPath for ContainerPath {
    fn as_container_path(&self) -> Option<&ContainerPath> {
        Some(self)
    }
}

impl AnyPath for BundlePath {
    fn as_bundle_path(&self) -> Option<&BundlePath> {
        Some(self)
    }
}

/// A location inside one mounted bundle.
///
/// Two paths are equal only if they come from the same mount and have the
/// same normalized form; textually identical paths of different mounts
/// never compare equal.
#[derive(Clone)]
pub struct BundlePath {
    fs: Arc<FsShared>,
    path: ContainerPath,
}

impl BundlePath {
    pub(crate) fn new(fs: Arc<FsShared>, path: ContainerPath) -> Self {
        Self { fs, path }
    }

    pub(crate) fn shared(&self) -> &Arc<FsShared> {
        &self.fs
    }

    /// The owning filesystem
    pub fn file_system(&self) -> BundleFileSystem {
        BundleFileSystem::from_shared(self.fs.clone())
    }

    /// The container path this value wraps
    pub fn container_path(&self) -> &ContainerPath {
        &self.path
    }

    fn sibling(&self, path: ContainerPath) -> BundlePath {
        BundlePath::new(self.fs.clone(), without_slash(&path))
    }

    fn ensure_same_mount(&self, other: &BundlePath) -> Result<()> {
        if Arc::ptr_eq(&self.fs, &other.fs) {
            Ok(())
        } else {
            Err(BundleError::Ownership(format!(
                "{} belongs to a different bundle filesystem",
                other
            )))
        }
    }

    pub fn is_absolute(&self) -> bool {
        self.path.is_absolute()
    }

    pub fn is_root(&self) -> bool {
        self.path.is_root()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()
    }

    pub fn parent(&self) -> Option<BundlePath> {
        self.path.parent().map(|p| self.sibling(p))
    }

    pub fn resolve(&self, other: &str) -> BundlePath {
        self.sibling(self.path.resolve(other))
    }

    pub fn resolve_sibling(&self, other: &str) -> BundlePath {
        self.sibling(self.path.resolve_sibling(other))
    }

    pub fn relativize(&self, other: &BundlePath) -> Result<BundlePath> {
        self.ensure_same_mount(other)?;
        Ok(self.sibling(self.path.relativize(&other.path)))
    }

    /// Segment-wise prefix test; paths of another mount never match
    pub fn starts_with(&self, other: &BundlePath) -> bool {
        Arc::ptr_eq(&self.fs, &other.fs) && self.path.starts_with(&other.path)
    }

    pub fn to_absolute(&self) -> BundlePath {
        self.sibling(self.path.to_absolute())
    }

    pub fn normalize(&self) -> BundlePath {
        self.sibling(self.path.normalize())
    }

    /// Locator of this path below the mount's base locator. Directories end
    /// with `/`.
    pub fn to_uri(&self) -> Result<Locator> {
        let is_dir = match self.metadata() {
            Ok(metadata) => metadata.is_dir(),
            Err(BundleError::NotFound(_)) => false,
            Err(e) => return Err(e),
        };
        Ok(self.uri_for(is_dir))
    }

    /// Locator for this path when its kind is already known
    pub(crate) fn uri_for(&self, is_dir: bool) -> Locator {
        let absolute = self.path.to_absolute().normalize();
        let mut path = absolute.as_str().to_string();
        if is_dir && !path.ends_with('/') {
            path.push('/');
        }
        self.fs.base_uri.resolve(&Locator::from_path(&path))
    }

    // Container-backed operations

    pub fn metadata(&self) -> Result<EntryMetadata> {
        self.file_system()
            .with_container(|c| c.metadata(&self.path))
    }

    pub fn exists(&self) -> Result<bool> {
        self.file_system().with_container(|c| c.exists(&self.path))
    }

    pub fn is_dir(&self) -> Result<bool> {
        match self.metadata() {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(BundleError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn is_file(&self) -> Result<bool> {
        match self.metadata() {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(BundleError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        self.file_system().with_container(|c| c.read(&self.path))
    }

    pub fn read_range(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.file_system()
            .with_container(|c| c.read_range(&self.path, offset, len))
    }

    pub fn read_to_string(&self) -> Result<String> {
        let data = self.read()?;
        String::from_utf8(data)
            .map_err(|e| BundleError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    /// Create or truncate the file
    pub fn write(&self, data: impl AsRef<[u8]>) -> Result<()> {
        self.file_system()
            .with_container(|c| c.write(&self.path, data.as_ref()))
    }

    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.file_system()
            .with_container(|c| c.write_at(&self.path, offset, data))
    }

    pub fn create_dir(&self) -> Result<()> {
        self.file_system()
            .with_container(|c| c.create_dir(&self.path))
    }

    /// Create this directory and any missing ancestors
    pub fn create_dirs(&self) -> Result<()> {
        let absolute = self.path.to_absolute().normalize();
        let mut current = ContainerPath::root();
        for segment in absolute.segments() {
            current = current.resolve(segment);
            let step = current.clone();
            self.file_system().with_container(|c| {
                match c.metadata(&step) {
                    Ok(metadata) if metadata.is_dir() => Ok(()),
                    Ok(_) => Err(BundleError::NotADirectory(step.to_string())),
                    Err(BundleError::NotFound(_)) => c.create_dir(&step),
                    Err(e) => Err(e),
                }
            })?;
        }
        Ok(())
    }

    /// Remove a file or an empty directory
    pub fn remove(&self) -> Result<()> {
        self.file_system().with_container(|c| c.remove(&self.path))
    }

    pub fn read_dir(&self) -> Result<Vec<BundlePath>> {
        self.file_system().read_dir(self)
    }
}

impl PartialEq for BundlePath {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.fs, &other.fs) && self.path == other.path
    }
}

impl Eq for BundlePath {}

impl Hash for BundlePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fs.id.hash(state);
        self.path.hash(state);
    }
}

impl PartialOrd for BundlePath {
    /// Only paths of the same mount are ordered
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if Arc::ptr_eq(&self.fs, &other.fs) {
            Some(self.path.cmp(&other.path))
        } else {
            None
        }
    }
}

impl fmt::Display for BundlePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path.as_str())
    }
}

impl fmt::Debug for BundlePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BundlePath({}, fs={})", self.path, self.fs.id)
    }
}
