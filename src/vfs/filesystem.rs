use super::path::{AnyPath, BundlePath};
use super::store::BundleFileStore;
use super::VirtualFilesystem;
use crate::archive::{ArchiveContainer, ContainerPath, EntryMetadata, PathMatcher};
use crate::error::{BundleError, Result};
use crate::locator::{decode_path, Locator, ARCP_SCHEME};
use parking_lot::Mutex;
use std::convert::Infallible;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

static NEXT_FS_ID: AtomicU64 = AtomicU64::new(1);

/// State shared by a filesystem handle and every path it produced
pub(crate) struct FsShared {
    pub(crate) id: u64,
    pub(crate) base_uri: Locator,
    separator: String,
    source: PathBuf,
    container: Mutex<Option<Box<dyn ArchiveContainer>>>,
}

/// A mounted view of one archive under one base locator.
///
/// Handles are cheap to clone and all clones refer to the same mount.
/// `close` takes the container out of the mount and closes it once; from then
/// on every operation except `close` and `is_open` fails with
/// [`BundleError::Closed`].
#[derive(Clone)]
pub struct BundleFileSystem {
    shared: Arc<FsShared>,
}

impl BundleFileSystem {
    /// Mount `container` under `base_uri`.
    ///
    /// `base_uri` is either an `arcp://` locator, or a composite
    /// `<scheme>:<zip location>!/` locator naming the archive file.
    pub fn open(container: Box<dyn ArchiveContainer>, base_uri: Locator) -> Result<Self> {
        if !container.is_open() {
            return Err(BundleError::Closed);
        }
        let separator = container.separator().to_string();
        let source = find_source(&base_uri)?;
        let id = NEXT_FS_ID.fetch_add(1, Ordering::Relaxed);

        info!(id, base_uri = %base_uri, source = %source.display(), "Bundle filesystem opened");

        Ok(Self {
            shared: Arc::new(FsShared {
                id,
                base_uri,
                separator,
                source,
                container: Mutex::new(Some(container)),
            }),
        })
    }

    pub(crate) fn from_shared(shared: Arc<FsShared>) -> Self {
        Self { shared }
    }

    /// Run `f` against the open container, or fail with `Closed`
    pub(crate) fn with_container<R>(
        &self,
        f: impl FnOnce(&mut dyn ArchiveContainer) -> Result<R>,
    ) -> Result<R> {
        let mut guard = self.shared.container.lock();
        match guard.as_mut() {
            Some(container) if container.is_open() => f(&mut **container),
            _ => Err(BundleError::Closed),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        self.with_container(|_| Ok(()))
    }

    /// Locator identifying this mount
    pub fn base_uri(&self) -> Result<&Locator> {
        self.ensure_open()?;
        Ok(&self.shared.base_uri)
    }

    /// Location of the archive itself, derived from the base locator
    pub fn source(&self) -> Result<&Path> {
        self.ensure_open()?;
        Ok(&self.shared.source)
    }

    pub fn separator(&self) -> Result<&str> {
        self.ensure_open()?;
        Ok(&self.shared.separator)
    }

    /// Whether two handles refer to the same mount
    pub fn same_mount(&self, other: &BundleFileSystem) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub(crate) fn owns(&self, path: &BundlePath) -> bool {
        Arc::ptr_eq(&self.shared, path.shared())
    }

    /// Wrap a container path into a bundle path of this filesystem.
    ///
    /// A trailing separator left on a directory name by the container is
    /// stripped. Wrapping a `BundlePath` is a contract violation.
    pub fn wrap(&self, path: &dyn AnyPath) -> Result<BundlePath> {
        if let Some(bundle_path) = path.as_bundle_path() {
            return Err(BundleError::Ownership(format!(
                "Did not expect BundlePath: {}",
                bundle_path
            )));
        }
        let raw = path
            .as_container_path()
            .ok_or_else(|| BundleError::Ownership(format!("Not a container path: {:?}", path)))?;
        Ok(self.wrap_raw(raw))
    }

    pub(crate) fn wrap_raw(&self, raw: &ContainerPath) -> BundlePath {
        BundlePath::new(self.shared.clone(), without_slash(raw))
    }

    /// The container path behind a bundle path of this filesystem
    pub fn unwrap(&self, path: &dyn AnyPath) -> Result<ContainerPath> {
        match path.as_bundle_path() {
            Some(bundle_path) if self.owns(bundle_path) => Ok(bundle_path.container_path().clone()),
            Some(bundle_path) => Err(BundleError::Ownership(format!(
                "{} belongs to a different bundle filesystem",
                bundle_path
            ))),
            None => Err(BundleError::Ownership(format!(
                "Not a bundle path: {:?}",
                path
            ))),
        }
    }

    pub fn get_path(&self, first: &str, more: &[&str]) -> Result<BundlePath> {
        let raw = self.with_container(|c| c.get_path(first, more))?;
        Ok(self.wrap_raw(&raw))
    }

    /// Compile a `glob:` or `regex:` matcher over bundle paths
    pub fn path_matcher(&self, syntax_and_pattern: &str) -> Result<BundlePathMatcher> {
        let matcher = self.with_container(|c| c.path_matcher(syntax_and_pattern))?;
        Ok(BundlePathMatcher {
            fs: self.clone(),
            matcher,
        })
    }

    pub fn root_directory(&self) -> Result<BundlePath> {
        let root = self.with_container(|c| c.root())?;
        Ok(self.wrap_raw(&root))
    }

    /// Always exactly one root
    pub fn root_directories(&self) -> Result<Vec<BundlePath>> {
        Ok(vec![self.root_directory()?])
    }

    pub fn file_store(&self) -> Result<BundleFileStore> {
        let info = self.with_container(|c| c.store())?;
        Ok(BundleFileStore::new(self.clone(), info))
    }

    /// Always exactly one store
    pub fn file_stores(&self) -> Result<Vec<BundleFileStore>> {
        Ok(vec![self.file_store()?])
    }

    pub fn supported_file_attribute_views(&self) -> Result<Vec<String>> {
        self.with_container(|c| c.supported_attribute_views())
    }

    pub fn is_open(&self) -> bool {
        self.shared
            .container
            .lock()
            .as_ref()
            .is_some_and(|c| c.is_open())
    }

    pub fn is_read_only(&self) -> Result<bool> {
        self.with_container(|c| c.is_read_only())
    }

    /// Close the underlying container. Later calls are no-ops.
    pub fn close(&self) -> Result<()> {
        let taken = self.shared.container.lock().take();
        if let Some(mut container) = taken {
            container.close()?;
            info!(id = self.shared.id, base_uri = %self.shared.base_uri, "Bundle filesystem closed");
        }
        Ok(())
    }

    pub fn metadata(&self, path: &BundlePath) -> Result<EntryMetadata> {
        let raw = self.unwrap(path)?;
        self.with_container(|c| c.metadata(&raw))
    }

    /// Children of a directory, wrapped
    pub fn read_dir(&self, dir: &BundlePath) -> Result<Vec<BundlePath>> {
        let raw = self.unwrap(dir)?;
        let children = self.with_container(|c| c.list_dir(&raw))?;
        debug!(dir = %raw, children = children.len(), "Listed bundle directory");
        Ok(children.iter().map(|child| self.wrap_raw(child)).collect())
    }

    pub fn user_principal_lookup_service(&self) -> Result<Infallible> {
        self.ensure_open()?;
        Err(BundleError::Unsupported("user principal lookup"))
    }

    pub fn new_watch_service(&self) -> Result<Infallible> {
        self.ensure_open()?;
        Err(BundleError::Unsupported("watch service"))
    }
}

impl VirtualFilesystem for BundleFileSystem {
    type Path = BundlePath;

    fn get_path(&self, first: &str, more: &[&str]) -> Result<BundlePath> {
        BundleFileSystem::get_path(self, first, more)
    }

    fn root_directory(&self) -> Result<BundlePath> {
        BundleFileSystem::root_directory(self)
    }

    fn read_dir(&self, dir: &BundlePath) -> Result<Vec<BundlePath>> {
        BundleFileSystem::read_dir(self, dir)
    }

    fn metadata(&self, path: &BundlePath) -> Result<EntryMetadata> {
        BundleFileSystem::metadata(self, path)
    }

    fn is_open(&self) -> bool {
        BundleFileSystem::is_open(self)
    }

    fn is_read_only(&self) -> Result<bool> {
        BundleFileSystem::is_read_only(self)
    }

    fn close(&self) -> Result<()> {
        BundleFileSystem::close(self)
    }
}

impl fmt::Debug for BundleFileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleFileSystem")
            .field("id", &self.shared.id)
            .field("base_uri", &self.shared.base_uri.to_string())
            .field("source", &self.shared.source)
            .finish()
    }
}

/// Path matcher that accepts bundle paths of one filesystem
#[derive(Debug, Clone)]
pub struct BundlePathMatcher {
    fs: BundleFileSystem,
    matcher: PathMatcher,
}

impl BundlePathMatcher {
    pub fn matches(&self, path: &BundlePath) -> Result<bool> {
        let raw = self.fs.unwrap(path)?;
        Ok(self.matcher.matches(&raw))
    }
}

/// Derive the archive's own location from the base locator
fn find_source(base_uri: &Locator) -> Result<PathBuf> {
    if base_uri.scheme() == Some(ARCP_SCHEME) {
        return Ok(PathBuf::from(base_uri.decoded_path()));
    }

    let scheme_specific = base_uri.scheme_specific_part();
    let inner = scheme_specific
        .strip_suffix("!/")
        .ok_or_else(|| BundleError::MalformedLocator(base_uri.to_string()))?;
    let zip = Locator::parse(inner).map_err(|_| BundleError::MalformedLocator(base_uri.to_string()))?;

    match zip.scheme() {
        Some("file") => Ok(PathBuf::from(zip.decoded_path())),
        None => Ok(PathBuf::from(decode_path(inner))),
        Some(_) => Err(BundleError::MalformedLocator(base_uri.to_string())),
    }
}

/// Strip the trailing separator a container leaves on directory names
pub(crate) fn without_slash(dir: &ContainerPath) -> ContainerPath {
    let Some(name) = dir.file_name() else {
        return dir.clone();
    };
    if !name.ends_with('/') && name != "/" {
        return dir.clone();
    }
    dir.resolve_sibling(&name.replace('/', ""))
}
