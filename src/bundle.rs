//! Bundles: a zip file mounted as a [`BundleFileSystem`] together with its
//! manifest.
//!
//! # Example
//!
//! ```no_run
//! use robundle_rs::Bundle;
//!
//! let mut bundle = Bundle::create("example.bundle.zip")?;
//! bundle.root()?.resolve("data.txt").write("Hello, World!")?;
//! bundle.write_manifest()?;
//! bundle.close()?;
//!
//! let mut bundle = Bundle::open("example.bundle.zip")?;
//! assert_eq!(bundle.manifest()?.aggregates().count(), 1);
//! # Ok::<(), robundle_rs::error::BundleError>(())
//! ```

use crate::archive::{ZipContainer, MIMETYPE_ENTRY};
use crate::config::{BundleOptions, DEFAULT_MIME_TYPE};
use crate::error::{BundleError, Result};
use crate::locator::Locator;
use crate::manifest::Manifest;
use crate::vfs::{BundleFileSystem, BundlePath};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

const TEMPORARY_NAME: &str = "bundle.zip";

/// An open bundle
pub struct Bundle {
    fs: BundleFileSystem,
    source: PathBuf,
    options: BundleOptions,
    manifest: Option<Manifest>,
    temp_dir: Option<TempDir>,
}

impl Bundle {
    /// Create a new bundle file at `path` with default options
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with_options(path, BundleOptions::default())
    }

    /// Create a new bundle file; it is written when the bundle is closed
    pub fn create_with_options<P: AsRef<Path>>(path: P, options: BundleOptions) -> Result<Self> {
        let path = path.as_ref();
        let container = ZipContainer::create(path)?.with_compression(options.compression);
        let mut bundle = Self::mount(container, path, options)?;
        let mime_type = bundle.options.mime_type.clone();
        bundle.set_mime_type(&mime_type)?;

        info!(path = %path.display(), mime_type = %mime_type, "Bundle created");
        Ok(bundle)
    }

    /// Create a bundle in a fresh temporary directory, removed on close
    /// unless the bundle is [`persist`](Self::persist)ed
    pub fn create_temporary() -> Result<Self> {
        let temp_dir = tempfile::Builder::new().prefix("robundle").tempdir()?;
        let mut bundle = Self::create(temp_dir.path().join(TEMPORARY_NAME))?;
        bundle.temp_dir = Some(temp_dir);
        Ok(bundle)
    }

    /// Open an existing bundle file with default options
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, BundleOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: BundleOptions) -> Result<Self> {
        let path = path.as_ref();
        let container = if options.read_only {
            ZipContainer::open_read_only(path)?
        } else {
            ZipContainer::open(path)?
        };
        let container = container.with_compression(options.compression);
        let bundle = Self::mount(container, path, options)?;

        info!(path = %path.display(), read_only = bundle.options.read_only, "Bundle opened");
        Ok(bundle)
    }

    fn mount(container: ZipContainer, path: &Path, options: BundleOptions) -> Result<Self> {
        let fs = BundleFileSystem::open(Box::new(container), Locator::arcp_random())?;
        Ok(Self {
            fs,
            source: path.to_path_buf(),
            options,
            manifest: None,
            temp_dir: None,
        })
    }

    pub fn file_system(&self) -> &BundleFileSystem {
        &self.fs
    }

    pub fn root(&self) -> Result<BundlePath> {
        self.fs.root_directory()
    }

    /// The zip file behind this bundle
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn options(&self) -> &BundleOptions {
        &self.options
    }

    pub fn is_open(&self) -> bool {
        self.fs.is_open()
    }

    /// Whether the bundle lives in a temporary directory
    pub fn is_temporary(&self) -> bool {
        self.temp_dir.is_some()
    }

    /// Media type declared by the `mimetype` entry, or the default when the
    /// entry is missing or blank
    pub fn mime_type(&self) -> Result<String> {
        let path = self.root()?.resolve(MIMETYPE_ENTRY);
        if !path.is_file()? {
            return Ok(DEFAULT_MIME_TYPE.to_string());
        }
        let mime_type = path.read_to_string()?;
        let mime_type = mime_type.trim();
        if mime_type.is_empty() {
            Ok(DEFAULT_MIME_TYPE.to_string())
        } else {
            Ok(mime_type.to_string())
        }
    }

    /// Replace the `mimetype` entry. Must be ASCII without line breaks.
    pub fn set_mime_type(&mut self, mime_type: &str) -> Result<()> {
        if mime_type.is_empty()
            || !mime_type.is_ascii()
            || mime_type.contains(['\n', '\r'])
        {
            return Err(BundleError::InvalidMediaType(mime_type.to_string()));
        }
        self.root()?.resolve(MIMETYPE_ENTRY).write(mime_type)?;
        debug!(mime_type, "Bundle media type set");
        Ok(())
    }

    /// The bundle manifest, loaded from `/.ro/manifest.json` on first use or
    /// started empty when the bundle has none
    pub fn manifest(&mut self) -> Result<&mut Manifest> {
        let manifest = match self.manifest.take() {
            Some(manifest) => manifest,
            None => match Manifest::read_from_bundle(&self.fs) {
                Ok(manifest) => manifest,
                Err(BundleError::ManifestNotFound) => {
                    debug!("Bundle has no manifest, starting a new one");
                    Manifest::new(&self.fs)?
                }
                Err(e) => return Err(e),
            },
        };
        Ok(self.manifest.insert(manifest))
    }

    /// Save the manifest, synchronizing it with the tree first when
    /// `populate_on_save` is set
    pub fn write_manifest(&mut self) -> Result<()> {
        let populate = self.options.populate_on_save;
        let manifest = self.manifest()?;
        if populate {
            manifest.populate_from_bundle()?;
        }
        manifest.write_to_bundle()?;
        Ok(())
    }

    /// Save a loaded manifest (if configured) and close the filesystem.
    /// A temporary bundle is deleted. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if !self.fs.is_open() {
            return Ok(());
        }
        if self.manifest.is_some()
            && self.options.write_manifest_on_close
            && !self.fs.is_read_only()?
        {
            self.write_manifest()?;
        }
        self.fs.close()?;
        info!(path = %self.source.display(), "Bundle closed");

        if let Some(temp_dir) = self.temp_dir.take() {
            debug!(path = %temp_dir.path().display(), "Removing temporary bundle");
            temp_dir.close()?;
        }
        Ok(())
    }

    /// Close the bundle and keep its zip file at `dest`
    pub fn persist<P: AsRef<Path>>(mut self, dest: P) -> Result<PathBuf> {
        let dest = dest.as_ref().to_path_buf();
        let temp_dir = self.temp_dir.take();
        self.close()?;

        // rename fails across filesystems
        if self.source != dest && fs::rename(&self.source, &dest).is_err() {
            fs::copy(&self.source, &dest)?;
        }
        drop(temp_dir);

        info!(from = %self.source.display(), to = %dest.display(), "Bundle persisted");
        Ok(dest)
    }
}

impl Drop for Bundle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.source.display(), error = %e, "Failed to close bundle");
        }
    }
}

impl std::fmt::Debug for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundle")
            .field("source", &self.source)
            .field("fs", &self.fs)
            .field("temporary", &self.temp_dir.is_some())
            .finish()
    }
}
