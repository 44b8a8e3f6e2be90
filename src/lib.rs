//! robundle-rs: research object bundles in Rust
//!
//! A bundle is a zip archive holding arbitrary files plus a JSON manifest
//! that describes them. This library provides:
//! - A virtual filesystem over the archive, with bundle-scoped paths
//! - `arcp://` locators for paths inside an opened bundle
//! - The manifest model, kept in sync with the archive tree
//! - Media type sniffing for archives with a leading `mimetype` entry
//!
//! # Example
//!
//! ```no_run
//! use robundle_rs::Bundle;
//!
//! // Create a bundle
//! let mut bundle = Bundle::create("example.bundle.zip")?;
//! let root = bundle.root()?;
//! root.resolve("data.txt").write("Hello, World!")?;
//! bundle.manifest()?.populate_from_bundle()?;
//! bundle.close()?;
//!
//! // Read it back
//! let bundle = Bundle::open("example.bundle.zip")?;
//! let data = bundle.root()?.resolve("data.txt").read_to_string()?;
//! # Ok::<(), robundle_rs::error::BundleError>(())
//! ```

// Core modules
pub mod archive;
pub mod bundle;
pub mod config;
pub mod detect;
pub mod error;
pub mod locator;
pub mod manifest;
pub mod vfs;

// Re-export commonly used types
pub use archive::{ArchiveContainer, ContainerPath, EntryMetadata, ZipContainer};
pub use bundle::Bundle;
pub use config::{BundleOptions, Compression, DEFAULT_MIME_TYPE};
pub use detect::{BundleFileTypeDetector, APPLICATION_ZIP};
pub use error::{BundleError, Result};
pub use locator::Locator;
pub use manifest::{guess_media_type, Agent, Manifest, PathAnnotation, PathMetadata, MANIFEST_PATH};
pub use vfs::{
    AnyPath, BundleFileStore, BundleFileSystem, BundlePath, FileVisitor, VirtualFilesystem,
    VisitResult,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Ensure core types are accessible
        let _compression = Compression::Deflated;
        let _root = Locator::arcp_random();
        assert_eq!(guess_media_type("x.json"), "application/json");
    }
}
