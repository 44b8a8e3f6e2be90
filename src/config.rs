//! Bundle configuration
//!
//! Options can be built in code or loaded from TOML:
//!
//! ```toml
//! mime_type = "application/vnd.wf4ever.robundle+zip"
//! compression = "deflated"
//! read_only = false
//! write_manifest_on_close = true
//! populate_on_save = true
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Media type written to the `mimetype` entry of new bundles
pub const DEFAULT_MIME_TYPE: &str = "application/vnd.wf4ever.robundle+zip";

/// Compression applied to entries when a container is flushed.
/// The `mimetype` entry is always stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Stored,
    #[default]
    Deflated,
}

impl Compression {
    pub(crate) fn method(self) -> zip::CompressionMethod {
        match self {
            Compression::Stored => zip::CompressionMethod::Stored,
            Compression::Deflated => zip::CompressionMethod::Deflated,
        }
    }
}

/// Options for creating and opening bundles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleOptions {
    /// Media type for newly created bundles
    pub mime_type: String,

    /// Entry compression on flush
    pub compression: Compression,

    /// Open existing bundles read-only
    pub read_only: bool,

    /// Save a loaded manifest when the bundle is closed
    pub write_manifest_on_close: bool,

    /// Synchronize aggregates with the tree before saving the manifest
    pub populate_on_save: bool,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            compression: Compression::default(),
            read_only: false,
            write_manifest_on_close: true,
            populate_on_save: true,
        }
    }
}

impl BundleOptions {
    /// Parse options from a TOML document; missing keys take defaults
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load options from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Render options as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}
