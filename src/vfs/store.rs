use super::filesystem::BundleFileSystem;
use crate::archive::StoreInfo;
use crate::error::Result;

/// The single storage area behind a bundle filesystem
#[derive(Debug, Clone)]
pub struct BundleFileStore {
    fs: BundleFileSystem,
    name: String,
    kind: String,
}

impl BundleFileStore {
    pub(crate) fn new(fs: BundleFileSystem, info: StoreInfo) -> Self {
        Self {
            fs,
            name: info.name,
            kind: info.kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store type of the underlying container (e.g. `zipfs`)
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn file_system(&self) -> &BundleFileSystem {
        &self.fs
    }

    fn info(&self) -> Result<StoreInfo> {
        self.fs.with_container(|c| c.store())
    }

    pub fn total_space(&self) -> Result<u64> {
        Ok(self.info()?.total_space)
    }

    pub fn usable_space(&self) -> Result<u64> {
        Ok(self.info()?.usable_space)
    }

    pub fn is_read_only(&self) -> Result<bool> {
        Ok(self.info()?.read_only)
    }

    pub fn supports_file_attribute_view(&self, name: &str) -> Result<bool> {
        Ok(self
            .fs
            .supported_file_attribute_views()?
            .iter()
            .any(|view| view == name))
    }
}
