use super::{ArchiveContainer, ContainerPath, EntryKind, EntryMetadata, PathMatcher, StoreInfo};
use crate::config::Compression;
use crate::error::{BundleError, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::{FileOptions, ZipWriter};
use zip::{CompressionMethod, ZipArchive};

/// Name of the entry that declares the archive's media type
pub const MIMETYPE_ENTRY: &str = "mimetype";

const MIMETYPE_KEY: &str = "/mimetype";
const ROOT_KEY: &str = "/";

/// Cap on the buffer reserved up front from an entry's declared size
const MAX_PREALLOCATION: u64 = 1 << 20;

/// Largest file the in-memory tree accepts.
const MAX_ENTRY_SIZE: u64 = u32::MAX as u64;

#[derive(Debug, Clone)]
enum Node {
    Directory {
        modified: Option<DateTime<Utc>>,
    },
    File {
        data: Vec<u8>,
        modified: Option<DateTime<Utc>>,
    },
}

impl Node {
    fn directory() -> Self {
        Node::Directory { modified: None }
    }
}

/// Zip-backed archive container.
///
/// The entry tree is held in memory while the container is open; changes are
/// written back to the source file when the container is closed. The
/// `mimetype` entry, if present at the root, is always written first and
/// stored uncompressed so the archive stays sniffable.
pub struct ZipContainer {
    source: Option<PathBuf>,
    entries: BTreeMap<String, Node>,
    open: bool,
    read_only: bool,
    dirty: bool,
    compression: Compression,
}

impl ZipContainer {
    /// Open an existing zip file for reading and writing
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, false)
    }

    /// Open an existing zip file; writes fail with `ReadOnly`
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, true)
    }

    fn open_with<P: AsRef<Path>>(path: P, read_only: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let entries = Self::load(file)?;

        info!(
            path = %path.display(),
            entries = entries.len() - 1,
            read_only,
            "Zip container opened"
        );

        Ok(Self {
            source: Some(path.to_path_buf()),
            entries,
            open: true,
            read_only,
            dirty: false,
            compression: Compression::default(),
        })
    }

    /// Start a new, empty container that will be written to `path` on close
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Zip container created");
        Ok(Self {
            source: Some(path.to_path_buf()),
            entries: Self::empty_tree(),
            open: true,
            read_only: false,
            dirty: true,
            compression: Compression::default(),
        })
    }

    /// An empty container that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            source: None,
            entries: Self::empty_tree(),
            open: true,
            read_only: false,
            dirty: false,
            compression: Compression::default(),
        }
    }

    /// Load a zip archive held in memory; changes stay in memory
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let entries = Self::load(Cursor::new(bytes))?;
        Ok(Self {
            source: None,
            entries,
            open: true,
            read_only: false,
            dirty: false,
            compression: Compression::default(),
        })
    }

    /// Set the compression used when the archive is written
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// File the container flushes to, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Whether there are changes not yet written to the source
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Serialize the current tree as a zip archive
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let cursor = self.write_zip(Cursor::new(Vec::new()))?;
        Ok(cursor.into_inner())
    }

    fn empty_tree() -> BTreeMap<String, Node> {
        let mut entries = BTreeMap::new();
        entries.insert(ROOT_KEY.to_string(), Node::directory());
        entries
    }

    fn load<R: Read + Seek>(reader: R) -> Result<BTreeMap<String, Node>> {
        let mut archive = ZipArchive::new(reader)?;
        let mut entries = Self::empty_tree();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let name = file.name().to_string();
            let Some(key) = entry_key(&name) else {
                warn!(name = %name, "Skipping zip entry with unsafe name");
                continue;
            };

            Self::ensure_parents(&mut entries, &key);

            if file.is_dir() {
                entries.entry(key).or_insert_with(Node::directory);
            } else {
                let mut data = Vec::with_capacity(file.size().min(MAX_PREALLOCATION) as usize);
                file.read_to_end(&mut data)?;
                entries.insert(
                    key,
                    Node::File {
                        data,
                        modified: None,
                    },
                );
            }
        }

        Ok(entries)
    }

    /// Zip archives may omit directory entries; synthesize them
    fn ensure_parents(entries: &mut BTreeMap<String, Node>, key: &str) {
        let mut idx = 0;
        while let Some(pos) = key[idx + 1..].find('/') {
            let parent = &key[..idx + 1 + pos];
            match entries.get(parent) {
                Some(Node::File { .. }) => {
                    warn!(path = %parent, "Zip entry shadows a directory");
                }
                Some(Node::Directory { .. }) => {}
                None => {
                    entries.insert(parent.to_string(), Node::directory());
                }
            }
            idx += 1 + pos;
        }
    }

    fn write_zip<W: Write + Seek>(&self, writer: W) -> Result<W> {
        let mut zip = ZipWriter::new(writer);

        let stored: FileOptions<'_, ()> =
            FileOptions::default().compression_method(CompressionMethod::Stored);
        let options: FileOptions<'_, ()> =
            FileOptions::default().compression_method(self.compression.method());

        if let Some(Node::File { data, .. }) = self.entries.get(MIMETYPE_KEY) {
            zip.start_file(MIMETYPE_ENTRY, stored)?;
            zip.write_all(data)?;
        }

        for (key, node) in &self.entries {
            if key == ROOT_KEY || key == MIMETYPE_KEY {
                continue;
            }
            let name = &key[1..];
            match node {
                Node::Directory { .. } => {
                    zip.add_directory(format!("{}/", name), options)?;
                }
                Node::File { data, .. } => {
                    zip.start_file(name, options)?;
                    zip.write_all(data)?;
                }
            }
        }

        Ok(zip.finish()?)
    }

    /// Write the tree back to the source file via a temporary sibling
    fn flush(&mut self) -> Result<()> {
        let Some(source) = self.source.clone() else {
            return Ok(());
        };
        let dir = match source.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        self.write_zip(temp.as_file_mut())?;
        temp.as_file_mut().flush()?;
        temp.persist(&source).map_err(|e| BundleError::Io(e.error))?;
        self.dirty = false;

        info!(path = %source.display(), entries = self.entries.len() - 1, "Zip container flushed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(BundleError::Closed)
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        if self.read_only {
            return Err(BundleError::ReadOnly);
        }
        Ok(())
    }

    fn node(&self, path: &ContainerPath) -> Result<&Node> {
        self.entries
            .get(&node_key(path))
            .ok_or_else(|| BundleError::NotFound(path.to_string()))
    }

    /// The parent of `key` must exist and be a directory
    fn check_parent(&self, path: &ContainerPath, key: &str) -> Result<()> {
        let parent = parent_key(key);
        match self.entries.get(parent) {
            Some(Node::Directory { .. }) => Ok(()),
            Some(Node::File { .. }) => Err(BundleError::NotADirectory(parent.to_string())),
            None => Err(BundleError::NotFound(
                path.parent()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| parent.to_string()),
            )),
        }
    }

    fn has_children(&self, key: &str) -> bool {
        let prefix = child_prefix(key);
        self.entries
            .range::<str, _>((Bound::Excluded(prefix.as_str()), Bound::Unbounded))
            .next()
            .is_some_and(|(k, _)| k.starts_with(&prefix))
    }
}

impl ArchiveContainer for ZipContainer {
    fn is_open(&self) -> bool {
        self.open
    }

    fn is_read_only(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.read_only)
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        if self.dirty && !self.read_only {
            self.flush()?;
        }
        self.open = false;
        debug!(source = ?self.source, "Zip container closed");
        Ok(())
    }

    fn root(&self) -> Result<ContainerPath> {
        self.ensure_open()?;
        Ok(ContainerPath::root())
    }

    fn get_path(&self, first: &str, more: &[&str]) -> Result<ContainerPath> {
        self.ensure_open()?;
        Ok(ContainerPath::join(first, more))
    }

    fn path_matcher(&self, syntax_and_pattern: &str) -> Result<PathMatcher> {
        self.ensure_open()?;
        PathMatcher::new(syntax_and_pattern)
    }

    fn store(&self) -> Result<StoreInfo> {
        self.ensure_open()?;
        let used: u64 = self
            .entries
            .values()
            .map(|node| match node {
                Node::File { data, .. } => data.len() as u64,
                Node::Directory { .. } => 0,
            })
            .sum();
        let name = self
            .source
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "memory".to_string());
        Ok(StoreInfo {
            name,
            kind: "zipfs".to_string(),
            total_space: used,
            usable_space: 0,
            read_only: self.read_only,
        })
    }

    fn supported_attribute_views(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(vec!["basic".to_string()])
    }

    fn metadata(&self, path: &ContainerPath) -> Result<EntryMetadata> {
        self.ensure_open()?;
        Ok(match self.node(path)? {
            Node::Directory { modified } => EntryMetadata {
                kind: EntryKind::Directory,
                size: 0,
                modified: *modified,
            },
            Node::File { data, modified } => EntryMetadata {
                kind: EntryKind::File,
                size: data.len() as u64,
                modified: *modified,
            },
        })
    }

    fn list_dir(&self, dir: &ContainerPath) -> Result<Vec<ContainerPath>> {
        self.ensure_open()?;
        let key = node_key(dir);
        match self.node(dir)? {
            Node::File { .. } => return Err(BundleError::NotADirectory(dir.to_string())),
            Node::Directory { .. } => {}
        }

        // The root key equals its own child prefix, so start past it
        let prefix = child_prefix(&key);
        let mut children = Vec::new();
        let mut cursor = Bound::Excluded(prefix.clone());
        loop {
            let lower = cursor.as_ref().map(String::as_str);
            let Some((k, node)) = self.entries.range::<str, _>((lower, Bound::Unbounded)).next()
            else {
                break;
            };
            let Some(name) = k.strip_prefix(prefix.as_str()) else {
                break;
            };
            match name.find('/') {
                // Entry below a child directory: jump past that whole subtree
                Some(idx) => cursor = Bound::Included(format!("{}{}0", prefix, &name[..idx])),
                None => {
                    children.push(match node {
                        Node::Directory { .. } => dir.resolve(&format!("{}/", name)),
                        Node::File { .. } => dir.resolve(name),
                    });
                    cursor = Bound::Excluded(k.clone());
                }
            }
        }
        Ok(children)
    }

    fn read_range(&self, path: &ContainerPath, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.ensure_open()?;
        match self.node(path)? {
            Node::Directory { .. } => Err(BundleError::IsADirectory(path.to_string())),
            Node::File { data, .. } => {
                let start = (offset.min(data.len() as u64)) as usize;
                let end = start.saturating_add(len).min(data.len());
                Ok(data[start..end].to_vec())
            }
        }
    }

    fn write(&mut self, path: &ContainerPath, data: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let key = node_key(path);
        match self.entries.get(&key) {
            Some(Node::Directory { .. }) => return Err(BundleError::IsADirectory(path.to_string())),
            Some(Node::File { .. }) => {}
            None => self.check_parent(path, &key)?,
        }
        self.entries.insert(
            key,
            Node::File {
                data: data.to_vec(),
                modified: Some(Utc::now()),
            },
        );
        self.dirty = true;
        Ok(())
    }

    fn write_at(&mut self, path: &ContainerPath, offset: u64, data: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let too_large = || {
            BundleError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("write of {} bytes at offset {} is too large", data.len(), offset),
            ))
        };
        let start = usize::try_from(offset).map_err(|_| too_large())?;
        let end = start.checked_add(data.len()).ok_or_else(too_large)?;
        if end as u64 > MAX_ENTRY_SIZE {
            return Err(too_large());
        }

        let key = node_key(path);
        if !self.entries.contains_key(&key) {
            self.check_parent(path, &key)?;
        }
        let node = self.entries.entry(key).or_insert_with(|| Node::File {
            data: Vec::new(),
            modified: None,
        });
        match node {
            Node::Directory { .. } => Err(BundleError::IsADirectory(path.to_string())),
            Node::File {
                data: content,
                modified,
            } => {
                if content.len() < end {
                    content.resize(end, 0);
                }
                content[start..end].copy_from_slice(data);
                *modified = Some(Utc::now());
                self.dirty = true;
                Ok(())
            }
        }
    }

    fn create_dir(&mut self, path: &ContainerPath) -> Result<()> {
        self.ensure_writable()?;
        let key = node_key(path);
        if self.entries.contains_key(&key) {
            return Err(BundleError::AlreadyExists(path.to_string()));
        }
        self.check_parent(path, &key)?;
        self.entries.insert(
            key,
            Node::Directory {
                modified: Some(Utc::now()),
            },
        );
        self.dirty = true;
        Ok(())
    }

    fn remove(&mut self, path: &ContainerPath) -> Result<()> {
        self.ensure_writable()?;
        let key = node_key(path);
        if key == ROOT_KEY {
            return Err(BundleError::Unsupported("removing the root directory"));
        }
        match self.entries.get(&key) {
            None => return Err(BundleError::NotFound(path.to_string())),
            Some(Node::Directory { .. }) if self.has_children(&key) => {
                return Err(BundleError::DirectoryNotEmpty(path.to_string()))
            }
            Some(_) => {}
        }
        self.entries.remove(&key);
        self.dirty = true;
        Ok(())
    }
}

impl Drop for ZipContainer {
    fn drop(&mut self) {
        if self.open && self.dirty && !self.read_only && self.source.is_some() {
            warn!(source = ?self.source, "Zip container dropped without close; changes discarded");
        }
    }
}

/// Tree key for a container path: absolute, normalized, no trailing separator
fn node_key(path: &ContainerPath) -> String {
    path.to_absolute().normalize().as_str().to_string()
}

/// Tree key for a zip entry name, rejecting names that climb out of the root
fn entry_key(name: &str) -> Option<String> {
    let mut segments = Vec::new();
    for segment in name.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => return None,
            _ => segments.push(segment),
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(format!("/{}", segments.join("/")))
}

fn parent_key(key: &str) -> &str {
    match key.rfind('/') {
        Some(0) | None => ROOT_KEY,
        Some(idx) => &key[..idx],
    }
}

fn child_prefix(key: &str) -> String {
    if key == ROOT_KEY {
        ROOT_KEY.to_string()
    } else {
        format!("{}/", key)
    }
}
