//! Bundle manifest model
//!
//! The manifest (`/.ro/manifest.json`) describes the resources a bundle
//! aggregates: every file inside the bundle, plus any external resource the
//! caller chooses to reference. It also carries annotations linking resources
//! to body documents, provenance agents and timestamps, and conformance
//! claims.
//!
//! Aggregates are keyed by locator. Bundle files use their bundle-relative
//! form (`/dir/b.json`), external resources keep their absolute locator.
//! [`Manifest::populate_from_bundle`] reconciles the bundle-file records with
//! the live tree; external records are never touched by it.
//!
//! # Usage
//!
//! ```no_run
//! use robundle_rs::{Agent, Bundle, Locator};
//! # use robundle_rs::error::Result;
//!
//! # fn main() -> Result<()> {
//! let mut bundle = Bundle::create("example.bundle.zip")?;
//! bundle.root()?.resolve("hello.txt").write("Hello")?;
//!
//! let manifest = bundle.manifest()?;
//! manifest.created_by = Some(Agent::new("Alice"));
//! manifest
//!     .get_or_create(&Locator::parse("http://example.com/data.csv")?)?
//!     .mediatype = Some("text/csv".to_string());
//! manifest.populate_from_bundle()?;
//!
//! bundle.close()?;
//! # Ok(())
//! # }
//! ```

mod index;
pub mod media_type;
mod serialize;

pub use media_type::guess_media_type;
pub use serialize::CONTEXT;

use crate::archive::EntryMetadata;
use crate::error::{BundleError, Result};
use crate::locator::Locator;
use crate::vfs::{BundleFileSystem, BundlePath, FileVisitor, VirtualFilesystem, VisitResult};
use chrono::{DateTime, SubsecRound, Utc};
use index::AggregateIndex;
use serde::{Deserialize, Serialize};
use serialize::{RawAggregate, RawManifest};
use std::collections::HashSet;
use std::io::Write;
use tracing::{debug, info, warn};

/// Where the manifest lives inside a bundle
pub const MANIFEST_PATH: &str = "/.ro/manifest.json";

const RO_DIR: &str = "/.ro";
const META_INF_DIR: &str = "/META-INF";
const MIMETYPE_FILE: &str = "/mimetype";

/// Current time at the precision manifests are written with
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// A person or organization credited in the manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Agent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<Locator>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub orcid: Option<Locator>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Agent {
    /// Create an agent with just a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_uri(mut self, uri: Locator) -> Self {
        self.uri = Some(uri);
        self
    }

    pub fn with_orcid(mut self, orcid: Locator) -> Self {
        self.orcid = Some(orcid);
        self
    }

    /// True when no field is set; such agents are not written
    pub fn is_empty(&self) -> bool {
        self.uri.is_none() && self.orcid.is_none() && self.name.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Bound to a bundle path; removed by synchronization once the path is gone
    BundlePath,
    /// Absolute or fragment locator; synchronization never removes it
    External,
}

/// One aggregated resource
#[derive(Debug, Clone, PartialEq)]
pub struct PathMetadata {
    uri: Locator,
    file: Option<BundlePath>,
    origin: Origin,
    pub mediatype: Option<String>,
    pub created_on: Option<DateTime<Utc>>,
    pub created_by: Option<Agent>,
    pub authored_on: Option<DateTime<Utc>>,
    pub authored_by: Vec<Agent>,
    pub retrieved_from: Option<Locator>,
    pub retrieved_on: Option<DateTime<Utc>>,
    pub retrieved_by: Option<Agent>,
    pub conforms_to: Option<Locator>,
    /// Stand-in identifier for the resource, used when it is annotated
    pub proxy: Option<Locator>,
}

impl PathMetadata {
    fn empty(uri: Locator, origin: Origin) -> Self {
        Self {
            uri,
            file: None,
            origin,
            mediatype: None,
            created_on: None,
            created_by: None,
            authored_on: None,
            authored_by: Vec::new(),
            retrieved_from: None,
            retrieved_on: None,
            retrieved_by: None,
            conforms_to: None,
            proxy: None,
        }
    }

    /// Record for a bundle file or directory; files get a guessed media type
    pub(crate) fn for_path(uri: Locator, file: BundlePath) -> Self {
        let mut metadata = Self::empty(uri, Origin::BundlePath);
        if !metadata.uri.path().ends_with('/') {
            metadata.mediatype = file.file_name().map(|name| guess_media_type(name).to_string());
        }
        metadata.file = Some(file);
        metadata
    }

    pub(crate) fn external(uri: Locator) -> Self {
        Self::empty(uri, Origin::External)
    }

    /// Locator this record is keyed by
    pub fn uri(&self) -> &Locator {
        &self.uri
    }

    /// Bundle path the record is bound to, if it names a bundle file
    pub fn file(&self) -> Option<&BundlePath> {
        self.file.as_ref()
    }

    /// Whether synchronization manages this record
    pub fn is_bundle_path(&self) -> bool {
        self.origin == Origin::BundlePath
    }

    /// Assign a fresh `urn:uuid:` proxy
    pub fn generate_proxy(&mut self) -> &Locator {
        self.proxy.insert(Locator::urn_uuid())
    }

    pub(crate) fn key(&self) -> String {
        self.uri.to_string()
    }
}

/// Links resources (`about`) to a body document (`content`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PathAnnotation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<Locator>,

    /// Annotated resources; relative entries are relative to the manifest
    #[serde(
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "serialize::serialize_one_or_many",
        deserialize_with = "serialize::one_or_many"
    )]
    pub about: Vec<Locator>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Locator>,

    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize::optional_timestamp::serialize"
    )]
    pub created_on: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "serialize::agent_is_empty")]
    pub created_by: Option<Agent>,
}

impl PathAnnotation {
    /// A new annotation with a generated `urn:uuid:` identifier
    pub fn new(about: Locator, content: Locator) -> Self {
        Self {
            uri: Some(Locator::urn_uuid()),
            about: vec![about],
            content: Some(content),
            created_on: None,
            created_by: None,
        }
    }
}

/// The manifest of one bundle
#[derive(Debug, Clone)]
pub struct Manifest {
    fs: BundleFileSystem,
    base_uri: Locator,
    pub id: Locator,
    /// Files holding this manifest
    pub manifest: Vec<BundlePath>,
    pub conforms_to: Vec<Locator>,
    pub created_on: Option<DateTime<Utc>>,
    pub created_by: Option<Agent>,
    pub authored_on: Option<DateTime<Utc>>,
    pub authored_by: Vec<Agent>,
    pub retrieved_from: Option<Locator>,
    pub retrieved_on: Option<DateTime<Utc>>,
    pub retrieved_by: Option<Agent>,
    pub history: Vec<BundlePath>,
    aggregates: AggregateIndex,
    pub annotations: Vec<PathAnnotation>,
    pub graph: Vec<serde_json::Value>,
}

impl Manifest {
    /// An empty manifest for the bundle mounted at `fs`, created now
    pub fn new(fs: &BundleFileSystem) -> Result<Self> {
        Ok(Self {
            fs: fs.clone(),
            base_uri: fs.base_uri()?.clone(),
            id: Locator::from_path("/"),
            manifest: Vec::new(),
            conforms_to: Vec::new(),
            created_on: Some(now()),
            created_by: None,
            authored_on: None,
            authored_by: Vec::new(),
            retrieved_from: None,
            retrieved_on: None,
            retrieved_by: None,
            history: Vec::new(),
            aggregates: AggregateIndex::default(),
            annotations: Vec::new(),
            graph: Vec::new(),
        })
    }

    pub fn file_system(&self) -> &BundleFileSystem {
        &self.fs
    }

    /// Locator of the bundle root
    pub fn base_uri(&self) -> &Locator {
        &self.base_uri
    }

    /// Base that relative annotation targets are resolved against
    pub fn manifest_base(&self) -> Locator {
        self.base_uri.resolve(&Locator::from_path(MANIFEST_PATH))
    }

    /// Index key for `uri`: legacy scheme rewritten, then made relative to
    /// the bundle root when it lies inside the bundle
    pub fn relative_to_bundle_root(&self, uri: &Locator) -> Locator {
        bundle_key(&self.base_uri, uri)
    }

    /// The aggregate for `uri`, created if missing.
    ///
    /// A new record for a relative locator without fragment is bound to the
    /// bundle path it names and gets a media type guessed from the file name;
    /// anything else becomes an external record.
    pub fn get_or_create(&mut self, uri: &Locator) -> Result<&mut PathMetadata> {
        let key = self.relative_to_bundle_root(uri);
        let fs = &self.fs;
        self.aggregates
            .get_or_try_insert_with(&key.to_string(), || new_record(fs, key.clone()))
    }

    /// The aggregate for a path of this bundle, created if missing
    pub fn get_or_create_path(&mut self, path: &BundlePath) -> Result<&mut PathMetadata> {
        if !self.fs.owns(path) {
            return Err(BundleError::Ownership(format!(
                "{} belongs to a different bundle filesystem",
                path
            )));
        }
        let uri = path.to_uri()?;
        self.get_or_create(&uri)
    }

    /// Lookup without creating
    pub fn aggregate(&self, uri: &Locator) -> Option<&PathMetadata> {
        self.aggregates
            .get(&self.relative_to_bundle_root(uri).to_string())
    }

    /// All aggregates in insertion order
    pub fn aggregates(&self) -> impl Iterator<Item = &PathMetadata> {
        self.aggregates.values()
    }

    pub fn remove_aggregate(&mut self, uri: &Locator) -> Option<PathMetadata> {
        let key = self.relative_to_bundle_root(uri);
        self.aggregates.remove(&key.to_string())
    }

    /// Reconcile the aggregates with the bundle tree.
    ///
    /// Afterwards there is one record per file in the bundle, plus every
    /// external record. Directory records only survive when they were already
    /// present and the directory still has members. `/.ro`, `/META-INF` and
    /// `/mimetype` are not aggregated. `created_on` is set to now.
    ///
    /// A failure part way leaves the index partially updated; run the whole
    /// call again.
    pub fn populate_from_bundle(&mut self) -> Result<()> {
        let prunable: Vec<String> = self
            .aggregates
            .values()
            .filter(|metadata| metadata.is_bundle_path())
            .map(PathMetadata::key)
            .collect();

        let root = self.fs.root_directory()?;
        let mut populator = Populator {
            base_uri: &self.base_uri,
            aggregates: &mut self.aggregates,
            stale: prunable.iter().cloned().collect(),
            open_dirs: Vec::new(),
            added: 0,
            removed_dirs: 0,
        };
        self.fs.walk(&root, &mut populator)?;
        let Populator {
            stale,
            added,
            removed_dirs,
            ..
        } = populator;

        self.created_on = Some(now());

        let mut pruned = 0;
        for key in prunable.iter().filter(|key| stale.contains(*key)) {
            if self.aggregates.remove(key).is_some() {
                debug!(uri = %key, "Pruned stale aggregate");
                pruned += 1;
            }
        }

        info!(
            aggregates = self.aggregates.len(),
            added,
            pruned,
            removed_dirs,
            "Manifest synchronized with bundle"
        );
        Ok(())
    }

    /// Annotations whose `about` list names `about`.
    ///
    /// Relative locators, both the argument and the `about` entries, are
    /// resolved against [`manifest_base`](Self::manifest_base) before an exact
    /// comparison.
    pub fn annotations_about(&self, about: &Locator) -> Vec<&PathAnnotation> {
        let base = self.manifest_base();
        let target = if about.is_absolute() {
            about.to_string()
        } else {
            base.resolve(about).to_string()
        };
        self.annotations
            .iter()
            .filter(|annotation| {
                annotation
                    .about
                    .iter()
                    .any(|entry| base.resolve(entry).to_string() == target)
            })
            .collect()
    }

    pub fn annotations_about_path(&self, path: &BundlePath) -> Result<Vec<&PathAnnotation>> {
        Ok(self.annotations_about(&path.to_uri()?))
    }

    /// The annotation with identifier `uri`
    pub fn annotation(&self, uri: &Locator) -> Option<&PathAnnotation> {
        self.annotations
            .iter()
            .find(|annotation| annotation.uri.as_ref() == Some(uri))
    }

    pub fn add_annotation(&mut self, annotation: PathAnnotation) -> &mut PathAnnotation {
        self.annotations.push(annotation);
        let last = self.annotations.len() - 1;
        &mut self.annotations[last]
    }

    /// Pretty-printed JSON document
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Parse a manifest document for the bundle mounted at `fs`
    pub fn from_json(fs: &BundleFileSystem, json: &[u8]) -> Result<Self> {
        let raw: RawManifest = serde_json::from_slice(json)
            .map_err(|e| BundleError::ManifestParseFailed(e.to_string()))?;

        let mut manifest = Self::new(fs)?;
        if let Some(id) = raw.id {
            manifest.id = id;
        }
        manifest.manifest = bundle_paths(fs, &raw.manifest)?;
        manifest.conforms_to = raw.conforms_to;
        manifest.created_on = raw.created_on;
        manifest.created_by = raw.created_by;
        manifest.authored_on = raw.authored_on;
        manifest.authored_by = raw.authored_by;
        manifest.retrieved_from = raw.retrieved_from;
        manifest.retrieved_on = raw.retrieved_on;
        manifest.retrieved_by = raw.retrieved_by;
        manifest.history = bundle_paths(fs, &raw.history)?;
        manifest.annotations = raw.annotations;
        manifest.graph = raw.graph;

        for aggregate in raw.aggregates {
            manifest.add_raw_aggregate(aggregate)?;
        }

        debug!(
            aggregates = manifest.aggregates.len(),
            annotations = manifest.annotations.len(),
            "Manifest parsed"
        );
        Ok(manifest)
    }

    fn add_raw_aggregate(&mut self, raw: RawAggregate) -> Result<()> {
        let uri = match (raw.uri, raw.file.as_deref()) {
            (Some(uri), _) => uri,
            (None, Some(file)) => Locator::from_path(file),
            (None, None) => {
                warn!("Skipping aggregate without uri");
                return Ok(());
            }
        };

        let metadata = self.get_or_create(&uri)?;
        metadata.mediatype = raw.mediatype;
        metadata.created_on = raw.created_on;
        metadata.created_by = raw.created_by;
        metadata.authored_on = raw.authored_on;
        metadata.authored_by = raw.authored_by;
        metadata.retrieved_from = raw.retrieved_from;
        metadata.retrieved_on = raw.retrieved_on;
        metadata.retrieved_by = raw.retrieved_by;
        metadata.conforms_to = raw.conforms_to;
        metadata.proxy = raw.proxy;
        Ok(())
    }

    /// Save to [`MANIFEST_PATH`], creating `/.ro` as needed
    pub fn write_to_bundle(&mut self) -> Result<BundlePath> {
        let path = self.fs.get_path(MANIFEST_PATH, &[])?;
        if let Some(parent) = path.parent() {
            parent.create_dirs()?;
        }
        if !self.manifest.contains(&path) {
            self.manifest.push(path.clone());
        }

        let json = self.to_json()?;
        path.write(json.as_bytes())?;

        info!(
            path = %path,
            aggregates = self.aggregates.len(),
            bytes = json.len(),
            "Manifest written"
        );
        Ok(path)
    }

    /// Load the manifest stored in the bundle mounted at `fs`
    pub fn read_from_bundle(fs: &BundleFileSystem) -> Result<Self> {
        let path = fs.get_path(MANIFEST_PATH, &[])?;
        if !path.is_file()? {
            return Err(BundleError::ManifestNotFound);
        }
        let manifest = Self::from_json(fs, &path.read()?)?;
        info!(path = %path, aggregates = manifest.aggregates.len(), "Manifest loaded");
        Ok(manifest)
    }
}

impl PartialEq for Manifest {
    /// Document equality on the same mount
    fn eq(&self, other: &Self) -> bool {
        self.fs.same_mount(&other.fs)
            && self.base_uri == other.base_uri
            && self.id == other.id
            && self.manifest == other.manifest
            && self.conforms_to == other.conforms_to
            && self.created_on == other.created_on
            && self.created_by == other.created_by
            && self.authored_on == other.authored_on
            && self.authored_by == other.authored_by
            && self.retrieved_from == other.retrieved_from
            && self.retrieved_on == other.retrieved_on
            && self.retrieved_by == other.retrieved_by
            && self.history == other.history
            && self.aggregates == other.aggregates
            && self.annotations == other.annotations
            && self.graph == other.graph
    }
}

fn bundle_key(base_uri: &Locator, uri: &Locator) -> Locator {
    let uri = uri.rewrite_legacy_scheme();
    Locator::from_path("/").resolve(&base_uri.relativize(&uri))
}

fn new_record(fs: &BundleFileSystem, key: Locator) -> Result<PathMetadata> {
    if !key.is_absolute() && key.fragment().is_none() {
        let path = fs.get_path(&key.decoded_path(), &[])?;
        Ok(PathMetadata::for_path(key, path))
    } else {
        Ok(PathMetadata::external(key))
    }
}

fn bundle_paths(fs: &BundleFileSystem, paths: &[String]) -> Result<Vec<BundlePath>> {
    paths.iter().map(|path| fs.get_path(path, &[])).collect()
}

fn is_reserved(path: &BundlePath) -> bool {
    matches!(
        path.container_path().as_str(),
        RO_DIR | META_INF_DIR | MIMETYPE_FILE
    )
}

struct OpenDir {
    /// Key of the directory's existing record, if it has one
    key: Option<String>,
    members: usize,
}

/// Walk visitor that upserts one record per visited file
struct Populator<'a> {
    base_uri: &'a Locator,
    aggregates: &'a mut AggregateIndex,
    /// Bundle-path records not seen yet
    stale: HashSet<String>,
    open_dirs: Vec<OpenDir>,
    added: usize,
    removed_dirs: usize,
}

impl Populator<'_> {
    fn upsert_file(&mut self, path: &BundlePath) -> Result<()> {
        let key = bundle_key(self.base_uri, &path.uri_for(false));
        let key_str = key.to_string();
        self.stale.remove(&key_str);

        let mut created = false;
        let metadata = self.aggregates.get_or_try_insert_with(&key_str, || {
            created = true;
            Ok(PathMetadata::for_path(key, path.clone()))
        })?;
        metadata.file = Some(path.clone());

        if created {
            self.added += 1;
        }
        Ok(())
    }

    /// Directories never gain a record here, only refresh one they have
    fn touch_dir(&mut self, path: &BundlePath) -> Option<String> {
        let key = bundle_key(self.base_uri, &path.uri_for(true)).to_string();
        let metadata = self.aggregates.get_mut(&key)?;
        metadata.file = Some(path.clone());
        self.stale.remove(&key);
        Some(key)
    }

    fn count_member(&mut self) {
        if let Some(parent) = self.open_dirs.last_mut() {
            parent.members += 1;
        }
    }
}

impl FileVisitor<BundlePath> for Populator<'_> {
    fn pre_visit_directory(&mut self, dir: &BundlePath) -> Result<VisitResult> {
        if dir.is_root() {
            self.open_dirs.push(OpenDir {
                key: None,
                members: 0,
            });
            return Ok(VisitResult::Continue);
        }
        if is_reserved(dir) {
            return Ok(VisitResult::SkipSubtree);
        }

        self.count_member();
        let key = self.touch_dir(dir);
        self.open_dirs.push(OpenDir { key, members: 0 });
        Ok(VisitResult::Continue)
    }

    fn visit_file(&mut self, file: &BundlePath, _metadata: &EntryMetadata) -> Result<VisitResult> {
        if is_reserved(file) {
            return Ok(VisitResult::Continue);
        }
        self.count_member();
        self.upsert_file(file)?;
        Ok(VisitResult::Continue)
    }

    fn post_visit_directory(&mut self, _dir: &BundlePath) -> Result<VisitResult> {
        let Some(OpenDir {
            key: Some(key),
            members,
        }) = self.open_dirs.pop()
        else {
            return Ok(VisitResult::Continue);
        };

        if members == 0 && self.aggregates.remove(&key).is_some() {
            self.removed_dirs += 1;
        }
        Ok(VisitResult::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveContainer, ContainerPath, ZipContainer};

    const BASE: &str = "arcp://uuid,9a4a2f3e-1b2c-4d5e-8f90-0123456789ab/";

    fn mount() -> BundleFileSystem {
        let mut container = ZipContainer::in_memory();
        container.write(&ContainerPath::new("/a.txt"), b"a").unwrap();
        container.create_dir(&ContainerPath::new("/dir")).unwrap();
        container
            .write(&ContainerPath::new("/dir/b.json"), b"{}")
            .unwrap();
        BundleFileSystem::open(Box::new(container), Locator::parse(BASE).unwrap()).unwrap()
    }

    fn loc(s: &str) -> Locator {
        Locator::parse(s).unwrap()
    }

    fn keys(manifest: &Manifest) -> Vec<String> {
        manifest.aggregates().map(|m| m.uri().to_string()).collect()
    }

    #[test]
    fn test_legacy_scheme_collapses_to_one_record() {
        let fs = mount();
        let mut manifest = Manifest::new(&fs).unwrap();

        let legacy = BASE.replace("arcp://", "app://") + "a.txt";
        manifest.get_or_create(&loc(&legacy)).unwrap();
        manifest.get_or_create(&loc(&format!("{}a.txt", BASE))).unwrap();
        manifest.get_or_create(&loc("/a.txt")).unwrap();

        assert_eq!(keys(&manifest), vec!["/a.txt"]);
        let record = manifest.aggregate(&loc("/a.txt")).unwrap();
        assert!(record.is_bundle_path());
        assert_eq!(record.file(), Some(&fs.get_path("/a.txt", &[]).unwrap()));
        assert_eq!(
            record.mediatype.as_deref(),
            Some("text/plain; charset=\"utf-8\"")
        );
    }

    #[test]
    fn test_external_records() {
        let fs = mount();
        let mut manifest = Manifest::new(&fs).unwrap();
        let record = manifest
            .get_or_create(&loc("http://example.com/data.csv"))
            .unwrap();
        assert!(!record.is_bundle_path());
        assert!(record.file().is_none());
        assert!(record.mediatype.is_none());

        let fragment = manifest.get_or_create(&loc("/a.txt#part")).unwrap();
        assert!(!fragment.is_bundle_path());
        assert_eq!(fragment.uri().to_string(), "/a.txt#part");
    }

    #[test]
    fn test_populate_converges_on_tree() {
        let fs = mount();
        let mut manifest = Manifest::new(&fs).unwrap();
        manifest
            .get_or_create(&loc("http://example.com/data.csv"))
            .unwrap();

        manifest.populate_from_bundle().unwrap();
        assert_eq!(
            keys(&manifest),
            vec!["http://example.com/data.csv", "/a.txt", "/dir/b.json"]
        );
        assert_eq!(
            manifest.aggregate(&loc("/dir/b.json")).unwrap().mediatype.as_deref(),
            Some("application/json")
        );

        fs.get_path("/dir/b.json", &[]).unwrap().remove().unwrap();
        manifest.populate_from_bundle().unwrap();
        assert_eq!(keys(&manifest), vec!["http://example.com/data.csv", "/a.txt"]);
    }

    #[test]
    fn test_populate_is_idempotent() {
        let fs = mount();
        let mut manifest = Manifest::new(&fs).unwrap();
        manifest.populate_from_bundle().unwrap();
        let first = keys(&manifest);
        manifest.populate_from_bundle().unwrap();
        assert_eq!(keys(&manifest), first);
    }

    #[test]
    fn test_pruning_boundary() {
        let fs = mount();
        let mut manifest = Manifest::new(&fs).unwrap();
        manifest.get_or_create(&loc("/ghost.txt")).unwrap();
        manifest.get_or_create(&loc("/ghost.txt#section")).unwrap();
        manifest.get_or_create(&loc("urn:isbn:0451450523")).unwrap();

        manifest.populate_from_bundle().unwrap();

        let keys = keys(&manifest);
        assert!(!keys.contains(&"/ghost.txt".to_string()));
        assert!(keys.contains(&"/ghost.txt#section".to_string()));
        assert!(keys.contains(&"urn:isbn:0451450523".to_string()));
    }

    #[test]
    fn test_directory_records() {
        let fs = mount();
        let mut manifest = Manifest::new(&fs).unwrap();
        manifest.get_or_create(&loc("/dir/")).unwrap();

        manifest.populate_from_bundle().unwrap();
        assert!(manifest.aggregate(&loc("/dir/")).is_some());
        assert!(manifest.aggregate(&loc("/dir/")).unwrap().mediatype.is_none());

        fs.get_path("/dir/b.json", &[]).unwrap().remove().unwrap();
        manifest.populate_from_bundle().unwrap();
        assert!(manifest.aggregate(&loc("/dir/")).is_none());
        assert_eq!(keys(&manifest), vec!["/a.txt"]);
    }

    fn deep_mount(depth: usize) -> BundleFileSystem {
        let mut buffer = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buffer);
            let name = format!("{}f.txt", "d/".repeat(depth));
            zip.start_file(name, zip::write::SimpleFileOptions::default())
                .unwrap();
            std::io::Write::write_all(&mut zip, b"leaf").unwrap();
            zip.finish().unwrap();
        }
        let container = ZipContainer::from_bytes(buffer.into_inner()).unwrap();
        BundleFileSystem::open(Box::new(container), Locator::parse(BASE).unwrap()).unwrap()
    }

    #[test]
    fn test_populate_very_deep_tree() {
        let depth = 10_000;
        let fs = deep_mount(depth);
        let mut manifest = Manifest::new(&fs).unwrap();
        manifest.get_or_create(&loc("/d/")).unwrap();

        manifest.populate_from_bundle().unwrap();

        let leaf = format!("/{}f.txt", "d/".repeat(depth));
        assert_eq!(keys(&manifest), vec!["/d/".to_string(), leaf.clone()]);
        let record = manifest.aggregate(&loc(&leaf)).unwrap();
        assert_eq!(record.file().unwrap().read().unwrap(), b"leaf");
    }

    #[test]
    fn test_populate_does_not_keep_new_directory_records() {
        let fs = mount();
        fs.get_path("/dir/sub", &[]).unwrap().create_dir().unwrap();
        let mut manifest = Manifest::new(&fs).unwrap();
        manifest.populate_from_bundle().unwrap();

        assert_eq!(keys(&manifest), vec!["/a.txt", "/dir/b.json"]);
        manifest.populate_from_bundle().unwrap();
        assert_eq!(keys(&manifest), vec!["/a.txt", "/dir/b.json"]);
    }

    #[test]
    fn test_reserved_entries_skipped() {
        let fs = mount();
        fs.get_path("/mimetype", &[]).unwrap().write("application/zip").unwrap();
        let ro = fs.get_path("/.ro", &[]).unwrap();
        ro.create_dir().unwrap();
        ro.resolve("manifest.json").write("{}").unwrap();

        let mut manifest = Manifest::new(&fs).unwrap();
        manifest.populate_from_bundle().unwrap();
        assert_eq!(keys(&manifest), vec!["/a.txt", "/dir/b.json"]);
    }

    #[test]
    fn test_populate_updates_created_on() {
        let fs = mount();
        let mut manifest = Manifest::new(&fs).unwrap();
        manifest.created_on = None;
        manifest.populate_from_bundle().unwrap();
        assert!(manifest.created_on.is_some());
    }

    #[test]
    fn test_populate_on_closed_filesystem() {
        let fs = mount();
        let mut manifest = Manifest::new(&fs).unwrap();
        fs.close().unwrap();
        assert!(matches!(
            manifest.populate_from_bundle(),
            Err(BundleError::Closed)
        ));
        assert!(matches!(
            manifest.get_or_create(&loc("/a.txt")),
            Err(BundleError::Closed)
        ));
    }

    #[test]
    fn test_annotation_resolution() {
        let fs = mount();
        let mut manifest = Manifest::new(&fs).unwrap();
        let annotation = PathAnnotation::new(loc("../a.txt"), loc("../notes.txt"));
        let id = annotation.uri.clone().unwrap();
        manifest.add_annotation(annotation);

        assert_eq!(manifest.manifest_base().to_string(), format!("{}.ro/manifest.json", BASE));
        assert_eq!(manifest.annotations_about(&loc("/a.txt")).len(), 1);
        assert_eq!(
            manifest
                .annotations_about(&loc(&format!("{}a.txt", BASE)))
                .len(),
            1
        );
        assert!(manifest.annotations_about(&loc("/dir/b.json")).is_empty());

        let path = fs.get_path("/a.txt", &[]).unwrap();
        assert_eq!(manifest.annotations_about_path(&path).unwrap().len(), 1);

        assert!(manifest.annotation(&id).is_some());
        assert!(manifest.annotation(&Locator::urn_uuid()).is_none());
    }

    #[test]
    fn test_get_or_create_path_rejects_foreign() {
        let fs = mount();
        let other = mount();
        let mut manifest = Manifest::new(&fs).unwrap();

        let own = fs.get_path("/dir", &[]).unwrap();
        assert_eq!(manifest.get_or_create_path(&own).unwrap().uri().to_string(), "/dir/");

        let foreign = other.get_path("/a.txt", &[]).unwrap();
        assert!(matches!(
            manifest.get_or_create_path(&foreign),
            Err(BundleError::Ownership(_))
        ));
    }

    #[test]
    fn test_serialized_field_order_and_suppression() {
        let fs = mount();
        let mut manifest = Manifest::new(&fs).unwrap();
        manifest.created_by = Some(Agent::new("Alice"));
        manifest.retrieved_by = Some(Agent::default());
        manifest.authored_by = vec![Agent::default()];
        manifest.conforms_to.push(loc("https://w3id.org/ro/crate/1.0"));
        manifest.populate_from_bundle().unwrap();
        manifest.write_to_bundle().unwrap();
        manifest.add_annotation(PathAnnotation::new(loc("/a.txt"), loc("/.ro/notes.txt")));

        let json = manifest.to_json().unwrap();
        let order = [
            "\"@context\"",
            "\"id\"",
            "\"manifest\"",
            "\"conformsTo\"",
            "\"createdOn\"",
            "\"createdBy\"",
            "\"aggregates\"",
            "\"annotations\"",
        ];
        let positions: Vec<usize> = order.iter().map(|key| json.find(key).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{}", json);

        assert!(!json.contains("null"));
        assert!(!json.contains("[]"));
        assert!(!json.contains("{}"));
        assert!(!json.contains("retrievedBy"));
        assert!(!json.contains("authoredBy"));
        assert!(json.contains("\n  \"id\": \"/\""));
        assert!(json.contains(CONTEXT));
    }

    #[test]
    fn test_json_roundtrip() {
        let fs = mount();
        let mut manifest = Manifest::new(&fs).unwrap();
        manifest.authored_on = Some(now());
        manifest.authored_by = vec![
            Agent::new("Alice").with_orcid(loc("http://orcid.org/0000-0002-1825-0097")),
            Agent::new("Bob"),
        ];
        manifest.retrieved_from = Some(loc("http://example.com/bundle.zip"));
        manifest.graph.push(serde_json::json!({"@id": "#x"}));
        manifest.populate_from_bundle().unwrap();

        let external = manifest
            .get_or_create(&loc("http://example.com/data.csv"))
            .unwrap();
        external.mediatype = Some("text/csv".to_string());
        external.retrieved_on = Some(now());
        external.generate_proxy();

        let mut annotation = PathAnnotation::new(loc("/a.txt"), loc("/.ro/notes.txt"));
        annotation.about.push(loc("/dir/b.json"));
        annotation.created_by = Some(Agent::new("Carol"));
        manifest.add_annotation(annotation);
        manifest.write_to_bundle().unwrap();

        let parsed = Manifest::from_json(&fs, manifest.to_json().unwrap().as_bytes()).unwrap();
        assert_eq!(parsed, manifest);
        assert_eq!(keys(&parsed), keys(&manifest));
        assert!(parsed.aggregate(&loc("/a.txt")).unwrap().is_bundle_path());
        assert!(!parsed
            .aggregate(&loc("http://example.com/data.csv"))
            .unwrap()
            .is_bundle_path());

        let loaded = Manifest::read_from_bundle(&fs).unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn test_from_json_errors() {
        let fs = mount();
        assert!(matches!(
            Manifest::from_json(&fs, b"not json"),
            Err(BundleError::ManifestParseFailed(_))
        ));
        assert!(matches!(
            Manifest::read_from_bundle(&fs),
            Err(BundleError::ManifestNotFound)
        ));
    }

    #[test]
    fn test_from_json_accepts_older_documents() {
        let fs = mount();
        let legacy = BASE.replace("arcp://", "app://");
        let json = format!(
            r#"{{
                "@context": ["https://w3id.org/bundle/context"],
                "id": "/",
                "manifest": "/.ro/manifest.json",
                "createdOn": "2014-01-30T11:34:03Z",
                "aggregates": [
                    {{"file": "/a.txt", "mediatype": "text/plain"}},
                    {{"uri": "{}dir/b.json", "unknown": 1}}
                ],
                "annotations": [{{"about": "../a.txt", "content": "../notes.txt"}}]
            }}"#,
            legacy
        );
        let manifest = Manifest::from_json(&fs, json.as_bytes()).unwrap();
        assert_eq!(keys(&manifest), vec!["/a.txt", "/dir/b.json"]);
        assert_eq!(manifest.manifest.len(), 1);
        assert_eq!(manifest.annotations_about(&loc("/a.txt")).len(), 1);
        assert_eq!(
            manifest.created_on.map(|t| serialize::format_timestamp(&t)),
            Some("2014-01-30T11:34:03.000Z".to_string())
        );
    }

    #[test]
    fn test_write_to_matches_to_json() {
        let fs = mount();
        let mut manifest = Manifest::new(&fs).unwrap();
        manifest.created_by = Some(Agent::new("Alice").with_uri(loc("http://example.com/alice")));
        let proxy = manifest
            .get_or_create(&loc("/a.txt"))
            .unwrap()
            .generate_proxy()
            .clone();
        assert_eq!(proxy.scheme(), Some("urn"));

        let mut buffer = Vec::new();
        manifest.write_to(&mut buffer).unwrap();
        let written = String::from_utf8(buffer).unwrap();
        assert_eq!(written, manifest.to_json().unwrap());
        assert!(written.contains("\"uri\": \"http://example.com/alice\""));
        assert!(written.contains(&format!("\"proxy\": \"{}\"", proxy)));
    }
}
