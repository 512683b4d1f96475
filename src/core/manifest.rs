//! Bundle manifest index
//!
//! The manifest records one [`PathMetadata`] per aggregated resource, keyed
//! by URI. Entries are either inferred by walking the bundle tree
//! ([`Manifest::populate_from_bundle`]) or declared explicitly through
//! [`Manifest::aggregation`]. The index is persisted as JSON-LD at
//! `.ro/manifest.json`.
//!
//! Keys follow a trailing-slash convention: files are `/inputs/in1`,
//! directories are `/outputs/empty/`. External resources are keyed by their
//! absolute URI.

use crate::error::Result;
use crate::path::BundlePath;
use crate::sniff::MIMETYPE_ENTRY;
use crate::vfs::{EntryKind, EntryMetadata, VirtualTree};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};
use url::Url;

/// JSON-LD context of bundle manifests
pub const BUNDLE_CONTEXT: &str = "https://w3id.org/bundle/context";

/// Metadata directories skipped when walking the tree
const RESERVED_DIRS: [&str; 2] = [".ro", "META-INF"];

/// Metadata about one aggregated resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathMetadata {
    /// Bundle-internal location, `/`-rooted, directories end in `/`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// External or fragment URI, for resources without a file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// Containing directory, with trailing slash
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mediatype: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_on: Option<DateTime<Utc>>,

    /// Set when the entry was inferred from the tree rather than declared
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub proxy: bool,
}

impl PathMetadata {
    /// Index key: the file location, else the URI
    pub fn key(&self) -> Option<&str> {
        self.file.as_deref().or(self.uri.as_deref())
    }

    pub fn with_mediatype(mut self, mediatype: impl Into<String>) -> Self {
        self.mediatype = Some(mediatype.into());
        self
    }

    fn for_key(key: &str) -> Self {
        if key.starts_with('/') && !key.contains('#') {
            let mediatype = if key.ends_with('/') {
                None
            } else {
                Some(guess_media_type(key).to_string())
            };
            PathMetadata {
                file: Some(key.to_string()),
                mediatype,
                ..Default::default()
            }
        } else {
            PathMetadata {
                uri: Some(key.to_string()),
                ..Default::default()
            }
        }
    }
}

/// Index of everything aggregated by a bundle
///
/// # Examples
///
/// ```
/// use databundle::Manifest;
///
/// let mut manifest = Manifest::new();
/// manifest.aggregation("inputs/in1")?.mediatype = Some("text/plain".into());
/// manifest.aggregation("http://example.com/data")?;
///
/// assert!(manifest.get("/inputs/in1").is_some());
/// assert_eq!(manifest.len(), 2);
/// # Ok::<(), databundle::BundleError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(rename = "@context", default = "default_context")]
    context: Vec<String>,

    #[serde(default = "default_id")]
    id: String,

    /// Locations of the manifest documents themselves
    #[serde(default)]
    manifest: Vec<String>,

    created_on: DateTime<Utc>,

    #[serde(
        default,
        serialize_with = "serialize_aggregates",
        deserialize_with = "deserialize_aggregates"
    )]
    aggregates: BTreeMap<String, PathMetadata>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

impl Manifest {
    /// Manifest location inside a bundle
    pub const PATH: &'static str = ".ro/manifest.json";

    pub fn new() -> Self {
        Manifest {
            context: default_context(),
            id: default_id(),
            manifest: Vec::new(),
            created_on: Utc::now(),
            aggregates: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_on(&self) -> DateTime<Utc> {
        self.created_on
    }

    pub fn manifest_documents(&self) -> &[String] {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.aggregates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }

    /// All aggregates in key order
    pub fn aggregates(&self) -> impl Iterator<Item = &PathMetadata> {
        self.aggregates.values()
    }

    /// Look up an aggregate by URI or bundle-relative path
    pub fn get(&self, uri: &str) -> Option<&PathMetadata> {
        let key = aggregate_key(uri).ok()?;
        self.aggregates.get(&key)
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.get(uri).is_some()
    }

    /// Get or create the aggregate for `uri`
    ///
    /// Absolute URIs become external aggregates; anything else is resolved
    /// against the bundle root. A trailing slash marks a directory.
    pub fn aggregation(&mut self, uri: &str) -> Result<&mut PathMetadata> {
        let key = aggregate_key(uri)?;
        Ok(self
            .aggregates
            .entry(key)
            .or_insert_with_key(|key| PathMetadata::for_key(key)))
    }

    pub fn remove(&mut self, uri: &str) -> Option<PathMetadata> {
        let key = aggregate_key(uri).ok()?;
        self.aggregates.remove(&key)
    }

    /// Replace every aggregate; entries with neither file nor URI are dropped
    pub fn set_aggregates<I>(&mut self, aggregates: I)
    where
        I: IntoIterator<Item = PathMetadata>,
    {
        self.aggregates = index_aggregates(aggregates);
    }

    /// Reconcile the index with the files present in `tree`
    ///
    /// Files and empty directories are registered (or refreshed), the
    /// metadata directories, the `mimetype` entry and the manifest documents
    /// are skipped, and previously registered file entries that no longer
    /// exist are pruned. External aggregates are never pruned.
    pub fn populate_from_bundle<T>(&mut self, tree: &T) -> Result<()>
    where
        T: VirtualTree + ?Sized,
    {
        let mut walk = Walk {
            to_prune: self.aggregates.keys().cloned().collect(),
            potentially_empty: HashSet::new(),
        };
        self.visit_dir(tree, &BundlePath::root(), &mut walk)?;

        let mut pruned = 0;
        for key in walk.to_prune {
            let has_file = self
                .aggregates
                .get(&key)
                .map_or(false, |meta| meta.file.is_some());
            if has_file {
                self.aggregates.remove(&key);
                pruned += 1;
            }
        }

        debug!(
            "Manifest synced: {} aggregates, {} pruned",
            self.aggregates.len(),
            pruned
        );
        Ok(())
    }

    fn visit_dir<T>(&mut self, tree: &T, dir: &BundlePath, walk: &mut Walk) -> Result<()>
    where
        T: VirtualTree + ?Sized,
    {
        let dir_key = dir.to_uri(true);
        walk.potentially_empty.insert(dir_key.clone());

        for name in tree.list(dir)? {
            let child = dir.child_unchecked(&name);
            let meta = match tree.metadata(&child)? {
                Some(meta) => meta,
                None => continue,
            };
            match meta.kind {
                EntryKind::Directory => {
                    walk.potentially_empty.remove(&dir_key);
                    if dir.is_root() && RESERVED_DIRS.contains(&name.as_str()) {
                        continue;
                    }
                    self.visit_dir(tree, &child, walk)?;
                }
                EntryKind::File => {
                    walk.potentially_empty.remove(&dir_key);
                    self.visit_file(&child, &dir_key, &meta, walk);
                }
            }
        }

        if !dir.is_root() && walk.potentially_empty.remove(&dir_key) {
            walk.to_prune.remove(&dir_key);
            let folder = dir.parent().map(|parent| parent.to_uri(true));
            let created_on = tree.metadata(dir)?.and_then(|meta| meta.modified);

            let meta = self.aggregates.entry(dir_key.clone()).or_insert_with(|| PathMetadata {
                proxy: true,
                ..Default::default()
            });
            meta.file = Some(dir_key);
            meta.folder = folder;
            meta.created_on = created_on;
        }
        Ok(())
    }

    fn visit_file(&mut self, file: &BundlePath, dir_key: &str, entry: &EntryMetadata, walk: &mut Walk) {
        if file.parent().map_or(false, |p| p.is_root()) && file.file_name() == Some(MIMETYPE_ENTRY) {
            return;
        }
        let key = file.to_uri(false);
        if self.manifest.contains(&key) {
            return;
        }

        walk.to_prune.remove(&key);
        let meta = self.aggregates.entry(key.clone()).or_insert_with(|| PathMetadata {
            proxy: true,
            ..Default::default()
        });
        if meta.mediatype.is_none() {
            meta.mediatype = Some(guess_media_type(&key).to_string());
        }
        meta.file = Some(key);
        meta.folder = Some(dir_key.to_string());
        meta.created_on = entry.modified;
    }

    /// Serialize the index to [`Manifest::PATH`] inside `tree`
    pub fn write_as_json_ld<T>(&mut self, tree: &mut T) -> Result<BundlePath>
    where
        T: VirtualTree + ?Sized,
    {
        let path = BundlePath::new(Self::PATH)?;
        let uri = path.to_uri(false);
        if !self.manifest.contains(&uri) {
            self.manifest.insert(0, uri);
        }

        let json = serde_json::to_vec_pretty(self)?;
        tree.write(&path, &json)?;
        debug!("Wrote manifest with {} aggregates", self.aggregates.len());
        Ok(path)
    }

    /// Load the index from [`Manifest::PATH`], if the tree has one
    pub fn read_from<T>(tree: &T) -> Result<Option<Manifest>>
    where
        T: VirtualTree + ?Sized,
    {
        let path = BundlePath::new(Self::PATH)?;
        if !tree.is_file(&path)? {
            return Ok(None);
        }
        let manifest = serde_json::from_slice(&tree.read(&path)?)?;
        Ok(Some(manifest))
    }
}

struct Walk {
    to_prune: HashSet<String>,
    potentially_empty: HashSet<String>,
}

/// Guess a media type from a file name extension
///
/// ```
/// use databundle::guess_media_type;
///
/// assert_eq!(guess_media_type("/outputs/figure.PNG"), "image/png");
/// assert_eq!(guess_media_type("/inputs/in1"), "application/octet-stream");
/// ```
pub fn guess_media_type(name: &str) -> &'static str {
    let name = name.rsplit('/').next().unwrap_or(name);
    let extension = match name.rfind('.') {
        Some(idx) if idx > 0 => name[idx + 1..].to_ascii_lowercase(),
        _ => return "application/octet-stream",
    };
    match extension.as_str() {
        "txt" => "text/plain; charset=\"utf-8\"",
        "ttl" => "text/turtle; charset=\"utf-8\"",
        "rdf" | "owl" => "application/rdf+xml",
        "json" => "application/json",
        "jsonld" => "application/ld+json",
        "xml" => "application/xml",
        "png" => "image/png",
        "svg" => "image/svg+xml",
        "jpg" | "jpeg" => "image/jpeg",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Normalize a URI or path into an index key
fn aggregate_key(uri: &str) -> Result<String> {
    if let Ok(url) = Url::parse(uri) {
        return Ok(url.to_string());
    }
    let (location, fragment) = match uri.split_once('#') {
        Some((location, fragment)) => (location, Some(fragment)),
        None => (uri, None),
    };
    let path = BundlePath::new(location)?;
    let key = path.to_uri(location.ends_with('/'));
    Ok(match fragment {
        Some(fragment) => format!("{}#{}", key, fragment),
        None => key,
    })
}

fn index_aggregates<I>(aggregates: I) -> BTreeMap<String, PathMetadata>
where
    I: IntoIterator<Item = PathMetadata>,
{
    let mut index = BTreeMap::new();
    for meta in aggregates {
        match meta.key().map(aggregate_key) {
            Some(Ok(key)) => {
                index.insert(key, meta);
            }
            _ => warn!("Dropping aggregate without a usable file or uri: {:?}", meta),
        }
    }
    index
}

fn default_context() -> Vec<String> {
    vec![BUNDLE_CONTEXT.to_string()]
}

fn default_id() -> String {
    "/".to_string()
}

fn serialize_aggregates<S>(
    aggregates: &BTreeMap<String, PathMetadata>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(aggregates.values())
}

fn deserialize_aggregates<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, PathMetadata>, D::Error>
where
    D: Deserializer<'de>,
{
    let list = Vec::<PathMetadata>::deserialize(deserializer)?;
    Ok(index_aggregates(list))
}
