//! Bundle container lifecycle
//!
//! A [`Bundle`] is one open ZIP container. While open, its content lives in a
//! private staging directory and is edited through [`VirtualTree`]; the
//! archive on disk is stale until [`Bundle::close`] flattens the tree back
//! into a fresh archive. The first entry of every written archive is the
//! uncompressed `mimetype` entry, so [`crate::sniff`] can identify the file
//! from its first bytes.
//!
//! ```text
//!   create() ──► open ──► close() ──────────────► closed (source = temp archive)
//!   open(path) ─┘    └──► close_and_save(dest) ──► closed (source = dest)
//! ```

use crate::config::BundleConfig;
use crate::error::{BundleError, Result};
use crate::manifest::Manifest;
use crate::path::BundlePath;
use crate::ports::PortStore;
use crate::sniff::{self, Sniffed, MIMETYPE_ENTRY};
use crate::vfs::{DirTree, EntryKind, EntryMetadata, VirtualTree};
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use url::Url;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Entries larger than this are not preallocated on extraction
const MAX_PREALLOCATION: u64 = 1 << 20;

/// One open (or closed) data bundle
pub struct Bundle {
    config: BundleConfig,

    /// Backing archive; stale while the bundle is open
    source: Option<PathBuf>,

    /// Whether `source` is a temporary archive owned by this bundle
    source_is_temporary: bool,

    /// Staging directory holding the live tree, `None` once closed
    staging: Option<TempDir>,

    tree: DirTree,

    /// Authority of the `app://` root URI
    root_id: String,

    manifest: Manifest,
}

impl Bundle {
    /// Create a new, empty bundle with the default configuration
    ///
    /// The bundle is backed by a temporary archive that holds only the
    /// `mimetype` entry until the bundle is closed.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use databundle::Bundle;
    ///
    /// let mut bundle = Bundle::create()?;
    /// let archive = bundle.close()?;
    /// # Ok::<(), databundle::BundleError>(())
    /// ```
    pub fn create() -> Result<Self> {
        Self::create_with(BundleConfig::default())
    }

    pub fn create_with(config: BundleConfig) -> Result<Self> {
        config.validate()?;
        let mut bundle = Self::staged(config, None, false)?;
        let media_type = bundle.config.media_type.clone();
        bundle.tree.write(&mimetype_path(), media_type.as_bytes())?;

        let archive = bundle.write_archive()?;
        bundle.source = Some(archive);
        bundle.source_is_temporary = true;

        info!(
            "Created bundle {:?} ({})",
            bundle.source,
            bundle.config.media_type
        );
        Ok(bundle)
    }

    /// Open an existing archive with the default configuration
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, BundleConfig::default())
    }

    /// Open an existing archive
    ///
    /// The archive must declare the configured media type, or be a ZIP
    /// without a `mimetype` entry; a generic ZIP opens with an empty
    /// manifest, as does a bundle whose `.ro/manifest.json` cannot be
    /// parsed. Anything else fails with [`BundleError::UnsupportedFormat`].
    pub fn open_with<P: AsRef<Path>>(path: P, config: BundleConfig) -> Result<Self> {
        let path = path.as_ref();
        config.validate()?;
        info!("Opening bundle at {:?}", path);

        let sniffed = sniff::sniff_file(path)?;
        let typed = match &sniffed {
            Sniffed::MediaType(found) if *found == config.media_type => true,
            Sniffed::GenericArchive => false,
            other => {
                return Err(BundleError::UnsupportedFormat {
                    path: path.display().to_string(),
                    expected: config.media_type.clone(),
                    found: other.media_type().unwrap_or("unrecognized").to_string(),
                })
            }
        };

        let mut bundle = Self::staged(config, Some(path.to_path_buf()), false)?;
        extract_archive(path, &mut bundle.tree)?;

        let media_type = bundle.config.media_type.clone();
        bundle.tree.write(&mimetype_path(), media_type.as_bytes())?;

        if typed {
            match Manifest::read_from(&bundle.tree) {
                Ok(Some(manifest)) => {
                    debug!("Loaded manifest with {} aggregates", manifest.len());
                    bundle.manifest = manifest;
                }
                Ok(None) => {}
                // An unreadable inventory is rebuilt from the tree on close
                Err(BundleError::Serialization(e)) => {
                    warn!(
                        "Ignoring unreadable {} in {:?}: {}",
                        Manifest::PATH,
                        path,
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        } else {
            warn!(
                "{:?} is a generic ZIP archive, opened without a prior manifest",
                path
            );
        }

        Ok(bundle)
    }

    fn staged(config: BundleConfig, source: Option<PathBuf>, temporary: bool) -> Result<Self> {
        let staging = tempfile::Builder::new()
            .prefix("databundle-")
            .tempdir_in(config.temp_dir())?;
        let tree = DirTree::new(staging.path())?;
        Ok(Bundle {
            config,
            source,
            source_is_temporary: temporary,
            staging: Some(staging),
            tree,
            root_id: format!("{:032x}", rand::random::<u128>()),
            manifest: Manifest::new(),
        })
    }

    /// Backing archive path
    ///
    /// For a fresh bundle this is its temporary archive; after a close it is
    /// the archive that close produced.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.staging.is_some()
    }

    pub fn media_type(&self) -> &str {
        &self.config.media_type
    }

    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn manifest_mut(&mut self) -> &mut Manifest {
        &mut self.manifest
    }

    /// Typed port access over `inputs/` and `outputs/`
    pub fn ports(&mut self) -> Result<PortStore<'_, Bundle>> {
        self.ensure_open()?;
        Ok(PortStore::new(self))
    }

    /// Walk the live tree and reconcile the manifest with it
    pub fn sync_manifest(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.manifest.populate_from_bundle(&self.tree)
    }

    /// Sync the manifest and write it to `.ro/manifest.json`
    pub fn write_manifest(&mut self) -> Result<BundlePath> {
        self.ensure_open()?;
        self.manifest.populate_from_bundle(&self.tree)?;
        self.manifest.write_as_json_ld(&mut self.tree)
    }

    /// Flatten the tree into a new temporary archive and close the bundle
    ///
    /// Returns the archive path, which also becomes [`Bundle::source`]. A
    /// temporary archive the bundle previously owned is deleted. On failure
    /// the bundle stays open and nothing is lost.
    pub fn close(&mut self) -> Result<PathBuf> {
        self.ensure_open()?;

        if self.config.write_manifest {
            self.write_manifest()?;
        }
        let archive = self.write_archive()?;

        if self.source_is_temporary {
            if let Some(previous) = self.source.take() {
                if let Err(e) = fs::remove_file(&previous) {
                    warn!("Failed to remove superseded archive {:?}: {}", previous, e);
                }
            }
        }
        self.source = Some(archive.clone());
        self.source_is_temporary = true;

        if let Some(staging) = self.staging.take() {
            let staging_path = staging.path().to_path_buf();
            if let Err(e) = staging.close() {
                warn!("Failed to remove staging tree {:?}: {}", staging_path, e);
            }
        }

        info!("Closed bundle to {:?}", archive);
        Ok(archive)
    }

    /// Close the bundle and move the archive to `destination`
    ///
    /// Fails with [`BundleError::DestinationExists`] before anything is
    /// written when `destination` exists and `overwrite` is false.
    pub fn close_and_save<P: AsRef<Path>>(&mut self, destination: P, overwrite: bool) -> Result<()> {
        let destination = destination.as_ref();
        self.ensure_open()?;

        if destination.is_dir() {
            return Err(BundleError::DestinationIsDirectory(
                destination.display().to_string(),
            ));
        }
        if destination.exists() && !overwrite {
            return Err(BundleError::DestinationExists(
                destination.display().to_string(),
            ));
        }

        let archive = self.close()?;
        relocate(&archive, destination)?;
        self.source = Some(destination.to_path_buf());
        self.source_is_temporary = false;

        info!("Saved bundle to {:?}", destination);
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.staging.is_some() {
            Ok(())
        } else {
            Err(BundleError::AlreadyClosed)
        }
    }

    fn open_tree(&self) -> Result<&DirTree> {
        self.ensure_open()?;
        Ok(&self.tree)
    }

    fn open_tree_mut(&mut self, path: &BundlePath) -> Result<&mut DirTree> {
        self.ensure_open()?;
        if *path == mimetype_path() {
            return Err(BundleError::ReservedPath(path.to_string()));
        }
        Ok(&mut self.tree)
    }

    /// Write the live tree to a new temporary archive
    fn write_archive(&self) -> Result<PathBuf> {
        let temp = tempfile::Builder::new()
            .prefix("databundle-")
            .suffix(".zip")
            .tempfile_in(self.config.temp_dir())?;
        let (file, path) = temp.keep().map_err(|e| BundleError::Io(e.error))?;

        match self.write_entries(file) {
            Ok(()) => {
                debug!("Wrote archive {:?}", path);
                Ok(path)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&path) {
                    warn!("Failed to remove partial archive {:?}: {}", path, cleanup);
                }
                Err(e)
            }
        }
    }

    fn write_entries(&self, file: File) -> Result<()> {
        let mut zip = ZipWriter::new(file);

        let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file(MIMETYPE_ENTRY.to_string(), stored)?;
        zip.write_all(self.config.media_type.as_bytes())?;

        self.write_dir(&mut zip, &BundlePath::root())?;
        zip.finish()?;
        Ok(())
    }

    fn write_dir(&self, zip: &mut ZipWriter<File>, dir: &BundlePath) -> Result<()> {
        for name in self.tree.list(dir)? {
            let path = dir.child_unchecked(&name);
            if path == mimetype_path() {
                continue;
            }
            let meta = match self.tree.metadata(&path)? {
                Some(meta) => meta,
                None => continue,
            };
            let options = self.entry_options(&meta);
            match meta.kind {
                EntryKind::Directory => {
                    zip.add_directory(format!("{}/", path.as_str()), options)?;
                    self.write_dir(zip, &path)?;
                }
                EntryKind::File => {
                    zip.start_file(path.as_str().to_string(), options)?;
                    let mut source = File::open(self.tree.host_path(&path))?;
                    std::io::copy(&mut source, zip)?;
                }
            }
        }
        Ok(())
    }

    fn entry_options(&self, meta: &EntryMetadata) -> SimpleFileOptions {
        let mut options = SimpleFileOptions::default()
            .compression_method(self.config.compression.method())
            .large_file(meta.size >= u32::MAX as u64);
        if let Some(time) = meta.modified.and_then(to_zip_time) {
            options = options.last_modified_time(time);
        }
        options
    }
}

impl VirtualTree for Bundle {
    fn metadata(&self, path: &BundlePath) -> Result<Option<EntryMetadata>> {
        self.open_tree()?.metadata(path)
    }

    fn list(&self, dir: &BundlePath) -> Result<Vec<String>> {
        self.open_tree()?.list(dir)
    }

    fn read(&self, path: &BundlePath) -> Result<Vec<u8>> {
        self.open_tree()?.read(path)
    }

    fn write(&mut self, path: &BundlePath, data: &[u8]) -> Result<()> {
        self.open_tree_mut(path)?.write(path, data)
    }

    fn create_dir(&mut self, path: &BundlePath) -> Result<()> {
        self.open_tree_mut(path)?.create_dir(path)
    }

    fn remove(&mut self, path: &BundlePath) -> Result<()> {
        self.open_tree_mut(path)?.remove(path)
    }

    fn rename(&mut self, from: &BundlePath, to: &BundlePath) -> Result<()> {
        self.open_tree_mut(from)?;
        self.open_tree_mut(to)?.rename(from, to)
    }

    fn set_modified(&mut self, path: &BundlePath, time: DateTime<Utc>) -> Result<()> {
        self.open_tree_mut(path)?.set_modified(path, time)
    }

    fn root_uri(&self) -> Result<Url> {
        self.ensure_open()?;
        Ok(Url::parse(&format!("app://{}/", self.root_id))?)
    }
}

impl Drop for Bundle {
    fn drop(&mut self) {
        // An unclosed bundle never handed its temporary archive to anyone
        if self.staging.is_some() && self.source_is_temporary {
            if let Some(source) = &self.source {
                if let Err(e) = fs::remove_file(source) {
                    debug!("Failed to remove temporary archive {:?}: {}", source, e);
                }
            }
        }
    }
}

fn mimetype_path() -> BundlePath {
    BundlePath::root().child_unchecked(MIMETYPE_ENTRY)
}

/// Unpack every entry of `archive` into `tree`
///
/// Entries whose names would escape the root are skipped.
fn extract_archive(archive: &Path, tree: &mut DirTree) -> Result<()> {
    let mut zip = ZipArchive::new(BufReader::new(File::open(archive)?))?;
    let mut dir_times = Vec::new();

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let path = match entry.enclosed_name().and_then(|name| to_bundle_path(&name)) {
            Some(path) => path,
            None => {
                warn!("Skipping unsafe archive entry {:?}", entry.name());
                continue;
            }
        };
        if path.is_root() {
            continue;
        }
        let modified = entry.last_modified().and_then(from_zip_time);

        if entry.is_dir() {
            tree.create_dir(&path)?;
            dir_times.push((path, modified));
        } else {
            let mut data = Vec::with_capacity(entry.size().min(MAX_PREALLOCATION) as usize);
            entry.read_to_end(&mut data)?;
            tree.write(&path, &data)?;
            if let Some(time) = modified {
                tree.set_modified(&path, time)?;
            }
        }
    }

    // Directory times last: writing children touches them
    for (path, modified) in dir_times.into_iter().rev() {
        if let Some(time) = modified {
            tree.set_modified(&path, time)?;
        }
    }
    debug!("Extracted {:?}", archive);
    Ok(())
}

fn to_bundle_path(name: &Path) -> Option<BundlePath> {
    let mut path = BundlePath::root();
    for component in name.components() {
        match component {
            Component::Normal(segment) => path = path.child(segment.to_str()?).ok()?,
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(path)
}

/// Move `archive` to `destination`, copying when a rename is not possible
fn relocate(archive: &Path, destination: &Path) -> Result<()> {
    if fs::rename(archive, destination).is_ok() {
        return Ok(());
    }
    fs::copy(archive, destination)?;
    if let Err(e) = fs::remove_file(archive) {
        warn!("Failed to remove relocated archive {:?}: {}", archive, e);
    }
    Ok(())
}

fn to_zip_time(time: DateTime<Utc>) -> Option<zip::DateTime> {
    zip::DateTime::from_date_and_time(
        u16::try_from(time.year()).ok()?,
        time.month() as u8,
        time.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
    )
    .ok()
}

fn from_zip_time(time: zip::DateTime) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(
        time.year() as i32,
        time.month() as u32,
        time.day() as u32,
        time.hour() as u32,
        time.minute() as u32,
        time.second() as u32,
    )
    .single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sniff::sniff_file;

    const MEDIATYPE: &str = "application/vnd.wf4ever.robundle+zip";

    fn p(s: &str) -> BundlePath {
        BundlePath::new(s).unwrap()
    }

    #[test]
    fn test_create_writes_temporary_source() {
        let bundle = Bundle::create().unwrap();
        let source = bundle.source().unwrap().to_path_buf();

        assert!(source.exists());
        assert!(bundle.is_open());
        assert!(bundle.is_dir(&BundlePath::root()).unwrap());
        assert_eq!(bundle.list(&BundlePath::root()).unwrap(), vec!["mimetype"]);

        drop(bundle);
        assert!(!source.exists());
    }

    #[test]
    fn test_close_writes_signature() {
        let mut bundle = Bundle::create().unwrap();
        let first = bundle.source().unwrap().to_path_buf();
        let zip = bundle.close().unwrap();

        assert_eq!(bundle.source(), Some(zip.as_path()));
        assert!(!first.exists(), "superseded temporary archive is removed");

        // "mimetype" + media type + next local header, from offset 30
        let bytes = fs::read(&zip).unwrap();
        let expected = format!("mimetype{}PK", MEDIATYPE);
        assert_eq!(&bytes[30..30 + expected.len()], expected.as_bytes());
        assert_eq!(
            sniff_file(&zip).unwrap(),
            Sniffed::MediaType(MEDIATYPE.to_string())
        );
        fs::remove_file(zip).ok();
    }

    #[test]
    fn test_close_twice_fails() {
        let mut bundle = Bundle::create().unwrap();
        let zip = bundle.close().unwrap();

        assert!(!bundle.is_open());
        assert!(matches!(bundle.close(), Err(BundleError::AlreadyClosed)));
        assert!(matches!(
            bundle.list(&BundlePath::root()),
            Err(BundleError::AlreadyClosed)
        ));
        assert!(zip.exists(), "closed archive belongs to the caller");
        fs::remove_file(zip).ok();
    }

    #[test]
    fn test_mimetype_entry_is_reserved() {
        let mut bundle = Bundle::create().unwrap();
        let result = bundle.write(&p("mimetype"), b"text/plain");
        assert!(matches!(result, Err(BundleError::ReservedPath(_))));
        assert!(matches!(
            bundle.remove(&p("mimetype")),
            Err(BundleError::ReservedPath(_))
        ));
        // only the root-level entry is reserved
        bundle.write(&p("inputs/mimetype"), b"fine").unwrap();
    }

    #[test]
    fn test_round_trip_preserves_tree() {
        let mut bundle = Bundle::create().unwrap();
        bundle.write(&p("inputs/in1"), b"Hello").unwrap();
        bundle.create_dir(&p("outputs/empty")).unwrap();
        let zip = bundle.close().unwrap();

        let reopened = Bundle::open(&zip).unwrap();
        assert_eq!(reopened.read(&p("inputs/in1")).unwrap(), b"Hello");
        assert!(reopened.is_dir(&p("outputs/empty")).unwrap());
        assert_eq!(reopened.source(), Some(zip.as_path()));
        drop(reopened);
        assert!(zip.exists(), "opened archives are never deleted");
        fs::remove_file(zip).ok();
    }

    #[test]
    fn test_modification_times_survive_round_trip() {
        let mut bundle = Bundle::create().unwrap();
        let time = Utc.with_ymd_and_hms(2015, 6, 1, 8, 30, 10).unwrap();
        bundle.write(&p("data.txt"), b"x").unwrap();
        bundle.set_modified(&p("data.txt"), time).unwrap();
        let zip = bundle.close().unwrap();

        let reopened = Bundle::open(&zip).unwrap();
        let modified = reopened.metadata(&p("data.txt")).unwrap().unwrap().modified;
        assert_eq!(modified, Some(time));
        fs::remove_file(zip).ok();
    }

    #[test]
    fn test_root_uri() {
        let bundle = Bundle::create().unwrap();
        let uri = bundle.root_uri().unwrap();
        assert_eq!(uri.scheme(), "app");
        assert_eq!(uri.path(), "/");
    }

    #[test]
    fn test_zip_time_conversion() {
        let time = Utc.with_ymd_and_hms(2020, 2, 29, 23, 59, 58).unwrap();
        let zip_time = to_zip_time(time).unwrap();
        assert_eq!(from_zip_time(zip_time), Some(time));
        // before the DOS epoch
        assert!(to_zip_time(Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap()).is_none());
    }
}
