//! Virtual tree abstraction
//!
//! Every storage backend the bundle engine touches (the live tree of an open
//! bundle, or an ordinary directory on disk) is reached through
//! [`VirtualTree`]. Port, manifest, move and copy logic is written once
//! against this trait and never against a concrete backend.

mod dir;


pub use dir::DirTree;

use crate::error::{BundleError, Result};
use crate::path::BundlePath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Type of an entry in a virtual tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
}

/// Metadata about a file or directory in a virtual tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    pub kind: EntryKind,

    /// Size in bytes (0 for directories)
    pub size: u64,

    /// Last modification time, when the backend records one
    pub modified: Option<DateTime<Utc>>,
}

impl EntryMetadata {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Tree of files and directories addressed by [`BundlePath`]
///
/// Implementations must create missing parent directories on `write` and
/// `rename`, and must refuse to replace a directory with a file.
pub trait VirtualTree {
    /// Metadata for `path`, `None` when nothing exists there
    fn metadata(&self, path: &BundlePath) -> Result<Option<EntryMetadata>>;

    /// Names of the immediate children of `dir`, sorted
    fn list(&self, dir: &BundlePath) -> Result<Vec<String>>;

    /// Read the full contents of a file
    fn read(&self, path: &BundlePath) -> Result<Vec<u8>>;

    /// Create or truncate a file with `data`
    fn write(&mut self, path: &BundlePath, data: &[u8]) -> Result<()>;

    /// Create a directory and any missing parents
    fn create_dir(&mut self, path: &BundlePath) -> Result<()>;

    /// Delete a file, or a directory with everything below it
    fn remove(&mut self, path: &BundlePath) -> Result<()>;

    /// Move an entry within this tree, replacing an existing file at `to`
    fn rename(&mut self, from: &BundlePath, to: &BundlePath) -> Result<()>;

    /// Set the modification time of an entry
    fn set_modified(&mut self, path: &BundlePath, time: DateTime<Utc>) -> Result<()>;

    /// Absolute URI of the tree root, used to resolve relative references
    fn root_uri(&self) -> Result<Url>;

    fn kind(&self, path: &BundlePath) -> Result<Option<EntryKind>> {
        Ok(self.metadata(path)?.map(|m| m.kind))
    }

    fn exists(&self, path: &BundlePath) -> Result<bool> {
        Ok(self.metadata(path)?.is_some())
    }

    fn is_dir(&self, path: &BundlePath) -> Result<bool> {
        Ok(self.kind(path)? == Some(EntryKind::Directory))
    }

    fn is_file(&self, path: &BundlePath) -> Result<bool> {
        Ok(self.kind(path)? == Some(EntryKind::File))
    }

    /// Read a file as UTF-8 text
    fn read_to_string(&self, path: &BundlePath) -> Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| {
            BundleError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{} is not valid UTF-8: {}", path, e),
            ))
        })
    }

    /// Delete `path` if anything exists there; returns whether it did
    fn remove_if_exists(&mut self, path: &BundlePath) -> Result<bool> {
        if self.exists(path)? {
            self.remove(path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
