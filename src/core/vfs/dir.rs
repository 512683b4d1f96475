//! Directory-backed virtual tree
//!
//! `DirTree` maps bundle paths onto a directory of the host filesystem. It is
//! the live storage of every open bundle (rooted at its staging directory)
//! and also stands for ordinary storage when moving or copying data across
//! the container boundary.

use super::{EntryKind, EntryMetadata, VirtualTree};
use crate::error::{BundleError, Result};
use crate::path::BundlePath;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;
use url::Url;

#[derive(Debug, Clone)]
pub struct DirTree {
    root: PathBuf,
}

impl DirTree {
    /// Use an existing directory as tree root
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(BundleError::NotADirectory(root.display().to_string()));
        }
        Ok(DirTree {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host location of a bundle path
    pub fn host_path(&self, path: &BundlePath) -> PathBuf {
        let mut host = self.root.clone();
        for segment in path.segments() {
            host.push(segment);
        }
        host
    }

    fn host_metadata(host: &Path) -> Result<Option<fs::Metadata>> {
        match fs::metadata(host) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn ensure_parent(&self, path: &BundlePath) -> Result<()> {
        if let Some(parent) = path.parent() {
            let host = self.host_path(&parent);
            match Self::host_metadata(&host)? {
                Some(meta) if meta.is_dir() => {}
                Some(_) => return Err(BundleError::NotADirectory(parent.to_string())),
                None => fs::create_dir_all(&host)?,
            }
        }
        Ok(())
    }
}

impl VirtualTree for DirTree {
    fn metadata(&self, path: &BundlePath) -> Result<Option<EntryMetadata>> {
        let meta = match Self::host_metadata(&self.host_path(path))? {
            Some(meta) => meta,
            None => return Ok(None),
        };
        let kind = if meta.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        Ok(Some(EntryMetadata {
            kind,
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        }))
    }

    fn list(&self, dir: &BundlePath) -> Result<Vec<String>> {
        let host = self.host_path(dir);
        match Self::host_metadata(&host)? {
            Some(meta) if meta.is_dir() => {}
            Some(_) => return Err(BundleError::NotADirectory(dir.to_string())),
            None => return Err(BundleError::NotFound(dir.to_string())),
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&host)? {
            let entry = entry?;
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => warn!("Skipping non UTF-8 entry {:?} in {}", raw, dir),
            }
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, path: &BundlePath) -> Result<Vec<u8>> {
        let host = self.host_path(path);
        match Self::host_metadata(&host)? {
            Some(meta) if meta.is_dir() => Err(BundleError::DestinationIsDirectory(path.to_string())),
            Some(_) => Ok(fs::read(&host)?),
            None => Err(BundleError::NotFound(path.to_string())),
        }
    }

    fn write(&mut self, path: &BundlePath, data: &[u8]) -> Result<()> {
        if path.is_root() {
            return Err(BundleError::DestinationIsDirectory(path.to_string()));
        }
        let host = self.host_path(path);
        if let Some(meta) = Self::host_metadata(&host)? {
            if meta.is_dir() {
                return Err(BundleError::DestinationIsDirectory(path.to_string()));
            }
        }
        self.ensure_parent(path)?;
        fs::write(&host, data)?;
        Ok(())
    }

    fn create_dir(&mut self, path: &BundlePath) -> Result<()> {
        let host = self.host_path(path);
        match Self::host_metadata(&host)? {
            Some(meta) if meta.is_dir() => Ok(()),
            Some(_) => Err(BundleError::DestinationExists(path.to_string())),
            None => {
                self.ensure_parent(path)?;
                fs::create_dir_all(&host)?;
                Ok(())
            }
        }
    }

    fn remove(&mut self, path: &BundlePath) -> Result<()> {
        if path.is_root() {
            return Err(BundleError::invalid_path("/", "cannot remove the tree root"));
        }
        let host = self.host_path(path);
        match Self::host_metadata(&host)? {
            Some(meta) if meta.is_dir() => fs::remove_dir_all(&host)?,
            Some(_) => fs::remove_file(&host)?,
            None => return Err(BundleError::NotFound(path.to_string())),
        }
        Ok(())
    }

    fn rename(&mut self, from: &BundlePath, to: &BundlePath) -> Result<()> {
        let source = self.host_path(from);
        if Self::host_metadata(&source)?.is_none() {
            return Err(BundleError::NotFound(from.to_string()));
        }
        let target = self.host_path(to);
        if let Some(meta) = Self::host_metadata(&target)? {
            if meta.is_dir() {
                return Err(BundleError::DestinationIsDirectory(to.to_string()));
            }
        }
        self.ensure_parent(to)?;
        fs::rename(&source, &target)?;
        Ok(())
    }

    fn set_modified(&mut self, path: &BundlePath, time: DateTime<Utc>) -> Result<()> {
        let host = self.host_path(path);
        let file = match Self::host_metadata(&host)? {
            Some(meta) if meta.is_dir() => fs::File::open(&host)?,
            Some(_) => fs::OpenOptions::new().write(true).open(&host)?,
            None => return Err(BundleError::NotFound(path.to_string())),
        };
        file.set_modified(SystemTime::from(time))?;
        Ok(())
    }

    fn root_uri(&self) -> Result<Url> {
        Url::from_directory_path(&self.root).map_err(|_| {
            BundleError::invalid_path(
                self.root.display().to_string(),
                "tree root cannot be expressed as a file URI",
            )
        })
    }
}
