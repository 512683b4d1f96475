//! # databundle - Portable Data Bundles
//!
//! `databundle` stores the inputs and outputs of a workflow run in a single
//! ZIP archive. Each bundle:
//!
//! - **Identifies itself** through an uncompressed first `mimetype` entry,
//!   readable from the first 256 bytes of the file
//! - **Holds typed ports** under `inputs/` and `outputs/`: values,
//!   references, lists and errors
//! - **Keeps a manifest** of its content at `.ro/manifest.json`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use databundle::{Bundle, Result};
//!
//! # fn main() -> Result<()> {
//! let mut bundle = Bundle::create()?;
//!
//! let mut ports = bundle.ports()?;
//! let inputs = ports.inputs()?;
//! let in1 = ports.get_port(&inputs, "in1")?;
//! ports.set_value(&in1, "Hello")?;
//!
//! // Flatten to disk; the temporary staging tree is removed
//! bundle.close_and_save("run.bundle.zip", false)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```rust,no_run
//! use databundle::{BundleBuilder, Compression, Result};
//!
//! # fn main() -> Result<()> {
//! let bundle = BundleBuilder::new()
//!     .temp_dir("/var/tmp/bundles")
//!     .compression(Compression::Stored)
//!     .without_manifest()
//!     .create()?;
//! # Ok(())
//! # }
//! ```

pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use crate::core::{
    config, container, copy, error, manifest, path, ports, validation, vfs,
};

pub use crate::core::sniff;

pub use crate::core::{
    config::{BundleConfig, Compression, ROBUNDLE_MEDIA_TYPE},
    container::Bundle,
    copy::{copy_recursively, safe_move, safe_move_within, CopyOptions, CopyReport},
    error::{BundleError, Result},
    manifest::{guess_media_type, Manifest, PathMetadata},
    path::BundlePath,
    ports::{ErrorDocument, Namespace, PortKind, PortStore},
    sniff::{sniff_bytes, sniff_file, Sniffed},
    validation::PortName,
    vfs::{DirTree, EntryKind, EntryMetadata, VirtualTree},
};

use std::path::{Path, PathBuf};
use tracing::info;

/// Builder for bundles with a non-default configuration
///
/// # Examples
///
/// ```rust,no_run
/// use databundle::BundleBuilder;
///
/// let bundle = BundleBuilder::new()
///     .media_type("application/vnd.example.run+zip")
///     .create()?;
/// # Ok::<(), databundle::BundleError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct BundleBuilder {
    config: BundleConfig,
}

impl BundleBuilder {
    pub fn new() -> Self {
        BundleBuilder {
            config: BundleConfig::default(),
        }
    }

    /// Start from a loaded configuration
    pub fn from_config(config: BundleConfig) -> Self {
        BundleBuilder { config }
    }

    /// Media type written to, and expected in, the `mimetype` entry
    pub fn media_type<S: Into<String>>(mut self, media_type: S) -> Self {
        self.config.media_type = media_type.into();
        self
    }

    /// Directory for staging trees and temporary archives
    pub fn temp_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.config.compression = compression;
        self
    }

    /// Do not sync or write `.ro/manifest.json` on close
    pub fn without_manifest(mut self) -> Self {
        self.config.write_manifest = false;
        self
    }

    /// Create a new, empty bundle
    pub fn create(self) -> Result<Bundle> {
        info!("Building bundle of type '{}'", self.config.media_type);
        Bundle::create_with(self.config)
    }

    /// Open an existing archive with this configuration
    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<Bundle> {
        Bundle::open_with(path, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_applies_config() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let bundle = BundleBuilder::new()
            .media_type("application/vnd.example.run+zip")
            .temp_dir(temp_dir.path())
            .compression(Compression::Stored)
            .without_manifest()
            .create()
            .unwrap();

        assert_eq!(bundle.media_type(), "application/vnd.example.run+zip");
        assert_eq!(bundle.config().compression, Compression::Stored);
        assert!(!bundle.config().write_manifest);
        assert!(bundle.source().unwrap().starts_with(temp_dir.path()));
    }

    #[test]
    fn test_builder_rejects_bad_media_type() {
        let result = BundleBuilder::new().media_type("not a type").create();
        assert!(matches!(result, Err(BundleError::InvalidMediaType(_))));
    }

    #[test]
    fn test_open_expects_configured_media_type() {
        let mut bundle = Bundle::create().unwrap();
        let zip = bundle.close().unwrap();

        let result = BundleBuilder::new()
            .media_type("application/vnd.example.run+zip")
            .open(&zip);
        assert!(matches!(result, Err(BundleError::UnsupportedFormat { .. })));
        std::fs::remove_file(zip).ok();
    }
}
