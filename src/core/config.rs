//! Bundle configuration
//!
//! Settings can be built in code or loaded from TOML:
//!
//! ```toml
//! media_type = "application/vnd.wf4ever.robundle+zip"
//! temp_dir = "/var/tmp/bundles"
//! compression = "deflated"
//! write_manifest = true
//! ```

use crate::error::Result;
use crate::validation::validate_media_type;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Media type of research object bundles
pub const ROBUNDLE_MEDIA_TYPE: &str = "application/vnd.wf4ever.robundle+zip";

/// Compression applied to ordinary entries when an archive is written
///
/// The `mimetype` entry is always stored uncompressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundleConfig {
    /// Media type written to (and expected in) the `mimetype` entry
    pub media_type: String,

    /// Where staging trees and temporary archives go (system temp dir if unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,

    pub compression: Compression,

    /// Sync the manifest and write `.ro/manifest.json` on close
    pub write_manifest: bool,
}

impl Default for BundleConfig {
    fn default() -> Self {
        BundleConfig {
            media_type: ROBUNDLE_MEDIA_TYPE.to_string(),
            temp_dir: None,
            compression: Compression::default(),
            write_manifest: true,
        }
    }
}

impl BundleConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: BundleConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        validate_media_type(&self.media_type)
    }

    /// Directory for temporary files
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
