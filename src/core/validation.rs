//! Validation for port names and media types
//!
//! Port names become single path segments under `inputs/` or `outputs/`, and
//! the bundle media type is written verbatim as the first archive entry, so
//! both are checked before anything touches the tree.

use crate::error::{BundleError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// A validated port name
///
/// # Rules
/// - Non-empty, at most 255 bytes (one path segment)
/// - No `/`, `\` or control characters
/// - Not `.` or `..`
/// - Must not end with a reserved slot suffix (`.url`, `.err`)
///
/// # Examples
///
/// ```
/// use databundle::PortName;
///
/// assert!(PortName::new("in1").is_ok());
/// assert!(PortName::new("a/b").is_err());
/// assert!(PortName::new("in1.url").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortName(String);

impl PortName {
    const MAX_LENGTH: usize = 255;

    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(PortName(name))
    }

    fn validate(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(BundleError::InvalidPortName(
                "port name cannot be empty".to_string(),
            ));
        }

        if name.len() > Self::MAX_LENGTH {
            return Err(BundleError::InvalidPortName(format!(
                "port name too long (max {} bytes)",
                Self::MAX_LENGTH
            )));
        }

        if name == "." || name == ".." {
            return Err(BundleError::InvalidPortName(format!(
                "'{}' is not a valid port name",
                name
            )));
        }

        if name.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
            return Err(BundleError::InvalidPortName(format!(
                "port name '{}' contains a path separator or control character",
                name.escape_debug()
            )));
        }

        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".url") || lower.ends_with(".err") {
            return Err(BundleError::InvalidPortName(format!(
                "port name '{}' ends with a reserved slot suffix",
                name
            )));
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for PortName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PortName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// RFC 6838 `type/subtype`, optionally followed by parameters
const MEDIA_TYPE_PATTERN: &str =
    r"^[A-Za-z0-9][A-Za-z0-9!#$&^_.+-]{0,126}/[A-Za-z0-9][A-Za-z0-9!#$&^_.+-]{0,126}(\s*;.*)?$";

/// Longest media type the sniffer can recover from a 256 byte prefix read
pub const MAX_MEDIA_TYPE_LENGTH: usize = 256;

fn media_type_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MEDIA_TYPE_PATTERN).expect("media type pattern is valid"))
}

/// Validate a bundle media type
///
/// The value must be printable ASCII (it is stored as the raw content of the
/// `mimetype` entry) and fit the sniffer's prefix window.
pub fn validate_media_type(media_type: &str) -> Result<()> {
    if media_type.is_empty() || media_type.len() > MAX_MEDIA_TYPE_LENGTH {
        return Err(BundleError::InvalidMediaType(format!(
            "'{}' must be 1-{} bytes",
            media_type, MAX_MEDIA_TYPE_LENGTH
        )));
    }

    if !media_type.bytes().all(|b| (0x20..0x7f).contains(&b)) {
        return Err(BundleError::InvalidMediaType(format!(
            "'{}' must be printable ASCII",
            media_type.escape_debug()
        )));
    }

    if !media_type_regex().is_match(media_type) {
        return Err(BundleError::InvalidMediaType(format!(
            "'{}' is not of the form type/subtype",
            media_type
        )));
    }

    Ok(())
}
