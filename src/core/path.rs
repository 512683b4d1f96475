//! Virtual paths inside a bundle
//!
//! A [`BundlePath`] is a normalized, slash-separated location relative to the
//! container root. The root itself is the empty path and displays as `/`.
//! Paths never carry a leading or trailing slash internally; the trailing
//! slash used for directory URIs in the manifest is added by
//! [`BundlePath::to_uri`].

use crate::error::{BundleError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BundlePath(String);

impl BundlePath {
    /// The container root
    pub fn root() -> Self {
        BundlePath(String::new())
    }

    /// Parse and normalize a path
    ///
    /// Leading slashes are ignored, `.` segments are dropped and `..` pops a
    /// segment. Climbing above the root is an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use databundle::BundlePath;
    ///
    /// let path = BundlePath::new("/inputs/./list/../in1").unwrap();
    /// assert_eq!(path.as_str(), "inputs/in1");
    /// assert!(BundlePath::new("../escape").is_err());
    /// ```
    pub fn new(path: &str) -> Result<Self> {
        BundlePath::root().resolve(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Final segment, `None` for the root
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            None
        } else {
            self.0.rsplit('/').next()
        }
    }

    /// Parent path, `None` for the root
    pub fn parent(&self) -> Option<BundlePath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(BundlePath(self.0[..idx].to_string())),
            None => Some(BundlePath::root()),
        }
    }

    /// Append a single segment
    ///
    /// The name must be non-empty and must not contain `/` or be `.`/`..`.
    pub fn child(&self, name: &str) -> Result<BundlePath> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(BundleError::invalid_path(
                name,
                "not a single path segment",
            ));
        }
        Ok(self.child_unchecked(name))
    }

    pub(crate) fn child_unchecked(&self, name: &str) -> BundlePath {
        if self.is_root() {
            BundlePath(name.to_string())
        } else {
            BundlePath(format!("{}/{}", self.0, name))
        }
    }

    /// Resolve a relative (or root-anchored, when it starts with `/`) path
    /// against this directory
    pub fn resolve(&self, relative: &str) -> Result<BundlePath> {
        let mut segments: Vec<&str> = if relative.starts_with('/') {
            Vec::new()
        } else {
            self.segments().collect()
        };

        for segment in relative.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(BundleError::invalid_path(
                            relative,
                            "climbs above the bundle root",
                        ));
                    }
                }
                s => segments.push(s),
            }
        }

        Ok(BundlePath(segments.join("/")))
    }

    /// True when `self` equals `prefix` or lies below it
    pub fn starts_with(&self, prefix: &BundlePath) -> bool {
        if prefix.is_root() {
            return true;
        }
        self.0 == prefix.0
            || (self.0.starts_with(&prefix.0) && self.0.as_bytes().get(prefix.0.len()) == Some(&b'/'))
    }

    /// Express `self` relative to the directory `base`, e.g. `../inputs/in1.err`
    pub fn relative_to(&self, base: &BundlePath) -> String {
        let own: Vec<&str> = self.segments().collect();
        let other: Vec<&str> = base.segments().collect();

        let common = own
            .iter()
            .zip(other.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let mut parts: Vec<&str> = Vec::with_capacity(other.len() - common + own.len() - common);
        parts.extend(std::iter::repeat("..").take(other.len() - common));
        parts.extend(own[common..].iter().copied());

        if parts.is_empty() {
            ".".to_string()
        } else {
            parts.join("/")
        }
    }

    /// Replace the final extension of the file name
    ///
    /// The final extension is the last `.` and the non-dot characters after
    /// it, possibly none; a leading dot (hidden name) never starts an
    /// extension. An empty
    /// `extension` removes the extension and its dot; the new extension is
    /// expected to carry its own leading dot.
    ///
    /// # Examples
    ///
    /// ```
    /// use databundle::BundlePath;
    ///
    /// let txt = BundlePath::new("dir/file.txt").unwrap();
    /// assert_eq!(txt.with_extension("").as_str(), "dir/file");
    /// assert_eq!(txt.with_extension(".").as_str(), "dir/file.");
    ///
    /// let many = txt.with_extension(".test.many.pdf");
    /// assert_eq!(many.with_extension(".txt").as_str(), "dir/file.test.many.txt");
    /// ```
    pub fn with_extension(&self, extension: &str) -> BundlePath {
        let name = match self.file_name() {
            Some(name) => name,
            None => return self.clone(),
        };
        let stem = match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        };
        let renamed = format!("{}{}", stem, extension);
        match self.parent() {
            Some(parent) => parent.child_unchecked(&renamed),
            None => BundlePath(renamed),
        }
    }

    /// Root-relative URI form used as manifest key: `/a/b` or `/a/b/`
    pub fn to_uri(&self, is_dir: bool) -> String {
        if self.is_root() {
            "/".to_string()
        } else if is_dir {
            format!("/{}/", self.0)
        } else {
            format!("/{}", self.0)
        }
    }
}

impl fmt::Display for BundlePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

impl TryFrom<String> for BundlePath {
    type Error = BundleError;

    fn try_from(value: String) -> Result<Self> {
        BundlePath::new(&value)
    }
}

impl From<BundlePath> for String {
    fn from(path: BundlePath) -> String {
        path.to_string()
    }
}

impl std::str::FromStr for BundlePath {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self> {
        BundlePath::new(s)
    }
}
