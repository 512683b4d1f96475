//! `.url` shortcut files
//!
//! References are written in the Internet Shortcut format understood by
//! desktop file managers:
//!
//! ```text
//! [InternetShortcut]
//! URL=http://example.org/test
//!
//! ```
//!
//! Parsing also accepts files written by Windows, which use CRLF line endings
//! and may carry extra sections and keys.

use crate::error::{BundleError, Result};
use crate::path::BundlePath;
use url::Url;

pub(crate) const REFERENCE_SUFFIX: &str = ".url";

const SECTION: &str = "[InternetShortcut]";

pub(crate) fn render(uri: &Url) -> String {
    format!("{}\nURL={}\n\n", SECTION, uri.as_str())
}

/// Extract the `URL=` entry of the shortcut section
///
/// A relative URL is an archive-native reference and resolves against
/// `base`, the root URI of the tree holding the file.
pub(crate) fn parse(text: &str, base: &Url, path: &BundlePath) -> Result<Url> {
    let text = text.trim_start_matches('\u{feff}');
    let mut in_section = false;

    for line in text.lines() {
        let line = line.trim();
        if line.starts_with('[') && line.ends_with(']') {
            in_section = line.eq_ignore_ascii_case(SECTION);
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim().eq_ignore_ascii_case("URL") {
                return base
                    .join(value.trim())
                    .map_err(|e| BundleError::MalformedReference {
                        path: path.to_string(),
                        reason: e.to_string(),
                    });
            }
        }
    }

    Err(BundleError::MalformedReference {
        path: path.to_string(),
        reason: format!("no URL entry in {} section", SECTION),
    })
}
