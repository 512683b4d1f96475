//! Media type detection from the archive prefix
//!
//! A bundle stores its media type as the content of a first archive entry
//! named `mimetype`, so the type is readable from the first few hundred bytes
//! of the file:
//!
//! ```text
//! offset  0  50 4B 03 04            local file header signature
//! offset  8  compression method     (0 = stored, 8 = deflated)
//! offset 14  CRC-32 of the content
//! offset 18  compressed size
//! offset 26  file name length        (8)
//! offset 28  extra field length
//! offset 30  "mimetype"
//! offset 38+ media type bytes        (after any extra field, maybe deflated)
//! ```
//!
//! Detection never opens the archive's central directory.

use crate::error::Result;
use flate2::read::DeflateDecoder;
use std::borrow::Cow;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Bytes read from the start of a candidate file
pub const SNIFF_WINDOW: usize = 256;

/// Shortest prefix that can carry the `mimetype` file name
pub const MIN_SNIFF_LENGTH: usize = 38;

/// Media type reported for a ZIP without a leading `mimetype` entry
pub const APPLICATION_ZIP: &str = "application/zip";

pub const ZIP_LOCAL_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

pub const MIMETYPE_ENTRY: &str = "mimetype";

const LOCAL_HEADER_LENGTH: usize = 30;
const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;

/// Outcome of media type detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sniffed {
    /// A ZIP whose first entry declares this media type
    MediaType(String),
    /// A ZIP without a usable `mimetype` first entry
    GenericArchive,
    /// Not a ZIP, too short, or the leading entry is corrupt
    Unrecognized,
}

impl Sniffed {
    /// Media type string: the declared type, `application/zip`, or `None`
    pub fn media_type(&self) -> Option<&str> {
        match self {
            Sniffed::MediaType(media_type) => Some(media_type),
            Sniffed::GenericArchive => Some(APPLICATION_ZIP),
            Sniffed::Unrecognized => None,
        }
    }

    pub fn is_archive(&self) -> bool {
        !matches!(self, Sniffed::Unrecognized)
    }
}

/// Detect the media type of a file from its first [`SNIFF_WINDOW`] bytes
pub fn sniff_file<P: AsRef<Path>>(path: P) -> Result<Sniffed> {
    let path = path.as_ref();
    let mut buf = Vec::with_capacity(SNIFF_WINDOW);
    File::open(path)?
        .take(SNIFF_WINDOW as u64)
        .read_to_end(&mut buf)?;

    let sniffed = sniff_bytes(&buf);
    debug!("Sniffed {:?} as {:?}", path, sniffed);
    Ok(sniffed)
}

/// Detect the media type from an in-memory prefix
///
/// # Examples
///
/// ```
/// use databundle::sniff::{sniff_bytes, Sniffed};
///
/// assert_eq!(sniff_bytes(b"not an archive"), Sniffed::Unrecognized);
/// ```
pub fn sniff_bytes(prefix: &[u8]) -> Sniffed {
    let prefix = &prefix[..prefix.len().min(SNIFF_WINDOW)];
    if prefix.len() < MIN_SNIFF_LENGTH {
        return Sniffed::Unrecognized;
    }
    if prefix[..4] != ZIP_LOCAL_HEADER_SIGNATURE {
        return Sniffed::Unrecognized;
    }
    if &prefix[LOCAL_HEADER_LENGTH..MIN_SNIFF_LENGTH] != MIMETYPE_ENTRY.as_bytes() {
        return Sniffed::GenericArchive;
    }

    let flags = le_u16(prefix, 6);
    let method = le_u16(prefix, 8);
    let crc = le_u32(prefix, 14);
    let compressed_size = le_u32(prefix, 18) as usize;
    let name_length = le_u16(prefix, 26) as usize;
    let extra_length = le_u16(prefix, 28) as usize;

    // "mimetype.txt" and friends share the prefix but are other entries
    if name_length != MIMETYPE_ENTRY.len() {
        return Sniffed::GenericArchive;
    }
    if method != METHOD_STORED && method != METHOD_DEFLATED {
        return Sniffed::GenericArchive;
    }

    let start = LOCAL_HEADER_LENGTH + name_length + extra_length;
    if start > prefix.len() {
        return Sniffed::Unrecognized;
    }
    let available = &prefix[start..];

    let content: Cow<'_, [u8]> = if method == METHOD_DEFLATED {
        if flags & FLAG_DATA_DESCRIPTOR != 0 && compressed_size == 0 {
            // The deflate stream ends itself; no CRC is known up front
            match inflate(available) {
                Some(content) => Cow::Owned(content),
                None => return Sniffed::Unrecognized,
            }
        } else if compressed_size <= available.len() {
            match inflate(&available[..compressed_size]) {
                Some(content) if crc32fast::hash(&content) == crc => Cow::Owned(content),
                _ => return Sniffed::Unrecognized,
            }
        } else {
            return Sniffed::Unrecognized;
        }
    } else if flags & FLAG_DATA_DESCRIPTOR != 0 && compressed_size == 0 {
        // Sizes trail the data; the content ends where the next record starts
        match find_signature(available) {
            Some(end) => Cow::Borrowed(&available[..end]),
            None => Cow::Borrowed(available),
        }
    } else if compressed_size <= available.len() {
        let content = &available[..compressed_size];
        if crc32fast::hash(content) != crc {
            return Sniffed::Unrecognized;
        }
        Cow::Borrowed(content)
    } else {
        Cow::Borrowed(available)
    };

    let media_type: Vec<u8> = content
        .iter()
        .copied()
        .take_while(|b| (0x20..0x7f).contains(b))
        .collect();

    if media_type.is_empty() {
        return Sniffed::GenericArchive;
    }

    match String::from_utf8(media_type) {
        Ok(media_type) => Sniffed::MediaType(media_type),
        Err(_) => Sniffed::Unrecognized,
    }
}

/// Inflate at most one window of media type bytes
fn inflate(compressed: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    DeflateDecoder::new(compressed)
        .take(SNIFF_WINDOW as u64)
        .read_to_end(&mut out)
        .ok()?;
    Some(out)
}

fn le_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn le_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

fn find_signature(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"PK")
}
