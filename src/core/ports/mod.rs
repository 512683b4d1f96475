//! Typed ports over `inputs/` and `outputs/`
//!
//! A port is a named slot inside a namespace folder (or a list). What a port
//! holds is never stored anywhere; [`PortStore::port_kind`] works it out from
//! the tree on every call:
//!
//! | Tree contents at `inputs/in1`    | Kind                   |
//! |----------------------------------|------------------------|
//! | directory `in1/`                 | [`PortKind::List`]     |
//! | file `in1`                       | [`PortKind::Value`]    |
//! | file `in1.err`                   | [`PortKind::Error`]    |
//! | file `in1.url`                   | [`PortKind::Reference`]|
//! | nothing                          | [`PortKind::Missing`]  |
//!
//! Every setter clears the other kinds first, so at most one is present.
//! List items are ports named by their index (`0`, `1`, ...); children whose
//! names do not start with digits are kept but ignored by list operations.

mod error_doc;
mod reference;


pub use error_doc::ErrorDocument;

use crate::copy;
use crate::error::{BundleError, Result};
use crate::path::BundlePath;
use crate::validation::PortName;
use crate::vfs::{EntryKind, VirtualTree};
use error_doc::ERROR_SUFFIX;
use reference::REFERENCE_SUFFIX;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

/// Top-level port folders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Inputs,
    Outputs,
}

impl Namespace {
    pub fn dir_name(self) -> &'static str {
        match self {
            Namespace::Inputs => "inputs",
            Namespace::Outputs => "outputs",
        }
    }

    pub fn path(self) -> BundlePath {
        BundlePath::root().child_unchecked(self.dir_name())
    }
}

/// What a port currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    Missing,
    Value,
    Reference,
    List,
    Error,
}

/// Longest list [`PortStore::get_list`] will lay out densely
pub const MAX_LIST_LEN: u64 = 1 << 20;

fn list_index_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)").expect("list index pattern is valid"))
}

/// Index encoded in a list child name: `5`, `5.txt` and `5.url` are all 5
fn list_index(name: &str) -> Option<u64> {
    list_index_regex()
        .captures(name)
        .and_then(|caps| caps[1].parse().ok())
}

/// Typed slot operations against any [`VirtualTree`]
///
/// # Examples
///
/// ```rust,no_run
/// use databundle::Bundle;
///
/// let mut bundle = Bundle::create()?;
/// let mut ports = bundle.ports()?;
///
/// let inputs = ports.inputs()?;
/// let in1 = ports.get_port(&inputs, "in1")?;
/// ports.set_value(&in1, "Hello")?;
/// assert_eq!(ports.get_string_value(&in1)?.as_deref(), Some("Hello"));
/// # Ok::<(), databundle::BundleError>(())
/// ```
pub struct PortStore<'a, T: VirtualTree + ?Sized> {
    tree: &'a mut T,
}

impl<'a, T: VirtualTree + ?Sized> PortStore<'a, T> {
    pub fn new(tree: &'a mut T) -> Self {
        PortStore { tree }
    }

    /// The `inputs/` folder, created on demand
    pub fn inputs(&mut self) -> Result<BundlePath> {
        self.namespace(Namespace::Inputs)
    }

    /// The `outputs/` folder, created on demand
    pub fn outputs(&mut self) -> Result<BundlePath> {
        self.namespace(Namespace::Outputs)
    }

    pub fn namespace(&mut self, namespace: Namespace) -> Result<BundlePath> {
        let path = namespace.path();
        self.tree.create_dir(&path)?;
        Ok(path)
    }

    pub fn has_inputs(&self) -> Result<bool> {
        self.tree.is_dir(&Namespace::Inputs.path())
    }

    pub fn has_outputs(&self) -> Result<bool> {
        self.tree.is_dir(&Namespace::Outputs.path())
    }

    /// Path of port `name` inside `dir`; nothing is created
    pub fn get_port(&self, dir: &BundlePath, name: &str) -> Result<BundlePath> {
        let name = PortName::new(name)?;
        Ok(dir.child_unchecked(name.as_str()))
    }

    /// Every port present in `dir`, by name
    ///
    /// `.url` and `.err` files are reported under the port name they belong
    /// to; hidden entries are skipped.
    pub fn ports(&self, dir: &BundlePath) -> Result<BTreeMap<String, BundlePath>> {
        let mut ports = BTreeMap::new();
        for name in self.tree.list(dir)? {
            if name.starts_with('.') {
                continue;
            }
            let port_name = strip_slot_suffix(&name).to_string();
            let path = dir.child_unchecked(&port_name);
            ports.entry(port_name).or_insert(path);
        }
        Ok(ports)
    }

    pub fn port_kind(&self, port: &BundlePath) -> Result<PortKind> {
        match self.tree.kind(port)? {
            Some(EntryKind::Directory) => return Ok(PortKind::List),
            Some(EntryKind::File) => return Ok(PortKind::Value),
            None => {}
        }
        if self.tree.is_file(&slot_sibling(port, ERROR_SUFFIX)?)? {
            Ok(PortKind::Error)
        } else if self.tree.is_file(&slot_sibling(port, REFERENCE_SUFFIX)?)? {
            Ok(PortKind::Reference)
        } else {
            Ok(PortKind::Missing)
        }
    }

    pub fn is_value(&self, port: &BundlePath) -> Result<bool> {
        Ok(self.port_kind(port)? == PortKind::Value)
    }

    pub fn is_reference(&self, port: &BundlePath) -> Result<bool> {
        Ok(self.port_kind(port)? == PortKind::Reference)
    }

    pub fn is_list(&self, port: &BundlePath) -> Result<bool> {
        Ok(self.port_kind(port)? == PortKind::List)
    }

    pub fn is_error(&self, port: &BundlePath) -> Result<bool> {
        Ok(self.port_kind(port)? == PortKind::Error)
    }

    pub fn is_missing(&self, port: &BundlePath) -> Result<bool> {
        Ok(self.port_kind(port)? == PortKind::Missing)
    }

    /// Remove whatever the port holds; returns the kind that was removed
    pub fn clear_port(&mut self, port: &BundlePath) -> Result<PortKind> {
        let kind = self.port_kind(port)?;
        self.clear_except(port, PortKind::Missing)?;
        Ok(kind)
    }

    fn clear_except(&mut self, port: &BundlePath, keep: PortKind) -> Result<()> {
        let error = slot_sibling(port, ERROR_SUFFIX)?;
        let reference = slot_sibling(port, REFERENCE_SUFFIX)?;

        if keep != PortKind::Error {
            self.tree.remove_if_exists(&error)?;
        }
        if keep != PortKind::Reference {
            self.tree.remove_if_exists(&reference)?;
        }
        match self.tree.kind(port)? {
            Some(EntryKind::Directory) if keep != PortKind::List => self.tree.remove(port)?,
            Some(EntryKind::File) if keep != PortKind::Value => self.tree.remove(port)?,
            _ => {}
        }
        Ok(())
    }

    /// Store `text` as the port's value
    pub fn set_value(&mut self, port: &BundlePath, text: &str) -> Result<()> {
        self.clear_except(port, PortKind::Value)?;
        self.tree.write(port, text.as_bytes())?;
        debug!("Set value of {} ({} bytes)", port, text.len());
        Ok(())
    }

    /// The port's value, `None` when the port is missing
    pub fn get_string_value(&self, port: &BundlePath) -> Result<Option<String>> {
        match self.port_kind(port)? {
            PortKind::Missing => Ok(None),
            PortKind::Value => Ok(Some(self.tree.read_to_string(port)?)),
            _ => Err(BundleError::NotAValue(port.to_string())),
        }
    }

    /// Point the port at `uri`; returns the `.url` file written
    pub fn set_reference(&mut self, port: &BundlePath, uri: &Url) -> Result<BundlePath> {
        self.clear_except(port, PortKind::Reference)?;
        let path = slot_sibling(port, REFERENCE_SUFFIX)?;
        self.tree.write(&path, reference::render(uri).as_bytes())?;
        debug!("Set reference of {} to {}", port, uri);
        Ok(path)
    }

    /// The port's reference, `None` when the port is missing
    ///
    /// Relative `URL=` entries resolve against the tree's root URI.
    pub fn get_reference(&self, port: &BundlePath) -> Result<Option<Url>> {
        match self.port_kind(port)? {
            PortKind::Missing => Ok(None),
            PortKind::Reference => {
                let path = slot_sibling(port, REFERENCE_SUFFIX)?;
                let bytes = self.tree.read(&path)?;
                let text = String::from_utf8_lossy(&bytes);
                let base = self.tree.root_uri()?;
                reference::parse(&text, &base, &path).map(Some)
            }
            _ => Err(BundleError::NotAReference(port.to_string())),
        }
    }

    /// Make the port an empty list
    ///
    /// An existing list is kept as it is.
    pub fn create_list(&mut self, port: &BundlePath) -> Result<()> {
        if self.tree.is_file(port)? {
            return Err(BundleError::DestinationExists(port.to_string()));
        }
        self.clear_except(port, PortKind::List)?;
        self.tree.create_dir(port)
    }

    /// Path for the next list item, one past the highest index present
    ///
    /// Freed indices are not reused. The item is not created. Fails with
    /// [`BundleError::InvalidArgument`] once `u64::MAX` is taken.
    pub fn new_list_item(&self, list: &BundlePath) -> Result<BundlePath> {
        self.require_list(list)?;
        let next = match self
            .tree
            .list(list)?
            .iter()
            .filter_map(|name| list_index(name))
            .max()
        {
            Some(max) => max.checked_add(1).ok_or_else(|| {
                BundleError::InvalidArgument(format!("list {} has no index after {}", list, max))
            })?,
            None => 0,
        };
        Ok(list.child_unchecked(&next.to_string()))
    }

    /// Path of item `index` in `list`, whether or not it exists
    pub fn get_list_item(&self, list: &BundlePath, index: u64) -> BundlePath {
        list.child_unchecked(&index.to_string())
    }

    /// Items `0..=max` of the list, `None` for absent indices
    ///
    /// Returns `None` when the port is missing. A list whose highest index
    /// is [`MAX_LIST_LEN`] or more fails with [`BundleError::InvalidArgument`].
    pub fn get_list(&self, list: &BundlePath) -> Result<Option<Vec<Option<BundlePath>>>> {
        match self.port_kind(list)? {
            PortKind::Missing => return Ok(None),
            PortKind::List => {}
            _ => return Err(BundleError::NotAList(list.to_string())),
        }

        let mut items: BTreeMap<u64, BundlePath> = BTreeMap::new();
        for name in self.tree.list(list)? {
            if let Some(index) = list_index(&name) {
                let port = list.child_unchecked(strip_slot_suffix(&name));
                items.entry(index).or_insert(port);
            }
        }

        let len = match items.keys().next_back() {
            Some(&max) if max < MAX_LIST_LEN => (max + 1) as usize,
            Some(&max) => {
                return Err(BundleError::InvalidArgument(format!(
                    "list {} index {} too large",
                    list, max
                )))
            }
            None => 0,
        };
        let mut result = vec![None; len];
        for (index, port) in items {
            result[index as usize] = Some(port);
        }
        Ok(Some(result))
    }

    /// Record an error on the port; returns the `.err` file written
    ///
    /// `causes` are the `.err` files of the errors that led to this one.
    pub fn set_error(
        &mut self,
        port: &BundlePath,
        message: &str,
        trace: &str,
        causes: &[BundlePath],
    ) -> Result<BundlePath> {
        let mut document = ErrorDocument::new(message, trace);
        document.caused_by.extend_from_slice(causes);
        self.set_error_document(port, &document)
    }

    pub fn set_error_document(
        &mut self,
        port: &BundlePath,
        document: &ErrorDocument,
    ) -> Result<BundlePath> {
        let text = document.render(&port_dir(port))?;
        self.clear_except(port, PortKind::Error)?;
        let path = slot_sibling(port, ERROR_SUFFIX)?;
        self.tree.write(&path, text.as_bytes())?;
        debug!("Set error on {}: {}", port, document.message);
        Ok(path)
    }

    /// The port's error, `None` when the port is missing
    pub fn get_error(&self, port: &BundlePath) -> Result<Option<ErrorDocument>> {
        match self.port_kind(port)? {
            PortKind::Missing => Ok(None),
            PortKind::Error => {
                let path = slot_sibling(port, ERROR_SUFFIX)?;
                let text = self.tree.read_to_string(&path)?;
                ErrorDocument::parse(&text, &port_dir(port), &path).map(Some)
            }
            _ => Err(BundleError::NotAnError(port.to_string())),
        }
    }

    /// Move a file within the tree without ever replacing a directory
    pub fn safe_move(&mut self, source: &BundlePath, dest: &BundlePath) -> Result<()> {
        copy::safe_move_within(&mut *self.tree, source, dest)
    }

    fn require_list(&self, list: &BundlePath) -> Result<()> {
        if self.tree.is_dir(list)? {
            Ok(())
        } else {
            Err(BundleError::NotAList(list.to_string()))
        }
    }
}

fn port_dir(port: &BundlePath) -> BundlePath {
    port.parent().unwrap_or_default()
}

/// `in1` -> `in1.err`; the suffix is appended so dotted names stay intact
fn slot_sibling(port: &BundlePath, suffix: &str) -> Result<BundlePath> {
    let name = port
        .file_name()
        .ok_or_else(|| BundleError::invalid_path("/", "the root is not a port"))?;
    Ok(port_dir(port).child_unchecked(&format!("{}{}", name, suffix)))
}

fn strip_slot_suffix(name: &str) -> &str {
    [ERROR_SUFFIX, REFERENCE_SUFFIX]
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix).filter(|stem| !stem.is_empty()))
        .unwrap_or(name)
}
