//! Moving and copying across virtual trees
//!
//! [`safe_move`] relocates a single file from one tree to another (for
//! example from ordinary storage into an open bundle) and [`copy_recursively`]
//! copies a whole subtree. Both read the source only; the source is deleted
//! by `safe_move` after the destination has been committed.

use crate::error::{BundleError, Result};
use crate::path::BundlePath;
use crate::vfs::{EntryKind, VirtualTree};
use tracing::{debug, warn};

/// Move a regular file within one tree
///
/// Fails with [`BundleError::DestinationIsDirectory`] when `dest` names a
/// directory; `source` is untouched in that case. An existing file at `dest`
/// is replaced.
pub fn safe_move_within<T>(tree: &mut T, source: &BundlePath, dest: &BundlePath) -> Result<()>
where
    T: VirtualTree + ?Sized,
{
    check_move(&*tree, source, &*tree, dest)?;
    debug!("Moving {} to {}", source, dest);
    tree.rename(source, dest)
}

/// Move a regular file from `src_tree` into `dst_tree`
///
/// The content is written to a temporary sibling of `dest` first and renamed
/// into place, then the source is deleted. On any failure the temporary
/// file is removed and the source is left as it was.
pub fn safe_move<S, D>(
    src_tree: &mut S,
    source: &BundlePath,
    dst_tree: &mut D,
    dest: &BundlePath,
) -> Result<()>
where
    S: VirtualTree + ?Sized,
    D: VirtualTree + ?Sized,
{
    check_move(&*src_tree, source, &*dst_tree, dest)?;
    debug!("Moving {} across trees to {}", source, dest);

    let data = src_tree.read(source)?;
    let modified = src_tree.metadata(source)?.and_then(|m| m.modified);

    let staging = temp_sibling(dest)?;
    let committed = dst_tree
        .write(&staging, &data)
        .and_then(|_| dst_tree.rename(&staging, dest));
    if let Err(e) = committed {
        if let Err(cleanup) = dst_tree.remove_if_exists(&staging) {
            warn!("Failed to remove temporary file {}: {}", staging, cleanup);
        }
        return Err(e);
    }

    if let Some(time) = modified {
        dst_tree.set_modified(dest, time)?;
    }
    src_tree.remove(source)
}

fn check_move<S, D>(src_tree: &S, source: &BundlePath, dst_tree: &D, dest: &BundlePath) -> Result<()>
where
    S: VirtualTree + ?Sized,
    D: VirtualTree + ?Sized,
{
    match src_tree.kind(source)? {
        Some(EntryKind::File) => {}
        Some(EntryKind::Directory) => {
            return Err(BundleError::InvalidArgument(format!(
                "{} is a directory, only regular files can be moved",
                source
            )))
        }
        None => return Err(BundleError::NotFound(source.to_string())),
    }
    if dst_tree.is_dir(dest)? {
        return Err(BundleError::DestinationIsDirectory(dest.to_string()));
    }
    Ok(())
}

fn temp_sibling(dest: &BundlePath) -> Result<BundlePath> {
    let name = dest
        .file_name()
        .ok_or_else(|| BundleError::DestinationIsDirectory(dest.to_string()))?;
    let parent = dest.parent().unwrap_or_default();
    parent.child(&format!(".{}.{:08x}.tmp", name, rand::random::<u32>()))
}

/// Options for [`copy_recursively`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyOptions {
    /// Merge into an existing destination directory and replace files
    pub replace_existing: bool,

    /// Carry modification times over to the copies
    pub copy_attributes: bool,

    /// Skip entries that fail to copy instead of aborting
    pub ignore_errors: bool,
}

impl CopyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_existing(mut self) -> Self {
        self.replace_existing = true;
        self
    }

    pub fn copy_attributes(mut self) -> Self {
        self.copy_attributes = true;
        self
    }

    pub fn ignore_errors(mut self) -> Self {
        self.ignore_errors = true;
        self
    }
}

/// What a recursive copy did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub files_copied: usize,
    pub dirs_copied: usize,

    /// Source paths skipped in ignore-errors mode
    pub skipped: Vec<BundlePath>,
}

/// Copy the directory `source` of `src_tree` to `dest` in `dst_tree`
///
/// `dest` must not exist unless `replace_existing` is set, and its parent must
/// be a directory. Without `ignore_errors` the first failure aborts the copy;
/// with it the failing subtree is skipped, recorded in the report, and the
/// call still succeeds.
pub fn copy_recursively<S, D>(
    src_tree: &S,
    source: &BundlePath,
    dst_tree: &mut D,
    dest: &BundlePath,
    options: CopyOptions,
) -> Result<CopyReport>
where
    S: VirtualTree + ?Sized,
    D: VirtualTree + ?Sized,
{
    if !src_tree.is_dir(source)? {
        return Err(BundleError::NotADirectory(source.to_string()));
    }
    if dst_tree.is_dir(dest)? && !options.replace_existing {
        return Err(BundleError::DestinationExists(dest.to_string()));
    }
    if let Some(parent) = dest.parent() {
        if !dst_tree.is_dir(&parent)? {
            return Err(BundleError::NotADirectory(parent.to_string()));
        }
    }

    debug!("Copying {} to {} ({:?})", source, dest, options);
    let mut report = CopyReport::default();
    copy_dir(src_tree, source, dst_tree, dest, options, &mut report)?;
    Ok(report)
}

fn copy_dir<S, D>(
    src_tree: &S,
    source: &BundlePath,
    dst_tree: &mut D,
    dest: &BundlePath,
    options: CopyOptions,
    report: &mut CopyReport,
) -> Result<()>
where
    S: VirtualTree + ?Sized,
    D: VirtualTree + ?Sized,
{
    let children = match prepare_dir(src_tree, source, dst_tree, dest, options) {
        Ok(children) => children,
        Err(e) => return skip_or_fail(source, e, options, report),
    };
    report.dirs_copied += 1;

    for name in children {
        let src_child = source.child_unchecked(&name);
        let dst_child = dest.child_unchecked(&name);
        match src_tree.kind(&src_child) {
            Ok(Some(EntryKind::Directory)) => {
                copy_dir(src_tree, &src_child, dst_tree, &dst_child, options, report)?
            }
            Ok(Some(EntryKind::File)) => {
                match copy_file(src_tree, &src_child, dst_tree, &dst_child, options) {
                    Ok(()) => report.files_copied += 1,
                    Err(e) => skip_or_fail(&src_child, e, options, report)?,
                }
            }
            // vanished between listing and visiting
            Ok(None) => {}
            Err(e) => skip_or_fail(&src_child, e, options, report)?,
        }
    }

    if options.copy_attributes {
        if let Err(e) = copy_modified(src_tree, source, dst_tree, dest) {
            skip_or_fail(source, e, options, report)?;
        }
    }
    Ok(())
}

fn prepare_dir<S, D>(
    src_tree: &S,
    source: &BundlePath,
    dst_tree: &mut D,
    dest: &BundlePath,
    options: CopyOptions,
) -> Result<Vec<String>>
where
    S: VirtualTree + ?Sized,
    D: VirtualTree + ?Sized,
{
    let children = src_tree.list(source)?;
    match dst_tree.kind(dest)? {
        Some(EntryKind::Directory) if options.replace_existing => {}
        Some(_) => return Err(BundleError::DestinationExists(dest.to_string())),
        None => dst_tree.create_dir(dest)?,
    }
    Ok(children)
}

fn copy_file<S, D>(
    src_tree: &S,
    source: &BundlePath,
    dst_tree: &mut D,
    dest: &BundlePath,
    options: CopyOptions,
) -> Result<()>
where
    S: VirtualTree + ?Sized,
    D: VirtualTree + ?Sized,
{
    match dst_tree.kind(dest)? {
        Some(EntryKind::Directory) => {
            return Err(BundleError::DestinationIsDirectory(dest.to_string()))
        }
        Some(EntryKind::File) if !options.replace_existing => {
            return Err(BundleError::DestinationExists(dest.to_string()))
        }
        _ => {}
    }
    let data = src_tree.read(source)?;
    dst_tree.write(dest, &data)?;
    if options.copy_attributes {
        copy_modified(src_tree, source, dst_tree, dest)?;
    }
    Ok(())
}

fn copy_modified<S, D>(
    src_tree: &S,
    source: &BundlePath,
    dst_tree: &mut D,
    dest: &BundlePath,
) -> Result<()>
where
    S: VirtualTree + ?Sized,
    D: VirtualTree + ?Sized,
{
    if let Some(time) = src_tree.metadata(source)?.and_then(|m| m.modified) {
        dst_tree.set_modified(dest, time)?;
    }
    Ok(())
}

fn skip_or_fail(
    path: &BundlePath,
    error: BundleError,
    options: CopyOptions,
    report: &mut CopyReport,
) -> Result<()> {
    if options.ignore_errors {
        warn!("Skipping {} during copy: {}", path, error);
        report.skipped.push(path.clone());
        Ok(())
    } else {
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::DirTree;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn p(s: &str) -> BundlePath {
        BundlePath::new(s).unwrap()
    }

    fn tree() -> (TempDir, DirTree) {
        let temp_dir = TempDir::new().unwrap();
        let tree = DirTree::new(temp_dir.path()).unwrap();
        (temp_dir, tree)
    }

    #[test]
    fn test_safe_move_across_trees() {
        let (_a, mut src) = tree();
        let (_b, mut dst) = tree();
        src.write(&p("f1"), b"payload").unwrap();

        safe_move(&mut src, &p("f1"), &mut dst, &p("f2")).unwrap();

        assert!(src.list(&BundlePath::root()).unwrap().is_empty());
        assert_eq!(dst.list(&BundlePath::root()).unwrap(), vec!["f2"]);
        assert_eq!(dst.read(&p("f2")).unwrap(), b"payload");
    }

    #[test]
    fn test_safe_move_replaces_file() {
        let (_a, mut src) = tree();
        let (_b, mut dst) = tree();
        src.write(&p("f1"), b"new").unwrap();
        dst.write(&p("f2"), b"old").unwrap();

        safe_move(&mut src, &p("f1"), &mut dst, &p("f2")).unwrap();
        assert_eq!(dst.read(&p("f2")).unwrap(), b"new");
    }

    #[test]
    fn test_safe_move_onto_directory_fails() {
        let (_dir, mut tree) = tree();
        tree.write(&p("f1"), b"keep me").unwrap();
        tree.create_dir(&p("d1")).unwrap();

        let result = safe_move_within(&mut tree, &p("f1"), &p("d1"));
        assert!(matches!(result, Err(BundleError::DestinationIsDirectory(_))));
        assert_eq!(tree.read(&p("f1")).unwrap(), b"keep me");
        assert_eq!(tree.list(&BundlePath::root()).unwrap(), vec!["d1", "f1"]);
    }

    #[test]
    fn test_safe_move_across_onto_directory_fails() {
        let (_a, mut src) = tree();
        let (_b, mut dst) = tree();
        src.write(&p("f1"), b"keep me").unwrap();
        dst.create_dir(&p("d1")).unwrap();

        let result = safe_move(&mut src, &p("f1"), &mut dst, &p("d1"));
        assert!(matches!(result, Err(BundleError::DestinationIsDirectory(_))));
        assert_eq!(src.read(&p("f1")).unwrap(), b"keep me");
        assert_eq!(dst.list(&p("d1")).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_copy_recursively() {
        let (_a, mut src) = tree();
        let (_b, mut dst) = tree();
        src.write(&p("data/a.txt"), b"a").unwrap();
        src.write(&p("data/sub/b.txt"), b"b").unwrap();
        src.create_dir(&p("data/empty")).unwrap();

        let report = copy_recursively(&src, &p("data"), &mut dst, &p("copy"), CopyOptions::new()).unwrap();

        assert_eq!(report.files_copied, 2);
        assert_eq!(report.dirs_copied, 3);
        assert!(report.skipped.is_empty());
        assert_eq!(dst.read(&p("copy/a.txt")).unwrap(), b"a");
        assert_eq!(dst.read(&p("copy/sub/b.txt")).unwrap(), b"b");
        assert!(dst.is_dir(&p("copy/empty")).unwrap());
        // source untouched
        assert_eq!(src.read(&p("data/sub/b.txt")).unwrap(), b"b");
    }

    #[test]
    fn test_copy_refuses_existing_destination() {
        let (_a, mut src) = tree();
        let (_b, mut dst) = tree();
        src.write(&p("data/a.txt"), b"a").unwrap();
        dst.write(&p("copy/a.txt"), b"old").unwrap();

        let result = copy_recursively(&src, &p("data"), &mut dst, &p("copy"), CopyOptions::new());
        assert!(matches!(result, Err(BundleError::DestinationExists(_))));
        assert_eq!(dst.read(&p("copy/a.txt")).unwrap(), b"old");

        copy_recursively(
            &src,
            &p("data"),
            &mut dst,
            &p("copy"),
            CopyOptions::new().replace_existing(),
        )
        .unwrap();
        assert_eq!(dst.read(&p("copy/a.txt")).unwrap(), b"a");
    }

    #[test]
    fn test_copy_requires_directories() {
        let (_a, mut src) = tree();
        let (_b, mut dst) = tree();
        src.write(&p("file"), b"x").unwrap();
        src.create_dir(&p("dir")).unwrap();

        assert!(matches!(
            copy_recursively(&src, &p("file"), &mut dst, &p("x"), CopyOptions::new()),
            Err(BundleError::NotADirectory(_))
        ));
        assert!(matches!(
            copy_recursively(&src, &p("dir"), &mut dst, &p("missing/x"), CopyOptions::new()),
            Err(BundleError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_copy_ignore_errors_skips_conflicts() {
        let (_a, mut src) = tree();
        let (_b, mut dst) = tree();
        src.write(&p("data/a.txt"), b"a").unwrap();
        src.write(&p("data/b.txt"), b"b").unwrap();
        // a directory where a file should go
        dst.create_dir(&p("copy/a.txt")).unwrap();

        let options = CopyOptions::new().replace_existing().ignore_errors();
        let report = copy_recursively(&src, &p("data"), &mut dst, &p("copy"), options).unwrap();

        assert_eq!(report.files_copied, 1);
        assert_eq!(report.skipped, vec![p("data/a.txt")]);
        assert_eq!(dst.read(&p("copy/b.txt")).unwrap(), b"b");

        let strict = CopyOptions::new().replace_existing();
        let result = copy_recursively(&src, &p("data"), &mut dst, &p("copy"), strict);
        assert!(matches!(result, Err(BundleError::DestinationIsDirectory(_))));
    }

    #[test]
    fn test_copy_attributes() {
        let (_a, mut src) = tree();
        let (_b, mut dst) = tree();
        src.write(&p("data/a.txt"), b"a").unwrap();
        let time = Utc.with_ymd_and_hms(2013, 7, 4, 9, 0, 0).unwrap();
        src.set_modified(&p("data/a.txt"), time).unwrap();
        src.set_modified(&p("data"), time).unwrap();

        copy_recursively(
            &src,
            &p("data"),
            &mut dst,
            &p("copy"),
            CopyOptions::new().copy_attributes(),
        )
        .unwrap();

        assert_eq!(dst.metadata(&p("copy/a.txt")).unwrap().unwrap().modified, Some(time));
        assert_eq!(dst.metadata(&p("copy")).unwrap().unwrap().modified, Some(time));
    }
}
