/*!
 * Pruner: paths present in a destination subtree but absent from the
 * source subtree
 *
 * The delete set is collected at construction from a single walker pass,
 * so iteration never depends on filesystem state and deletions during
 * iteration cannot invalidate it. The pruner itself deletes nothing; the
 * driver performs the deletions.
 */

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::paths;
use super::walker::Walker;

pub struct Pruner {
    delete_set: std::vec::IntoIter<PathBuf>,
}

impl Pruner {
    /// Collects every path under `destination_root / dest_name_or_basename`
    /// without a counterpart of the same type in `source`.
    pub fn new(source: &Path, destination_root: &Path, dest_name: Option<&str>) -> Self {
        let folder: OsString = match dest_name {
            Some(name) => OsString::from(name),
            None => source.file_name().map(OsString::from).unwrap_or_default(),
        };
        let dest_tree = destination_root.join(folder);

        let mut delete_set: Vec<PathBuf> = Walker::new(&dest_tree)
            .filter(|element| element != &dest_tree)
            .filter(|element| !has_counterpart(source, &dest_tree, element))
            .collect();

        // descendants before ancestors, so a directory never comes up for
        // deletion while entries below it are still pending
        delete_set.sort_by(|a, b| b.components().count().cmp(&a.components().count()));

        Pruner {
            delete_set: delete_set.into_iter(),
        }
    }
}

impl Iterator for Pruner {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        self.delete_set.next()
    }
}

/// Type-aware counterpart check: symlinks match only symlinks, files match
/// non-symlink files, directories match non-symlink directories. A
/// destination symlink is judged as a symlink no matter what it points to.
fn has_counterpart(source: &Path, dest_tree: &Path, element: &Path) -> bool {
    let suffix = paths::split_below(dest_tree, element).1;
    let counterpart = source.join(suffix);

    let element_meta = match std::fs::symlink_metadata(element) {
        Ok(meta) => meta,
        Err(_) => return false,
    };
    let counterpart_meta = std::fs::symlink_metadata(&counterpart);

    if element_meta.file_type().is_symlink() {
        return counterpart_meta
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
    }
    match counterpart_meta {
        Ok(meta) if element_meta.is_file() => meta.is_file(),
        Ok(meta) if element_meta.is_dir() => meta.is_dir(),
        _ => false,
    }
}
