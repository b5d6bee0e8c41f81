/*!
 * Lazy depth-first enumeration of a directory subtree
 *
 * Order contract: the root is yielded first; within each directory the
 * directory's own path comes before its files, file siblings keep the
 * order the directory read produced, and subdirectories are recursed
 * after the parent's files.
 */

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

pub struct Walker {
    inner: walkdir::IntoIter,
}

impl Walker {
    pub fn new(root: &Path) -> Self {
        let inner = WalkDir::new(root)
            .follow_links(false)
            // files sort before directories; the sibling order within each
            // group is the directory-read order (stable sort)
            .sort_by(|a, b| a.file_type().is_dir().cmp(&b.file_type().is_dir()))
            .into_iter();
        Walker { inner }
    }

    /// Number of entries below `root`, the root itself excluded. Used as a
    /// progress denominator.
    pub fn count_entries(root: &Path) -> usize {
        Walker::new(root).skip(1).count()
    }
}

impl Iterator for Walker {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            match self.inner.next()? {
                Ok(entry) => {
                    // symlinked directories are neither entered nor yielded
                    if entry.file_type().is_symlink() && entry.path().is_dir() {
                        continue;
                    }
                    return Some(entry.into_path());
                }
                // an unreadable branch ends there, not the whole walk
                Err(err) => warn!("skipping unreadable entry: {err}"),
            }
        }
    }
}
