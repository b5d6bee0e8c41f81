/*!
 * Backup driver: walks one source of a profile through the fan-out
 * copier, then prunes every destination
 *
 * The driver owns its walker, copier and pruners for the duration of a
 * run. It publishes progress and errors through the observer channel and
 * always finishes with a `Finished` event, also on the fatal path.
 */

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::copier::FanOutCopier;
use super::predicate::ModifiedMoreRecently;
use super::pruner::Pruner;
use super::walker::Walker;
use crate::error::{CopyError, Result};
use crate::events::EventPublisher;
use crate::profile::BackupProfile;
use crate::sourcemap::SourceMap;

/// Progress messages keep paths readable by trimming the middle.
const DISPLAY_LIMIT: usize = 100;

pub struct BackupDriver {
    source: PathBuf,
    destinations: Vec<PathBuf>,
    dest_name: Option<String>,
    ignored_errors: HashSet<String>,
    events: EventPublisher,
    abort: Arc<AtomicBool>,
}

impl BackupDriver {
    /// Snapshots everything the run needs; later profile edits cannot
    /// affect a driver already constructed.
    pub fn new(
        source: PathBuf,
        destinations: Vec<PathBuf>,
        dest_name: Option<String>,
        ignored_errors: HashSet<String>,
        events: EventPublisher,
    ) -> Self {
        if ignored_errors.is_empty() {
            info!("all errors will be shown");
        } else {
            info!("ignoring error types: {:?}", ignored_errors);
        }
        BackupDriver {
            source,
            destinations,
            dest_name,
            ignored_errors,
            events,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked between walker steps and between prune steps. Setting
    /// it lets the current filesystem operation finish, then stops the run.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Runs the backup to completion. Fatal errors are caught here, logged
    /// and turned into a `Finished` event so observers never hang.
    pub fn execute(&self) {
        if let Err(err) = self.run() {
            error!(
                "uncaught failure backing up \"{}\": {err}",
                self.source.display()
            );
        }
        self.events.finished();
    }

    fn run(&self) -> Result<()> {
        let valid: Vec<PathBuf> = self
            .destinations
            .iter()
            .filter(|d| d.is_dir())
            .cloned()
            .collect();
        if valid.len() < self.destinations.len() {
            warn!(
                "not all destinations of \"{}\" exist, continuing with {:?}",
                self.source.display(),
                valid
            );
        }
        if valid.is_empty() {
            warn!("no destination folders, doing nothing; backup aborting");
            return Ok(());
        }

        self.events.progress(0.0, "Preparing...");
        let total = Walker::count_entries(&self.source);

        info!("executing copy on \"{}\"", self.source.display());
        let mut copier = FanOutCopier::new(
            &self.source,
            &valid,
            Some(Box::new(ModifiedMoreRecently)),
            self.dest_name.as_deref(),
        )?;

        let mut copied = 0usize;
        while !self.abort.load(Ordering::Relaxed) {
            let Some(step) = copier.next() else { break };
            let step = step?;
            for error in step.errors {
                self.report(error);
            }
            copied += 1;
            let percent = if total > 0 {
                ((copied * 100) as f64 / total as f64).min(100.0)
            } else {
                100.0
            };
            self.events.progress(percent, display_string(&step.path));
        }
        self.events.progress(100.0, "Copy finished");

        if !self.abort.load(Ordering::Relaxed) {
            info!("executing pruning");
            for dest in &valid {
                if self.abort.load(Ordering::Relaxed) {
                    break;
                }
                if !dest.is_dir() {
                    warn!(
                        "destination \"{}\" is missing, skipping its prune",
                        dest.display()
                    );
                    continue;
                }
                info!("pruning \"{}\"", dest.display());
                self.events
                    .progress(100.0, format!("Pruning \"{}\"", dest.display()));
                self.prune_destination(dest);
            }
            info!("pruning finished");
        }

        Ok(())
    }

    /// Deletes everything the pruner flagged: file-like entries first via
    /// unlink, then directories. The delete set was collected up front, so
    /// the filesystem mutations below cannot invalidate it.
    fn prune_destination(&self, destination: &Path) {
        let (dirs, files): (Vec<PathBuf>, Vec<PathBuf>) =
            Pruner::new(&self.source, destination, self.dest_name.as_deref())
                .partition(|p| {
                    std::fs::symlink_metadata(p)
                        .map(|m| m.is_dir())
                        .unwrap_or(false)
                });

        for path in files.iter().chain(dirs.iter()) {
            if self.abort.load(Ordering::Relaxed) {
                break;
            }
            if delete_path(path, &mut |e| self.report(e)) {
                warn!("deleted while pruning: \"{}\"", path.display());
                self.events
                    .progress(100.0, format!("Deleted \"{}\"", path.display()));
            } else {
                error!("prune: could not delete \"{}\"", path.display());
            }
        }
    }

    /// Forwards a record to the observer unless its variant is ignored.
    fn report(&self, error: CopyError) {
        if self.ignored_errors.contains(error.variant_name()) {
            debug!("suppressed {}: {error}", error.variant_name());
        } else {
            self.events.error(error);
        }
    }
}

/// Removes one path: unlink for files and symlinks, recursive delete for
/// directories. Failures go to `on_error` and do not abort the sweep.
/// Returns true when the path is gone afterwards (or already was).
pub(crate) fn delete_path(path: &Path, on_error: &mut dyn FnMut(CopyError)) -> bool {
    let meta = match std::fs::symlink_metadata(path) {
        Err(_) => return true, // already gone
        Ok(meta) => meta,
    };

    if meta.file_type().is_symlink() || meta.is_file() {
        if let Err(err) = std::fs::remove_file(path) {
            on_error(classify_remove_error(err, path));
        }
    } else if meta.is_dir() {
        remove_tree(path, on_error);
    }

    std::fs::symlink_metadata(path).is_err()
}

/// Recursive directory delete with an error callback instead of a bail-out.
fn remove_tree(path: &Path, on_error: &mut dyn FnMut(CopyError)) {
    match std::fs::read_dir(path) {
        Ok(entries) => {
            for entry in entries {
                match entry {
                    Ok(entry) => {
                        let child = entry.path();
                        let is_dir = entry
                            .file_type()
                            .map(|t| t.is_dir() && !t.is_symlink())
                            .unwrap_or(false);
                        if is_dir {
                            remove_tree(&child, on_error);
                        } else if let Err(err) = std::fs::remove_file(&child) {
                            on_error(classify_remove_error(err, &child));
                        }
                    }
                    Err(err) => on_error(CopyError::PathOperationFailed {
                        message: "Could not read a directory entry while pruning"
                            .into(),
                        path: path.to_path_buf(),
                        cause: Some(err),
                    }),
                }
            }
        }
        Err(err) => on_error(CopyError::PathOperationFailed {
            message: "Could not list directory while pruning".into(),
            path: path.to_path_buf(),
            cause: Some(err),
        }),
    }

    if let Err(err) = std::fs::remove_dir(path) {
        on_error(classify_remove_error(err, path));
    }
}

fn classify_remove_error(err: io::Error, path: &Path) -> CopyError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => CopyError::AccessDenied {
            path: path.to_path_buf(),
            cause: err,
        },
        io::ErrorKind::DirectoryNotEmpty => CopyError::DirectoryNotEmpty {
            path: path.to_path_buf(),
        },
        _ => CopyError::PathOperationFailed {
            message: "Could not remove path".into(),
            path: path.to_path_buf(),
            cause: Some(err),
        },
    }
}

/// Deletes destination top-level folders whose mapping code no longer
/// belongs to any source of the profile. Only folders that look like
/// mapping codes are considered, so unrelated content in a destination
/// root is never touched.
pub fn prune_orphans(profile: &BackupProfile, map: &SourceMap, events: &EventPublisher) {
    if profile.destinations.is_empty() {
        info!("no destinations in the profile, nothing to prune");
        events.progress(100.0, "Didn't find anything");
        return;
    }

    let valid: Vec<&PathBuf> = profile
        .destinations
        .iter()
        .filter(|d| d.is_dir())
        .collect();
    if valid.is_empty() {
        error!("no viable destinations to prune, none of them exist");
        return;
    }
    if valid.len() < profile.destinations.len() {
        warn!(
            "did not find all the destinations; pruning {:?} only",
            valid
        );
    }

    let live_codes: HashSet<&str> = profile
        .sources
        .iter()
        .filter_map(|s| map.get(s))
        .collect();

    events.progress(0.0, "Pruning backup");
    let mut to_delete = Vec::new();
    for dest in valid {
        let Ok(entries) = std::fs::read_dir(dest) else {
            warn!("could not list destination \"{}\"", dest.display());
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if looks_like_map_code(name) && !live_codes.contains(name) {
                to_delete.push(path);
            }
        }
    }

    if to_delete.is_empty() {
        events.progress(100.0, "Nothing was pruned.");
        return;
    }

    let total = to_delete.len();
    for (index, path) in to_delete.iter().enumerate() {
        warn!("pruning orphaned backup folder: \"{}\"", path.display());
        delete_path(path, &mut |e| {
            error!("orphan prune failed on \"{}\": {e}", path.display());
            events.error(e);
        });
        events.progress(
            ((index + 1) * 100) as f64 / total as f64,
            "Pruning backup",
        );
    }
}

fn looks_like_map_code(name: &str) -> bool {
    name.len() == 3 && name.chars().all(|c| c.is_ascii_hexdigit())
}

/// Middle-truncates long paths for progress messages.
fn display_string(path: &Path) -> String {
    let full = path.display().to_string();
    let chars: Vec<char> = full.chars().collect();
    if chars.len() <= DISPLAY_LIMIT {
        return full;
    }
    let head: String = chars[..DISPLAY_LIMIT / 2 - 3].iter().collect();
    let tail: String = chars[chars.len() - (DISPLAY_LIMIT / 2 + 1)..].iter().collect();
    format!("{head}...{tail}")
}
