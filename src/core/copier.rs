/*!
 * Fan-out copier: mirrors one source subtree into any number of
 * destination roots, reading each source byte exactly once
 *
 * The copier is a pull-based iterator. Each step copies one walker path
 * into every destination that the predicate lets through and yields the
 * per-destination errors recorded along the way (empty on full success).
 * Expected failures are recorded, never raised; unclassified read/write
 * failures surface as an `Err` item for the driver to handle.
 */

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use super::metadata::copy_metadata;
use super::paths::{self, OsKind};
use super::predicate::CopyPredicate;
use super::walker::Walker;
use crate::error::{CopyError, MirrorcastError, Result};

/// Bytes read from the source per fan-out block.
const READ_BLOCK_SIZE: usize = 10 * 1024 * 1024;

/// Files above this size log a warning and periodic progress hints.
const LARGE_FILE_BYTES: u64 = 1 << 30;

/// Classic Windows opens fail at this path length.
const WINDOWS_PATH_LIMIT: usize = 256;

/// One walker step: the path that was visited and the errors recorded per
/// destination while copying it.
#[derive(Debug)]
pub struct CopyStep {
    pub path: PathBuf,
    pub errors: Vec<CopyError>,
}

/// An open destination handle for the file currently being fanned out.
/// `file` drops to `None` once the target has failed or been closed.
struct TargetFile {
    path: PathBuf,
    file: Option<File>,
}

pub struct FanOutCopier {
    source: PathBuf,
    /// Destination roots already extended with the mapped folder name.
    destinations: Vec<PathBuf>,
    predicate: Option<Box<dyn CopyPredicate>>,
    walker: Walker,
    /// Read buffer, allocated on first use and reused across files.
    buffer: Vec<u8>,
}

impl FanOutCopier {
    /// Builds a copier over `source` and the given destination roots.
    ///
    /// `dest_name` overrides the basename of `source` as the per-source
    /// folder created under each destination root (the stable mapping code).
    ///
    /// Preconditions, each failing with a distinct error: `source` is a
    /// directory, every destination is a directory, no destination equals
    /// the source or lies under it, and the source lies under no
    /// destination.
    pub fn new(
        source: &Path,
        destination_roots: &[PathBuf],
        predicate: Option<Box<dyn CopyPredicate>>,
        dest_name: Option<&str>,
    ) -> Result<Self> {
        if !source.is_dir() {
            return Err(MirrorcastError::NotADirectory(source.to_path_buf()));
        }
        for dest in destination_roots {
            if !dest.is_dir() {
                return Err(MirrorcastError::NotADirectory(dest.clone()));
            }
            if paths::absolute(dest) == paths::absolute(source) {
                return Err(MirrorcastError::SamePath(dest.clone()));
            }
            if paths::is_child(source, dest) || paths::is_child(dest, source) {
                return Err(MirrorcastError::OverlappingPaths {
                    src_path: source.to_path_buf(),
                    destination: dest.clone(),
                });
            }
        }

        let folder: OsString = match dest_name {
            Some(name) => OsString::from(name),
            None => source.file_name().map(OsString::from).unwrap_or_default(),
        };
        let destinations: Vec<PathBuf> = destination_roots
            .iter()
            .map(|d| d.join(&folder))
            .collect();

        if let Some(predicate) = &predicate {
            warn!("conditional predicate in use: {}", predicate.name());
        }

        Ok(FanOutCopier {
            source: source.to_path_buf(),
            destinations,
            predicate,
            walker: Walker::new(source),
            buffer: Vec::new(),
        })
    }

    fn copy_path(&mut self, path: &Path) -> Result<Vec<CopyError>> {
        let relative = paths::split_below(&self.source, path).1;
        let all_targets: Vec<PathBuf> = if relative.as_os_str().is_empty() {
            self.destinations.clone()
        } else {
            self.destinations.iter().map(|d| d.join(&relative)).collect()
        };

        let targets = match &self.predicate {
            Some(predicate) => {
                let (kept, excluded): (Vec<PathBuf>, Vec<PathBuf>) = all_targets
                    .into_iter()
                    .partition(|t| predicate.should_copy(path, t));
                if !excluded.is_empty() {
                    debug!(
                        "{} ruled out copies of \"{}\" to {:?}",
                        predicate.name(),
                        path.display(),
                        excluded
                    );
                }
                kept
            }
            None => all_targets,
        };
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        if !path.is_dir() && !path.is_file() {
            error!(
                "source is neither a file nor a folder: \"{}\"",
                path.display()
            );
            return Ok(vec![CopyError::PathNotWorking {
                message: "Could not copy path because it was not a file or a folder"
                    .into(),
                path: path.to_path_buf(),
            }]);
        }

        let mut errors = Vec::new();
        let mut live = Vec::with_capacity(targets.len());
        for target in targets {
            match prepare_target(&target) {
                Ok(()) => live.push(target),
                Err(record) => errors.push(record),
            }
        }

        if path.is_file() {
            errors.extend(self.copy_file(path, &live)?);
        } else {
            errors.extend(copy_folder(path, &live));
        }
        Ok(errors)
    }

    /// Copies one regular file into every target, reading the source once.
    fn copy_file(
        &mut self,
        source: &Path,
        targets: &[PathBuf],
    ) -> Result<Vec<CopyError>> {
        let mut errors = Vec::new();

        // a file's target must keep the file's own basename
        let mut rectified = Vec::with_capacity(targets.len());
        for target in targets {
            if target.file_name() != source.file_name() {
                error!(
                    "arguments invalid: \"{}\" does not rectify to \"{}\"",
                    source.display(),
                    target.display()
                );
                errors.push(CopyError::WrongArgumentValue {
                    message: "Destination basename does not match the source".into(),
                    argument: target.display().to_string(),
                    expected: source
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                });
            } else {
                rectified.push(target.clone());
            }
        }
        if rectified.is_empty() {
            return Ok(errors);
        }

        // open the source exactly once
        let mut source_file = match File::open(source) {
            Ok(file) => file,
            Err(err) => {
                for _ in &rectified {
                    errors.push(classify_open_error(&err, source));
                }
                return Ok(errors);
            }
        };

        let mut dest_files: Vec<TargetFile> = Vec::with_capacity(rectified.len());
        for target in rectified {
            match File::create(&target) {
                Ok(file) => dest_files.push(TargetFile {
                    path: target,
                    file: Some(file),
                }),
                Err(err) => errors.push(classify_open_error(&err, &target)),
            }
        }

        let source_size = source_file.metadata().map(|m| m.len()).unwrap_or(0);
        if source_size > LARGE_FILE_BYTES {
            warn!(
                "large file \"{}\" ({source_size} bytes), this will take some time",
                source.display()
            );
        }

        debug!(
            "copying \"{}\" -> {} destinations",
            source.display(),
            dest_files.len()
        );

        if self.buffer.is_empty() {
            self.buffer.resize(READ_BLOCK_SIZE, 0);
        }
        let mut total_read: u64 = 0;
        let mut next_hint = source_size / 10;

        while dest_files.iter().any(|d| d.file.is_some()) {
            let read = match source_file.read(&mut self.buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                    error!("read error on \"{}\": {err}", source.display());
                    for dest in dest_files.iter_mut().filter(|d| d.file.is_some()) {
                        dest.file = None;
                        errors.push(CopyError::AccessDenied {
                            path: source.to_path_buf(),
                            cause: rebuild(&err),
                        });
                    }
                    return Ok(errors);
                }
                Err(err) if is_cloud_placeholder_failure(&err) => {
                    error!(
                        "cloud placeholder could not be read: \"{}\"",
                        source.display()
                    );
                    for dest in dest_files.iter_mut().filter(|d| d.file.is_some()) {
                        dest.file = None;
                        errors.push(CopyError::PathOperationFailed {
                            message: "Cloud placeholder could not be read".into(),
                            path: source.to_path_buf(),
                            cause: Some(rebuild(&err)),
                        });
                    }
                    return Ok(errors);
                }
                // anything else is an OS invariant violation
                Err(err) => return Err(MirrorcastError::Io(err)),
            };
            total_read += read as u64;

            for dest in dest_files.iter_mut() {
                if let Some(file) = dest.file.as_mut() {
                    if let Err(err) = file.write_all(&self.buffer[..read]) {
                        errors.push(CopyError::FileWriteFailure {
                            path: dest.path.clone(),
                            cause: Some(err),
                        });
                        dest.file = None;
                    }
                }
            }

            if source_size > LARGE_FILE_BYTES && next_hint > 0 && total_read >= next_hint
            {
                warn!(
                    "large file copy: {}%",
                    (total_read * 100) / source_size
                );
                next_hint += source_size / 10;
            }
        }

        // close every handle before touching metadata
        drop(source_file);
        for dest in dest_files.iter_mut() {
            dest.file = None;
        }

        for dest in &dest_files {
            if dest.path.is_file() {
                if let Err(err) = copy_metadata(source, &dest.path) {
                    warn!(
                        "failed to copy metadata to \"{}\": {err}",
                        dest.path.display()
                    );
                }
            }
        }

        Ok(errors)
    }
}

impl Iterator for FanOutCopier {
    type Item = Result<CopyStep>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.destinations.is_empty() {
            return None;
        }
        let path = self.walker.next()?;
        Some(self.copy_path(&path).map(|errors| CopyStep { path, errors }))
    }
}

/// Creates the target's parent on demand and clears stale objects out of
/// the way: an existing file (or symlink) target is removed, an empty
/// directory target is removed, a populated directory stays in place.
fn prepare_target(target: &Path) -> std::result::Result<(), CopyError> {
    if let Some(parent) = target.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            return Err(CopyError::PathOperationFailed {
                message: "Could not create the parent directory".into(),
                path: target.to_path_buf(),
                cause: Some(err),
            });
        }
    }

    let meta = match std::fs::symlink_metadata(target) {
        Err(_) => return Ok(()), // nothing in the way
        Ok(meta) => meta,
    };

    if meta.is_file() || meta.file_type().is_symlink() {
        match std::fs::remove_file(target) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                error!(
                    "permission error trying to overwrite \"{}\"",
                    target.display()
                );
                Err(CopyError::AccessDenied {
                    path: target.to_path_buf(),
                    cause: err,
                })
            }
            Err(err) => Err(CopyError::PathOperationFailed {
                message: "Could not remove the stale target".into(),
                path: target.to_path_buf(),
                cause: Some(err),
            }),
        }
    } else if meta.is_dir() {
        let is_empty = std::fs::read_dir(target)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty {
            if let Err(err) = std::fs::remove_dir(target) {
                return Err(CopyError::PathOperationFailed {
                    message: "Could not remove the stale directory".into(),
                    path: target.to_path_buf(),
                    cause: Some(err),
                });
            }
        } else {
            debug!(
                "not removing \"{}\" because it contains files or folders",
                target.display()
            );
        }
        Ok(())
    } else {
        error!(
            "could not determine whether \"{}\" is a folder or a file",
            target.display()
        );
        Err(CopyError::PathNotWorking {
            message: "Could not classify the existing target while overwriting".into(),
            path: target.to_path_buf(),
        })
    }
}

/// Mirrors one directory entry into every target: create if missing, then
/// copy metadata without following symlinks.
fn copy_folder(source: &Path, targets: &[PathBuf]) -> Vec<CopyError> {
    let mut errors = Vec::new();
    for target in targets {
        if target == source {
            error!(
                "folder copy arguments invalid, source == destination: \"{}\"",
                source.display()
            );
            errors.push(CopyError::WrongArgumentValue {
                message: "Destination is the source".into(),
                argument: target.display().to_string(),
                expected: format!("anything but {}", source.display()),
            });
            continue;
        }
        if !target.exists() {
            if let Err(err) = std::fs::create_dir_all(target) {
                errors.push(CopyError::PathOperationFailed {
                    message: "Could not make directory".into(),
                    path: target.clone(),
                    cause: Some(err),
                });
                continue;
            }
        }
        if let Err(err) = copy_metadata(source, target) {
            warn!(
                "failed to copy directory metadata for \"{}\": {err}",
                target.display()
            );
        }
    }
    errors
}

/// Fresh `io::Error` carrying the same OS information, so one failure can
/// be recorded against several destinations.
fn rebuild(err: &io::Error) -> io::Error {
    match err.raw_os_error() {
        Some(code) => io::Error::from_raw_os_error(code),
        None => io::Error::new(err.kind(), err.to_string()),
    }
}

fn classify_open_error(err: &io::Error, path: &Path) -> CopyError {
    match err.kind() {
        io::ErrorKind::NotFound => {
            // Windows raises not-found for over-long paths; everywhere else
            // not-found means the path is gone
            if paths::current_os() == OsKind::Windows
                && path.as_os_str().len() >= WINDOWS_PATH_LIMIT
            {
                warn!("path too long: \"{}\"", path.display());
                CopyError::PathTooLong {
                    path: path.to_path_buf(),
                }
            } else {
                CopyError::PathNotThere {
                    path: path.to_path_buf(),
                }
            }
        }
        io::ErrorKind::PermissionDenied => CopyError::AccessDenied {
            path: path.to_path_buf(),
            cause: rebuild(err),
        },
        _ => CopyError::CantOpenFile {
            filename: path.to_path_buf(),
            cause: rebuild(err),
        },
    }
}

/// Windows cloud placeholders surface as EINVAL ("Invalid argument") when
/// the backing data is not hydrated; that errno pair is the platform
/// contract for detecting them.
fn is_cloud_placeholder_failure(err: &io::Error) -> bool {
    paths::current_os() == OsKind::Windows && err.raw_os_error() == Some(22)
}
