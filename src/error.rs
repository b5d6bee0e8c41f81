/*!
 * Error types for mirrorcast
 */

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirrorcastError>;

/// Failures raised to the caller: construction precondition violations,
/// configuration and profile-store problems, and fatal I/O.
#[derive(Error, Debug)]
pub enum MirrorcastError {
    /// A path that must be a directory is not one (or does not exist)
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// A destination equals the source it would mirror
    #[error("Destination is the source: {}", .0.display())]
    SamePath(PathBuf),

    /// A destination lies under the source, or contains it
    #[error("Destination {} overlaps source {}", .destination.display(), .src_path.display())]
    OverlappingPaths {
        src_path: PathBuf,
        destination: PathBuf,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No profile with the requested name
    #[error("No profile named \"{0}\"")]
    ProfileNotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-destination error records produced while mirroring one path.
///
/// These are recorded and carried in a step's error list, never raised;
/// the driver forwards them to the observer unless the variant name is in
/// the configured ignore set.
#[derive(Error, Debug)]
pub enum CopyError {
    /// Default placeholder before any work happened
    #[error("Nothing was done")]
    NothingWasDone,

    /// The path does not exist or is not the expected kind of object
    #[error("{message}: {}", .path.display())]
    PathNotWorking { message: String, path: PathBuf },

    /// An operation required an existing path and it was gone
    #[error("Path no longer exists: {}", .path.display())]
    PathNotThere { path: PathBuf },

    /// Windows refused to open a path of 256 characters or more
    #[error("Path too long, failed to open: {}", .path.display())]
    PathTooLong { path: PathBuf },

    /// An operation on a path returned a failure code
    #[error("{message}: {}", .path.display())]
    PathOperationFailed {
        message: String,
        path: PathBuf,
        #[source]
        cause: Option<io::Error>,
    },

    /// Internal invariant violation: an argument had the wrong type or shape
    #[error("Wrong argument type: {message}")]
    WrongArgumentType { message: String },

    /// Internal invariant violation: an argument had an unexpected value
    #[error("{message} (got {argument}, expected {expected})")]
    WrongArgumentValue {
        message: String,
        argument: String,
        expected: String,
    },

    /// Opening a file failed with an unclassified OS error
    #[error("Could not open \"{}\"", .filename.display())]
    CantOpenFile {
        filename: PathBuf,
        #[source]
        cause: io::Error,
    },

    /// Permission denied on open, read, write or remove
    #[error("Access denied: {}", .path.display())]
    AccessDenied {
        path: PathBuf,
        #[source]
        cause: io::Error,
    },

    /// A write stored fewer bytes than attempted
    #[error("Failed to write all the bytes to \"{}\"", .path.display())]
    FileWriteFailure {
        path: PathBuf,
        #[source]
        cause: Option<io::Error>,
    },

    /// rmdir on a directory that still has entries
    #[error("Directory not empty: {}", .path.display())]
    DirectoryNotEmpty { path: PathBuf },
}

impl CopyError {
    /// Stable variant name, used for the `ignorederrors` configuration key
    /// and `--listerrortypes`.
    pub fn variant_name(&self) -> &'static str {
        match self {
            CopyError::NothingWasDone => "NothingWasDone",
            CopyError::PathNotWorking { .. } => "PathNotWorking",
            CopyError::PathNotThere { .. } => "PathNotThere",
            CopyError::PathTooLong { .. } => "PathTooLong",
            CopyError::PathOperationFailed { .. } => "PathOperationFailed",
            CopyError::WrongArgumentType { .. } => "WrongArgumentType",
            CopyError::WrongArgumentValue { .. } => "WrongArgumentValue",
            CopyError::CantOpenFile { .. } => "CantOpenFile",
            CopyError::AccessDenied { .. } => "AccessDenied",
            CopyError::FileWriteFailure { .. } => "FileWriteFailure",
            CopyError::DirectoryNotEmpty { .. } => "DirectoryNotEmpty",
        }
    }

    /// Every variant name, in declaration order.
    pub const VARIANT_NAMES: [&'static str; 11] = [
        "NothingWasDone",
        "PathNotWorking",
        "PathNotThere",
        "PathTooLong",
        "PathOperationFailed",
        "WrongArgumentType",
        "WrongArgumentValue",
        "CantOpenFile",
        "AccessDenied",
        "FileWriteFailure",
        "DirectoryNotEmpty",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_names_match_taxonomy() {
        let err = CopyError::PathTooLong {
            path: PathBuf::from("/very/long"),
        };
        assert_eq!(err.variant_name(), "PathTooLong");
        assert!(CopyError::VARIANT_NAMES.contains(&err.variant_name()));
    }

    #[test]
    fn variant_names_are_distinct() {
        let mut names = CopyError::VARIANT_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), CopyError::VARIANT_NAMES.len());
    }

    #[test]
    fn copy_error_display() {
        let err = CopyError::AccessDenied {
            path: PathBuf::from("/locked"),
            cause: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "Access denied: /locked");
    }

    #[test]
    fn overlap_error_display() {
        let err = MirrorcastError::OverlappingPaths {
            src_path: PathBuf::from("/src"),
            destination: PathBuf::from("/src/inside"),
        };
        assert!(err.to_string().contains("/src/inside"));
    }

    #[test]
    fn io_error_converts() {
        let err: MirrorcastError =
            io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, MirrorcastError::Io(_)));
    }
}
