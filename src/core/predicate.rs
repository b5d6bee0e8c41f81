/*!
 * Copy predicates: per-(source, destination) decisions
 */

use std::path::Path;

/// Decides whether the copy of `source` into `destination` should proceed.
///
/// Implementations must stay pure: reading filesystem metadata is fine,
/// mutating anything is not.
pub trait CopyPredicate: Send {
    /// Name shown in debug logs when destinations are filtered out.
    fn name(&self) -> &'static str;

    fn should_copy(&self, source: &Path, destination: &Path) -> bool;
}

/// Copy when the destination is missing, or the source's modification
/// timestamp strictly exceeds the destination's.
pub struct ModifiedMoreRecently;

impl CopyPredicate for ModifiedMoreRecently {
    fn name(&self) -> &'static str {
        "modified-more-recently"
    }

    fn should_copy(&self, source: &Path, destination: &Path) -> bool {
        let Ok(dest_meta) = std::fs::metadata(destination) else {
            return true;
        };
        let Ok(source_meta) = std::fs::metadata(source) else {
            return true;
        };
        match (source_meta.modified(), dest_meta.modified()) {
            (Ok(source_mtime), Ok(dest_mtime)) => source_mtime > dest_mtime,
            _ => true,
        }
    }
}
