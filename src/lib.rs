/*!
 * mirrorcast - profile-driven directory backups
 *
 * For each named profile — a set of source directories and a set of
 * destination directories — every source subtree is mirrored, in one
 * pass, into every destination; stale entries in destinations are then
 * pruned. Features include:
 * - Single-read fan-out: each source byte is read once and written to
 *   every destination
 * - Per-destination error records that never abort sibling destinations
 * - A stable three-hex-digit source-to-destination mapping so restores
 *   survive source renames
 * - A bounded worker pool running one driver per source
 * - A typed progress/error channel for UI and CLI observers
 */

pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod logging;
pub mod pool;
pub mod profile;
pub mod sourcemap;

// Re-export commonly used types for convenience
pub use config::{Config, LogLevel};
pub use crate::core::copier::{CopyStep, FanOutCopier};
pub use crate::core::driver::{prune_orphans, BackupDriver};
pub use crate::core::paths::{current_os, is_child, split_below, OsKind};
pub use crate::core::predicate::{CopyPredicate, ModifiedMoreRecently};
pub use crate::core::pruner::Pruner;
pub use crate::core::walker::Walker;
pub use error::{CopyError, MirrorcastError, Result};
pub use events::{BackupEvent, EventPublisher, EventSubscriber, ProgressStatus};
pub use pool::WorkerPool;
pub use profile::BackupProfile;
pub use sourcemap::SourceMap;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
