/*!
 * The mirror-and-prune engine
 */

pub mod copier;
pub mod driver;
pub mod metadata;
pub mod paths;
pub mod predicate;
pub mod pruner;
pub mod walker;
