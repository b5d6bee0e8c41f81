/*!
 * Backup profiles and their JSON store
 */

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// One named backup: an ordered set of sources mirrored into an ordered
/// set of destinations. The engine consumes read-only snapshots; editing
/// happens outside.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupProfile {
    pub name: String,
    pub sources: Vec<PathBuf>,
    pub destinations: Vec<PathBuf>,
    pub id: u32,
}

/// On-disk shape: fields in alphabetical order so the store is written
/// with sorted keys. Unknown keys in hand-edited files are ignored.
#[derive(Serialize, Deserialize)]
#[serde(default)]
struct ProfileRecord {
    destinations: Vec<PathBuf>,
    id: u32,
    name: String,
    sources: Vec<PathBuf>,
}

impl Default for ProfileRecord {
    fn default() -> Self {
        ProfileRecord {
            destinations: Vec::new(),
            id: 0,
            name: String::new(),
            sources: Vec::new(),
        }
    }
}

impl From<ProfileRecord> for BackupProfile {
    fn from(record: ProfileRecord) -> Self {
        BackupProfile {
            name: record.name,
            sources: record.sources,
            destinations: record.destinations,
            id: record.id,
        }
    }
}

impl From<&BackupProfile> for ProfileRecord {
    fn from(profile: &BackupProfile) -> Self {
        ProfileRecord {
            destinations: profile.destinations.clone(),
            id: profile.id,
            name: profile.name.clone(),
            sources: profile.sources.clone(),
        }
    }
}

impl BackupProfile {
    /// Gives this profile the smallest ID not used by `others`.
    pub fn assign_id(&mut self, others: &[BackupProfile]) {
        debug!("assigning a new id to backup profile: {}", self.name);
        let mut id = 0;
        while others.iter().any(|p| p.id == id) {
            id += 1;
        }
        self.id = id;
    }

    /// Reassigns every ID in the collection. Run after loading: the JSON
    /// may have been hand-edited into duplicate IDs.
    pub fn reassign_all_ids(profiles: &mut [BackupProfile]) {
        debug!("reassigning all backup profile ids");
        for index in 0..profiles.len() {
            let (before, rest) = profiles.split_at_mut(index);
            rest[0].assign_id(before);
        }
    }

    pub fn by_name<'a>(
        profiles: &'a [BackupProfile],
        name: &str,
    ) -> Option<&'a BackupProfile> {
        profiles.iter().find(|p| p.name == name)
    }

    /// The profile with the matching ID, or `None` when absent or
    /// ambiguous.
    pub fn by_id(profiles: &[BackupProfile], id: u32) -> Option<&BackupProfile> {
        let mut matches = profiles.iter().filter(|p| p.id == id);
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first)
    }

    /// Reads the profile store. A missing file yields an empty set.
    pub fn read_json(path: &Path) -> Result<Vec<BackupProfile>> {
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(path)?;
        let records: Vec<ProfileRecord> = serde_json::from_str(&raw)?;
        Ok(records.into_iter().map(BackupProfile::from).collect())
    }

    /// Writes the whole collection, indented.
    pub fn write_json(profiles: &[BackupProfile], path: &Path) -> Result<()> {
        let records: Vec<ProfileRecord> =
            profiles.iter().map(ProfileRecord::from).collect();
        let json = serde_json::to_string_pretty(&records)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
