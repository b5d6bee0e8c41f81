/*!
 * Stable source-to-destination mapping
 *
 * Each source path of a profile is assigned a short three-hex-digit
 * folder name under which its mirror lives in every destination root. A
 * source cannot be derived from its destination basename, so the mapping
 * is persisted as a sidecar file in each destination; it is what keeps
 * old backups reachable when the user renames a source folder.
 */

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::profile::BackupProfile;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMap {
    #[serde(rename = "backupid")]
    backup_id: u32,
    mapping: BTreeMap<PathBuf, String>,
}

impl SourceMap {
    /// Assigns a fresh code to every source of the profile and records the
    /// profile's ID. Meant for a map that does not exist yet.
    pub fn generate(&mut self, profile: &BackupProfile) {
        self.backup_id = profile.id;
        for source in &profile.sources {
            self.map_source(source);
        }
    }

    /// Syncs the map to the profile without renumbering surviving keys:
    /// keys for vanished sources are dropped, new sources get the smallest
    /// unused code.
    pub fn synchronize(&mut self, profile: &BackupProfile) {
        self.mapping
            .retain(|source, _| profile.sources.contains(source));
        for source in &profile.sources {
            if !self.mapping.contains_key(source) {
                self.map_source(source);
            }
        }
    }

    /// The destination basename assigned to `source`, if any.
    pub fn get(&self, source: &Path) -> Option<&str> {
        self.mapping.get(source).map(String::as_str)
    }

    pub fn backup_id(&self) -> u32 {
        self.backup_id
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Codes currently in use, for tests and orphan pruning.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.mapping.values().map(String::as_str)
    }

    fn map_source(&mut self, source: &Path) {
        let code = self.new_code();
        self.mapping.insert(source.to_path_buf(), code);
    }

    /// Smallest unused code: start at 0x001, three upper-hex digits,
    /// increment until free. Existing entries are never disturbed.
    fn new_code(&self) -> String {
        let mut key: u32 = 1;
        loop {
            let code = format!("{key:03X}");
            if !self.mapping.values().any(|v| v == &code) {
                return code;
            }
            key += 1;
        }
    }

    /// Writes the sidecar document.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reads a sidecar document. Fails silently (returns `None`) when the
    /// file is missing, corrupt, or a symlink — sidecars that are symlinks
    /// are never followed.
    pub fn load(path: &Path) -> Option<SourceMap> {
        let meta = std::fs::symlink_metadata(path).ok()?;
        if !meta.is_file() || meta.file_type().is_symlink() {
            return None;
        }
        let raw = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Scans the candidate folders for a sidecar named `sourcemap_name`
    /// and loads the first one found. Symlinked folders are skipped.
    pub fn try_load(&mut self, folders: &[PathBuf], sourcemap_name: &str) -> bool {
        if folders.is_empty() || sourcemap_name.is_empty() {
            return false;
        }
        for folder in folders {
            if !folder.is_dir() || is_symlink(folder) {
                continue;
            }
            let path = folder.join(sourcemap_name);
            if let Some(loaded) = SourceMap::load(&path) {
                info!("loaded mapfile: \"{}\"", path.display());
                *self = loaded;
                return true;
            }
        }
        false
    }

    /// Saves the sidecar into every candidate folder that will take it.
    /// Returns true if at least one save succeeded.
    pub fn try_save(&self, folders: &[PathBuf], sourcemap_name: &str) -> bool {
        if folders.is_empty() || sourcemap_name.is_empty() {
            return false;
        }
        let mut success = false;
        for folder in folders {
            if !folder.is_dir() || is_symlink(folder) {
                continue;
            }
            let path = folder.join(sourcemap_name);
            match self.save(&path) {
                Ok(()) => {
                    info!("saved mapping to \"{}\"", path.display());
                    success = true;
                }
                Err(err) => warn!("could not save mapping to \"{}\": {err}", path.display()),
            }
        }
        success
    }

    /// The full mapping flow for one run: load the sidecar from the
    /// profile's destinations if one exists, generate otherwise, sync
    /// against the profile, and write the result back everywhere.
    pub fn for_profile(profile: &BackupProfile, sourcemap_name: &str) -> SourceMap {
        let mut map = SourceMap::default();
        if map.try_load(&profile.destinations, sourcemap_name) {
            map.backup_id = profile.id;
            map.synchronize(profile);
        } else {
            map.generate(profile);
        }
        map.try_save(&profile.destinations, sourcemap_name);
        map
    }
}

fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}
