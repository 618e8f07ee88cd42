//! Mods found on disk
//!
//! A game installation keeps its mods in `<install>/mods/`: one archive per
//! installed version, named `<name>_<version>.zip`, plus `mod-list.json`
//! recording which mods are enabled.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::mods::error::Error;
use crate::mods::version::{Version, split_artifact_file_name};

pub const MOD_LIST_FILE_NAME: &str = "mod-list.json";

/// A mod as seen from the local filesystem or the cache database.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalMod {
    pub name: String,
    pub enabled: bool,
    /// Known versions, ascending, so the latest is last.
    pub versions: Vec<Version>,
    /// When the latest version was released, if known.
    pub released_at: Option<DateTime<Utc>>,
    pub summary: String,
    pub category: String,
}

impl LocalMod {
    pub fn latest_version(&self) -> Option<&Version> {
        self.versions.last()
    }
}

/// Contents of `mod-list.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModList {
    pub mods: Vec<ModListEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModListEntry {
    pub name: String,
    pub enabled: bool,
}

impl ModList {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content =
            fs::read_to_string(path).map_err(Error::io(format!("read {}", path.display())))?;
        serde_json::from_str(&content).map_err(|source| Error::Decode {
            context: path.display().to_string(),
            source,
        })
    }

    /// Load `path`, or start a list with only the base game enabled when the
    /// file does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self, Error> {
        if path.exists() {
            return Self::load(path);
        }
        Ok(Self {
            mods: vec![ModListEntry {
                name: "base".to_string(),
                enabled: true,
            }],
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let content = serde_json::to_string_pretty(self).map_err(|source| Error::Decode {
            context: path.display().to_string(),
            source,
        })?;
        fs::write(path, content).map_err(Error::io(format!("write {}", path.display())))
    }

    /// Mark `name` enabled, adding it if it is not listed.
    pub fn enable(&mut self, name: &str) {
        match self.mods.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => entry.enabled = true,
            None => self.mods.push(ModListEntry {
                name: name.to_string(),
                enabled: true,
            }),
        }
    }
}

/// Collect every mod listed in an installation's `mod-list.json`, with the
/// versions found next to it on disk. Sorted by name.
pub fn load_installed(install_dir: &Path) -> Result<Vec<LocalMod>, Error> {
    let mods_dir = install_dir.join("mods");
    let list = ModList::load(&mods_dir.join(MOD_LIST_FILE_NAME))?;
    let mut archives = scan_archives(&mods_dir)?;

    let mut mods: Vec<LocalMod> = list
        .mods
        .into_iter()
        .map(|entry| LocalMod {
            versions: archives
                .remove(&entry.name)
                .map(|found| found.into_iter().map(|(version, _)| version).collect())
                .unwrap_or_default(),
            name: entry.name,
            enabled: entry.enabled,
            ..LocalMod::default()
        })
        .collect();
    mods.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(mods)
}

/// Group the `*_*.zip` archives in `dir` by mod name, versions ascending.
///
/// A missing directory yields an empty map.
pub fn scan_archives(dir: &Path) -> Result<BTreeMap<String, Vec<(Version, PathBuf)>>, Error> {
    let mut archives: BTreeMap<String, Vec<(Version, PathBuf)>> = BTreeMap::new();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(archives),
        Err(e) => return Err(Error::io(format!("read {}", dir.display()))(e)),
    };

    for entry in entries {
        let entry = entry.map_err(Error::io(format!("read {}", dir.display())))?;
        let file_name = entry.file_name();
        let Some((name, version)) = file_name.to_str().and_then(split_artifact_file_name) else {
            continue;
        };
        if version.is_zero() {
            debug!("Archive {:?} has no usable version", file_name);
        }
        archives
            .entry(name.to_string())
            .or_default()
            .push((version, entry.path()));
    }

    for versions in archives.values_mut() {
        versions.sort_by(|(a, _), (b, _)| a.cmp(b));
    }

    Ok(archives)
}
