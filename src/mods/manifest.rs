//! The `info.json` bundled inside a mod archive
//!
//! The archive's own manifest is what dependency resolution trusts. The
//! portal's cached copy (`info_json` in the catalog) may disagree with it.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::mods::dependency::Dependencies;
use crate::mods::error::Error;
use crate::mods::version::Version;

const MANIFEST_FILE_NAME: &str = "info.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub title: String,
    pub description: String,
    pub author: String,
    pub contact: String,
    pub homepage: String,
    pub factorio_version: String,
    pub dependencies: Vec<String>,
}

impl Manifest {
    /// Load the manifest from a mod archive on disk.
    pub fn load(archive_path: &Path) -> Result<Self, Error> {
        let file = File::open(archive_path)
            .map_err(Error::io(format!("open {}", archive_path.display())))?;
        Self::from_archive(file, archive_path)
    }

    /// Read the first `info.json` found in the archive, at any depth.
    /// Mod archives normally nest it under `<name>_<version>/`.
    pub fn from_archive<R: Read + Seek>(reader: R, archive_path: &Path) -> Result<Self, Error> {
        let archive_error = |source| Error::Archive {
            path: archive_path.to_path_buf(),
            source,
        };

        let mut archive = zip::ZipArchive::new(reader).map_err(archive_error)?;

        let entry_name = archive
            .file_names()
            .find(|name| {
                Path::new(name)
                    .file_name()
                    .is_some_and(|file_name| file_name == MANIFEST_FILE_NAME)
            })
            .map(str::to_owned)
            .ok_or_else(|| Error::MissingManifest(archive_path.to_path_buf()))?;

        let entry = archive.by_name(&entry_name).map_err(archive_error)?;
        serde_json::from_reader(entry).map_err(|source| Error::Decode {
            context: format!("{} in {}", entry_name, archive_path.display()),
            source,
        })
    }

    pub fn version(&self) -> Result<Version, Error> {
        Version::parse_strict(&self.version)
    }

    pub fn dependencies(&self) -> Result<Dependencies, Error> {
        Dependencies::parse(&self.dependencies)
    }
}
