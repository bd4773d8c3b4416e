//! Patch sources.
//!
//! A [`PatchSource`] lists candidate scripts in a stable order and reads
//! their content on demand. [`DirSource`] is the filesystem implementation.

use std::fs;
use std::path::PathBuf;

use crate::error::DiscoveryError;

/// One candidate returned by a source listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Opaque handle passed back to [`PatchSource::read`]
    pub locator: String,
    /// Name the revision is derived from
    pub name: String,
}

/// Where patch scripts come from
pub trait PatchSource {
    /// Human-readable description used in logs and errors
    fn describe(&self) -> String;

    /// List every candidate, sorted by name.
    ///
    /// Each call rescans the source.
    fn list(&self) -> Result<Vec<SourceEntry>, DiscoveryError>;

    /// Read the full content of one entry
    fn read(&self, locator: &str) -> std::io::Result<String>;
}

impl<S: PatchSource + ?Sized> PatchSource for &S {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn list(&self) -> Result<Vec<SourceEntry>, DiscoveryError> {
        (**self).list()
    }

    fn read(&self, locator: &str) -> std::io::Result<String> {
        (**self).read(locator)
    }
}

/// Patch scripts stored as files in one directory (not recursive)
#[derive(Debug, Clone)]
pub struct DirSource {
    dir: PathBuf,
}

impl DirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl PatchSource for DirSource {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    fn list(&self) -> Result<Vec<SourceEntry>, DiscoveryError> {
        let io_err = |source| DiscoveryError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            // Follows symlinks so linked patch files are picked up
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            // A lossy name would give a locator `read` cannot open
            let (Some(locator), Ok(name)) = (path.to_str(), entry.file_name().into_string()) else {
                return Err(DiscoveryError::Unparsable(path.display().to_string()));
            };
            entries.push(SourceEntry {
                locator: locator.to_string(),
                name,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read(&self, locator: &str) -> std::io::Result<String> {
        fs::read_to_string(locator)
    }
}
