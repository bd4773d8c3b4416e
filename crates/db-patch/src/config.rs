//! Configuration management for db-patch.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Command-line flags
//! 2. Environment variables (DB_PATH, PATCH_DIR, PATCH_TABLE)
//! 3. Config file (--config, ./db-patch.toml, or the user config dir)
//! 4. Default values

use anyhow::{Context, Result, bail};
use dbpatch_core::ApplierConfig;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::GlobalArgs;

/// Name of the config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "db-patch.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database settings
    pub database: DatabaseConfig,

    /// Patch source settings
    pub patches: PatchesConfig,

    /// Marker table settings
    pub marker: ApplierConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file (required)
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchesConfig {
    /// Directory to load patch files from
    #[serde(default = "default_patch_dir")]
    pub dir: PathBuf,
}

impl Default for PatchesConfig {
    fn default() -> Self {
        Self {
            dir: default_patch_dir(),
        }
    }
}

fn default_patch_dir() -> PathBuf {
    PathBuf::from("./")
}

impl Config {
    /// Load configuration from file (if any) and apply command-line overrides.
    pub fn load(args: &GlobalArgs) -> Result<Self> {
        let mut config = match Self::config_path(args.config.as_deref()) {
            Some(path) => Self::load_from(&path)?,
            None => Config::default(),
        };
        config.apply_overrides(args);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Resolve which config file to read.
    ///
    /// An explicit path is always returned; the fallbacks only when they exist.
    pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }

        ProjectDirs::from("io", "taylz", "db-patch")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .filter(|path| path.exists())
    }

    /// Layer flags and environment values over the file values
    pub fn apply_overrides(&mut self, args: &GlobalArgs) {
        if let Some(path) = &args.database {
            self.database.path = Some(path.clone());
        }
        if let Some(dir) = &args.patch_dir {
            self.patches.dir = dir.clone();
        }
        if let Some(table) = &args.table {
            self.marker.marker_table = table.clone();
        }
        if let Some(mode) = args.marker_mode {
            self.marker.marker_mode = mode;
        }
    }

    /// Check required values
    pub fn validate(&self) -> Result<()> {
        match &self.database.path {
            Some(path) if !path.as_os_str().is_empty() => {}
            _ => bail!("database path is required (--db, DB_PATH or [database] path)"),
        }
        self.marker.validate().context("invalid [marker] configuration")?;
        Ok(())
    }

    /// Database path; only valid after [`Config::validate`]
    pub fn database_path(&self) -> &Path {
        self.database.path.as_deref().unwrap_or_else(|| Path::new(""))
    }
}
