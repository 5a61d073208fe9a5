// src/config.rs

//! Validated engine configuration
//!
//! Option parsing and config-file discovery live outside the engine; what
//! arrives here is already a plain object. [`Config::load`] reads the JSON
//! rendition the surrounding tooling produces and validates it into the
//! shape the [`crate::handle::Handle`] consumes.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One sync repository to register, in listing order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    /// Lower sorts earlier; ties keep listing order
    #[serde(default)]
    pub priority: i64,
    /// Mirror locations, informational to the engine
    #[serde(default)]
    pub servers: Vec<String>,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Installation root
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Database directory holding `local/` and `sync/`
    #[serde(default = "default_dbpath")]
    pub dbpath: PathBuf,
    /// Target architecture
    #[serde(default = "default_arch")]
    pub arch: String,
    /// Transaction log, appended to on commit
    #[serde(default = "default_logfile")]
    pub logfile: PathBuf,
    /// Packages that prompt before removal
    #[serde(default)]
    pub hold_packages: Vec<String>,
    /// Sync repositories in priority order
    #[serde(default)]
    pub sync_repositories: Vec<Repository>,
}

fn default_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_dbpath() -> PathBuf {
    PathBuf::from("/var/lib/pacrat")
}

fn default_arch() -> String {
    std::env::consts::ARCH.to_string()
}

fn default_logfile() -> PathBuf {
    PathBuf::from("/var/log/pacrat.log")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: default_root(),
            dbpath: default_dbpath(),
            arch: default_arch(),
            logfile: default_logfile(),
            hold_packages: Vec::new(),
            sync_repositories: Vec::new(),
        }
    }
}

impl Config {
    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Parse(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.arch.is_empty() {
            return Err(Error::Parse("config: arch must not be empty".to_string()));
        }
        for (i, repo) in self.sync_repositories.iter().enumerate() {
            if repo.name.is_empty() || repo.name == "local" {
                return Err(Error::Parse(format!(
                    "config: invalid sync repository name '{}'",
                    repo.name
                )));
            }
            if self.sync_repositories[..i].iter().any(|r| r.name == repo.name) {
                return Err(Error::Parse(format!(
                    "config: duplicate sync repository '{}'",
                    repo.name
                )));
            }
        }
        Ok(())
    }

    /// Directory of the installed-package database entries.
    pub fn local_dir(&self) -> PathBuf {
        self.dbpath.join("local")
    }

    /// Directory holding fetched `<repo>.db` tarballs.
    pub fn sync_dir(&self) -> PathBuf {
        self.dbpath.join("sync")
    }
}
