use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::paths::{Paths, paths};

/// General settings persisted in `config.toml`.
///
/// Example TOML:
/// ```toml
/// install_dir  = "C:/Apps/FreeCAD"
/// last_version = "FreeCAD_weekly-2024.03.15-Windows-x86_64-py311.7z"
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub install_dir: Option<PathBuf>,
    #[serde(default)]
    pub last_version: Option<String>,
    /// Alternative release listing endpoint (mirrors, tests).
    #[serde(default)]
    pub feed_url: Option<String>,
}

/// The narrower "what did we last install" record kept in `last_version.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LastVersion {
    pub version: String,
}

/// Reads and writes the persisted state files under the fcup home.
///
/// Settings I/O never fails the caller: a missing or malformed
/// `config.toml` reads as defaults and a failed write is only logged.
/// The last-version record is stricter on write, since an update that
/// cannot be recorded would be re-applied on every run.
#[derive(Debug, Clone)]
pub struct StateStore {
    paths: Paths,
}

impl StateStore {
    pub fn new(paths: Paths) -> Self {
        StateStore { paths }
    }

    /// Store rooted at the default fcup home.
    pub fn open() -> Result<Self> {
        Ok(StateStore::new(paths()?))
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn load_settings(&self) -> Settings {
        match read_toml::<Settings>(&self.paths.config) {
            Ok(Some(s)) => s,
            Ok(None) => Settings::default(),
            Err(e) => {
                debug!("ignoring unreadable settings: {:#}", e);
                Settings::default()
            }
        }
    }

    pub fn save_settings(&self, settings: &Settings) {
        if let Err(e) = write_toml(&self.paths.config, settings) {
            debug!("ignoring settings write failure: {:#}", e);
        }
    }

    pub fn load_last_version(&self) -> Option<String> {
        match read_toml::<LastVersion>(&self.paths.record) {
            Ok(rec) => rec.map(|r| r.version),
            Err(e) => {
                debug!("ignoring unreadable version record: {:#}", e);
                None
            }
        }
    }

    pub fn save_last_version(&self, version: &str) -> Result<()> {
        write_toml(
            &self.paths.record,
            &LastVersion {
                version: version.to_string(),
            },
        )
    }
}

fn read_toml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    if !path.is_file() {
        return Ok(None);
    }
    let txt = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let v = toml::from_str(&txt).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(v))
}

fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let txt = toml::to_string(value).context("failed to serialize state")?;
    fs::write(path, txt).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// CLI command: remember the installation folder in `config.toml`.
pub fn cmd_set_dir(dir: &Path) -> Result<()> {
    let store = StateStore::open()?;
    let mut settings = store.load_settings();
    settings.install_dir = Some(dir.to_path_buf());
    store.save_settings(&settings);
    println!("install directory set to {}", dir.display());
    Ok(())
}
