use anyhow::Result;
use regex::Regex;
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

use crate::config::StateStore;
use crate::process::run_with_timeout;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

static VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)FreeCAD\s+([^\s,()]+)").expect("valid regex"));

static REVISION: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [
        r"(?i)Revision[:\s]*([0-9A-Za-z\-]+)",
        r"(?i)\brev(?:ision)?[:\s]*([0-9A-Za-z\-]+)",
        r"(?i)commit[:\s]*([0-9a-f]{7,40})",
        r"(?i)\b([0-9a-f]{7,40})\b",
    ]
    .map(|p| Regex::new(p).expect("valid regex"))
});

/// Version and revision reported by an installed binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion {
    pub version: String,
    pub revision: Option<String>,
}

impl std::fmt::Display for InstalledVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.revision {
            Some(rev) => write!(f, "{} (rev: {})", self.version, rev),
            None => f.write_str(&self.version),
        }
    }
}

/// Executables tried, in order: `bin/` before the root, GUI before console.
pub fn candidates(install_dir: &Path) -> Vec<PathBuf> {
    let sfx = env::consts::EXE_SUFFIX;
    let mut out = Vec::with_capacity(4);
    for dir in [install_dir.join("bin"), install_dir.to_path_buf()] {
        for name in ["FreeCAD", "FreeCADCmd"] {
            out.push(dir.join(format!("{}{}", name, sfx)));
        }
    }
    out
}

/// Ask the installation which version it is.
///
/// Read-only: runs `<exe> --version` on the first candidate that exists and
/// prints something. `None` means nothing usable was found, which is a
/// normal outcome rather than an error.
pub fn probe_installed(install_dir: &Path) -> Option<InstalledVersion> {
    if install_dir.as_os_str().is_empty() {
        return None;
    }
    for exe in candidates(install_dir) {
        if !exe.is_file() {
            continue;
        }
        let run = match run_with_timeout(Command::new(&exe).arg("--version"), PROBE_TIMEOUT) {
            Ok(r) => r,
            Err(e) => {
                debug!("probe of {} failed: {:#}", exe.display(), e);
                continue;
            }
        };
        if let Some(v) = parse_version_output(run.text()) {
            return Some(v);
        }
    }
    None
}

pub fn parse_version_output(text: &str) -> Option<InstalledVersion> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let version = match VERSION.captures(text) {
        Some(c) => format!("FreeCAD {}", &c[1]),
        None => text.lines().next().unwrap_or_default().trim().to_string(),
    };
    let revision = REVISION
        .iter()
        .find_map(|re| re.captures(text).map(|c| c[1].to_string()));
    Some(InstalledVersion { version, revision })
}

/// CLI command: print the installed version, falling back to the record of
/// the last build this tool applied.
pub fn cmd_detect(install_dir: Option<&Path>) -> Result<()> {
    let store = StateStore::open()?;
    let settings = store.load_settings();
    let dir = install_dir
        .map(Path::to_path_buf)
        .or(settings.install_dir.clone())
        .unwrap_or_default();

    if let Some(v) = probe_installed(&dir) {
        println!("Installed version: {}", v);
    } else if let Some(last) = settings.last_version.or_else(|| store.load_last_version()) {
        println!("Installed version (from record): {}", last);
    } else {
        println!("Installed version: (not detected)");
    }
    Ok(())
}
