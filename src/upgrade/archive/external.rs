use anyhow::{Result, bail};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::debug;

use super::ExtractStrategy;
use crate::process::run_with_timeout;

const TOOL_TIMEOUT: Duration = Duration::from_secs(300);

/// Extraction through a `7z` executable found on the host.
pub struct ExternalTool {
    program: Option<PathBuf>,
    timeout: Duration,
}

impl ExternalTool {
    /// Use whatever `7z` `locate_seven_zip` finds, if any.
    pub fn discover() -> Self {
        ExternalTool {
            program: locate_seven_zip(),
            timeout: TOOL_TIMEOUT,
        }
    }

    pub fn with_program(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        ExternalTool {
            program: Some(program.into()),
            timeout,
        }
    }
}

impl ExtractStrategy for ExternalTool {
    fn name(&self) -> &str {
        "7z"
    }

    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let Some(program) = &self.program else {
            bail!("no 7z executable found");
        };
        debug!("running {} on {}", program.display(), archive.display());
        let mut out_flag = std::ffi::OsString::from("-o");
        out_flag.push(dest);
        let run = run_with_timeout(
            Command::new(program)
                .arg("x")
                .arg("-y")
                .arg(out_flag)
                .arg(archive),
            self.timeout,
        )?;
        if !run.status.success() {
            let diag = match run.stderr.trim() {
                "" => run.stdout.trim(),
                err => err,
            };
            bail!("7z extraction failed ({}): {}", run.status, diag);
        }
        Ok(())
    }
}

/// Search order: bundled `tools/` next to the running executable, the
/// executable's own directory, the command search path, then the tool's
/// default install location.
fn locate_seven_zip() -> Option<PathBuf> {
    let exe_dir = env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf));
    let file = format!("7z{}", env::consts::EXE_SUFFIX);

    if let Some(dir) = &exe_dir {
        for cand in [dir.join("tools").join(&file), dir.join(&file)] {
            if cand.is_file() {
                return Some(cand);
            }
        }
    }
    for name in ["7z", "7z.exe", "7za"] {
        if let Ok(p) = which::which(name) {
            return Some(p);
        }
    }
    let fallback = default_install_location();
    fallback.is_file().then_some(fallback)
}

#[cfg(windows)]
fn default_install_location() -> PathBuf {
    let pf = env::var_os("ProgramFiles")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(r"C:\Program Files"));
    pf.join("7-Zip").join("7z.exe")
}

#[cfg(not(windows))]
fn default_install_location() -> PathBuf {
    PathBuf::from("/usr/lib/p7zip/7z")
}
