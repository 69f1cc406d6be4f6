//! Archive extraction with an ordered chain of fallback strategies.
//!
//! Each [`ExtractStrategy`] is tried in turn until one succeeds. Tool
//! availability varies wildly between hosts, so the chain goes from the
//! in-process decoder, to an external `7z` executable, to the Windows shell.
//! When all of them fail, the first and last diagnostics are reported
//! together so "no extractor available" is distinguishable from
//! "archive is corrupt".

mod external;
mod native;
mod shell;

use anyhow::Result;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::UpdateError;

pub use external::ExternalTool;
pub use native::NativeArchive;
pub use shell::ShellCopy;

/// One way of unpacking an archive into a directory.
pub trait ExtractStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()>;
}

#[derive(Clone)]
pub struct ArchiveExtractor {
    strategies: Vec<Arc<dyn ExtractStrategy>>,
}

impl Default for ArchiveExtractor {
    fn default() -> Self {
        ArchiveExtractor::new(vec![
            Arc::new(NativeArchive),
            Arc::new(ExternalTool::discover()),
            Arc::new(ShellCopy::default()),
        ])
    }
}

impl ArchiveExtractor {
    pub fn new(strategies: Vec<Arc<dyn ExtractStrategy>>) -> Self {
        ArchiveExtractor { strategies }
    }

    /// Unpack `archive` into `dest` and return the root of the content.
    ///
    /// Strategies run in order, stopping at the first success.
    pub fn extract(&self, archive: &Path, dest: &Path) -> Result<PathBuf, UpdateError> {
        let mut failures: Vec<String> = Vec::new();
        for s in &self.strategies {
            debug!("extracting {} with {}", archive.display(), s.name());
            match s.extract(archive, dest) {
                Ok(()) => {
                    return resolve_root(dest).map_err(|e| {
                        UpdateError::filesystem(format!("failed to read {}", dest.display()), e)
                    });
                }
                Err(e) => {
                    warn!("{} extraction failed: {:#}", s.name(), e);
                    failures.push(format!("{}: {:#}", s.name(), e));
                }
            }
        }
        let first = failures
            .first()
            .cloned()
            .unwrap_or_else(|| "no extraction strategy configured".to_string());
        let last = failures.last().cloned().unwrap_or_else(|| first.clone());
        Err(UpdateError::Extraction {
            archive: archive.to_path_buf(),
            first,
            last,
        })
    }
}

/// Archives commonly wrap everything in one top-level folder; if `dir`
/// holds exactly one entry and it is a directory, that is the real root.
pub fn resolve_root(dir: &Path) -> io::Result<PathBuf> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    if entries.len() == 1 {
        let only = entries.remove(0);
        if only.file_type()?.is_dir() {
            return Ok(only.path());
        }
    }
    Ok(dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct Stub {
        name: &'static str,
        ok: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ExtractStrategy for Stub {
        fn name(&self) -> &str {
            self.name
        }
        fn extract(&self, _archive: &Path, dest: &Path) -> Result<()> {
            self.log.lock().unwrap().push(self.name);
            if !self.ok {
                bail!("{} broke", self.name);
            }
            fs::write(dest.join("payload.txt"), self.name)?;
            Ok(())
        }
    }

    fn chain(spec: &[(&'static str, bool)]) -> (ArchiveExtractor, Arc<Mutex<Vec<&'static str>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let strategies = spec
            .iter()
            .map(|&(name, ok)| {
                Arc::new(Stub {
                    name,
                    ok,
                    log: log.clone(),
                }) as Arc<dyn ExtractStrategy>
            })
            .collect();
        (ArchiveExtractor::new(strategies), log)
    }

    #[test]
    fn external_tool_runs_before_shell_and_stops_chain() {
        let td = tempdir().unwrap();
        let (ex, log) = chain(&[("native", false), ("external", true), ("shell", true)]);
        let root = ex.extract(Path::new("a.7z"), td.path()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["native", "external"]);
        assert_eq!(root, td.path());
        assert_eq!(fs::read_to_string(td.path().join("payload.txt")).unwrap(), "external");
    }

    #[test]
    fn exhausted_chain_reports_first_and_last() {
        let td = tempdir().unwrap();
        let (ex, log) = chain(&[("native", false), ("external", false), ("shell", false)]);
        let err = ex.extract(Path::new("a.7z"), td.path()).unwrap_err();
        assert_eq!(*log.lock().unwrap(), vec!["native", "external", "shell"]);
        match err {
            UpdateError::Extraction { first, last, .. } => {
                assert!(first.contains("native broke"), "{first}");
                assert!(last.contains("shell broke"), "{last}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn single_directory_is_unwrapped() {
        let td = tempdir().unwrap();
        fs::create_dir(td.path().join("FreeCAD_weekly")).unwrap();
        assert_eq!(resolve_root(td.path()).unwrap(), td.path().join("FreeCAD_weekly"));
    }

    #[test]
    fn two_entries_keep_extraction_dir() {
        let td = tempdir().unwrap();
        fs::create_dir(td.path().join("bin")).unwrap();
        fs::write(td.path().join("README"), "").unwrap();
        assert_eq!(resolve_root(td.path()).unwrap(), td.path());
    }

    #[test]
    fn single_file_keeps_extraction_dir() {
        let td = tempdir().unwrap();
        fs::write(td.path().join("only.txt"), "").unwrap();
        assert_eq!(resolve_root(td.path()).unwrap(), td.path());
    }
}
