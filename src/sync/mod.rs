use filetime::FileTime;
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::UpdateError;

/// Copy the tree at `source_root` into `dest_root`.
///
/// This is an additive merge, not a mirror:
/// - directories missing under `dest_root` are created (with parents),
/// - every file is copied over its counterpart, keeping its timestamps,
/// - destination entries with no source counterpart are left alone, so
///   user settings and logs inside the install survive an update.
///
/// # Errors
/// The first directory or file that cannot be created/copied aborts the
/// merge with a [`UpdateError::Filesystem`] naming the source and
/// destination pair.
pub fn merge(source_root: &Path, dest_root: &Path) -> Result<(), UpdateError> {
    let mut files = 0usize;
    for entry in WalkDir::new(source_root).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source_root).to_path_buf();
            UpdateError::filesystem(
                format!("failed to walk {}", path.display()),
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
            )
        })?;
        let rel = entry
            .path()
            .strip_prefix(source_root)
            .unwrap_or(entry.path());
        let dst = dest_root.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dst).map_err(|e| UpdateError::copy(entry.path(), &dst, e))?;
        } else {
            copy_file(entry.path(), &dst)?;
            files += 1;
        }
    }
    info!(
        "merged {} files from {} into {}",
        files,
        source_root.display(),
        dest_root.display()
    );
    Ok(())
}

fn copy_file(src: &Path, dst: &Path) -> Result<(), UpdateError> {
    debug!("copy {} -> {}", src.display(), dst.display());
    fs::copy(src, dst).map_err(|e| UpdateError::copy(src, dst, e))?;
    let meta = fs::metadata(src).map_err(|e| UpdateError::copy(src, dst, e))?;
    // Set by path: the copy may carry read-only permission bits.
    filetime::set_file_times(
        dst,
        FileTime::from_last_access_time(&meta),
        FileTime::from_last_modification_time(&meta),
    )
    .map_err(|e| UpdateError::copy(src, dst, e))
}
