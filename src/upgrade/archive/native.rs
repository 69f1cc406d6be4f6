use anyhow::{Context, Result, anyhow, bail};
use flate2::read::GzDecoder;
use std::fs;
use std::io;
use std::path::Path;

use super::ExtractStrategy;

/// In-process decoding, picked by file name: `.7z`, `.zip`, `.tar.gz`/`.tgz`.
pub struct NativeArchive;

impl ExtractStrategy for NativeArchive {
    fn name(&self) -> &str {
        "native"
    }

    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let fname = archive
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        fs::create_dir_all(dest)?;
        if fname.ends_with(".7z") {
            sevenz_rust::decompress_file(archive, dest)
                .map_err(|e| anyhow!("7z decode of {} failed: {}", archive.display(), e))
        } else if fname.ends_with(".zip") {
            unzip(archive, dest)
        } else if fname.ends_with(".tar.gz") || fname.ends_with(".tgz") {
            let f = fs::File::open(archive)?;
            let mut ar = tar::Archive::new(GzDecoder::new(f));
            ar.unpack(dest)
                .with_context(|| format!("failed to unpack {}", archive.display()))
        } else {
            bail!("unsupported archive format: {}", archive.display())
        }
    }
}

fn unzip(archive: &Path, dest: &Path) -> Result<()> {
    let f = fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(f)?;
    for i in 0..zip.len() {
        let mut file = zip.by_index(i)?;
        // entries escaping `dest` are skipped
        let Some(rel) = file.enclosed_name().map(|p| p.to_path_buf()) else {
            continue;
        };
        let out = dest.join(rel);
        if file.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut of = fs::File::create(&out)?;
        io::copy(&mut file, &mut of)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                fs::set_permissions(&out, fs::Permissions::from_mode(mode))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upgrade::archive::resolve_root;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn unpacks_zip_with_nested_dirs() {
        let td = tempdir().unwrap();
        let archive = td.path().join("build.zip");
        {
            let f = fs::File::create(&archive).unwrap();
            let mut w = zip::ZipWriter::new(f);
            let opts = zip::write::FileOptions::default();
            w.add_directory("FreeCAD/bin/", opts).unwrap();
            w.start_file("FreeCAD/bin/FreeCAD.exe", opts).unwrap();
            w.write_all(b"exe").unwrap();
            w.finish().unwrap();
        }
        let out = td.path().join("out");
        NativeArchive.extract(&archive, &out).unwrap();
        assert_eq!(
            fs::read(out.join("FreeCAD/bin/FreeCAD.exe")).unwrap(),
            b"exe"
        );
    }

    #[test]
    fn unpacks_tar_gz() {
        let td = tempdir().unwrap();
        let archive = td.path().join("build.tar.gz");
        {
            let f = fs::File::create(&archive).unwrap();
            let gz = GzEncoder::new(f, Compression::default());
            let mut b = tar::Builder::new(gz);
            let data = b"hello";
            let mut h = tar::Header::new_gnu();
            h.set_size(data.len() as u64);
            h.set_mode(0o644);
            h.set_cksum();
            b.append_data(&mut h, "pkg/readme.txt", &data[..]).unwrap();
            b.into_inner().unwrap().finish().unwrap();
        }
        let out = td.path().join("out");
        NativeArchive.extract(&archive, &out).unwrap();
        assert_eq!(fs::read(out.join("pkg/readme.txt")).unwrap(), b"hello");
    }

    #[test]
    fn unpacks_7z_and_root_unwraps_single_folder() {
        let td = tempdir().unwrap();
        let stage = td.path().join("stage");
        let top = stage.join("FreeCAD_weekly-2024.03.15-Windows-x86_64-py311");
        fs::create_dir_all(top.join("bin")).unwrap();
        fs::write(top.join("bin/FreeCAD.exe"), b"exe").unwrap();
        fs::write(top.join("README.txt"), b"weekly").unwrap();
        let archive = td.path().join("build.7z");
        sevenz_rust::compress_to_path(&stage, &archive).unwrap();

        let out = td.path().join("out");
        NativeArchive.extract(&archive, &out).unwrap();

        let root = resolve_root(&out).unwrap();
        assert_eq!(root, out.join("FreeCAD_weekly-2024.03.15-Windows-x86_64-py311"));
        assert_eq!(fs::read(root.join("bin/FreeCAD.exe")).unwrap(), b"exe");
        assert_eq!(fs::read(root.join("README.txt")).unwrap(), b"weekly");
    }

    #[test]
    fn corrupt_7z_fails() {
        let td = tempdir().unwrap();
        let archive = td.path().join("broken.7z");
        fs::write(&archive, b"definitely not a 7z archive").unwrap();
        assert!(NativeArchive.extract(&archive, &td.path().join("out")).is_err());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let td = tempdir().unwrap();
        let archive = td.path().join("build.rar");
        fs::write(&archive, b"").unwrap();
        let err = NativeArchive.extract(&archive, td.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported archive format"));
    }
}
