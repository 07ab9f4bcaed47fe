//! Installs an exported archive as the full content of the output directory.

use std::fs;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::SyncResult;

/// Replaces `output_dir` with the contents of the zip at `zip_path`.
///
/// This is a destructive replace, not a merge: the directory is removed,
/// recreated empty and then populated. If extraction fails the directory may
/// be left missing or partially populated.
pub fn install_archive(zip_path: &Path, output_dir: &Path) -> SyncResult<usize> {
    let mut archive = zip::ZipArchive::new(File::open(zip_path)?)?;

    if output_dir.exists() {
        fs::remove_dir_all(output_dir)?;
        debug!(path = %output_dir.display(), "Removed previous output directory");
    }
    fs::create_dir_all(output_dir)?;

    let mut extracted = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let outpath = match entry.enclosed_name() {
            Some(path) => output_dir.join(path),
            None => {
                warn!(entry = entry.name(), "Skipping archive entry with unsafe path");
                continue;
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&outpath)?;
        std::io::copy(&mut entry, &mut out)?;
        extracted += 1;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&outpath, fs::Permissions::from_mode(mode))?;
        }
    }

    info!(files = extracted, path = %output_dir.display(), "Extracted archive");
    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, content) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn replaces_rather_than_merges() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("app.zip");
        write_zip(&zip_path, &[("index.html", "<html/>"), ("js/app.js", "run()")]);

        let out = dir.path().join("PlayCanvasApp");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("stale.txt"), "old").unwrap();

        let count = install_archive(&zip_path, &out).unwrap();

        assert_eq!(count, 2);
        assert!(!out.join("stale.txt").exists());
        assert_eq!(fs::read_to_string(out.join("js/app.js")).unwrap(), "run()");
    }

    #[test]
    fn installing_twice_gives_same_tree() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("app.zip");
        write_zip(&zip_path, &[("a.txt", "0123456789")]);
        let out = dir.path().join("out");

        install_archive(&zip_path, &out).unwrap();
        install_archive(&zip_path, &out).unwrap();

        let entries: Vec<_> = fs::read_dir(&out).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(fs::read_to_string(out.join("a.txt")).unwrap(), "0123456789");
    }

    #[test]
    fn corrupt_archive_is_an_error_and_keeps_output() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("broken.zip");
        fs::write(&zip_path, b"definitely not a zip").unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("keep.txt"), "k").unwrap();

        assert!(install_archive(&zip_path, &out).is_err());
        // The archive is opened before anything is deleted.
        assert!(out.join("keep.txt").exists());
    }
}
