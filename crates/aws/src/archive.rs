//! ZIP artifact extraction

use buildrelay_core::{Error, Result};
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::debug;

fn zip_error(e: &zip::result::ZipError) -> Error {
    Error::remote("ExtractArtifacts", format!("invalid zip archive: {e}"))
}

/// Extract a zip archive into `dest`, overwriting files of the same name.
///
/// Content already in `dest` that the archive does not name is left alone,
/// so `dest` may be the working tree itself. Entries that would escape the
/// destination are skipped. Returns the number of files written.
///
/// # Errors
/// Returns an error if the archive is malformed or the filesystem rejects a
/// write. A malformed archive is detected before anything is written.
pub fn extract_zip(data: &[u8], dest: &Path) -> Result<usize> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data)).map_err(|e| zip_error(&e))?;
    std::fs::create_dir_all(dest)?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(|e| zip_error(&e))?;

        let Some(outpath) = file.enclosed_name().map(|path| dest.join(path)) else {
            debug!(entry = file.name(), "Skipping zip entry outside the destination");
            continue;
        };

        if file.is_dir() {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(p) = outpath.parent() {
            std::fs::create_dir_all(p)?;
        }
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        std::fs::write(&outpath, &content)?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))?;
        }
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extracts_nested_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join(".codebuild_artifacts");

        let written = extract_zip(
            &archive(&[("report.xml", "<ok/>"), ("bin/app", "ELF")]),
            &dest,
        )
        .unwrap();

        assert_eq!(written, 2);
        assert_eq!(std::fs::read_to_string(dest.join("report.xml")).unwrap(), "<ok/>");
        assert_eq!(std::fs::read_to_string(dest.join("bin/app")).unwrap(), "ELF");
    }

    #[test]
    fn test_unrelated_files_survive_extraction() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("out");
        std::fs::create_dir_all(dest.join("src")).unwrap();
        std::fs::write(dest.join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(dest.join("report.xml"), "<stale/>").unwrap();

        extract_zip(&archive(&[("report.xml", "<ok/>")]), &dest).unwrap();

        assert_eq!(
            std::fs::read_to_string(dest.join("src/main.rs")).unwrap(),
            "fn main() {}"
        );
        assert_eq!(std::fs::read_to_string(dest.join("report.xml")).unwrap(), "<ok/>");
    }

    #[test]
    fn test_extracts_into_current_directory_spelling() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("buildspec.yml"), "version: 0.2").unwrap();
        let dest = tmp.path().join(".");

        let written = extract_zip(&archive(&[("dist/app.tar", "tar")]), &dest).unwrap();

        assert_eq!(written, 1);
        assert!(tmp.path().join("buildspec.yml").exists());
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("dist/app.tar")).unwrap(),
            "tar"
        );
    }

    #[test]
    fn test_skips_entries_escaping_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("out");

        let written = extract_zip(&archive(&[("../evil.txt", "x"), ("ok.txt", "y")]), &dest).unwrap();

        assert_eq!(written, 1);
        assert!(!tmp.path().join("evil.txt").exists());
    }

    #[test]
    fn test_malformed_archive_leaves_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("keep.txt"), "keep").unwrap();

        assert!(extract_zip(b"not a zip", &dest).is_err());
        assert!(dest.join("keep.txt").exists());
    }
}
