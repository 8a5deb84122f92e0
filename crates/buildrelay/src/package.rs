//! Packaging of the working tree as the build source
//!
//! The tree is walked with `.gitignore` rules applied and written into an
//! in-memory zip archive with paths relative to the source directory.

use crate::errors::CliError;
use bytes::Bytes;
use ignore::WalkBuilder;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::write::SimpleFileOptions;

/// Zip `root`, skipping ignored files, the `.git` directory and any path in
/// `exclude`.
///
/// # Errors
/// Returns [`CliError::Package`] if the tree cannot be read or written.
pub fn package_source(root: &Path, exclude: &[PathBuf]) -> Result<Bytes, CliError> {
    let fail = |message: String| CliError::Package {
        path: root.display().to_string(),
        message,
    };

    if !root.is_dir() {
        return Err(fail("not a directory".to_string()));
    }
    let exclude: Vec<PathBuf> = exclude
        .iter()
        .map(|p| if p.is_absolute() { p.clone() } else { root.join(p) })
        .collect();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .require_git(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            entry.file_name() != ".git" && !exclude.iter().any(|p| entry.path() == p.as_path())
        })
        .build();

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let mut files = 0usize;
    for entry in walker {
        let entry = entry.map_err(|e| fail(e.to_string()))?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        let Some(name) = archive_name(root, path) else {
            continue;
        };

        let mut options = SimpleFileOptions::default();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = entry
                .metadata()
                .map_err(|e| fail(e.to_string()))?
                .permissions()
                .mode();
            options = options.unix_permissions(mode);
        }

        let contents = std::fs::read(path).map_err(|e| fail(format!("{}: {e}", path.display())))?;
        writer
            .start_file(name, options)
            .map_err(|e| fail(e.to_string()))?;
        writer
            .write_all(&contents)
            .map_err(|e| fail(e.to_string()))?;
        files += 1;
    }

    let archive = writer.finish().map_err(|e| fail(e.to_string()))?.into_inner();
    debug!(root = %root.display(), files, bytes = archive.len(), "Packaged source tree");
    Ok(Bytes::from(archive))
}

/// `/`-separated path of `path` below `root`.
fn archive_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    (!parts.is_empty()).then(|| parts.join("/"))
}
