//! Zip export of the virtual project

use super::model::FileModel;
use crate::Result;
use std::fs;
use std::io::{Seek, Write};
use std::path::Path;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Write every file of `model` into a zip archive on `writer`
///
/// Each file's path becomes its entry path, so nested paths produce
/// directory-like entries. Returns the writer once the archive is finished.
pub fn write_archive<W: Write + Seek>(model: &FileModel, writer: W) -> Result<W> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for file in model.iter() {
        let Some(entry) = entry_name(&file.path) else {
            warn!("Skipping {:?}, not a relative path inside the project", file.path);
            continue;
        };
        zip.start_file(entry, options)?;
        zip.write_all(file.content.as_bytes())?;
    }

    Ok(zip.finish()?)
}

/// Archive entry name for a project path
///
/// Leading slashes and `.` segments are dropped. Paths that climb out with
/// `..` or end up empty have no entry.
fn entry_name(path: &str) -> Option<String> {
    let mut parts = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => return None,
            part => parts.push(part),
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}

/// Export `model` to a zip file at `path`
pub fn export_archive<P: AsRef<Path>>(model: &FileModel, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    write_archive(model, file)?;
    info!("Exported {} files to {}", model.len(), path.display());
    Ok(())
}
