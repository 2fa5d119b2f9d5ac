// Portable zip archives of a snapshot directory


use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::snapshot::{
    self, ENTRIES_FILE, MANIFEST_FILE, SnapshotLock, VECTORS_FILE, parent_dir, persistence,
    remove_dir_best_effort, sibling_path,
};
use super::{IndexError, Result};

const SNAPSHOT_FILES: [&str; 3] = [MANIFEST_FILE, VECTORS_FILE, ENTRIES_FILE];

/// Pack the snapshot at `snapshot` into a zip archive.
///
/// Defaults to `<parent>/<name>.zip`. Returns the path that was written.
#[inline]
pub fn export_archive(snapshot: &Path, destination: Option<&Path>) -> Result<PathBuf> {
    let _lock = SnapshotLock::acquire(snapshot)?;
    if !snapshot.is_dir() {
        return Err(IndexError::SnapshotNotFound(snapshot.to_path_buf()));
    }

    let destination = match destination {
        Some(path) => path.to_path_buf(),
        None => default_archive_path(snapshot)?,
    };
    let partial = destination.with_extension(format!("zip.partial-{}", Uuid::new_v4()));

    if let Err(e) = write_archive(snapshot, &partial) {
        if let Err(remove_err) = fs::remove_file(&partial) {
            debug!("No partial archive to remove: {}", remove_err);
        }
        return Err(e);
    }
    fs::rename(&partial, &destination).map_err(persistence("move archive to", &destination))?;

    info!(
        "Exported snapshot {} to {}",
        snapshot.display(),
        destination.display()
    );
    Ok(destination)
}

/// Replace the snapshot at `snapshot` with the contents of a zip archive.
///
/// The archive is unpacked and validated in a staging directory first, so a
/// bad archive leaves the existing snapshot untouched.
#[inline]
pub fn import_archive(source: &Path, snapshot: &Path) -> Result<()> {
    if !source.is_file() {
        return Err(IndexError::SnapshotNotFound(source.to_path_buf()));
    }

    let _lock = SnapshotLock::acquire(snapshot)?;
    snapshot::recover_interrupted_swap(snapshot)?;

    let staging = sibling_path(snapshot, &format!("tmp-{}", Uuid::new_v4()))?;
    let prepared = extract_archive(source, &staging).and_then(|()| {
        let index = snapshot::read_snapshot_files(&staging)?;
        debug!("Archive holds {} valid entries", index.len());
        Ok(())
    });
    if let Err(e) = prepared {
        remove_dir_best_effort(&staging);
        return Err(e);
    }

    snapshot::swap_into_place(&staging, snapshot)?;
    info!(
        "Imported archive {} into {}",
        source.display(),
        snapshot.display()
    );
    Ok(())
}

fn default_archive_path(snapshot: &Path) -> Result<PathBuf> {
    let name = snapshot
        .file_name()
        .ok_or_else(|| IndexError::Archive {
            path: snapshot.to_path_buf(),
            reason: "snapshot path has no final component".to_string(),
        })?
        .to_string_lossy();
    Ok(parent_dir(snapshot).join(format!("{name}.zip")))
}

fn write_archive(snapshot: &Path, destination: &Path) -> Result<()> {
    let archive_error = |reason: String| IndexError::Archive {
        path: destination.to_path_buf(),
        reason,
    };

    let file = File::create(destination).map_err(persistence("create", destination))?;
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for name in SNAPSHOT_FILES {
        let path = snapshot.join(name);
        let mut input = File::open(&path).map_err(persistence("open", &path))?;
        writer
            .start_file(name, options)
            .map_err(|e| archive_error(e.to_string()))?;
        io::copy(&mut input, &mut writer).map_err(persistence("archive", &path))?;
    }

    let buffered = writer.finish().map_err(|e| archive_error(e.to_string()))?;
    let file = buffered
        .into_inner()
        .map_err(|e| persistence("flush", destination)(e.into_error()))?;
    file.sync_all().map_err(persistence("sync", destination))
}

/// Unpack the snapshot files of an archive into `staging`.
///
/// Files may sit at the archive root or inside one top-level directory.
/// Anything else in the archive is ignored.
fn extract_archive(source: &Path, staging: &Path) -> Result<()> {
    let archive_error = |reason: String| IndexError::Archive {
        path: source.to_path_buf(),
        reason,
    };

    let file = File::open(source).map_err(persistence("open", source))?;
    let mut archive =
        ZipArchive::new(BufReader::new(file)).map_err(|e| archive_error(e.to_string()))?;
    fs::create_dir_all(staging).map_err(persistence("create directory", staging))?;

    let mut extracted = Vec::with_capacity(SNAPSHOT_FILES.len());
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| archive_error(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }

        let Some(name) = snapshot_file_name(entry.enclosed_name()) else {
            warn!("Skipping unexpected archive member {}", entry.name());
            continue;
        };
        if extracted.contains(&name) {
            return Err(archive_error(format!("{name} appears more than once")));
        }

        let target = staging.join(name);
        let mut output = File::create(&target).map_err(persistence("create", &target))?;
        io::copy(&mut entry, &mut output).map_err(persistence("extract", &target))?;
        output.sync_all().map_err(persistence("sync", &target))?;
        extracted.push(name);
    }

    if let Some(missing) = SNAPSHOT_FILES.into_iter().find(|f| !extracted.contains(f)) {
        return Err(archive_error(format!("archive has no {missing}")));
    }
    Ok(())
}

fn snapshot_file_name(enclosed: Option<&Path>) -> Option<&'static str> {
    let path = enclosed?;
    if path.components().count() > 2 {
        return None;
    }
    let file_name = path.file_name()?;
    SNAPSHOT_FILES.into_iter().find(|name| file_name == *name)
}
