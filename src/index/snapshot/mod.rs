// Snapshot persistence for the vector index
//
// Layout of a snapshot directory:
//   manifest.json  - format version, dimension, entry count, creation time
//   vectors.bin    - entry_count * dimension little-endian f32 values
//   entries.jsonl  - one {id, chunk} object per line, in insertion order


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{IndexEntry, IndexError, Result, VectorIndex};
use crate::embeddings::chunking::Chunk;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const VECTORS_FILE: &str = "vectors.bin";
pub const ENTRIES_FILE: &str = "entries.jsonl";
pub const FORMAT_VERSION: u32 = 1;

const LOCK_RETRY_ATTEMPTS: u32 = 3;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(200);
const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
/// Locks older than this are assumed to belong to a crashed writer
const STALE_LOCK_AGE: Duration = Duration::from_secs(120);

const STAGING_TAG: &str = "tmp";
const BACKUP_TAG: &str = "old";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub dimension: Option<usize>,
    pub entry_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct EntryRecordRef<'a> {
    id: &'a Uuid,
    chunk: &'a Chunk,
}

#[derive(Deserialize)]
struct EntryRecord {
    id: Uuid,
    chunk: Chunk,
}

/// Exclusive hold on a snapshot location, released when dropped.
///
/// The lock is a sibling file `.<name>.lock` created with `create_new`, so
/// it also excludes writers in other processes.
#[derive(Debug)]
pub struct SnapshotLock {
    lock_path: PathBuf,
}

impl SnapshotLock {
    #[inline]
    pub fn acquire(snapshot: &Path) -> Result<Self> {
        Self::acquire_with(snapshot, LOCK_RETRY_ATTEMPTS, LOCK_RETRY_DELAY)
    }

    /// Acquire with bounded retries, backing off exponentially from `delay`
    #[inline]
    pub fn acquire_with(snapshot: &Path, attempts: u32, delay: Duration) -> Result<Self> {
        let parent = parent_dir(snapshot);
        fs::create_dir_all(&parent).map_err(persistence("create directory", &parent))?;
        let lock_path = sibling_path(snapshot, "lock")?;

        let attempts = attempts.max(1);
        let mut attempt = 0;
        while attempt < attempts {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut file) => {
                    writeln!(file, "{} {}", std::process::id(), Utc::now().to_rfc3339())
                        .and_then(|()| file.sync_all())
                        .map_err(persistence("write lock", &lock_path))?;
                    debug!("Acquired snapshot lock {}", lock_path.display());
                    return Ok(Self { lock_path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    // Taking over a stale lock does not use up an attempt
                    if is_stale(&lock_path) && remove_stale_lock(&lock_path) {
                        continue;
                    }
                    attempt += 1;
                    warn!(
                        "Snapshot {} is locked, attempt {}/{}",
                        snapshot.display(),
                        attempt,
                        attempts
                    );
                    if attempt < attempts {
                        std::thread::sleep(delay * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1));
                    }
                }
                Err(e) => return Err(persistence("create lock", &lock_path)(e)),
            }
        }

        Err(IndexError::SnapshotLocked(snapshot.to_path_buf()))
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for SnapshotLock {
    #[inline]
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock_path) {
            warn!(
                "Failed to release snapshot lock {}: {}",
                self.lock_path.display(),
                e
            );
        }
    }
}

/// Returns true once the lock file is gone, whoever removed it
fn remove_stale_lock(lock_path: &Path) -> bool {
    warn!("Removing stale snapshot lock {}", lock_path.display());
    match fs::remove_file(lock_path) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!("Failed to remove stale lock: {}", e);
            false
        }
    }
}

fn is_stale(lock_path: &Path) -> bool {
    fs::metadata(lock_path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > STALE_LOCK_AGE)
}

/// Write `index` as the snapshot at `path`, replacing any previous one.
///
/// The new snapshot is fully written and synced in a staging directory
/// before it is swapped in, so the last good snapshot survives a failure.
#[inline]
pub fn write_snapshot(index: &VectorIndex, path: &Path) -> Result<()> {
    let _lock = SnapshotLock::acquire(path)?;
    recover_interrupted_swap(path)?;

    let staging = sibling_path(path, &format!("{STAGING_TAG}-{}", Uuid::new_v4()))?;
    if let Err(e) = write_files(index, &staging) {
        error!("Failed to write snapshot staging directory: {}", e);
        remove_dir_best_effort(&staging);
        return Err(e);
    }

    swap_into_place(&staging, path)?;
    info!(
        "Persisted snapshot with {} entries to {}",
        index.len(),
        path.display()
    );
    Ok(())
}

/// Read the snapshot at `path`.
///
/// A missing snapshot with no moved-aside copy to restore is reported
/// before any lock is taken, so reading never creates files.
#[inline]
pub fn read_snapshot(path: &Path) -> Result<VectorIndex> {
    if !path.is_dir() && backups(path)?.is_empty() {
        return Err(IndexError::SnapshotNotFound(path.to_path_buf()));
    }
    let _lock = SnapshotLock::acquire(path)?;
    recover_interrupted_swap(path)?;
    read_snapshot_files(path)
}

/// Read and validate a snapshot directory without taking its lock
pub(crate) fn read_snapshot_files(path: &Path) -> Result<VectorIndex> {
    if !path.is_dir() {
        return Err(IndexError::SnapshotNotFound(path.to_path_buf()));
    }
    let corrupt = |reason: String| IndexError::CorruptSnapshot {
        path: path.to_path_buf(),
        reason,
    };

    let manifest = read_manifest(path)?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(corrupt(format!(
            "unsupported format version {}",
            manifest.format_version
        )));
    }

    let dimension = match (manifest.dimension, manifest.entry_count) {
        (Some(0), _) => return Err(corrupt("dimension is zero".to_string())),
        (None, count) if count > 0 => {
            return Err(corrupt(format!("{count} entries but no dimension")));
        }
        (dimension, _) => dimension.unwrap_or(0),
    };

    let vectors_path = path.join(VECTORS_FILE);
    let raw = fs::read(&vectors_path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => corrupt(format!("{VECTORS_FILE} is missing")),
        _ => persistence("read", &vectors_path)(e),
    })?;
    let expected_bytes = manifest
        .entry_count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(size_of::<f32>()))
        .ok_or_else(|| corrupt("entry count overflows".to_string()))?;
    if raw.len() != expected_bytes {
        return Err(corrupt(format!(
            "{VECTORS_FILE} holds {} bytes, expected {expected_bytes}",
            raw.len()
        )));
    }

    let records = read_entry_records(path)?;
    if records.len() != manifest.entry_count {
        return Err(corrupt(format!(
            "{ENTRIES_FILE} holds {} entries, manifest says {}",
            records.len(),
            manifest.entry_count
        )));
    }

    let row_bytes = dimension * size_of::<f32>();
    let entries = records
        .into_iter()
        .enumerate()
        .map(|(row, record)| {
            record
                .chunk
                .validate()
                .map_err(|e| corrupt(format!("entry {row}: {e}")))?;
            let bytes = &raw[row * row_bytes..(row + 1) * row_bytes];
            let vector = bytes
                .chunks_exact(size_of::<f32>())
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            Ok(IndexEntry {
                id: record.id,
                vector,
                chunk: record.chunk,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let index = VectorIndex::restore(manifest.dimension, entries)
        .map_err(|e| corrupt(e.to_string()))?;
    debug!(
        "Read snapshot {} ({} entries, dimension {:?})",
        path.display(),
        index.len(),
        index.dimension()
    );
    Ok(index)
}

/// Parse the manifest of a snapshot directory
#[inline]
pub fn read_manifest(path: &Path) -> Result<Manifest> {
    let manifest_path = path.join(MANIFEST_FILE);
    let content = fs::read_to_string(&manifest_path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => IndexError::CorruptSnapshot {
            path: path.to_path_buf(),
            reason: format!("{MANIFEST_FILE} is missing"),
        },
        _ => persistence("read", &manifest_path)(e),
    })?;

    serde_json::from_str(&content).map_err(|e| IndexError::CorruptSnapshot {
        path: path.to_path_buf(),
        reason: format!("{MANIFEST_FILE} is invalid: {e}"),
    })
}

fn read_entry_records(path: &Path) -> Result<Vec<EntryRecord>> {
    let entries_path = path.join(ENTRIES_FILE);
    let file = File::open(&entries_path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => IndexError::CorruptSnapshot {
            path: path.to_path_buf(),
            reason: format!("{ENTRIES_FILE} is missing"),
        },
        _ => persistence("open", &entries_path)(e),
    })?;

    let mut records = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(persistence("read", &entries_path))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| IndexError::CorruptSnapshot {
            path: path.to_path_buf(),
            reason: format!("{ENTRIES_FILE} line {}: {e}", number + 1),
        })?;
        records.push(record);
    }
    Ok(records)
}

fn write_files(index: &VectorIndex, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(persistence("create directory", dir))?;

    let vectors_path = dir.join(VECTORS_FILE);
    write_synced(&vectors_path, |w| {
        for entry in index.entries() {
            for value in &entry.vector {
                w.write_all(&value.to_le_bytes())?;
            }
        }
        Ok(())
    })?;

    let entries_path = dir.join(ENTRIES_FILE);
    write_synced(&entries_path, |w| {
        for entry in index.entries() {
            let record = EntryRecordRef {
                id: &entry.id,
                chunk: &entry.chunk,
            };
            serde_json::to_writer(&mut *w, &record)?;
            w.write_all(b"\n")?;
        }
        Ok(())
    })?;

    // Manifest last: a staging directory without one never validates
    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        dimension: index.dimension(),
        entry_count: index.len(),
        created_at: Utc::now(),
    };
    let manifest_path = dir.join(MANIFEST_FILE);
    write_synced(&manifest_path, |w| {
        serde_json::to_writer_pretty(&mut *w, &manifest)?;
        Ok(())
    })?;

    sync_dir(dir);
    Ok(())
}

fn write_synced<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let file = File::create(path).map_err(persistence("create", path))?;
    let mut writer = BufWriter::new(file);
    write(&mut writer).map_err(persistence("write", path))?;
    let file = writer
        .into_inner()
        .map_err(|e| persistence("flush", path)(e.into_error()))?;
    file.sync_all().map_err(persistence("sync", path))
}

/// Move a fully written directory to `path`, keeping the previous snapshot
/// aside until the new one is in place
pub(crate) fn swap_into_place(staging: &Path, path: &Path) -> Result<()> {
    let backup = if path.exists() {
        let backup = sibling_path(path, &format!("{BACKUP_TAG}-{}", Uuid::new_v4()))?;
        fs::rename(path, &backup).map_err(persistence("move aside", path))?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = fs::rename(staging, path) {
        if let Some(backup) = &backup {
            if let Err(restore_err) = fs::rename(backup, path) {
                error!(
                    "Failed to restore previous snapshot from {}: {}",
                    backup.display(),
                    restore_err
                );
            }
        }
        remove_dir_best_effort(staging);
        return Err(persistence("swap in", path)(e));
    }

    sync_dir(&parent_dir(path));

    if let Some(backup) = backup {
        remove_dir_best_effort(&backup);
    }
    Ok(())
}

/// Clean up after a writer that died mid-swap.
///
/// Leftover staging directories are removed. If the snapshot itself is
/// missing but a moved-aside copy exists, that copy is restored.
pub(crate) fn recover_interrupted_swap(path: &Path) -> Result<()> {
    let parent = parent_dir(path);
    let staging_prefix = format!(".{}.{STAGING_TAG}-", snapshot_name(path)?);

    if let Ok(listing) = fs::read_dir(&parent) {
        for item in listing.flatten() {
            if item.file_name().to_string_lossy().starts_with(&staging_prefix) {
                warn!("Removing leftover staging directory {}", item.path().display());
                remove_dir_best_effort(&item.path());
            }
        }
    }

    let mut backups = backups(path)?;
    if !path.exists() {
        if let Some(newest) = backups.pop() {
            info!(
                "Restoring snapshot {} from interrupted swap",
                path.display()
            );
            fs::rename(&newest, path).map_err(persistence("restore", path))?;
        }
    }

    for backup in backups {
        remove_dir_best_effort(&backup);
    }
    Ok(())
}

/// Moved-aside copies of the snapshot, oldest first by modification time
fn backups(path: &Path) -> Result<Vec<PathBuf>> {
    let prefix = format!(".{}.{BACKUP_TAG}-", snapshot_name(path)?);
    let Ok(listing) = fs::read_dir(parent_dir(path)) else {
        return Ok(Vec::new());
    };

    let mut found: Vec<(SystemTime, PathBuf)> = listing
        .flatten()
        .filter(|item| item.file_name().to_string_lossy().starts_with(&prefix))
        .map(|item| {
            let modified = item
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, item.path())
        })
        .collect();
    found.sort();
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

fn snapshot_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| IndexError::Persistence {
            operation: "resolve",
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "path has no final component"),
        })
}

/// Hidden sibling of the snapshot directory: `.<name>.<suffix>`
pub(crate) fn sibling_path(path: &Path, suffix: &str) -> Result<PathBuf> {
    let name = snapshot_name(path)?;
    Ok(parent_dir(path).join(format!(".{name}.{suffix}")))
}

pub(crate) fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

pub(crate) fn persistence(
    operation: &'static str,
    path: &Path,
) -> impl FnOnce(io::Error) -> IndexError {
    let path = path.to_path_buf();
    move |source| IndexError::Persistence {
        operation,
        path,
        source,
    }
}

pub(crate) fn remove_dir_best_effort(dir: &Path) {
    if dir.exists() {
        if let Err(e) = fs::remove_dir_all(dir) {
            warn!("Failed to remove {}: {}", dir.display(), e);
        }
    }
}

fn sync_dir(dir: &Path) {
    // Directory fsync is unsupported on some platforms
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}
