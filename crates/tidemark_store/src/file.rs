//! File-backed checkpoint store.

use crate::backend::CheckpointStore;
use crate::checkpoint::{Checkpoint, StreamName};
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Extension of checkpoint files.
const CHECKPOINT_EXT: &str = "sync";

/// Extension of the advisory lock file held while saving.
const LOCK_EXT: &str = "sync.lock";

/// A checkpoint store keeping one JSON file per stream.
///
/// Stream `orders` lives at `<dir>/orders.sync` and is loaded and saved
/// wholesale.
///
/// # Durability
///
/// `save` writes a temporary file in the same directory, syncs it and renames
/// it over the old file, so readers see either the old or the new checkpoint.
///
/// # Concurrency
///
/// Saves from one instance are serialized by an internal lock. Across
/// processes, saves take an advisory exclusive lock on `<stream>.sync.lock`;
/// if another writer holds it the save fails with the transient
/// [`StoreError::Contended`].
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the checkpoint file path for `stream`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidStreamName`] if the name cannot be used
    /// as a file name.
    pub fn path_for(&self, stream: &StreamName) -> StoreResult<PathBuf> {
        validate_name(stream)?;
        Ok(self.dir.join(format!("{stream}.{CHECKPOINT_EXT}")))
    }

    fn lock_path_for(&self, stream: &StreamName) -> PathBuf {
        self.dir.join(format!("{stream}.{LOCK_EXT}"))
    }

    /// Runs `write` while holding both the instance lock and the stream's
    /// advisory file lock.
    fn with_write_lock<T>(
        &self,
        stream: &StreamName,
        write: impl FnOnce(&Path) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let path = self.path_for(stream)?;
        let _guard = self.write_lock.lock();

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path_for(stream))?;

        if let Err(e) = lock_file.try_lock_exclusive() {
            if e.kind() == fs2::lock_contended_error().kind() {
                return Err(StoreError::Contended(stream.to_string()));
            }
            return Err(StoreError::Io(e));
        }

        let result = write(&path);
        FileExt::unlock(&lock_file)?;
        result
    }

    fn write_atomic(&self, path: &Path, checkpoint: &Checkpoint) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(&checkpoint.to_record())?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;

        // Make the rename itself durable.
        if let Err(e) = File::open(&self.dir).and_then(|dir| dir.sync_all()) {
            tracing::debug!(dir = %self.dir.display(), error = %e, "directory fsync failed");
        }
        Ok(())
    }
}

fn validate_name(stream: &StreamName) -> StoreResult<()> {
    let name = stream.as_str();
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains("..")
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(StoreError::InvalidStreamName(name.to_string()));
    }
    Ok(())
}

fn modified_time(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

impl CheckpointStore for FileStore {
    fn load(&self, stream: &StreamName) -> StoreResult<Option<Checkpoint>> {
        let path = self.path_for(stream)?;
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let checkpoint = Checkpoint::from_json(stream.clone(), &json)?;
        Ok(Some(checkpoint.with_modified(modified_time(&path))))
    }

    fn create(&self, checkpoint: &Checkpoint) -> StoreResult<()> {
        self.with_write_lock(checkpoint.stream(), |path| {
            if path.exists() {
                return Err(StoreError::AlreadyExists(checkpoint.stream().to_string()));
            }
            self.write_atomic(path, checkpoint)
        })
    }

    fn save(&self, checkpoint: &mut Checkpoint) -> StoreResult<()> {
        let stream = checkpoint.stream().clone();
        self.with_write_lock(&stream, |path| {
            checkpoint.touch();
            self.write_atomic(path, checkpoint)
        })
    }

    fn delete(&self, stream: &StreamName) -> StoreResult<bool> {
        let removed = self.with_write_lock(stream, |path| match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        })?;
        let lock = self.lock_path_for(stream);
        match fs::remove_file(&lock) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                tracing::debug!(path = %lock.display(), error = %e, "lock file not removed");
            }
            _ => {}
        }
        Ok(removed)
    }

    fn streams(&self) -> StoreResult<Vec<StreamName>> {
        let mut streams = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(CHECKPOINT_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                streams.push(StreamName::new(stem));
            }
        }
        streams.sort();
        Ok(streams)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointValue;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn name(s: &str) -> StreamName {
        StreamName::new(s)
    }

    #[test]
    fn open_creates_dir() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("state").join("sync");

        let store = FileStore::open(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(store.dir(), nested);
    }

    #[test]
    fn load_missing_is_none() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.load(&name("orders")).unwrap().is_none());
    }

    #[test]
    fn save_writes_json_blob() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let ts = Utc.with_ymd_and_hms(2023, 7, 1, 9, 30, 0).unwrap();

        let mut cp = Checkpoint::new(name("orders"), Some(ts.into()), 200);
        store.save(&mut cp).unwrap();

        let raw = fs::read_to_string(dir.path().join("orders.sync")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["value"], "2023-07-01T09:30:00Z");
        assert_eq!(json["type"], "date");
        assert_eq!(json["offset"], 200);
    }

    #[test]
    fn persistence_across_instances() {
        let dir = tempdir().unwrap();

        {
            let store = FileStore::open(dir.path()).unwrap();
            let mut cp = Checkpoint::new(name("orders"), Some(77.into()), 0);
            store.save(&mut cp).unwrap();
        }

        {
            let store = FileStore::open(dir.path()).unwrap();
            let cp = store.load(&name("orders")).unwrap().unwrap();
            assert_eq!(cp.value(), Some(&CheckpointValue::Integer(77)));
            assert_eq!(cp.offset(), 0);
            assert!(cp.modified().is_some());
        }
    }

    #[test]
    fn create_refuses_existing() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let cp = Checkpoint::new(name("orders"), Some(1.into()), 0);

        store.create(&cp).unwrap();
        let err = store.create(&cp).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[test]
    fn rejects_path_like_names() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        for bad in ["", "../escape", "a/b", "a..b", ".hidden", "nul\0byte"] {
            let result = store.load(&name(bad));
            assert!(
                matches!(result, Err(StoreError::InvalidStreamName(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn corrupted_file_is_fatal() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("orders.sync"), "{not json").unwrap();

        let err = store.load(&name("orders")).unwrap_err();
        assert!(matches!(err, StoreError::Json(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn held_lock_is_contention() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let other_writer = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.path().join("orders.sync.lock"))
            .unwrap();
        other_writer.lock_exclusive().unwrap();

        let mut cp = Checkpoint::new(name("orders"), Some(1.into()), 0);
        let err = store.save(&mut cp).unwrap_err();
        assert!(matches!(err, StoreError::Contended(_)));
        assert!(err.is_transient());

        FileExt::unlock(&other_writer).unwrap();
        store.save(&mut cp).unwrap();
    }

    #[test]
    fn delete_and_list() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        for stream in ["users", "orders"] {
            store.create(&Checkpoint::new(name(stream), None, 0)).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(store.streams().unwrap(), vec![name("orders"), name("users")]);
        assert!(store.delete(&name("orders")).unwrap());
        assert!(!store.delete(&name("orders")).unwrap());
        assert_eq!(store.streams().unwrap(), vec![name("users")]);
    }

    #[test]
    fn delete_removes_lock_file() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let lock = dir.path().join("orders.sync.lock");

        store.create(&Checkpoint::new(name("orders"), Some(1.into()), 0)).unwrap();
        assert!(lock.exists());

        assert!(store.delete(&name("orders")).unwrap());
        assert!(!lock.exists());
        assert!(!dir.path().join("orders.sync").exists());
    }
}
