//! Durable persistence for the TUID allocator's high-water mark (C1).
//!
//! A single integer needs to survive a restart without ever going backward
//! (I6). The write path follows the WAL "durability point" discipline the
//! teacher's durability crate uses for its log segments: write to a
//! temporary file, `fsync`, then rename over the target so a crash mid-write
//! never leaves a torn value on disk.

#![warn(missing_docs)]
#![warn(clippy::all)]

use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tuid_core::error::{Error, Result};
use tuid_core::traits::CounterPersistence;

/// File-backed [`CounterPersistence`].
///
/// Holds an internal lock so concurrent `persist` calls from multiple
/// allocator threads serialize rather than race on the rename.
#[derive(Debug)]
pub struct FileCounterStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCounterStore {
    /// Open (without yet reading) a counter store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileCounterStore {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone();
        let mut file_name = tmp.file_name().unwrap_or_default().to_os_string();
        file_name.push(".tmp");
        tmp.set_file_name(file_name);
        tmp
    }
}

impl CounterPersistence for FileCounterStore {
    fn load(&self) -> Result<u64> {
        match File::open(&self.path) {
            Ok(mut file) => {
                let mut contents = String::new();
                file.read_to_string(&mut contents)
                    .map_err(|e| Error::Fatal(format!("reading counter file: {e}")))?;
                let trimmed = contents.trim();
                if trimmed.is_empty() {
                    return Ok(0);
                }
                trimmed
                    .parse::<u64>()
                    .map_err(|e| Error::Fatal(format!("corrupt counter file: {e}")))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(Error::Fatal(format!("opening counter file: {e}"))),
        }
    }

    fn persist(&self, high_water_mark: u64) -> Result<()> {
        let _guard = self.write_lock.lock();
        let tmp_path = self.tmp_path();
        let mut tmp = File::create(&tmp_path)
            .map_err(|e| Error::Fatal(format!("creating counter tmp file: {e}")))?;
        tmp.write_all(high_water_mark.to_string().as_bytes())
            .map_err(|e| Error::Fatal(format!("writing counter tmp file: {e}")))?;
        tmp.sync_all()
            .map_err(|e| Error::Fatal(format!("fsyncing counter tmp file: {e}")))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|e| Error::Fatal(format!("renaming counter file: {e}")))?;
        if let Some(dir) = self.path.parent() {
            sync_dir(dir)?;
        }
        tracing::debug!(high_water_mark, "persisted TUID counter");
        Ok(())
    }
}

fn sync_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    File::open(dir)
        .and_then(|f| f.sync_all())
        .map_err(|e| Error::Fatal(format!("fsyncing counter directory: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_returns_zero_when_file_absent() {
        let dir = tempdir().unwrap();
        let store = FileCounterStore::new(dir.path().join("counter"));
        assert_eq!(store.load().unwrap(), 0);
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = FileCounterStore::new(dir.path().join("counter"));
        store.persist(42).unwrap();
        assert_eq!(store.load().unwrap(), 42);
        store.persist(100).unwrap();
        assert_eq!(store.load().unwrap(), 100);
    }
}
