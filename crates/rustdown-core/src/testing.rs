//! In-memory [`FileGateway`] with a controllable clock.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use crate::{
    document::Fingerprint, error::FileError, fingerprint::hash_bytes, gateway::FileGateway,
};

#[derive(Debug, Default)]
pub(crate) struct FakeFiles {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    files: HashMap<PathBuf, (String, u64)>,
    clock: u64,
    writes: usize,
    fail_writes: bool,
    fail_reads: bool,
}

impl FakeFiles {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Creates or replaces a file, advancing the clock by one second.
    pub(crate) fn put(&self, path: impl Into<PathBuf>, content: &str) {
        let mut inner = self.lock();
        inner.clock += 1;
        let mtime = inner.clock;
        inner.files.insert(path.into(), (content.to_owned(), mtime));
    }

    /// Replaces content without touching the modification time.
    pub(crate) fn put_same_time(&self, path: &Path, content: &str) {
        let mut inner = self.lock();
        if let Some(entry) = inner.files.get_mut(path) {
            entry.0 = content.to_owned();
        }
    }

    pub(crate) fn remove(&self, path: &Path) {
        self.lock().files.remove(path);
    }

    pub(crate) fn content(&self, path: &Path) -> Option<String> {
        self.lock().files.get(path).map(|(content, _)| content.clone())
    }

    pub(crate) fn writes(&self) -> usize {
        self.lock().writes
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Makes reads fail while hashing keeps working.
    pub(crate) fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    fn missing(path: &Path) -> FileError {
        FileError::Io {
            path: path.to_path_buf(),
            source: io::Error::from(io::ErrorKind::NotFound),
        }
    }
}

impl FileGateway for FakeFiles {
    fn read_file(&self, path: &Path) -> Result<String, FileError> {
        if self.lock().fail_reads {
            return Err(FileError::Io {
                path: path.to_path_buf(),
                source: io::Error::from(io::ErrorKind::InvalidData),
            });
        }
        self.content(path).ok_or_else(|| Self::missing(path))
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<(), FileError> {
        if self.lock().fail_writes {
            return Err(FileError::Io {
                path: path.to_path_buf(),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            });
        }
        self.put(path, content);
        self.lock().writes += 1;
        Ok(())
    }

    fn hash_file(&self, path: &Path) -> Result<Fingerprint, FileError> {
        let inner = self.lock();
        let (content, mtime) = inner.files.get(path).ok_or_else(|| Self::missing(path))?;
        Ok(Fingerprint {
            hash: hash_bytes(content.as_bytes()),
            modified_time: *mtime,
            file_size: content.len() as u64,
        })
    }
}
