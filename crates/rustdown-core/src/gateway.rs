//! Contracts the core consumes for file and dialog access.

use std::path::{Path, PathBuf};

use crate::{
    MAX_FILE_BYTES,
    disk_io::{read_utf8, write_atomic},
    document::Fingerprint,
    error::FileError,
    fingerprint::{self, Comparison},
};

pub const SUPPORTED_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// Reads, writes and fingerprints files by path.
pub trait FileGateway: Send + Sync {
    fn read_file(&self, path: &Path) -> Result<String, FileError>;

    fn write_file(&self, path: &Path, content: &str) -> Result<(), FileError>;

    fn hash_file(&self, path: &Path) -> Result<Fingerprint, FileError>;

    /// Content plus the fingerprint of the same revision.
    fn load(&self, path: &Path) -> Result<(String, Fingerprint), FileError> {
        let content = self.read_file(path)?;
        let fingerprint = self.hash_file(path)?;
        Ok((content, fingerprint))
    }

    /// Compares `expected` with the live file.
    fn compare(&self, path: &Path, expected: &Fingerprint) -> Result<Comparison, FileError> {
        let live = self.hash_file(path)?;
        Ok(Comparison::between(expected, &live))
    }
}

/// Native open/save pickers. `None` means the user cancelled.
pub trait DialogGateway {
    fn pick_open_path(&self) -> Option<PathBuf>;

    fn pick_save_path(&self, suggested_name: &str) -> Option<PathBuf>;
}

/// The local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFiles;

impl LocalFiles {
    fn check_supported(path: &Path) -> Result<(), FileError> {
        let supported = path.extension().is_none_or(|ext| {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        });
        if supported {
            Ok(())
        } else {
            Err(FileError::UnsupportedType {
                path: path.to_path_buf(),
            })
        }
    }
}

impl FileGateway for LocalFiles {
    fn read_file(&self, path: &Path) -> Result<String, FileError> {
        self.load(path).map(|(content, _)| content)
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<(), FileError> {
        Self::check_supported(path)?;
        if path.file_name().is_none() {
            return Err(FileError::MissingFileName {
                path: path.to_path_buf(),
            });
        }
        write_atomic(path, content).map_err(|err| FileError::io(path, err))
    }

    fn hash_file(&self, path: &Path) -> Result<Fingerprint, FileError> {
        fingerprint::fingerprint(path).map_err(|err| FileError::io(path, err))
    }

    fn load(&self, path: &Path) -> Result<(String, Fingerprint), FileError> {
        Self::check_supported(path)?;
        let (content, rev) = read_utf8(path, MAX_FILE_BYTES)?;
        let fingerprint = fingerprint::of_content(&content, rev);
        Ok((content, fingerprint))
    }

    fn compare(&self, path: &Path, expected: &Fingerprint) -> Result<Comparison, FileError> {
        fingerprint::compare(path, expected).map_err(|err| FileError::io(path, err))
    }
}
