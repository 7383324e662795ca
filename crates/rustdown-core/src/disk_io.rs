//! Whole-file reads and writes that never expose a half-written revision.

use std::{
    fs::{self, File, Metadata},
    io::{self, Read as _, Write as _},
    path::Path,
    time::{Duration, SystemTime},
};

use tracing::debug;

use crate::error::FileError;

const READ_ATTEMPTS: u32 = 3;
const READ_BACKOFF: Duration = Duration::from_millis(5);

/// Metadata half of a fingerprint: cheap to read, no content access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiskRevision {
    /// Whole seconds since the Unix epoch.
    pub modified_time: u64,
    pub len: u64,
}

impl DiskRevision {
    fn of(meta: &Metadata) -> Self {
        let modified_time = meta
            .modified()
            .ok()
            .and_then(|time| time.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs());
        Self {
            modified_time,
            len: meta.len(),
        }
    }
}

pub fn disk_revision(path: &Path) -> io::Result<DiskRevision> {
    fs::metadata(path).map(|meta| DiskRevision::of(&meta))
}

/// Reads `path` as UTF-8 together with the revision the text belongs to.
///
/// The revision is taken from the open handle and checked again by path once
/// the text is in; a writer that replaced or grew the file in between causes
/// a retry. Files over `limit` bytes are refused without reading them.
pub fn read_utf8(path: &Path, limit: u64) -> Result<(String, DiskRevision), FileError> {
    let io_err = |err| FileError::io(path, err);
    let too_large = |size| FileError::TooLarge {
        path: path.to_path_buf(),
        size,
        limit,
    };

    for attempt in 1..=READ_ATTEMPTS {
        let mut file = File::open(path).map_err(io_err)?;
        let before = DiskRevision::of(&file.metadata().map_err(io_err)?);
        if before.len > limit {
            return Err(too_large(before.len));
        }

        let mut text = String::with_capacity(usize::try_from(before.len).unwrap_or_default());
        read_capped(&mut file, limit, &mut text).map_err(io_err)?;
        let read = text.len() as u64;
        if read > limit {
            return Err(too_large(read));
        }

        let after = disk_revision(path).map_err(io_err)?;
        if before == after && read == after.len {
            return Ok((text, after));
        }
        debug!(path = %path.display(), attempt, "file changed while reading");
        std::thread::sleep(READ_BACKOFF);
    }

    Err(io_err(io::Error::new(
        io::ErrorKind::Interrupted,
        "file kept changing while reading",
    )))
}

/// Reads at most one byte past `limit` so growth after the metadata check is
/// still caught.
fn read_capped(file: &mut File, limit: u64, text: &mut String) -> io::Result<usize> {
    file.take(limit.saturating_add(1)).read_to_string(text)
}

/// Replaces `path` through a temp file in the same directory, creating
/// missing parent directories first.
pub fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    if path.file_name().is_none() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path is missing a file name",
        ));
    }
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".rustdown-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(io::Error::from)?;
    Ok(())
}
