//! Content fingerprints: size, modification time and a SHA-256 digest.

use std::{fs, io, path::Path};

use sha2::{Digest as _, Sha256};

use crate::{
    MAX_FILE_BYTES,
    disk_io::{DiskRevision, disk_revision},
    document::Fingerprint,
};

/// Hash placeholder for files too large to digest; such files are compared
/// by size and modification time only.
pub const LARGE_FILE_HASH: &str = "large_file";

/// Result of comparing a stored fingerprint with the file on disk, in the
/// order the fields are checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Same,
    SizeChanged,
    ModifiedChanged,
    ContentChanged,
}

impl Comparison {
    /// Compares two complete fingerprints, cheapest field first.
    #[must_use]
    pub fn between(expected: &Fingerprint, live: &Fingerprint) -> Self {
        if expected.file_size != live.file_size {
            Self::SizeChanged
        } else if expected.modified_time != live.modified_time {
            Self::ModifiedChanged
        } else if expected.hash != live.hash {
            Self::ContentChanged
        } else {
            Self::Same
        }
    }

    #[must_use]
    pub const fn is_same(self) -> bool {
        matches!(self, Self::Same)
    }
}

#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    if bytes.len() as u64 > MAX_FILE_BYTES {
        return LARGE_FILE_HASH.to_owned();
    }
    format!("{:x}", Sha256::digest(bytes))
}

/// Fingerprint for content that was read at revision `rev`.
#[must_use]
pub fn of_content(content: &str, rev: DiskRevision) -> Fingerprint {
    Fingerprint {
        hash: hash_bytes(content.as_bytes()),
        modified_time: rev.modified_time,
        file_size: rev.len,
    }
}

/// Computes the live fingerprint of `path`.
pub fn fingerprint(path: &Path) -> io::Result<Fingerprint> {
    let rev = disk_revision(path)?;
    if rev.len > MAX_FILE_BYTES {
        return Ok(Fingerprint {
            hash: LARGE_FILE_HASH.to_owned(),
            modified_time: rev.modified_time,
            file_size: rev.len,
        });
    }

    let bytes = fs::read(path)?;
    let after = disk_revision(path)?;
    Ok(Fingerprint {
        hash: hash_bytes(&bytes),
        modified_time: after.modified_time,
        file_size: bytes.len() as u64,
    })
}

/// Compares `expected` against the file at `path`, reading content only when
/// size and modification time both still match.
pub fn compare(path: &Path, expected: &Fingerprint) -> io::Result<Comparison> {
    let rev = disk_revision(path)?;
    if rev.len != expected.file_size {
        return Ok(Comparison::SizeChanged);
    }
    if rev.modified_time != expected.modified_time {
        return Ok(Comparison::ModifiedChanged);
    }
    if expected.hash == LARGE_FILE_HASH && rev.len > MAX_FILE_BYTES {
        return Ok(Comparison::Same);
    }

    let live = fingerprint(path)?;
    Ok(Comparison::between(expected, &live))
}
