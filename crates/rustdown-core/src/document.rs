use std::{
    borrow::Cow,
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const UNTITLED: &str = "Untitled";

/// Opaque, never reused identifier of an open document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Cheap proxy for "has this file changed": size, mtime and content hash,
/// captured when the content was last loaded from or written to disk.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub hash: String,
    /// Whole seconds since the Unix epoch.
    pub modified_time: u64,
    pub file_size: u64,
}

/// One open buffer, optionally linked to a file on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub content: String,
    pub file_path: Option<PathBuf>,
    pub is_modified: bool,
    pub is_new: bool,
    pub fingerprint: Option<Fingerprint>,
}

impl Document {
    /// A scratch document with no file behind it.
    #[must_use]
    pub fn untitled() -> Self {
        Self {
            id: DocumentId::new(),
            title: UNTITLED.to_owned(),
            content: String::new(),
            file_path: None,
            is_modified: false,
            is_new: true,
            fingerprint: None,
        }
    }

    /// A document freshly read from `path`.
    #[must_use]
    pub fn from_disk(path: PathBuf, content: String, fingerprint: Fingerprint) -> Self {
        Self {
            id: DocumentId::new(),
            title: title_for(&path).into_owned(),
            content,
            file_path: Some(path),
            is_modified: false,
            is_new: false,
            fingerprint: Some(fingerprint),
        }
    }

    /// The on-disk location to reconcile against, if this document has one.
    ///
    /// Scratch documents and documents never hashed are exempt.
    #[must_use]
    pub fn tracked(&self) -> Option<(&Path, &Fingerprint)> {
        if self.is_new {
            return None;
        }
        Some((self.file_path.as_deref()?, self.fingerprint.as_ref()?))
    }

    #[must_use]
    pub fn path_label(&self) -> Cow<'_, str> {
        self.file_path
            .as_ref()
            .map_or_else(|| Cow::Borrowed("Unsaved"), |path| path.to_string_lossy())
    }
}

/// Display name for a path: its base name, or the untitled placeholder.
#[must_use]
pub fn title_for(path: &Path) -> Cow<'_, str> {
    path.file_name()
        .map_or_else(|| Cow::Borrowed(UNTITLED), |name| name.to_string_lossy())
}
