//! Session snapshots and the key-value store they live in.
//!
//! Snapshots are plain versioned TOML documents. Saving is best effort and
//! never fails the caller; loading treats anything unreadable as "no
//! session" so startup always has something to show.

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
    time::SystemTime,
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};

use crate::{
    disk_io::write_atomic,
    document::{Document, DocumentId, Fingerprint},
    error::StoreError,
    gateway::FileGateway,
    store::DocumentStore,
};

pub const SESSION_KEY: &str = "session";
pub const SESSION_VERSION: u32 = 1;

/// Durable string storage addressed by key.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Loads `T` stored under `key`, checking its `version` against `supported`.
pub fn get_versioned<T>(
    store: &dyn KeyValueStore,
    key: &str,
    supported: u32,
) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned + Versioned,
{
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    let value: T = toml::from_str(&raw).map_err(|source| StoreError::Parse {
        key: key.to_owned(),
        source,
    })?;
    if value.version() > supported {
        return Err(StoreError::UnsupportedVersion {
            key: key.to_owned(),
            found: value.version(),
            supported,
        });
    }
    Ok(Some(value))
}

pub fn set_serialized<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = toml::to_string(value).map_err(|source| StoreError::Serialize {
        key: key.to_owned(),
        source,
    })?;
    store.set(key, &raw)
}

/// Stored shapes that carry a schema version.
pub trait Versioned {
    fn version(&self) -> u32;
}

const fn current_version() -> u32 {
    SESSION_VERSION
}

/// One `<key>.toml` file per key inside a directory.
#[derive(Clone, Debug)]
pub struct TomlFileStore {
    dir: PathBuf,
}

impl TomlFileStore {
    #[must_use]
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// `<config dir>/rustdown`, or the working directory when the platform
    /// has no config dir.
    #[must_use]
    pub fn in_config_dir() -> Self {
        let dir = dirs::config_dir().map_or_else(|| PathBuf::from("."), |dir| dir.join("rustdown"));
        Self::new(dir)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.toml"))
    }
}

impl KeyValueStore for TomlFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_owned(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        write_atomic(&self.path_for(key), value).map_err(|source| StoreError::Io {
            key: key.to_owned(),
            source,
        })
    }
}

/// Volatile store for tests and headless use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// Persisted form of one document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    #[serde(default)]
    pub title: String,
    /// Only kept for scratch documents; linked ones are re-read on restore.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(default)]
    pub is_modified: bool,
    #[serde(default = "default_true")]
    pub is_new: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
}

const fn default_true() -> bool {
    true
}

impl From<&Document> for DocumentRecord {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id,
            title: doc.title.clone(),
            content: doc.is_new.then(|| doc.content.clone()),
            file_path: doc.file_path.clone(),
            is_modified: doc.is_modified,
            is_new: doc.is_new,
            fingerprint: if doc.is_new {
                None
            } else {
                doc.fingerprint.clone()
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default = "current_version")]
    pub version: u32,
    /// Unix seconds.
    #[serde(default)]
    pub saved_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_id: Option<DocumentId>,
    #[serde(default)]
    pub documents: Vec<DocumentRecord>,
}

impl Versioned for SessionSnapshot {
    fn version(&self) -> u32 {
        self.version
    }
}

impl SessionSnapshot {
    #[must_use]
    pub fn capture(store: &DocumentStore) -> Self {
        Self {
            version: SESSION_VERSION,
            saved_at: now_secs(),
            active_id: store.active_id(),
            documents: store.documents().iter().map(DocumentRecord::from).collect(),
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Reads and writes the session snapshot under [`SESSION_KEY`].
pub struct SessionService {
    store: Box<dyn KeyValueStore>,
}

impl SessionService {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    /// Best effort: failures are logged, never returned.
    pub fn save_snapshot(&self, snapshot: &SessionSnapshot) {
        match set_serialized(self.store(), SESSION_KEY, snapshot) {
            Ok(()) => debug!(documents = snapshot.documents.len(), "session saved"),
            Err(err) => warn!("failed to save session: {err}"),
        }
    }

    /// `None` when nothing is stored or the stored value cannot be used.
    #[must_use]
    pub fn load_snapshot(&self) -> Option<SessionSnapshot> {
        match get_versioned::<SessionSnapshot>(self.store(), SESSION_KEY, SESSION_VERSION) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("ignoring stored session: {err}");
                None
            }
        }
    }
}

/// Result of [`restore`].
#[derive(Debug)]
pub struct Restored {
    pub store: DocumentStore,
    /// Linked documents whose file could not be read; they were demoted to
    /// empty scratch documents.
    pub missing: Vec<(DocumentId, PathBuf)>,
}

/// Rebuilds the document store from a snapshot, re-reading every linked
/// document from disk. Substitutes a single empty document when there is
/// nothing usable to restore.
pub fn restore(snapshot: Option<SessionSnapshot>, files: &dyn FileGateway) -> Restored {
    let Some(snapshot) = snapshot.filter(|s| !s.documents.is_empty()) else {
        return Restored {
            store: default_store(),
            missing: Vec::new(),
        };
    };

    let mut missing = Vec::new();
    let documents = snapshot
        .documents
        .into_iter()
        .map(|record| {
            let linked_path = if record.is_new {
                None
            } else {
                record.file_path.clone()
            };
            let Some(path) = linked_path else {
                return Document {
                    id: record.id,
                    title: record.title,
                    content: record.content.unwrap_or_default(),
                    file_path: None,
                    is_modified: record.is_modified,
                    is_new: true,
                    fingerprint: None,
                };
            };
            match files.load(&path) {
                Ok((content, fingerprint)) => Document {
                    id: record.id,
                    title: record.title,
                    content,
                    file_path: Some(path),
                    is_modified: false,
                    is_new: false,
                    fingerprint: Some(fingerprint),
                },
                Err(err) => {
                    warn!("restored document is gone: {err}");
                    missing.push((record.id, path));
                    Document {
                        id: record.id,
                        title: record.title,
                        content: String::new(),
                        file_path: None,
                        is_modified: false,
                        is_new: true,
                        fingerprint: None,
                    }
                }
            }
        })
        .collect();

    let store = DocumentStore::new(documents, snapshot.active_id);
    info!(
        documents = store.len(),
        missing = missing.len(),
        "session restored"
    );
    Restored { store, missing }
}

#[must_use]
pub fn default_store() -> DocumentStore {
    let doc = Document::untitled();
    let id = doc.id;
    DocumentStore::new(vec![doc], Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{store::Action, testing::FakeFiles};

    fn service() -> SessionService {
        SessionService::new(Box::new(MemoryStore::default()))
    }

    fn sample(files: &FakeFiles) -> DocumentStore {
        files.put("/docs/a.md", "# A\n");
        let mut store = DocumentStore::default();

        let mut scratch = Document::untitled();
        scratch.content = "draft".to_owned();
        scratch.is_modified = true;
        store.dispatch(Action::Create(scratch));

        let fp = files.hash_file(Path::new("/docs/a.md")).ok();
        let mut linked = Document::untitled();
        linked.title = "a.md".to_owned();
        linked.content = "# A\n".to_owned();
        linked.file_path = Some(PathBuf::from("/docs/a.md"));
        linked.is_new = false;
        linked.fingerprint = fp;
        let linked_id = linked.id;
        store.dispatch(Action::Create(linked));

        let first = store.documents()[0].id;
        store.dispatch(Action::SetActive(first));
        store.dispatch(Action::Reorder(vec![linked_id, first]));
        store
    }

    #[test]
    fn round_trip_preserves_ids_order_and_metadata() {
        let files = FakeFiles::default();
        let store = sample(&files);
        let service = service();

        service.save_snapshot(&SessionSnapshot::capture(&store));
        let loaded = service.load_snapshot();
        assert!(loaded.is_some());

        let restored = restore(loaded, &files);
        assert!(restored.missing.is_empty());
        assert_eq!(restored.store, store, "unchanged disk content restores exactly");
    }

    #[test]
    fn linked_content_is_not_stored() {
        let files = FakeFiles::default();
        let snapshot = SessionSnapshot::capture(&sample(&files));
        let linked = snapshot.documents.iter().find(|r| !r.is_new);
        assert_eq!(linked.map(|r| r.content.is_none()), Some(true));
        let scratch = snapshot.documents.iter().find(|r| r.is_new);
        assert_eq!(
            scratch.and_then(|r| r.content.as_deref()),
            Some("draft")
        );
    }

    #[test]
    fn restore_rereads_changed_files() {
        let files = FakeFiles::default();
        let store = sample(&files);
        let snapshot = SessionSnapshot::capture(&store);
        files.put("/docs/a.md", "# A, edited elsewhere\n");

        let restored = restore(Some(snapshot), &files);
        let linked = restored.store.documents().iter().find(|d| !d.is_new);
        assert_eq!(
            linked.map(|d| d.content.as_str()),
            Some("# A, edited elsewhere\n")
        );
        assert_eq!(
            linked.and_then(|d| d.fingerprint.clone()),
            files.hash_file(Path::new("/docs/a.md")).ok()
        );
    }

    #[test]
    fn missing_file_is_demoted_to_scratch() {
        let files = FakeFiles::default();
        let store = sample(&files);
        let snapshot = SessionSnapshot::capture(&store);
        files.remove(Path::new("/docs/a.md"));

        let restored = restore(Some(snapshot), &files);
        assert_eq!(restored.missing.len(), 1);
        let (id, path) = &restored.missing[0];
        assert_eq!(path, Path::new("/docs/a.md"));

        let doc = restored.store.get(*id);
        assert_eq!(doc.map(|d| d.is_new), Some(true));
        assert_eq!(doc.and_then(|d| d.file_path.clone()), None);
        assert_eq!(doc.map(|d| d.content.is_empty()), Some(true));
        assert_eq!(doc.map(|d| d.title.as_str()), Some("a.md"));
    }

    #[test]
    fn absent_or_corrupt_session_yields_default() {
        let service = service();
        assert_eq!(service.load_snapshot(), None);

        service.store().set(SESSION_KEY, "documents = [[[").ok();
        assert_eq!(service.load_snapshot(), None);

        let restored = restore(None, &FakeFiles::default());
        assert_eq!(restored.store.len(), 1);
        let doc = restored.store.active();
        assert_eq!(doc.map(|d| d.is_new && d.content.is_empty()), Some(true));
    }

    #[test]
    fn newer_versions_are_ignored() {
        let service = service();
        service.store().set(SESSION_KEY, "version = 99\n").ok();
        assert_eq!(service.load_snapshot(), None);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let service = service();
        let id = DocumentId::new();
        let raw = format!("[[documents]]\nid = \"{id}\"\ncontent = \"hello\"\n");
        service.store().set(SESSION_KEY, &raw).ok();

        let loaded = service.load_snapshot();
        assert_eq!(loaded.as_ref().map(|s| s.version), Some(SESSION_VERSION));
        let restored = restore(loaded, &FakeFiles::default());
        let doc = restored.store.active();
        assert_eq!(doc.map(|d| d.id), Some(id));
        assert_eq!(doc.map(|d| d.is_new), Some(true));
        assert_eq!(doc.map(|d| d.content.as_str()), Some("hello"));
    }

    #[test]
    fn toml_file_store_round_trip() {
        let Ok(dir) = tempfile::tempdir() else {
            return;
        };
        let store = TomlFileStore::new(dir.path().join("state"));
        assert!(matches!(store.get("session"), Ok(None)));
        assert!(store.set("session", "version = 1\n").is_ok());
        assert_eq!(
            store.get("session").ok().flatten().as_deref(),
            Some("version = 1\n")
        );
        assert!(dir.path().join("state").join("session.toml").exists());
    }
}
