//! The ordered tab collection and its pure state-transition function.
//!
//! Every action is total: unknown ids are a benign race (a late async
//! completion or a duplicate close), never an error.

use std::{collections::HashSet, path::PathBuf};

use crate::document::{Document, DocumentId, Fingerprint};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentStore {
    documents: Vec<Document>,
    active_id: Option<DocumentId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Append and activate. The id is minted by the caller so the reducer
    /// stays pure; a duplicate id is ignored.
    Create(Document),
    Remove(DocumentId),
    SetActive(DocumentId),
    UpdateContent(DocumentId, String),
    UpdateTitle(DocumentId, String),
    SetFilePath(DocumentId, Option<PathBuf>),
    SetModified(DocumentId, bool),
    SetNew(DocumentId, bool),
    SetFingerprint(DocumentId, Option<Fingerprint>),
    /// Must be a permutation of the current ids; anything else is ignored.
    Reorder(Vec<DocumentId>),
    LoadSnapshot(DocumentStore),
}

impl DocumentStore {
    /// Builds a store, dropping duplicate ids and re-pointing a dangling
    /// active id at the first document.
    #[must_use]
    pub fn new(documents: Vec<Document>, active_id: Option<DocumentId>) -> Self {
        let mut seen = HashSet::new();
        let documents: Vec<Document> = documents
            .into_iter()
            .filter(|doc| seen.insert(doc.id))
            .collect();
        let active_id = active_id
            .filter(|id| seen.contains(id))
            .or_else(|| documents.first().map(|doc| doc.id));
        Self {
            documents,
            active_id,
        }
    }

    #[must_use]
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    #[must_use]
    pub const fn active_id(&self) -> Option<DocumentId> {
        self.active_id
    }

    #[must_use]
    pub fn active(&self) -> Option<&Document> {
        self.active_id.and_then(|id| self.get(id))
    }

    #[must_use]
    pub fn get(&self, id: DocumentId) -> Option<&Document> {
        self.documents.iter().find(|doc| doc.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: DocumentId) -> bool {
        self.position(id).is_some()
    }

    #[must_use]
    pub fn position(&self, id: DocumentId) -> Option<usize> {
        self.documents.iter().position(|doc| doc.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// True when `ids` names every current document exactly once.
    #[must_use]
    pub fn is_permutation(&self, ids: &[DocumentId]) -> bool {
        if ids.len() != self.documents.len() {
            return false;
        }
        let mut seen = HashSet::with_capacity(ids.len());
        ids.iter().all(|id| self.contains(*id) && seen.insert(*id))
    }

    /// Applies `action` in place.
    pub fn dispatch(&mut self, action: Action) {
        *self = std::mem::take(self).apply(action);
    }

    #[must_use]
    pub fn apply(mut self, action: Action) -> Self {
        match action {
            Action::Create(doc) => {
                if !self.contains(doc.id) {
                    self.active_id = Some(doc.id);
                    self.documents.push(doc);
                }
            }
            Action::Remove(id) => {
                let Some(index) = self.position(id) else {
                    return self;
                };
                self.documents.remove(index);
                if self.active_id == Some(id) {
                    self.active_id = self
                        .documents
                        .get(index.min(self.documents.len().saturating_sub(1)))
                        .map(|doc| doc.id);
                }
            }
            Action::SetActive(id) => {
                if self.contains(id) {
                    self.active_id = Some(id);
                }
            }
            Action::UpdateContent(id, content) => self.update(id, |doc| {
                doc.content = content;
                doc.is_modified = true;
            }),
            Action::UpdateTitle(id, title) => self.update(id, |doc| doc.title = title),
            Action::SetFilePath(id, path) => self.update(id, |doc| {
                // A linked document cannot lose its path.
                if path.is_some() || doc.is_new {
                    doc.file_path = path;
                }
            }),
            Action::SetModified(id, modified) => {
                self.update(id, |doc| doc.is_modified = modified);
            }
            Action::SetNew(id, is_new) => self.update(id, |doc| {
                if is_new {
                    doc.is_new = true;
                    doc.fingerprint = None;
                } else if doc.file_path.is_some() {
                    doc.is_new = false;
                }
            }),
            Action::SetFingerprint(id, fingerprint) => {
                self.update(id, |doc| doc.fingerprint = fingerprint);
            }
            Action::Reorder(ids) => {
                if self.is_permutation(&ids) {
                    let mut old = std::mem::take(&mut self.documents);
                    for id in ids {
                        if let Some(index) = old.iter().position(|doc| doc.id == id) {
                            self.documents.push(old.swap_remove(index));
                        }
                    }
                }
            }
            Action::LoadSnapshot(store) => {
                self = Self::new(store.documents, store.active_id);
            }
        }
        self
    }

    fn update(&mut self, id: DocumentId, f: impl FnOnce(&mut Document)) {
        if let Some(doc) = self.documents.iter_mut().find(|doc| doc.id == id) {
            f(doc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linked(name: &str) -> Document {
        Document::from_disk(
            PathBuf::from(format!("/docs/{name}")),
            String::new(),
            Fingerprint {
                hash: name.to_owned(),
                modified_time: 0,
                file_size: 0,
            },
        )
    }

    fn store_of(n: usize) -> (DocumentStore, Vec<DocumentId>) {
        let mut store = DocumentStore::default();
        let mut ids = Vec::new();
        for _ in 0..n {
            let doc = Document::untitled();
            ids.push(doc.id);
            store.dispatch(Action::Create(doc));
        }
        (store, ids)
    }

    fn assert_invariants(store: &DocumentStore) {
        assert_eq!(store.active_id().is_none(), store.is_empty());
        if let Some(id) = store.active_id() {
            assert!(store.contains(id));
        }
        for doc in store.documents() {
            assert!(doc.is_new || doc.file_path.is_some());
        }
        let ids: Vec<_> = store.documents().iter().map(|doc| doc.id).collect();
        assert!(store.is_permutation(&ids), "duplicate ids in store");
    }

    #[test]
    fn create_appends_and_activates() {
        let (store, ids) = store_of(3);
        assert_eq!(store.len(), 3);
        assert_eq!(store.active_id(), Some(ids[2]));
        assert_invariants(&store);
    }

    #[test]
    fn create_with_duplicate_id_is_ignored() {
        let (mut store, ids) = store_of(2);
        let mut dup = Document::untitled();
        dup.id = ids[0];
        store.dispatch(Action::Create(dup));
        assert_eq!(store.len(), 2);
        assert_eq!(store.active_id(), Some(ids[1]));
    }

    #[test]
    fn removing_active_selects_positional_neighbour() {
        // (documents, active index, removed index, expected active index after removal)
        for (n, active, removed, expected) in [
            (3, 1, 1, Some(1)),
            (3, 2, 2, Some(1)),
            (3, 0, 0, Some(0)),
            (1, 0, 0, None),
            (4, 1, 1, Some(1)),
        ] {
            let (mut store, ids) = store_of(n);
            store.dispatch(Action::SetActive(ids[active]));
            store.dispatch(Action::Remove(ids[removed]));
            let remaining: Vec<_> = ids.iter().copied().filter(|id| *id != ids[removed]).collect();
            assert_eq!(store.active_id(), expected.map(|i: usize| remaining[i]));
            assert_invariants(&store);
        }
    }

    #[test]
    fn removing_inactive_keeps_active() {
        let (mut store, ids) = store_of(3);
        store.dispatch(Action::SetActive(ids[1]));
        store.dispatch(Action::Remove(ids[0]));
        assert_eq!(store.active_id(), Some(ids[1]));
        store.dispatch(Action::Remove(ids[2]));
        assert_eq!(store.active_id(), Some(ids[1]));
    }

    #[test]
    fn unknown_ids_are_no_ops() {
        let (store, _) = store_of(2);
        let ghost = DocumentId::new();
        for action in [
            Action::Remove(ghost),
            Action::SetActive(ghost),
            Action::UpdateContent(ghost, "x".to_owned()),
            Action::UpdateTitle(ghost, "x".to_owned()),
            Action::SetModified(ghost, true),
            Action::SetNew(ghost, false),
            Action::SetFingerprint(ghost, None),
        ] {
            assert_eq!(store.clone().apply(action), store);
        }
    }

    #[test]
    fn update_content_marks_modified() {
        let (mut store, ids) = store_of(1);
        store.dispatch(Action::UpdateContent(ids[0], "# hi".to_owned()));
        let doc = store.get(ids[0]);
        assert_eq!(doc.map(|d| d.content.as_str()), Some("# hi"));
        assert_eq!(doc.map(|d| d.is_modified), Some(true));

        store.dispatch(Action::SetModified(ids[0], false));
        assert_eq!(store.get(ids[0]).map(|d| d.is_modified), Some(false));
    }

    #[test]
    fn linked_documents_keep_their_path() {
        let mut store = DocumentStore::default();
        let doc = linked("a.md");
        let id = doc.id;
        store.dispatch(Action::Create(doc));

        store.dispatch(Action::SetFilePath(id, None));
        assert!(store.get(id).and_then(|d| d.file_path.as_ref()).is_some());
        assert_invariants(&store);

        // Demoting first allows the path to be cleared.
        store.dispatch(Action::SetNew(id, true));
        store.dispatch(Action::SetFilePath(id, None));
        assert_eq!(store.get(id).and_then(|d| d.fingerprint.as_ref()), None);
        assert_invariants(&store);
    }

    #[test]
    fn set_new_false_requires_a_path() {
        let (mut store, ids) = store_of(1);
        store.dispatch(Action::SetNew(ids[0], false));
        assert_eq!(store.get(ids[0]).map(|d| d.is_new), Some(true));

        store.dispatch(Action::SetFilePath(ids[0], Some(PathBuf::from("/docs/x.md"))));
        store.dispatch(Action::SetNew(ids[0], false));
        assert_eq!(store.get(ids[0]).map(|d| d.is_new), Some(false));
        assert_invariants(&store);
    }

    #[test]
    fn reorder_accepts_only_permutations() {
        let (mut store, ids) = store_of(3);
        let reversed: Vec<_> = ids.iter().rev().copied().collect();
        store.dispatch(Action::Reorder(reversed.clone()));
        let order: Vec<_> = store.documents().iter().map(|d| d.id).collect();
        assert_eq!(order, reversed);
        assert_eq!(store.active_id(), Some(ids[2]));

        let before = store.clone();
        store.dispatch(Action::Reorder(vec![ids[0], ids[0], ids[1]]));
        assert_eq!(store, before);
        store.dispatch(Action::Reorder(vec![ids[0]]));
        assert_eq!(store, before);
    }

    #[test]
    fn load_snapshot_replaces_and_normalises() {
        let (mut store, _) = store_of(2);
        let a = Document::untitled();
        let a_id = a.id;
        let replacement = DocumentStore {
            documents: vec![a.clone(), a],
            active_id: Some(DocumentId::new()),
        };
        store.dispatch(Action::LoadSnapshot(replacement));
        assert_eq!(store.len(), 1);
        assert_eq!(store.active_id(), Some(a_id));
        assert_invariants(&store);
    }

    #[test]
    fn random_create_remove_sequences_hold_invariants() {
        // Deterministic pseudo-random walk over create/remove/activate.
        let mut seed = 0x2545_f491_u64;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        let mut store = DocumentStore::default();
        for _ in 0..500 {
            let roll = next() % 3;
            if roll == 0 || store.is_empty() {
                store.dispatch(Action::Create(Document::untitled()));
            } else {
                let index = (next() as usize) % store.len();
                let id = store.documents()[index].id;
                if roll == 1 {
                    let was_active = store.active_id() == Some(id);
                    let active_before = store.active_id();
                    store.dispatch(Action::Remove(id));
                    if was_active {
                        let expected = store
                            .documents()
                            .get(index.min(store.len().saturating_sub(1)))
                            .map(|d| d.id);
                        assert_eq!(store.active_id(), expected);
                    } else {
                        assert_eq!(store.active_id(), active_before);
                    }
                } else {
                    store.dispatch(Action::SetActive(id));
                }
            }
            assert_invariants(&store);
        }
    }
}
