//! The single consumer of document mutations.
//!
//! Commands and job outcomes go in; [`Effect`]s come out. Effects describe
//! I/O to run (anywhere, on any thread), snapshots to persist, dialogs to
//! show and decisions to ask for. Every mutation goes through the reducer, so
//! one command completes before the next begins.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::{debug, error, info, warn};

use crate::{
    document::{Document, DocumentId, Fingerprint, title_for},
    error::FileError,
    gateway::FileGateway,
    reconcile::{
        Begin, CheckRequest, Completion, Decision, DecisionRequest, Reconciler, Resolution,
        Trigger,
    },
    session::{self, Restored, SessionSnapshot},
    store::{Action, DocumentStore},
};

/// Period of the active-document file check.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Blocking file work, runnable off the UI thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Job {
    Open {
        path: PathBuf,
    },
    Check(CheckRequest),
    Reload {
        document: DocumentId,
        path: PathBuf,
    },
    Write {
        document: DocumentId,
        path: PathBuf,
        content: String,
        kind: WriteKind,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteKind {
    InPlace,
    SaveAs,
    /// Overwrites a diverged file after the user kept local edits.
    KeepLocal,
}

#[derive(Debug)]
pub enum Outcome {
    Opened {
        path: PathBuf,
        result: Result<(String, Fingerprint), FileError>,
    },
    Checked {
        request: CheckRequest,
        result: Result<Option<Fingerprint>, FileError>,
    },
    Reloaded {
        document: DocumentId,
        result: Result<(String, Fingerprint), FileError>,
    },
    Written {
        document: DocumentId,
        path: PathBuf,
        content: String,
        kind: WriteKind,
        result: Result<Fingerprint, FileError>,
    },
}

impl Job {
    pub fn run(self, files: &dyn FileGateway) -> Outcome {
        match self {
            Self::Open { path } => Outcome::Opened {
                result: files.load(&path),
                path,
            },
            Self::Check(request) => {
                let result = files
                    .compare(&request.path, &request.expected)
                    .and_then(|cmp| {
                        if cmp.is_same() {
                            Ok(None)
                        } else {
                            debug!(path = %request.path.display(), ?cmp, "file diverged");
                            files.hash_file(&request.path).map(Some)
                        }
                    });
                Outcome::Checked { request, result }
            }
            Self::Reload { document, path } => Outcome::Reloaded {
                document,
                result: files.load(&path),
            },
            Self::Write {
                document,
                path,
                content,
                kind,
            } => {
                let result = files
                    .write_file(&path, &content)
                    .and_then(|()| files.hash_file(&path));
                Outcome::Written {
                    document,
                    path,
                    content,
                    kind,
                    result,
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

/// A dismissible message for the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: Level,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseChoice {
    Save,
    Discard,
    Cancel,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    Run(Job),
    /// Fire-and-forget session save.
    Persist(SessionSnapshot),
    PickOpenPath,
    PickSavePath {
        document: DocumentId,
        suggested_name: String,
    },
    Decide(DecisionRequest),
    ConfirmClose {
        document: DocumentId,
        title: String,
    },
    Notify(Notice),
}

#[derive(Debug, Default)]
pub struct Workspace {
    store: DocumentStore,
    reconciler: Reconciler,
    effects: Vec<Effect>,
    /// Documents to close once their save completes.
    closing: HashSet<DocumentId>,
    restored: bool,
    persist_pending: bool,
}

impl Workspace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn store(&self) -> &DocumentStore {
        &self.store
    }

    #[must_use]
    pub const fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    #[must_use]
    pub fn active(&self) -> Option<&Document> {
        self.store.active()
    }

    #[must_use]
    pub const fn is_restored(&self) -> bool {
        self.restored
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::capture(&self.store)
    }

    /// Pending effects, with at most one trailing `Persist`.
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        if std::mem::take(&mut self.persist_pending) {
            self.effects.push(Effect::Persist(self.snapshot()));
        }
        std::mem::take(&mut self.effects)
    }

    /// Loads the startup session. Persistence starts only after this, so the
    /// restore itself never writes the session back.
    pub fn restore(&mut self, snapshot: Option<SessionSnapshot>, files: &dyn FileGateway) {
        let Restored { store, missing } = session::restore(snapshot, files);
        self.store.dispatch(Action::LoadSnapshot(store));
        self.reconciler.retain_known(&self.store);
        for (_, path) in missing {
            self.notify(
                Level::Error,
                format!("File not found: {}", path.display()),
            );
        }
        self.restored = true;
    }

    pub fn new_document(&mut self) -> DocumentId {
        let doc = Document::untitled();
        let id = doc.id;
        self.dispatch(Action::Create(doc));
        id
    }

    pub fn request_open(&mut self) {
        self.effects.push(Effect::PickOpenPath);
    }

    /// Opens `path` in a new tab, or focuses the tab already showing it.
    pub fn open_path(&mut self, path: PathBuf) {
        let existing = self.linked_to(&path).next();
        if let Some(id) = existing {
            self.activate(id);
            return;
        }
        self.effects.push(Effect::Run(Job::Open { path }));
    }

    pub fn edit(&mut self, id: DocumentId, content: String) {
        if self.store.get(id).is_some_and(|doc| doc.content != content) {
            self.dispatch(Action::UpdateContent(id, content));
        }
    }

    pub fn rename(&mut self, id: DocumentId, title: String) {
        self.dispatch(Action::UpdateTitle(id, title));
    }

    /// Focuses `id` and checks it against disk.
    pub fn activate(&mut self, id: DocumentId) {
        if !self.store.contains(id) {
            return;
        }
        if self.store.active_id() != Some(id) {
            self.dispatch(Action::SetActive(id));
        }
        self.check(id, Trigger::Activation);
    }

    /// Timer tick: checks the active document only.
    pub fn poll(&mut self) {
        if let Some(id) = self.store.active_id() {
            self.check(id, Trigger::Poll);
        }
    }

    /// Native watcher nudge for `path`.
    pub fn file_changed(&mut self, path: &Path) {
        let ids: Vec<_> = self.linked_to(path).collect();
        for id in ids {
            self.check(id, Trigger::FileEvent);
        }
    }

    /// Saves in place after a reconciliation check, or asks for a path for
    /// scratch documents.
    pub fn save(&mut self, id: DocumentId) {
        let Some(doc) = self.store.get(id) else {
            return;
        };
        if doc.is_new || doc.file_path.is_none() {
            self.save_as(id);
            return;
        }
        match self.reconciler.begin(&self.store, id, Trigger::BeforeSave) {
            Begin::Started(request) => self.effects.push(Effect::Run(Job::Check(request))),
            Begin::Exempt => self.write_current(id, WriteKind::InPlace),
            Begin::SaveFolded | Begin::Suppressed | Begin::Unknown => {}
        }
    }

    pub fn save_as(&mut self, id: DocumentId) {
        let Some(doc) = self.store.get(id) else {
            return;
        };
        let suggested_name = if Path::new(&doc.title).extension().is_some() {
            doc.title.clone()
        } else {
            format!("{}.md", doc.title)
        };
        self.effects.push(Effect::PickSavePath {
            document: id,
            suggested_name,
        });
    }

    /// Writes `id` to a path the user picked. Picking the document's own file
    /// is a save in place and goes through the same check.
    pub fn save_to(&mut self, id: DocumentId, path: PathBuf) {
        let Some(doc) = self.store.get(id) else {
            return;
        };
        if doc.tracked().is_some_and(|(linked, _)| linked == path) {
            self.save(id);
            return;
        }
        let content = doc.content.clone();
        self.effects.push(Effect::Run(Job::Write {
            document: id,
            path,
            content,
            kind: WriteKind::SaveAs,
        }));
    }

    /// The save dialog was dismissed.
    pub fn save_cancelled(&mut self, id: DocumentId) {
        self.closing.remove(&id);
    }

    pub fn request_close(&mut self, id: DocumentId) {
        let Some(doc) = self.store.get(id) else {
            return;
        };
        if doc.is_modified {
            self.effects.push(Effect::ConfirmClose {
                document: id,
                title: doc.title.clone(),
            });
        } else {
            self.close(id);
        }
    }

    pub fn resolve_close(&mut self, id: DocumentId, choice: CloseChoice) {
        match choice {
            CloseChoice::Save => {
                self.closing.insert(id);
                self.save(id);
            }
            CloseChoice::Discard => self.close(id),
            CloseChoice::Cancel => {
                self.closing.remove(&id);
            }
        }
    }

    /// Reorders tabs; `ids` must be a permutation of the open documents.
    pub fn reorder(&mut self, ids: Vec<DocumentId>) -> bool {
        if !self.store.is_permutation(&ids) {
            warn!("ignoring tab reorder that is not a permutation");
            return false;
        }
        self.dispatch(Action::Reorder(ids));
        true
    }

    /// Moves the tab for `id` by `offset` positions, clamped to the strip.
    pub fn move_tab(&mut self, id: DocumentId, offset: isize) {
        let Some(from) = self.store.position(id) else {
            return;
        };
        let last = self.store.len().saturating_sub(1);
        let to = from.saturating_add_signed(offset).min(last);
        if to == from {
            return;
        }
        let mut ids: Vec<_> = self.store.documents().iter().map(|doc| doc.id).collect();
        let moved = ids.remove(from);
        ids.insert(to, moved);
        self.reorder(ids);
    }

    pub fn resolve_conflict(&mut self, id: DocumentId, decision: Decision) {
        let Some(resolution) = self.reconciler.resolve(&self.store, id, decision) else {
            debug!(document = %id, "ignoring stale conflict decision");
            return;
        };
        match resolution {
            Resolution::Reload { path } => {
                self.closing.remove(&id);
                self.effects
                    .push(Effect::Run(Job::Reload { document: id, path }));
            }
            Resolution::SaveLocal { path } => {
                if let Some(doc) = self.store.get(id) {
                    let content = doc.content.clone();
                    self.effects.push(Effect::Run(Job::Write {
                        document: id,
                        path,
                        content,
                        kind: WriteKind::KeepLocal,
                    }));
                }
            }
            Resolution::Dismissed { observed, expected } => {
                self.adopt_observed(id, observed, expected.as_ref());
            }
        }
    }

    pub fn apply_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Opened { path, result } => match result {
                Ok((content, fingerprint)) => {
                    let existing = self.linked_to(&path).next();
                    if let Some(id) = existing {
                        self.activate(id);
                        return;
                    }
                    info!(path = %path.display(), "opened");
                    let doc = Document::from_disk(path, content, fingerprint);
                    self.dispatch(Action::Create(doc));
                }
                Err(err) => {
                    error!("open failed: {err}");
                    self.notify(Level::Error, format!("Open failed: {err}"));
                }
            },
            Outcome::Checked { request, result } => {
                let id = request.document;
                match self.reconciler.complete(&self.store, &request, result) {
                    Completion::Clean | Completion::Moot => {}
                    Completion::ProceedWithSave => self.write_current(id, WriteKind::InPlace),
                    Completion::Conflict(decision) => {
                        self.effects.push(Effect::Decide(decision));
                    }
                }
            }
            Outcome::Reloaded { document, result } => {
                let observed = self.reconciler.observed(document).cloned();
                let expected = self.reconciler.expected(document).cloned();
                self.reconciler.finish(document);
                if !self.store.contains(document) {
                    return;
                }
                match result {
                    Ok((content, fingerprint)) => {
                        self.dispatch(Action::UpdateContent(document, content));
                        self.dispatch(Action::SetModified(document, false));
                        self.dispatch(Action::SetFingerprint(document, Some(fingerprint)));
                        info!(document = %document, "reloaded from disk");
                    }
                    Err(err) => {
                        // Keep the buffer as if the user had kept it, so the
                        // unreadable revision is not offered again.
                        error!("reload failed: {err}");
                        self.notify(Level::Error, format!("Reload failed: {err}"));
                        self.adopt_observed(document, observed, expected.as_ref());
                    }
                }
            }
            Outcome::Written {
                document,
                path,
                content,
                kind,
                result,
            } => self.finish_write(document, path, &content, kind, result),
        }
    }

    fn finish_write(
        &mut self,
        id: DocumentId,
        path: PathBuf,
        written: &str,
        kind: WriteKind,
        result: Result<Fingerprint, FileError>,
    ) {
        if kind == WriteKind::KeepLocal {
            self.reconciler.finish(id);
        }
        if !self.store.contains(id) {
            return;
        }

        match result {
            Ok(fingerprint) => {
                if kind == WriteKind::SaveAs {
                    let title = title_for(&path).into_owned();
                    self.dispatch(Action::SetFilePath(id, Some(path.clone())));
                    self.dispatch(Action::UpdateTitle(id, title));
                    self.dispatch(Action::SetNew(id, false));
                }
                self.dispatch(Action::SetFingerprint(id, Some(fingerprint)));
                // Edits made while the write was in flight keep the tab dirty.
                if self.store.get(id).is_some_and(|doc| doc.content == written) {
                    self.dispatch(Action::SetModified(id, false));
                }
                info!(path = %path.display(), "saved");
                if self.closing.remove(&id) {
                    self.close(id);
                }
            }
            Err(err) => {
                self.closing.remove(&id);
                error!("save failed: {err}");
                self.notify(Level::Error, format!("Save failed: {err}"));
            }
        }
    }

    /// Takes the disk state the user declined as the new baseline, so the next
    /// tick does not ask again. Skipped once a write or reload has moved the
    /// document past the fingerprint the check started from.
    fn adopt_observed(
        &mut self,
        id: DocumentId,
        observed: Option<Fingerprint>,
        expected: Option<&Fingerprint>,
    ) {
        let Some(observed) = observed else {
            return;
        };
        let current = self.store.get(id).and_then(|doc| doc.fingerprint.as_ref());
        if current.is_none() || current != expected {
            debug!(document = %id, "declined disk state is outdated; keeping fingerprint");
            return;
        }
        self.dispatch(Action::SetFingerprint(id, Some(observed)));
        self.dispatch(Action::SetModified(id, true));
    }

    fn close(&mut self, id: DocumentId) {
        self.closing.remove(&id);
        self.reconciler.forget(id);
        self.dispatch(Action::Remove(id));
        if self.store.is_empty() {
            self.new_document();
        } else if let Some(active) = self.store.active_id() {
            self.check(active, Trigger::Activation);
        }
    }

    fn check(&mut self, id: DocumentId, trigger: Trigger) {
        if let Begin::Started(request) = self.reconciler.begin(&self.store, id, trigger) {
            self.effects.push(Effect::Run(Job::Check(request)));
        }
    }

    fn write_current(&mut self, id: DocumentId, kind: WriteKind) {
        let Some(doc) = self.store.get(id) else {
            return;
        };
        let Some(path) = doc.file_path.clone() else {
            return;
        };
        let content = doc.content.clone();
        self.effects.push(Effect::Run(Job::Write {
            document: id,
            path,
            content,
            kind,
        }));
    }

    fn linked_to<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = DocumentId> + 'a {
        self.store
            .documents()
            .iter()
            .filter(move |doc| !doc.is_new && doc.file_path.as_deref() == Some(path))
            .map(|doc| doc.id)
    }

    fn notify(&mut self, level: Level, message: String) {
        self.effects.push(Effect::Notify(Notice { level, message }));
    }

    fn dispatch(&mut self, action: Action) {
        self.store.dispatch(action);
        if self.restored {
            self.persist_pending = true;
        }
    }
}
