//! Per-document file-change reconciliation.
//!
//! Each tracked document moves `Idle -> CheckPending -> (Idle |
//! AwaitingDecision)`; a decision returns it to `Idle` once its continuation
//! has completed. The reconciler only keeps this bookkeeping: it reads
//! documents from the store and tells the caller what to do next.

use std::{collections::HashMap, path::PathBuf};

use tracing::{debug, warn};

use crate::{
    document::{DocumentId, Fingerprint},
    error::FileError,
    store::DocumentStore,
};

/// What started a check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// Fixed-interval timer on the active document.
    Poll,
    /// Native watcher event for the document's path.
    FileEvent,
    /// The document became active.
    Activation,
    /// A save in place is about to write.
    BeforeSave,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    CheckPending,
    AwaitingDecision,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Discard local edits and take the disk content.
    Reload,
    /// Keep the buffer; a gated save then overwrites the disk copy.
    KeepLocal,
}

/// Raised to the presentation layer when a document diverged on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionRequest {
    pub document: DocumentId,
    pub title: String,
}

/// I/O the caller must run for a started check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckRequest {
    pub document: DocumentId,
    pub path: PathBuf,
    pub expected: Fingerprint,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Begin {
    /// Run the check.
    Started(CheckRequest),
    /// Nothing on disk to diverge from; a save may write directly.
    Exempt,
    /// A check or decision is already in flight; this trigger is redundant.
    Suppressed,
    /// The save was attached to the in-flight check or decision.
    SaveFolded,
    /// The document is not in the store.
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    /// No divergence (or the check failed open).
    Clean,
    /// No divergence and a save was waiting on the check.
    ProceedWithSave,
    Conflict(DecisionRequest),
    /// The document was closed or re-fingerprinted while the check ran.
    Moot,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Read the file and replace the buffer.
    Reload { path: PathBuf },
    /// Write the current buffer over the disk copy.
    SaveLocal { path: PathBuf },
    /// Nothing to run. `observed` is the disk state the user chose to ignore;
    /// it is only meaningful while the document still carries `expected`.
    Dismissed {
        observed: Option<Fingerprint>,
        expected: Option<Fingerprint>,
    },
}

#[derive(Clone, Debug, Default)]
struct Entry {
    phase: Phase,
    save_waiting: bool,
    /// Document fingerprint the running check compares against.
    expected: Option<Fingerprint>,
    /// Disk state observed when the conflict was raised.
    observed: Option<Fingerprint>,
    /// Set once the user answered; further answers are ignored.
    decided: bool,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    entries: HashMap<DocumentId, Entry>,
}

impl Reconciler {
    #[must_use]
    pub fn phase(&self, id: DocumentId) -> Phase {
        self.entries.get(&id).map_or(Phase::Idle, |entry| entry.phase)
    }

    /// Documents currently waiting for the user.
    pub fn awaiting(&self) -> impl Iterator<Item = DocumentId> + '_ {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.phase == Phase::AwaitingDecision)
            .map(|(id, _)| *id)
    }

    /// The disk state recorded with an unresolved conflict.
    #[must_use]
    pub fn observed(&self, id: DocumentId) -> Option<&Fingerprint> {
        self.entries.get(&id).and_then(|entry| entry.observed.as_ref())
    }

    /// The document fingerprint the current check started from.
    #[must_use]
    pub fn expected(&self, id: DocumentId) -> Option<&Fingerprint> {
        self.entries.get(&id).and_then(|entry| entry.expected.as_ref())
    }

    pub fn begin(&mut self, store: &DocumentStore, id: DocumentId, trigger: Trigger) -> Begin {
        let Some(doc) = store.get(id) else {
            self.entries.remove(&id);
            return Begin::Unknown;
        };
        let Some((path, expected)) = doc.tracked() else {
            return Begin::Exempt;
        };

        let entry = self.entries.entry(id).or_default();
        match entry.phase {
            Phase::Idle => {
                entry.phase = Phase::CheckPending;
                entry.save_waiting = trigger == Trigger::BeforeSave;
                entry.expected = Some(expected.clone());
                debug!(document = %id, ?trigger, "file check started");
                Begin::Started(CheckRequest {
                    document: id,
                    path: path.to_path_buf(),
                    expected: expected.clone(),
                })
            }
            Phase::CheckPending | Phase::AwaitingDecision if trigger == Trigger::BeforeSave => {
                entry.save_waiting = true;
                debug!(document = %id, phase = ?entry.phase, "save folded into pending check");
                Begin::SaveFolded
            }
            Phase::CheckPending | Phase::AwaitingDecision => {
                debug!(document = %id, ?trigger, phase = ?entry.phase, "file check suppressed");
                Begin::Suppressed
            }
        }
    }

    /// Feeds back the result of a [`CheckRequest`]. `Ok(None)` means the file
    /// matched; `Ok(Some(live))` carries the diverged disk fingerprint.
    pub fn complete(
        &mut self,
        store: &DocumentStore,
        request: &CheckRequest,
        result: Result<Option<Fingerprint>, FileError>,
    ) -> Completion {
        let id = request.document;
        let Some(doc) = store.get(id) else {
            self.entries.remove(&id);
            return Completion::Moot;
        };
        let Some(entry) = self.entries.get_mut(&id) else {
            return Completion::Moot;
        };
        if entry.phase != Phase::CheckPending {
            return Completion::Moot;
        }

        if doc.fingerprint.as_ref() != Some(&request.expected) {
            // A write or reload landed while the check ran; its result is stale.
            let save_waiting = std::mem::take(&mut entry.save_waiting);
            entry.phase = Phase::Idle;
            debug!(document = %id, "file check outdated by a newer fingerprint");
            return if save_waiting {
                Completion::ProceedWithSave
            } else {
                Completion::Moot
            };
        }

        match result {
            Ok(Some(live)) => {
                entry.phase = Phase::AwaitingDecision;
                entry.observed = Some(live);
                entry.decided = false;
                debug!(document = %id, "file changed on disk, awaiting decision");
                Completion::Conflict(DecisionRequest {
                    document: id,
                    title: doc.title.clone(),
                })
            }
            Ok(None) => Self::settle(entry),
            Err(err) => {
                warn!(document = %id, "file check failed, assuming unchanged: {err}");
                Self::settle(entry)
            }
        }
    }

    fn settle(entry: &mut Entry) -> Completion {
        entry.phase = Phase::Idle;
        if std::mem::take(&mut entry.save_waiting) {
            Completion::ProceedWithSave
        } else {
            Completion::Clean
        }
    }

    /// Applies the user's answer. Returns `None` for stale or repeated answers.
    pub fn resolve(
        &mut self,
        store: &DocumentStore,
        id: DocumentId,
        decision: Decision,
    ) -> Option<Resolution> {
        let Some(doc) = store.get(id) else {
            self.entries.remove(&id);
            return None;
        };
        let entry = self.entries.get_mut(&id)?;
        if entry.phase != Phase::AwaitingDecision || entry.decided {
            return None;
        }
        let path = doc.file_path.clone()?;
        entry.decided = true;

        let save_waiting = std::mem::take(&mut entry.save_waiting);
        debug!(document = %id, ?decision, save_waiting, "conflict resolved");
        match decision {
            Decision::Reload => Some(Resolution::Reload { path }),
            Decision::KeepLocal if save_waiting => Some(Resolution::SaveLocal { path }),
            Decision::KeepLocal => {
                let observed = entry.observed.take();
                let expected = entry.expected.take();
                self.finish(id);
                Some(Resolution::Dismissed { observed, expected })
            }
        }
    }

    /// Marks the decision's continuation as complete.
    pub fn finish(&mut self, id: DocumentId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            *entry = Entry::default();
        }
    }

    /// Drops all bookkeeping for a closed document.
    pub fn forget(&mut self, id: DocumentId) {
        self.entries.remove(&id);
    }

    /// Drops bookkeeping for documents no longer in the store.
    pub fn retain_known(&mut self, store: &DocumentStore) {
        self.entries.retain(|id, _| store.contains(*id));
    }
}
