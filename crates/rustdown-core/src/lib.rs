#![forbid(unsafe_code)]

//! Document lifecycle and file synchronisation for `rustdown` (GUI + CLI).
//!
//! The [`workspace::Workspace`] is the single consumer of every mutation: it
//! owns the [`store::DocumentStore`], drives the per-document
//! [`reconcile::Reconciler`], and hands I/O out as [`workspace::Effect`]s so
//! the caller decides which thread runs it.

pub mod disk_io;
pub mod document;
pub mod error;
pub mod fingerprint;
pub mod gateway;
pub mod reconcile;
pub mod session;
pub mod settings;
pub mod store;
pub mod variables;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

pub use document::{Document, DocumentId, Fingerprint};
pub use error::{FileError, StoreError};
pub use store::{Action, DocumentStore};
pub use workspace::{Effect, Workspace};

/// Hard cap on file sizes we will load into memory.
pub const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
