use std::collections::VecDeque;

use rustdown_core::{DocumentId, DocumentStore};

/// Unsaved-changes questions waiting for an answer. Only the oldest is shown;
/// the rest wait their turn instead of being dropped.
#[derive(Debug, Default)]
pub struct ClosePrompts {
    queue: VecDeque<(DocumentId, String)>,
}

impl ClosePrompts {
    /// Queues a prompt. A document already waiting keeps its place.
    pub fn push(&mut self, document: DocumentId, title: String) -> bool {
        if self.queue.iter().any(|(id, _)| *id == document) {
            return false;
        }
        self.queue.push_back((document, title));
        true
    }

    pub fn current(&self) -> Option<&(DocumentId, String)> {
        self.queue.front()
    }

    pub fn answered(&mut self, document: DocumentId) {
        self.queue.retain(|(id, _)| *id != document);
    }

    /// Drops prompts for documents that were closed some other way.
    pub fn retain_open(&mut self, store: &DocumentStore) {
        self.queue.retain(|(id, _)| store.contains(*id));
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustdown_core::Document;

    #[test]
    fn prompts_wait_in_order_and_dedupe() {
        let (a, b) = (Document::untitled(), Document::untitled());
        let mut prompts = ClosePrompts::default();
        assert!(prompts.push(a.id, "a".to_owned()));
        assert!(prompts.push(b.id, "b".to_owned()));
        assert!(!prompts.push(a.id, "a".to_owned()));

        assert_eq!(prompts.current().map(|(id, _)| *id), Some(a.id));
        prompts.answered(a.id);
        assert_eq!(prompts.current().map(|(id, _)| *id), Some(b.id));
        prompts.answered(b.id);
        assert!(prompts.is_empty());
    }

    #[test]
    fn prompts_for_closed_documents_are_dropped() {
        let (a, b) = (Document::untitled(), Document::untitled());
        let (a_id, b_id) = (a.id, b.id);
        let mut prompts = ClosePrompts::default();
        prompts.push(a_id, "a".to_owned());
        prompts.push(b_id, "b".to_owned());

        let store = DocumentStore::new(vec![b], Some(b_id));
        prompts.retain_open(&store);
        assert_eq!(prompts.current().map(|(id, _)| *id), Some(b_id));
    }
}
