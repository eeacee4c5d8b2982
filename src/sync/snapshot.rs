//! Point-in-time view of one collection.

use crate::{
    document::Document,
    error::SubscriptionError,
    model::Record,
    types::DocId,
};

/// Health of the listener feeding a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// No server snapshot has arrived yet.
    Loading,
    /// Documents mirror the latest server snapshot.
    Live,
    /// The listener failed; documents are the last known good content.
    Degraded(SubscriptionError),
    /// The subscription was closed; documents are frozen.
    Closed,
}

/// Ordered documents of one collection, newest first.
///
/// Snapshots are immutable; every change produces a new one with a higher
/// `revision`.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    documents: Vec<Document<T>>,
    revision: u64,
    status: SyncStatus,
}

impl<T> Snapshot<T> {
    pub(crate) fn new(documents: Vec<Document<T>>, revision: u64, status: SyncStatus) -> Self {
        Self {
            documents,
            revision,
            status,
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(Vec::new(), 0, SyncStatus::Loading)
    }

    /// Documents in server order.
    pub fn documents(&self) -> &[Document<T>] {
        &self.documents
    }

    /// Iterates documents in server order.
    pub fn iter(&self) -> std::slice::Iter<'_, Document<T>> {
        self.documents.iter()
    }

    /// Local change counter; strictly increases per published snapshot.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Listener health at the time of this snapshot.
    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    /// True once a server snapshot has been applied and the listener is healthy.
    pub fn is_live(&self) -> bool {
        self.status == SyncStatus::Live
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// True when there are no documents.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Looks up a document by id.
    pub fn get(&self, id: &DocId) -> Option<&Document<T>> {
        self.documents.iter().find(|doc| doc.id == *id)
    }

    /// True when `id` is present.
    pub fn contains(&self, id: &DocId) -> bool {
        self.get(id).is_some()
    }

    /// Identifiers in server order.
    pub fn ids(&self) -> Vec<DocId> {
        self.documents.iter().map(|doc| doc.id.clone()).collect()
    }

    /// Record bodies in server order.
    pub fn records(&self) -> Vec<&T> {
        self.documents.iter().map(|doc| &doc.data).collect()
    }
}

impl<T: Record> Snapshot<T> {
    /// Documents belonging to `factory_id`.
    pub fn for_factory(&self, factory_id: &str) -> Vec<&Document<T>> {
        self.documents
            .iter()
            .filter(|doc| doc.data.factory_id() == factory_id)
            .collect()
    }
}

impl<'a, T> IntoIterator for &'a Snapshot<T> {
    type Item = &'a Document<T>;
    type IntoIter = std::slice::Iter<'a, Document<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}
