//! Boundary to the remote document store.
//!
//! The sync layer only needs four primitives from a store: a per-collection
//! listener that pushes full, server-ordered snapshots, and create/update/delete
//! with server-issued identifiers. [`memory::MemoryRemote`] is the in-process
//! implementation used by tests, demos, and single-node deployments.

use std::{cmp::Ordering, future::Future};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    document::{Fields, RawDocument},
    error::{RemoteError, SubscriptionError},
    types::{CREATED_AT, CollectionHandle, DocId},
};

/// In-process document server.
pub mod memory;

/// Sort direction for a listen query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// Server-side ordering applied to every snapshot of a listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderBy {
    /// Field to order on.
    pub field: String,
    /// Sort direction.
    pub direction: Direction,
}

impl OrderBy {
    /// Creation time, newest first.
    pub fn newest_first() -> Self {
        Self {
            field: CREATED_AT.to_string(),
            direction: Direction::Descending,
        }
    }

    /// Compares two documents by the ordered field, ties broken by id.
    ///
    /// Documents missing the field sort after those that have it, in
    /// either direction.
    pub fn compare(&self, a: &RawDocument, b: &RawDocument) -> Ordering {
        let ord = match (a.fields.get(&self.field), b.fields.get(&self.field)) {
            (Some(x), Some(y)) => {
                let ord = compare_values(x, y);
                match self.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        ord.then_with(|| a.id.cmp(&b.id))
    }

    /// Sorts `docs` in place.
    pub fn sort(&self, docs: &mut [RawDocument]) {
        docs.sort_by(|a, b| self.compare(a, b));
    }
}

impl Default for OrderBy {
    fn default() -> Self {
        Self::newest_first()
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_u64(), y.as_u64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or(0.0)
                .total_cmp(&y.as_f64().unwrap_or(0.0)),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Notification pushed by a remote listener.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenEvent {
    /// Complete, ordered content of the collection.
    Snapshot(Vec<RawDocument>),
    /// The listener failed; no further events follow.
    Error(SubscriptionError),
}

/// Receiving end of one remote listen.
///
/// Dropping it unregisters the listener at the store.
#[derive(Debug)]
pub struct Listener {
    rx: mpsc::UnboundedReceiver<ListenEvent>,
}

impl Listener {
    /// Wraps a channel fed by a store implementation.
    pub fn new(rx: mpsc::UnboundedReceiver<ListenEvent>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the store dropped the listener.
    pub async fn next(&mut self) -> Option<ListenEvent> {
        self.rx.recv().await
    }

    /// Next already-queued event, without waiting.
    pub fn try_next(&mut self) -> Option<ListenEvent> {
        self.rx.try_recv().ok()
    }
}

/// Remote document store primitives the sync layer is built on.
///
/// Implementations must queue the snapshot reflecting an accepted write to
/// every listener of the collection before acknowledging the write.
pub trait RemoteStore: Clone + Send + Sync + 'static {
    /// Starts listening to `collection`; the first event is the current snapshot.
    fn listen(
        &self,
        collection: &CollectionHandle,
        order: &OrderBy,
    ) -> impl Future<Output = Result<Listener, SubscriptionError>> + Send;

    /// Stores a new document and returns its identifier.
    fn create(
        &self,
        collection: &CollectionHandle,
        fields: Fields,
    ) -> impl Future<Output = Result<DocId, RemoteError>> + Send;

    /// Merges top-level `fields` into an existing document.
    fn update(
        &self,
        collection: &CollectionHandle,
        id: &DocId,
        fields: Fields,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Removes a document.
    fn delete(
        &self,
        collection: &CollectionHandle,
        id: &DocId,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::document::to_fields;

    fn doc(id: &str, value: serde_json::Value) -> RawDocument {
        RawDocument {
            id: DocId::new(id),
            fields: to_fields(&value).expect("fields"),
        }
    }

    #[test]
    fn newest_first_orders_by_created_at_then_id() {
        let mut docs = vec![
            doc("b", json!({"createdAt": 5})),
            doc("c", json!({"createdAt": 9})),
            doc("a", json!({"createdAt": 5})),
            doc("z", json!({})),
        ];
        OrderBy::newest_first().sort(&mut docs);
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b", "z"]);
    }

    #[test]
    fn ascending_string_order() {
        let order = OrderBy {
            field: "name".to_string(),
            direction: Direction::Ascending,
        };
        let mut docs = vec![doc("1", json!({"name": "beta"})), doc("2", json!({"name": "alpha"}))];
        order.sort(&mut docs);
        assert_eq!(docs[0].id.as_str(), "2");
    }
}
