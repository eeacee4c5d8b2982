//! Single-writer in-process document server.
//!
//! One task owns every collection. [`MemoryRemote`] handles send commands over
//! a bounded channel and await a oneshot reply, so writes are applied in
//! arrival order and concurrent updates to one document resolve
//! last-write-wins per field. Every accepted write pushes a fresh full
//! snapshot to each live listener of the collection.

use std::{sync::Arc, time::Duration};

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    clock::now_ms,
    document::{Fields, RawDocument, merge_fields},
    error::{RemoteError, SubscriptionError, SubscriptionErrorKind},
    persist::{Change, ChangeSeq, ChangeSink, PersistError, StoredChange},
    types::{CollectionHandle, DocId},
};

use super::{ListenEvent, Listener, OrderBy, RemoteStore};

/// Tuning for the document server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub command_buffer: usize,
    pub latency_ms: u64,
    /// Journal a full snapshot after this many changes; zero disables.
    pub snapshot_every_changes: usize,
    /// Drop journal rows covered by each snapshot.
    pub compact_after_snapshot: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command_buffer: 256,
            latency_ms: 0,
            snapshot_every_changes: 0,
            compact_after_snapshot: false,
        }
    }
}

/// Serialized form of the whole server state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshotV1 {
    pub next_seq: ChangeSeq,
    pub collections: Vec<CollectionDump>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDump {
    pub name: String,
    pub documents: Vec<DumpedDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpedDocument {
    pub id: DocId,
    pub fields: Fields,
}

/// Authoritative server-side content of every collection.
#[derive(Debug, Default)]
pub struct ServerState {
    collections: HashMap<String, HashMap<DocId, Fields>>,
    next_seq: ChangeSeq,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            next_seq: 1,
            ..Self::default()
        }
    }

    pub fn from_snapshot(snapshot: StateSnapshotV1) -> Self {
        let mut state = Self {
            next_seq: snapshot.next_seq.max(1),
            ..Self::default()
        };
        for dump in snapshot.collections {
            let docs = state.collections.entry(dump.name).or_default();
            for doc in dump.documents {
                docs.insert(doc.id, doc.fields);
            }
        }
        state
    }

    /// Deterministic snapshot of the whole state.
    pub fn export_snapshot(&self) -> StateSnapshotV1 {
        let mut collections: Vec<CollectionDump> = self
            .collections
            .iter()
            .map(|(name, docs)| {
                let mut documents: Vec<DumpedDocument> = docs
                    .iter()
                    .map(|(id, fields)| DumpedDocument {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect();
                documents.sort_by(|a, b| a.id.cmp(&b.id));
                CollectionDump {
                    name: name.clone(),
                    documents,
                }
            })
            .collect();
        collections.sort_by(|a, b| a.name.cmp(&b.name));
        StateSnapshotV1 {
            next_seq: self.next_seq,
            collections,
        }
    }

    /// Applies a journaled change during replay.
    pub fn apply_replayed(&mut self, stored: StoredChange) {
        self.next_seq = self.next_seq.max(stored.seq.saturating_add(1));
        self.apply(stored.change);
    }

    pub fn get(&self, collection: &str, id: &DocId) -> Option<&Fields> {
        self.collections.get(collection)?.get(id)
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.collections.values().all(HashMap::is_empty)
    }

    /// Full content of `collection` in `order`.
    pub fn documents(&self, collection: &str, order: &OrderBy) -> Vec<RawDocument> {
        let mut docs: Vec<RawDocument> = self
            .collections
            .get(collection)
            .into_iter()
            .flat_map(|docs| docs.iter())
            .map(|(id, fields)| RawDocument {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect();
        order.sort(&mut docs);
        docs
    }

    pub fn latest_seq(&self) -> ChangeSeq {
        self.next_seq.saturating_sub(1)
    }

    fn plan_create(collection: &CollectionHandle, fields: Fields) -> Change {
        Change::Upsert {
            collection: collection.name().to_string(),
            id: DocId::new(Uuid::now_v7().simple().to_string()),
            fields,
        }
    }

    fn plan_update(&self, collection: &CollectionHandle, id: DocId, patch: &Fields) -> Result<Change, RemoteError> {
        let mut fields = self
            .get(collection.name(), &id)
            .cloned()
            .ok_or(RemoteError::NotFound)?;
        merge_fields(&mut fields, patch);
        Ok(Change::Upsert {
            collection: collection.name().to_string(),
            id,
            fields,
        })
    }

    fn plan_delete(&self, collection: &CollectionHandle, id: DocId) -> Result<Change, RemoteError> {
        if self.get(collection.name(), &id).is_none() {
            return Err(RemoteError::NotFound);
        }
        Ok(Change::Remove {
            collection: collection.name().to_string(),
            id,
        })
    }

    fn apply(&mut self, change: Change) {
        match change {
            Change::Upsert { collection, id, fields } => {
                self.collections.entry(collection).or_default().insert(id, fields);
            }
            Change::Remove { collection, id } => {
                if let Some(docs) = self.collections.get_mut(&collection) {
                    docs.remove(&id);
                }
            }
        }
    }

    fn take_next_seq(&mut self) -> ChangeSeq {
        let seq = self.next_seq.max(1);
        self.next_seq = seq + 1;
        seq
    }
}

/// Handle to a running document server.
#[derive(Clone)]
pub struct MemoryRemote {
    cmd_tx: mpsc::Sender<Command>,
    hold_tx: Arc<watch::Sender<bool>>,
    latency: Duration,
}

enum Command {
    Listen {
        collection: CollectionHandle,
        order: OrderBy,
        resp: oneshot::Sender<Result<Listener, SubscriptionError>>,
    },
    Create {
        collection: CollectionHandle,
        fields: Fields,
        resp: oneshot::Sender<Result<DocId, RemoteError>>,
    },
    Update {
        collection: CollectionHandle,
        id: DocId,
        fields: Fields,
        resp: oneshot::Sender<Result<(), RemoteError>>,
    },
    Delete {
        collection: CollectionHandle,
        id: DocId,
        resp: oneshot::Sender<Result<(), RemoteError>>,
    },
    Get {
        collection: CollectionHandle,
        id: DocId,
        resp: oneshot::Sender<Option<RawDocument>>,
    },
    Documents {
        collection: CollectionHandle,
        resp: oneshot::Sender<Vec<RawDocument>>,
    },
    ListenerCount {
        collection: CollectionHandle,
        resp: oneshot::Sender<usize>,
    },
    DenyWrites {
        collection: CollectionHandle,
        deny: bool,
        resp: oneshot::Sender<()>,
    },
    DenyListen {
        collection: CollectionHandle,
        deny: bool,
        resp: oneshot::Sender<()>,
    },
    FailNextWrite {
        error: RemoteError,
        resp: oneshot::Sender<()>,
    },
    Interrupt {
        collection: CollectionHandle,
        kind: SubscriptionErrorKind,
        resp: oneshot::Sender<usize>,
    },
    Checkpoint {
        resp: oneshot::Sender<Result<(), RemoteError>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

struct ListenerSlot {
    collection: CollectionHandle,
    order: OrderBy,
    tx: mpsc::UnboundedSender<ListenEvent>,
}

#[derive(Default)]
struct Faults {
    denied_writes: HashSet<CollectionHandle>,
    denied_listens: HashSet<CollectionHandle>,
    fail_next: Option<RemoteError>,
}

type SharedSink = Arc<Mutex<Box<dyn ChangeSink>>>;

struct Server {
    state: ServerState,
    sink: Option<SharedSink>,
    listeners: Vec<ListenerSlot>,
    faults: Faults,
    config: ServerConfig,
    changes_since_snapshot: usize,
}

/// Spawns a document server task and returns its handle.
///
/// Must be called from within a tokio runtime.
pub fn spawn_document_server(
    state: ServerState,
    sink: Option<Box<dyn ChangeSink>>,
    config: ServerConfig,
) -> MemoryRemote {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_buffer.max(1));
    let (hold_tx, _) = watch::channel(false);
    let latency = Duration::from_millis(config.latency_ms);

    let mut server = Server {
        state,
        sink: sink.map(|s| Arc::new(Mutex::new(s))),
        listeners: Vec::new(),
        faults: Faults::default(),
        config,
        changes_since_snapshot: 0,
    };

    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            if server.handle_command(cmd).await {
                break;
            }
        }
        debug!("document server stopped");
    });

    MemoryRemote {
        cmd_tx,
        hold_tx: Arc::new(hold_tx),
        latency,
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        spawn_document_server(ServerState::new(), None, ServerConfig::default())
    }

    /// Spawns a server from restored state, journaling into `sink`.
    pub fn from_state(state: ServerState, sink: Box<dyn ChangeSink>, config: ServerConfig) -> Self {
        spawn_document_server(state, Some(sink), config)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx.send(make(tx)).await.ok()?;
        rx.await.ok()
    }

    async fn before_write(&self) {
        let mut rx = self.hold_tx.subscribe();
        let _ = rx.wait_for(|held| !*held).await;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Parks every subsequent write until [`MemoryRemote::release_writes`].
    pub fn hold_writes(&self) {
        self.hold_tx.send_replace(true);
    }

    pub fn release_writes(&self) {
        self.hold_tx.send_replace(false);
    }

    /// Rejects writes to `collection` with [`RemoteError::PermissionDenied`].
    pub async fn deny_writes(&self, collection: &CollectionHandle, deny: bool) -> Result<(), RemoteError> {
        let collection = collection.clone();
        self.request(|resp| Command::DenyWrites { collection, deny, resp })
            .await
            .ok_or(RemoteError::Unavailable)
    }

    /// Rejects new listeners on `collection` with a permission error.
    pub async fn deny_listen(&self, collection: &CollectionHandle, deny: bool) -> Result<(), RemoteError> {
        let collection = collection.clone();
        self.request(|resp| Command::DenyListen { collection, deny, resp })
            .await
            .ok_or(RemoteError::Unavailable)
    }

    /// Fails the next write, whatever its collection, with `error`.
    pub async fn fail_next_write(&self, error: RemoteError) -> Result<(), RemoteError> {
        self.request(|resp| Command::FailNextWrite { error, resp })
            .await
            .ok_or(RemoteError::Unavailable)
    }

    /// Sends an error to every listener of `collection` and drops them.
    ///
    /// Returns how many listeners were interrupted.
    pub async fn interrupt_listeners(
        &self,
        collection: &CollectionHandle,
        kind: SubscriptionErrorKind,
    ) -> Result<usize, RemoteError> {
        let collection = collection.clone();
        self.request(|resp| Command::Interrupt { collection, kind, resp })
            .await
            .ok_or(RemoteError::Unavailable)
    }

    pub async fn get(&self, collection: &CollectionHandle, id: &DocId) -> Result<Option<RawDocument>, RemoteError> {
        let (collection, id) = (collection.clone(), id.clone());
        self.request(|resp| Command::Get { collection, id, resp })
            .await
            .ok_or(RemoteError::Unavailable)
    }

    /// Server-side content of `collection`, newest first.
    pub async fn documents(&self, collection: &CollectionHandle) -> Result<Vec<RawDocument>, RemoteError> {
        let collection = collection.clone();
        self.request(|resp| Command::Documents { collection, resp })
            .await
            .ok_or(RemoteError::Unavailable)
    }

    pub async fn listener_count(&self, collection: &CollectionHandle) -> Result<usize, RemoteError> {
        let collection = collection.clone();
        self.request(|resp| Command::ListenerCount { collection, resp })
            .await
            .ok_or(RemoteError::Unavailable)
    }

    /// Journals a full snapshot now.
    pub async fn checkpoint(&self) -> Result<(), RemoteError> {
        self.request(|resp| Command::Checkpoint { resp })
            .await
            .ok_or(RemoteError::Unavailable)?
    }

    /// Flushes the journal and stops the server; listeners see end of stream.
    pub async fn shutdown(&self) -> Result<(), RemoteError> {
        self.request(|resp| Command::Shutdown { resp })
            .await
            .ok_or(RemoteError::Unavailable)
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for MemoryRemote {
    async fn listen(&self, collection: &CollectionHandle, order: &OrderBy) -> Result<Listener, SubscriptionError> {
        let (handle, order) = (collection.clone(), order.clone());
        self.request(|resp| Command::Listen {
            collection: handle,
            order,
            resp,
        })
        .await
        .unwrap_or_else(|| {
            Err(SubscriptionError::new(
                SubscriptionErrorKind::Unavailable,
                collection,
                "document server is not running",
            ))
        })
    }

    async fn create(&self, collection: &CollectionHandle, fields: Fields) -> Result<DocId, RemoteError> {
        self.before_write().await;
        let collection = collection.clone();
        self.request(|resp| Command::Create { collection, fields, resp })
            .await
            .ok_or(RemoteError::Unavailable)?
    }

    async fn update(&self, collection: &CollectionHandle, id: &DocId, fields: Fields) -> Result<(), RemoteError> {
        self.before_write().await;
        let (collection, id) = (collection.clone(), id.clone());
        self.request(|resp| Command::Update {
            collection,
            id,
            fields,
            resp,
        })
        .await
        .ok_or(RemoteError::Unavailable)?
    }

    async fn delete(&self, collection: &CollectionHandle, id: &DocId) -> Result<(), RemoteError> {
        self.before_write().await;
        let (collection, id) = (collection.clone(), id.clone());
        self.request(|resp| Command::Delete { collection, id, resp })
            .await
            .ok_or(RemoteError::Unavailable)?
    }
}

impl Server {
    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Listen { collection, order, resp } => {
                let _ = resp.send(self.listen(collection, order));
            }
            Command::Create { collection, fields, resp } => {
                let res = match self.check_write(&collection) {
                    Ok(()) => {
                        let change = ServerState::plan_create(&collection, fields);
                        let id = change.doc_id().clone();
                        self.commit(&collection, change).await.map(|()| id)
                    }
                    Err(err) => Err(err),
                };
                let _ = resp.send(res);
            }
            Command::Update {
                collection,
                id,
                fields,
                resp,
            } => {
                let res = match self
                    .check_write(&collection)
                    .and_then(|()| self.state.plan_update(&collection, id, &fields))
                {
                    Ok(change) => self.commit(&collection, change).await,
                    Err(err) => Err(err),
                };
                let _ = resp.send(res);
            }
            Command::Delete { collection, id, resp } => {
                let res = match self
                    .check_write(&collection)
                    .and_then(|()| self.state.plan_delete(&collection, id))
                {
                    Ok(change) => self.commit(&collection, change).await,
                    Err(err) => Err(err),
                };
                let _ = resp.send(res);
            }
            Command::Get { collection, id, resp } => {
                let doc = self.state.get(collection.name(), &id).map(|fields| RawDocument {
                    id,
                    fields: fields.clone(),
                });
                let _ = resp.send(doc);
            }
            Command::Documents { collection, resp } => {
                let _ = resp.send(self.state.documents(collection.name(), &OrderBy::newest_first()));
            }
            Command::ListenerCount { collection, resp } => {
                self.listeners.retain(|slot| !slot.tx.is_closed());
                let count = self
                    .listeners
                    .iter()
                    .filter(|slot| slot.collection == collection)
                    .count();
                let _ = resp.send(count);
            }
            Command::DenyWrites { collection, deny, resp } => {
                if deny {
                    self.faults.denied_writes.insert(collection);
                } else {
                    self.faults.denied_writes.remove(&collection);
                }
                let _ = resp.send(());
            }
            Command::DenyListen { collection, deny, resp } => {
                if deny {
                    self.faults.denied_listens.insert(collection);
                } else {
                    self.faults.denied_listens.remove(&collection);
                }
                let _ = resp.send(());
            }
            Command::FailNextWrite { error, resp } => {
                self.faults.fail_next = Some(error);
                let _ = resp.send(());
            }
            Command::Interrupt { collection, kind, resp } => {
                let _ = resp.send(self.interrupt(&collection, kind));
            }
            Command::Checkpoint { resp } => {
                let res = self.checkpoint().await.map_err(journal_error);
                let _ = resp.send(res);
            }
            Command::Shutdown { resp } => {
                if let Some(sink) = &self.sink {
                    let sink_ref = Arc::clone(sink);
                    let flushed = tokio::task::spawn_blocking(move || {
                        let mut sink = sink_ref.blocking_lock();
                        sink.flush()
                    })
                    .await;
                    if !matches!(flushed, Ok(Ok(()))) {
                        warn!("journal flush on shutdown failed");
                    }
                }
                self.listeners.clear();
                let _ = resp.send(());
                return true;
            }
        }

        false
    }

    fn listen(&mut self, collection: CollectionHandle, order: OrderBy) -> Result<Listener, SubscriptionError> {
        if self.faults.denied_listens.contains(&collection) {
            return Err(SubscriptionError::new(
                SubscriptionErrorKind::PermissionDenied,
                &collection,
                "missing or insufficient permissions",
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let docs = self.state.documents(collection.name(), &order);
        let _ = tx.send(ListenEvent::Snapshot(docs));
        debug!(%collection, "listener registered");
        self.listeners.push(ListenerSlot { collection, order, tx });
        Ok(Listener::new(rx))
    }

    fn check_write(&mut self, collection: &CollectionHandle) -> Result<(), RemoteError> {
        if let Some(err) = self.faults.fail_next.take() {
            return Err(err);
        }
        if self.faults.denied_writes.contains(collection) {
            return Err(RemoteError::PermissionDenied);
        }
        Ok(())
    }

    async fn commit(&mut self, collection: &CollectionHandle, change: Change) -> Result<(), RemoteError> {
        let stored = StoredChange {
            seq: self.state.take_next_seq(),
            ts_ms: now_ms(),
            change,
        };

        if let Some(sink) = &self.sink {
            let sink_ref = Arc::clone(sink);
            let batch = vec![stored.clone()];
            let appended = tokio::task::spawn_blocking(move || {
                let mut sink = sink_ref.blocking_lock();
                sink.append_changes(&batch)
            })
            .await
            .map_err(|e| PersistError::Message(format!("join error: {e}")))
            .and_then(|r| r);
            if let Err(err) = appended {
                warn!(%collection, seq = stored.seq, error = %err, "journal append failed; write rejected");
                return Err(journal_error(err));
            }
        }

        self.state.apply(stored.change);
        self.changes_since_snapshot += 1;
        self.broadcast(collection);
        self.maybe_auto_checkpoint().await;
        Ok(())
    }

    fn broadcast(&mut self, collection: &CollectionHandle) {
        let state = &self.state;
        self.listeners.retain(|slot| {
            if slot.collection != *collection {
                return !slot.tx.is_closed();
            }
            let docs = state.documents(collection.name(), &slot.order);
            slot.tx.send(ListenEvent::Snapshot(docs)).is_ok()
        });
    }

    fn interrupt(&mut self, collection: &CollectionHandle, kind: SubscriptionErrorKind) -> usize {
        let mut interrupted = 0;
        self.listeners.retain(|slot| {
            if slot.collection != *collection {
                return true;
            }
            let err = SubscriptionError::new(kind, collection, "listener interrupted by server");
            if slot.tx.send(ListenEvent::Error(err)).is_ok() {
                interrupted += 1;
            }
            false
        });
        info!(%collection, interrupted, ?kind, "listeners interrupted");
        interrupted
    }

    async fn checkpoint(&mut self) -> Result<(), PersistError> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        let sink_ref = Arc::clone(sink);
        let snapshot = self.state.export_snapshot();
        let last_seq = self.state.latest_seq();
        let compact = self.config.compact_after_snapshot;
        tokio::task::spawn_blocking(move || {
            let mut sink = sink_ref.blocking_lock();
            sink.flush()?;
            sink.write_snapshot(&snapshot, last_seq)?;
            if compact {
                let removed = sink.compact_through(last_seq)?;
                debug!(removed, last_seq, "journal compacted");
            }
            Result::<(), PersistError>::Ok(())
        })
        .await
        .map_err(|e| PersistError::Message(format!("join error: {e}")))??;
        self.changes_since_snapshot = 0;
        Ok(())
    }

    async fn maybe_auto_checkpoint(&mut self) {
        let every = self.config.snapshot_every_changes;
        if every == 0 || self.changes_since_snapshot < every {
            return;
        }
        if let Err(err) = self.checkpoint().await {
            warn!(error = %err, "automatic checkpoint failed");
        }
    }
}

fn journal_error(err: PersistError) -> RemoteError {
    RemoteError::Journal(err.to_string())
}
