use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::{
    clock::Clock,
    document::{Document, Fields, RawDocument, to_fields},
    error::{RemoteError, SubscriptionError, SubscriptionErrorKind, WriteError, WriteOp},
    model::Record,
    notify::{Notice, Notifier, TracingNotifier},
    remote::{ListenEvent, Listener, OrderBy, RemoteStore},
    types::{CREATED_AT, CollectionHandle, DocId, UPDATED_AT},
};

use super::snapshot::{Snapshot, SyncStatus};

/// Listener retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// First delay before re-listening after a transient failure.
    pub retry_initial_ms: u64,
    /// Upper bound for the doubling retry delay.
    pub retry_max_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_initial_ms: 250,
            retry_max_ms: 10_000,
        }
    }
}

struct ViewState<T> {
    open: bool,
    task: Option<JoinHandle<()>>,
    server_docs: Vec<Document<T>>,
    // Locally deleted ids; `true` once the store acknowledged the delete.
    hidden: HashMap<DocId, bool>,
    status: SyncStatus,
    revision: u64,
}

/// One subscription's local mirror and the channel it publishes on.
struct View<T: Clone> {
    state: Mutex<ViewState<T>>,
    tx: watch::Sender<Arc<Snapshot<T>>>,
}

impl<T: Clone> View<T> {
    fn new(open: bool) -> Self {
        let (tx, _) = watch::channel(Arc::new(Snapshot::empty()));
        Self {
            state: Mutex::new(ViewState {
                open,
                task: None,
                server_docs: Vec::new(),
                hidden: HashMap::new(),
                status: SyncStatus::Loading,
                revision: 0,
            }),
            tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ViewState<T>> {
        lock(&self.state)
    }

    // Caller holds the lock, so publication order matches revision order.
    fn publish(&self, state: &mut ViewState<T>) {
        state.revision += 1;
        let documents = state
            .server_docs
            .iter()
            .filter(|doc| !state.hidden.contains_key(&doc.id))
            .cloned()
            .collect();
        self.tx.send_replace(Arc::new(Snapshot::new(
            documents,
            state.revision,
            state.status.clone(),
        )));
    }

    fn attach(&self, task: JoinHandle<()>) {
        let mut state = self.lock();
        if state.open {
            state.task = Some(task);
        } else {
            task.abort();
        }
    }

    fn close(&self) -> bool {
        let task = {
            let mut state = self.lock();
            if !state.open {
                return false;
            }
            state.open = false;
            state.status = SyncStatus::Closed;
            self.publish(&mut state);
            state.task.take()
        };
        if let Some(task) = task {
            task.abort();
        }
        true
    }

    fn is_open(&self) -> bool {
        self.lock().open
    }

    fn apply_server(&self, docs: Vec<Document<T>>) -> bool {
        let mut state = self.lock();
        if !state.open {
            return false;
        }
        {
            // Writes reach listeners before they are acknowledged, so a
            // confirmed delete that is absent here will not come back.
            let present: HashSet<&DocId> = docs.iter().map(|doc| &doc.id).collect();
            state.hidden.retain(|id, confirmed| !*confirmed || present.contains(id));
        }
        state.server_docs = docs;
        state.status = SyncStatus::Live;
        self.publish(&mut state);
        true
    }

    /// Returns whether this is the first failure since the last good snapshot,
    /// or `None` once the view is closed.
    fn degrade(&self, err: SubscriptionError) -> Option<bool> {
        let mut state = self.lock();
        if !state.open {
            return None;
        }
        let first = !matches!(state.status, SyncStatus::Degraded(_));
        state.status = SyncStatus::Degraded(err);
        self.publish(&mut state);
        Some(first)
    }

    fn hide(&self, id: &DocId) -> bool {
        let mut state = self.lock();
        if !state.open || state.hidden.contains_key(id) {
            return false;
        }
        state.hidden.insert(id.clone(), false);
        if state.server_docs.iter().any(|doc| doc.id == *id) {
            self.publish(&mut state);
        }
        true
    }

    fn confirm_hidden(&self, id: &DocId) {
        if let Some(confirmed) = self.lock().hidden.get_mut(id) {
            *confirmed = true;
        }
    }

    fn unhide(&self, id: &DocId) {
        let mut state = self.lock();
        if state.hidden.remove(id).is_some()
            && state.open
            && state.server_docs.iter().any(|doc| doc.id == *id)
        {
            self.publish(&mut state);
        }
    }
}

struct Views<T: Clone> {
    open: Vec<Weak<View<T>>>,
    latest: Arc<View<T>>,
}

fn lock<S>(mutex: &Mutex<S>) -> MutexGuard<'_, S> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Live, ordered mirror of one remote collection plus its write path.
///
/// Every [`SyncStore::open`] starts an independent subscription with its own
/// listener and snapshot. Clones share the write path and the set of open
/// subscriptions. Every published [`Snapshot`] replaces the previous one
/// whole, so readers never observe a partially applied server update.
pub struct SyncStore<R, T: Clone> {
    remote: R,
    handle: CollectionHandle,
    config: SyncConfig,
    clock: Arc<Clock>,
    notifier: Arc<dyn Notifier>,
    views: Arc<Mutex<Views<T>>>,
}

impl<R: Clone, T: Clone> Clone for SyncStore<R, T> {
    fn clone(&self) -> Self {
        Self {
            remote: self.remote.clone(),
            handle: self.handle.clone(),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
            notifier: Arc::clone(&self.notifier),
            views: Arc::clone(&self.views),
        }
    }
}

impl<R, T> SyncStore<R, T>
where
    R: RemoteStore,
    T: Record + Clone,
{
    /// Store bound to the record type's own collection.
    pub fn for_record(remote: R) -> Self {
        Self::new(remote, T::collection())
    }
}

impl<R, T> SyncStore<R, T>
where
    R: RemoteStore,
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Creates a closed store for `handle`; call [`SyncStore::open`] to start syncing.
    pub fn new(remote: R, handle: CollectionHandle) -> Self {
        Self {
            remote,
            handle,
            config: SyncConfig::default(),
            clock: Clock::shared(),
            notifier: Arc::new(TracingNotifier),
            views: Arc::new(Mutex::new(Views {
                open: Vec::new(),
                latest: Arc::new(View::new(false)),
            })),
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Sends listener-failure notices to `notifier`.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Stamps timestamps from `clock` instead of the process-wide one.
    pub fn with_clock(mut self, clock: Arc<Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn handle(&self) -> &CollectionHandle {
        &self.handle
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Latest snapshot of the most recently opened subscription.
    ///
    /// Empty and [`SyncStatus::Loading`] before the first [`SyncStore::open`].
    pub fn snapshot(&self) -> Arc<Snapshot<T>> {
        self.latest().tx.borrow().clone()
    }

    /// Receiver following the most recently opened subscription.
    pub fn watch(&self) -> watch::Receiver<Arc<Snapshot<T>>> {
        self.latest().tx.subscribe()
    }

    /// Starts an independent listen on the collection.
    ///
    /// Subscriptions opened earlier keep their own listener and snapshot; each
    /// one stops only when it is closed. The new snapshot stream starts empty
    /// in [`SyncStatus::Loading`] until the first server snapshot lands.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(&self) -> Subscription<T> {
        let view = Arc::new(View::new(true));
        let task = ListenTask {
            remote: self.remote.clone(),
            handle: self.handle.clone(),
            config: self.config.clone(),
            notifier: Arc::clone(&self.notifier),
            view: Arc::clone(&view),
        };
        view.attach(tokio::spawn(task.run()));
        let open = {
            let mut views = lock(&self.views);
            views.open.retain(|weak| weak.upgrade().is_some_and(|view| view.is_open()));
            views.open.push(Arc::downgrade(&view));
            views.latest = Arc::clone(&view);
            views.open.len()
        };
        info!(collection = %self.handle, open, "subscription opened");
        Subscription {
            rx: view.tx.subscribe(),
            view,
            handle: self.handle.clone(),
        }
    }

    fn latest(&self) -> Arc<View<T>> {
        Arc::clone(&lock(&self.views).latest)
    }

    fn open_views(&self) -> Vec<Arc<View<T>>> {
        lock(&self.views)
            .open
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|view| view.is_open())
            .collect()
    }

    /// Stores `payload` as a new document and returns the server-issued id.
    ///
    /// `createdAt` and `updatedAt` are stamped with the same instant. The
    /// local view changes only when the server snapshot echoes the write.
    pub async fn create(&self, payload: &T) -> Result<DocId, WriteError> {
        self.create_fields(to_fields(payload)?).await
    }

    /// Untyped [`SyncStore::create`].
    pub async fn create_fields(&self, mut fields: Fields) -> Result<DocId, WriteError> {
        let now = self.clock.tick();
        fields.insert(CREATED_AT.to_string(), Value::from(now));
        fields.insert(UPDATED_AT.to_string(), Value::from(now));
        match self.remote.create(&self.handle, fields).await {
            Ok(id) => {
                debug!(collection = %self.handle, %id, "document created");
                Ok(id)
            }
            Err(err) => Err(self.rejected(WriteOp::Create, err)),
        }
    }

    /// Merges the fields present in `patch` into document `id`.
    ///
    /// Absent fields keep their stored values; `createdAt` is never
    /// rewritten and `updatedAt` always moves forward.
    pub async fn update<P: Serialize + ?Sized>(&self, id: &DocId, patch: &P) -> Result<(), WriteError> {
        self.update_fields(id, to_fields(patch)?).await
    }

    /// Untyped [`SyncStore::update`].
    pub async fn update_fields(&self, id: &DocId, mut fields: Fields) -> Result<(), WriteError> {
        fields.remove(CREATED_AT);
        fields.insert(UPDATED_AT.to_string(), Value::from(self.clock.tick()));
        match self.remote.update(&self.handle, id, fields).await {
            Ok(()) => {
                debug!(collection = %self.handle, %id, "document updated");
                Ok(())
            }
            Err(err) => Err(self.rejected(WriteOp::Update, err)),
        }
    }

    /// Removes document `id`.
    ///
    /// The document disappears from every open subscription immediately; if
    /// the server refuses, it is restored.
    pub async fn delete(&self, id: &DocId) -> Result<(), WriteError> {
        let hiding: Vec<Arc<View<T>>> = self.open_views().into_iter().filter(|view| view.hide(id)).collect();
        match self.remote.delete(&self.handle, id).await {
            Ok(()) => {
                for view in &hiding {
                    view.confirm_hidden(id);
                }
                debug!(collection = %self.handle, %id, "document deleted");
                Ok(())
            }
            Err(err) => {
                for view in &hiding {
                    view.unhide(id);
                }
                Err(self.rejected(WriteOp::Delete, err))
            }
        }
    }

    fn rejected(&self, op: WriteOp, err: RemoteError) -> WriteError {
        warn!(collection = %self.handle, %op, error = %err, "write rejected");
        WriteError::remote(op, &self.handle, err)
    }
}

/// An open listen on one collection with its own snapshot.
///
/// Closing, or dropping, stops the listener; the last snapshot stays readable
/// and nothing further is published to it.
pub struct Subscription<T: Clone> {
    view: Arc<View<T>>,
    handle: CollectionHandle,
    rx: watch::Receiver<Arc<Snapshot<T>>>,
}

impl<T: Clone> Subscription<T> {
    pub fn snapshot(&self) -> Arc<Snapshot<T>> {
        self.rx.borrow().clone()
    }

    /// Waits for the next snapshot after the last one seen here.
    pub async fn changed(&mut self) -> Arc<Snapshot<T>> {
        // The sender lives in `view`, which this subscription keeps alive.
        let _ = self.rx.changed().await;
        self.rx.borrow_and_update().clone()
    }

    /// Waits until a snapshot satisfies `pred`, checking the current one first.
    pub async fn wait_for(&mut self, mut pred: impl FnMut(&Snapshot<T>) -> bool) -> Arc<Snapshot<T>> {
        let found = self
            .rx
            .wait_for(|snapshot| pred(snapshot))
            .await
            .map(|snapshot| (*snapshot).clone())
            .ok();
        found.unwrap_or_else(|| self.snapshot())
    }

    pub fn is_open(&self) -> bool {
        self.view.is_open()
    }

    /// Stops the listener; idempotent.
    pub fn close(self) {
        drop(self);
    }
}

impl<T: Clone> Drop for Subscription<T> {
    fn drop(&mut self) {
        if self.view.close() {
            info!(collection = %self.handle, "subscription closed");
        }
    }
}

struct ListenTask<R, T: Clone> {
    remote: R,
    handle: CollectionHandle,
    config: SyncConfig,
    notifier: Arc<dyn Notifier>,
    view: Arc<View<T>>,
}

impl<R, T> ListenTask<R, T>
where
    R: RemoteStore,
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn run(self) {
        let order = OrderBy::newest_first();
        let mut backoff = Backoff::new(&self.config);
        loop {
            let failure = match self.remote.listen(&self.handle, &order).await {
                Ok(listener) => match self.pump(listener, &mut backoff).await {
                    Some(err) => err,
                    None => return,
                },
                Err(err) => err,
            };
            if !self.report(failure) {
                return;
            }
            let delay = backoff.next_delay();
            debug!(collection = %self.handle, delay_ms = delay.as_millis() as u64, "re-listening");
            tokio::time::sleep(delay).await;
        }
    }

    /// Applies snapshots until the listener fails; `None` once closed.
    async fn pump(&self, mut listener: Listener, backoff: &mut Backoff) -> Option<SubscriptionError> {
        loop {
            let (latest, failure) = match listener.next().await {
                Some(ListenEvent::Snapshot(docs)) => drain_queued(docs, &mut listener),
                Some(ListenEvent::Error(err)) => (None, Some(err)),
                None => (
                    None,
                    Some(SubscriptionError::new(
                        SubscriptionErrorKind::Unavailable,
                        &self.handle,
                        "listener stream ended",
                    )),
                ),
            };
            if let Some(raw) = latest {
                let docs = decode_snapshot(&self.handle, &raw);
                if !self.view.apply_server(docs) {
                    return None;
                }
                backoff.reset();
            }
            if failure.is_some() {
                return failure;
            }
        }
    }

    /// Records the failure; returns whether to retry.
    fn report(&self, err: SubscriptionError) -> bool {
        if err.is_permission_denied() {
            warn!(collection = %self.handle, error = %err, "subscription denied; not retrying");
        } else {
            error!(collection = %self.handle, error = %err, "subscription failed");
        }
        let retry = err.is_transient();
        let notify = !err.is_permission_denied();
        match self.view.degrade(err) {
            Some(first) => {
                if first && notify {
                    self.notifier.notify(Notice::load_failed());
                }
                retry
            }
            None => false,
        }
    }
}

/// Skips to the newest queued snapshot, stopping at a queued error.
fn drain_queued(
    first: Vec<RawDocument>,
    listener: &mut Listener,
) -> (Option<Vec<RawDocument>>, Option<SubscriptionError>) {
    let mut latest = first;
    while let Some(event) = listener.try_next() {
        match event {
            ListenEvent::Snapshot(docs) => latest = docs,
            ListenEvent::Error(err) => return (Some(latest), Some(err)),
        }
    }
    (Some(latest), None)
}

fn decode_snapshot<T: DeserializeOwned>(handle: &CollectionHandle, raw: &[RawDocument]) -> Vec<Document<T>> {
    raw.iter()
        .filter_map(|doc| match Document::decode(doc) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                warn!(collection = %handle, id = %doc.id, error = %err, "skipping undecodable document");
                None
            }
        })
        .collect()
}

struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    fn new(config: &SyncConfig) -> Self {
        // A zero delay would spin against a server that stays down.
        let initial_ms = config.retry_initial_ms.max(1);
        let initial = Duration::from_millis(initial_ms);
        Self {
            initial,
            max: Duration::from_millis(config.retry_max_ms.max(initial_ms)),
            next: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.next = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn backoff_doubles_up_to_max_and_resets() {
        let mut backoff = Backoff::new(&SyncConfig {
            retry_initial_ms: 100,
            retry_max_ms: 350,
        });
        let delays: Vec<u128> = (0..4).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 350, 350]);
        backoff.reset();
        assert_eq!(backoff.next_delay().as_millis(), 100);
    }

    #[test]
    fn zero_initial_delay_still_waits() {
        let mut backoff = Backoff::new(&SyncConfig {
            retry_initial_ms: 0,
            retry_max_ms: 0,
        });
        let delays: Vec<u128> = (0..3).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![1, 1, 1]);
    }

    #[test]
    fn closed_views_ignore_server_snapshots_and_deletes() {
        let view: View<u32> = View::new(true);
        let doc = Document {
            id: DocId::new("a"),
            created_at: 1,
            updated_at: 1,
            data: 0u32,
        };
        assert!(view.apply_server(vec![doc.clone()]));
        assert!(view.close());
        assert!(!view.close());
        let frozen = view.tx.borrow().revision();

        assert!(!view.apply_server(Vec::new()));
        assert!(!view.hide(&doc.id));
        assert!(view.degrade(SubscriptionError::new(
            SubscriptionErrorKind::Unavailable,
            &CollectionHandle::new("bins"),
            "gone",
        ))
        .is_none());
        let snapshot = view.tx.borrow().clone();
        assert_eq!(snapshot.revision(), frozen);
        assert_eq!(snapshot.status(), &SyncStatus::Closed);
        assert_eq!(snapshot.ids(), vec![DocId::new("a")]);
    }

    #[test]
    fn undecodable_documents_are_skipped() {
        #[derive(Debug, Clone, Deserialize)]
        struct Bin {
            #[allow(dead_code)]
            count: u32,
        }

        let raw = vec![
            RawDocument {
                id: DocId::new("ok"),
                fields: to_fields(&json!({"count": 1})).expect("fields"),
            },
            RawDocument {
                id: DocId::new("bad"),
                fields: to_fields(&json!({"count": "many"})).expect("fields"),
            },
        ];
        let docs: Vec<Document<Bin>> = decode_snapshot(&CollectionHandle::new("bins"), &raw);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id.as_str(), "ok");
    }

    #[test]
    fn confirmed_deletes_are_pruned_once_absent_from_server() {
        let view: View<u32> = View::new(true);
        let doc = |id: &str| Document {
            id: DocId::new(id),
            created_at: 1,
            updated_at: 1,
            data: 0u32,
        };
        let a = DocId::new("a");
        assert!(view.apply_server(vec![doc("b")]));
        // Not visible yet, but a pending delete still hides it when it shows up.
        assert!(view.hide(&a));
        assert!(view.apply_server(vec![doc("a"), doc("b")]));
        assert_eq!(view.tx.borrow().ids(), vec![DocId::new("b")]);

        // Unconfirmed entries survive snapshots that lack the id.
        assert!(view.apply_server(vec![doc("b")]));
        assert!(view.lock().hidden.contains_key(&a));

        view.confirm_hidden(&a);
        assert!(view.apply_server(vec![doc("a"), doc("b")]));
        assert_eq!(view.tx.borrow().ids(), vec![DocId::new("b")]);
        assert!(view.apply_server(vec![doc("b")]));
        assert!(view.lock().hidden.is_empty());
    }
}
