//! Fire-and-report wrapper around [`SyncStore`] writes.

use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{
    document::Mutation,
    error::WriteError,
    notify::{Notice, Notifier},
    remote::RemoteStore,
    sync::SyncStore,
    types::DocId,
};

/// What a successful [`MutationGate::perform`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// A document was created with this id.
    Created(DocId),
    /// The patch was merged.
    Updated,
    /// The document was removed.
    Deleted,
}

impl MutationOutcome {
    /// Id of the created document, if any.
    pub fn created_id(&self) -> Option<&DocId> {
        match self {
            Self::Created(id) => Some(id),
            Self::Updated | Self::Deleted => None,
        }
    }
}

/// Runs mutations against one store and reports the result to the user.
///
/// The error is always returned to the caller; `notify` only decides whether
/// a notice is emitted as well. Nothing is retried.
pub struct MutationGate<R, T: Clone> {
    store: SyncStore<R, T>,
    notifier: Arc<dyn Notifier>,
}

impl<R: Clone, T: Clone> Clone for MutationGate<R, T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

impl<R, T> MutationGate<R, T>
where
    R: RemoteStore,
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Wraps `store`, sending notices to `notifier`.
    pub fn new(store: SyncStore<R, T>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Wraps `store`, reusing the store's own notifier.
    pub fn for_store(store: SyncStore<R, T>) -> Self {
        let notifier = Arc::clone(store.notifier());
        Self { store, notifier }
    }

    /// Underlying store.
    pub fn store(&self) -> &SyncStore<R, T> {
        &self.store
    }

    /// Applies `mutation` and waits for the store to acknowledge it.
    pub async fn perform<P: Serialize>(
        &self,
        mutation: Mutation<T, P>,
        notify: bool,
    ) -> Result<MutationOutcome, WriteError> {
        let op = mutation.op();
        let handle = self.store.handle();
        let result = match mutation {
            Mutation::Create(payload) => self.store.create(&payload).await.map(MutationOutcome::Created),
            Mutation::Update(id, patch) => self
                .store
                .update(&id, &patch)
                .await
                .map(|()| MutationOutcome::Updated),
            Mutation::Delete(id) => self.store.delete(&id).await.map(|()| MutationOutcome::Deleted),
        };

        debug!(collection = %handle, %op, ok = result.is_ok(), notify, "mutation finished");
        if notify {
            let notice = match &result {
                Ok(_) => Notice::write_succeeded(handle, op),
                Err(err) => Notice::write_failed(handle, op, err),
            };
            self.notifier.notify(notice);
        }
        result
    }

    /// Runs [`MutationGate::perform`] on its own task so the caller never waits.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<P>(&self, mutation: Mutation<T, P>, notify: bool) -> JoinHandle<Result<MutationOutcome, WriteError>>
    where
        P: Serialize + Send + Sync + 'static,
    {
        let gate = self.clone();
        tokio::spawn(async move { gate.perform(mutation, notify).await })
    }
}
