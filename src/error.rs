//! Error types shared by the remote boundary, the sync store, and the gate.

use std::fmt;

use thiserror::Error;

use crate::types::CollectionHandle;

/// Failure reported by a remote document store for one request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Access control refused the request.
    #[error("permission denied")]
    PermissionDenied,
    /// The addressed document does not exist.
    #[error("document not found")]
    NotFound,
    /// The store could not be reached.
    #[error("store unavailable")]
    Unavailable,
    /// The store rejected the request for another reason.
    #[error("rejected: {0}")]
    Rejected(String),
    /// The accepted change could not be journaled.
    #[error("journal failure: {0}")]
    Journal(String),
}

/// Kind of write that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOp {
    /// Document creation.
    Create,
    /// Partial-field update.
    Update,
    /// Document removal.
    Delete,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// A create, update, or delete did not take effect.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The remote store refused or failed the write.
    #[error("{op} on {collection} failed: {source}")]
    Remote {
        /// Operation that failed.
        op: WriteOp,
        /// Target collection.
        collection: CollectionHandle,
        /// Underlying store error.
        #[source]
        source: RemoteError,
    },
    /// The payload could not be turned into a field map.
    #[error("payload is not a field map: {0}")]
    Encode(String),
}

impl WriteError {
    pub(crate) fn remote(op: WriteOp, collection: &CollectionHandle, source: RemoteError) -> Self {
        Self::Remote {
            op,
            collection: collection.clone(),
            source,
        }
    }

    /// Underlying remote error, if the failure came from the store.
    pub fn remote_error(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote { source, .. } => Some(source),
            Self::Encode(_) => None,
        }
    }
}

impl From<serde_json::Error> for WriteError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encode(value.to_string())
    }
}

/// Classification of a listener failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionErrorKind {
    /// Access control refused the listen; not retried.
    PermissionDenied,
    /// Transient connectivity loss; retried with backoff.
    Unavailable,
    /// Any other listener failure; retried with backoff.
    Internal,
}

/// The remote listener reported an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("subscription to {collection} failed ({kind:?}): {message}")]
pub struct SubscriptionError {
    /// Failure class.
    pub kind: SubscriptionErrorKind,
    /// Collection being listened to.
    pub collection: CollectionHandle,
    /// Human-readable detail.
    pub message: String,
}

impl SubscriptionError {
    /// Builds an error for `collection`.
    pub fn new(
        kind: SubscriptionErrorKind,
        collection: &CollectionHandle,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            collection: collection.clone(),
            message: message.into(),
        }
    }

    /// Maps a request-level failure onto a listener failure.
    pub fn from_remote(collection: &CollectionHandle, err: &RemoteError) -> Self {
        let kind = match err {
            RemoteError::PermissionDenied => SubscriptionErrorKind::PermissionDenied,
            RemoteError::Unavailable => SubscriptionErrorKind::Unavailable,
            _ => SubscriptionErrorKind::Internal,
        };
        Self::new(kind, collection, err.to_string())
    }

    /// True when the failure is an access-control boundary.
    pub fn is_permission_denied(&self) -> bool {
        self.kind == SubscriptionErrorKind::PermissionDenied
    }

    /// True when re-listening may succeed.
    pub fn is_transient(&self) -> bool {
        !self.is_permission_denied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_error_message_names_op_and_collection() {
        let err = WriteError::remote(
            WriteOp::Delete,
            &CollectionHandle::new("workers"),
            RemoteError::NotFound,
        );
        assert_eq!(err.to_string(), "delete on workers failed: document not found");
        assert_eq!(err.remote_error(), Some(&RemoteError::NotFound));
    }

    #[test]
    fn permission_denied_is_not_transient() {
        let handle = CollectionHandle::new("inventory");
        let denied = SubscriptionError::from_remote(&handle, &RemoteError::PermissionDenied);
        assert!(denied.is_permission_denied());
        assert!(!denied.is_transient());

        let offline = SubscriptionError::from_remote(&handle, &RemoteError::Unavailable);
        assert_eq!(offline.kind, SubscriptionErrorKind::Unavailable);
        assert!(offline.is_transient());
    }
}
