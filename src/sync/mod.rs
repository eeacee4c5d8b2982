//! Real-time collection mirrors.
//!
//! A [`SyncStore`] keeps a local, server-ordered copy of one remote
//! collection and forwards create/update/delete to the store. Server
//! snapshots are the source of truth: the view changes when the listener
//! pushes, with one exception: a delete hides its document at once and
//! restores it if the server refuses.

mod snapshot;
mod store;

pub use snapshot::{Snapshot, SyncStatus};
pub use store::{Subscription, SyncConfig, SyncStore};
