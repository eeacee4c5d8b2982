//! Typed record shapes, one per collection.
//!
//! The sync store stays generic over any serde record; these types pin the
//! field names each dashboard form writes.

use serde::{Serialize, de::DeserializeOwned};

use crate::types::CollectionHandle;

/// Inventory items.
pub mod inventory;
/// Machines and daily production metrics.
pub mod plant;
/// User profiles.
pub mod user;
/// Work orders.
pub mod work_order;
/// Workers.
pub mod worker;

pub use inventory::{InventoryItem, InventoryPatch};
pub use plant::{Machine, MachineStatus, ProductionMetric};
pub use user::UserProfile;
pub use work_order::{Priority, WorkOrder, WorkOrderPatch, WorkOrderStatus};
pub use worker::{Worker, WorkerPatch, WorkerStatus};

/// A record type bound to the collection it lives in.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection name.
    const COLLECTION: &'static str;
    /// Sparse update payload; unset fields must not serialize.
    type Patch: Serialize + Send + Sync + 'static;

    /// Handle for [`Record::COLLECTION`].
    fn collection() -> CollectionHandle {
        CollectionHandle::new(Self::COLLECTION)
    }

    /// Tenant the record belongs to.
    fn factory_id(&self) -> &str;
}
