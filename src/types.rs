//! Shared primitive IDs, timestamps, and collection handles.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
pub type Millis = u64;

/// Field name the sync layer stamps with the creation time.
pub const CREATED_AT: &str = "createdAt";
/// Field name the sync layer stamps with the last-update time.
pub const UPDATED_AT: &str = "updatedAt";
/// Field name carrying the tenant identifier.
pub const FACTORY_ID: &str = "factoryId";

/// Server-assigned document identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    /// Wraps an identifier issued by a remote store.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrowed identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Stable name of one logical collection.
///
/// Handles are immutable and cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionHandle(Arc<str>);

impl CollectionHandle {
    /// Work orders.
    pub const WORK_ORDERS: &'static str = "workOrders";
    /// Inventory items.
    pub const INVENTORY: &'static str = "inventory";
    /// Workers.
    pub const WORKERS: &'static str = "workers";
    /// Machines.
    pub const MACHINES: &'static str = "machines";
    /// Daily production metrics.
    pub const PRODUCTION_METRICS: &'static str = "productionMetrics";
    /// User profiles.
    pub const USERS: &'static str = "users";

    /// Creates a handle for `name`.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Lower-case label for one item of this collection, used in notices.
    pub fn item_label(&self) -> &'static str {
        match self.name() {
            Self::WORK_ORDERS => "work order",
            Self::INVENTORY => "inventory item",
            Self::WORKERS => "worker",
            Self::USERS => "user",
            Self::MACHINES => "machine",
            Self::PRODUCTION_METRICS => "production metric",
            _ => "item",
        }
    }
}

impl fmt::Display for CollectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_labels_fall_back_to_item() {
        assert_eq!(CollectionHandle::new("workOrders").item_label(), "work order");
        assert_eq!(CollectionHandle::new("productionMetrics").item_label(), "production metric");
        assert_eq!(CollectionHandle::new("pallets").item_label(), "item");
    }

    #[test]
    fn handles_compare_by_name() {
        assert_eq!(CollectionHandle::new("inventory"), CollectionHandle::new(CollectionHandle::INVENTORY));
    }
}
