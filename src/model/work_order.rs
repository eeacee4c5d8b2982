//! Work order record, status/priority enums, and patch.

use serde::{Deserialize, Serialize};

use crate::types::{CollectionHandle, Millis};

use super::Record;

/// Lifecycle state of a work order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkOrderStatus {
    /// Not started.
    #[default]
    Pending,
    /// On the floor.
    InProgress,
    /// Finished.
    Completed,
    /// Paused.
    OnHold,
    /// Any value this build does not know.
    #[serde(other)]
    Other,
}

/// Scheduling priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low.
    Low,
    /// Medium.
    #[default]
    Medium,
    /// High.
    High,
    /// Urgent.
    Urgent,
    /// Any value this build does not know.
    #[serde(other)]
    Other,
}

/// Production job tracked on the dashboard.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkOrder {
    /// Human-facing order number, e.g. `WO-001`.
    pub order_number: String,
    /// Product being built.
    pub product_name: String,
    /// Units ordered.
    pub quantity: u32,
    /// Scheduling priority.
    pub priority: Priority,
    /// Lifecycle state.
    pub status: WorkOrderStatus,
    /// Due date in epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Millis>,
    /// Display name of the assigned worker; empty when unassigned.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub assigned_worker: String,
    /// Id of the assigned worker document; empty when unassigned.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub assigned_worker_id: String,
    /// Percent complete, when the caller tracks it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    /// Free-form notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Owning tenant.
    pub factory_id: String,
}

impl WorkOrder {
    /// True when the order is assigned to `worker_id`.
    pub fn is_assigned_to(&self, worker_id: &str) -> bool {
        !worker_id.is_empty() && self.assigned_worker_id == worker_id
    }
}

impl Record for WorkOrder {
    const COLLECTION: &'static str = CollectionHandle::WORK_ORDERS;
    type Patch = WorkOrderPatch;

    fn factory_id(&self) -> &str {
        &self.factory_id
    }
}

/// Sparse work-order update where each `Some` field overwrites the stored value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrderPatch {
    /// Replacement order number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    /// Replacement product name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    /// Replacement quantity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    /// Replacement priority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Replacement status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkOrderStatus>,
    /// Replacement due date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Millis>,
    /// Replacement assigned worker name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_worker: Option<String>,
    /// Replacement assigned worker id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_worker_id: Option<String>,
    /// Replacement progress.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    /// Replacement notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl WorkOrderPatch {
    /// Returns true when no fields are set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::document::to_fields;

    #[test]
    fn patch_serializes_only_set_fields() {
        let patch = WorkOrderPatch {
            status: Some(WorkOrderStatus::Completed),
            progress: Some(100),
            ..WorkOrderPatch::default()
        };
        let fields = to_fields(&patch).expect("fields");
        assert_eq!(
            serde_json::Value::Object(fields),
            json!({"status": "completed", "progress": 100})
        );
        assert!(WorkOrderPatch::default().is_empty());
    }

    #[test]
    fn sparse_documents_decode_with_defaults() {
        let order: WorkOrder = serde_json::from_value(json!({
            "orderNumber": "WO-900",
            "quantity": 10,
            "status": "in-progress",
            "createdAt": 1,
        }))
        .expect("decode");
        assert_eq!(order.status, WorkOrderStatus::InProgress);
        assert_eq!(order.priority, Priority::Medium);
        assert_eq!(order.progress, None);
        assert!(!order.is_assigned_to(""));
    }

    #[test]
    fn unknown_status_decodes_as_other() {
        let order: WorkOrder =
            serde_json::from_value(json!({"status": "scrapped"})).expect("decode");
        assert_eq!(order.status, WorkOrderStatus::Other);
    }
}
