//! First-run sample data.
//!
//! Seeding goes through the [`MutationGate`] with notices turned off so a
//! new tenant does not get one toast per sample record.

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info};

use crate::{
    document::Mutation,
    error::WriteError,
    gate::MutationGate,
    model::{InventoryItem, Priority, WorkOrder, WorkOrderStatus, Worker, WorkerStatus},
    remote::RemoteStore,
};

/// Result of [`seed_if_empty`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// This many records were created.
    Seeded(usize),
    /// The collection already has documents.
    AlreadyPopulated,
    /// No server snapshot has been applied yet, so emptiness is unknown.
    NotLive,
}

/// Creates `samples` when the gate's collection is live and empty.
///
/// Stops at the first failed create; records created before it are kept.
pub async fn seed_if_empty<R, T>(gate: &MutationGate<R, T>, samples: Vec<T>) -> Result<SeedOutcome, WriteError>
where
    R: RemoteStore,
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let store = gate.store();
    let snapshot = store.snapshot();
    if !snapshot.is_live() {
        debug!(collection = %store.handle(), "seed skipped; collection not live");
        return Ok(SeedOutcome::NotLive);
    }
    if !snapshot.is_empty() {
        return Ok(SeedOutcome::AlreadyPopulated);
    }

    let count = samples.len();
    for sample in samples {
        gate.perform(Mutation::<T, ()>::Create(sample), false).await?;
    }
    info!(collection = %store.handle(), count, "collection seeded");
    Ok(SeedOutcome::Seeded(count))
}

/// Two starter work orders.
pub fn sample_work_orders(factory_id: &str) -> Vec<WorkOrder> {
    vec![
        WorkOrder {
            order_number: "WO-001".to_string(),
            product_name: "Steel Frame A".to_string(),
            quantity: 100,
            priority: Priority::High,
            status: WorkOrderStatus::InProgress,
            due_date: Some(1_734_652_800_000),
            assigned_worker: "John Doe".to_string(),
            factory_id: factory_id.to_string(),
            ..WorkOrder::default()
        },
        WorkOrder {
            order_number: "WO-002".to_string(),
            product_name: "Engine Block B".to_string(),
            quantity: 50,
            priority: Priority::Medium,
            status: WorkOrderStatus::Pending,
            due_date: Some(1_735_084_800_000),
            assigned_worker: "Jane Smith".to_string(),
            factory_id: factory_id.to_string(),
            ..WorkOrder::default()
        },
    ]
}

/// Two starter inventory lines.
pub fn sample_inventory(factory_id: &str) -> Vec<InventoryItem> {
    vec![
        InventoryItem {
            item_name: "Steel Bars".to_string(),
            category: "Raw Materials".to_string(),
            quantity: 500.0,
            unit: "pieces".to_string(),
            min_stock: Some(100.0),
            max_stock: Some(1000.0),
            supplier: "MetalCorp Inc".to_string(),
            factory_id: factory_id.to_string(),
            ..InventoryItem::default()
        },
        InventoryItem {
            item_name: "Aluminum Sheets".to_string(),
            category: "Raw Materials".to_string(),
            quantity: 250.0,
            unit: "sheets".to_string(),
            min_stock: Some(50.0),
            max_stock: Some(500.0),
            supplier: "AlumTech Ltd".to_string(),
            factory_id: factory_id.to_string(),
            ..InventoryItem::default()
        },
    ]
}

/// Two starter workers.
pub fn sample_workers(factory_id: &str) -> Vec<Worker> {
    let worker = |name: &str, employee_id: &str, department: &str, shift: &str, skills: [&str; 2]| Worker {
        name: name.to_string(),
        employee_id: employee_id.to_string(),
        department: department.to_string(),
        shift: shift.to_string(),
        skills: skills.iter().map(|s| s.to_string()).collect(),
        status: WorkerStatus::Active,
        factory_id: factory_id.to_string(),
        ..Worker::default()
    };
    vec![
        worker("John Doe", "EMP-001", "Production", "Morning", ["Welding", "Assembly"]),
        worker("Jane Smith", "EMP-002", "Quality Control", "Evening", ["Inspection", "Testing"]),
    ]
}
