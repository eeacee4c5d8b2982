//! Worker to work-order assignment.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    document::Document,
    error::WriteError,
    model::{WorkOrder, WorkOrderPatch, WorkOrderStatus, Worker},
    notify::{Notice, Notifier},
    remote::RemoteStore,
    sync::{Snapshot, SyncStore},
    types::DocId,
};

/// An assignment change was refused or failed.
#[derive(Debug, Error)]
pub enum AssignmentError {
    /// The worker is not in the workers snapshot.
    #[error("worker {0} not found")]
    WorkerNotFound(DocId),
    /// The worker still has open work orders.
    #[error("worker {worker} still has {open} open work order(s)")]
    WorkerHasOpenOrders {
        /// Worker that was to be removed.
        worker: DocId,
        /// Number of assigned, unfinished orders.
        open: usize,
    },
    /// The work-order update failed.
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Assigns and unassigns workers on the work-orders collection.
pub struct WorkerAssignment<R> {
    orders: SyncStore<R, WorkOrder>,
    notifier: Arc<dyn Notifier>,
}

impl<R: RemoteStore> WorkerAssignment<R> {
    /// Writes through `orders` and reports to `notifier`.
    pub fn new(orders: SyncStore<R, WorkOrder>, notifier: Arc<dyn Notifier>) -> Self {
        Self { orders, notifier }
    }

    /// Records `worker_id` (looked up in `workers`) on work order `order_id`.
    pub async fn assign(
        &self,
        workers: &Snapshot<Worker>,
        order_id: &DocId,
        worker_id: &DocId,
    ) -> Result<(), AssignmentError> {
        let result = self.try_assign(workers, order_id, worker_id).await;
        match &result {
            Ok(name) => self.notifier.notify(Notice::success(
                "Worker Assigned",
                format!("{name} has been assigned to the work order."),
            )),
            Err(err) => {
                warn!(order = %order_id, worker = %worker_id, error = %err, "assignment failed");
                self.notifier.notify(Notice::error(
                    "Assignment Failed",
                    "Failed to assign worker to work order.",
                ));
            }
        }
        result.map(|_| ())
    }

    async fn try_assign(
        &self,
        workers: &Snapshot<Worker>,
        order_id: &DocId,
        worker_id: &DocId,
    ) -> Result<String, AssignmentError> {
        let worker = workers
            .get(worker_id)
            .ok_or_else(|| AssignmentError::WorkerNotFound(worker_id.clone()))?;
        let patch = WorkOrderPatch {
            assigned_worker: Some(worker.data.name.clone()),
            assigned_worker_id: Some(worker_id.to_string()),
            ..WorkOrderPatch::default()
        };
        self.orders.update(order_id, &patch).await?;
        info!(order = %order_id, worker = %worker_id, "worker assigned");
        Ok(worker.data.name.clone())
    }

    /// Clears the assigned worker on `order_id`.
    pub async fn unassign(&self, order_id: &DocId) -> Result<(), AssignmentError> {
        let patch = WorkOrderPatch {
            assigned_worker: Some(String::new()),
            assigned_worker_id: Some(String::new()),
            ..WorkOrderPatch::default()
        };
        match self.orders.update(order_id, &patch).await {
            Ok(()) => {
                info!(order = %order_id, "worker unassigned");
                self.notifier.notify(Notice::success(
                    "Worker Unassigned",
                    "Worker has been removed from the work order.",
                ));
                Ok(())
            }
            Err(err) => {
                self.notifier.notify(Notice::error(
                    "Unassignment Failed",
                    "Failed to remove worker from work order.",
                ));
                Err(err.into())
            }
        }
    }
}

/// Orders assigned to `worker_id` that are not completed.
pub fn open_orders_for_worker<'a>(orders: &'a Snapshot<WorkOrder>, worker_id: &DocId) -> Vec<&'a Document<WorkOrder>> {
    orders
        .iter()
        .filter(|doc| doc.data.is_assigned_to(worker_id.as_str()) && doc.data.status != WorkOrderStatus::Completed)
        .collect()
}

/// Workers whose status is active.
pub fn available_workers(workers: &Snapshot<Worker>) -> Vec<&Document<Worker>> {
    workers.iter().filter(|doc| doc.data.is_active()).collect()
}

/// Refuses removal of a worker who still holds open orders.
pub fn ensure_worker_removable(orders: &Snapshot<WorkOrder>, worker_id: &DocId) -> Result<(), AssignmentError> {
    match open_orders_for_worker(orders, worker_id).len() {
        0 => Ok(()),
        open => Err(AssignmentError::WorkerHasOpenOrders {
            worker: worker_id.clone(),
            open,
        }),
    }
}
