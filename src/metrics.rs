//! Dashboard aggregates computed over in-memory documents.

use crate::{
    document::Document,
    model::{InventoryItem, WorkOrder, WorkOrderStatus, Worker},
};

/// Work-order counters shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkOrderSummary {
    /// All orders.
    pub total: usize,
    /// Orders not started.
    pub pending: usize,
    /// Orders on the floor.
    pub in_progress: usize,
    /// Finished orders.
    pub completed: usize,
    /// Paused orders.
    pub on_hold: usize,
    /// Mean progress in percent, rounded; orders without progress count as zero.
    pub average_progress: u32,
    /// Sum of ordered units.
    pub total_quantity: u64,
}

impl WorkOrderSummary {
    /// Aggregates `orders`.
    pub fn from_documents(orders: &[Document<WorkOrder>]) -> Self {
        let mut summary = Self {
            total: orders.len(),
            ..Self::default()
        };
        let mut progress_sum: u64 = 0;
        for order in orders.iter().map(|doc| &doc.data) {
            match order.status {
                WorkOrderStatus::Pending => summary.pending += 1,
                WorkOrderStatus::InProgress => summary.in_progress += 1,
                WorkOrderStatus::Completed => summary.completed += 1,
                WorkOrderStatus::OnHold => summary.on_hold += 1,
                WorkOrderStatus::Other => {}
            }
            progress_sum += u64::from(order.progress.unwrap_or(0));
            summary.total_quantity += u64::from(order.quantity);
        }
        summary.average_progress = rounded_ratio(progress_sum, summary.total as u64, 1);
        summary
    }

    /// Completed share of all orders in percent, rounded; zero when empty.
    pub fn completion_rate(&self) -> u32 {
        rounded_ratio(self.completed as u64, self.total as u64, 100)
    }
}

/// Headcount counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkforceSummary {
    /// Workers with active status.
    pub active: usize,
    /// All workers.
    pub total: usize,
}

impl WorkforceSummary {
    /// Aggregates `workers`.
    pub fn from_documents(workers: &[Document<Worker>]) -> Self {
        Self {
            active: workers.iter().filter(|doc| doc.data.is_active()).count(),
            total: workers.len(),
        }
    }
}

/// Items at or below their reorder threshold.
pub fn low_stock_items(items: &[Document<InventoryItem>]) -> Vec<&Document<InventoryItem>> {
    items.iter().filter(|doc| doc.data.is_low_stock()).collect()
}

// Half rounds up, matching how the dashboard displays percentages.
fn rounded_ratio(numerator: u64, denominator: u64, scale: u64) -> u32 {
    if denominator == 0 {
        return 0;
    }
    let scaled = numerator * scale;
    ((scaled * 2 + denominator) / (denominator * 2)) as u32
}
