use serde::{Deserialize, Serialize};

use crate::types::{CollectionHandle, Millis};

use super::Record;

/// Operating state of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    /// Producing.
    Running,
    /// Powered but not producing.
    #[default]
    Idle,
    /// Planned downtime.
    Maintenance,
    /// Unplanned downtime.
    Breakdown,
    /// Any value this build does not know.
    #[serde(other)]
    Other,
}

/// Production machine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Machine {
    /// Display name.
    pub name: String,
    /// Machine type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Operating state.
    pub status: MachineStatus,
    /// Hours spent producing.
    pub utilization_hours: f64,
    /// Hours available.
    pub total_hours: f64,
    /// Operator currently assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<String>,
    /// Owning tenant.
    pub factory_id: String,
}

impl Machine {
    /// Share of available hours spent producing, in `0.0..=1.0`.
    pub fn utilization(&self) -> f64 {
        if self.total_hours <= 0.0 {
            return 0.0;
        }
        (self.utilization_hours / self.total_hours).clamp(0.0, 1.0)
    }
}

impl Record for Machine {
    const COLLECTION: &'static str = CollectionHandle::MACHINES;
    type Patch = serde_json::Map<String, serde_json::Value>;

    fn factory_id(&self) -> &str {
        &self.factory_id
    }
}

/// One day of production figures.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductionMetric {
    /// Day the figures cover, epoch milliseconds.
    pub date: Millis,
    /// Orders closed that day.
    pub orders_completed: u32,
    /// Units produced.
    pub total_production: u64,
    /// Efficiency percent.
    pub efficiency: f64,
    /// Defect percent.
    pub defect_rate: f64,
    /// Owning tenant.
    pub factory_id: String,
}

impl Record for ProductionMetric {
    const COLLECTION: &'static str = CollectionHandle::PRODUCTION_METRICS;
    type Patch = serde_json::Map<String, serde_json::Value>;

    fn factory_id(&self) -> &str {
        &self.factory_id
    }
}
