//! Inventory item record and patch.

use serde::{Deserialize, Serialize};

use crate::types::CollectionHandle;

use super::Record;

/// Stock line tracked per factory.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InventoryItem {
    /// Item display name.
    pub item_name: String,
    /// Category such as `Raw Materials` or `Tools`.
    pub category: String,
    /// Quantity on hand.
    pub quantity: f64,
    /// Unit of measure.
    pub unit: String,
    /// Reorder threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_stock: Option<f64>,
    /// Storage ceiling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_stock: Option<f64>,
    /// Supplier name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub supplier: String,
    /// Storage location.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub location: String,
    /// Free-form description.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Owning tenant.
    pub factory_id: String,
}

impl InventoryItem {
    /// True when a threshold is set and quantity is at or below it.
    pub fn is_low_stock(&self) -> bool {
        self.min_stock.is_some_and(|min| self.quantity <= min)
    }
}

impl Record for InventoryItem {
    const COLLECTION: &'static str = CollectionHandle::INVENTORY;
    type Patch = InventoryPatch;

    fn factory_id(&self) -> &str {
        &self.factory_id
    }
}

/// Sparse inventory update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryPatch {
    /// Replacement name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    /// Replacement category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Replacement quantity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    /// Replacement unit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Replacement reorder threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_stock: Option<f64>,
    /// Replacement storage ceiling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_stock: Option<f64>,
    /// Replacement supplier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,
    /// Replacement location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Replacement description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
