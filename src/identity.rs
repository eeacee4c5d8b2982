//! Current-user identity supplied by the external auth provider.
//!
//! Tenant isolation is a caller convention: every payload carries a
//! `factoryId`, and views filter on it. Nothing here enforces access.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{document::Fields, types::FACTORY_ID};

/// Access role of a user or worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access.
    Admin,
    /// Manages a floor.
    Supervisor,
    /// Shop-floor worker.
    #[default]
    Worker,
    /// External customer.
    Client,
}

/// Authenticated user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Provider-issued user id.
    pub user_id: String,
    /// Login email.
    pub email: String,
    /// Access role.
    pub role: Role,
    /// Tenant the user belongs to.
    pub factory_id: String,
}

impl Identity {
    /// Sets `factoryId` on an outgoing payload.
    pub fn stamp(&self, fields: &mut Fields) {
        fields.insert(FACTORY_ID.to_string(), Value::String(self.factory_id.clone()));
    }

    /// True when a stored record belongs to this user's tenant.
    pub fn owns(&self, factory_id: &str) -> bool {
        self.factory_id == factory_id
    }

    /// True for roles allowed to create and edit records.
    pub fn can_edit(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Supervisor)
    }
}
