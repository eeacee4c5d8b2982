use serde::{Deserialize, Serialize};

use crate::{identity::Role, types::CollectionHandle};

use super::Record;

/// Stored profile of a dashboard user.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    /// Display name.
    pub name: String,
    /// Login email.
    pub email: String,
    /// Access role.
    pub role: Role,
    /// Owning tenant.
    pub factory_id: String,
    /// Department, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// Whether the account may sign in.
    pub is_active: bool,
}

impl Record for UserProfile {
    const COLLECTION: &'static str = CollectionHandle::USERS;
    type Patch = serde_json::Map<String, serde_json::Value>;

    fn factory_id(&self) -> &str {
        &self.factory_id
    }
}
