//! Worker record and patch.

use serde::{Deserialize, Serialize};

use crate::{identity::Role, types::CollectionHandle};

use super::Record;

/// Employment state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerStatus {
    /// Available for assignment.
    #[default]
    Active,
    /// Not currently working.
    Inactive,
    /// Temporarily away.
    OnLeave,
    /// Any value this build does not know.
    #[serde(other)]
    Other,
}

/// Shop-floor worker.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Worker {
    /// Full name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Employer-issued id.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub employee_id: String,
    /// Department.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub department: String,
    /// Shift name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub shift: String,
    /// Skill tags.
    pub skills: Vec<String>,
    /// Access role.
    pub role: Role,
    /// Employment state.
    pub status: WorkerStatus,
    /// Owning tenant.
    pub factory_id: String,
}

impl Worker {
    /// True when the worker can take assignments.
    pub fn is_active(&self) -> bool {
        self.status == WorkerStatus::Active
    }
}

impl Record for Worker {
    const COLLECTION: &'static str = CollectionHandle::WORKERS;
    type Patch = WorkerPatch;

    fn factory_id(&self) -> &str {
        &self.factory_id
    }
}

/// Sparse worker update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPatch {
    /// Replacement name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Replacement email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Replacement department.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// Replacement shift.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift: Option<String>,
    /// Replacement skill tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
    /// Replacement role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Replacement status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkerStatus>,
}

/// Splits comma-separated skill text, dropping blanks.
pub fn parse_skills(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skills_are_trimmed_and_blank_entries_dropped() {
        assert_eq!(
            parse_skills(" Welding, Assembly,, "),
            vec!["Welding".to_string(), "Assembly".to_string()]
        );
        assert!(parse_skills("").is_empty());
    }

    #[test]
    fn default_worker_is_active() {
        assert!(Worker::default().is_active());
        assert_eq!(Worker::default().role, Role::Worker);
    }
}
