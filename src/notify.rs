//! User-facing notices emitted alongside writes and subscription failures.

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{
    error::{WriteError, WriteOp},
    types::CollectionHandle,
};

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeLevel {
    /// The action worked.
    Success,
    /// The action failed.
    Error,
}

/// One toast-style message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Short heading.
    pub title: String,
    /// Body text.
    pub message: String,
}

impl Notice {
    /// Success notice with free-form text.
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            title: title.into(),
            message: message.into(),
        }
    }

    /// Error notice with free-form text.
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.into(),
            message: message.into(),
        }
    }

    /// `"Work order added successfully!"` and friends.
    pub fn write_succeeded(collection: &CollectionHandle, op: WriteOp) -> Self {
        Self {
            level: NoticeLevel::Success,
            title: "Success".to_string(),
            message: format!(
                "{} {} successfully!",
                capitalize(collection.item_label()),
                past_tense(op)
            ),
        }
    }

    /// `"Failed to add work order: permission denied"` and friends.
    pub fn write_failed(collection: &CollectionHandle, op: WriteOp, err: &WriteError) -> Self {
        let detail = match err.remote_error() {
            Some(remote) => remote.to_string(),
            None => err.to_string(),
        };
        Self {
            level: NoticeLevel::Error,
            title: "Error".to_string(),
            message: format!("Failed to {} {}: {detail}", verb(op), collection.item_label()),
        }
    }

    /// Non-blocking warning for a failed collection listener.
    pub fn load_failed() -> Self {
        Self::error("Database Error", "Failed to load data. Please refresh the page.")
    }
}

fn verb(op: WriteOp) -> &'static str {
    match op {
        WriteOp::Create => "add",
        WriteOp::Update => "update",
        WriteOp::Delete => "delete",
    }
}

fn past_tense(op: WriteOp) -> &'static str {
    match op {
        WriteOp::Create => "added",
        WriteOp::Update => "updated",
        WriteOp::Delete => "deleted",
    }
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Side channel that shows notices to the user.
pub trait Notifier: Send + Sync + 'static {
    /// Delivers one notice; must not block.
    fn notify(&self, notice: Notice);
}

/// Forwards notices to a UI task over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    /// Creates the notifier and the receiver the UI drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        let _ = self.tx.send(notice);
    }
}

/// Writes notices to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => info!(title = %notice.title, "{}", notice.message),
            NoticeLevel::Error => warn!(title = %notice.title, "{}", notice.message),
        }
    }
}

/// Drops every notice.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _notice: Notice) {}
}
