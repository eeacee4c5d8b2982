//! Real-time collection sync and optimistic mutations for a shop-floor dashboard.
//!
//! # Examples
//!
//! Aggregating documents with [`metrics`]:
//! ```
//! use shopfloor::{
//!     document::Document,
//!     metrics::WorkOrderSummary,
//!     model::{WorkOrder, WorkOrderStatus},
//!     types::DocId,
//! };
//!
//! let orders = vec![Document {
//!     id: DocId::new("wo-1"),
//!     created_at: 1,
//!     updated_at: 1,
//!     data: WorkOrder {
//!         order_number: "WO-900".to_string(),
//!         quantity: 10,
//!         status: WorkOrderStatus::Completed,
//!         progress: Some(100),
//!         ..WorkOrder::default()
//!     },
//! }];
//! let summary = WorkOrderSummary::from_documents(&orders);
//! assert_eq!(summary.completed, 1);
//! assert_eq!(summary.completion_rate(), 100);
//! ```
//!
//! Syncing a collection against a durable in-process server:
//! ```no_run
//! use std::sync::Arc;
//!
//! use shopfloor::{
//!     document::Mutation,
//!     gate::MutationGate,
//!     model::{WorkOrder, WorkOrderPatch, WorkOrderStatus},
//!     notify::TracingNotifier,
//!     persist::sqlite::SqliteChangeSink,
//!     remote::memory::{MemoryRemote, ServerConfig},
//!     sync::SyncStore,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sink = SqliteChangeSink::open("shopfloor.db").expect("open sqlite");
//! let state = sink.load_state().expect("replay");
//! let remote = MemoryRemote::from_state(state, Box::new(sink), ServerConfig::default());
//!
//! let orders = SyncStore::<_, WorkOrder>::for_record(remote.clone());
//! let mut subscription = orders.open();
//! subscription.wait_for(|snapshot| snapshot.is_live()).await;
//!
//! let gate = MutationGate::new(orders.clone(), Arc::new(TracingNotifier));
//! let created = gate
//!     .perform(
//!         Mutation::<_, WorkOrderPatch>::Create(WorkOrder {
//!             order_number: "WO-900".to_string(),
//!             quantity: 10,
//!             ..WorkOrder::default()
//!         }),
//!         true,
//!     )
//!     .await
//!     .expect("create");
//! let id = created.created_id().cloned().expect("id");
//!
//! let patch = WorkOrderPatch {
//!     status: Some(WorkOrderStatus::Completed),
//!     progress: Some(100),
//!     ..WorkOrderPatch::default()
//! };
//! gate.perform(Mutation::Update(id, patch), true).await.expect("update");
//!
//! subscription.close();
//! remote.shutdown().await.expect("shutdown");
//! # }
//! ```

/// Worker to work-order assignment.
pub mod assignment;
/// Monotonic timestamp source.
pub mod clock;
/// Documents, field maps, and mutation intents.
pub mod document;
/// Error types.
pub mod error;
/// Mutation gate with user notices.
pub mod gate;
/// Caller identity and tenant stamping.
pub mod identity;
/// Dashboard aggregates.
pub mod metrics;
/// Typed records per collection.
pub mod model;
/// User-facing notices.
pub mod notify;
/// Change journal abstraction and SQLite implementation.
pub mod persist;
/// Remote document store boundary and in-process server.
pub mod remote;
/// First-run sample data.
pub mod seed;
/// Collection sync store and snapshots.
pub mod sync;
/// Shared primitive types.
pub mod types;
