use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc::UnboundedReceiver;

use shopfloor::{
    document::Mutation,
    error::RemoteError,
    gate::{MutationGate, MutationOutcome},
    model::{InventoryItem, InventoryPatch, WorkOrder, WorkOrderPatch},
    notify::{ChannelNotifier, Notice, NoticeLevel},
    remote::memory::MemoryRemote,
    sync::SyncStore,
    types::DocId,
};

const WAIT: Duration = Duration::from_secs(2);

fn order(number: &str) -> WorkOrder {
    WorkOrder {
        order_number: number.to_string(),
        quantity: 10,
        factory_id: "factory-1".to_string(),
        ..WorkOrder::default()
    }
}

fn gate_for<T>(remote: &MemoryRemote) -> (MutationGate<MemoryRemote, T>, UnboundedReceiver<Notice>)
where
    T: shopfloor::model::Record + Clone,
{
    let (notifier, notices) = ChannelNotifier::new();
    let store = SyncStore::<_, T>::for_record(remote.clone());
    (MutationGate::new(store, Arc::new(notifier)), notices)
}

#[tokio::test]
async fn notify_true_reports_each_successful_write() {
    let remote = MemoryRemote::new();
    let (gate, mut notices) = gate_for::<WorkOrder>(&remote);

    let outcome = gate
        .perform(Mutation::<_, WorkOrderPatch>::Create(order("WO-1")), true)
        .await
        .expect("create");
    let id = outcome.created_id().cloned().expect("created id");

    let patch = WorkOrderPatch {
        progress: Some(50),
        ..WorkOrderPatch::default()
    };
    assert_eq!(
        gate.perform(Mutation::Update(id.clone(), patch), true).await.expect("update"),
        MutationOutcome::Updated
    );
    assert_eq!(
        gate.perform(Mutation::<_, WorkOrderPatch>::Delete(id), true)
            .await
            .expect("delete"),
        MutationOutcome::Deleted
    );

    let messages: Vec<_> = std::iter::from_fn(|| notices.try_recv().ok())
        .map(|notice| (notice.level, notice.message))
        .collect();
    assert_eq!(
        messages,
        vec![
            (NoticeLevel::Success, "Work order added successfully!".to_string()),
            (NoticeLevel::Success, "Work order updated successfully!".to_string()),
            (NoticeLevel::Success, "Work order deleted successfully!".to_string()),
        ]
    );
}

#[tokio::test]
async fn failures_are_returned_and_reported() {
    let remote = MemoryRemote::new();
    let (gate, mut notices) = gate_for::<InventoryItem>(&remote);

    let err = gate
        .perform(
            Mutation::Update(DocId::new("ghost"), InventoryPatch::default()),
            true,
        )
        .await
        .expect_err("missing doc");
    assert_eq!(err.remote_error(), Some(&RemoteError::NotFound));

    let notice = notices.try_recv().expect("failure notice");
    assert_eq!(notice.level, NoticeLevel::Error);
    assert_eq!(notice.title, "Error");
    assert_eq!(notice.message, "Failed to update inventory item: document not found");
}

#[tokio::test]
async fn notify_false_still_returns_the_error() {
    let remote = MemoryRemote::new();
    let (gate, mut notices) = gate_for::<WorkOrder>(&remote);

    remote.fail_next_write(RemoteError::Unavailable).await.expect("inject");
    let err = gate
        .perform(Mutation::<_, WorkOrderPatch>::Create(order("WO-2")), false)
        .await
        .expect_err("unavailable");
    assert_eq!(err.remote_error(), Some(&RemoteError::Unavailable));

    gate.perform(Mutation::<_, WorkOrderPatch>::Create(order("WO-3")), false)
        .await
        .expect("second attempt");
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn failed_update_leaves_the_snapshot_untouched() {
    let remote = MemoryRemote::new();
    let (gate, _notices) = gate_for::<WorkOrder>(&remote);
    let mut sub = gate.store().open();

    let id = gate
        .perform(Mutation::<_, WorkOrderPatch>::Create(order("WO-4")), false)
        .await
        .expect("create")
        .created_id()
        .cloned()
        .expect("id");
    let before = tokio::time::timeout(WAIT, sub.wait_for(|s| s.contains(&id)))
        .await
        .expect("echo");

    remote.deny_writes(gate.store().handle(), true).await.expect("deny");
    let patch = WorkOrderPatch {
        notes: Some("never".to_string()),
        ..WorkOrderPatch::default()
    };
    gate.perform(Mutation::Update(id.clone(), patch), true)
        .await
        .expect_err("denied");

    let after = gate.store().snapshot();
    assert_eq!(after.revision(), before.revision());
    assert_eq!(after.get(&id).map(|doc| &doc.data), before.get(&id).map(|doc| &doc.data));
}

#[tokio::test]
async fn spawned_mutations_complete_without_the_caller_waiting() {
    let remote = MemoryRemote::new();
    let (gate, mut notices) = gate_for::<WorkOrder>(&remote);

    remote.hold_writes();
    let task = gate.spawn(Mutation::<_, WorkOrderPatch>::Create(order("WO-5")), true);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!task.is_finished());
    assert!(notices.try_recv().is_err());

    remote.release_writes();
    let outcome = tokio::time::timeout(WAIT, task)
        .await
        .expect("finished")
        .expect("join")
        .expect("create");
    let id = outcome.created_id().cloned().expect("id");
    assert!(remote.get(gate.store().handle(), &id).await.expect("get").is_some());
    assert_eq!(
        notices.recv().await.map(|n| n.message),
        Some("Work order added successfully!".to_string())
    );
}
