use std::{collections::BTreeMap, time::Duration};

use proptest::prelude::*;
use serde_json::{Value, json};

use shopfloor::{
    document::{Fields, RawDocument, merge_fields, to_fields},
    model::{WorkOrder, WorkOrderPatch, WorkOrderStatus},
    remote::{Direction, OrderBy, memory::MemoryRemote},
    sync::SyncStore,
    types::DocId,
};

#[derive(Debug, Clone)]
enum Action {
    Create { quantity: u16 },
    SetQuantity { target: u8, quantity: u16 },
    Complete { target: u8 },
    Delete { target: u8 },
    DeleteMissing,
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => (0u16..1000).prop_map(|quantity| Action::Create { quantity }),
        2 => (0u8..16, 0u16..1000).prop_map(|(target, quantity)| Action::SetQuantity { target, quantity }),
        1 => (0u8..16).prop_map(|target| Action::Complete { target }),
        1 => (0u8..16).prop_map(|target| Action::Delete { target }),
        1 => Just(Action::DeleteMissing),
    ]
}

fn pick(ids: &[DocId], target: u8) -> Option<DocId> {
    if ids.is_empty() {
        None
    } else {
        Some(ids[usize::from(target) % ids.len()].clone())
    }
}

/// Applies `actions` through a live store; returns (snapshot view, expected model).
async fn run_actions(actions: Vec<Action>) -> (Vec<(DocId, u64, u64, WorkOrder)>, BTreeMap<DocId, WorkOrder>) {
    let remote = MemoryRemote::new();
    let store = SyncStore::<_, WorkOrder>::for_record(remote.clone());
    let mut sub = store.open();
    let mut model = BTreeMap::<DocId, WorkOrder>::new();
    let mut live_ids = Vec::<DocId>::new();

    for (n, action) in actions.into_iter().enumerate() {
        match action {
            Action::Create { quantity } => {
                let order = WorkOrder {
                    order_number: format!("WO-{n}"),
                    quantity: u32::from(quantity),
                    ..WorkOrder::default()
                };
                let id = store.create(&order).await.expect("create");
                model.insert(id.clone(), order);
                live_ids.push(id);
            }
            Action::SetQuantity { target, quantity } => {
                if let Some(id) = pick(&live_ids, target) {
                    let patch = WorkOrderPatch {
                        quantity: Some(u32::from(quantity)),
                        ..WorkOrderPatch::default()
                    };
                    store.update(&id, &patch).await.expect("update");
                    if let Some(order) = model.get_mut(&id) {
                        order.quantity = u32::from(quantity);
                    }
                }
            }
            Action::Complete { target } => {
                if let Some(id) = pick(&live_ids, target) {
                    let patch = WorkOrderPatch {
                        status: Some(WorkOrderStatus::Completed),
                        progress: Some(100),
                        ..WorkOrderPatch::default()
                    };
                    store.update(&id, &patch).await.expect("complete");
                    if let Some(order) = model.get_mut(&id) {
                        order.status = WorkOrderStatus::Completed;
                        order.progress = Some(100);
                    }
                }
            }
            Action::Delete { target } => {
                if let Some(id) = pick(&live_ids, target) {
                    store.delete(&id).await.expect("delete");
                    assert!(!store.snapshot().contains(&id), "deleted id visible after ack");
                    model.remove(&id);
                    live_ids.retain(|live| *live != id);
                }
            }
            Action::DeleteMissing => {
                let revision = store.snapshot().revision();
                assert!(store.delete(&DocId::new("missing")).await.is_err());
                assert!(store.snapshot().revision() >= revision);
            }
        }
    }

    let server = remote.documents(store.handle()).await.expect("server docs");
    let expected: Vec<(DocId, u64)> = server.iter().map(|doc| (doc.id.clone(), doc.updated_at())).collect();
    let snapshot = tokio::time::timeout(
        Duration::from_secs(2),
        sub.wait_for(|s| s.iter().map(|doc| (doc.id.clone(), doc.updated_at)).collect::<Vec<_>>() == expected),
    )
    .await
    .expect("snapshot converged");

    let view = snapshot
        .iter()
        .map(|doc| (doc.id.clone(), doc.created_at, doc.updated_at, doc.data.clone()))
        .collect();
    (view, model)
}

fn raw(id: u8, created_at: Option<u64>) -> RawDocument {
    let mut fields = Fields::new();
    if let Some(ts) = created_at {
        fields.insert("createdAt".to_string(), Value::from(ts));
    }
    RawDocument {
        id: DocId::new(format!("d{id:03}")),
        fields,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn snapshot_converges_to_the_server_after_random_writes(actions in prop::collection::vec(action_strategy(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let (view, model) = runtime.block_on(run_actions(actions));

        prop_assert_eq!(view.len(), model.len());
        for window in view.windows(2) {
            prop_assert!(window[0].1 >= window[1].1, "not newest first");
        }
        for (id, created_at, updated_at, data) in &view {
            prop_assert!(created_at <= updated_at);
            prop_assert_eq!(model.get(id), Some(data));
        }
    }
}

proptest! {
    #[test]
    fn merge_is_idempotent_and_keeps_untouched_fields(
        base in prop::collection::btree_map("[a-e]", 0i64..100, 0..5),
        patch in prop::collection::btree_map("[a-e]", 0i64..100, 0..5),
    ) {
        let base_fields = to_fields(&json!(base)).expect("base");
        let patch_fields = to_fields(&json!(patch)).expect("patch");

        let mut once = base_fields.clone();
        merge_fields(&mut once, &patch_fields);
        let mut twice = once.clone();
        merge_fields(&mut twice, &patch_fields);
        prop_assert_eq!(&once, &twice);

        for (key, value) in &base {
            let expected = patch.get(key).unwrap_or(value);
            prop_assert_eq!(once.get(key), Some(&Value::from(*expected)));
        }
        for (key, value) in &patch {
            prop_assert_eq!(once.get(key), Some(&Value::from(*value)));
        }
    }

    #[test]
    fn order_by_is_total_and_direction_consistent(stamps in prop::collection::vec(prop::option::of(0u64..50), 0..40)) {
        let docs: Vec<RawDocument> = stamps
            .iter()
            .enumerate()
            .map(|(n, ts)| raw(n as u8, *ts))
            .collect();

        let mut desc = docs.clone();
        OrderBy::newest_first().sort(&mut desc);
        let ascending = OrderBy { field: "createdAt".to_string(), direction: Direction::Ascending };
        let mut asc = docs.clone();
        ascending.sort(&mut asc);

        prop_assert_eq!(desc.len(), docs.len());
        let stamped_desc: Vec<u64> = desc.iter().filter_map(|d| d.fields.get("createdAt").and_then(Value::as_u64)).collect();
        prop_assert!(stamped_desc.windows(2).all(|w| w[0] >= w[1]));
        let stamped_asc: Vec<u64> = asc.iter().filter_map(|d| d.fields.get("createdAt").and_then(Value::as_u64)).collect();
        prop_assert!(stamped_asc.windows(2).all(|w| w[0] <= w[1]));

        // Unstamped documents trail in both directions.
        let trailing = stamps.iter().filter(|ts| ts.is_none()).count();
        prop_assert!(desc.iter().rev().take(trailing).all(|d| !d.fields.contains_key("createdAt")));
        prop_assert!(asc.iter().rev().take(trailing).all(|d| !d.fields.contains_key("createdAt")));
    }
}
