//! Property tests for change detection.

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use worldsync_core::{
    ChangeOperation, EntityId, EntityPatch, Identity, NewEntity, SyncGroup, World,
};

fn world() -> World {
    World::builder()
        .sync_group(SyncGroup::new("NORMAL", 50, 10_000))
        .build()
        .unwrap()
}

fn meta() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(json!({})),
        any::<u8>().prop_map(|n| json!({ "n": n })),
        "[a-z]{1,6}".prop_map(|s| json!({ "tag": s })),
    ]
}

#[derive(Debug, Clone)]
enum Op {
    Insert(usize, Value),
    Rename(usize, usize),
    Touch(usize, Value),
    Delete(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..6usize, meta()).prop_map(|(i, m)| Op::Insert(i, m)),
        (0..6usize, 0..6usize).prop_map(|(i, j)| Op::Rename(i, j)),
        (0..6usize, meta()).prop_map(|(i, m)| Op::Touch(i, m)),
        (0..6usize).prop_map(Op::Delete),
    ]
}

fn apply(world: &World, op: &Op) {
    let store = world.entities();
    let sys = &Identity::System;
    let name = |i: usize| format!("e{i}");
    // Conflicts and missing names are expected outcomes here.
    match op {
        Op::Insert(i, m) => {
            let _ = store.insert(sys, NewEntity::new(name(*i), "NORMAL").with_meta_data(m.clone()));
        }
        Op::Rename(i, j) => {
            if let Ok(e) = store.get_by_name(sys, &name(*i)) {
                let _ = store.update(sys, e.entity_id, EntityPatch::new().name(name(*j)));
            }
        }
        Op::Touch(i, m) => {
            if let Ok(e) = store.get_by_name(sys, &name(*i)) {
                let _ = store.update(sys, e.entity_id, EntityPatch::new().meta_data(m.clone()));
            }
        }
        Op::Delete(i) => {
            if let Ok(e) = store.get_by_name(sys, &name(*i)) {
                let _ = store.delete(sys, e.entity_id);
            }
        }
    }
}

fn contents(world: &World) -> BTreeMap<EntityId, Map<String, Value>> {
    world
        .entities()
        .list_group(&Identity::System, "NORMAL")
        .unwrap()
        .into_iter()
        .map(|e| (e.entity_id, e.content_fields()))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn changes_replay_to_next_state(
        setup in prop::collection::vec(op(), 0..12),
        between in prop::collection::vec(op(), 0..12),
    ) {
        let world = world();
        for op in &setup {
            apply(&world, op);
        }
        let mut state = contents(&world);
        world.capture_tick("NORMAL").unwrap();
        for op in &between {
            apply(&world, op);
        }
        world.capture_tick("NORMAL").unwrap();

        let changes = world.changes_since_last_tick("NORMAL").unwrap();
        prop_assert!(changes.windows(2).all(|w| w[0].entity_id < w[1].entity_id));
        for change in changes {
            match change.operation {
                ChangeOperation::Insert => {
                    prop_assert!(!state.contains_key(&change.entity_id));
                    state.insert(change.entity_id, change.changes);
                }
                ChangeOperation::Update => {
                    prop_assert!(!change.changes.is_empty());
                    let fields = state.get_mut(&change.entity_id).unwrap();
                    for (key, value) in change.changes {
                        prop_assert_ne!(fields.get(&key), Some(&value));
                        fields.insert(key, value);
                    }
                }
                ChangeOperation::Delete => {
                    prop_assert!(change.changes.is_empty());
                    prop_assert!(state.remove(&change.entity_id).is_some());
                }
            }
        }
        prop_assert_eq!(state, contents(&world));
    }

    #[test]
    fn recreate_with_new_id_is_delete_plus_insert(before in meta(), after in meta()) {
        let world = world();
        let store = world.entities();
        let old = store
            .insert(&Identity::System, NewEntity::new("chair", "NORMAL").with_meta_data(before))
            .unwrap();
        world.capture_tick("NORMAL").unwrap();
        store.delete(&Identity::System, old.entity_id).unwrap();
        let new = store
            .insert(&Identity::System, NewEntity::new("chair", "NORMAL").with_meta_data(after))
            .unwrap();
        world.capture_tick("NORMAL").unwrap();

        let changes = world.changes_since_last_tick("NORMAL").unwrap();
        prop_assert_eq!(changes.len(), 2);
        let delete = changes.iter().find(|c| c.entity_id == old.entity_id).unwrap();
        let insert = changes.iter().find(|c| c.entity_id == new.entity_id).unwrap();
        prop_assert_eq!(delete.operation, ChangeOperation::Delete);
        prop_assert_eq!(insert.operation, ChangeOperation::Insert);
    }

    #[test]
    fn recreate_with_same_id_is_update_or_nothing(before in meta(), after in meta()) {
        let world = world();
        let store = world.entities();
        let old = store
            .insert(&Identity::System, NewEntity::new("chair", "NORMAL").with_meta_data(before.clone()))
            .unwrap();
        world.capture_tick("NORMAL").unwrap();
        store.delete(&Identity::System, old.entity_id).unwrap();
        store
            .insert(
                &Identity::System,
                NewEntity::new("chair", "NORMAL")
                    .with_id(old.entity_id)
                    .with_meta_data(after.clone()),
            )
            .unwrap();
        world.capture_tick("NORMAL").unwrap();

        let changes = world.changes_since_last_tick("NORMAL").unwrap();
        if before == after {
            prop_assert!(changes.is_empty());
        } else {
            prop_assert_eq!(changes.len(), 1);
            prop_assert_eq!(changes[0].operation, ChangeOperation::Update);
            prop_assert_eq!(
                serde_json::to_value(&changes[0].changes).unwrap(),
                json!({ "metaData": after })
            );
        }
    }
}
