//! Property-based test generators using proptest.

use proptest::prelude::*;
use serde_json::{json, Value};
use worldsync_core::{EntityPatch, NewEntity};

/// Strategy for small metadata objects.
pub fn meta_data_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(json!({})),
        any::<i32>().prop_map(|n| json!({ "n": n })),
        "[a-z]{1,8}".prop_map(|s| json!({ "tag": s })),
        (any::<bool>(), "[a-z]{0,4}").prop_map(|(b, s)| json!({ "on": b, "label": s })),
    ]
}

/// Strategy for entity names drawn from a small pool so conflicts occur.
pub fn entity_name_strategy(pool: usize) -> impl Strategy<Value = String> {
    (0..pool.max(1)).prop_map(|i| format!("e{i}"))
}

/// Strategy for creation payloads in `sync_group`.
pub fn new_entity_strategy(sync_group: &'static str) -> impl Strategy<Value = NewEntity> {
    (
        entity_name_strategy(8),
        meta_data_strategy(),
        prop::option::of(-10i32..10),
        prop::option::of(1u64..60_000),
    )
        .prop_map(move |(name, meta, priority, expiry)| {
            let mut entity = NewEntity::new(name, sync_group).with_meta_data(meta);
            entity.load_priority = priority;
            entity.expiry_since_updated_ms = expiry;
            entity
        })
}

/// Strategy for patches that leave the sync group alone.
pub fn entity_patch_strategy() -> impl Strategy<Value = EntityPatch> {
    (
        prop::option::of(entity_name_strategy(8)),
        prop::option::of(meta_data_strategy()),
        prop::option::of(prop::option::of(-10i32..10)),
    )
        .prop_map(|(name, meta_data, load_priority)| EntityPatch {
            name,
            meta_data,
            load_priority,
            ..EntityPatch::default()
        })
}

/// Strategy for arbitrary text frames, mostly JSON objects with a `type`.
pub fn client_frame_strategy() -> impl Strategy<Value = String> {
    let known = prop::sample::select(worldsync_protocol::CLIENT_MESSAGE_TYPES.to_vec());
    prop_oneof![
        known.prop_map(|t| json!({ "type": t }).to_string()),
        "[A-Z_]{1,16}".prop_map(|t| json!({ "type": t }).to_string()),
        (any::<i64>(), "[a-z]{0,6}").prop_map(|(n, s)| json!({ "type": n, "x": s }).to_string()),
        ".{0,64}",
    ]
}
