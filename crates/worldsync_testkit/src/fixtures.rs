//! World fixtures and sample entities.
//!
//! Fixtures panic on setup failure; they are meant for tests only.

use serde_json::json;
use std::sync::Arc;
use worldsync_core::{
    AgentId, AuditTrail, Identity, MemoryAuditTrail, NewEntity, SyncGroup, SyncGroupRole, World,
};

/// The stock interactive sync group.
pub const NORMAL: &str = "public.NORMAL";

/// The stock scenery sync group.
pub const STATIC: &str = "public.STATIC";

/// Canned role shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Read, insert, update and delete.
    Full,
    /// Read only.
    ReadOnly,
    /// A role row with every flag cleared.
    None,
}

/// Builds a world with the stock sync groups.
pub fn stock_world() -> World {
    World::builder()
        .sync_groups(SyncGroup::defaults())
        .build()
        .expect("stock world")
}

/// Builds a world with the stock sync groups and an in-memory audit trail,
/// returning both.
pub fn audited_world() -> (World, Arc<MemoryAuditTrail>) {
    let audit = Arc::new(MemoryAuditTrail::new());
    let world = World::builder()
        .sync_groups(SyncGroup::defaults())
        .audit_trail(Arc::clone(&audit) as Arc<dyn AuditTrail>)
        .build()
        .expect("audited world");
    (world, audit)
}

/// Builds a world with one group whose retention never purges in a test.
pub fn single_group_world(name: &str) -> World {
    World::builder()
        .sync_group(SyncGroup::new(name, 50, 100_000))
        .build()
        .expect("single group world")
}

/// Creates a new agent holding `role` in `sync_group` and returns its identity.
pub fn agent_with_role(world: &World, sync_group: &str, role: Role) -> Identity {
    let agent = AgentId::new();
    let row = match role {
        Role::Full => SyncGroupRole::full(agent, sync_group),
        Role::ReadOnly => SyncGroupRole::read_only(agent, sync_group),
        Role::None => SyncGroupRole::new(agent, sync_group),
    };
    world
        .permissions()
        .set_role(&Identity::System, row)
        .expect("system may set roles");
    Identity::Agent(agent)
}

/// A chair in `sync_group`.
pub fn chair(sync_group: &str) -> NewEntity {
    NewEntity::new("chair", sync_group)
        .with_meta_data(json!({"color": "red", "legs": 4}))
        .with_load_priority(1)
}

/// A numbered prop in `sync_group`, unique per `index`.
pub fn prop(sync_group: &str, index: usize) -> NewEntity {
    NewEntity::new(format!("prop-{index}"), sync_group).with_meta_data(json!({ "index": index }))
}

/// Inserts `count` numbered props as the system identity.
pub fn populate(world: &World, sync_group: &str, count: usize) {
    for index in 0..count {
        world
            .entities()
            .insert(&Identity::System, prop(sync_group, index))
            .expect("insert prop");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use worldsync_core::Action;

    #[test]
    fn roles_are_applied() {
        let world = stock_world();
        let full = agent_with_role(&world, NORMAL, Role::Full);
        let reader = agent_with_role(&world, NORMAL, Role::ReadOnly);
        let nobody = agent_with_role(&world, NORMAL, Role::None);

        let perms = world.permissions();
        assert!(perms.check_permission(&full, NORMAL, Action::Delete));
        assert!(perms.check_permission(&reader, NORMAL, Action::Read));
        assert!(!perms.check_permission(&reader, NORMAL, Action::Insert));
        assert!(!perms.check_permission(&nobody, NORMAL, Action::Read));
        assert!(!perms.check_permission(&full, STATIC, Action::Read));
    }

    #[test]
    fn populate_inserts_distinct_props() {
        let world = single_group_world("g");
        populate(&world, "g", 5);
        assert_eq!(world.entities().count(&Identity::System, "g").unwrap(), 5);
    }
}
