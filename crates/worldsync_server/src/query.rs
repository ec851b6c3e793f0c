//! Entity query execution.

use worldsync_core::{CoreResult, Identity, World};
use worldsync_protocol::{EntityQuery, QueryResult};

/// Runs `query` against the world as `identity`.
pub fn execute(world: &World, identity: &Identity, query: EntityQuery) -> CoreResult<QueryResult> {
    let store = world.entities();
    Ok(match query {
        EntityQuery::Get { entity_id } => QueryResult::Entity {
            entity: store.get(identity, entity_id)?,
        },
        EntityQuery::GetByName { name } => QueryResult::Entity {
            entity: store.get_by_name(identity, &name)?,
        },
        EntityQuery::List { sync_group } => QueryResult::Entities {
            entities: store.list_group(identity, &sync_group)?,
        },
        EntityQuery::Insert { entity } => QueryResult::Entity {
            entity: store.insert(identity, entity)?,
        },
        EntityQuery::Update { entity_id, patch } => QueryResult::Entity {
            entity: store.update(identity, entity_id, patch)?,
        },
        EntityQuery::Delete { entity_id } => QueryResult::Deleted {
            entity_id: store.delete(identity, entity_id)?.entity_id,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use worldsync_core::{AgentId, NewEntity, SyncGroup, SyncGroupRole};

    fn world() -> World {
        World::builder()
            .sync_group(SyncGroup::new("NORMAL", 50, 20))
            .build()
            .unwrap()
    }

    #[test]
    fn insert_then_get_by_name() {
        let world = world();
        let agent = AgentId::new();
        world
            .permissions()
            .set_role(&Identity::System, SyncGroupRole::full(agent, "NORMAL"))
            .unwrap();
        let identity = Identity::Agent(agent);

        let inserted = execute(
            &world,
            &identity,
            EntityQuery::Insert {
                entity: NewEntity::new("chair", "NORMAL"),
            },
        )
        .unwrap();
        let QueryResult::Entity { entity } = inserted else {
            panic!("expected entity result");
        };

        let fetched = execute(&world, &identity, EntityQuery::GetByName { name: "chair".into() }).unwrap();
        assert_eq!(fetched, QueryResult::Entity { entity: entity.clone() });

        let deleted = execute(&world, &identity, EntityQuery::Delete { entity_id: entity.entity_id }).unwrap();
        assert_eq!(deleted, QueryResult::Deleted { entity_id: entity.entity_id });
    }

    #[test]
    fn permission_errors_propagate() {
        let world = world();
        let identity = Identity::Agent(AgentId::new());
        let err = execute(
            &world,
            &identity,
            EntityQuery::List {
                sync_group: "NORMAL".into(),
            },
        )
        .unwrap_err();
        assert!(err.is_permission_error());
    }
}
