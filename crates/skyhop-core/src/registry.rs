//! Body registry: handle-to-entity mapping and deferred destruction.

use std::collections::HashMap;

use rapier2d::prelude::{ColliderHandle, RigidBodyHandle};

use crate::culling::SleepCuller;
use crate::entity::{Entity, EntityId, ShapeTag};
use crate::physics::PhysicsWorld;

/// Owns the mapping from physics handles to gameplay entities, plus the
/// queue of bodies waiting for end-of-frame destruction.
///
/// Destruction is never immediate: several events in one step may reference
/// the same handle, so removal only happens at the single
/// [`flush_destroyed`](Self::flush_destroyed) point after all event
/// processing.
#[derive(Debug, Default)]
pub struct BodyRegistry {
    entities: HashMap<RigidBodyHandle, Entity>,
    by_collider: HashMap<ColliderHandle, RigidBodyHandle>,
    pending_destroy: Vec<RigidBodyHandle>,
    next_id: EntityId,
}

impl BodyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly created body under its tag. A duplicate body
    /// handle is rejected and the original entry kept.
    pub fn register(
        &mut self,
        body: RigidBodyHandle,
        collider: ColliderHandle,
        tag: ShapeTag,
    ) -> EntityId {
        if let Some(existing) = self.entities.get(&body) {
            tracing::warn!(
                "[registry] duplicate registration for body {body:?} ({:?}), keeping entity {}",
                tag,
                existing.id
            );
            return existing.id;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.entities.insert(body, Entity::new(id, tag, body, collider));
        self.by_collider.insert(collider, body);
        id
    }

    /// O(1) lookup by body handle.
    pub fn lookup(&self, handle: RigidBodyHandle) -> Option<&Entity> {
        self.entities.get(&handle)
    }

    pub fn lookup_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut Entity> {
        self.entities.get_mut(&handle)
    }

    /// Resolves the entity owning a collider.
    pub fn entity_of_collider(&self, collider: ColliderHandle) -> Option<&Entity> {
        self.by_collider
            .get(&collider)
            .and_then(|body| self.entities.get(body))
    }

    pub fn entity_of_collider_mut(&mut self, collider: ColliderHandle) -> Option<&mut Entity> {
        let body = *self.by_collider.get(&collider)?;
        self.entities.get_mut(&body)
    }

    /// Tag attached to a collider, if it belongs to a live entity.
    pub fn tag_of_collider(&self, collider: ColliderHandle) -> Option<ShapeTag> {
        self.entity_of_collider(collider).map(|e| e.tag)
    }

    /// Queues a body for destruction at the end of the frame. Queuing the
    /// same handle twice in one frame is a no-op.
    pub fn queue_destroy(&mut self, handle: RigidBodyHandle) {
        if self.pending_destroy.contains(&handle) {
            tracing::debug!("[registry] body {handle:?} already queued for destruction");
            return;
        }
        self.pending_destroy.push(handle);
    }

    /// Number of bodies waiting for the next flush.
    pub fn pending_destroy_count(&self) -> usize {
        self.pending_destroy.len()
    }

    /// Destroys every queued body. Called once per frame, after all event
    /// processing. The registry entry is removed before the physics engine
    /// invalidates the handle, so no dangling lookup can observe a dead
    /// body. Stale handles are logged and skipped.
    pub fn flush_destroyed(&mut self, world: &mut PhysicsWorld, culler: &mut SleepCuller) {
        for handle in std::mem::take(&mut self.pending_destroy) {
            let Some(entity) = self.entities.remove(&handle) else {
                tracing::warn!("[registry] destruction queued for unknown body {handle:?}");
                continue;
            };
            self.by_collider.remove(&entity.collider_handle);
            culler.untrack(handle);
            if !world.remove_rigid_body(handle) {
                tracing::warn!(
                    "[registry] physics body {handle:?} (entity {}) was already gone",
                    entity.id
                );
            }
        }
    }

    /// All live body handles.
    pub fn handles(&self) -> impl Iterator<Item = RigidBodyHandle> + '_ {
        self.entities.keys().copied()
    }

    /// All live entities.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
