//! Sleep-based culling of off-camera dynamic bodies.

use std::collections::HashSet;

use rapier2d::parry::bounding_volume::Aabb;
use rapier2d::prelude::RigidBodyHandle;
use serde::{Deserialize, Serialize};

use crate::physics::PhysicsWorld;

/// Extra space around the camera rectangle that still counts as visible, so
/// bodies wake before they scroll into view.
pub const CULL_MARGIN: f32 = 160.0;

/// Bodies moving faster than this (px/s) are never forced asleep; a crate
/// mid-fall or a kicked enemy must keep simulating off screen.
pub const CULL_EXEMPT_SPEED: f32 = 220.0;

/// Axis-aligned camera rectangle in world coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CameraBounds {
    pub min: [f32; 2],
    pub max: [f32; 2],
}

impl CameraBounds {
    pub fn new(min: [f32; 2], max: [f32; 2]) -> Self {
        Self { min, max }
    }

    /// The same rectangle grown by `margin` on every side.
    pub fn expanded(&self, margin: f32) -> Self {
        Self {
            min: [self.min[0] - margin, self.min[1] - margin],
            max: [self.max[0] + margin, self.max[1] + margin],
        }
    }

    pub fn overlaps_aabb(&self, aabb: &Aabb) -> bool {
        aabb.maxs.x >= self.min[0]
            && aabb.mins.x <= self.max[0]
            && aabb.maxs.y >= self.min[1]
            && aabb.mins.y <= self.max[1]
    }
}

/// Per-frame wake/sleep policy for tracked dynamic bodies.
///
/// Large generated levels carry hundreds of crates and enemies; only those
/// near the camera need active simulation. Sleeping goes through the
/// engine's own sleep state, so a slept body keeps its tag and registry
/// entry and wakes up behaving identically.
///
/// The player is exempt by construction: it is never tracked.
#[derive(Debug, Default)]
pub struct SleepCuller {
    tracked: HashSet<RigidBodyHandle>,
}

impl SleepCuller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, handle: RigidBodyHandle) {
        self.tracked.insert(handle);
    }

    pub fn untrack(&mut self, handle: RigidBodyHandle) {
        self.tracked.remove(&handle);
    }

    pub fn is_tracked(&self, handle: RigidBodyHandle) -> bool {
        self.tracked.contains(&handle)
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Wakes tracked bodies that intersect the expanded camera rectangle and
    /// puts the rest to sleep, except fast-moving ones.
    pub fn update(&self, world: &mut PhysicsWorld, camera: &CameraBounds) {
        let view = camera.expanded(CULL_MARGIN);

        for &handle in &self.tracked {
            let Some(aabb) = world.body_aabb(handle) else {
                continue;
            };
            let visible = view.overlaps_aabb(&aabb);

            let Some(body) = world.get_rigid_body_mut(handle) else {
                continue;
            };
            if !body.is_dynamic() {
                continue;
            }

            if visible {
                if body.is_sleeping() {
                    body.wake_up(true);
                }
            } else if !body.is_sleeping() {
                let speed = body.linvel().length();
                if speed < CULL_EXEMPT_SPEED {
                    body.sleep();
                }
            }
        }
    }
}
