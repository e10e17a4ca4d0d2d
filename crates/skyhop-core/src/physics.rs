//! Physics world facade over `Rapier2D` with per-step event draining.

use rapier2d::parry::bounding_volume::Aabb;
use rapier2d::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;

/// Fixed timestep for physics simulation (60Hz).
pub const PHYSICS_DT: f32 = 1.0 / 60.0;

/// Solver iterations per step. Raised above rapier's default so stacked
/// crates and landing contacts resolve without visible sinking.
pub const SOLVER_SUBSTEPS: usize = 4;

/// Default gravity vector (y-up world, pixels/s²).
pub fn default_gravity() -> Vector {
    Vector::new(0.0, -981.0)
}

/// A solid contact currently pressing with force. The most reliable
/// "touching right now" signal the engine produces.
#[derive(Debug, Clone, Copy)]
pub struct ContactHit {
    pub collider1: ColliderHandle,
    pub collider2: ColliderHandle,
    /// World-space direction of the strongest force in the contact.
    pub normal: Vector,
    pub force: f32,
}

/// A solid contact that started or stopped this step.
#[derive(Debug, Clone, Copy)]
pub struct ContactTouch {
    pub collider1: ColliderHandle,
    pub collider2: ColliderHandle,
    /// Manifold normal pointing out of `collider1`, when the narrow phase
    /// still has one. Absent for stopped contacts and for begin events whose
    /// manifold carries no points (corner grazes, fast tunnels).
    pub normal: Option<Vector>,
}

/// A sensor overlap that started or stopped this step.
#[derive(Debug, Clone, Copy)]
pub struct SensorTouch {
    pub sensor: ColliderHandle,
    pub visitor: ColliderHandle,
}

/// Everything the engine reported for one step, already split by kind.
#[derive(Debug, Default)]
pub struct FrameEvents {
    pub hits: Vec<ContactHit>,
    pub contact_begins: Vec<ContactTouch>,
    pub contact_ends: Vec<ContactTouch>,
    pub sensor_begins: Vec<SensorTouch>,
    pub sensor_ends: Vec<SensorTouch>,
}

/// Physics world containing all `Rapier2D` components.
#[derive(Serialize, Deserialize)]
pub struct PhysicsWorld {
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub integration_parameters: IntegrationParameters,
    #[serde(skip, default = "PhysicsPipeline::new")]
    pub physics_pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,
    pub ccd_solver: CCDSolver,
    pub gravity: Vector,
    pub frame: u64,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("frame", &self.frame)
            .field("rigid_body_count", &self.rigid_body_set.len())
            .field("collider_count", &self.collider_set.len())
            .field("gravity", &self.gravity)
            .finish_non_exhaustive()
    }
}

impl PhysicsWorld {
    /// Creates a new physics world with default settings.
    pub fn new() -> Self {
        Self::with_gravity(default_gravity())
    }

    /// Creates a new physics world with custom gravity.
    pub fn with_gravity(gravity: Vector) -> Self {
        let integration_parameters = IntegrationParameters {
            dt: PHYSICS_DT,
            num_solver_iterations: NonZeroUsize::new(SOLVER_SUBSTEPS)
                .unwrap_or(NonZeroUsize::MIN)
                .get(),
            ..Default::default()
        };

        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            gravity,
            frame: 0,
        }
    }

    /// Advances the simulation by one fixed timestep and returns the
    /// contact/sensor events the step produced.
    pub fn step(&mut self) -> FrameEvents {
        let (collision_send, collision_recv) =
            std::sync::mpsc::channel::<CollisionEvent>();
        let (force_send, force_recv) =
            std::sync::mpsc::channel::<ContactForceEvent>();
        let event_handler = ChannelEventCollector::new(collision_send, force_send);

        self.physics_pipeline.step(
            self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            &(),
            &event_handler,
        );
        self.frame += 1;

        let mut events = FrameEvents::default();

        while let Ok(event) = force_recv.try_recv() {
            events.hits.push(ContactHit {
                collider1: event.collider1,
                collider2: event.collider2,
                normal: event.max_force_direction,
                force: event.total_force_magnitude,
            });
        }

        while let Ok(event) = collision_recv.try_recv() {
            match event {
                CollisionEvent::Started(h1, h2, _) if event.sensor() => {
                    if let Some(touch) = self.split_sensor_pair(h1, h2) {
                        events.sensor_begins.push(touch);
                    }
                }
                CollisionEvent::Stopped(h1, h2, _) if event.sensor() => {
                    if let Some(touch) = self.split_sensor_pair(h1, h2) {
                        events.sensor_ends.push(touch);
                    }
                }
                CollisionEvent::Started(h1, h2, _) => {
                    events.contact_begins.push(ContactTouch {
                        collider1: h1,
                        collider2: h2,
                        normal: self.contact_normal(h1, h2),
                    });
                }
                CollisionEvent::Stopped(h1, h2, _) => {
                    events.contact_ends.push(ContactTouch {
                        collider1: h1,
                        collider2: h2,
                        normal: None,
                    });
                }
            }
        }

        // Channel delivery order is not guaranteed to be stable across runs;
        // sort every list so routing stays deterministic.
        events.hits.sort_by_key(|h| raw_pair(h.collider1, h.collider2));
        events
            .contact_begins
            .sort_by_key(|t| raw_pair(t.collider1, t.collider2));
        events
            .contact_ends
            .sort_by_key(|t| raw_pair(t.collider1, t.collider2));
        events
            .sensor_begins
            .sort_by_key(|t| raw_pair(t.sensor, t.visitor));
        events
            .sensor_ends
            .sort_by_key(|t| raw_pair(t.sensor, t.visitor));

        events
    }

    /// Advances the simulation by multiple steps, discarding events.
    pub fn step_n(&mut self, n: u32) {
        for _ in 0..n {
            let _ = self.step();
        }
    }

    fn split_sensor_pair(&self, h1: ColliderHandle, h2: ColliderHandle) -> Option<SensorTouch> {
        let sensor1 = self.collider_set.get(h1).is_some_and(Collider::is_sensor);
        if sensor1 {
            return Some(SensorTouch {
                sensor: h1,
                visitor: h2,
            });
        }
        let sensor2 = self.collider_set.get(h2).is_some_and(Collider::is_sensor);
        if sensor2 {
            return Some(SensorTouch {
                sensor: h2,
                visitor: h1,
            });
        }
        // The sensor side was already removed; nothing left to dispatch on.
        None
    }

    /// World-space normal of the active manifold between two colliders,
    /// pointing out of the first one. `None` when the pair has no contact
    /// points this step.
    pub fn contact_normal(&self, h1: ColliderHandle, h2: ColliderHandle) -> Option<Vector> {
        let pair = self.narrow_phase.contact_pair(h1, h2)?;
        let manifold = pair
            .manifolds
            .iter()
            .find(|m| m.points.iter().next().is_some())?;
        let normal = manifold.data.normal;
        // The narrow phase reports the pair in its own order, which may be
        // swapped relative to the handles we were asked about.
        if pair.collider1 == h1 {
            Some(normal)
        } else {
            Some(-normal)
        }
    }

    /// Colliders currently in touching solid contact with `collider`.
    pub fn touching_colliders(&self, collider: ColliderHandle) -> Vec<ColliderHandle> {
        self.narrow_phase
            .contact_pairs_with(collider)
            .filter(|pair| {
                pair.manifolds
                    .iter()
                    .any(|m| m.points.iter().next().is_some())
            })
            .map(|pair| {
                if pair.collider1 == collider {
                    pair.collider2
                } else {
                    pair.collider1
                }
            })
            .collect()
    }

    /// Adds a rigid body to the world and returns its handle.
    pub fn add_rigid_body(&mut self, rigid_body: RigidBody) -> RigidBodyHandle {
        self.rigid_body_set.insert(rigid_body)
    }

    /// Adds a collider attached to a rigid body.
    pub fn add_collider(&mut self, collider: Collider, parent: RigidBodyHandle) -> ColliderHandle {
        self.collider_set
            .insert_with_parent(collider, parent, &mut self.rigid_body_set)
    }

    /// Removes a rigid body and its attached colliders. Returns `false` when
    /// the handle is stale (already removed or never inserted).
    pub fn remove_rigid_body(&mut self, handle: RigidBodyHandle) -> bool {
        self.rigid_body_set
            .remove(
                handle,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true,
            )
            .is_some()
    }

    /// Gets an immutable reference to a rigid body.
    pub fn get_rigid_body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.rigid_body_set.get(handle)
    }

    /// Gets a mutable reference to a rigid body.
    pub fn get_rigid_body_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody> {
        self.rigid_body_set.get_mut(handle)
    }

    /// Whether a collider is flagged as a sensor. Unknown handles count as
    /// sensors so they never feed grounding.
    pub fn is_sensor(&self, handle: ColliderHandle) -> bool {
        self.collider_set.get(handle).is_none_or(Collider::is_sensor)
    }

    /// Position of a rigid body.
    pub fn position(&self, handle: RigidBodyHandle) -> Option<(f32, f32)> {
        self.rigid_body_set.get(handle).map(|body| {
            let pos = body.translation();
            (pos.x, pos.y)
        })
    }

    /// Linear velocity of a rigid body.
    pub fn velocity(&self, handle: RigidBodyHandle) -> Option<(f32, f32)> {
        self.rigid_body_set.get(handle).map(|body| {
            let vel = body.linvel();
            (vel.x, vel.y)
        })
    }

    /// Sets the horizontal velocity of a body, preserving its fall speed.
    pub fn drive_horizontal(&mut self, handle: RigidBodyHandle, vx: f32) {
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            let vy = body.linvel().y;
            body.set_linvel(Vector::new(vx, vy), true);
        }
    }

    /// Applies a mass-scaled impulse, i.e. an instant velocity change of
    /// `velocity_delta` regardless of the body's mass.
    pub fn apply_kick(&mut self, handle: RigidBodyHandle, velocity_delta: Vector) {
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            let impulse = velocity_delta * body.mass();
            body.apply_impulse(impulse, true);
        }
    }

    /// Merged AABB of all colliders attached to a body.
    pub fn body_aabb(&self, handle: RigidBodyHandle) -> Option<Aabb> {
        let body = self.rigid_body_set.get(handle)?;
        let mut merged: Option<Aabb> = None;
        for &ch in body.colliders() {
            let Some(collider) = self.collider_set.get(ch) else {
                continue;
            };
            let aabb = collider.compute_aabb();
            merged = Some(match merged {
                None => aabb,
                Some(mut acc) => {
                    acc.mins.x = acc.mins.x.min(aabb.mins.x);
                    acc.mins.y = acc.mins.y.min(aabb.mins.y);
                    acc.maxs.x = acc.maxs.x.max(aabb.maxs.x);
                    acc.maxs.y = acc.maxs.y.max(aabb.maxs.y);
                    acc
                }
            });
        }
        merged
    }

    /// Returns the current simulation frame number.
    pub fn current_frame(&self) -> u64 {
        self.frame
    }
}

fn raw_pair(a: ColliderHandle, b: ColliderHandle) -> (u32, u32, u32, u32) {
    let (ai, ag) = a.into_raw_parts();
    let (bi, bg) = b.into_raw_parts();
    (ai, ag, bi, bg)
}
