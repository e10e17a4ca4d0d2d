//! Builds physics bodies from the level generator's placement data.
//!
//! Layout arithmetic lives in the external generator; this module only turns
//! its placement requests into tagged bodies and shapes.

use rapier2d::prelude::*;
use serde::{Deserialize, Serialize};

use crate::culling::{CameraBounds, SleepCuller};
use crate::entity::ShapeTag;
use crate::physics::PhysicsWorld;
use crate::registry::BodyRegistry;

/// Player capsule radius in pixels.
pub const PLAYER_RADIUS: f32 = 14.0;

/// Player capsule half-height (cylindrical part) in pixels.
pub const PLAYER_HALF_HEIGHT: f32 = 10.0;

/// Coin sensor radius in pixels.
pub const COIN_RADIUS: f32 = 12.0;

/// Enemy half-extent in pixels.
pub const ENEMY_HALF_EXTENT: f32 = 16.0;

/// Level construction failures.
#[derive(Debug, thiserror::Error)]
pub enum LevelError {
    /// The player body could not be created. The only failure that is fatal
    /// for the session: a game without a player cannot continue.
    #[error("player spawn failed: {0}")]
    PlayerSpawn(String),
    #[error("level plan parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Axis-aligned rectangle placement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RectSpec {
    pub center: [f32; 2],
    pub half_extents: [f32; 2],
}

impl RectSpec {
    fn is_valid(&self) -> bool {
        self.center.iter().all(|v| v.is_finite())
            && self.half_extents.iter().all(|v| v.is_finite() && *v > 0.0)
    }
}

/// A crate placement with its half-extent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CrateSpec {
    pub position: [f32; 2],
    pub size: f32,
}

/// A coin placement carrying the generator-assigned coin id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CoinSpec {
    pub id: u32,
    pub position: [f32; 2],
}

/// An enemy placement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EnemySpec {
    pub position: [f32; 2],
}

/// Everything the external generator emits for one level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelPlan {
    pub player_spawn: [f32; 2],
    #[serde(default)]
    pub platforms: Vec<RectSpec>,
    #[serde(default)]
    pub crates: Vec<CrateSpec>,
    #[serde(default)]
    pub coins: Vec<CoinSpec>,
    #[serde(default)]
    pub enemies: Vec<EnemySpec>,
    /// Wide sensor strip under the level; falling into it ends the run.
    pub death_zone: RectSpec,
    /// Initial camera rectangle recommended by the generator.
    pub camera: CameraBounds,
}

impl LevelPlan {
    /// Parses a plan from the generator's JSON output.
    pub fn from_json(json: &str) -> Result<Self, LevelError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Handles to the bodies gameplay needs to address directly.
#[derive(Debug, Clone, Copy)]
pub struct LevelHandles {
    pub player_body: RigidBodyHandle,
    pub player_collider: ColliderHandle,
}

/// Creates and registers every body the plan describes.
///
/// Malformed non-player placements are logged and skipped; only a failed
/// player spawn aborts the build.
pub fn build(
    plan: &LevelPlan,
    world: &mut PhysicsWorld,
    registry: &mut BodyRegistry,
    culler: &mut SleepCuller,
) -> Result<LevelHandles, LevelError> {
    let handles = spawn_player(plan.player_spawn, world, registry)?;

    for (i, rect) in plan.platforms.iter().enumerate() {
        if !rect.is_valid() {
            tracing::warn!("[level] skipping malformed platform #{i}: {rect:?}");
            continue;
        }
        let body = world.add_rigid_body(
            RigidBodyBuilder::fixed()
                .translation(Vector::new(rect.center[0], rect.center[1]))
                .build(),
        );
        let collider = world.add_collider(
            ColliderBuilder::cuboid(rect.half_extents[0], rect.half_extents[1])
                .friction(0.8)
                .build(),
            body,
        );
        registry.register(body, collider, ShapeTag::Platform);
    }

    for (i, spec) in plan.crates.iter().enumerate() {
        if !(spec.size.is_finite() && spec.size > 0.0) {
            tracing::warn!("[level] skipping malformed crate #{i}: {spec:?}");
            continue;
        }
        let body = world.add_rigid_body(
            RigidBodyBuilder::dynamic()
                .translation(Vector::new(spec.position[0], spec.position[1]))
                .build(),
        );
        let collider = world.add_collider(
            ColliderBuilder::cuboid(spec.size, spec.size)
                .density(0.6)
                .friction(0.5)
                .build(),
            body,
        );
        registry.register(body, collider, ShapeTag::Crate { size: spec.size });
        culler.track(body);
    }

    for spec in &plan.coins {
        let body = world.add_rigid_body(
            RigidBodyBuilder::fixed()
                .translation(Vector::new(spec.position[0], spec.position[1]))
                .build(),
        );
        let collider = world.add_collider(
            ColliderBuilder::ball(COIN_RADIUS)
                .sensor(true)
                .active_events(ActiveEvents::COLLISION_EVENTS)
                .build(),
            body,
        );
        registry.register(body, collider, ShapeTag::Coin { id: spec.id });
    }

    for spec in &plan.enemies {
        let body = world.add_rigid_body(
            RigidBodyBuilder::dynamic()
                .translation(Vector::new(spec.position[0], spec.position[1]))
                .lock_rotations()
                .build(),
        );
        let collider = world.add_collider(
            ColliderBuilder::cuboid(ENEMY_HALF_EXTENT, ENEMY_HALF_EXTENT)
                .friction(0.4)
                .build(),
            body,
        );
        registry.register(body, collider, ShapeTag::Enemy);
        culler.track(body);
    }

    if plan.death_zone.is_valid() {
        let rect = plan.death_zone;
        let body = world.add_rigid_body(
            RigidBodyBuilder::fixed()
                .translation(Vector::new(rect.center[0], rect.center[1]))
                .build(),
        );
        let collider = world.add_collider(
            ColliderBuilder::cuboid(rect.half_extents[0], rect.half_extents[1])
                .sensor(true)
                .active_events(ActiveEvents::COLLISION_EVENTS)
                .build(),
            body,
        );
        registry.register(body, collider, ShapeTag::DeathZone);
    } else {
        tracing::warn!("[level] malformed death zone: {:?}", plan.death_zone);
    }

    tracing::info!(
        "[level] built {} platforms, {} crates, {} coins, {} enemies",
        plan.platforms.len(),
        plan.crates.len(),
        plan.coins.len(),
        plan.enemies.len()
    );

    Ok(handles)
}

fn spawn_player(
    spawn: [f32; 2],
    world: &mut PhysicsWorld,
    registry: &mut BodyRegistry,
) -> Result<LevelHandles, LevelError> {
    if !spawn.iter().all(|v| v.is_finite()) {
        return Err(LevelError::PlayerSpawn(format!(
            "non-finite spawn position {spawn:?}"
        )));
    }

    let body = world.add_rigid_body(
        RigidBodyBuilder::dynamic()
            .translation(Vector::new(spawn[0], spawn[1]))
            .lock_rotations()
            .ccd_enabled(true)
            .build(),
    );
    let collider = world.add_collider(
        ColliderBuilder::capsule_y(PLAYER_HALF_HEIGHT, PLAYER_RADIUS)
            .density(1.0)
            .friction(0.2)
            .active_events(ActiveEvents::COLLISION_EVENTS | ActiveEvents::CONTACT_FORCE_EVENTS)
            .build(),
        body,
    );
    registry.register(body, collider, ShapeTag::Player);

    Ok(LevelHandles {
        player_body: body,
        player_collider: collider,
    })
}
