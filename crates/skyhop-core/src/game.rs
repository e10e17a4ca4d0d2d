//! Per-frame orchestration of physics, events, grounding, and session state.

use rapier2d::prelude::{ColliderHandle, RigidBodyHandle, Vector};
use serde::{Deserialize, Serialize};

use crate::culling::{CameraBounds, SleepCuller};
use crate::entity::{EntityId, ShapeTag};
use crate::events::{FrameOutcome, route_frame};
use crate::grounding::{GroundingTracker, tuning};
use crate::level::{LevelError, LevelPlan, build};
use crate::physics::PhysicsWorld;
use crate::registry::BodyRegistry;
use crate::session::{SessionFsm, SessionState};

/// Horizontal drive speed while walking (px/s).
pub const WALK_SPEED: f32 = 180.0;

/// Player intent for one frame.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FrameInput {
    /// Horizontal axis in [-1, 1].
    pub move_x: f32,
    pub jump: bool,
}

/// What one frame changed, for the surrounding game code.
#[derive(Debug, Default)]
pub struct FrameReport {
    pub coins_collected: Vec<u32>,
    pub died: bool,
    pub grounded: bool,
}

/// Presentation snapshot of one entity, consumed by the external renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualState {
    pub id: EntityId,
    pub tag: ShapeTag,
    pub position: [f32; 2],
    pub rotation: f32,
}

/// One running game: physics world, entity registry, grounding and session
/// state, stepped once per external frame callback.
///
/// Constructed explicitly and self-contained, so independent sessions can
/// coexist (tests run several side by side).
///
/// Frame order is fixed: step physics, route events, apply input, cull,
/// flush destruction, then session side effects. Destruction running last
/// means any handle referenced by this frame's events stays resolvable for
/// the whole frame.
#[derive(Debug)]
pub struct GameSession {
    world: PhysicsWorld,
    registry: BodyRegistry,
    culler: SleepCuller,
    grounding: GroundingTracker,
    session: SessionFsm,
    plan: LevelPlan,
    player_body: RigidBodyHandle,
    player_collider: ColliderHandle,
}

impl GameSession {
    /// Builds the world and level, then leaves `Initializing`: the session
    /// becomes `Ready` the moment the physics world exists. A failed player
    /// spawn is the one unrecoverable error and surfaces here.
    pub fn new(plan: LevelPlan) -> Result<Self, LevelError> {
        let mut world = PhysicsWorld::new();
        let mut registry = BodyRegistry::new();
        let mut culler = SleepCuller::new();

        let handles = build(&plan, &mut world, &mut registry, &mut culler)?;

        let mut session = SessionFsm::new();
        session.transition(SessionState::Ready);

        Ok(Self {
            world,
            registry,
            culler,
            grounding: GroundingTracker::new(),
            session,
            plan,
            player_body: handles.player_body,
            player_collider: handles.player_collider,
        })
    }

    /// Begins the run: `Ready -> Playing`.
    pub fn start(&mut self) -> bool {
        self.session.transition(SessionState::Playing)
    }

    /// Advances the game by one frame.
    ///
    /// Physics steps in every session state so the simulation stays
    /// numerically stable; rule side effects and input are suppressed
    /// outside `Playing`.
    pub fn update(&mut self, input: FrameInput, camera: &CameraBounds) -> FrameReport {
        let events = self.world.step();

        let mut outcome = FrameOutcome::default();
        if self.session.gameplay_active() {
            outcome = route_frame(
                &events,
                &mut self.world,
                &mut self.registry,
                &mut self.grounding,
                self.player_body,
                self.player_collider,
            );
            for _ in &outcome.coins {
                self.session.record_coin();
            }
            self.apply_input(input);
        }

        self.culler.update(&mut self.world, camera);
        self.registry.flush_destroyed(&mut self.world, &mut self.culler);

        if outcome.died {
            self.session.transition(SessionState::GameOver);
        }

        FrameReport {
            grounded: self.grounding.grounded(),
            coins_collected: outcome.coins,
            died: outcome.died,
        }
    }

    fn apply_input(&mut self, input: FrameInput) {
        let drive = input.move_x.clamp(-1.0, 1.0) * WALK_SPEED;
        self.world.drive_horizontal(self.player_body, drive);
        if input.jump {
            self.try_jump();
        }
    }

    /// Fires a jump if the player is grounded. Landing must be re-detected
    /// before another jump can fire.
    pub fn try_jump(&mut self) -> bool {
        if !self.session.gameplay_active() || !self.grounding.grounded() {
            return false;
        }
        self.world
            .apply_kick(self.player_body, Vector::new(0.0, tuning::JUMP_KICK));
        self.grounding.clear_for_jump();
        tracing::debug!("[game] jump fired");
        true
    }

    /// Tears the level down through the registry queue and rebuilds it from
    /// the stored plan. The physics world itself is preserved, never
    /// recreated. Fails when the session is not in `GameOver`.
    pub fn restart(&mut self) -> bool {
        if !self.session.transition(SessionState::Ready) {
            return false;
        }

        let handles: Vec<RigidBodyHandle> = self.registry.handles().collect();
        for handle in handles {
            self.registry.queue_destroy(handle);
        }
        self.registry.flush_destroyed(&mut self.world, &mut self.culler);
        self.grounding = GroundingTracker::new();

        match build(
            &self.plan,
            &mut self.world,
            &mut self.registry,
            &mut self.culler,
        ) {
            Ok(handles) => {
                self.player_body = handles.player_body;
                self.player_collider = handles.player_collider;
                true
            }
            Err(err) => {
                tracing::error!("[game] level rebuild failed: {err}");
                false
            }
        }
    }

    /// Stable grounded flag from the grounding state machine.
    pub fn is_grounded(&self) -> bool {
        self.grounding.grounded()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Attempts a session transition; illegal pairs are rejected.
    pub fn transition(&mut self, next: SessionState) -> bool {
        self.session.transition(next)
    }

    pub fn coins_collected(&self) -> u32 {
        self.session.coins_collected()
    }

    /// Queues a body for end-of-frame destruction.
    pub fn queue_body_destroy(&mut self, handle: RigidBodyHandle) {
        self.registry.queue_destroy(handle);
    }

    pub fn player_body(&self) -> RigidBodyHandle {
        self.player_body
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn registry(&self) -> &BodyRegistry {
        &self.registry
    }

    /// Presentation transforms for every live entity, sorted by id.
    pub fn visual_states(&self) -> Vec<VisualState> {
        let mut states: Vec<VisualState> = self
            .registry
            .entities()
            .filter_map(|entity| {
                let body = self.world.get_rigid_body(entity.body_handle)?;
                let pos = body.translation();
                Some(VisualState {
                    id: entity.id,
                    tag: entity.tag,
                    position: [pos.x, pos.y],
                    rotation: body.rotation().angle(),
                })
            })
            .collect();
        states.sort_by_key(|s| s.id);
        states
    }
}
