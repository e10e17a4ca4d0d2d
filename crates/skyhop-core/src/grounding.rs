//! Grounding state machine for the player character.
//!
//! Contact reports from a general-purpose solver are noisy at shape corners
//! and under fast motion: normals flicker, begin/end pairs interleave, and a
//! player straddling two surfaces loses one contact while keeping the other.
//! This module turns that stream into a stable grounded flag by combining a
//! per-surface normal test, a velocity fallback for contacts that arrive
//! without a normal, and a multi-contact tally.

use std::collections::HashSet;

use rapier2d::prelude::{ColliderHandle, Vector};

use crate::entity::GroundKind;

/// Grounding and jump thresholds, named per surface family.
/// Centralizing these prevents bugs from duplicated hardcoded values.
pub mod tuning {
    /// Minimum upward normal-y for a platform contact to count as support.
    pub const PLATFORM_NORMAL_MIN_Y: f32 = 0.7;

    /// Crates tilt and shift under the player, so their normal gate is looser.
    pub const CRATE_NORMAL_MIN_Y: f32 = 0.45;

    /// Landing-speed fallback when no contact normal is available (px/s).
    pub const PLATFORM_LANDING_SPEED: f32 = 40.0;

    /// Looser fallback for crates (px/s).
    pub const CRATE_LANDING_SPEED: f32 = 90.0;

    /// Downward settle kick applied once per new platform support (px/s).
    /// Pins the capsule to the surface so the solver does not jitter it
    /// back into the air on the next step.
    pub const PLATFORM_SETTLE_KICK: f32 = 6.0;

    /// Crates need a firmer kick to stop the player skating off the lid.
    pub const CRATE_SETTLE_KICK: f32 = 14.0;

    /// Upward jump speed (px/s), applied as a mass-scaled impulse.
    pub const JUMP_KICK: f32 = 420.0;

    /// Contacts that arrive while the player still rises faster than this
    /// (px/s) are leftovers of the jump itself and never count as landing.
    pub const JUMP_RISE_SPEED: f32 = 150.0;
}

/// Settle-kick speed for a support surface.
pub fn settle_kick(kind: GroundKind) -> f32 {
    match kind {
        GroundKind::Platform => tuning::PLATFORM_SETTLE_KICK,
        GroundKind::Crate => tuning::CRATE_SETTLE_KICK,
    }
}

/// Decides whether one contact event supports the player.
///
/// `normal` is the support normal oriented toward the player (up out of the
/// surface), when the engine produced one. With a normal present the normal
/// test is authoritative; without one the decision falls back to the
/// player's vertical speed, since a player settling onto a surface moves
/// slowly along y while a wall graze does not.
pub fn support_holds(kind: GroundKind, normal: Option<Vector>, vertical_velocity: f32) -> bool {
    if vertical_velocity > tuning::JUMP_RISE_SPEED {
        return false;
    }
    let (normal_min, landing_speed) = match kind {
        GroundKind::Platform => (
            tuning::PLATFORM_NORMAL_MIN_Y,
            tuning::PLATFORM_LANDING_SPEED,
        ),
        GroundKind::Crate => (tuning::CRATE_NORMAL_MIN_Y, tuning::CRATE_LANDING_SPEED),
    };
    match normal {
        Some(n) => n.y > normal_min,
        None => vertical_velocity.abs() < landing_speed,
    }
}

/// Tracks which support contacts are currently live.
///
/// The grounded flag is exactly "the support set is non-empty": losing one
/// of two supports keeps the player grounded, and the set can never go
/// negative the way a raw counter could.
#[derive(Debug, Default)]
pub struct GroundingTracker {
    supports: HashSet<ColliderHandle>,
}

impl GroundingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while at least one support contact is live.
    pub fn grounded(&self) -> bool {
        !self.supports.is_empty()
    }

    /// Number of live support contacts.
    pub fn support_count(&self) -> usize {
        self.supports.len()
    }

    /// Counts a qualifying support contact. Returns `true` when the partner
    /// was newly counted, i.e. exactly once per touchdown, so the caller
    /// applies the stabilizing kick once and not per repeated hit event.
    pub fn note_support(&mut self, partner: ColliderHandle) -> bool {
        self.supports.insert(partner)
    }

    /// Drops a support contact that ended. Partners that were never counted
    /// (or were cleared by a jump) are ignored.
    pub fn note_end(&mut self, partner: ColliderHandle) {
        self.supports.remove(&partner);
    }

    /// Re-adds supports found by re-scanning the engine's live contacts.
    /// Called when the set empties on an end event: a contact that is still
    /// physically present must keep the player grounded even if its begin
    /// event was missed or mis-ordered.
    pub fn resync(&mut self, live: impl IntoIterator<Item = ColliderHandle>) {
        for partner in live {
            self.supports.insert(partner);
        }
    }

    /// Forgets every support. Used when a jump fires: the player is airborne
    /// immediately and stays so until a later contact re-grounds it.
    pub fn clear_for_jump(&mut self) {
        self.supports.clear();
    }
}
