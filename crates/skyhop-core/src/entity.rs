//! Gameplay entity records and shape tags.

use rapier2d::prelude::{ColliderHandle, RigidBodyHandle};
use serde::{Deserialize, Serialize};

/// Unique identifier for a gameplay entity.
pub type EntityId = u32;

/// Gameplay role attached to a collision shape. Used purely for event
/// dispatch; the physics solver never looks at it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeTag {
    Player,
    Platform,
    Crate { size: f32 },
    Coin { id: u32 },
    Enemy,
    DeathZone,
}

/// Surface family the player can stand on. Crates keep their own thresholds
/// because their contact geometry is less stable than platform tops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroundKind {
    Platform,
    Crate,
}

impl ShapeTag {
    /// Which support family this shape belongs to, if any.
    pub fn ground_kind(self) -> Option<GroundKind> {
        match self {
            Self::Platform => Some(GroundKind::Platform),
            Self::Crate { .. } => Some(GroundKind::Crate),
            _ => None,
        }
    }

    /// Sensor shapes overlap without collision response.
    pub fn is_sensor(self) -> bool {
        matches!(self, Self::Coin { .. } | Self::DeathZone)
    }
}

/// A gameplay object owning exactly one rigid body.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub tag: ShapeTag,
    pub body_handle: RigidBodyHandle,
    pub collider_handle: ColliderHandle,
    /// Coins only: set once on pickup so duplicate overlap events in the
    /// same step cannot collect twice.
    pub collected: bool,
}

impl Entity {
    pub fn new(
        id: EntityId,
        tag: ShapeTag,
        body_handle: RigidBodyHandle,
        collider_handle: ColliderHandle,
    ) -> Self {
        Self {
            id,
            tag,
            body_handle,
            collider_handle,
            collected: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_kind_only_for_solid_supports() {
        assert_eq!(ShapeTag::Platform.ground_kind(), Some(GroundKind::Platform));
        assert_eq!(
            ShapeTag::Crate { size: 16.0 }.ground_kind(),
            Some(GroundKind::Crate)
        );
        assert_eq!(ShapeTag::Player.ground_kind(), None);
        assert_eq!(ShapeTag::Enemy.ground_kind(), None);
        assert_eq!(ShapeTag::Coin { id: 1 }.ground_kind(), None);
        assert_eq!(ShapeTag::DeathZone.ground_kind(), None);
    }

    #[test]
    fn test_sensor_tags() {
        assert!(ShapeTag::Coin { id: 3 }.is_sensor());
        assert!(ShapeTag::DeathZone.is_sensor());
        assert!(!ShapeTag::Platform.is_sensor());
        assert!(!ShapeTag::Player.is_sensor());
    }

    #[test]
    fn test_tag_serde_roundtrip() {
        let tag = ShapeTag::Crate { size: 24.0 };
        let json = serde_json::to_string(&tag).unwrap();
        assert!(json.contains("\"crate\""));
        let back: ShapeTag = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tag);
    }
}
