//! Routes one step's worth of physics events to gameplay handlers.

use rapier2d::prelude::{ColliderHandle, RigidBodyHandle, Vector};

use crate::entity::ShapeTag;
use crate::grounding::{GroundingTracker, settle_kick, support_holds};
use crate::physics::{FrameEvents, PhysicsWorld};
use crate::registry::BodyRegistry;

/// What one frame's events did to the game.
#[derive(Debug, Default)]
pub struct FrameOutcome {
    /// Ids of coins collected this frame, each exactly once.
    pub coins: Vec<u32>,
    /// The player touched an enemy or the death zone.
    pub died: bool,
}

/// Dispatches the step's sensor and contact events.
///
/// Runs once per physics step, after the step call and before gameplay
/// mutation. Contact events are consumed hit, then begin, then end: hit
/// events are the authoritative "currently pressing" signal and must update
/// grounding before begin/end reinterpret the same step's geometry.
pub fn route_frame(
    events: &FrameEvents,
    world: &mut PhysicsWorld,
    registry: &mut BodyRegistry,
    grounding: &mut GroundingTracker,
    player_body: RigidBodyHandle,
    player_collider: ColliderHandle,
) -> FrameOutcome {
    let mut outcome = FrameOutcome::default();

    for touch in &events.sensor_begins {
        if touch.visitor != player_collider {
            continue;
        }
        match registry.tag_of_collider(touch.sensor) {
            Some(ShapeTag::Coin { id }) => {
                collect_coin(registry, touch.sensor, id, &mut outcome);
            }
            Some(ShapeTag::DeathZone) => {
                if !outcome.died {
                    tracing::info!("[events] player fell into the death zone");
                }
                outcome.died = true;
            }
            _ => {}
        }
    }

    for hit in &events.hits {
        let Some((partner, player_first)) =
            player_pair(hit.collider1, hit.collider2, player_collider)
        else {
            continue;
        };
        if world.is_sensor(partner) {
            continue;
        }
        let normal = orient_toward_player(hit.normal, player_first);
        note_ground_contact(
            world,
            registry,
            grounding,
            player_body,
            partner,
            Some(normal),
        );
    }

    for touch in &events.contact_begins {
        let Some((partner, player_first)) =
            player_pair(touch.collider1, touch.collider2, player_collider)
        else {
            continue;
        };
        if world.is_sensor(partner) {
            continue;
        }
        match registry.tag_of_collider(partner) {
            Some(ShapeTag::Enemy) => {
                if !outcome.died {
                    tracing::info!("[events] player ran into an enemy");
                }
                outcome.died = true;
            }
            _ => {
                let normal = touch.normal.map(|n| orient_toward_player(n, player_first));
                note_ground_contact(world, registry, grounding, player_body, partner, normal);
            }
        }
    }

    let mut lost_support = false;
    for touch in &events.contact_ends {
        let Some((partner, _)) = player_pair(touch.collider1, touch.collider2, player_collider)
        else {
            continue;
        };
        grounding.note_end(partner);
        lost_support = true;
    }

    // A player straddling two supports must not flip airborne when leaving
    // just one. The tally handles the common case; when it empties, ask the
    // narrow phase whether some groundable contact is in fact still live.
    if lost_support && !grounding.grounded() {
        let live: Vec<ColliderHandle> = world
            .touching_colliders(player_collider)
            .into_iter()
            .filter(|&c| !world.is_sensor(c))
            .filter(|&c| {
                registry
                    .tag_of_collider(c)
                    .and_then(ShapeTag::ground_kind)
                    .is_some()
            })
            .collect();
        grounding.resync(live);
    }

    outcome
}

fn collect_coin(
    registry: &mut BodyRegistry,
    sensor: ColliderHandle,
    id: u32,
    outcome: &mut FrameOutcome,
) {
    let Some(entity) = registry.entity_of_collider_mut(sensor) else {
        return;
    };
    if entity.collected {
        return;
    }
    entity.collected = true;
    let body = entity.body_handle;
    registry.queue_destroy(body);
    outcome.coins.push(id);
    tracing::info!("[events] coin {id} collected");
}

/// Feeds one solid player contact into the grounding tracker, applying the
/// per-surface stabilizing kick when a support is newly counted.
fn note_ground_contact(
    world: &mut PhysicsWorld,
    registry: &BodyRegistry,
    grounding: &mut GroundingTracker,
    player_body: RigidBodyHandle,
    partner: ColliderHandle,
    normal: Option<Vector>,
) {
    let Some(kind) = registry
        .tag_of_collider(partner)
        .and_then(ShapeTag::ground_kind)
    else {
        return;
    };
    let vertical_velocity = world.velocity(player_body).map_or(0.0, |v| v.1);
    if !support_holds(kind, normal, vertical_velocity) {
        return;
    }
    if grounding.note_support(partner) {
        world.apply_kick(player_body, Vector::new(0.0, -settle_kick(kind)));
    }
}

/// Splits an unordered collider pair into (partner, player-is-first), or
/// `None` when the player is not involved.
fn player_pair(
    c1: ColliderHandle,
    c2: ColliderHandle,
    player_collider: ColliderHandle,
) -> Option<(ColliderHandle, bool)> {
    if c1 == player_collider {
        Some((c2, true))
    } else if c2 == player_collider {
        Some((c1, false))
    } else {
        None
    }
}

/// Reorients an engine normal so it points out of the surface toward the
/// player: the engine reports normals out of the pair's first collider.
fn orient_toward_player(normal: Vector, player_first: bool) -> Vector {
    if player_first { -normal } else { normal }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::culling::SleepCuller;
    use crate::physics::{ContactHit, ContactTouch, SensorTouch};
    use rapier2d::prelude::*;

    struct Fixture {
        world: PhysicsWorld,
        registry: BodyRegistry,
        grounding: GroundingTracker,
        player_body: RigidBodyHandle,
        player_collider: ColliderHandle,
    }

    impl Fixture {
        fn new() -> Self {
            let mut world = PhysicsWorld::new();
            let mut registry = BodyRegistry::new();
            let player_body = world.add_rigid_body(
                RigidBodyBuilder::dynamic()
                    .translation(Vector::new(0.0, 5000.0))
                    .lock_rotations()
                    .build(),
            );
            let player_collider =
                world.add_collider(ColliderBuilder::capsule_y(10.0, 14.0).build(), player_body);
            registry.register(player_body, player_collider, ShapeTag::Player);
            Self {
                world,
                registry,
                grounding: GroundingTracker::new(),
                player_body,
                player_collider,
            }
        }

        fn add_tagged(&mut self, tag: ShapeTag, sensor: bool, x: f32) -> ColliderHandle {
            let body = self.world.add_rigid_body(
                RigidBodyBuilder::fixed()
                    .translation(Vector::new(x, 0.0))
                    .build(),
            );
            let collider = self
                .world
                .add_collider(ColliderBuilder::cuboid(24.0, 24.0).sensor(sensor).build(), body);
            self.registry.register(body, collider, tag);
            collider
        }

        fn route(&mut self, events: &FrameEvents) -> FrameOutcome {
            route_frame(
                events,
                &mut self.world,
                &mut self.registry,
                &mut self.grounding,
                self.player_body,
                self.player_collider,
            )
        }

        fn set_player_velocity(&mut self, vx: f32, vy: f32) {
            self.world
                .get_rigid_body_mut(self.player_body)
                .unwrap()
                .set_linvel(Vector::new(vx, vy), true);
        }

        fn player_vy(&self) -> f32 {
            self.world.velocity(self.player_body).unwrap().1
        }
    }

    fn sensor_begin(sensor: ColliderHandle, visitor: ColliderHandle) -> FrameEvents {
        FrameEvents {
            sensor_begins: vec![SensorTouch { sensor, visitor }],
            ..FrameEvents::default()
        }
    }

    #[test]
    fn test_coin_collected_exactly_once_per_duplicate_begins() {
        let mut fx = Fixture::new();
        let coin = fx.add_tagged(ShapeTag::Coin { id: 7 }, true, 100.0);

        // Two begin events for the same pair in one frame.
        let events = FrameEvents {
            sensor_begins: vec![
                SensorTouch {
                    sensor: coin,
                    visitor: fx.player_collider,
                },
                SensorTouch {
                    sensor: coin,
                    visitor: fx.player_collider,
                },
            ],
            ..FrameEvents::default()
        };
        let outcome = fx.route(&events);

        assert_eq!(outcome.coins, vec![7]);
        assert_eq!(fx.registry.pending_destroy_count(), 1);

        // The next frame re-reports the overlap before the flush ran.
        let outcome = fx.route(&sensor_begin(coin, fx.player_collider));
        assert!(outcome.coins.is_empty(), "coin already collected");
        assert_eq!(fx.registry.pending_destroy_count(), 1);
    }

    #[test]
    fn test_non_player_visitor_cannot_collect() {
        let mut fx = Fixture::new();
        let coin = fx.add_tagged(ShapeTag::Coin { id: 3 }, true, 100.0);
        let enemy = fx.add_tagged(ShapeTag::Enemy, false, 200.0);

        let outcome = fx.route(&sensor_begin(coin, enemy));
        assert!(outcome.coins.is_empty());
        assert!(!outcome.died);
    }

    #[test]
    fn test_death_zone_overlap_kills_once() {
        let mut fx = Fixture::new();
        let zone = fx.add_tagged(ShapeTag::DeathZone, true, 0.0);

        let events = FrameEvents {
            sensor_begins: vec![
                SensorTouch {
                    sensor: zone,
                    visitor: fx.player_collider,
                },
                SensorTouch {
                    sensor: zone,
                    visitor: fx.player_collider,
                },
            ],
            ..FrameEvents::default()
        };
        let outcome = fx.route(&events);
        assert!(outcome.died);
    }

    #[test]
    fn test_enemy_contact_begin_kills() {
        let mut fx = Fixture::new();
        let enemy = fx.add_tagged(ShapeTag::Enemy, false, 40.0);

        let events = FrameEvents {
            contact_begins: vec![ContactTouch {
                collider1: enemy,
                collider2: fx.player_collider,
                normal: None,
            }],
            ..FrameEvents::default()
        };
        let outcome = fx.route(&events);
        assert!(outcome.died);
        assert!(!fx.grounding.grounded(), "enemies are not supports");
    }

    #[test]
    fn test_platform_hit_grounds_with_one_settle_kick() {
        let mut fx = Fixture::new();
        let platform = fx.add_tagged(ShapeTag::Platform, false, 0.0);
        fx.set_player_velocity(0.0, -0.05);

        // Engine order: platform first, so the raw normal out of the
        // platform already points up at the player.
        let player = fx.player_collider;
        let hit = |n: Vector| FrameEvents {
            hits: vec![ContactHit {
                collider1: platform,
                collider2: player,
                normal: n,
                force: 900.0,
            }],
            ..FrameEvents::default()
        };

        fx.route(&hit(Vector::new(0.0, 1.0)));
        assert!(fx.grounding.grounded());
        let vy_after_kick = fx.player_vy();
        assert!(
            vy_after_kick < -0.05,
            "settle kick should press the player down, got {vy_after_kick}"
        );

        // Repeated hits on the same support apply no further kick.
        fx.route(&hit(Vector::new(0.0, 1.0)));
        assert_eq!(fx.player_vy(), vy_after_kick);
        assert_eq!(fx.grounding.support_count(), 1);
    }

    #[test]
    fn test_wall_hit_does_not_ground() {
        let mut fx = Fixture::new();
        let platform = fx.add_tagged(ShapeTag::Platform, false, 0.0);
        fx.set_player_velocity(0.0, -300.0);

        let events = FrameEvents {
            hits: vec![ContactHit {
                collider1: platform,
                collider2: fx.player_collider,
                normal: Vector::new(1.0, 0.0),
                force: 500.0,
            }],
            ..FrameEvents::default()
        };
        fx.route(&events);
        assert!(!fx.grounding.grounded());
    }

    #[test]
    fn test_begin_without_normal_uses_velocity_fallback() {
        let mut fx = Fixture::new();
        let crate_top = fx.add_tagged(ShapeTag::Crate { size: 16.0 }, false, 0.0);
        fx.set_player_velocity(0.0, -70.0);

        let events = FrameEvents {
            contact_begins: vec![ContactTouch {
                collider1: crate_top,
                collider2: fx.player_collider,
                normal: None,
            }],
            ..FrameEvents::default()
        };
        fx.route(&events);
        assert!(
            fx.grounding.grounded(),
            "crate landing fallback admits -70 px/s"
        );
    }

    #[test]
    fn test_sensor_partner_never_grounds() {
        let mut fx = Fixture::new();
        // A sensor collider mislabeled with a groundable tag must still be
        // excluded from grounding.
        let ghost = fx.add_tagged(ShapeTag::Platform, true, 0.0);
        fx.set_player_velocity(0.0, -1.0);

        let events = FrameEvents {
            contact_begins: vec![ContactTouch {
                collider1: ghost,
                collider2: fx.player_collider,
                normal: Some(Vector::new(0.0, 1.0)),
            }],
            ..FrameEvents::default()
        };
        fx.route(&events);
        assert!(!fx.grounding.grounded());
    }

    #[test]
    fn test_straddle_survives_losing_one_support() {
        let mut fx = Fixture::new();
        let platform_a = fx.add_tagged(ShapeTag::Platform, false, -3000.0);
        let crate_b = fx.add_tagged(ShapeTag::Crate { size: 16.0 }, false, 3000.0);
        fx.set_player_velocity(0.0, -1.0);

        let begins = FrameEvents {
            contact_begins: vec![
                ContactTouch {
                    collider1: platform_a,
                    collider2: fx.player_collider,
                    normal: Some(Vector::new(0.0, 1.0)),
                },
                ContactTouch {
                    collider1: crate_b,
                    collider2: fx.player_collider,
                    normal: Some(Vector::new(0.0, 1.0)),
                },
            ],
            ..FrameEvents::default()
        };
        fx.route(&begins);
        assert_eq!(fx.grounding.support_count(), 2);

        let end_a = FrameEvents {
            contact_ends: vec![ContactTouch {
                collider1: platform_a,
                collider2: fx.player_collider,
                normal: None,
            }],
            ..FrameEvents::default()
        };
        fx.route(&end_a);
        assert!(fx.grounding.grounded(), "crate B still supports the player");

        let end_b = FrameEvents {
            contact_ends: vec![ContactTouch {
                collider1: crate_b,
                collider2: fx.player_collider,
                normal: None,
            }],
            ..FrameEvents::default()
        };
        fx.route(&end_b);
        assert!(!fx.grounding.grounded());
    }

    #[test]
    fn test_collected_coin_survives_flush_cycle() {
        let mut fx = Fixture::new();
        let mut culler = SleepCuller::new();
        let coin = fx.add_tagged(ShapeTag::Coin { id: 11 }, true, 100.0);

        let outcome = fx.route(&sensor_begin(coin, fx.player_collider));
        assert_eq!(outcome.coins, vec![11]);

        // End of frame: the queued body goes away and later events for the
        // stale collider resolve to nothing.
        let Fixture {
            world, registry, ..
        } = &mut fx;
        registry.flush_destroyed(world, &mut culler);
        assert!(fx.registry.entity_of_collider(coin).is_none());

        let outcome = fx.route(&sensor_begin(coin, fx.player_collider));
        assert!(outcome.coins.is_empty());
    }
}
