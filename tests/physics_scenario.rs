use std::sync::Arc;
use std::time::Duration;

use tokio_test::assert_ok;

use tank_arena_core::game::combat::HitLocation;
use tank_arena_core::game::manager::{ManagerConfig, WorldManager};
use tank_arena_core::game::physics::{
    BallisticParams, GeometricPhysics, LineOfSight, Obstacle, ObstacleKind, ObstacleMap,
    PhysicsDriver, PhysicsEngine, ShellPhysics, HIT_SENTINEL_Y,
};
use tank_arena_core::game::{Position, RespawnData, ShellData, ShellState, TankState};
use tank_arena_core::store::MemoryStore;
use tank_arena_core::util::time::unix_millis;

fn physics(map: &ObstacleMap) -> Arc<GeometricPhysics> {
    Arc::new(GeometricPhysics::new(
        map,
        ShellPhysics::new(BallisticParams::default()),
    ))
}

fn shell(owner: &str) -> ShellState {
    ShellState {
        id: "shell_1".into(),
        player_id: owner.into(),
        position: Position::new(0.0, 2.0, 0.0),
        direction: Position::new(0.0, 0.0, 1.0),
        speed: 5.0,
        timestamp: unix_millis(),
    }
}

#[test]
fn test_shell_fired_at_tank_hits_the_tracks() {
    let engine = physics(&ObstacleMap::default());
    engine.register_tank(&TankState::new("target", "target", Position::new(0.0, 0.0, 10.0)));

    let mut shells = vec![shell("shooter")];
    engine.update_shells(&mut shells);

    assert_eq!(shells[0].position.y, HIT_SENTINEL_Y);
    let hits = engine.take_hits();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].target_id, "target");
    assert_eq!(hits[0].source_id, "shooter");
    assert_eq!(hits[0].hit_location, Some(HitLocation::Tracks));
    assert_eq!(hits[0].damage_amount, 18);

    // Drained
    assert!(engine.take_hits().is_empty());
}

#[test]
fn test_destroyed_and_owner_tanks_are_not_hit() {
    let engine = physics(&ObstacleMap::default());
    let mut wreck = TankState::new("wreck", "wreck", Position::new(0.0, 0.0, 10.0));
    wreck.is_destroyed = true;
    wreck.health = 0;
    engine.register_tank(&wreck);
    engine.register_tank(&TankState::new("shooter", "shooter", Position::ORIGIN));

    let mut shells = vec![shell("shooter")];
    engine.update_shells(&mut shells);

    assert!(shells[0].position.y > 0.0);
    assert!(engine.take_hits().is_empty());
}

#[test]
fn test_shell_keeps_flying_between_steps() {
    let engine = physics(&ObstacleMap::default());
    let mut shells = vec![shell("shooter")];

    engine.update_shells(&mut shells);
    let after_one = shells[0].position.z;

    // The world still reports the launch position; flight continues from tracked state
    let mut shells = vec![shell("shooter")];
    engine.update_shells(&mut shells);
    assert!(shells[0].position.z > after_one);
}

#[test]
fn test_rock_blocks_line_of_sight() {
    let map = ObstacleMap::new(vec![Obstacle {
        kind: ObstacleKind::Rock,
        position: Position::new(50.0, 0.0, 0.0),
        scale: 10.0,
        radius: None,
    }]);
    let engine = physics(&map);

    let eye = Position::new(0.0, 1.2, 0.0);
    assert!(!engine.check_line_of_sight(&eye, &Position::new(100.0, 0.0, 0.0)));
    assert!(engine.check_line_of_sight(&eye, &Position::new(0.0, 0.0, 100.0)));

    let parked = TankState::new("t", "t", Position::new(45.0, 0.0, 0.0));
    assert_eq!(engine.environment_contacts(&parked).len(), 1);
}

#[tokio::test]
async fn test_driver_step_applies_hits_and_clears_shells() {
    let store = Arc::new(MemoryStore::new());
    let manager = WorldManager::new(
        store,
        ManagerConfig {
            fire_cooldown: Duration::ZERO,
            ..Default::default()
        },
    );

    let placements = [
        ("shooter", Position::ORIGIN),
        ("target", Position::new(0.0, 0.0, 10.0)),
    ];
    for (id, position) in placements {
        assert_ok!(
            manager
                .respawn_tank(RespawnData {
                    player_id: id.into(),
                    position: Some(position),
                })
                .await
        );
    }
    assert_ok!(
        manager
            .fire_shell(
                ShellData {
                    position: Position::new(0.0, 2.0, 0.0),
                    direction: Position::new(0.0, 0.0, 1.0),
                    speed: 5.0,
                },
                "shooter",
            )
            .await
    );

    let engine: Arc<dyn PhysicsEngine> = physics(&ObstacleMap::default());
    let mut driver = PhysicsDriver::new(engine.clone(), manager.clone());

    let report = driver.step().await;
    assert_eq!(report.hits, 1);
    assert_eq!(report.rejected_hits, 0);
    assert_eq!(report.removed_shells, 1);

    assert_eq!(manager.player("target").unwrap().health, 82);
    assert!(manager.state().shells.is_empty());

    let mut registered = engine.registered_tanks();
    registered.sort();
    assert_eq!(registered, vec!["shooter".to_string(), "target".to_string()]);
}

#[tokio::test]
async fn test_driver_unregisters_departed_tanks() {
    let manager = WorldManager::new(Arc::new(MemoryStore::new()), ManagerConfig::default());
    assert_ok!(
        manager
            .respawn_tank(RespawnData {
                player_id: "p1".into(),
                position: Some(Position::ORIGIN),
            })
            .await
    );

    let engine: Arc<dyn PhysicsEngine> = physics(&ObstacleMap::default());
    let mut driver = PhysicsDriver::new(engine.clone(), manager.clone());
    driver.step().await;
    assert_eq!(engine.registered_tanks(), vec!["p1".to_string()]);

    assert_ok!(manager.remove_player("p1").await);
    driver.step().await;
    assert!(engine.registered_tanks().is_empty());
}
