//! Sphere-based reference physics backend

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::game::types::{HitData, Position, ShellState, TankState};
use crate::util::time::unix_millis;

use super::ballistics::{ShellPhysics, ShellStep};
use super::collision::{
    spheres_overlap, Collider, TankContact, TANK_CONTACT_RADIUS, TANK_ENVIRONMENT_RADIUS,
};
use super::obstacles::ObstacleMap;
use super::{LineOfSight, PhysicsEngine, GROUND_SENTINEL_Y, HIT_SENTINEL_Y};

/// Sample spacing along a line-of-sight segment
const LOS_STEP: f64 = 5.0;

#[derive(Default)]
struct BodyState {
    tanks: HashMap<String, TankState>,
    /// Flight state carried between steps, keyed by shell id
    shells: HashMap<String, ShellState>,
    hits: Vec<HitData>,
}

/// Geometric physics: spheres for everything, static obstacles from a map
pub struct GeometricPhysics {
    obstacles: Vec<Collider>,
    shell_physics: ShellPhysics,
    bodies: Mutex<BodyState>,
}

impl GeometricPhysics {
    pub fn new(map: &ObstacleMap, shell_physics: ShellPhysics) -> Self {
        let obstacles = map
            .obstacles
            .iter()
            .enumerate()
            .map(|(i, o)| Collider::obstacle(i, o))
            .collect();

        Self {
            obstacles,
            shell_physics,
            bodies: Mutex::new(BodyState::default()),
        }
    }

    fn step_shells(&self, shells: &mut [ShellState], now_ms: u64) {
        let mut bodies = self.bodies.lock();
        let BodyState {
            tanks,
            shells: tracked,
            hits,
        } = &mut *bodies;

        let live: HashSet<&str> = shells.iter().map(|s| s.id.as_str()).collect();
        tracked.retain(|id, _| live.contains(id.as_str()));

        for shell in shells.iter_mut() {
            // Continue from our own flight state when we have seen this shell before
            if let Some(previous) = tracked.get(&shell.id) {
                shell.position = previous.position;
                shell.direction = previous.direction;
                shell.speed = previous.speed;
            }

            match self.shell_physics.step(shell, now_ms) {
                ShellStep::InFlight => {}
                ShellStep::GroundImpact | ShellStep::Expired => {
                    trace!(shell_id = %shell.id, "Shell stopped");
                    shell.position.y = GROUND_SENTINEL_Y;
                    tracked.remove(&shell.id);
                    continue;
                }
            }

            let hit = tanks
                .values()
                .filter(|t| !t.is_destroyed && t.id != shell.player_id)
                .find_map(|t| {
                    self.shell_physics
                        .detailed_collision(shell, t)
                        .map(|zone| (t.id.clone(), zone))
                });

            match hit {
                Some((target_id, zone)) => {
                    debug!(
                        shell_id = %shell.id,
                        target_id = %target_id,
                        location = %zone.location,
                        damage = zone.damage,
                        "Shell hit tank"
                    );
                    hits.push(HitData {
                        target_id,
                        source_id: shell.player_id.clone(),
                        damage_amount: zone.damage,
                        hit_location: Some(zone.location),
                        timestamp: now_ms,
                    });
                    shell.position.y = HIT_SENTINEL_Y;
                    tracked.remove(&shell.id);
                }
                None => {
                    tracked.insert(shell.id.clone(), shell.clone());
                }
            }
        }
    }
}

impl LineOfSight for GeometricPhysics {
    fn check_line_of_sight(&self, from: &Position, to: &Position) -> bool {
        let distance = from.distance(to);
        if distance == 0.0 || self.obstacles.is_empty() {
            return true;
        }

        let steps = (distance / LOS_STEP).ceil() as usize;
        (1..steps).all(|i| {
            let t = i as f64 / steps as f64;
            let sample = Position::new(
                from.x + (to.x - from.x) * t,
                from.y + (to.y - from.y) * t,
                from.z + (to.z - from.z) * t,
            );
            !self.obstacles.iter().any(|o| o.contains(&sample))
        })
    }
}

impl PhysicsEngine for GeometricPhysics {
    fn register_tank(&self, tank: &TankState) {
        self.bodies.lock().tanks.insert(tank.id.clone(), tank.clone());
    }

    fn unregister_tank(&self, tank_id: &str) {
        if self.bodies.lock().tanks.remove(tank_id).is_some() {
            trace!(tank_id = %tank_id, "Tank body unregistered");
        }
    }

    fn registered_tanks(&self) -> Vec<String> {
        self.bodies.lock().tanks.keys().cloned().collect()
    }

    fn update_shells(&self, shells: &mut [ShellState]) {
        self.step_shells(shells, unix_millis());
    }

    fn update(&self) -> Vec<TankContact> {
        let bodies = self.bodies.lock();
        let live: Vec<&TankState> = bodies.tanks.values().filter(|t| !t.is_destroyed).collect();

        let mut contacts = Vec::new();
        for (i, a) in live.iter().enumerate() {
            for b in &live[i + 1..] {
                if spheres_overlap(
                    &a.position,
                    TANK_CONTACT_RADIUS,
                    &b.position,
                    TANK_CONTACT_RADIUS,
                ) {
                    debug!(first = %a.id, second = %b.id, "Tank contact");
                    contacts.push(TankContact {
                        first: a.id.clone(),
                        second: b.id.clone(),
                    });
                }
            }
        }
        contacts
    }

    fn environment_contacts(&self, tank: &TankState) -> Vec<Collider> {
        self.obstacles
            .iter()
            .filter(|o| {
                spheres_overlap(&tank.position, TANK_ENVIRONMENT_RADIUS, &o.position, o.radius)
            })
            .cloned()
            .collect()
    }

    fn take_hits(&self) -> Vec<HitData> {
        std::mem::take(&mut self.bodies.lock().hits)
    }
}
