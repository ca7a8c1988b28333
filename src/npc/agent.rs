//! Per-NPC agent record and server reconciliation

use std::f64::consts::TAU;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::game::manager::player_color;
use crate::game::types::{PlayerStatus, Position, ShellState, TankState};

use super::personality::Personality;

/// How long an attacker stays remembered
pub const GRUDGE_DURATION: Duration = Duration::from_secs(30);
/// Without a recorded hit source, shells within this ground distance of a
/// damaged NPC are suspects
pub const ATTACKER_SEARCH_RADIUS: f64 = 50.0;
/// Local position is replaced by the server's once they drift this far apart
pub const RECONCILE_DRIFT: f64 = 5.0;
/// Respawns further out than this are pulled back toward the centre
pub const RESPAWN_RECENTER_RADIUS: f64 = 1_000.0;
/// Distance covered per tick at a move-speed trait of 1.0
pub const BASE_SPEED: f64 = 10.0;

/// How an NPC roams when it is not pursuing anything
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementPattern {
    Circle,
    Zigzag,
    Patrol,
    Random,
}

impl MovementPattern {
    pub const ALL: [MovementPattern; 4] = [Self::Circle, Self::Zigzag, Self::Patrol, Self::Random];

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}

/// The last tank that damaged this NPC
#[derive(Debug, Clone, PartialEq)]
pub struct Grudge {
    pub attacker_id: String,
    pub since: Instant,
}

impl Grudge {
    /// 1.0 right after the attack, falling linearly to 0 at `GRUDGE_DURATION`
    pub fn recency(&self, now: Instant) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.since);
        (elapsed < GRUDGE_DURATION)
            .then(|| 1.0 - elapsed.as_secs_f64() / GRUDGE_DURATION.as_secs_f64())
    }
}

/// Result of merging the server's view into the local mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Server has no record; the NPC must register again
    Missing,
    /// Server still shows the NPC destroyed
    Destroyed,
    /// Came back from destroyed this tick
    Respawned,
    Alive,
}

/// One computer-controlled tank
#[derive(Debug, Clone)]
pub struct NpcAgent {
    pub id: String,
    pub name: String,
    /// Local mirror of the server record
    pub state: TankState,
    pub pattern: MovementPattern,
    pub personality: Personality,
    pub target_id: Option<String>,
    pub grudge: Option<Grudge>,
    pub patrol_points: Vec<Position>,
    pub current_point: usize,
    pub last_update: Instant,
    /// When the tank was first seen standing still, if it still is
    pub stationary_since: Option<Instant>,
    pub last_fire: Instant,
    pub active: bool,
    pub aiming_at: Option<Position>,
    pub can_see_target: bool,
    /// Heading the random walk is turning toward
    pub target_rotation: Option<f64>,
    pub moving_backward: bool,
}

impl NpcAgent {
    pub fn new(
        id: String,
        name: String,
        spawn: Position,
        pattern: MovementPattern,
        personality: Personality,
        now: Instant,
        rng: &mut impl Rng,
    ) -> Self {
        let mut state = TankState::new(id.clone(), name.clone(), spawn);
        state.tank_rotation = rng.gen_range(0.0..TAU);
        state.turret_rotation = rng.gen_range(0.0..TAU);
        state.is_moving = true;
        state.velocity = BASE_SPEED * personality.move_speed;
        state.status = PlayerStatus::Active;
        state.color = player_color(&id).to_string();

        let patrol_points = match pattern {
            MovementPattern::Patrol => patrol_route(&spawn, rng),
            _ => Vec::new(),
        };

        Self {
            id,
            name,
            state,
            pattern,
            personality,
            target_id: None,
            grudge: None,
            patrol_points,
            current_point: 0,
            last_update: now,
            stationary_since: None,
            last_fire: now,
            active: true,
            aiming_at: None,
            can_see_target: false,
            target_rotation: None,
            moving_backward: false,
        }
    }

    /// Cruising speed per tick before pattern modifiers
    pub fn cruise_speed(&self) -> f64 {
        BASE_SPEED * self.personality.move_speed
    }

    pub fn fire_ready(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_fire) > self.personality.fire_cooldown
    }

    /// Grudge recency against `target_id`, if the grudge is still live
    pub fn grudge_against(&self, target_id: &str, now: Instant) -> Option<f64> {
        self.grudge
            .as_ref()
            .filter(|g| g.attacker_id == target_id)
            .and_then(|g| g.recency(now))
    }

    /// Likelihood of chasing the current target instead of roaming
    pub fn pursuit_likelihood(&self, now: Instant) -> f64 {
        let grudge = self
            .target_id
            .as_deref()
            .and_then(|target| self.grudge_against(target, now))
            .map(|recency| self.personality.grudge_factor() * recency * 0.5)
            .unwrap_or(0.0);
        self.personality.aggressiveness + grudge
    }

    /// Merge the server's record into the mirror. The server wins on health,
    /// destroyed and status; local motion wins unless it drifted too far.
    pub fn reconcile(
        &mut self,
        server: Option<&TankState>,
        shells: &[ShellState],
        now: Instant,
        rng: &mut impl Rng,
    ) -> Reconciled {
        let Some(server) = server else {
            return Reconciled::Missing;
        };

        if server.health < self.state.health && !server.is_destroyed {
            let attacker = server
                .last_hit_by
                .clone()
                .filter(|source| *source != self.id)
                .or_else(|| likely_attacker(&self.id, &server.position, shells));
            if let Some(attacker) = attacker {
                debug!(npc_id = %self.id, attacker_id = %attacker, "NPC remembers attacker");
                self.grudge = Some(Grudge {
                    attacker_id: attacker,
                    since: now,
                });
            }
        }

        let respawned = self.state.is_destroyed && !server.is_destroyed;
        self.state.health = server.health;
        self.state.is_destroyed = server.is_destroyed;
        self.state.status = server.status;

        if respawned {
            self.state.position = server.position;
            if self.state.position.distance_from_origin() > RESPAWN_RECENTER_RADIUS {
                let radius = rng.gen_range(0.0..RESPAWN_RECENTER_RADIUS);
                let angle = rng.gen_range(0.0..TAU);
                self.state.position.x = angle.cos() * radius;
                self.state.position.z = angle.sin() * radius;
            }
            self.state.is_moving = false;
            self.state.velocity = 0.0;
            self.moving_backward = false;
            self.state.tank_rotation = rng.gen_range(0.0..TAU);
            self.state.turret_rotation = self.state.tank_rotation;
            self.grudge = None;
            self.target_id = None;
            return Reconciled::Respawned;
        }

        if self.state.position.horizontal_distance(&server.position) > RECONCILE_DRIFT {
            self.state.position = server.position;
        }

        if self.state.is_destroyed {
            self.state.is_moving = false;
            self.state.velocity = 0.0;
            return Reconciled::Destroyed;
        }
        Reconciled::Alive
    }
}

/// Owner of the nearest foreign shell within `ATTACKER_SEARCH_RADIUS`
fn likely_attacker(npc_id: &str, position: &Position, shells: &[ShellState]) -> Option<String> {
    shells
        .iter()
        .filter(|s| s.player_id != npc_id)
        .map(|s| (s.position.horizontal_distance(position), s))
        .filter(|(d, _)| *d < ATTACKER_SEARCH_RADIUS)
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, s)| s.player_id.clone())
}

/// Square patrol route around the spawn. Far spawns get one waypoint pulled
/// most of the way toward the centre.
pub fn patrol_route(spawn: &Position, rng: &mut impl Rng) -> Vec<Position> {
    let size = 100.0 + rng.gen::<f64>() * 200.0;
    let (x, z) = (spawn.x, spawn.z);
    let dist = spawn.distance_from_origin();

    if dist > 1_000.0 {
        let center_angle = (-z).atan2(-x);
        let pull = dist * 0.6;
        vec![
            Position::new(x + size, 0.0, z + size),
            Position::new(x + center_angle.cos() * pull, 0.0, z + center_angle.sin() * pull),
            Position::new(x - size, 0.0, z - size),
            Position::new(x - size, 0.0, z + size),
        ]
    } else {
        vec![
            Position::new(x + size, 0.0, z + size),
            Position::new(x + size, 0.0, z - size),
            Position::new(x - size, 0.0, z - size),
            Position::new(x - size, 0.0, z + size),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn agent(rng: &mut ChaCha8Rng, now: Instant) -> NpcAgent {
        let personality = Personality::randomized(0.5, rng);
        NpcAgent::new(
            "bot_1".into(),
            "Rusty Fox".into(),
            Position::new(10.0, 0.0, 10.0),
            MovementPattern::Circle,
            personality,
            now,
            rng,
        )
    }

    fn shell_from(owner: &str, position: Position) -> ShellState {
        ShellState {
            id: format!("shell_{}", owner),
            player_id: owner.to_string(),
            position,
            direction: Position::new(1.0, 0.0, 0.0),
            speed: 7.0,
            timestamp: 0,
        }
    }

    #[test]
    fn test_grudge_recorded_from_nearest_shell() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let now = Instant::now();
        let mut npc = agent(&mut rng, now);

        let mut server = npc.state.clone();
        server.health = 75;
        let shells = vec![
            shell_from("far", Position::new(50.0, 2.0, 50.0)),
            shell_from("near", Position::new(12.0, 2.0, 10.0)),
            shell_from("bot_1", Position::new(10.0, 2.0, 10.0)),
        ];

        assert_eq!(npc.reconcile(Some(&server), &shells, now, &mut rng), Reconciled::Alive);
        assert_eq!(npc.state.health, 75);
        let grudge = npc.grudge.as_ref().unwrap();
        assert_eq!(grudge.attacker_id, "near");
    }

    #[test]
    fn test_grudge_prefers_recorded_hit_source() {
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let now = Instant::now();
        let mut npc = agent(&mut rng, now);

        let mut server = npc.state.clone();
        server.health = 82;
        server.last_hit_by = Some("sniper".into());
        // A closer shell from someone else does not override the hit record
        let shells = vec![shell_from("near", Position::new(11.0, 2.0, 10.0))];

        npc.reconcile(Some(&server), &shells, now, &mut rng);
        assert_eq!(npc.grudge.as_ref().unwrap().attacker_id, "sniper");
    }

    #[test]
    fn test_no_grudge_without_damage() {
        let mut rng = ChaCha8Rng::seed_from_u64(14);
        let now = Instant::now();
        let mut npc = agent(&mut rng, now);

        let mut server = npc.state.clone();
        server.last_hit_by = Some("sniper".into());
        npc.reconcile(Some(&server), &[], now, &mut rng);
        assert!(npc.grudge.is_none());
    }

    #[test]
    fn test_grudge_decays_after_thirty_seconds() {
        let start = Instant::now();
        let grudge = Grudge {
            attacker_id: "x".into(),
            since: start,
        };
        let at_29 = grudge.recency(start + Duration::from_secs(29)).unwrap();
        assert!(at_29 > 0.0 && at_29 < 0.05);
        assert!(grudge.recency(start + Duration::from_secs(31)).is_none());
    }

    #[test]
    fn test_missing_server_record() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let now = Instant::now();
        let mut npc = agent(&mut rng, now);
        assert_eq!(npc.reconcile(None, &[], now, &mut rng), Reconciled::Missing);
    }

    #[test]
    fn test_respawn_recenters_and_clears_grudge() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let now = Instant::now();
        let mut npc = agent(&mut rng, now);
        npc.state.is_destroyed = true;
        npc.state.health = 0;
        npc.grudge = Some(Grudge {
            attacker_id: "p1".into(),
            since: now,
        });

        let mut server = npc.state.clone();
        server.is_destroyed = false;
        server.health = 100;
        server.status = PlayerStatus::Active;
        server.position = Position::new(3_000.0, 0.0, 0.0);

        assert_eq!(npc.reconcile(Some(&server), &[], now, &mut rng), Reconciled::Respawned);
        assert!(npc.state.position.distance_from_origin() < RESPAWN_RECENTER_RADIUS);
        assert_eq!(npc.state.velocity, 0.0);
        assert_eq!(npc.state.turret_rotation, npc.state.tank_rotation);
        assert!(npc.grudge.is_none());
    }

    #[test]
    fn test_small_drift_keeps_local_position() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let now = Instant::now();
        let mut npc = agent(&mut rng, now);
        let mut server = npc.state.clone();
        server.position.x += 3.0;
        npc.reconcile(Some(&server), &[], now, &mut rng);
        assert_eq!(npc.state.position.x, 10.0);

        server.position.x += 10.0;
        npc.reconcile(Some(&server), &[], now, &mut rng);
        assert_eq!(npc.state.position.x, 23.0);
    }

    #[test]
    fn test_destroyed_npc_idles() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let now = Instant::now();
        let mut npc = agent(&mut rng, now);
        let mut server = npc.state.clone();
        server.health = 0;
        server.is_destroyed = true;
        server.status = PlayerStatus::Destroyed;

        assert_eq!(npc.reconcile(Some(&server), &[], now, &mut rng), Reconciled::Destroyed);
        assert!(!npc.state.is_moving);
        assert_eq!(npc.state.velocity, 0.0);
    }

    #[test]
    fn test_far_spawn_patrol_pulls_toward_centre() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let spawn = Position::new(2_000.0, 0.0, 0.0);
        let route = patrol_route(&spawn, &mut rng);
        assert_eq!(route.len(), 4);
        assert!((route[1].x - 800.0).abs() < 1e-6);
    }
}
