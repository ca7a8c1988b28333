//! Turret control and the fire decision

use std::time::Instant;

use rand::Rng;
use tracing::debug;

use crate::game::physics::LineOfSight;
use crate::game::snapshot::WorldSnapshot;
use crate::game::types::{Position, ShellData, TankState};

use super::agent::NpcAgent;
use super::movement::normalize_angle;
use super::targeting::TURRET_HEIGHT;

pub const MIN_BARREL_ELEVATION: f64 = -0.8;
pub const MAX_BARREL_ELEVATION: f64 = 0.0;
pub const BARREL_LENGTH: f64 = 2.0;
/// Flight speed assumed when leading a moving target
const LEAD_SHELL_SPEED: f64 = 5.0;

/// Range at which the agent starts tracking its target with the turret
pub fn acquisition_range(agent: &NpcAgent) -> f64 {
    250.0 + agent.personality.aggressiveness * 100.0
}

pub fn firing_range(agent: &NpcAgent) -> f64 {
    800.0 + agent.personality.aggressiveness * 300.0
}

/// Unit vector along the barrel
pub fn barrel_direction(turret_rotation: f64, barrel_elevation: f64) -> Position {
    let cos_elevation = barrel_elevation.cos();
    Position::new(
        turret_rotation.cos() * cos_elevation,
        barrel_elevation.sin(),
        turret_rotation.sin() * cos_elevation,
    )
}

/// Shell launched from the barrel tip along the barrel
pub fn shell_from_barrel(state: &TankState, speed: f64) -> ShellData {
    let direction = barrel_direction(state.turret_rotation, state.barrel_elevation);
    ShellData {
        position: Position::new(
            state.position.x + direction.x * BARREL_LENGTH,
            state.position.y + TURRET_HEIGHT + direction.y * BARREL_LENGTH,
            state.position.z + direction.z * BARREL_LENGTH,
        ),
        direction,
        speed,
    }
}

/// Aim at the current target and return a shell if the agent decides to fire.
/// Without a target in acquisition range the turret scans instead.
pub fn aim_and_fire(
    agent: &mut NpcAgent,
    state: &mut TankState,
    snapshot: &WorldSnapshot,
    los: &dyn LineOfSight,
    now: Instant,
    now_secs: f64,
    rng: &mut impl Rng,
) -> Option<ShellData> {
    let range = acquisition_range(agent);
    let target = agent
        .target_id
        .as_deref()
        .and_then(|id| snapshot.players.get(id))
        .filter(|t| !t.is_destroyed)
        .map(|t| (t, state.position.horizontal_distance(&t.position)))
        .filter(|(_, distance)| *distance < range);

    let Some((target, distance)) = target else {
        scan(agent, state, now_secs, rng);
        return None;
    };

    let p = agent.personality.clone();
    let eye = Position::new(state.position.x, state.position.y + TURRET_HEIGHT, state.position.z);
    agent.can_see_target = los.check_line_of_sight(&eye, &target.position);
    agent.aiming_at = Some(target.position);

    let dx = target.position.x - state.position.x;
    let dz = target.position.z - state.position.z;
    let mut target_angle = dz.atan2(dx);

    if p.tactical_iq > 0.7 && target.is_moving {
        let flight_time = distance / LEAD_SHELL_SPEED;
        let lead = p.tactical_iq * 0.8;
        let predicted_x = target.position.x
            + target.tank_rotation.cos() * target.velocity * flight_time * lead;
        let predicted_z = target.position.z
            + target.tank_rotation.sin() * target.velocity * flight_time * lead;
        target_angle = (predicted_z - state.position.z).atan2(predicted_x - state.position.x);
    }

    // Turret
    let aim_error = normalize_angle(target_angle - state.turret_rotation);
    let turret_speed = 0.05 * (0.8 + p.tactical_iq * 0.4);
    let rotation = aim_error.abs().min(turret_speed).copysign(aim_error);

    let mut inaccuracy = (1.0 - p.accuracy) * 0.5;
    if !state.is_moving {
        inaccuracy *= 0.6;
    }
    inaccuracy *= 1.0 + (distance / 200.0).min(1.0);

    let offset = (rng.gen::<f64>() - 0.5) * inaccuracy;
    let wobble = (rng.gen::<f64>() - 0.5) * 0.002;
    state.turret_rotation = normalize_angle(state.turret_rotation + rotation + wobble + offset);

    // Barrel
    let height_difference = target.position.y - state.position.y + 5.0;
    let target_elevation = if distance > 0.0 {
        (-height_difference.atan2(distance)).min(0.0)
    } else {
        0.0
    };
    let elevation_error = target_elevation - state.barrel_elevation;
    let elevation_speed = 0.03 * (0.3 + elevation_error.abs() * 2.0).min(1.0);
    let elevation_step = elevation_error.abs().min(elevation_speed).copysign(elevation_error);
    let jitter = (rng.gen::<f64>() - 0.5) * inaccuracy * 0.2 + (rng.gen::<f64>() - 0.5) * 0.001;
    let distance_adjustment = (distance / 500.0).min(0.3);
    let elevation = state.barrel_elevation + elevation_step + jitter + distance_adjustment;
    state.barrel_elevation = elevation.clamp(MIN_BARREL_ELEVATION, MAX_BARREL_ELEVATION);

    // Fire decision
    let since_fire = now.saturating_duration_since(agent.last_fire);
    let mut ready = true;
    if p.tactical_iq > 0.6 {
        let max_error = (1.0 - p.accuracy) * 0.2;
        let precision = aim_error.abs();
        ready = precision < max_error && elevation_error.abs() < 0.1 && agent.can_see_target;
        if !target.is_moving && precision < max_error * 1.5 {
            ready = true;
        }
        if since_fire > p.fire_cooldown.mul_f64(2.5) && precision < 0.15 && agent.can_see_target {
            ready = true;
        }
    }

    let fire = agent.fire_ready(now)
        && distance < firing_range(agent)
        && ready
        && (agent.can_see_target || p.tactical_iq < 0.3);
    if !fire {
        return None;
    }

    debug!(
        npc_id = %agent.id,
        target_id = %target.id,
        distance,
        inaccuracy,
        "NPC firing at target"
    );
    Some(shell_from_barrel(state, 7.0 + p.aggressiveness))
}

/// Idle turret sweep while nothing is in range
fn scan(agent: &mut NpcAgent, state: &mut TankState, now_secs: f64, rng: &mut impl Rng) {
    let iq = agent.personality.tactical_iq;

    if iq > 0.6 {
        // Sweep while drifting toward the direction of travel
        let alignment = iq * 0.2;
        let sweep = 0.002 * (1.0 - alignment) * (now_secs * 0.5).sin();
        let toward_hull =
            normalize_angle(state.tank_rotation - state.turret_rotation) * alignment * 0.02;
        let wobble = (rng.gen::<f64>() - 0.5) * 0.002;
        state.turret_rotation += sweep + toward_hull + wobble;

        let barrel_target =
            (now_secs * 0.5).sin() * (MAX_BARREL_ELEVATION - MIN_BARREL_ELEVATION) / 2.0;
        state.barrel_elevation += (barrel_target - state.barrel_elevation) * 0.01;
    } else {
        let sweep = 0.002 + rng.gen::<f64>() * 0.001;
        state.turret_rotation += sweep + (now_secs * 0.5).sin() * 0.01;
        state.barrel_elevation = -0.4 + (now_secs * 0.3).sin() * 0.2;
    }

    state.turret_rotation = normalize_angle(state.turret_rotation);
    agent.aiming_at = None;
    agent.can_see_target = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::npc::agent::MovementPattern;
    use crate::npc::personality::Personality;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::time::Duration;

    struct Sight(bool);
    impl LineOfSight for Sight {
        fn check_line_of_sight(&self, _: &Position, _: &Position) -> bool {
            self.0
        }
    }

    fn agent(accuracy: f64, tactical_iq: f64, start: Instant) -> NpcAgent {
        let mut rng = ChaCha8Rng::seed_from_u64(31);
        let personality = Personality {
            accuracy,
            move_speed: 0.2,
            aggressiveness: 0.5,
            fire_rate: 0.5,
            tactical_iq,
            fire_cooldown: Duration::from_secs(2),
        };
        let mut npc = NpcAgent::new(
            "bot_1".into(),
            "Iron Bear".into(),
            Position::ORIGIN,
            MovementPattern::Circle,
            personality,
            start,
            &mut rng,
        );
        npc.state.turret_rotation = 0.0;
        npc.state.barrel_elevation = 0.0;
        npc
    }

    fn target_at(x: f64, z: f64) -> WorldSnapshot {
        let mut snapshot = WorldSnapshot::default();
        snapshot
            .players
            .insert("p1".into(), TankState::new("p1", "p1", Position::new(x, 0.0, z)));
        snapshot
    }

    #[test]
    fn test_barrel_direction_is_unit_length() {
        for (turret, elevation) in [(0.0, 0.0), (1.0, -0.4), (-2.5, -0.8)] {
            let d = barrel_direction(turret, elevation);
            assert!((d.length() - 1.0).abs() < 1e-9);
        }
        let forward = barrel_direction(0.0, 0.0);
        assert!((forward.x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_shell_leaves_from_barrel_tip() {
        let mut state = TankState::new("bot_1", "b", Position::new(10.0, 0.0, 10.0));
        state.turret_rotation = 0.0;
        state.barrel_elevation = 0.0;
        let shell = shell_from_barrel(&state, 7.5);
        assert_eq!(shell.position, Position::new(12.0, TURRET_HEIGHT, 10.0));
        assert_eq!(shell.speed, 7.5);
    }

    #[test]
    fn test_fires_at_visible_target_in_range() {
        let start = Instant::now();
        let mut npc = agent(1.0, 0.5, start);
        npc.target_id = Some("p1".into());
        let mut state = npc.state.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(32);

        let shell = aim_and_fire(
            &mut npc,
            &mut state,
            &target_at(100.0, 0.0),
            &Sight(true),
            start + Duration::from_secs(3),
            0.0,
            &mut rng,
        )
        .expect("should fire");

        assert!(shell.direction.x > 0.9);
        assert_eq!(shell.speed, 7.5);
        assert!(npc.can_see_target);
        assert_eq!(npc.aiming_at, Some(Position::new(100.0, 0.0, 0.0)));
        assert!((MIN_BARREL_ELEVATION..=MAX_BARREL_ELEVATION).contains(&state.barrel_elevation));
    }

    #[test]
    fn test_holds_fire_during_cooldown() {
        let start = Instant::now();
        let mut npc = agent(1.0, 0.5, start);
        npc.target_id = Some("p1".into());
        let mut state = npc.state.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(33);

        let shell = aim_and_fire(
            &mut npc,
            &mut state,
            &target_at(100.0, 0.0),
            &Sight(true),
            start + Duration::from_millis(500),
            0.0,
            &mut rng,
        );
        assert!(shell.is_none());
    }

    #[test]
    fn test_blocked_sight_holds_fire_unless_reckless() {
        let start = Instant::now();
        let later = start + Duration::from_secs(3);
        let mut rng = ChaCha8Rng::seed_from_u64(34);

        let mut careful = agent(1.0, 0.5, start);
        careful.target_id = Some("p1".into());
        let mut state = careful.state.clone();
        let world = target_at(100.0, 0.0);
        let shot =
            aim_and_fire(&mut careful, &mut state, &world, &Sight(false), later, 0.0, &mut rng);
        assert!(shot.is_none());
        assert!(!careful.can_see_target);

        let mut reckless = agent(1.0, 0.2, start);
        reckless.target_id = Some("p1".into());
        let mut state = reckless.state.clone();
        let shot =
            aim_and_fire(&mut reckless, &mut state, &world, &Sight(false), later, 0.0, &mut rng);
        assert!(shot.is_some());
    }

    #[test]
    fn test_turret_turn_is_rate_limited() {
        let start = Instant::now();
        let mut npc = agent(1.0, 0.5, start);
        npc.target_id = Some("p1".into());
        let mut state = npc.state.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(35);

        // Target straight along +z, a quarter turn away
        let world = target_at(0.0, 100.0);
        aim_and_fire(&mut npc, &mut state, &world, &Sight(true), start, 0.0, &mut rng);
        let max_step = 0.05 * (0.8 + 0.5 * 0.4) + 0.001;
        assert!(state.turret_rotation > 0.0);
        assert!(state.turret_rotation <= max_step);
    }

    #[test]
    fn test_scans_without_target() {
        let start = Instant::now();
        let mut npc = agent(0.5, 0.3, start);
        npc.aiming_at = Some(Position::ORIGIN);
        npc.can_see_target = true;
        let mut state = npc.state.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(36);

        let empty = WorldSnapshot::default();
        let shot = aim_and_fire(&mut npc, &mut state, &empty, &Sight(true), start, 1.0, &mut rng);
        assert!(shot.is_none());
        assert!(npc.aiming_at.is_none());
        assert!(!npc.can_see_target);
        assert!(state.turret_rotation != 0.0);
    }

    #[test]
    fn test_target_beyond_acquisition_range_is_not_tracked() {
        let start = Instant::now();
        let mut npc = agent(1.0, 0.5, start);
        npc.target_id = Some("p1".into());
        let mut state = npc.state.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(37);

        let target = target_at(acquisition_range(&npc) + 10.0, 0.0);
        let shot = aim_and_fire(
            &mut npc,
            &mut state,
            &target,
            &Sight(true),
            start + Duration::from_secs(3),
            0.0,
            &mut rng,
        );
        assert!(shot.is_none());
        assert!(npc.aiming_at.is_none());
    }
}
