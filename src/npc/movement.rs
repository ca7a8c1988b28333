//! NPC locomotion: roaming patterns and target pursuit
//!
//! Tanks only drive along their hull heading. Every pattern drifts back
//! toward the arena centre, harder the further out the tank is.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_3, FRAC_PI_4, FRAC_PI_8, PI, TAU};

use rand::Rng;

use crate::game::snapshot::WorldSnapshot;
use crate::game::types::{Position, TankState};

use super::agent::{MovementPattern, NpcAgent};

/// Random-walk tanks past this radius always turn home
pub const MAP_BOUND: f64 = 2_400.0;

/// Wrap an angle into [-π, π]
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a < -PI {
        a += TAU;
    }
    a
}

/// Signed turn from `current` toward `target`, at most `max_step`
pub fn turn_toward(current: f64, target: f64, max_step: f64) -> f64 {
    let diff = normalize_angle(target - current);
    diff.abs().min(max_step).copysign(diff)
}

/// Heading from `position` to the origin
pub fn center_angle(position: &Position) -> f64 {
    (-position.z).atan2(-position.x)
}

/// Pull toward the centre: 0 inside `start`, growing over `span`, capped at `cap`
fn center_bias(distance: f64, start: f64, span: f64, cap: f64) -> f64 {
    if distance > start {
        ((distance - start) / span).min(cap)
    } else {
        0.0
    }
}

fn wobble(rng: &mut impl Rng, amount: f64) -> f64 {
    (rng.gen::<f64>() - 0.5) * amount
}

/// Move along the hull heading by the current velocity
fn advance(state: &mut TankState) {
    state.position.x += state.tank_rotation.cos() * state.velocity;
    state.position.z += state.tank_rotation.sin() * state.velocity;
    state.track_rotation = state.velocity * 5.0;
}

/// Run the agent's roaming pattern for one tick
pub fn follow_pattern(
    agent: &mut NpcAgent,
    state: &mut TankState,
    now_secs: f64,
    rng: &mut impl Rng,
) {
    match agent.pattern {
        MovementPattern::Circle => move_in_circle(agent, state, now_secs, rng),
        MovementPattern::Zigzag => move_in_zigzag(agent, state, now_secs, rng),
        MovementPattern::Patrol => move_in_patrol(agent, state, now_secs, rng),
        MovementPattern::Random => move_randomly(agent, state, now_secs, rng),
    }
    state.is_moving = true;
    advance(state);
}

fn move_in_circle(agent: &NpcAgent, state: &mut TankState, now: f64, rng: &mut impl Rng) {
    let speed = agent.cruise_speed();
    let dist = state.position.distance_from_origin();
    let bias = center_bias(dist, 1_000.0, 2_500.0, 0.85);

    if bias > 0.3 && rng.gen::<f64>() < bias * 0.4 {
        let toward = center_angle(&state.position);
        let turn = turn_toward(state.tank_rotation, toward, 0.02 + bias * 0.03);
        state.tank_rotation = normalize_angle(state.tank_rotation + turn + wobble(rng, 0.002));
        state.velocity = speed * (1.0 + bias * 0.7);
        return;
    }

    let mut turn_multiplier = 0.5 + (now * 0.3).sin() * 0.5;
    if bias > 0.0 {
        let diff = normalize_angle(center_angle(&state.position) - state.tank_rotation);
        // Tighten the circle when facing away from the centre
        turn_multiplier *= if diff.abs() < FRAC_PI_2 {
            1.0 - bias * 0.4
        } else {
            1.0 + bias * 0.6
        };
    }
    state.tank_rotation = normalize_angle(state.tank_rotation + 0.001 * speed * turn_multiplier);

    let variation = 1.0 + (now * 0.2).sin() * 0.1;
    state.velocity = speed * variation * (1.0 + bias * 0.3);
}

fn move_in_zigzag(agent: &NpcAgent, state: &mut TankState, now: f64, rng: &mut impl Rng) {
    let speed = agent.cruise_speed();
    let iq = agent.personality.tactical_iq;
    let dist = state.position.distance_from_origin();
    let bias = center_bias(dist, 800.0, 2_200.0, 0.9);

    if bias > 0.25 && rng.gen::<f64>() < bias * 0.5 {
        let toward = center_angle(&state.position);
        let turn = turn_toward(state.tank_rotation, toward, 0.025 + bias * 0.035);
        state.tank_rotation = normalize_angle(state.tank_rotation + turn + wobble(rng, 0.003));
        state.velocity = speed * (1.0 + bias * 0.8);
        return;
    }

    // Smarter tanks weave faster but tighter
    let frequency = 0.2 + iq * 0.3;
    let amplitude = 0.02 * (1.0 - iq * 0.5);

    if bias > 0.0 {
        let diff = normalize_angle(center_angle(&state.position) - state.tank_rotation);
        state.tank_rotation += diff * bias * 0.006;
    }

    let oscillation = (now * frequency).sin() * amplitude
        + (now * frequency * 2.7).sin() * amplitude * 0.3;
    state.tank_rotation = normalize_angle(state.tank_rotation + oscillation);

    let variation = 1.0 + (now * frequency * 2.0).cos() * 0.1;
    state.velocity = speed * variation * (1.0 + bias * 0.4);
}

fn move_in_patrol(agent: &mut NpcAgent, state: &mut TankState, now: f64, rng: &mut impl Rng) {
    let speed = agent.cruise_speed();
    let iq = agent.personality.tactical_iq;
    let dist = state.position.distance_from_origin();
    let bias = center_bias(dist, 1_500.0, 2_000.0, 0.8);

    if agent.patrol_points.is_empty() {
        state.velocity = speed * (1.0 + (now * 0.5).sin() * 0.1);
        if bias > 0.0 && rng.gen::<f64>() < bias {
            let toward = center_angle(&state.position);
            state.tank_rotation += turn_toward(state.tank_rotation, toward, 0.02);
        } else {
            state.tank_rotation += (now * 0.3).sin() * 0.005;
        }
        state.tank_rotation = normalize_angle(state.tank_rotation);
        return;
    }

    if bias > 0.0 && rng.gen::<f64>() < bias * 0.3 {
        // Detour toward a point 40% of the way home
        let heading = center_angle(&state.position);
        let turn = turn_toward(state.tank_rotation, heading, 0.03);
        state.tank_rotation = normalize_angle(state.tank_rotation + turn + wobble(rng, 0.001));
        state.velocity = speed * (1.0 + bias * 0.6);
        return;
    }

    let waypoint = agent.patrol_points[agent.current_point % agent.patrol_points.len()];
    let dx = waypoint.x - state.position.x;
    let dz = waypoint.z - state.position.z;
    let waypoint_dist = (dx * dx + dz * dz).sqrt();

    let arrival = 5.0 + (1.0 - iq) * 5.0;
    if waypoint_dist < arrival {
        agent.current_point = (agent.current_point + 1) % agent.patrol_points.len();
    }

    let diff = normalize_angle(dz.atan2(dx) - state.tank_rotation);
    let rotation_speed = 0.01 * (0.3 + diff.abs() * 2.0).min(1.0) * (0.8 + iq * 0.4);
    let turn = diff.abs().min(rotation_speed).copysign(diff);
    state.tank_rotation = normalize_angle(state.tank_rotation + turn + wobble(rng, 0.001));

    // Slow into sharp turns and near the waypoint
    let turn_factor = 1.0 - (diff.abs() / FRAC_PI_4).min(1.0) * 0.4;
    let approach = if waypoint_dist < 50.0 {
        0.6 + waypoint_dist / 50.0 * 0.4
    } else {
        1.0
    };
    let tactic = 0.7 + iq * 0.3;
    let oscillation = 1.0 + (now * 0.5).sin() * 0.05;

    state.velocity = speed
        * (turn_factor * tactic + (1.0 - tactic))
        * approach
        * oscillation
        * (1.0 + bias * 0.4);
}

fn move_randomly(agent: &mut NpcAgent, state: &mut TankState, now: f64, rng: &mut impl Rng) {
    let speed = agent.cruise_speed();
    let iq = agent.personality.tactical_iq;
    let dist = state.position.distance_from_origin();
    let bias = center_bias(dist, 500.0, 3_000.0, 0.9);

    let change_probability = 0.01 * (1.0 - iq * 0.5) * (0.8 + (now * 0.5).sin().abs() * 0.4);

    if rng.gen::<f64>() < change_probability || dist > MAP_BOUND * 0.8 {
        agent.target_rotation = if rng.gen::<f64>() < bias || dist > MAP_BOUND {
            Some(center_angle(&state.position))
        } else {
            let max_turn = FRAC_PI_8 * (1.0 - iq * 0.5 + 0.5);
            Some(normalize_angle(state.tank_rotation + (rng.gen::<f64>() - 0.5) * max_turn))
        };
    }

    match agent.target_rotation {
        Some(target) => {
            let diff = normalize_angle(target - state.tank_rotation);
            if diff.abs() > 0.01 {
                let turn_speed = 0.01 * (0.8 + iq * 0.4) * (1.0 + bias);
                let turn = turn_speed.min(diff.abs()).copysign(diff);
                state.tank_rotation =
                    normalize_angle(state.tank_rotation + turn + wobble(rng, 0.002));
            } else {
                state.tank_rotation = target;
                agent.target_rotation = None;
            }
        }
        None => {
            let drift = wobble(rng, 0.003 * (1.0 - iq * 0.7)) + (now * 0.3).sin() * 0.001;
            state.tank_rotation = normalize_angle(state.tank_rotation + drift);
        }
    }

    let variation = 1.0 + (now * 0.7).sin() * 0.1 * (1.0 - iq * 0.5);
    state.velocity = speed * variation * (1.0 + bias * 0.5);
}

/// Chase the current target while holding an IQ-dependent stand-off distance.
/// Returns false (and clears the target) when the target is gone.
pub fn pursue_target(
    agent: &mut NpcAgent,
    state: &mut TankState,
    snapshot: &WorldSnapshot,
    rng: &mut impl Rng,
) -> bool {
    let Some(target) = agent
        .target_id
        .as_deref()
        .and_then(|id| snapshot.players.get(id))
        .filter(|t| !t.is_destroyed)
    else {
        agent.target_id = None;
        return false;
    };

    let iq = agent.personality.tactical_iq;
    let dx = target.position.x - state.position.x;
    let dz = target.position.z - state.position.z;
    let distance = (dx * dx + dz * dz).sqrt();
    let ideal = 100.0 + iq * 50.0;
    let target_angle = dz.atan2(dx);

    if distance < ideal * 0.7 && iq > 0.4 {
        // Too close: keep facing the target and back off
        state.tank_rotation = target_angle;
        agent.moving_backward = true;
    } else if distance > ideal * 1.3 {
        state.tank_rotation = target_angle;
        agent.moving_backward = false;
    } else if iq > 0.7 {
        // Flank for a side shot
        let offset = if rng.gen_bool(0.5) { FRAC_PI_3 } else { -FRAC_PI_3 };
        state.tank_rotation = normalize_angle(target_angle + offset);
        agent.moving_backward = false;
    } else {
        state.tank_rotation = target_angle;
        if rng.gen::<f64>() < 0.03 {
            agent.moving_backward = !agent.moving_backward;
        }
    }

    let base = agent.cruise_speed();
    let speed = if distance < ideal * 0.5 {
        base * 1.2
    } else if (distance - ideal).abs() < 20.0 {
        base * 0.6
    } else {
        base
    };
    state.velocity = if agent.moving_backward { -speed } else { speed };
    state.is_moving = true;

    // Stop-and-shoot
    if iq > 0.8 && rng.gen::<f64>() < 0.017 {
        state.is_moving = false;
        state.velocity = 0.0;
    }

    advance(state);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::npc::personality::Personality;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::time::{Duration, Instant};

    fn agent(
        pattern: MovementPattern,
        tactical_iq: f64,
        spawn: Position,
        rng: &mut ChaCha8Rng,
    ) -> NpcAgent {
        let personality = Personality {
            accuracy: 0.5,
            move_speed: 0.2,
            aggressiveness: 0.5,
            fire_rate: 0.5,
            tactical_iq,
            fire_cooldown: Duration::from_secs(2),
        };
        NpcAgent::new(
            "bot_1".into(),
            "Swift Hawk".into(),
            spawn,
            pattern,
            personality,
            Instant::now(),
            rng,
        )
    }

    #[test]
    fn test_normalize_angle_range() {
        for raw in [-20.0, -PI - 0.1, -1.0, 0.0, 1.0, PI + 0.1, 7.0, 50.0] {
            let a = normalize_angle(raw);
            assert!((-PI..=PI).contains(&a), "{} -> {}", raw, a);
            assert!(((raw - a) / TAU - ((raw - a) / TAU).round()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_turn_toward_is_bounded() {
        assert_eq!(turn_toward(0.0, 1.0, 0.1), 0.1);
        assert_eq!(turn_toward(0.0, -1.0, 0.1), -0.1);
        assert!((turn_toward(0.0, 0.05, 0.1) - 0.05).abs() < 1e-12);
        // Wraps the short way round
        assert!(turn_toward(3.0, -3.0, 0.1) > 0.0);
    }

    #[test]
    fn test_every_pattern_moves_the_tank() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        for pattern in MovementPattern::ALL {
            let mut npc = agent(pattern, 0.5, Position::new(100.0, 0.0, 100.0), &mut rng);
            let mut state = npc.state.clone();
            let start = state.position;
            for tick in 0..20 {
                follow_pattern(&mut npc, &mut state, tick as f64 * 0.1, &mut rng);
            }
            assert!(state.is_moving);
            assert!(state.position.horizontal_distance(&start) > 1.0, "{:?} stayed put", pattern);
            assert!((-PI..=PI).contains(&state.tank_rotation));
        }
    }

    #[test]
    fn test_far_random_walker_turns_home() {
        let mut rng = ChaCha8Rng::seed_from_u64(22);
        let spawn = Position::new(2_500.0, 0.0, 0.0);
        let mut npc = agent(MovementPattern::Random, 0.5, spawn, &mut rng);
        let mut state = npc.state.clone();
        state.tank_rotation = 0.0; // facing straight out

        for tick in 0..2_000 {
            follow_pattern(&mut npc, &mut state, tick as f64 * 0.1, &mut rng);
        }
        assert!(state.position.distance_from_origin() < spawn.distance_from_origin());
    }

    #[test]
    fn test_pursuit_closes_distance() {
        let mut rng = ChaCha8Rng::seed_from_u64(23);
        let mut npc = agent(MovementPattern::Circle, 0.5, Position::ORIGIN, &mut rng);
        let mut snapshot = WorldSnapshot::default();
        snapshot.players.insert(
            "p1".into(),
            TankState::new("p1", "p1", Position::new(400.0, 0.0, 0.0)),
        );
        npc.target_id = Some("p1".into());

        let mut state = npc.state.clone();
        assert!(pursue_target(&mut npc, &mut state, &snapshot, &mut rng));
        assert!(!npc.moving_backward);
        assert!(state.position.x > 0.0);
        assert!(state.velocity > 0.0);
    }

    #[test]
    fn test_smart_tank_backs_off_when_too_close() {
        let mut rng = ChaCha8Rng::seed_from_u64(24);
        let mut npc = agent(MovementPattern::Circle, 0.6, Position::ORIGIN, &mut rng);
        let mut snapshot = WorldSnapshot::default();
        snapshot.players.insert(
            "p1".into(),
            TankState::new("p1", "p1", Position::new(30.0, 0.0, 0.0)),
        );
        npc.target_id = Some("p1".into());

        let mut state = npc.state.clone();
        pursue_target(&mut npc, &mut state, &snapshot, &mut rng);
        assert!(npc.moving_backward);
        assert!(state.velocity < 0.0);
        assert!(state.position.x < 0.0);
    }

    #[test]
    fn test_pursuit_drops_missing_target() {
        let mut rng = ChaCha8Rng::seed_from_u64(25);
        let mut npc = agent(MovementPattern::Circle, 0.5, Position::ORIGIN, &mut rng);
        npc.target_id = Some("gone".into());
        let mut state = npc.state.clone();
        assert!(!pursue_target(&mut npc, &mut state, &WorldSnapshot::default(), &mut rng));
        assert!(npc.target_id.is_none());
        assert_eq!(state.position, Position::ORIGIN);
    }
}
