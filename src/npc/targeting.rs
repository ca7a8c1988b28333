//! Target selection

use std::time::Instant;

use crate::game::physics::LineOfSight;
use crate::game::snapshot::WorldSnapshot;
use crate::game::types::{Position, TankState};

use super::agent::NpcAgent;

/// Turret height used as the eye point for visibility checks
pub const TURRET_HEIGHT: f64 = 1.2;

/// Score one candidate; higher is better
pub fn target_score(
    agent: &NpcAgent,
    candidate: &TankState,
    distance: f64,
    can_see: bool,
    now: Instant,
) -> f64 {
    let p = &agent.personality;
    let proximity = 1.0 - distance / p.scan_radius();

    let grudge = agent
        .grudge_against(&candidate.id, now)
        .map(|recency| 2.0 * recency * p.grudge_factor())
        .unwrap_or(0.0);

    let weakness = if p.tactical_iq > 0.5 {
        (100 - candidate.health) as f64 / 100.0 * p.tactical_iq * 0.5
    } else {
        0.0
    };

    let visibility = if can_see {
        1.0
    } else {
        0.2 + 0.3 * (1.0 - p.tactical_iq)
    };

    let mut score = (proximity + weakness + grudge) * visibility;
    if p.tactical_iq > 0.4 && agent.target_id.as_deref() == Some(candidate.id.as_str()) {
        score *= 1.2;
    }
    score
}

/// Pick the best human target within the sensor radius and store it on the agent
pub fn find_target(
    agent: &mut NpcAgent,
    snapshot: &WorldSnapshot,
    los: &dyn LineOfSight,
    now: Instant,
) -> Option<String> {
    let origin = agent.state.position;
    let eye = Position::new(origin.x, origin.y + TURRET_HEIGHT, origin.z);
    let radius = agent.personality.scan_radius();

    let best = snapshot
        .players
        .values()
        .filter(|t| t.id != agent.id && !t.is_npc() && !t.is_destroyed)
        .filter_map(|t| {
            let distance = origin.horizontal_distance(&t.position);
            (distance < radius).then(|| {
                let can_see = los.check_line_of_sight(&eye, &t.position);
                (t.id.clone(), target_score(agent, t, distance, can_see, now))
            })
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(id, _)| id);

    agent.target_id = best.clone();
    best
}
