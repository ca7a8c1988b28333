//! Sphere colliders and overlap tests

use super::obstacles::{Obstacle, ObstacleKind};
use crate::game::types::{Position, ShellState, TankState};

/// Tank radius used for shell hits
pub const TANK_RADIUS: f64 = 20.0;
/// Shell radius used for tank hits
pub const SHELL_RADIUS: f64 = 20.0;
/// Tank radius used for tank/tank contact
pub const TANK_CONTACT_RADIUS: f64 = 5.0;
/// Tank radius used against trees and rocks
pub const TANK_ENVIRONMENT_RADIUS: f64 = 2.5;

/// What a collider represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColliderKind {
    Tank,
    Shell,
    Tree,
    Rock,
}

impl From<ObstacleKind> for ColliderKind {
    fn from(kind: ObstacleKind) -> Self {
        match kind {
            ObstacleKind::Tree => Self::Tree,
            ObstacleKind::Rock => Self::Rock,
        }
    }
}

/// A sphere in world space
#[derive(Debug, Clone, PartialEq)]
pub struct Collider {
    pub id: String,
    pub kind: ColliderKind,
    pub position: Position,
    pub radius: f64,
}

impl Collider {
    pub fn tank(tank: &TankState) -> Self {
        Self {
            id: tank.id.clone(),
            kind: ColliderKind::Tank,
            position: tank.position,
            radius: TANK_RADIUS,
        }
    }

    pub fn shell(shell: &ShellState) -> Self {
        Self {
            id: shell.id.clone(),
            kind: ColliderKind::Shell,
            position: shell.position,
            radius: SHELL_RADIUS,
        }
    }

    pub fn obstacle(index: usize, obstacle: &Obstacle) -> Self {
        let kind = ColliderKind::from(obstacle.kind);
        Self {
            id: format!("{:?}_{}", kind, index).to_lowercase(),
            kind,
            position: obstacle.position,
            radius: obstacle.collision_radius(),
        }
    }

    /// Whether a point lies strictly inside this sphere
    pub fn contains(&self, point: &Position) -> bool {
        self.position.distance_squared(point) < self.radius * self.radius
    }
}

/// Two tanks touching each other
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TankContact {
    pub first: String,
    pub second: String,
}

/// Sphere/sphere overlap
pub fn spheres_overlap(p1: &Position, r1: f64, p2: &Position, r2: f64) -> bool {
    let combined_radius = r1 + r2;
    p1.distance_squared(p2) < combined_radius * combined_radius
}

/// Check collision between two colliders
pub fn check_collision(a: &Collider, b: &Collider) -> bool {
    spheres_overlap(&a.position, a.radius, &b.position, b.radius)
}
