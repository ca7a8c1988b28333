//! Shell flight model and hit zoning

use crate::game::combat::{CombatSystem, HitLocation};
use crate::game::types::{Position, ShellState, TankState};

use super::collision::{spheres_overlap, SHELL_RADIUS, TANK_RADIUS};

/// Ballistic constants, applied once per physics step
#[derive(Debug, Clone, Copy)]
pub struct BallisticParams {
    pub gravity: f64,
    pub air_resistance: f64,
    /// Shells older than this stop flying
    pub max_lifetime_ms: u64,
    pub wind_x: f64,
    pub wind_z: f64,
}

impl Default for BallisticParams {
    fn default() -> Self {
        Self {
            gravity: 0.005,
            air_resistance: 0.001,
            max_lifetime_ms: 20_000,
            wind_x: 0.0005,
            wind_z: 0.0005,
        }
    }
}

/// Result of advancing a shell one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellStep {
    InFlight,
    GroundImpact,
    Expired,
}

/// A confirmed shell/tank hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneHit {
    pub location: HitLocation,
    pub damage: i32,
}

/// Shell physics: gravity, drag, wind and zoned hits
#[derive(Debug, Clone, Default)]
pub struct ShellPhysics {
    params: BallisticParams,
}

impl ShellPhysics {
    pub fn new(params: BallisticParams) -> Self {
        Self { params }
    }

    /// Advance `shell` by one step at `now_ms`
    pub fn step(&self, shell: &mut ShellState, now_ms: u64) -> ShellStep {
        if now_ms.saturating_sub(shell.timestamp) > self.params.max_lifetime_ms {
            return ShellStep::Expired;
        }

        let dir_len = shell.direction.length();
        if dir_len == 0.0 || !dir_len.is_finite() {
            return ShellStep::Expired;
        }

        let mut vx = shell.direction.x / dir_len * shell.speed;
        let mut vy = shell.direction.y / dir_len * shell.speed;
        let mut vz = shell.direction.z / dir_len * shell.speed;

        let speed = (vx * vx + vy * vy + vz * vz).sqrt();
        vy -= self.params.gravity * (1.0 + speed * 0.01);

        // Quadratic drag against the direction of travel
        let speed = (vx * vx + vy * vy + vz * vz).sqrt();
        if speed > 0.0 {
            let drag = self.params.air_resistance * speed * speed;
            vx -= vx / speed * drag;
            vy -= vy / speed * drag;
            vz -= vz / speed * drag;
        }

        vx += self.params.wind_x;
        vz += self.params.wind_z;

        shell.position.x += vx;
        shell.position.y += vy;
        shell.position.z += vz;

        let speed = (vx * vx + vy * vy + vz * vz).sqrt();
        if speed > 0.0 {
            shell.direction = Position::new(vx / speed, vy / speed, vz / speed);
        }
        shell.speed = speed;

        if shell.position.y <= 0.0 {
            shell.position.y = 0.0;
            return ShellStep::GroundImpact;
        }
        ShellStep::InFlight
    }

    /// Zoned hit test of a shell against one tank
    pub fn detailed_collision(&self, shell: &ShellState, tank: &TankState) -> Option<ZoneHit> {
        if !spheres_overlap(&shell.position, SHELL_RADIUS, &tank.position, TANK_RADIUS) {
            return None;
        }
        let location = HitLocation::from_height(shell.position.y - tank.position.y);
        Some(ZoneHit {
            location,
            damage: CombatSystem::zone_damage(location),
        })
    }
}
