//! Physics: ballistics, collision, hit zoning and line of sight
//!
//! The engine sits behind [`PhysicsEngine`] and is injected where needed.
//! NPCs only get the narrower [`LineOfSight`] view.

pub mod ballistics;
pub mod collision;
pub mod driver;
pub mod geometric;
pub mod obstacles;

pub use ballistics::{BallisticParams, ShellPhysics, ShellStep};
pub use collision::{Collider, ColliderKind, TankContact};
pub use driver::PhysicsDriver;
pub use geometric::GeometricPhysics;
pub use obstacles::{Obstacle, ObstacleKind, ObstacleMap};

use super::types::{HitData, Position, ShellState, TankState};

/// Height a shell is moved to once it hit a tank
pub const HIT_SENTINEL_Y: f64 = -1.0;
/// Height a shell is moved to once it hit the ground or expired
pub const GROUND_SENTINEL_Y: f64 = 0.0;

/// Visibility queries against static obstacles
pub trait LineOfSight: Send + Sync {
    /// True when no obstacle blocks the segment `from -> to`
    fn check_line_of_sight(&self, from: &Position, to: &Position) -> bool;
}

/// Physics backend contract
pub trait PhysicsEngine: LineOfSight {
    /// Add or refresh a tank body
    fn register_tank(&self, tank: &TankState);

    fn unregister_tank(&self, tank_id: &str);

    /// Ids of registered tank bodies
    fn registered_tanks(&self) -> Vec<String>;

    /// Advance every shell one step and run shell/tank collisions.
    ///
    /// Shells that stop flying get their height set to a sentinel
    /// (`HIT_SENTINEL_Y` or `GROUND_SENTINEL_Y`) so the caller can remove them.
    fn update_shells(&self, shells: &mut [ShellState]);

    /// Tank/tank contact pass
    fn update(&self) -> Vec<TankContact>;

    /// Obstacles a tank currently touches
    fn environment_contacts(&self, tank: &TankState) -> Vec<Collider>;

    /// Drain hits accumulated since the last call
    fn take_hits(&self) -> Vec<HitData>;
}
