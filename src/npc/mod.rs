//! Computer-controlled tanks

pub mod agent;
pub mod aiming;
pub mod controller;
pub mod movement;
pub mod personality;
pub mod targeting;

pub use agent::{MovementPattern, NpcAgent};
pub use controller::{NpcCommand, NpcController};
pub use personality::Personality;
