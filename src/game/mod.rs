//! Game simulation modules

pub mod combat;
pub mod manager;
pub mod physics;
pub mod snapshot;
pub mod types;

pub use manager::{GameError, ManagerConfig, WorldManager};
pub use snapshot::{SnapshotStream, WorldSnapshot};
pub use types::{
    HitData, PlayerStatus, Position, RespawnData, ShellData, ShellState, TankState, NPC_ID_PREFIX,
};
