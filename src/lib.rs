//! Tank Arena core - authoritative simulation for a multiplayer tank arena
//!
//! - `game`: world state, combat rules and physics
//! - `npc`: computer-controlled tanks
//! - `store`: key-value backends the world is persisted to
//! - `app`: wiring of the background tasks

pub mod app;
pub mod config;
pub mod game;
pub mod npc;
pub mod store;
pub mod util;
