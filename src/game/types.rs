//! Wire types for the shared world snapshot
//! Field names are camelCase on the wire; the snapshot shape is a stable contract.

use serde::{Deserialize, Serialize};

use super::combat::{HitLocation, MAX_HEALTH};

/// Id prefix reserved for computer-controlled tanks
pub const NPC_ID_PREFIX: &str = "bot_";

/// A point in world space (y is up)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const ORIGIN: Position = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_squared(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    pub fn distance(&self, other: &Position) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Distance on the ground plane, ignoring height
    pub fn horizontal_distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }

    /// Ground-plane distance from the world origin
    pub fn distance_from_origin(&self) -> f64 {
        (self.x * self.x + self.z * self.z).sqrt()
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Lifecycle status of a tank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerStatus {
    /// Joined but not yet driving
    Ready,
    /// Alive and playing
    Active,
    /// Health reached zero, awaiting respawn
    Destroyed,
    /// Left the arena
    #[serde(rename = "DISCONNECT")]
    Disconnected,
}

impl Default for PlayerStatus {
    fn default() -> Self {
        Self::Ready
    }
}

/// Authoritative record of one tank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TankState {
    pub id: String,
    pub name: String,
    pub position: Position,
    pub tank_rotation: f64,
    pub turret_rotation: f64,
    pub barrel_elevation: f64,
    /// Signed speed along the hull heading
    pub velocity: f64,
    pub is_moving: bool,
    pub track_rotation: f64,
    pub health: i32,
    pub is_destroyed: bool,
    pub status: PlayerStatus,
    pub kills: u32,
    pub deaths: u32,
    /// Last update, unix millis
    pub timestamp: u64,
    pub color: String,
    /// Id of the tank behind the most recent hit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_hit_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_killed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_death_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<String>,
}

impl Default for TankState {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            position: Position::ORIGIN,
            tank_rotation: 0.0,
            turret_rotation: 0.0,
            barrel_elevation: 0.0,
            velocity: 0.0,
            is_moving: false,
            track_rotation: 0.0,
            health: MAX_HEALTH,
            is_destroyed: false,
            status: PlayerStatus::Ready,
            kills: 0,
            deaths: 0,
            timestamp: 0,
            color: String::new(),
            last_hit_by: None,
            last_killed_by: None,
            last_death_time: None,
            notification: None,
        }
    }
}

impl TankState {
    pub fn new(id: impl Into<String>, name: impl Into<String>, position: Position) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position,
            ..Default::default()
        }
    }

    /// Whether the tank belongs to an NPC
    pub fn is_npc(&self) -> bool {
        is_npc_id(&self.id)
    }
}

/// Whether an id carries the NPC prefix
pub fn is_npc_id(id: &str) -> bool {
    id.starts_with(NPC_ID_PREFIX)
}

/// A shell in flight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellState {
    pub id: String,
    /// Owner tank id
    pub player_id: String,
    pub position: Position,
    pub direction: Position,
    pub speed: f64,
    /// Fire time, unix millis
    pub timestamp: u64,
}

/// Fire request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellData {
    pub position: Position,
    pub direction: Position,
    pub speed: f64,
}

/// Damage event reported by physics (or a trusted caller)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitData {
    pub target_id: String,
    pub source_id: String,
    pub damage_amount: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_location: Option<HitLocation>,
    #[serde(default)]
    pub timestamp: u64,
}

/// Respawn request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespawnData {
    pub player_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}
