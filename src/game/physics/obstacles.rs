//! Static obstacles consumed from a map file

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::game::types::Position;

/// Obstacle category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObstacleKind {
    Tree,
    Rock,
}

/// One static obstacle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub kind: ObstacleKind,
    pub position: Position,
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Explicit collision radius; derived from the scale when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
}

fn default_scale() -> f64 {
    1.0
}

impl Obstacle {
    pub fn collision_radius(&self) -> f64 {
        self.radius.unwrap_or(match self.kind {
            ObstacleKind::Tree => self.scale,
            ObstacleKind::Rock => self.scale * 1.2,
        })
    }
}

/// All obstacles of an arena
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObstacleMap {
    #[serde(default)]
    pub obstacles: Vec<Obstacle>,
}

impl ObstacleMap {
    pub fn new(obstacles: Vec<Obstacle>) -> Self {
        Self { obstacles }
    }

    pub fn from_json(json: &str) -> Result<Self, ObstacleMapError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a map file written as `{"obstacles": [...]}`
    pub fn load(path: &Path) -> Result<Self, ObstacleMapError> {
        let contents = std::fs::read_to_string(path)?;
        let map = Self::from_json(&contents)?;
        info!(
            path = %path.display(),
            trees = map.count(ObstacleKind::Tree),
            rocks = map.count(ObstacleKind::Rock),
            "Loaded obstacle map"
        );
        Ok(map)
    }

    pub fn count(&self, kind: ObstacleKind) -> usize {
        self.obstacles.iter().filter(|o| o.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }
}

/// Obstacle map loading errors
#[derive(Debug, thiserror::Error)]
pub enum ObstacleMapError {
    #[error("Failed to read obstacle map: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid obstacle map: {0}")]
    Parse(#[from] serde_json::Error),
}
