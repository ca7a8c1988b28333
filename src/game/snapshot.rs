//! World snapshot encoding and the decoded watch stream

use std::collections::HashMap;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::types::{ShellState, TankState};

/// Full copy of the shared world
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    #[serde(default)]
    pub players: HashMap<String, TankState>,
    #[serde(default)]
    pub shells: Vec<ShellState>,
}

impl WorldSnapshot {
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn player(&self, id: &str) -> Option<&TankState> {
        self.players.get(id)
    }

    /// Count tanks that are not destroyed
    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| !p.is_destroyed).count()
    }
}

/// Decoded snapshot notifications
pub type SnapshotStream = BoxStream<'static, WorldSnapshot>;

/// Next notification, or never if the stream is gone.
/// Lets a `select!` loop fall back to its timers once a watch closes.
pub async fn next_snapshot(updates: &mut Option<SnapshotStream>) -> Option<WorldSnapshot> {
    match updates {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::types::Position;

    #[test]
    fn test_snapshot_wire_shape() {
        let mut snapshot = WorldSnapshot::default();
        snapshot.players.insert(
            "p1".to_string(),
            TankState::new("p1", "Alice", Position::ORIGIN),
        );
        snapshot.shells.push(ShellState {
            id: "shell_1".to_string(),
            player_id: "p1".to_string(),
            position: Position::new(0.0, 2.0, 0.0),
            direction: Position::new(0.0, 0.0, 1.0),
            speed: 5.0,
            timestamp: 1,
        });

        let json: serde_json::Value =
            serde_json::from_slice(&snapshot.to_bytes().unwrap()).unwrap();
        assert_eq!(json["players"]["p1"]["name"], "Alice");
        assert_eq!(json["shells"][0]["playerId"], "p1");
    }

    #[test]
    fn test_empty_object_decodes_to_empty_world() {
        let snapshot = WorldSnapshot::from_slice(b"{}").unwrap();
        assert!(snapshot.players.is_empty());
        assert!(snapshot.shells.is_empty());
    }

    #[test]
    fn test_alive_count_skips_destroyed() {
        let mut snapshot = WorldSnapshot::default();
        let mut wreck = TankState::new("p2", "Bob", Position::ORIGIN);
        wreck.health = 0;
        wreck.is_destroyed = true;
        snapshot.players.insert("p1".into(), TankState::new("p1", "Alice", Position::ORIGIN));
        snapshot.players.insert("p2".into(), wreck);
        assert_eq!(snapshot.alive_count(), 1);
    }
}
