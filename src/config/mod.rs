//! Configuration module - environment variable parsing

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::store::DEFAULT_BUCKET;

/// Hard limit on simultaneous NPCs
pub const MAX_NPCS: usize = 10;

/// Where the world snapshot is kept
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process store, lost on restart
    Memory,
    /// JetStream KV bucket
    Nats { url: String, bucket: String },
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub store_backend: StoreBackend,

    /// NPCs spawned at startup
    pub num_npcs: usize,
    /// 0 (easy) to 1 (hard)
    pub npc_difficulty: f64,

    /// Minimum time between two shots of one tank
    pub fire_cooldown: Duration,
    /// Delay before a destroyed tank comes back
    pub respawn_delay: Duration,

    /// Optional JSON file with trees and rocks
    pub obstacle_map_path: Option<PathBuf>,
    /// Resume from the stored snapshot instead of publishing a fresh world
    pub restore_state: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value if set
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_backend = match lookup("STATE_STORE").as_deref() {
            None | Some("memory") => StoreBackend::Memory,
            Some("nats") => StoreBackend::Nats {
                url: lookup("NATS_URL").ok_or(ConfigError::Missing("NATS_URL"))?,
                bucket: lookup("KV_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "STATE_STORE",
                    value: other.to_string(),
                })
            }
        };

        let num_npcs: usize = parse_or(&lookup, "NUM_NPCS", 10)?;
        let npc_difficulty: f64 = parse_or(&lookup, "NPC_DIFFICULTY", 0.5)?;
        if !(0.0..=1.0).contains(&npc_difficulty) {
            return Err(ConfigError::Invalid {
                var: "NPC_DIFFICULTY",
                value: npc_difficulty.to_string(),
            });
        }

        Ok(Self {
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            store_backend,
            num_npcs: num_npcs.min(MAX_NPCS),
            npc_difficulty,
            fire_cooldown: Duration::from_millis(parse_or(&lookup, "FIRE_COOLDOWN_MS", 500)?),
            respawn_delay: Duration::from_millis(parse_or(&lookup, "RESPAWN_DELAY_MS", 5_000)?),
            obstacle_map_path: lookup("OBSTACLE_MAP_PATH")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            restore_state: parse_or(&lookup, "RESTORE_STATE", false)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}
