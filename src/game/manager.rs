//! Authoritative world state and the only write path into it
//!
//! Every mutation runs under the world lock, then a copy of the world is
//! persisted to the state store with no lock held. Readers get deep copies.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::RwLock;
use rand::Rng;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::store::{StateStore, StoreError, SNAPSHOT_KEY};
use crate::util::time::{unix_millis, CLEANUP_INTERVAL};
use crate::util::Shutdown;

use super::combat::{CombatSystem, MAX_HEALTH};
use super::snapshot::{SnapshotStream, WorldSnapshot};
use super::types::{
    is_npc_id, HitData, PlayerStatus, Position, RespawnData, ShellData, ShellState, TankState,
};

/// Maximum shells kept after a fire
pub const SHELL_CAP: usize = 100;
/// Shells kept after a cleanup pass
pub const CLEANUP_SHELL_LIMIT: usize = 50;
/// Shells older than this are purged by cleanup
pub const SHELL_LIFETIME_MS: u64 = 5_000;
/// Tanks without updates for longer than this are removed
pub const PLAYER_TIMEOUT_MS: u64 = 10_000;
/// Spawn points are drawn within this radius of the origin
pub const SPAWN_RADIUS: f64 = 1_000.0;

const PLAYER_COLORS: [&str; 6] = [
    "#4a7c59", "#f44336", "#2196f3", "#ff9800", "#9c27b0", "#ffeb3b",
];

/// Tunables for the world manager
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Minimum spacing between shots of one owner; zero disables the check
    pub fire_cooldown: Duration,
    /// Delay before a destroyed tank comes back
    pub respawn_delay: Duration,
    /// Store key holding the snapshot
    pub snapshot_key: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            fire_cooldown: Duration::from_millis(500),
            respawn_delay: Duration::from_secs(5),
            snapshot_key: SNAPSHOT_KEY.to_string(),
        }
    }
}

/// What a cleanup pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed_players: Vec<String>,
    pub repaired_players: usize,
    pub removed_shells: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.removed_players.is_empty() && self.repaired_players == 0 && self.removed_shells == 0
    }
}

#[derive(Default)]
struct WorldState {
    players: HashMap<String, TankState>,
    shells: Vec<ShellState>,
    next_shell_id: u64,
}

impl WorldState {
    fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            players: self.players.clone(),
            shells: self.shells.clone(),
        }
    }
}

enum HitOutcome {
    Ignored,
    Damaged,
    Destroyed { death_time: u64 },
}

/// Owner of the authoritative world
pub struct WorldManager {
    world: RwLock<WorldState>,
    last_fire: DashMap<String, u64>,
    store: Arc<dyn StateStore>,
    config: ManagerConfig,
    this: Weak<WorldManager>,
}

impl WorldManager {
    pub fn new(store: Arc<dyn StateStore>, config: ManagerConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            world: RwLock::new(WorldState::default()),
            last_fire: DashMap::new(),
            store,
            config,
            this: this.clone(),
        })
    }

    /// Persist the current (empty) world, replacing whatever the store held
    pub async fn initialize(&self) -> Result<(), GameError> {
        info!(key = %self.config.snapshot_key, "Publishing fresh world state");
        self.persist().await
    }

    /// Restore the world from the store. Returns false when nothing was stored.
    pub async fn load(&self) -> Result<bool, GameError> {
        let Some(bytes) = self.store.get(&self.config.snapshot_key).await? else {
            info!("No stored world state, starting empty");
            return Ok(false);
        };
        let snapshot = WorldSnapshot::from_slice(&bytes)?;

        let mut world = self.world.write();
        world.next_shell_id = snapshot
            .shells
            .iter()
            .filter_map(|s| s.id.strip_prefix("shell_")?.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        info!(
            players = snapshot.players.len(),
            shells = snapshot.shells.len(),
            "Restored world state"
        );
        world.players = snapshot.players;
        world.shells = snapshot.shells;
        Ok(true)
    }

    /// Deep copy of the world
    pub fn state(&self) -> WorldSnapshot {
        self.world.read().snapshot()
    }

    pub fn player(&self, id: &str) -> Option<TankState> {
        self.world.read().players.get(id).cloned()
    }

    pub fn player_count(&self) -> usize {
        self.world.read().players.len()
    }

    /// Create or update a tank from a client (or NPC) report.
    ///
    /// Combat fields are server-owned: on an existing tank health, destroyed,
    /// kills, deaths and kill info survive the update. A live tank that keeps
    /// reporting is ACTIVE unless it says it disconnected.
    pub async fn update_player(
        &self,
        update: TankState,
        player_id: &str,
        player_name: &str,
    ) -> Result<(), GameError> {
        if player_id.is_empty() {
            return Err(GameError::InvalidInput("player id is empty".into()));
        }
        validate_tank(&update)?;

        let now = unix_millis();
        {
            let mut world = self.world.write();
            let mut merged = update;
            merged.id = player_id.to_string();
            merged.name = if player_name.is_empty() {
                player_id.to_string()
            } else {
                player_name.to_string()
            };
            merged.color = player_color(player_id).to_string();
            merged.timestamp = now;

            match world.players.get(player_id) {
                Some(current) => {
                    merged.health = current.health;
                    merged.is_destroyed = current.is_destroyed;
                    merged.kills = current.kills;
                    merged.deaths = current.deaths;
                    merged.last_hit_by = current.last_hit_by.clone();
                    merged.last_killed_by = current.last_killed_by.clone();
                    merged.last_death_time = current.last_death_time;
                    merged.notification = current.notification.clone();
                    merged.status = if current.is_destroyed {
                        PlayerStatus::Destroyed
                    } else if merged.status == PlayerStatus::Disconnected {
                        PlayerStatus::Disconnected
                    } else {
                        PlayerStatus::Active
                    };
                }
                None => {
                    merged.position = random_spawn(&mut rand::thread_rng());
                    merged.health = MAX_HEALTH;
                    merged.is_destroyed = false;
                    merged.status = PlayerStatus::Ready;
                    merged.kills = 0;
                    merged.deaths = 0;
                    merged.last_hit_by = None;
                    merged.last_killed_by = None;
                    merged.last_death_time = None;
                    merged.notification = None;
                    info!(
                        player_id = %player_id,
                        name = %merged.name,
                        x = merged.position.x,
                        z = merged.position.z,
                        "Tank joined the arena"
                    );
                }
            }

            world.players.insert(player_id.to_string(), merged);
        }

        self.persist().await
    }

    /// Record a new shell for `owner_id`
    pub async fn fire_shell(
        &self,
        data: ShellData,
        owner_id: &str,
    ) -> Result<ShellState, GameError> {
        if owner_id.is_empty() {
            return Err(GameError::InvalidInput("shell owner is empty".into()));
        }
        validate_shell(&data)?;

        let now = unix_millis();
        self.check_fire_cooldown(owner_id, now)?;

        let shell = {
            let mut world = self.world.write();
            world.next_shell_id += 1;
            let shell = ShellState {
                id: format!("shell_{}", world.next_shell_id),
                player_id: owner_id.to_string(),
                position: data.position,
                direction: data.direction,
                speed: data.speed,
                timestamp: now,
            };
            world.shells.push(shell.clone());

            if world.shells.len() > SHELL_CAP {
                let excess = world.shells.len() - SHELL_CAP;
                world.shells.drain(..excess);
                trace!(dropped = excess, "Shell cap reached, dropped oldest shells");
            }
            shell
        };

        debug!(shell_id = %shell.id, owner = %owner_id, speed = shell.speed, "Shell fired");
        self.persist().await?;
        Ok(shell)
    }

    /// Apply a hit. Unknown targets get a placeholder record instead of an error.
    pub async fn process_tank_hit(&self, hit: HitData) -> Result<(), GameError> {
        if hit.target_id.is_empty() {
            return Err(GameError::InvalidInput("hit target is empty".into()));
        }
        if hit.damage_amount < 0 {
            return Err(GameError::InvalidInput(format!(
                "negative damage {}",
                hit.damage_amount
            )));
        }

        let now = unix_millis();
        let outcome = {
            let mut world = self.world.write();
            let source_name = world
                .players
                .get(&hit.source_id)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| hit.source_id.clone());

            let outcome = match world.players.get_mut(&hit.target_id) {
                Some(target) if target.is_destroyed => {
                    debug!(target_id = %hit.target_id, "Hit on destroyed tank ignored");
                    HitOutcome::Ignored
                }
                Some(target) => {
                    let damage = CombatSystem::cap_damage(hit.damage_amount);
                    let (health, dead) = CombatSystem::apply_damage(target.health, damage);
                    target.health = health;
                    target.last_hit_by = Some(hit.source_id.clone());
                    debug!(
                        target_id = %hit.target_id,
                        source_id = %hit.source_id,
                        damage,
                        health,
                        location = ?hit.hit_location,
                        "Tank hit"
                    );
                    if dead {
                        mark_destroyed(target, &source_name, now);
                        HitOutcome::Destroyed { death_time: now }
                    } else {
                        HitOutcome::Damaged
                    }
                }
                None => {
                    let name = if is_npc_id(&hit.target_id) {
                        "Mystery Bot"
                    } else {
                        "Unknown"
                    };
                    let mut placeholder = TankState::new(
                        hit.target_id.clone(),
                        name,
                        random_spawn(&mut rand::thread_rng()),
                    );
                    placeholder.color = player_color(&hit.target_id).to_string();
                    placeholder.timestamp = now;
                    let (health, dead) =
                        CombatSystem::apply_damage(MAX_HEALTH, hit.damage_amount);
                    placeholder.health = health;
                    placeholder.last_hit_by = Some(hit.source_id.clone());
                    warn!(
                        target_id = %hit.target_id,
                        health,
                        "Hit on unknown tank, created placeholder"
                    );

                    let outcome = if dead {
                        mark_destroyed(&mut placeholder, &source_name, now);
                        HitOutcome::Destroyed { death_time: now }
                    } else {
                        HitOutcome::Damaged
                    };
                    world.players.insert(hit.target_id.clone(), placeholder);
                    outcome
                }
            };

            if matches!(outcome, HitOutcome::Destroyed { .. }) {
                if let Some(source) = world.players.get_mut(&hit.source_id) {
                    if hit.source_id != hit.target_id {
                        source.kills += 1;
                    }
                }
                info!(
                    target_id = %hit.target_id,
                    source_id = %hit.source_id,
                    "Tank destroyed"
                );
            }
            outcome
        };

        match outcome {
            HitOutcome::Ignored => Ok(()),
            HitOutcome::Damaged => self.persist().await,
            HitOutcome::Destroyed { death_time } => {
                self.schedule_respawn(hit.target_id.clone(), death_time);
                self.persist().await
            }
        }
    }

    /// Bring a tank back to full health. Creates it if missing.
    pub async fn respawn_tank(&self, data: RespawnData) -> Result<(), GameError> {
        if data.player_id.is_empty() {
            return Err(GameError::InvalidInput("respawn player id is empty".into()));
        }
        if let Some(position) = &data.position {
            if !position.is_finite() {
                return Err(GameError::InvalidInput("respawn position is not finite".into()));
            }
        }

        let now = unix_millis();
        {
            let mut world = self.world.write();
            let position = data
                .position
                .unwrap_or_else(|| random_spawn(&mut rand::thread_rng()));
            let tank = world
                .players
                .entry(data.player_id.clone())
                .or_insert_with(|| {
                    TankState::new(data.player_id.clone(), data.player_id.clone(), position)
                });

            tank.position = position;
            tank.health = MAX_HEALTH;
            tank.is_destroyed = false;
            tank.status = PlayerStatus::Active;
            tank.last_hit_by = None;
            tank.velocity = 0.0;
            tank.is_moving = false;
            tank.turret_rotation = tank.tank_rotation;
            tank.color = player_color(&data.player_id).to_string();
            tank.timestamp = now;

            info!(
                player_id = %data.player_id,
                x = position.x,
                z = position.z,
                "Tank respawned"
            );
        }

        self.persist().await
    }

    /// Drop shells by id. Unknown ids are ignored.
    pub async fn remove_shells(&self, shell_ids: &[String]) -> Result<(), GameError> {
        if shell_ids.is_empty() {
            return Ok(());
        }

        let removed = {
            let mut world = self.world.write();
            let before = world.shells.len();
            world.shells.retain(|s| !shell_ids.contains(&s.id));
            before - world.shells.len()
        };

        if removed == 0 {
            return Ok(());
        }
        trace!(removed, "Shells removed");
        self.persist().await
    }

    /// Remove a tank on operator request
    pub async fn remove_player(&self, player_id: &str) -> Result<(), GameError> {
        if player_id.is_empty() {
            return Err(GameError::InvalidInput("player id is empty".into()));
        }

        let removed = self.world.write().players.remove(player_id);
        if removed.is_none() {
            return Err(GameError::NotFound(player_id.to_string()));
        }
        self.last_fire.remove(player_id);

        info!(player_id = %player_id, "Tank removed");
        self.persist().await
    }

    /// Snapshots persisted after this call, decoded
    pub async fn watch_state(&self) -> Result<SnapshotStream, GameError> {
        let entries = self.store.watch(&self.config.snapshot_key).await?;
        let snapshots = entries.filter_map(|entry| async move {
            match WorldSnapshot::from_slice(&entry.value) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!(revision = entry.revision, error = %e, "Skipping undecodable snapshot");
                    None
                }
            }
        });
        Ok(snapshots.boxed())
    }

    /// One cleanup pass at `now_ms`: expire idle tanks and old shells, repair
    /// inconsistent tanks and trim the shell list.
    pub fn sweep(&self, now_ms: u64) -> SweepReport {
        let mut report = SweepReport::default();
        let mut world = self.world.write();

        world.players.retain(|id, tank| {
            let idle = now_ms.saturating_sub(tank.timestamp) > PLAYER_TIMEOUT_MS;
            if idle {
                report.removed_players.push(id.clone());
            }
            !idle
        });

        for tank in world.players.values_mut() {
            if repair_tank(tank) {
                report.repaired_players += 1;
            }
        }

        let before = world.shells.len();
        world.shells.retain(|shell| {
            now_ms.saturating_sub(shell.timestamp) < SHELL_LIFETIME_MS && shell.position.y > 0.0
        });
        if world.shells.len() > CLEANUP_SHELL_LIMIT {
            let excess = world.shells.len() - CLEANUP_SHELL_LIMIT;
            world.shells.drain(..excess);
        }
        report.removed_shells = before - world.shells.len();
        drop(world);

        for id in &report.removed_players {
            self.last_fire.remove(id);
            info!(player_id = %id, "Removed inactive tank");
        }
        if report.repaired_players > 0 {
            warn!(count = report.repaired_players, "Repaired inconsistent tank states");
        }
        report
    }

    /// Periodic cleanup; re-persists every pass
    pub async fn run_cleanup(self: Arc<Self>, mut shutdown: Shutdown) {
        info!("World cleanup task started");

        let mut ticker = interval(CLEANUP_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    let report = self.sweep(unix_millis());
                    if !report.is_empty() {
                        let world = self.state();
                        debug!(
                            removed_players = report.removed_players.len(),
                            removed_shells = report.removed_shells,
                            players = world.players.len(),
                            alive = world.alive_count(),
                            shells = world.shells.len(),
                            "Cleanup pass"
                        );
                    }
                    // Errors are already logged by persist
                    let _ = self.persist().await;
                }
            }
        }

        info!("World cleanup task stopped");
    }

    fn check_fire_cooldown(&self, owner_id: &str, now: u64) -> Result<(), GameError> {
        let cooldown_ms = self.config.fire_cooldown.as_millis() as u64;
        if cooldown_ms == 0 {
            return Ok(());
        }

        match self.last_fire.entry(owner_id.to_string()) {
            Entry::Occupied(mut last) => {
                let elapsed = now.saturating_sub(*last.get());
                if elapsed < cooldown_ms {
                    return Err(GameError::FireCooldown {
                        remaining_ms: cooldown_ms - elapsed,
                    });
                }
                last.insert(now);
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
            }
        }
        Ok(())
    }

    fn schedule_respawn(&self, player_id: String, death_time: u64) {
        let Some(manager) = self.this.upgrade() else {
            return;
        };
        let delay = self.config.respawn_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Skip if the tank left, was already revived or died again since
            let still_dead = manager
                .player(&player_id)
                .map(|p| p.is_destroyed && p.last_death_time == Some(death_time))
                .unwrap_or(false);
            if !still_dead {
                return;
            }

            let request = RespawnData {
                player_id: player_id.clone(),
                position: None,
            };
            if let Err(e) = manager.respawn_tank(request).await {
                warn!(player_id = %player_id, error = %e, "Automatic respawn failed");
            }
        });
    }

    async fn persist(&self) -> Result<(), GameError> {
        let snapshot = self.state();
        let payload = snapshot.to_bytes()?;
        let size = payload.len();

        match self.store.put(&self.config.snapshot_key, payload).await {
            Ok(revision) => {
                trace!(
                    revision,
                    bytes = size,
                    players = snapshot.players.len(),
                    "World state persisted"
                );
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to persist world state");
                Err(e.into())
            }
        }
    }
}

/// Deterministic display color derived from a tank id
pub fn player_color(player_id: &str) -> &'static str {
    let sum: u32 = player_id.chars().map(|c| c as u32).sum();
    PLAYER_COLORS[(sum % PLAYER_COLORS.len() as u32) as usize]
}

/// Random ground position within `SPAWN_RADIUS` of the origin
pub fn random_spawn<R: Rng + ?Sized>(rng: &mut R) -> Position {
    let angle = rng.gen_range(0.0..std::f64::consts::TAU);
    let distance = rng.gen_range(0.0..SPAWN_RADIUS);
    Position::new(angle.cos() * distance, 0.0, angle.sin() * distance)
}

fn mark_destroyed(tank: &mut TankState, killer_name: &str, now: u64) {
    tank.health = 0;
    tank.is_destroyed = true;
    tank.status = PlayerStatus::Destroyed;
    tank.velocity = 0.0;
    tank.is_moving = false;
    tank.deaths += 1;
    tank.last_killed_by = Some(killer_name.to_string());
    tank.last_death_time = Some(now);
    tank.notification = Some(CombatSystem::kill_notification(killer_name, &tank.name));
}

/// Restore the destroyed/health invariant. Returns true when something changed.
fn repair_tank(tank: &mut TankState) -> bool {
    let mut changed = false;
    let clamped = tank.health.clamp(0, MAX_HEALTH);
    if clamped != tank.health {
        tank.health = clamped;
        changed = true;
    }
    if tank.is_destroyed && tank.health > 0 {
        tank.is_destroyed = false;
        if tank.status == PlayerStatus::Destroyed {
            tank.status = PlayerStatus::Active;
        }
        changed = true;
    } else if !tank.is_destroyed && tank.health == 0 {
        tank.is_destroyed = true;
        tank.status = PlayerStatus::Destroyed;
        changed = true;
    }
    changed
}

fn validate_tank(tank: &TankState) -> Result<(), GameError> {
    if !tank.position.is_finite() {
        return Err(GameError::InvalidInput("position is not finite".into()));
    }
    let scalars = [
        ("tankRotation", tank.tank_rotation),
        ("turretRotation", tank.turret_rotation),
        ("barrelElevation", tank.barrel_elevation),
        ("trackRotation", tank.track_rotation),
        ("velocity", tank.velocity),
    ];
    for (field, value) in scalars {
        if !value.is_finite() {
            return Err(GameError::InvalidInput(format!("{} is not finite", field)));
        }
    }
    Ok(())
}

fn validate_shell(data: &ShellData) -> Result<(), GameError> {
    if !data.position.is_finite() {
        return Err(GameError::InvalidInput("shell position is not finite".into()));
    }
    if !data.direction.is_finite() || data.direction.length() == 0.0 {
        return Err(GameError::InvalidInput("shell direction is degenerate".into()));
    }
    if !data.speed.is_finite() || data.speed < 0.0 {
        return Err(GameError::InvalidInput(format!("invalid shell speed {}", data.speed)));
    }
    Ok(())
}

/// World manager errors
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("Failed to persist world state: {0}")]
    Persistence(#[from] StoreError),

    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Fire cooldown active, {remaining_ms} ms remaining")]
    FireCooldown { remaining_ms: u64 },

    #[error("Tank not found: {0}")]
    NotFound(String),
}
