//! Physics integration task: feeds world snapshots through the engine and
//! reports hits back to the world manager

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::manager::WorldManager;
use crate::game::snapshot::{next_snapshot, SnapshotStream, WorldSnapshot};
use crate::game::types::Position;
use crate::util::time::{Timer, PHYSICS_TICK};
use crate::util::Shutdown;

use super::PhysicsEngine;

/// Movement below this is treated as standing still
const MOVEMENT_THRESHOLD: f64 = 0.01;

/// Outcome of one physics step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    pub hits: usize,
    pub rejected_hits: usize,
    pub removed_shells: usize,
    pub tank_contacts: usize,
}

enum DriverEvent {
    Shutdown,
    Snapshot(Option<WorldSnapshot>),
    Tick,
}

/// Drives a [`PhysicsEngine`] from the shared world
pub struct PhysicsDriver {
    engine: Arc<dyn PhysicsEngine>,
    manager: Arc<WorldManager>,
    previous_positions: HashMap<String, Position>,
}

impl PhysicsDriver {
    pub fn new(engine: Arc<dyn PhysicsEngine>, manager: Arc<WorldManager>) -> Self {
        Self {
            engine,
            manager,
            previous_positions: HashMap::new(),
        }
    }

    /// Run until shutdown. Watch notifications trigger environment checks;
    /// the fixed tick steps shells even when no notifications arrive.
    pub async fn run(mut self, mut shutdown: Shutdown) {
        info!("Physics driver started");

        let mut updates: Option<SnapshotStream> = match self.manager.watch_state().await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(error = %e, "State watch unavailable, physics runs on its tick only");
                None
            }
        };

        let mut ticker = interval(PHYSICS_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let event = tokio::select! {
                _ = shutdown.wait() => DriverEvent::Shutdown,
                snapshot = next_snapshot(&mut updates) => DriverEvent::Snapshot(snapshot),
                _ = ticker.tick() => DriverEvent::Tick,
            };

            match event {
                DriverEvent::Shutdown => break,
                DriverEvent::Snapshot(Some(snapshot)) => {
                    self.observe(&snapshot);
                }
                DriverEvent::Snapshot(None) => {
                    warn!("State watch closed, physics continues on its tick");
                    updates = None;
                }
                DriverEvent::Tick => {
                    self.step().await;
                }
            }
        }

        info!("Physics driver stopped");
    }

    /// Sync tank bodies and run environment checks for tanks that moved.
    /// Returns the number of obstacle contacts found.
    pub fn observe(&mut self, snapshot: &WorldSnapshot) -> usize {
        self.sync_bodies(snapshot);

        let mut contacts = 0;
        for tank in snapshot.players.values().filter(|t| !t.is_destroyed) {
            let moved = self
                .previous_positions
                .get(&tank.id)
                .map(|prev| prev.distance(&tank.position) > MOVEMENT_THRESHOLD)
                .unwrap_or(true);

            if moved {
                for obstacle in self.engine.environment_contacts(tank) {
                    debug!(
                        tank_id = %tank.id,
                        obstacle = %obstacle.id,
                        kind = ?obstacle.kind,
                        "Tank touching obstacle"
                    );
                    contacts += 1;
                }
            }
            self.previous_positions.insert(tank.id.clone(), tank.position);
        }

        self.previous_positions
            .retain(|id, _| snapshot.players.contains_key(id));
        contacts
    }

    /// One physics step over the current world
    pub async fn step(&mut self) -> StepReport {
        let timer = Timer::new();
        let snapshot = self.manager.state();
        self.sync_bodies(&snapshot);

        let mut report = StepReport::default();

        let mut shells = snapshot.shells;
        if !shells.is_empty() {
            self.engine.update_shells(&mut shells);
        }

        // Engine lock is released before any manager call
        for hit in self.engine.take_hits() {
            report.hits += 1;
            let target_id = hit.target_id.clone();
            if let Err(e) = self.manager.process_tank_hit(hit).await {
                report.rejected_hits += 1;
                warn!(target_id = %target_id, error = %e, "Hit not applied");
            }
        }

        let finished: Vec<String> = shells
            .iter()
            .filter(|s| s.position.y <= 0.0)
            .map(|s| s.id.clone())
            .collect();
        if !finished.is_empty() {
            report.removed_shells = finished.len();
            if let Err(e) = self.manager.remove_shells(&finished).await {
                warn!(count = finished.len(), error = %e, "Failed to remove finished shells");
            }
        }

        report.tank_contacts = self.engine.update().len();

        if timer.elapsed_ms() > PHYSICS_TICK.as_millis() as u64 {
            warn!(elapsed_ms = timer.elapsed_ms(), "Physics step overran its tick");
        }
        report
    }

    fn sync_bodies(&self, snapshot: &WorldSnapshot) {
        let registered: HashSet<String> = self.engine.registered_tanks().into_iter().collect();

        for tank in snapshot.players.values() {
            if tank.is_destroyed {
                if registered.contains(&tank.id) {
                    self.engine.unregister_tank(&tank.id);
                }
            } else {
                self.engine.register_tank(tank);
            }
        }

        for id in registered {
            if !snapshot.players.contains_key(&id) {
                self.engine.unregister_tank(&id);
            }
        }
    }
}
