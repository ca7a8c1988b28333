//! Application state: the shared components and the tasks that drive them

use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{Config, StoreBackend};
use crate::game::manager::{ManagerConfig, WorldManager};
use crate::game::physics::{
    BallisticParams, GeometricPhysics, LineOfSight, ObstacleKind, ObstacleMap, PhysicsDriver,
    PhysicsEngine, ShellPhysics,
};
use crate::npc::personality::generate_name;
use crate::npc::{MovementPattern, NpcController};
use crate::store::{MemoryStore, NatsKvStore, StateStore, SNAPSHOT_KEY};
use crate::util::Shutdown;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn StateStore>,
    pub manager: Arc<WorldManager>,
    pub physics: Arc<dyn PhysicsEngine>,
    pub npcs: Arc<NpcController>,
}

impl AppState {
    /// Connect the store, prepare the world and build physics and NPC control
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let store: Arc<dyn StateStore> = match &config.store_backend {
            StoreBackend::Memory => {
                info!("Using in-memory state store");
                Arc::new(MemoryStore::new())
            }
            StoreBackend::Nats { url, bucket } => {
                let kv = NatsKvStore::connect(url, bucket)
                    .await
                    .with_context(|| format!("connecting to state store at {}", url))?;
                info!(url = %url, bucket = %kv.bucket_name(), "Using JetStream KV state store");
                Arc::new(kv)
            }
        };

        Self::with_store(config, store).await
    }

    /// Build on an existing store
    pub async fn with_store(
        config: Arc<Config>,
        store: Arc<dyn StateStore>,
    ) -> anyhow::Result<Self> {
        let manager = WorldManager::new(
            store.clone(),
            ManagerConfig {
                fire_cooldown: config.fire_cooldown,
                respawn_delay: config.respawn_delay,
                snapshot_key: SNAPSHOT_KEY.to_string(),
            },
        );

        if config.restore_state {
            manager.load().await.context("restoring world state")?;
        } else {
            manager.initialize().await.context("publishing initial world state")?;
        }

        let obstacles = match &config.obstacle_map_path {
            Some(path) => ObstacleMap::load(path)
                .with_context(|| format!("loading obstacle map {}", path.display()))?,
            None => ObstacleMap::default(),
        };
        info!(
            trees = obstacles.count(ObstacleKind::Tree),
            rocks = obstacles.count(ObstacleKind::Rock),
            "Obstacle map ready"
        );

        let geometric = Arc::new(GeometricPhysics::new(
            &obstacles,
            ShellPhysics::new(BallisticParams::default()),
        ));
        let physics: Arc<dyn PhysicsEngine> = geometric.clone();
        let los: Arc<dyn LineOfSight> = geometric;

        let npcs = NpcController::new(manager.clone(), los);

        Ok(Self {
            config,
            store,
            manager,
            physics,
            npcs,
        })
    }

    /// Spawn the configured number of NPCs with random patterns
    pub async fn spawn_npcs(&self) -> usize {
        let mut spawned = 0;
        for _ in 0..self.config.num_npcs {
            let (name, pattern) = {
                let mut rng = rand::thread_rng();
                (
                    generate_name(&mut rng),
                    MovementPattern::random(&mut rng),
                )
            };
            match self
                .npcs
                .spawn_custom_npc(&name, pattern, self.config.npc_difficulty)
                .await
            {
                Ok(_) => spawned += 1,
                Err(e) => warn!(name = %name, error = %e, "Failed to spawn NPC"),
            }
        }
        info!(spawned, requested = self.config.num_npcs, "NPCs spawned");
        spawned
    }

    /// Start cleanup, physics and NPC tasks
    pub fn spawn_tasks(&self, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
        let driver = PhysicsDriver::new(self.physics.clone(), self.manager.clone());

        vec![
            tokio::spawn(self.manager.clone().run_cleanup(shutdown.clone())),
            tokio::spawn(driver.run(shutdown.clone())),
            tokio::spawn(self.npcs.clone().run(shutdown.clone())),
        ]
    }
}
