//! NPC controller: owns the agents and turns world snapshots into manager calls

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::manager::{random_spawn, GameError, WorldManager};
use crate::game::physics::LineOfSight;
use crate::game::snapshot::{next_snapshot, SnapshotStream, WorldSnapshot};
use crate::game::types::{ShellData, TankState, NPC_ID_PREFIX};
use crate::util::time::{
    unix_millis, unix_nanos, unix_secs_f64, NPC_FALLBACK_TICK, NPC_MIN_UPDATE_INTERVAL,
};
use crate::util::Shutdown;

use super::agent::{MovementPattern, NpcAgent, Reconciled};
use super::aiming::aim_and_fire;
use super::movement::{follow_pattern, pursue_target};
use super::personality::{generate_name, Personality};
use super::targeting::find_target;

/// Difficulty used when none is given
pub const DEFAULT_DIFFICULTY: f64 = 0.5;
/// Agents standing still this long are pushed back into motion
const STATIONARY_LIMIT: Duration = Duration::from_secs(3);
const DESTROYED_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Manager call produced by a tick, applied once the agent lock is released
#[derive(Debug, Clone, PartialEq)]
pub enum NpcCommand {
    /// Agent missing from the world; register it again
    Register {
        id: String,
        name: String,
        state: TankState,
    },
    /// Publish the agent's updated mirror
    Publish {
        id: String,
        name: String,
        state: TankState,
    },
    Fire {
        id: String,
        shell: ShellData,
    },
}

enum ControllerEvent {
    Shutdown,
    Snapshot(Option<WorldSnapshot>),
    Tick,
}

/// Drives every computer-controlled tank
pub struct NpcController {
    manager: Arc<WorldManager>,
    los: Arc<dyn LineOfSight>,
    agents: Mutex<HashMap<String, NpcAgent>>,
}

impl NpcController {
    pub fn new(manager: Arc<WorldManager>, los: Arc<dyn LineOfSight>) -> Arc<Self> {
        Arc::new(Self {
            manager,
            los,
            agents: Mutex::new(HashMap::new()),
        })
    }

    /// Spawn an NPC with a generated name at the default difficulty
    pub async fn spawn_npc(&self, pattern: MovementPattern) -> Result<String, GameError> {
        let name = generate_name(&mut rand::thread_rng());
        self.spawn_custom_npc(&name, pattern, DEFAULT_DIFFICULTY).await
    }

    /// Spawn an NPC and register it with the world. Returns the new id.
    pub async fn spawn_custom_npc(
        &self,
        name: &str,
        pattern: MovementPattern,
        difficulty: f64,
    ) -> Result<String, GameError> {
        let (id, state) = self.create_agent(name, pattern, difficulty);

        if let Err(e) = self.manager.update_player(state, &id, name).await {
            // The world may still hold the record; the next tick re-registers if not
            warn!(npc_id = %id, error = %e, "Failed to register NPC");
            return Err(e);
        }

        // A new record gets a server-chosen spawn point
        if let Some(server) = self.manager.player(&id) {
            if let Some(agent) = self.agents.lock().get_mut(&id) {
                agent.state.position = server.position;
            }
        }
        Ok(id)
    }

    fn create_agent(
        &self,
        name: &str,
        pattern: MovementPattern,
        difficulty: f64,
    ) -> (String, TankState) {
        let mut rng = rand::thread_rng();
        let personality = Personality::randomized(difficulty, &mut rng);
        let spawn = random_spawn(&mut rng);

        let mut agents = self.agents.lock();
        let id = unique_npc_id(&agents);
        let agent = NpcAgent::new(
            id.clone(),
            name.to_string(),
            spawn,
            pattern,
            personality,
            Instant::now(),
            &mut rng,
        );

        info!(
            npc_id = %id,
            name = %name,
            pattern = ?pattern,
            accuracy = agent.personality.accuracy,
            aggressiveness = agent.personality.aggressiveness,
            tactical_iq = agent.personality.tactical_iq,
            fire_cooldown_ms = agent.personality.fire_cooldown.as_millis() as u64,
            "NPC spawned"
        );

        let state = agent.state.clone();
        agents.insert(id.clone(), agent);
        (id, state)
    }

    /// Stop controlling an NPC and remove its tank
    pub async fn remove_npc(&self, id: &str) -> Result<(), GameError> {
        if self.agents.lock().remove(id).is_none() {
            return Err(GameError::NotFound(id.to_string()));
        }
        info!(npc_id = %id, "NPC removed");

        match self.manager.remove_player(id).await {
            Err(GameError::NotFound(_)) => Ok(()),
            other => other,
        }
    }

    pub async fn remove_all_npcs(&self) {
        let ids: Vec<String> = self.agents.lock().drain().map(|(id, _)| id).collect();
        for id in ids {
            match self.manager.remove_player(&id).await {
                Ok(()) | Err(GameError::NotFound(_)) => {}
                Err(e) => warn!(npc_id = %id, error = %e, "Failed to remove NPC tank"),
            }
        }
        info!("All NPCs removed");
    }

    /// Ids of the agents currently driven
    pub fn active_npcs(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .agents
            .lock()
            .values()
            .filter(|a| a.active)
            .map(|a| a.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn agent(&self, id: &str) -> Option<NpcAgent> {
        self.agents.lock().get(id).cloned()
    }

    /// Advance every agent against `snapshot`. Nothing is sent to the world here.
    pub fn tick(&self, snapshot: &WorldSnapshot) -> Vec<NpcCommand> {
        let mut rng = rand::thread_rng();
        let now = Instant::now();
        let now_secs = unix_secs_f64();

        let mut agents = self.agents.lock();
        let mut commands = Vec::with_capacity(agents.len() * 2);
        for agent in agents.values_mut().filter(|a| a.active) {
            think(agent, snapshot, self.los.as_ref(), now, now_secs, &mut rng, &mut commands);
        }
        commands
    }

    /// Send tick output to the world
    pub async fn apply(&self, commands: Vec<NpcCommand>) {
        for command in commands {
            match command {
                NpcCommand::Register { id, name, state } => {
                    info!(npc_id = %id, "NPC missing from world, re-registering");
                    if let Err(e) = self.manager.update_player(state, &id, &name).await {
                        warn!(npc_id = %id, error = %e, "Failed to re-register NPC");
                    }
                }
                NpcCommand::Publish { id, name, state } => {
                    if let Err(e) = self.manager.update_player(state, &id, &name).await {
                        warn!(npc_id = %id, error = %e, "Failed to publish NPC state");
                    }
                }
                NpcCommand::Fire { id, shell } => match self.manager.fire_shell(shell, &id).await {
                    Ok(fired) => {
                        if let Some(agent) = self.agents.lock().get_mut(&id) {
                            agent.last_fire = Instant::now();
                        }
                        debug!(npc_id = %id, shell_id = %fired.id, "NPC shell fired");
                    }
                    Err(e) => debug!(npc_id = %id, error = %e, "NPC shot rejected"),
                },
            }
        }
    }

    /// Run until shutdown. World notifications drive ticks, throttled to
    /// `NPC_MIN_UPDATE_INTERVAL`; the fallback ticker covers quiet periods.
    pub async fn run(self: Arc<Self>, mut shutdown: Shutdown) {
        info!(npcs = self.agents.lock().len(), "NPC controller started");

        let mut updates: Option<SnapshotStream> = match self.manager.watch_state().await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(error = %e, "State watch unavailable, NPCs run on the fallback tick");
                None
            }
        };

        let mut fallback = interval(NPC_FALLBACK_TICK);
        fallback.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick: Option<Instant> = None;

        loop {
            let event = tokio::select! {
                _ = shutdown.wait() => ControllerEvent::Shutdown,
                snapshot = next_snapshot(&mut updates) => ControllerEvent::Snapshot(snapshot),
                _ = fallback.tick() => ControllerEvent::Tick,
            };

            let snapshot = match event {
                ControllerEvent::Shutdown => break,
                ControllerEvent::Snapshot(None) => {
                    warn!("State watch closed, NPCs continue on the fallback tick");
                    updates = None;
                    continue;
                }
                ControllerEvent::Snapshot(Some(snapshot)) => {
                    let throttled = last_tick
                        .map(|t| t.elapsed() < NPC_MIN_UPDATE_INTERVAL)
                        .unwrap_or(false);
                    if throttled {
                        continue;
                    }
                    snapshot
                }
                ControllerEvent::Tick => self.manager.state(),
            };

            last_tick = Some(Instant::now());
            let commands = self.tick(&snapshot);
            self.apply(commands).await;
        }

        info!("NPC controller stopped");
    }
}

/// One agent's full tick: reconcile, sense, decide, aim, publish
pub fn think(
    agent: &mut NpcAgent,
    snapshot: &WorldSnapshot,
    los: &dyn LineOfSight,
    now: Instant,
    now_secs: f64,
    rng: &mut impl Rng,
    commands: &mut Vec<NpcCommand>,
) {
    match agent.reconcile(snapshot.players.get(&agent.id), &snapshot.shells, now, rng) {
        Reconciled::Missing => {
            commands.push(NpcCommand::Register {
                id: agent.id.clone(),
                name: agent.name.clone(),
                state: agent.state.clone(),
            });
            return;
        }
        Reconciled::Destroyed => {
            agent.stationary_since = None;
            if now.saturating_duration_since(agent.last_update) > DESTROYED_LOG_INTERVAL {
                debug!(npc_id = %agent.id, "NPC destroyed, waiting for respawn");
                agent.last_update = now;
            }
            return;
        }
        Reconciled::Respawned => {
            info!(
                npc_id = %agent.id,
                x = agent.state.position.x,
                z = agent.state.position.z,
                "NPC respawned"
            );
        }
        Reconciled::Alive => {}
    }

    unstick(agent, now, rng);

    let mut state = agent.state.clone();

    find_target(agent, snapshot, los, now);
    let pursue = agent.target_id.is_some() && {
        let likelihood = agent.pursuit_likelihood(now);
        likelihood > 0.6 && (agent.personality.tactical_iq < 0.7 || rng.gen::<f64>() < likelihood)
    };
    if !(pursue && pursue_target(agent, &mut state, snapshot, rng)) {
        follow_pattern(agent, &mut state, now_secs, rng);
    }

    if let Some(shell) = aim_and_fire(agent, &mut state, snapshot, los, now, now_secs, rng) {
        commands.push(NpcCommand::Fire {
            id: agent.id.clone(),
            shell,
        });
    }

    state.timestamp = unix_millis();
    agent.state = state;
    agent.last_update = now;

    commands.push(NpcCommand::Publish {
        id: agent.id.clone(),
        name: agent.name.clone(),
        state: agent.state.clone(),
    });
}

/// Push an NPC that has stood still past `STATIONARY_LIMIT` back into motion.
/// Returns true when it had to.
fn unstick(agent: &mut NpcAgent, now: Instant, rng: &mut impl Rng) -> bool {
    if agent.state.is_moving {
        agent.stationary_since = None;
        return false;
    }
    let since = *agent.stationary_since.get_or_insert(now);
    if now.saturating_duration_since(since) <= STATIONARY_LIMIT {
        return false;
    }

    debug!(npc_id = %agent.id, "NPC stationary too long, forcing movement");
    agent.stationary_since = None;
    agent.state.is_moving = true;
    agent.state.velocity = agent.cruise_speed() * rng.gen_range(0.5..1.0);
    agent.state.tank_rotation = rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI);
    true
}

/// `bot_<nanos>`, bumped until unused
fn unique_npc_id(agents: &HashMap<String, NpcAgent>) -> String {
    let mut nanos = unix_nanos();
    loop {
        let id = format!("{}{}", NPC_ID_PREFIX, nanos);
        if !agents.contains_key(&id) {
            return id;
        }
        nanos += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::types::{PlayerStatus, Position};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    struct ClearSky;
    impl LineOfSight for ClearSky {
        fn check_line_of_sight(&self, _: &Position, _: &Position) -> bool {
            true
        }
    }

    fn agent(rng: &mut ChaCha8Rng, now: Instant) -> NpcAgent {
        let personality = Personality::randomized(0.5, rng);
        NpcAgent::new(
            "bot_7".into(),
            "Silent Otter".into(),
            Position::new(50.0, 0.0, 50.0),
            MovementPattern::Zigzag,
            personality,
            now,
            rng,
        )
    }

    #[test]
    fn test_missing_agent_asks_to_register() {
        let mut rng = ChaCha8Rng::seed_from_u64(41);
        let now = Instant::now();
        let mut npc = agent(&mut rng, now);
        let mut commands = Vec::new();

        think(&mut npc, &WorldSnapshot::default(), &ClearSky, now, 0.0, &mut rng, &mut commands);

        assert_eq!(commands.len(), 1);
        assert!(matches!(&commands[0], NpcCommand::Register { id, .. } if id == "bot_7"));
    }

    #[test]
    fn test_alive_agent_moves_and_publishes() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let now = Instant::now();
        let mut npc = agent(&mut rng, now);
        let mut snapshot = WorldSnapshot::default();
        snapshot.players.insert(npc.id.clone(), npc.state.clone());
        let start = npc.state.position;
        let mut commands = Vec::new();

        think(&mut npc, &snapshot, &ClearSky, now, 1.0, &mut rng, &mut commands);

        let published = commands
            .iter()
            .find_map(|c| match c {
                NpcCommand::Publish { state, .. } => Some(state.clone()),
                _ => None,
            })
            .expect("publish command");
        assert_ne!(published.position, start);
        assert!(published.timestamp > 0);
        assert_eq!(npc.state, published);
    }

    #[test]
    fn test_destroyed_agent_idles() {
        let mut rng = ChaCha8Rng::seed_from_u64(43);
        let now = Instant::now();
        let mut npc = agent(&mut rng, now);
        let mut server = npc.state.clone();
        server.health = 0;
        server.is_destroyed = true;
        server.status = PlayerStatus::Destroyed;
        let mut snapshot = WorldSnapshot::default();
        snapshot.players.insert(npc.id.clone(), server);
        let mut commands = Vec::new();

        think(&mut npc, &snapshot, &ClearSky, now, 0.0, &mut rng, &mut commands);

        assert!(commands.is_empty());
        assert_eq!(npc.state.velocity, 0.0);
    }

    #[test]
    fn test_stationary_agent_is_pushed_after_limit() {
        let mut rng = ChaCha8Rng::seed_from_u64(45);
        let now = Instant::now();
        let mut npc = agent(&mut rng, now);
        npc.state.is_moving = false;
        npc.state.velocity = 0.0;

        // Ticks keep coming; the clock runs from the first still tick
        assert!(!unstick(&mut npc, now, &mut rng));
        assert_eq!(npc.stationary_since, Some(now));
        assert!(!unstick(&mut npc, now + Duration::from_millis(100), &mut rng));
        assert!(!unstick(&mut npc, now + Duration::from_secs(2), &mut rng));
        assert_eq!(npc.stationary_since, Some(now));

        assert!(unstick(&mut npc, now + Duration::from_millis(3_100), &mut rng));
        assert!(npc.state.is_moving);
        assert!(npc.stationary_since.is_none());
    }

    #[test]
    fn test_moving_agent_clears_stationary_clock() {
        let mut rng = ChaCha8Rng::seed_from_u64(46);
        let now = Instant::now();
        let mut npc = agent(&mut rng, now);
        npc.stationary_since = Some(now);
        npc.state.is_moving = true;

        assert!(!unstick(&mut npc, now + Duration::from_secs(10), &mut rng));
        assert!(npc.stationary_since.is_none());
    }

    #[test]
    fn test_npc_ids_are_unique() {
        let mut agents = HashMap::new();
        let mut rng = ChaCha8Rng::seed_from_u64(44);
        let now = Instant::now();
        for _ in 0..50 {
            let id = unique_npc_id(&agents);
            assert!(id.starts_with(NPC_ID_PREFIX));
            let mut npc = agent(&mut rng, now);
            npc.id = id.clone();
            assert!(agents.insert(id, npc).is_none());
        }
    }
}
