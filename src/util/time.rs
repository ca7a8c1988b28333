//! Time utilities for the simulation loops

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Get current Unix timestamp in nanoseconds
pub fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos()
}

/// Current Unix time in fractional seconds, used for oscillating movement
pub fn unix_secs_f64() -> f64 {
    unix_millis() as f64 / 1000.0
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Physics tick (10 ticks per second)
pub const PHYSICS_TICK: Duration = Duration::from_millis(100);
/// Manager cleanup cadence
pub const CLEANUP_INTERVAL: Duration = Duration::from_millis(250);
/// Fallback NPC tick when no state notifications arrive
pub const NPC_FALLBACK_TICK: Duration = Duration::from_secs(1);
/// Minimum spacing between notification-driven NPC ticks
pub const NPC_MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// A simple timer for measuring durations
#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn elapsed_micros(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    pub fn reset(&mut self) {
        self.start = Instant::now();
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
