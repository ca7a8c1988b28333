//! Combat rules: hit zones, damage and kill bookkeeping

use std::fmt;

use serde::{Deserialize, Serialize};

/// Full health of a tank
pub const MAX_HEALTH: i32 = 100;
/// Damage of an unmodified shell hit
pub const BASE_DAMAGE: i32 = 25;
/// Upper bound on damage applied by a single hit
pub const MAX_DAMAGE_PER_HIT: i32 = 50;
/// Shell height above tank centre that counts as a turret hit
pub const TURRET_HEIGHT: f64 = 12.0;
/// Shell height above tank centre below which the tracks are hit
pub const TRACKS_HEIGHT: f64 = 5.0;

/// Where a shell struck a tank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitLocation {
    Turret,
    Body,
    Tracks,
}

impl HitLocation {
    /// Classify a hit by the shell's height above the tank centre
    pub fn from_height(offset: f64) -> Self {
        if offset > TURRET_HEIGHT {
            Self::Turret
        } else if offset < TRACKS_HEIGHT {
            Self::Tracks
        } else {
            Self::Body
        }
    }

    pub fn damage_multiplier(self) -> f64 {
        match self {
            Self::Turret => 1.25,
            Self::Body => 1.0,
            Self::Tracks => 0.75,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Turret => "turret",
            Self::Body => "body",
            Self::Tracks => "tracks",
        }
    }
}

impl fmt::Display for HitLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combat system for damage resolution
pub struct CombatSystem;

impl CombatSystem {
    /// Damage dealt by a hit in the given zone
    pub fn zone_damage(location: HitLocation) -> i32 {
        (BASE_DAMAGE as f64 * location.damage_multiplier()).floor() as i32
    }

    /// Clamp a reported damage value to the per-hit cap
    pub fn cap_damage(damage: i32) -> i32 {
        damage.clamp(0, MAX_DAMAGE_PER_HIT)
    }

    /// Apply damage to health, returns (new_health, is_dead)
    pub fn apply_damage(current_health: i32, damage: i32) -> (i32, bool) {
        let new_health = current_health.saturating_sub(damage).clamp(0, MAX_HEALTH);
        (new_health, new_health == 0)
    }

    /// Kill feed line shown to clients
    pub fn kill_notification(killer: &str, victim: &str) -> String {
        format!("{} destroyed {}", killer, victim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_thresholds() {
        assert_eq!(HitLocation::from_height(12.5), HitLocation::Turret);
        assert_eq!(HitLocation::from_height(12.0), HitLocation::Body);
        assert_eq!(HitLocation::from_height(5.0), HitLocation::Body);
        assert_eq!(HitLocation::from_height(4.9), HitLocation::Tracks);
        assert_eq!(HitLocation::from_height(-3.0), HitLocation::Tracks);
    }

    #[test]
    fn test_zone_damage() {
        assert_eq!(CombatSystem::zone_damage(HitLocation::Turret), 31);
        assert_eq!(CombatSystem::zone_damage(HitLocation::Body), 25);
        assert_eq!(CombatSystem::zone_damage(HitLocation::Tracks), 18);
    }

    #[test]
    fn test_apply_damage_clamps_at_zero() {
        assert_eq!(CombatSystem::apply_damage(100, 25), (75, false));
        assert_eq!(CombatSystem::apply_damage(20, 25), (0, true));
        assert_eq!(CombatSystem::apply_damage(0, 0), (0, true));
    }

    #[test]
    fn test_cap_damage() {
        assert_eq!(CombatSystem::cap_damage(80), MAX_DAMAGE_PER_HIT);
        assert_eq!(CombatSystem::cap_damage(31), 31);
    }

    #[test]
    fn test_kill_notification() {
        assert_eq!(
            CombatSystem::kill_notification("Alice", "Bob"),
            "Alice destroyed Bob"
        );
    }
}
