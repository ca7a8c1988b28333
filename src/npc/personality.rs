//! NPC personalities and names

use std::f64::consts::PI;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;

/// Shortest allowed fire cooldown for any NPC
pub const MIN_FIRE_COOLDOWN: Duration = Duration::from_millis(1_500);
/// Upper bound on the move-speed trait
pub const MAX_MOVE_SPEED: f64 = 0.25;

const ADJECTIVES: [&str; 24] = [
    "Sneaky", "Rusty", "Furious", "Clever", "Angry", "Brave", "Cunning", "Drunken", "Silent",
    "Swift", "Calm", "Mighty", "Savage", "Stealth", "Chaotic", "Precise", "Nimble", "Tactical",
    "Hulking", "Deadly", "Raging", "Fearless", "Relentless", "Vengeful",
];

const NOUNS: [&str; 24] = [
    "Tiger", "Dragon", "Hawk", "Fox", "Panther", "Wolf", "Eagle", "Lion", "Viper", "Shark",
    "Hunter", "Cobra", "Rhino", "Bear", "Falcon", "Scorpion", "Mantis", "Jaguar", "Sentinel",
    "Stalker", "Crusher", "Phantom", "Assassin", "Guardian",
];

/// Behavioural traits, each in [0, 1] except the cooldown
#[derive(Debug, Clone, PartialEq)]
pub struct Personality {
    pub accuracy: f64,
    pub move_speed: f64,
    pub aggressiveness: f64,
    pub fire_rate: f64,
    pub tactical_iq: f64,
    pub fire_cooldown: Duration,
}

impl Personality {
    /// Draw a personality around `difficulty` (0 easy, 1 hard)
    pub fn randomized<R: Rng + ?Sized>(difficulty: f64, rng: &mut R) -> Self {
        let d = difficulty.clamp(0.0, 1.0);

        let accuracy = random_normal(rng, 0.3 + d * 0.4, 0.2);
        let move_speed = random_normal(rng, 0.2, 0.05).min(MAX_MOVE_SPEED);
        let aggressiveness = random_normal(rng, 0.3 + d * 0.4, 0.25);
        let fire_rate = random_normal(rng, 0.3 + d * 0.5, 0.2);
        let tactical_iq = random_normal(rng, 0.2 + d * 0.6, 0.2);

        // 5 s at the lowest fire rate down to 1.5 s at the highest, with jitter
        let cooldown_secs = 5.0 - fire_rate * 3.5 + (rng.gen::<f64>() - 0.5);
        let fire_cooldown = Duration::from_secs_f64(cooldown_secs).max(MIN_FIRE_COOLDOWN);

        Self {
            accuracy,
            move_speed,
            aggressiveness,
            fire_rate,
            tactical_iq,
            fire_cooldown,
        }
    }

    /// How strongly the NPC holds a grudge against its last attacker
    pub fn grudge_factor(&self) -> f64 {
        self.aggressiveness * 0.7 + self.tactical_iq * 0.3
    }

    /// Sensor radius; aggressive tanks look further
    pub fn scan_radius(&self) -> f64 {
        500.0 + self.aggressiveness * 250.0
    }
}

/// Box-Muller normal draw clamped to [0, 1]
pub fn random_normal<R: Rng + ?Sized>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    let u1 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2 = rng.gen::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
    (mean + z * std_dev).clamp(0.0, 1.0)
}

/// "Adjective Animal" style display name
pub fn generate_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("Rusty");
    let noun = NOUNS.choose(rng).copied().unwrap_or("Tank");
    format!("{} {}", adjective, noun)
}
