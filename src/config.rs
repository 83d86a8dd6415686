use serde::{Deserialize, Serialize};

/// Physical limits of the liquid handler and its plates.
///
/// All volumes are in microliters. The defaults match the Biomek deck this
/// engine was written for; override fields for a different robot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    /// Smallest volume the pipette can dispense reliably.
    pub min_volume: f64,
    /// Maximum fill volume of a single well.
    pub max_volume: f64,
    /// Largest volume a single aspirate-and-dispense can move.
    pub max_transfer: f64,
    /// Volume at the bottom of every well that the pipette can never reach.
    pub dead_volume: f64,
    /// Multiplier on `min_volume` when judging whether a donor well has
    /// enough spare volume to be diluted from.
    pub safety_factor: f64,
    /// Volume drawn from a diluted intermediate into a destination well.
    pub ideal_transfer_volume: f64,
    /// Below this volume transfers are rounded to one decimal place,
    /// at or above it to whole microliters (p300 territory).
    pub pip_volume_threshold: f64,
    /// Wells per mixing plate; allocation beyond this is a fatal error.
    pub mixing_plate_capacity: u32,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            min_volume: 5.0,
            max_volume: 1200.0,
            max_transfer: 180.0,
            dead_volume: 50.0,
            safety_factor: 2.0,
            ideal_transfer_volume: 8.0,
            pip_volume_threshold: 50.0,
            mixing_plate_capacity: 96,
        }
    }
}

/// Role assignment of the plates on the deck, by plate identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateNames {
    pub source: String,
    pub water: String,
    pub mixing: String,
    pub destination: String,
}

impl Default for PlateNames {
    fn default() -> Self {
        Self {
            source: "src_plate".to_string(),
            water: "water_plate".to_string(),
            mixing: "mixing_plate".to_string(),
            destination: "dest_plate".to_string(),
        }
    }
}
