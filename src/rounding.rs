use crate::config::RobotConfig;

/// Float error from the decimal scaling can land `3.1 * 10` a hair above 31;
/// nudge below the ceiling so already-rounded values stay fixed.
const SCALE_EPSILON: f64 = 1e-9;

fn float_round(num: f64, places: i32, direction: fn(f64) -> f64) -> f64 {
    let scale = 10f64.powi(places);
    direction(num * scale - SCALE_EPSILON) / scale
}

fn ceil_dir(x: f64) -> f64 {
    x.ceil()
}

fn nearest_dir(x: f64) -> f64 {
    // The epsilon nudge is for ceiling; undo it before rounding to nearest.
    (x + SCALE_EPSILON).round()
}

/// Round one volume to pipette resolution: one decimal place below the p300
/// threshold, whole microliters at or above it.
///
/// Rounding goes up, because a volume rounded down would ask a later step for
/// a concentration the stocks can no longer reach. The one exception is a
/// ceiling that lands exactly on the full well volume, which would leave no
/// room for anything else; that value is rounded to nearest instead.
pub fn round_volume(volume: f64, well_volume: f64, config: &RobotConfig) -> f64 {
    let places = if volume < config.pip_volume_threshold {
        1
    } else {
        0
    };
    let rounded = float_round(volume, places, ceil_dir);
    if rounded == well_volume {
        float_round(volume, places, nearest_dir)
    } else {
        rounded
    }
}

/// Round a whole solved-volume vector. Each element stands alone; the vector
/// is not renormalized, so the rounded sum may drift a unit or two from the
/// well volume.
pub fn round_volumes(volumes: &[f64], well_volume: f64, config: &RobotConfig) -> Vec<f64> {
    volumes
        .iter()
        .map(|&v| round_volume(v, well_volume, config))
        .collect()
}
