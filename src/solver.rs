use crate::error::MediaError;
use nalgebra::{DMatrix, DVector};

/// Slack on the volume-sum postcondition, absorbing float error accumulated
/// across the solve.
const VOLUME_SUM_TOLERANCE: f64 = 0.1;

/// Volumes below this magnitude are treated as exact zeros after solving.
const NEGATIVE_CLAMP: f64 = -1e-9;

/// Result of a single volume solve: one reagent volume per component, in the
/// stock/target component order, plus the water volume that tops the well up.
#[derive(Debug, Clone, PartialEq)]
pub struct SolvedVolumes {
    pub reagents: Vec<f64>,
    pub water: f64,
}

impl SolvedVolumes {
    /// All volumes in pipetting order, water last.
    pub fn all(&self) -> Vec<f64> {
        let mut ret = self.reagents.clone();
        ret.push(self.water);
        ret
    }

    pub fn total(&self) -> f64 {
        self.reagents.iter().sum::<f64>() + self.water
    }
}

/// Find pipetting volumes for the given target concentrations.
///
/// Solves the (N+1)-square linear system where each component row demands
/// `v_i * stock_i = target_i * well_volume` after dilution across the final
/// well, and the last row demands that reagent volumes, water and the culture
/// inoculum together fill the well exactly. `culture_ratio` is
/// well volume / culture volume (100 means 1% inoculum).
pub fn solve_volumes(
    well_volume: f64,
    culture_ratio: f64,
    stock_conc: &[f64],
    target_conc: &[f64],
) -> Result<SolvedVolumes, MediaError> {
    if stock_conc.len() != target_conc.len() || stock_conc.is_empty() {
        return Err(MediaError::InfeasibleInput(format!(
            "stock ({}) and target ({}) concentration vectors must be non-empty and equal length",
            stock_conc.len(),
            target_conc.len()
        )));
    }
    if !(well_volume > 0.0) {
        return Err(MediaError::InfeasibleInput(format!(
            "well volume must be positive, got {well_volume}"
        )));
    }
    if !(culture_ratio > 1.0) {
        return Err(MediaError::InfeasibleInput(format!(
            "culture ratio must exceed 1, got {culture_ratio}"
        )));
    }
    let culture_volume = well_volume / culture_ratio;

    let mut ratios = Vec::with_capacity(stock_conc.len());
    for (i, (&stock, &target)) in stock_conc.iter().zip(target_conc.iter()).enumerate() {
        if stock < 0.0 || target < 0.0 {
            return Err(MediaError::InfeasibleInput(format!(
                "negative concentration for component {i}: stock {stock}, target {target}"
            )));
        }
        if target > stock {
            return Err(MediaError::InfeasibleInput(format!(
                "target concentration {target} exceeds stock concentration {stock} for component {i}"
            )));
        }
        // stock == 0 implies target == 0 here; that component needs no volume.
        ratios.push(if stock > 0.0 { target / stock } else { 0.0 });
    }
    let ratio_sum: f64 = ratios.iter().sum();
    if ratio_sum > 1.0 {
        return Err(MediaError::InfeasibleInput(format!(
            "requested targets cannot be reached with these stocks (volume fractions sum to {ratio_sum:.4} > 1)"
        )));
    }

    let n = stock_conc.len();
    let mut a = DMatrix::zeros(n + 1, n + 1);
    let mut b = DVector::zeros(n + 1);
    for i in 0..n {
        for j in 0..=n {
            a[(i, j)] = ratios[i];
        }
        a[(i, i)] -= 1.0;
        b[i] = ratios[i];
    }
    for j in 0..=n {
        a[(n, j)] = 1.0;
    }
    b[n] = 1.0 - well_volume / culture_volume;
    b *= -culture_volume;

    let volumes = a.lu().solve(&b).ok_or_else(|| {
        MediaError::NumericalInfeasibility(
            "volume system is singular for these concentrations".to_string(),
        )
    })?;

    let mut cleaned = Vec::with_capacity(n + 1);
    for (i, &v) in volumes.iter().enumerate() {
        if v < NEGATIVE_CLAMP {
            return Err(MediaError::NumericalInfeasibility(format!(
                "solved volume {v} for slot {i} is negative"
            )));
        }
        cleaned.push(v.max(0.0));
    }
    let sum: f64 = cleaned.iter().sum();
    if (sum + culture_volume - well_volume).abs() > VOLUME_SUM_TOLERANCE {
        return Err(MediaError::NumericalInfeasibility(format!(
            "solved volumes sum to {sum} uL, well volume is {well_volume} uL \
             (culture {culture_volume} uL)"
        )));
    }

    let water = cleaned.pop().unwrap_or(0.0);
    Ok(SolvedVolumes {
        reagents: cleaned,
        water,
    })
}
