use crate::config::RobotConfig;
use crate::deck::Component;
use crate::error::MediaError;
use crate::rounding;
use crate::solver::{self, SolvedVolumes};
use itertools::Itertools;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Tolerance when comparing a solved volume against the minimum tip volume.
const EPS: f64 = 1e-6;

/// A water volume above this counts as "adequate water" in the batch stats.
const ADEQUATE_WATER: f64 = 20.0;

/// Which stock concentration a component was planned against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockTier {
    High,
    Low,
}

/// High and low stock concentrations per component, component-aligned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockProfile {
    components: Vec<Component>,
    high: Vec<f64>,
    low: Vec<f64>,
}

impl StockProfile {
    pub fn new(
        components: Vec<Component>,
        high: Vec<f64>,
        low: Vec<f64>,
    ) -> Result<Self, MediaError> {
        if components.len() != high.len() || components.len() != low.len() {
            return Err(MediaError::InfeasibleInput(format!(
                "stock profile misaligned: {} components, {} high, {} low",
                components.len(),
                high.len(),
                low.len()
            )));
        }
        if !components.iter().all_unique() {
            return Err(MediaError::InfeasibleInput(
                "component names must be unique".to_string(),
            ));
        }
        for (i, (&h, &l)) in high.iter().zip(low.iter()).enumerate() {
            if !(h >= l && l >= 0.0) {
                return Err(MediaError::InfeasibleInput(format!(
                    "component {}: need high >= low >= 0, got high {h}, low {l}",
                    components[i]
                )));
            }
        }
        Ok(Self {
            components,
            high,
            low,
        })
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn high(&self) -> &[f64] {
        &self.high
    }

    pub fn low(&self) -> &[f64] {
        &self.low
    }

    /// Components whose high stock concentration exceeds the given solubility
    /// bound and would fall out of solution on the bench.
    pub fn insoluble_components(&self, solubility: f64) -> Vec<&Component> {
        self.components
            .iter()
            .zip(self.high.iter())
            .filter(|&(_, &h)| h > solubility)
            .map(|(c, _)| c)
            .collect()
    }

    fn concentrations_for(&self, tiers: &[StockTier]) -> Vec<f64> {
        tiers
            .iter()
            .enumerate()
            .map(|(i, tier)| match tier {
                StockTier::High => self.high[i],
                StockTier::Low => self.low[i],
            })
            .collect()
    }
}

/// Accepted plan for one target row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowPlan {
    /// Per-component pipetting volumes, rounded to pipette resolution.
    pub volumes: Vec<f64>,
    pub water: f64,
    /// Which stock tier each component volume was computed against.
    pub tiers: Vec<StockTier>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub rows: usize,
    pub succeeded: usize,
    pub succeeded_with_water: usize,
}

impl BatchStats {
    pub fn success_rate(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.rows as f64
        }
    }

    pub fn adequate_water_rate(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.succeeded_with_water as f64 / self.rows as f64
        }
    }
}

/// Result of planning a batch: one entry per input row, in input order.
/// `None` marks a row no stock tier could satisfy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPlan {
    pub rows: Vec<Option<RowPlan>>,
    pub stats: BatchStats,
}

/// Plans pipetting volumes for batches of target-concentration rows.
///
/// Each row is attempted against the high stocks first; components whose
/// volume comes out below the minimum tip volume are retried against their
/// low stock, and as a last resort the whole row is planned against the low
/// stocks. Rows where every tier fails are reported, not fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPlanner {
    pub stock: StockProfile,
    pub well_volume: f64,
    pub culture_ratio: f64,
    pub min_tip_volume: f64,
    pub rounding: Option<RobotConfig>,
}

impl BatchPlanner {
    pub fn new(stock: StockProfile, well_volume: f64, culture_ratio: f64) -> Self {
        Self {
            stock,
            well_volume,
            culture_ratio,
            min_tip_volume: 5.0,
            rounding: None,
        }
    }

    /// Round accepted volumes to pipette resolution with the given config.
    pub fn with_rounding(mut self, config: RobotConfig) -> Self {
        self.rounding = Some(config);
        self
    }

    /// Plan every row. Rows are independent, so they are solved in parallel;
    /// the output preserves input order.
    pub fn plan(&self, targets: &[Vec<f64>]) -> Result<BatchPlan, MediaError> {
        for (i, row) in targets.iter().enumerate() {
            if row.len() != self.stock.len() {
                return Err(MediaError::InfeasibleInput(format!(
                    "target row {i} has {} entries, stock profile has {}",
                    row.len(),
                    self.stock.len()
                )));
            }
        }

        let rows: Vec<Option<RowPlan>> = targets
            .par_iter()
            .map(|target| self.plan_row(target))
            .collect();

        let succeeded = rows.iter().flatten().count();
        let succeeded_with_water = rows
            .iter()
            .flatten()
            .filter(|p| p.water > ADEQUATE_WATER)
            .count();
        Ok(BatchPlan {
            stats: BatchStats {
                rows: targets.len(),
                succeeded,
                succeeded_with_water,
            },
            rows,
        })
    }

    fn plan_row(&self, target: &[f64]) -> Option<RowPlan> {
        let all_high = vec![StockTier::High; self.stock.len()];

        // Tier 1: everything from the concentrated stocks.
        if let Some(solved) = self.attempt(&all_high, target) {
            match self.undersized(&solved) {
                None => return Some(self.accept(solved, all_high)),
                Some(small) => {
                    // Tier 2: low stock for exactly the components that came
                    // out below the minimum tip volume.
                    let mixed: Vec<StockTier> = (0..self.stock.len())
                        .map(|i| {
                            if small.contains(&i) {
                                StockTier::Low
                            } else {
                                StockTier::High
                            }
                        })
                        .collect();
                    if let Some(solved) = self.attempt(&mixed, target) {
                        if self.undersized(&solved).is_none() {
                            return Some(self.accept(solved, mixed));
                        }
                    }
                }
            }
        }

        // Tier 3: everything from the dilute stocks.
        let all_low = vec![StockTier::Low; self.stock.len()];
        let solved = self.attempt(&all_low, target)?;
        if self.undersized(&solved).is_none() {
            return Some(self.accept(solved, all_low));
        }
        None
    }

    /// Solve one tier assignment; solver infeasibility means the tier failed,
    /// not that the batch is broken.
    fn attempt(&self, tiers: &[StockTier], target: &[f64]) -> Option<SolvedVolumes> {
        let stock = self.stock.concentrations_for(tiers);
        solver::solve_volumes(self.well_volume, self.culture_ratio, &stock, target).ok()
    }

    /// Indices of components whose volume is below the minimum tip volume.
    /// Zero-target components need no pipetting and are exempt.
    fn undersized(&self, solved: &SolvedVolumes) -> Option<Vec<usize>> {
        let small: Vec<usize> = solved
            .reagents
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v > 0.0 && v < self.min_tip_volume - EPS)
            .map(|(i, _)| i)
            .collect();
        if small.is_empty() { None } else { Some(small) }
    }

    fn accept(&self, solved: SolvedVolumes, tiers: Vec<StockTier>) -> RowPlan {
        let (volumes, water) = match &self.rounding {
            Some(config) => {
                let volumes =
                    rounding::round_volumes(&solved.reagents, self.well_volume, config);
                let water = rounding::round_volume(solved.water, self.well_volume, config);
                (volumes, water)
            }
            None => (solved.reagents, solved.water),
        };
        RowPlan {
            volumes,
            water,
            tiers,
        }
    }
}
