use crate::config::{PlateNames, RobotConfig};
use crate::deck::{Component, DeckRow, DeckState, GoalWell, WellAddress};
use crate::dilution;
use crate::error::MediaError;
use crate::ledger::{TipReport, TransferLedger};
use serde::{Deserialize, Serialize};

/// A destination well the compiler could not finish, with enough context to
/// diagnose it without re-running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WellFailure {
    pub destination: WellAddress,
    pub component: Option<Component>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileReport {
    pub filled: Vec<WellAddress>,
    pub failures: Vec<WellFailure>,
    pub tips: TipReport,
}

impl CompileReport {
    pub fn success_rate(&self) -> f64 {
        let total = self.filled.len() + self.failures.len();
        if total == 0 {
            0.0
        } else {
            self.filled.len() as f64 / total as f64
        }
    }
}

/// Compiles destination-well requirements into an ordered transfer plan.
///
/// For every destination well and component, the compiler looks for a donor
/// holding only that component, transfers from the one needing the smallest
/// draw, and falls back to synthesizing a diluted intermediate when no donor
/// fits the pipetting window. Each finished well is topped up with water to
/// its goal volume. Failures are per destination well; compilation carries on
/// with the remaining wells unless the deck itself gives out (a full mixing
/// plate is fatal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaCompiler {
    deck: DeckState,
    goals: Vec<GoalWell>,
    ledger: TransferLedger,
    config: RobotConfig,
    plates: PlateNames,
}

impl MediaCompiler {
    pub fn new(
        deck: DeckState,
        goals: Vec<GoalWell>,
        config: RobotConfig,
        plates: PlateNames,
    ) -> Self {
        Self {
            deck,
            goals,
            ledger: TransferLedger::new(),
            config,
            plates,
        }
    }

    /// Build compiler state straight from deck-description rows; target rows
    /// become the goals.
    pub fn from_rows(
        components: Vec<Component>,
        rows: &[DeckRow],
        config: RobotConfig,
        plates: PlateNames,
    ) -> Result<Self, MediaError> {
        let (deck, goals) = DeckState::load(components, rows)?;
        Ok(Self::new(deck, goals, config, plates))
    }

    pub fn deck(&self) -> &DeckState {
        &self.deck
    }

    pub fn ledger(&self) -> &TransferLedger {
        &self.ledger
    }

    /// Plan all destination wells. Structural failures abort; per-well
    /// failures land in the report and the run keeps going.
    pub fn compile(&mut self) -> Result<CompileReport, MediaError> {
        let goals = self.goals.clone();
        let mut filled = Vec::new();
        let mut failures = Vec::new();
        for goal in &goals {
            match self.fill_destination(goal) {
                Ok(()) => filled.push(goal.address.clone()),
                Err((component, err)) => {
                    if fatal(&err) {
                        return Err(err);
                    }
                    failures.push(WellFailure {
                        destination: goal.address.clone(),
                        component: component
                            .and_then(|i| self.deck.components().get(i).cloned()),
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(CompileReport {
            filled,
            failures,
            tips: self.ledger.tip_report(&self.plates),
        })
    }

    fn fill_destination(
        &mut self,
        goal: &GoalWell,
    ) -> Result<(), (Option<usize>, MediaError)> {
        for component in 0..self.deck.components().len() {
            let needed = goal.quantities.get(component).copied().unwrap_or(0.0);
            if needed <= 0.0 {
                continue;
            }
            self.supply_component(&goal.address, component, needed)
                .map_err(|e| (Some(component), e))?;
        }

        let remaining = goal.volume - self.deck.volume_of(&goal.address);
        if remaining > 0.0 {
            self.ledger
                .record_water(&mut self.deck, &goal.address, remaining, &self.config)
                .map_err(|e| (None, e))?;
        }
        Ok(())
    }

    /// Deliver `needed` moles of one component into `destination`, diluting
    /// as many times as it takes to reach a pipettable transfer volume.
    fn supply_component(
        &mut self,
        destination: &WellAddress,
        component: usize,
        needed: f64,
    ) -> Result<(), MediaError> {
        let component_name = self
            .deck
            .components()
            .get(component)
            .cloned()
            .unwrap_or_else(|| format!("component #{component}"));
        let mut excluded: Vec<WellAddress> = Vec::new();
        loop {
            let pool = self.deck.single_component_wells(component);
            if pool.is_empty() {
                return Err(MediaError::ReagentNotFound(component_name));
            }
            // A donor must hold more than the needed moles; draining a well
            // to exactly zero is not attempted.
            let donors: Vec<WellAddress> = pool
                .into_iter()
                .filter(|a| {
                    !excluded.contains(a) && self.deck.quantity_of(a, component) > needed
                })
                .collect();
            if donors.is_empty() {
                return Err(MediaError::ReagentExhausted(component_name));
            }

            // Direct transfer: the donor needing the smallest draw wins.
            let mut best: Option<(WellAddress, f64)> = None;
            for address in &donors {
                let volume = self.deck.volume_of(address);
                let quantity = self.deck.quantity_of(address, component);
                let draw = volume * needed / quantity;
                if draw > self.config.min_volume && draw < volume - self.config.dead_volume {
                    let better = match &best {
                        Some((_, b)) => draw < *b,
                        None => true,
                    };
                    if better {
                        best = Some((address.clone(), draw));
                    }
                }
            }

            if let Some((source, draw)) = best {
                match self
                    .ledger
                    .record(&mut self.deck, &source, destination, draw, &self.config)
                {
                    Ok(()) => return Ok(()),
                    Err(MediaError::InsufficientVolume { .. }) => {
                        excluded.push(source);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            // No donor fits the pipetting window; make a diluted intermediate
            // and search again.
            dilution::dilute(
                &mut self.deck,
                &mut self.ledger,
                &self.config,
                &self.plates,
                component,
                &donors,
                needed,
                self.config.ideal_transfer_volume,
            )?;
        }
    }
}

fn fatal(err: &MediaError) -> bool {
    matches!(
        err,
        MediaError::PlateCapacity { .. }
            | MediaError::UnknownWell(_)
            | MediaError::DuplicateWell(_)
            | MediaError::Io(_)
            | MediaError::Csv(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water_rows(count: u32) -> Vec<DeckRow> {
        (1..=count)
            .map(|i| DeckRow {
                address: WellAddress::new("water_plate", i),
                concentrations: vec![0.0, 0.0],
                volume: 1600.0,
                is_target: false,
            })
            .collect()
    }

    fn source_row(well: u32, conc: Vec<f64>) -> DeckRow {
        DeckRow {
            address: WellAddress::new("src_plate", well),
            concentrations: conc,
            volume: 1000.0,
            is_target: false,
        }
    }

    fn goal_row(well: u32, conc: Vec<f64>) -> DeckRow {
        DeckRow {
            address: WellAddress::new("dest_plate", well),
            concentrations: conc,
            volume: 1100.0,
            is_target: true,
        }
    }

    fn compiler(rows: Vec<DeckRow>) -> MediaCompiler {
        MediaCompiler::from_rows(
            vec!["A".into(), "B".into()],
            &rows,
            RobotConfig::default(),
            PlateNames::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_direct_transfers_fill_destination() {
        let mut rows = vec![
            source_row(1, vec![1000.0, 0.0]),
            source_row(2, vec![0.0, 400.0]),
        ];
        rows.extend(water_rows(4));
        rows.push(goal_row(1, vec![10.0, 4.0]));
        let mut c = compiler(rows);
        let report = c.compile().unwrap();

        assert_eq!(report.filled, vec![WellAddress::new("dest_plate", 1)]);
        assert!(report.failures.is_empty());

        let dest = WellAddress::new("dest_plate", 1);
        // Exact goal volume and exact moles delivered.
        assert!((c.deck().volume_of(&dest) - 1100.0).abs() < 1e-9);
        assert!((c.deck().quantity_of(&dest, 0) - 10.0 * 1100.0 * 1e-6).abs() < 1e-12);
        assert!((c.deck().quantity_of(&dest, 1) - 4.0 * 1100.0 * 1e-6).abs() < 1e-12);
    }

    #[test]
    fn test_dilution_path_when_direct_draw_too_small() {
        let mut rows = vec![source_row(1, vec![1000.0, 0.0])];
        rows.extend(water_rows(8));
        // 0.1 mM from a 1000 mM stock needs a 0.11 uL draw, far below the
        // 5 uL pipette floor, so an intermediate must be made.
        rows.push(goal_row(1, vec![0.1, 0.0]));
        let mut c = compiler(rows);
        let report = c.compile().unwrap();

        assert!(report.failures.is_empty());
        let mixing = WellAddress::new("mixing_plate", 1);
        assert!(c.deck().well(&mixing).is_some());

        let dest = WellAddress::new("dest_plate", 1);
        assert!((c.deck().quantity_of(&dest, 0) - 0.1 * 1100.0 * 1e-6).abs() < 1e-12);
        assert!((c.deck().volume_of(&dest) - 1100.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_reagent_fails_well_not_run() {
        let mut rows = vec![source_row(1, vec![1000.0, 0.0])];
        rows.extend(water_rows(4));
        rows.push(goal_row(1, vec![10.0, 4.0])); // B exists nowhere
        rows.push(goal_row(2, vec![10.0, 0.0])); // fine without B
        let mut c = compiler(rows);
        let report = c.compile().unwrap();

        assert_eq!(report.filled, vec![WellAddress::new("dest_plate", 2)]);
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.destination, WellAddress::new("dest_plate", 1));
        assert_eq!(failure.component.as_deref(), Some("B"));
        assert!((report.success_rate() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_exhausted_reagent_reported_with_context() {
        // The only A well holds fewer moles than one destination needs.
        let mut rows = vec![DeckRow {
            address: WellAddress::new("src_plate", 1),
            concentrations: vec![10.0, 0.0],
            volume: 1000.0,
            is_target: false,
        }];
        rows.extend(water_rows(4));
        rows.push(goal_row(1, vec![10.0, 0.0]));
        let mut c = compiler(rows);
        let report = c.compile().unwrap();

        assert!(report.filled.is_empty());
        assert_eq!(report.failures[0].component.as_deref(), Some("A"));
        assert!(report.failures[0].message.contains("A"));
    }

    #[test]
    fn test_compile_conserves_moles_and_replays() {
        let mut rows = vec![
            source_row(1, vec![1000.0, 0.0]),
            source_row(2, vec![0.0, 400.0]),
        ];
        rows.extend(water_rows(8));
        rows.push(goal_row(1, vec![10.0, 4.0]));
        rows.push(goal_row(2, vec![0.1, 1.0]));
        let (initial, goals) = DeckState::load(
            vec!["A".into(), "B".into()],
            &rows,
        )
        .unwrap();
        let totals: Vec<f64> = (0..2).map(|i| initial.total_quantity(i)).collect();

        let config = RobotConfig::default();
        let plates = PlateNames::default();
        let mut c = MediaCompiler::new(initial.clone(), goals, config.clone(), plates);
        let report = c.compile().unwrap();
        assert!(report.failures.is_empty());

        for i in 0..2 {
            assert!((c.deck().total_quantity(i) - totals[i]).abs() < 1e-9);
        }

        let replayed = c.ledger().replay(&initial, &config).unwrap();
        for (address, well) in c.deck().wells() {
            let r = replayed.well(address).unwrap();
            assert!((r.volume - well.volume).abs() < 1e-9);
        }
    }

    #[test]
    fn test_mixing_plate_overflow_is_fatal() {
        let mut rows = vec![source_row(1, vec![1000.0, 0.0])];
        rows.extend(water_rows(8));
        rows.push(goal_row(1, vec![0.1, 0.0]));
        let mut config = RobotConfig::default();
        config.mixing_plate_capacity = 0;
        let mut c = MediaCompiler::from_rows(
            vec!["A".into(), "B".into()],
            &rows,
            config,
            PlateNames::default(),
        )
        .unwrap();
        let err = c.compile().unwrap_err();
        assert!(matches!(err, MediaError::PlateCapacity { .. }));
    }
}
