use crate::error::MediaError;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type Component = String;

/// Moles are stored per microliter-millimolar unit: quantity = mM * uL * 1e-6.
const MOLES_PER_MM_UL: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WellAddress {
    pub plate: String,
    pub well: u32,
}

impl WellAddress {
    pub fn new(plate: &str, well: u32) -> Self {
        Self {
            plate: plate.to_string(),
            well,
        }
    }
}

impl fmt::Display for WellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.plate, self.well)
    }
}

/// One physical well: absolute component quantities (moles), aligned to the
/// deck's shared component ordering, plus the liquid volume in uL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Well {
    pub quantities: Vec<f64>,
    pub volume: f64,
}

/// A destination well to be assembled: required moles per component and the
/// final fill volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalWell {
    pub address: WellAddress,
    pub quantities: Vec<f64>,
    pub volume: f64,
}

/// One row of a deck description, concentrations still in mM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckRow {
    pub address: WellAddress,
    pub concentrations: Vec<f64>,
    pub volume: f64,
    pub is_target: bool,
}

/// The mutable table of every non-target well on the deck.
///
/// Quantities are absolute moles; the mM-to-moles conversion happens once, in
/// [`DeckState::load`], and never again. Every mutation goes through
/// [`DeckState::apply_transfer`], which conserves total moles per component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeckState {
    components: Vec<Component>,
    wells: BTreeMap<WellAddress, Well>,
}

impl DeckState {
    pub fn new(components: Vec<Component>) -> Result<Self, MediaError> {
        if components.is_empty() {
            return Err(MediaError::InfeasibleInput(
                "deck needs at least one component".to_string(),
            ));
        }
        if !components.iter().all_unique() {
            return Err(MediaError::InfeasibleInput(
                "component names must be unique".to_string(),
            ));
        }
        Ok(Self {
            components,
            wells: BTreeMap::new(),
        })
    }

    /// Build the deck from concentration rows. Target rows become goals, not
    /// deck wells; they only exist on the deck once liquid lands in them.
    pub fn load(
        components: Vec<Component>,
        rows: &[DeckRow],
    ) -> Result<(Self, Vec<GoalWell>), MediaError> {
        let mut deck = Self::new(components)?;
        let mut goals = Vec::new();
        for row in rows {
            if row.concentrations.len() != deck.components.len() {
                return Err(MediaError::InfeasibleInput(format!(
                    "row {} has {} concentrations, deck has {} components",
                    row.address,
                    row.concentrations.len(),
                    deck.components.len()
                )));
            }
            let quantities: Vec<f64> = row
                .concentrations
                .iter()
                .map(|c| c * row.volume * MOLES_PER_MM_UL)
                .collect();
            if row.is_target {
                goals.push(GoalWell {
                    address: row.address.clone(),
                    quantities,
                    volume: row.volume,
                });
            } else {
                if deck.wells.contains_key(&row.address) {
                    return Err(MediaError::DuplicateWell(row.address.clone()));
                }
                deck.wells.insert(
                    row.address.clone(),
                    Well {
                        quantities,
                        volume: row.volume,
                    },
                );
            }
        }
        Ok((deck, goals))
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn component_index(&self, name: &str) -> Option<usize> {
        self.components.iter().position(|c| c == name)
    }

    pub fn well(&self, address: &WellAddress) -> Option<&Well> {
        self.wells.get(address)
    }

    pub fn volume_of(&self, address: &WellAddress) -> f64 {
        self.wells.get(address).map(|w| w.volume).unwrap_or(0.0)
    }

    pub fn quantity_of(&self, address: &WellAddress, component: usize) -> f64 {
        self.wells
            .get(address)
            .and_then(|w| w.quantities.get(component))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn wells(&self) -> impl Iterator<Item = (&WellAddress, &Well)> {
        self.wells.iter()
    }

    /// Number of wells currently allocated on a plate.
    pub fn plate_well_count(&self, plate: &str) -> u32 {
        self.wells.keys().filter(|a| a.plate == plate).count() as u32
    }

    /// Explicit get-or-create: an empty well appears at `address` if nothing
    /// is there yet. Reads never create wells.
    pub fn ensure_well(&mut self, address: &WellAddress) -> &mut Well {
        let n = self.components.len();
        self.wells
            .entry(address.clone())
            .or_insert_with(|| Well {
                quantities: vec![0.0; n],
                volume: 0.0,
            })
    }

    /// Move `volume` uL from `source` to `destination`, carrying a
    /// proportional slice of every component with it.
    ///
    /// Fails without touching either well if the source does not exist, the
    /// volume is not positive, or the draw exceeds the source volume plus the
    /// dead-volume reserve. Total moles per component across the deck are
    /// unchanged by a successful call.
    pub fn apply_transfer(
        &mut self,
        source: &WellAddress,
        destination: &WellAddress,
        volume: f64,
        dead_volume: f64,
    ) -> Result<(), MediaError> {
        if !(volume > 0.0) {
            return Err(MediaError::InfeasibleInput(format!(
                "transfer volume must be positive, got {volume}"
            )));
        }
        let src = self
            .wells
            .get(source)
            .ok_or_else(|| MediaError::UnknownWell(source.clone()))?;
        if src.volume <= 0.0 || volume > src.volume + dead_volume {
            return Err(MediaError::InsufficientVolume {
                source: source.clone(),
                requested: volume,
                available: src.volume,
            });
        }

        let fraction = volume / src.volume;
        let moved: Vec<f64> = src.quantities.iter().map(|q| q * fraction).collect();

        let src = match self.wells.get_mut(source) {
            Some(well) => well,
            None => return Err(MediaError::UnknownWell(source.clone())),
        };
        for (q, m) in src.quantities.iter_mut().zip(moved.iter()) {
            *q -= m;
        }
        src.volume -= volume;

        let dst = self.ensure_well(destination);
        for (q, m) in dst.quantities.iter_mut().zip(moved.iter()) {
            *q += m;
        }
        dst.volume += volume;
        Ok(())
    }

    /// Total moles of one component across every well on the deck.
    pub fn total_quantity(&self, component: usize) -> f64 {
        self.wells
            .values()
            .map(|w| w.quantities.get(component).copied().unwrap_or(0.0))
            .sum()
    }

    /// Wells that hold the given component and nothing else — the donor pool
    /// for direct transfers and dilutions.
    pub fn single_component_wells(&self, component: usize) -> Vec<WellAddress> {
        self.wells
            .iter()
            .filter(|(_, well)| {
                well.quantities.get(component).copied().unwrap_or(0.0) > 0.0
                    && well
                        .quantities
                        .iter()
                        .enumerate()
                        .all(|(i, &q)| i == component || q == 0.0)
            })
            .map(|(address, _)| address.clone())
            .collect()
    }

    /// First well holding nothing but water with enough spare volume above
    /// the dead-volume reserve for a draw of `volume`.
    pub fn find_water(&self, volume: f64, dead_volume: f64) -> Option<WellAddress> {
        self.wells
            .iter()
            .find(|(_, well)| {
                well.quantities.iter().all(|&q| q == 0.0) && well.volume > volume + dead_volume
            })
            .map(|(address, _)| address.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_deck() -> DeckState {
        let rows = vec![
            DeckRow {
                address: WellAddress::new("src_plate", 1),
                concentrations: vec![100.0, 0.0],
                volume: 1000.0,
                is_target: false,
            },
            DeckRow {
                address: WellAddress::new("src_plate", 2),
                concentrations: vec![0.0, 50.0],
                volume: 1000.0,
                is_target: false,
            },
            DeckRow {
                address: WellAddress::new("water_plate", 1),
                concentrations: vec![0.0, 0.0],
                volume: 1600.0,
                is_target: false,
            },
        ];
        let (deck, goals) = DeckState::load(vec!["A".into(), "B".into()], &rows).unwrap();
        assert!(goals.is_empty());
        deck
    }

    #[test]
    fn test_load_converts_concentration_to_moles() {
        let deck = small_deck();
        let a = deck.quantity_of(&WellAddress::new("src_plate", 1), 0);
        assert!((a - 100.0 * 1000.0 * 1e-6).abs() < 1e-12);
    }

    #[test]
    fn test_target_rows_become_goals() {
        let rows = vec![DeckRow {
            address: WellAddress::new("dest_plate", 1),
            concentrations: vec![10.0],
            volume: 1100.0,
            is_target: true,
        }];
        let (deck, goals) = DeckState::load(vec!["A".into()], &rows).unwrap();
        assert_eq!(goals.len(), 1);
        assert!(deck.well(&goals[0].address).is_none());
    }

    #[test]
    fn test_transfer_conserves_moles() {
        let mut deck = small_deck();
        let src = WellAddress::new("src_plate", 1);
        let dst = WellAddress::new("dest_plate", 1);
        let before: Vec<f64> = (0..2).map(|c| deck.total_quantity(c)).collect();
        deck.apply_transfer(&src, &dst, 123.4, 50.0).unwrap();
        deck.apply_transfer(&dst, &WellAddress::new("dest_plate", 2), 7.0, 50.0)
            .unwrap();
        for c in 0..2 {
            assert!((deck.total_quantity(c) - before[c]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_transfer_moves_proportional_slice() {
        let mut deck = small_deck();
        let src = WellAddress::new("src_plate", 1);
        let dst = WellAddress::new("dest_plate", 1);
        deck.apply_transfer(&src, &dst, 250.0, 50.0).unwrap();
        // A quarter of the volume carries a quarter of the moles.
        assert!((deck.quantity_of(&dst, 0) - 0.025).abs() < 1e-12);
        assert_eq!(deck.volume_of(&src), 750.0);
        assert_eq!(deck.volume_of(&dst), 250.0);
    }

    #[test]
    fn test_transfer_respects_dead_volume_slack() {
        let mut deck = small_deck();
        let src = WellAddress::new("src_plate", 1);
        let dst = WellAddress::new("dest_plate", 1);
        let err = deck
            .apply_transfer(&src, &dst, 1051.0, 50.0)
            .unwrap_err();
        assert!(matches!(err, MediaError::InsufficientVolume { .. }));
        // Failed transfer must leave both sides untouched.
        assert_eq!(deck.volume_of(&src), 1000.0);
        assert!(deck.well(&dst).is_none());
    }

    #[test]
    fn test_unknown_source_rejected() {
        let mut deck = small_deck();
        let err = deck
            .apply_transfer(
                &WellAddress::new("nowhere", 1),
                &WellAddress::new("dest_plate", 1),
                10.0,
                50.0,
            )
            .unwrap_err();
        assert!(matches!(err, MediaError::UnknownWell(_)));
    }

    #[test]
    fn test_single_component_wells() {
        let mut deck = small_deck();
        assert_eq!(
            deck.single_component_wells(0),
            vec![WellAddress::new("src_plate", 1)]
        );
        // A well that received both components qualifies for neither pool.
        deck.apply_transfer(
            &WellAddress::new("src_plate", 1),
            &WellAddress::new("mixing_plate", 1),
            10.0,
            50.0,
        )
        .unwrap();
        deck.apply_transfer(
            &WellAddress::new("src_plate", 2),
            &WellAddress::new("mixing_plate", 1),
            10.0,
            50.0,
        )
        .unwrap();
        assert_eq!(deck.single_component_wells(0).len(), 1);
    }

    #[test]
    fn test_find_water_needs_spare_volume() {
        let deck = small_deck();
        assert_eq!(
            deck.find_water(100.0, 50.0),
            Some(WellAddress::new("water_plate", 1))
        );
        assert_eq!(deck.find_water(1551.0, 50.0), None);
    }

    #[test]
    fn test_duplicate_component_rejected() {
        assert!(DeckState::new(vec!["A".into(), "A".into()]).is_err());
    }
}
