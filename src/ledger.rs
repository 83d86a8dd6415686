use crate::config::{PlateNames, RobotConfig};
use crate::deck::{DeckState, WellAddress};
use crate::error::MediaError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One atomic robot instruction, already within the single-draw limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub source: WellAddress,
    pub destination: WellAddress,
    pub volume: f64,
}

/// The five instruction files the Biomek method expects, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionSet {
    WaterToMixing,
    WaterToDestination,
    ReagentToMixing,
    ReagentToDestination,
    MixingToDestination,
}

impl InstructionSet {
    pub const ALL: [InstructionSet; 5] = [
        InstructionSet::WaterToMixing,
        InstructionSet::WaterToDestination,
        InstructionSet::ReagentToMixing,
        InstructionSet::ReagentToDestination,
        InstructionSet::MixingToDestination,
    ];

    /// File stem of the CSV handed to the robot software.
    pub fn file_stem(&self) -> &'static str {
        match self {
            InstructionSet::WaterToMixing => "water_mix",
            InstructionSet::WaterToDestination => "water_dest",
            InstructionSet::ReagentToMixing => "mix",
            InstructionSet::ReagentToDestination => "src",
            InstructionSet::MixingToDestination => "dest",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            InstructionSet::WaterToMixing => "Adding water to mixing plate",
            InstructionSet::WaterToDestination => "Adding water to destination plate",
            InstructionSet::ReagentToMixing => "Diluting stock solutions",
            InstructionSet::ReagentToDestination => "Adding undiluted media to destination",
            InstructionSet::MixingToDestination => "Mixing final media",
        }
    }
}

/// Tip and tip-plate consumption for one instruction set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TipUsage {
    pub set: InstructionSet,
    pub tips: usize,
    pub tip_plates: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TipReport {
    pub per_set: Vec<TipUsage>,
    pub total_tips: usize,
    pub total_tip_plates: usize,
}

/// CSV row layout required by the robot method files.
#[derive(Debug, Serialize)]
struct InstructionRecord<'a> {
    srcpos: &'a str,
    srcwell: u32,
    destpos: &'a str,
    destwell: u32,
    vol: f64,
}

const TIPS_PER_PLATE: usize = 96;

/// Append-only, ordered log of executed transfers.
///
/// Insertion order is execution order; replaying the log against a snapshot
/// of the starting deck reproduces the final deck state exactly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferLedger {
    transfers: Vec<Transfer>,
}

impl TransferLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    /// Execute a transfer of `volume` uL, splitting it into draws of at most
    /// `config.max_transfer`. Each draw mutates the deck before the next one
    /// is planned, so later draws see the post-transfer source state.
    ///
    /// The total is checked against the source up front; a request the source
    /// cannot cover fails before any liquid moves.
    pub fn record(
        &mut self,
        deck: &mut DeckState,
        source: &WellAddress,
        destination: &WellAddress,
        volume: f64,
        config: &RobotConfig,
    ) -> Result<(), MediaError> {
        if !(volume > 0.0) {
            return Err(MediaError::InfeasibleInput(format!(
                "transfer volume must be positive, got {volume}"
            )));
        }
        let available = deck.volume_of(source);
        if volume > available + config.dead_volume {
            return Err(MediaError::InsufficientVolume {
                source: source.clone(),
                requested: volume,
                available,
            });
        }
        let mut remaining = volume;
        while remaining > 0.0 {
            let draw = remaining.min(config.max_transfer);
            deck.apply_transfer(source, destination, draw, config.dead_volume)?;
            self.transfers.push(Transfer {
                source: source.clone(),
                destination: destination.clone(),
                volume: draw,
            });
            remaining -= draw;
        }
        Ok(())
    }

    /// Top a well up with `volume` uL of water. Each draw searches the water
    /// pool afresh, so one top-up may pull from several water wells as they
    /// run down.
    pub fn record_water(
        &mut self,
        deck: &mut DeckState,
        destination: &WellAddress,
        volume: f64,
        config: &RobotConfig,
    ) -> Result<(), MediaError> {
        let mut remaining = volume;
        while remaining > 0.0 {
            let draw = remaining.min(config.max_transfer);
            let source = deck
                .find_water(draw, config.dead_volume)
                .ok_or_else(|| MediaError::ReagentExhausted("water".to_string()))?;
            self.record(deck, &source, destination, draw, config)?;
            remaining -= draw;
        }
        Ok(())
    }

    fn classify(&self, transfer: &Transfer, plates: &PlateNames) -> Option<InstructionSet> {
        let src = &transfer.source.plate;
        let dst = &transfer.destination.plate;
        if *dst == plates.mixing && *src == plates.water {
            Some(InstructionSet::WaterToMixing)
        } else if *dst == plates.destination && *src == plates.water {
            Some(InstructionSet::WaterToDestination)
        } else if *dst == plates.mixing {
            Some(InstructionSet::ReagentToMixing)
        } else if *dst == plates.destination && *src == plates.source {
            Some(InstructionSet::ReagentToDestination)
        } else if *dst == plates.destination && *src == plates.mixing {
            Some(InstructionSet::MixingToDestination)
        } else {
            None
        }
    }

    /// The ledger split into the five robot instruction sets, in fixed order.
    pub fn partitioned<'a>(
        &'a self,
        plates: &PlateNames,
    ) -> Vec<(InstructionSet, Vec<&'a Transfer>)> {
        InstructionSet::ALL
            .iter()
            .map(|&set| {
                let transfers = self
                    .transfers
                    .iter()
                    .filter(|t| self.classify(t, plates) == Some(set))
                    .collect();
                (set, transfers)
            })
            .collect()
    }

    pub fn tip_report(&self, plates: &PlateNames) -> TipReport {
        let per_set: Vec<TipUsage> = self
            .partitioned(plates)
            .into_iter()
            .map(|(set, transfers)| TipUsage {
                set,
                tips: transfers.len(),
                tip_plates: transfers.len().div_ceil(TIPS_PER_PLATE),
            })
            .collect();
        let total_tips = self.transfers.len();
        TipReport {
            per_set,
            total_tips,
            total_tip_plates: total_tips.div_ceil(TIPS_PER_PLATE),
        }
    }

    /// Write one CSV per instruction set into `dir`, CRLF-terminated as the
    /// robot-control software requires.
    pub fn write_instruction_files(
        &self,
        dir: &Path,
        plates: &PlateNames,
    ) -> Result<(), MediaError> {
        for (set, transfers) in self.partitioned(plates) {
            let path = dir.join(format!("{}.csv", set.file_stem()));
            let mut writer = csv::WriterBuilder::new()
                .terminator(csv::Terminator::CRLF)
                .from_path(&path)?;
            for t in transfers {
                writer.serialize(InstructionRecord {
                    srcpos: &t.source.plate,
                    srcwell: t.source.well,
                    destpos: &t.destination.plate,
                    destwell: t.destination.well,
                    vol: t.volume,
                })?;
            }
            writer.flush()?;
        }
        Ok(())
    }

    /// Re-execute every logged transfer against a snapshot of the starting
    /// deck. The result must match the live deck exactly.
    pub fn replay(
        &self,
        initial: &DeckState,
        config: &RobotConfig,
    ) -> Result<DeckState, MediaError> {
        let mut deck = initial.clone();
        for t in &self.transfers {
            deck.apply_transfer(&t.source, &t.destination, t.volume, config.dead_volume)?;
        }
        Ok(deck)
    }
}
