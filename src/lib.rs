//! Deterministic media-formulation engine for Biomek-class pipetting robots.
//!
//! Given stock reagent concentrations and a set of target growth-media
//! formulations, the crate solves per-well pipetting volumes, simulates the
//! deck state transfer by transfer, dilutes reagents that are too
//! concentrated to pipette directly, and emits the ordered instruction files
//! the robot-control software consumes.

pub mod compiler;
pub mod config;
pub mod deck;
pub mod dilution;
pub mod error;
pub mod layout;
pub mod ledger;
pub mod planner;
pub mod rounding;
pub mod solver;

pub use compiler::{CompileReport, MediaCompiler, WellFailure};
pub use config::{PlateNames, RobotConfig};
pub use deck::{Component, DeckRow, DeckState, GoalWell, Well, WellAddress};
pub use error::MediaError;
pub use ledger::{InstructionSet, TipReport, Transfer, TransferLedger};
pub use planner::{BatchPlan, BatchPlanner, RowPlan, StockProfile, StockTier};
pub use solver::{SolvedVolumes, solve_volumes};
