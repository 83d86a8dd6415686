use crate::deck::{Component, WellAddress};
use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum MediaError {
    /// A precondition on the solver input failed; the caller must fix the input.
    InfeasibleInput(String),
    /// The solved system produced physically invalid volumes.
    NumericalInfeasibility(String),
    /// A transfer would draw more than the source well can give.
    InsufficientVolume {
        source: WellAddress,
        requested: f64,
        available: f64,
    },
    /// No well on the deck can donate enough of the component, even via dilution.
    ReagentExhausted(Component),
    /// No well on the deck holds the component at all.
    ReagentNotFound(Component),
    /// The mixing plate has no free wells left.
    PlateCapacity { plate: String, capacity: u32 },
    UnknownWell(WellAddress),
    DuplicateWell(WellAddress),
    Io(std::io::Error),
    Csv(csv::Error),
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::InfeasibleInput(msg) => write!(f, "infeasible input: {msg}"),
            MediaError::NumericalInfeasibility(msg) => {
                write!(f, "numerically infeasible solution: {msg}")
            }
            MediaError::InsufficientVolume {
                source,
                requested,
                available,
            } => write!(
                f,
                "transfer of {requested} uL from {source} exceeds available {available} uL"
            ),
            MediaError::ReagentExhausted(component) => {
                write!(f, "not enough {component} on deck; add more to the reagent plate")
            }
            MediaError::ReagentNotFound(component) => {
                write!(f, "no well on the deck contains {component}")
            }
            MediaError::PlateCapacity { plate, capacity } => {
                write!(f, "plate {plate} is full ({capacity} wells)")
            }
            MediaError::UnknownWell(address) => write!(f, "no such well: {address}"),
            MediaError::DuplicateWell(address) => write!(f, "well already exists: {address}"),
            MediaError::Io(e) => write!(f, "I/O error: {e}"),
            MediaError::Csv(e) => write!(f, "CSV error: {e}"),
        }
    }
}

impl Error for MediaError {}

impl From<std::io::Error> for MediaError {
    fn from(err: std::io::Error) -> Self {
        MediaError::Io(err)
    }
}

impl From<csv::Error> for MediaError {
    fn from(err: csv::Error) -> Self {
        MediaError::Csv(err)
    }
}
