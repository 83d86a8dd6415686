use crate::config::{PlateNames, RobotConfig};
use crate::deck::{DeckState, WellAddress};
use crate::error::MediaError;
use crate::ledger::TransferLedger;

/// Synthesize a diluted intermediate well for one component.
///
/// Called when no donor can supply `moles_needed` within the pipetting
/// window. Picks the least concentrated donor that can spare the required
/// dilution volume, moves that volume into a fresh mixing-plate well, and
/// tops the new well up to the maximum fill with water. The new well then
/// competes in donor searches like any other.
pub fn dilute(
    deck: &mut DeckState,
    ledger: &mut TransferLedger,
    config: &RobotConfig,
    plates: &PlateNames,
    component: usize,
    candidates: &[WellAddress],
    moles_needed: f64,
    transfer_volume: f64,
) -> Result<WellAddress, MediaError> {
    struct Donor {
        address: WellAddress,
        dilution_factor: f64,
        dilution_volume: f64,
    }

    let mut donors: Vec<Donor> = Vec::new();
    for address in candidates {
        let volume = deck.volume_of(address);
        let quantity = deck.quantity_of(address, component);
        if quantity <= 0.0 {
            continue;
        }
        // Donor must keep enough to stay usable after the draw.
        if volume <= config.min_volume * config.safety_factor + transfer_volume {
            continue;
        }
        // Volume to draw so that `transfer_volume` of the topped-up mixture
        // carries `moles_needed`.
        let dilution_volume =
            moles_needed * config.max_volume * volume / (transfer_volume * quantity);
        if dilution_volume >= volume - config.dead_volume {
            continue;
        }
        donors.push(Donor {
            address: address.clone(),
            dilution_factor: quantity / volume,
            dilution_volume,
        });
    }

    let component_name = deck
        .components()
        .get(component)
        .cloned()
        .unwrap_or_else(|| format!("component #{component}"));
    let best = donors
        .into_iter()
        .min_by(|a, b| a.dilution_factor.total_cmp(&b.dilution_factor))
        .ok_or(MediaError::ReagentExhausted(component_name))?;

    let dilution_volume = best.dilution_volume.max(config.min_volume);

    let well_number = deck.plate_well_count(&plates.mixing) + 1;
    if well_number > config.mixing_plate_capacity {
        return Err(MediaError::PlateCapacity {
            plate: plates.mixing.clone(),
            capacity: config.mixing_plate_capacity,
        });
    }
    let new_well = WellAddress::new(&plates.mixing, well_number);

    ledger.record(deck, &best.address, &new_well, dilution_volume, config)?;
    ledger.record_water(deck, &new_well, config.max_volume - dilution_volume, config)?;
    Ok(new_well)
}
