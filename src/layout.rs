use crate::deck::{Component, DeckRow, WellAddress};
use crate::error::MediaError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One entry of the media recipe: a component and its master (source plate)
/// concentration in mM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaComponent {
    pub name: Component,
    pub master_concentration: f64,
}

/// Plate-filling parameters for a fresh deck.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutParams {
    /// Volume loaded into each source-plate reagent well.
    pub reagent_volume: f64,
    /// Final fill volume of each destination well.
    pub well_volume: f64,
    /// Volume loaded into each water well.
    pub water_volume: f64,
    /// Number of water wells to reserve.
    pub water_wells: u32,
    /// Destination replicates per media design (stacked 8 rows apart).
    pub replicates: u32,
    /// Extra source wells for components that run out quickly.
    pub extra_wells: HashMap<Component, u32>,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            reagent_volume: 1000.0,
            well_volume: 1100.0,
            water_volume: 1600.0,
            water_wells: 96,
            replicates: 3,
            extra_wells: HashMap::new(),
        }
    }
}

/// A line of the by-hand worksheet: where to pipette which reagent when
/// loading the source plate at the bench.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorksheetEntry {
    pub plate: String,
    pub label: String,
    pub well_number: u32,
    pub reagent: Component,
}

/// Alphanumeric label for a 96-well plate position in row-major order
/// ("A1".."H12" for wells 1..96).
pub fn well_label(well: u32) -> String {
    const ROWS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let index = well.saturating_sub(1);
    let row = ROWS[(index / 12) as usize % ROWS.len()] as char;
    format!("{}{}", row, index % 12 + 1)
}

/// Destination well number for the i-th media design on the Robolector
/// plate: designs fill an 8-row column block before moving right.
fn robolector_base_well(design: u32) -> u32 {
    (design / 8) * 24 + design % 8 + 1
}

/// Build the deck-description rows for a fresh run: one source well per
/// component (plus any extras), a pool of water wells, and destination wells
/// for every target-concentration row, replicated down the plate.
///
/// Target rows are in mM and must align with `components`.
pub fn generate_initial_deck(
    components: &[MediaComponent],
    targets: &[Vec<f64>],
    params: &LayoutParams,
    plates: &crate::config::PlateNames,
) -> Result<Vec<DeckRow>, MediaError> {
    if components.is_empty() {
        return Err(MediaError::InfeasibleInput(
            "media recipe needs at least one component".to_string(),
        ));
    }
    for (i, row) in targets.iter().enumerate() {
        if row.len() != components.len() {
            return Err(MediaError::InfeasibleInput(format!(
                "target row {i} has {} entries, recipe has {} components",
                row.len(),
                components.len()
            )));
        }
    }

    let n = components.len();
    let mut rows = Vec::new();

    let mut well = 1;
    for (index, component) in components.iter().enumerate() {
        let copies = 1 + params.extra_wells.get(&component.name).copied().unwrap_or(0);
        for _ in 0..copies {
            let mut concentrations = vec![0.0; n];
            concentrations[index] = component.master_concentration;
            rows.push(DeckRow {
                address: WellAddress::new(&plates.source, well),
                concentrations,
                volume: params.reagent_volume,
                is_target: false,
            });
            well += 1;
        }
    }

    for i in 1..=params.water_wells {
        rows.push(DeckRow {
            address: WellAddress::new(&plates.water, i),
            concentrations: vec![0.0; n],
            volume: params.water_volume,
            is_target: false,
        });
    }

    for (design, target) in targets.iter().enumerate() {
        let base = robolector_base_well(design as u32);
        for replicate in 0..params.replicates {
            rows.push(DeckRow {
                address: WellAddress::new(&plates.destination, base + 8 * replicate),
                concentrations: target.clone(),
                volume: params.well_volume,
                is_target: true,
            });
        }
    }

    Ok(rows)
}

/// The bench worksheet for loading the source plate by hand: every non-empty
/// source well with its reagent and its alphanumeric label.
pub fn reagent_worksheet(
    rows: &[DeckRow],
    components: &[Component],
    source_plate: &str,
) -> Vec<WorksheetEntry> {
    let mut entries = Vec::new();
    for row in rows {
        if row.address.plate != source_plate {
            continue;
        }
        for (i, &conc) in row.concentrations.iter().enumerate() {
            if conc != 0.0 {
                entries.push(WorksheetEntry {
                    plate: row.address.plate.clone(),
                    label: well_label(row.address.well),
                    well_number: row.address.well,
                    reagent: components[i].clone(),
                });
            }
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlateNames;
    use crate::deck::DeckState;

    fn recipe() -> Vec<MediaComponent> {
        vec![
            MediaComponent {
                name: "A".into(),
                master_concentration: 1000.0,
            },
            MediaComponent {
                name: "B".into(),
                master_concentration: 400.0,
            },
        ]
    }

    #[test]
    fn test_well_labels() {
        assert_eq!(well_label(1), "A1");
        assert_eq!(well_label(12), "A12");
        assert_eq!(well_label(13), "B1");
        assert_eq!(well_label(96), "H12");
    }

    #[test]
    fn test_robolector_pattern() {
        // Designs 0..7 take wells 1..8, design 8 jumps to well 25.
        assert_eq!(robolector_base_well(0), 1);
        assert_eq!(robolector_base_well(7), 8);
        assert_eq!(robolector_base_well(8), 25);
        assert_eq!(robolector_base_well(15), 32);
    }

    #[test]
    fn test_generated_deck_loads() {
        let params = LayoutParams {
            water_wells: 4,
            ..LayoutParams::default()
        };
        let rows = generate_initial_deck(
            &recipe(),
            &[vec![10.0, 4.0], vec![5.0, 2.0]],
            &params,
            &PlateNames::default(),
        )
        .unwrap();

        // 2 source + 4 water + 2 designs x 3 replicates.
        assert_eq!(rows.len(), 2 + 4 + 6);

        let (deck, goals) =
            DeckState::load(vec!["A".into(), "B".into()], &rows).unwrap();
        assert_eq!(goals.len(), 6);
        assert_eq!(deck.plate_well_count("src_plate"), 2);
        // Replicates of design 0 sit 8 wells apart.
        assert_eq!(goals[0].address.well, 1);
        assert_eq!(goals[1].address.well, 9);
        assert_eq!(goals[2].address.well, 17);
    }

    #[test]
    fn test_extra_wells_duplicate_source() {
        let mut params = LayoutParams::default();
        params.extra_wells.insert("A".into(), 2);
        let rows =
            generate_initial_deck(&recipe(), &[], &params, &PlateNames::default()).unwrap();
        let a_wells = rows
            .iter()
            .filter(|r| r.address.plate == "src_plate" && r.concentrations[0] > 0.0)
            .count();
        assert_eq!(a_wells, 3);
    }

    #[test]
    fn test_worksheet_lists_loaded_wells() {
        let rows =
            generate_initial_deck(&recipe(), &[], &LayoutParams::default(), &PlateNames::default())
                .unwrap();
        let sheet = reagent_worksheet(&rows, &["A".into(), "B".into()], "src_plate");
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet[0].label, "A1");
        assert_eq!(sheet[0].reagent, "A");
        assert_eq!(sheet[1].label, "A2");
    }

    #[test]
    fn test_misaligned_target_row_rejected() {
        let err = generate_initial_deck(
            &recipe(),
            &[vec![1.0]],
            &LayoutParams::default(),
            &PlateNames::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MediaError::InfeasibleInput(_)));
    }
}
