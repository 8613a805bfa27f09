use crate::utils::plate::{NMOLES_COLUMN, PlateTable, WELL_COLUMN, load_plate};
use crate::utils::transfers::{TransferInstruction, TransferPlan, check_volume, write_stage};
use crate::utils::translate::codons_for;
use crate::utils::wells::WellCursor;
use anyhow::{Context, Result, anyhow};
use colored::Colorize;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};

const VERSION: &str = "1.0.0";

/// µL per nmole used for reverse primers, the same ratio as the dissolve step.
const REVERSE_UL_PER_NMOLE: f64 = 10.0;

fn default_destination_plate() -> String {
    "SPreaction".to_string()
}

fn default_volume() -> f64 {
    5.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcePlate {
    pub label: String,
    pub path: PathBuf,
}

/// Everything the cross-reference needs: the mutants to look up and the labeled source plates
/// for each orientation.
#[derive(Debug, Clone, Deserialize)]
pub struct CrossReferenceConfig {
    pub mutants: Vec<String>,
    #[serde(default = "default_destination_plate")]
    pub destination_plate: String,
    #[serde(default = "default_volume")]
    pub volume: f64,
    pub forward: Vec<SourcePlate>,
    pub reverse: Vec<SourcePlate>,
}

/// A source plate after import, tagged with the label that ends up in `Source Plate`.
#[derive(Debug, Clone)]
pub struct LabeledPlate {
    pub label: String,
    pub table: PlateTable,
}

struct Candidate<'a> {
    name: &'a str,
    plate: &'a str,
    well: &'a str,
    nmoles: Option<&'a str>,
}

/// Rows of all plates of one orientation, in plate order then row order.
fn candidates(plates: &[LabeledPlate]) -> Result<Vec<Candidate<'_>>> {
    let mut candidates = Vec::new();
    for plate in plates {
        let table = &plate.table;
        let name_idx = table
            .name_column()
            .with_context(|| format!("Plate {:?} has no identifier column", plate.label))?;
        let well_idx = table
            .column_index(WELL_COLUMN)
            .ok_or_else(|| anyhow!("Plate {:?} has no {:?} column", plate.label, WELL_COLUMN))?;
        let nmoles_idx = table.column_index(NMOLES_COLUMN);

        for row in &table.rows {
            candidates.push(Candidate {
                name: row.get(name_idx).map(String::as_str).unwrap_or(""),
                plate: &plate.label,
                well: row.get(well_idx).map(String::as_str).unwrap_or(""),
                nmoles: nmoles_idx.and_then(|idx| row.get(idx)).map(String::as_str),
            });
        }
    }
    Ok(candidates)
}

/// Expands `40L` into `40L_CTT`, `40L_CTC`, ... for every codon of the trailing amino acid.
pub fn codon_combinations(mutants: &[String]) -> Vec<String> {
    let mut combinations = Vec::new();
    for mutant in mutants {
        let Some(amino_acid) = mutant.bytes().last() else {
            log::warn!("Skipping an empty mutant entry.");
            continue;
        };
        let codons = codons_for(amino_acid);
        if codons.is_empty() {
            log::warn!("No codons known for the amino acid of mutant {:?}.", mutant);
            continue;
        }
        combinations.extend(
            codons
                .iter()
                .map(|codon| format!("{}_{}", mutant, String::from_utf8_lossy(codon))),
        );
    }
    combinations
}

/// Finds every primer whose name carries one of the codon combinations and plans its transfer.
/// Forward and reverse matches each take wells from their own column-wise sequence. Forward
/// primers get the flat volume, reverse primers get nmoles x 10 µL.
pub fn create_transfer_plan(
    combinations: &[String],
    forward: &[LabeledPlate],
    reverse: &[LabeledPlate],
    destination_plate: &str,
    volume: f64,
) -> Result<TransferPlan> {
    let volume = check_volume(volume).context("Invalid forward primer volume")?;
    let forward_rows = candidates(forward)?;
    let reverse_rows = candidates(reverse)?;

    let mut forward_wells = WellCursor::new(destination_plate);
    let mut reverse_wells = WellCursor::new(destination_plate);
    let mut forward_transfers = Vec::new();
    let mut reverse_transfers = Vec::new();

    for combination in combinations {
        for row in forward_rows.iter().filter(|row| row.name.contains(combination.as_str())) {
            forward_transfers.push(TransferInstruction {
                name: row.name.to_string(),
                source_plate: row.plate.to_string(),
                source_well: row.well.to_string(),
                destination_plate: destination_plate.to_string(),
                destination_well: forward_wells
                    .next_well()
                    .with_context(|| format!("Forward primer {:?} has no well left", row.name))?,
                volume,
            });
        }
    }

    for combination in combinations {
        for row in reverse_rows.iter().filter(|row| row.name.contains(combination.as_str())) {
            let raw_nmoles = row.nmoles.unwrap_or("");
            let Some(nmoles) = raw_nmoles
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|nmoles| nmoles.is_finite() && *nmoles >= 0.0)
            else {
                log::warn!(
                    "Skipping reverse primer {:?} on {:?}: cannot use nmoles value {:?}",
                    row.name,
                    row.plate,
                    raw_nmoles
                );
                continue;
            };
            reverse_transfers.push(TransferInstruction {
                name: row.name.to_string(),
                source_plate: row.plate.to_string(),
                source_well: row.well.to_string(),
                destination_plate: destination_plate.to_string(),
                destination_well: reverse_wells
                    .next_well()
                    .with_context(|| format!("Reverse primer {:?} has no well left", row.name))?,
                volume: nmoles * REVERSE_UL_PER_NMOLE,
            });
        }
    }

    let wells_used = forward_wells.used().max(reverse_wells.used());
    forward_transfers.extend(reverse_transfers);

    Ok(TransferPlan {
        transfers: forward_transfers,
        wells_used,
    })
}

pub fn load_config(config_file: &Path) -> Result<CrossReferenceConfig> {
    let reader = std::io::BufReader::new(
        File::open(config_file)
            .with_context(|| format!("Could not open config file {:?}", config_file))?,
    );
    serde_json::from_reader(reader)
        .with_context(|| format!("Failed to parse config file {:?}", config_file))
}

/// Plate paths in the config are taken relative to the config file.
fn load_plates(sources: &[SourcePlate], base_dir: &Path) -> Result<Vec<LabeledPlate>> {
    sources
        .iter()
        .map(|source| {
            let path = base_dir.join(&source.path);
            log::info!("Reading plate {:?} from {:?}", source.label, path);
            Ok(LabeledPlate {
                label: source.label.clone(),
                table: load_plate(&path)?,
            })
        })
        .collect()
}

pub fn run(config_file: &Path, output_file: &Path) -> Result<()> {
    log::info!(
        "{}",
        format!("This is {} version {}", "cross-reference".italic(), VERSION)
            .bold()
            .bright_purple()
    );

    let config = load_config(config_file)?;
    let base_dir = config_file.parent().unwrap_or_else(|| Path::new(""));
    let forward = load_plates(&config.forward, base_dir)?;
    let reverse = load_plates(&config.reverse, base_dir)?;

    let combinations = codon_combinations(&config.mutants);
    log::info!("Codon combinations: {:?}", combinations);

    let plan = create_transfer_plan(
        &combinations,
        &forward,
        &reverse,
        &config.destination_plate,
        config.volume,
    )?;
    log::info!(
        "Planned {} transfers into {:?}.",
        plan.len(),
        config.destination_plate
    );
    if plan.is_empty() {
        log::warn!("No primer in the source plates matched any codon combination.");
    }

    if let Some(parent) = output_file.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create output directory {:?}", parent))?;
    }
    let biomek_file = write_stage(output_file, &plan.transfers)?;
    log::info!("Files available in: {:?} and {:?}", output_file, biomek_file);

    log::info!("Done. Exiting.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plate(label: &str, rows: &[(&str, &str, &str)]) -> LabeledPlate {
        LabeledPlate {
            label: label.to_string(),
            table: PlateTable::new(
                vec!["Name".to_string(), "Well Position".to_string(), "nmoles".to_string()],
                rows.iter()
                    .map(|(name, well, nmoles)| {
                        vec![name.to_string(), well.to_string(), nmoles.to_string()]
                    })
                    .collect(),
            ),
        }
    }

    #[test]
    fn combinations_cover_every_codon() {
        let combinations = codon_combinations(&["40L".to_string(), "52W".to_string()]);
        assert_eq!(combinations.len(), 7);
        assert_eq!(combinations[0], "40L_TTA");
        assert_eq!(combinations[6], "52W_TGG");
    }

    #[test]
    fn unknown_amino_acid_expands_to_nothing() {
        assert!(codon_combinations(&["40Z".to_string(), String::new()]).is_empty());
    }

    #[test]
    fn forward_and_reverse_use_their_own_wells() {
        let forward = vec![
            plate("IDT_OVP", &[("Fw_40W_TGG", "A1", "2.0")]),
            plate("Fw_5inter", &[("Fw_inter_40W_TGG", "C3", "1.0")]),
        ];
        let reverse = vec![plate("IDT_OVP", &[("Rv_40W_TGG", "B1", "2.34")])];
        let combinations = codon_combinations(&["40W".to_string()]);

        let plan = create_transfer_plan(&combinations, &forward, &reverse, "SPreaction", 5.0).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.wells_used, 2);

        let fw = &plan.transfers[0];
        assert_eq!((fw.source_plate.as_str(), fw.destination_well.as_str()), ("IDT_OVP", "A1"));
        assert_eq!(fw.volume, 5.0);
        let fw_inter = &plan.transfers[1];
        assert_eq!(fw_inter.source_plate, "Fw_5inter");
        assert_eq!(fw_inter.source_well, "C3");
        assert_eq!(fw_inter.destination_well, "B1");

        let rv = &plan.transfers[2];
        assert_eq!(rv.destination_well, "A1");
        assert!((rv.volume - 23.4).abs() < 1e-9);
    }

    #[test]
    fn every_matching_row_gets_a_transfer() {
        let forward = vec![plate(
            "IDT_OVP",
            &[("Fw_40W_TGG_a", "A1", "1"), ("Fw_40W_TGG_b", "A2", "1"), ("Fw_52S_TCT", "A3", "1")],
        )];
        let combinations = codon_combinations(&["40W".to_string(), "99M".to_string()]);
        let plan = create_transfer_plan(&combinations, &forward, &[], "SPreaction", 5.0).unwrap();
        let names: Vec<&str> = plan.transfers.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Fw_40W_TGG_a", "Fw_40W_TGG_b"]);
    }

    #[test]
    fn reverse_rows_with_unusable_nmoles_are_skipped() {
        let reverse = vec![plate(
            "IDT_OVP",
            &[
                ("Rv_40W_TGG_a", "A1", "-2.5"),
                ("Rv_40W_TGG_b", "A2", "NaN"),
                ("Rv_40W_TGG_c", "A3", "inf"),
                ("Rv_40W_TGG_d", "A4", "1.5"),
            ],
        )];
        let combinations = codon_combinations(&["40W".to_string()]);
        let plan = create_transfer_plan(&combinations, &[], &reverse, "SPreaction", 5.0).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.transfers[0].name, "Rv_40W_TGG_d");
        assert_eq!(plan.transfers[0].destination_well, "A1");
        assert_eq!(plan.transfers[0].volume, 15.0);
    }

    #[test]
    fn flat_volume_must_be_usable() {
        let forward = vec![plate("IDT_OVP", &[("Fw_40W_TGG", "A1", "2.0")])];
        let combinations = codon_combinations(&["40W".to_string()]);
        for volume in [-5.0, f64::NAN, f64::INFINITY] {
            assert!(create_transfer_plan(&combinations, &forward, &[], "SPreaction", volume).is_err());
        }
    }

    #[test]
    fn too_many_matches_is_an_error() {
        let rows: Vec<(String, &str, &str)> =
            (0..97).map(|i| (format!("Fw_40W_TGG_{i}"), "A1", "1")).collect();
        let rows: Vec<(&str, &str, &str)> = rows.iter().map(|(n, w, m)| (n.as_str(), *w, *m)).collect();
        let forward = vec![plate("IDT_OVP", &rows)];
        let combinations = codon_combinations(&["40W".to_string()]);
        assert!(create_transfer_plan(&combinations, &forward, &[], "SPreaction", 5.0).is_err());
    }

    #[test]
    fn run_reads_config_and_writes_plan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fw.csv"), "Name,Well Position,nmoles\nFw_40W_TGG,A01,2\n").unwrap();
        std::fs::write(dir.path().join("rv.csv"), "Name,Well Position,nmoles\nRv_40W_TGG,B01,3\n").unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"mutants": ["40W"], "forward": [{"label": "IDT_OVP", "path": "fw.csv"}], "reverse": [{"label": "IDT_OVP", "path": "rv.csv"}]}"#,
        )
        .unwrap();
        let output_file = dir.path().join("out").join("sp_reaction.csv");

        run(&dir.path().join("config.json"), &output_file).unwrap();

        let written = std::fs::read_to_string(&output_file).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[1], "Fw_40W_TGG,IDT_OVP,A1,SPreaction,A1,5.0");
        assert_eq!(lines[2], "Rv_40W_TGG,IDT_OVP,B1,SPreaction,A1,30.0");
        assert!(dir.path().join("out").join("sp_reaction_biomek.csv").exists());
    }
}
