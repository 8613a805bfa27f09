use crate::utils::plate::{FragmentOrientation, PrimerRecord, filter_fragment_primers, load_plate};
use crate::utils::transfers::{
    TransferInstruction, TransferPlan, check_volume, round_one_decimal, write_stage,
};
use crate::utils::wells::{PLATE_WELLS, WellCursor};
use anyhow::{Context, Result, bail};
use colored::Colorize;
use std::fmt;
use std::path::Path;

const VERSION: &str = "1.0.0";

pub const WATER_PLATE: &str = "Water";
pub const STOCK_PLATE: &str = "stock_primers";
pub const WORKING_PLATE: &str = "working_primers";

/// nmol / µL -> µM. Dissolving n nmoles in `1000 / c` µL per nmole gives a c µM stock.
const UM_PER_NMOLE_PER_UL: f64 = 1000.0;

pub const FIRST_FRAGMENT_TOKEN: &str = "Fw_Frag_gg_2_";
pub const SECOND_FRAGMENT_TOKEN: &str = "Rv_Frag_gg_1_";

#[derive(clap::Args, Clone, Debug)]
pub struct MixOptions {
    /// Concentration of the working solution, in µM
    #[arg(long, default_value_t = 10.0)]
    pub working_conc: f64,

    /// Final volume of the working solution, in µL
    #[arg(long, default_value_t = 200.0)]
    pub working_volume: f64,

    /// Concentration of the dissolved stock, in µM. Sets both the water added per nmole and
    /// the dilution into working primers.
    #[arg(long, default_value_t = 100.0)]
    pub stock_conc: f64,

    /// Name of the plate the fragment pairs are combined in
    #[arg(long, default_value_t = String::from("comb_frags_gg"))]
    pub combine_plate: String,

    /// Volume of each fragment added to a combination well, in µL
    #[arg(long, default_value_t = 5.0)]
    pub combine_volume: f64,
}

impl Default for MixOptions {
    fn default() -> Self {
        MixOptions {
            working_conc: 10.0,
            working_volume: 200.0,
            stock_conc: 100.0,
            combine_plate: "comb_frags_gg".to_string(),
            combine_volume: 5.0,
        }
    }
}

impl fmt::Display for MixOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " - working concentration: {} uM", self.working_conc)?;
        writeln!(f, " - working volume: {} uL", self.working_volume)?;
        writeln!(f, " - stock concentration: {} uM", self.stock_conc)?;
        writeln!(f, " - combine plate: {}", self.combine_plate)?;
        write!(f, " - combine volume: {} uL", self.combine_volume)
    }
}

/// Water needed to bring every primer to a `stock_conc` µM stock in its own well (10 µL per
/// nmole for 100 µM). Water comes from a separate plate, one well per primer.
pub fn dissolve_water(primers: &[PrimerRecord], stock_conc: f64) -> Result<TransferPlan> {
    if !stock_conc.is_finite() || stock_conc <= 0.0 {
        bail!("The stock concentration must be positive, got {}", stock_conc);
    }
    let water_per_nmole = UM_PER_NMOLE_PER_UL / stock_conc;

    let mut water_wells = WellCursor::new(WATER_PLATE);
    let mut transfers = Vec::with_capacity(primers.len());

    for primer in primers {
        transfers.push(TransferInstruction {
            name: primer.name.clone(),
            source_plate: WATER_PLATE.to_string(),
            source_well: water_wells
                .next_well()
                .with_context(|| format!("No water well left for primer {:?}", primer.name))?,
            destination_plate: STOCK_PLATE.to_string(),
            destination_well: primer.well.clone(),
            volume: round_one_decimal(primer.nmoles * water_per_nmole),
        });
    }

    Ok(TransferPlan {
        transfers,
        wells_used: water_wells.used(),
    })
}

/// C1V1 = C2V2: the volume of stock that gives `conc` in `vol_final`. The rest of the volume is
/// diluent, added outside of this plan.
pub fn create_working_concentration(
    stock: &[TransferInstruction],
    conc: f64,
    vol_final: f64,
    init_conc: f64,
) -> Result<TransferPlan> {
    if !init_conc.is_finite() || init_conc <= 0.0 {
        bail!("The stock concentration must be positive, got {}", init_conc);
    }
    let volume = check_volume(round_one_decimal(conc * vol_final / init_conc)).with_context(|| {
        format!("A working concentration of {conc} uM in {vol_final} uL cannot be pipetted")
    })?;

    let mut destination_wells = WellCursor::new(WORKING_PLATE);
    let mut transfers = Vec::with_capacity(stock.len());

    for row in stock {
        transfers.push(TransferInstruction {
            name: row.name.clone(),
            source_plate: row.destination_plate.clone(),
            source_well: row.destination_well.clone(),
            destination_plate: WORKING_PLATE.to_string(),
            destination_well: destination_wells.next_well()?,
            volume,
        });
    }

    Ok(TransferPlan {
        transfers,
        wells_used: destination_wells.used(),
    })
}

/// Pairs every first-fragment primer with every second-fragment primer in a well of its own.
/// Each pair gives two instructions into the same well.
pub fn combine_fw_rv_primers(
    working: &[TransferInstruction],
    destination_plate: &str,
    volume: f64,
) -> Result<TransferPlan> {
    let volume = check_volume(volume).context("Invalid combine volume")?;
    let first_fragments: Vec<&TransferInstruction> = working
        .iter()
        .filter(|row| row.name.contains(FIRST_FRAGMENT_TOKEN))
        .collect();
    let second_fragments: Vec<&TransferInstruction> = working
        .iter()
        .filter(|row| row.name.contains(SECOND_FRAGMENT_TOKEN))
        .collect();

    let combinations = first_fragments.len() * second_fragments.len();
    if combinations > PLATE_WELLS {
        bail!(
            "Not enough destination wells for all combinations: {} first x {} second fragments need {} wells, the plate has {}",
            first_fragments.len(),
            second_fragments.len(),
            combinations,
            PLATE_WELLS
        );
    }

    let mut destination_wells = WellCursor::new(destination_plate);
    let mut transfers = Vec::with_capacity(combinations * 2);

    for second in &second_fragments {
        for first in &first_fragments {
            let destination_well = destination_wells.next_well()?;
            let combined_name = format!("{}__{}", first.name, second.name);

            for source in [first, second] {
                transfers.push(TransferInstruction {
                    name: combined_name.clone(),
                    source_plate: source.destination_plate.clone(),
                    source_well: source.destination_well.clone(),
                    destination_plate: destination_plate.to_string(),
                    destination_well: destination_well.clone(),
                    volume,
                });
            }
        }
    }

    Ok(TransferPlan {
        transfers,
        wells_used: destination_wells.used(),
    })
}

pub fn run(plate_file: &Path, output_dir: &Path, options: &MixOptions) -> Result<()> {
    log::info!(
        "{}",
        format!("This is {} version {}", "mix-primers".italic(), VERSION)
            .bold()
            .bright_purple()
    );
    log::info!("Command was run with the following options:\n{}", options);

    log::info!("Reading plate from {:?}", plate_file);
    let plate = load_plate(plate_file)?;
    log::info!("Loaded {} rows from the plate.", plate.len());

    let forward = filter_fragment_primers(&plate, FragmentOrientation::Forward)?;
    let reverse = filter_fragment_primers(&plate, FragmentOrientation::Reverse)?;
    log::info!(
        "Found {} forward and {} reverse fragment primers.",
        forward.len(),
        reverse.len()
    );
    if forward.is_empty() || reverse.is_empty() {
        log::warn!("One orientation has no fragment primers, so no fragments will be combined.");
    }
    let primers = forward.concat(&reverse).primer_records()?;

    // Plan every stage before writing anything, so a failure leaves no partial output behind.
    let stock = dissolve_water(&primers, options.stock_conc)?;
    log::info!(
        "Planned {} transfers to make {} uM stock primers.",
        stock.len(),
        options.stock_conc
    );

    let working = create_working_concentration(
        &stock.transfers,
        options.working_conc,
        options.working_volume,
        options.stock_conc,
    )?;
    log::info!(
        "Planned {} transfers for the {} uM working primers.",
        working.len(),
        options.working_conc
    );

    let combined =
        combine_fw_rv_primers(&working.transfers, &options.combine_plate, options.combine_volume)?;
    log::info!(
        "Planned {} fragment combinations ({} transfers).",
        combined.wells_used,
        combined.len()
    );

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Could not create output directory {:?}", output_dir))?;

    for (file_name, plan) in [
        ("stock_primers.csv", &stock),
        ("working_primers.csv", &working),
        ("combined_frags.csv", &combined),
    ] {
        let output_file = output_dir.join(file_name);
        let biomek_file = write_stage(&output_file, &plan.transfers)?;
        log::info!("Files available in: {:?} and {:?}", output_file, biomek_file);
    }

    log::info!("Done. Exiting.");
    Ok(())
}
