use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One liquid transfer for the Biomek: take `volume` µL from the source well and put it in the
/// destination well.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferInstruction {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Source Plate")]
    pub source_plate: String,
    #[serde(rename = "Source Well")]
    pub source_well: String,
    #[serde(rename = "Destination Plate")]
    pub destination_plate: String,
    #[serde(rename = "Destination Well")]
    pub destination_well: String,
    #[serde(rename = "Volume")]
    pub volume: f64,
}

/// The same instruction without its name, which is the layout the Biomek import expects.
#[derive(Debug, Serialize)]
struct BiomekTransfer<'a> {
    #[serde(rename = "Source Plate")]
    source_plate: &'a str,
    #[serde(rename = "Source Well")]
    source_well: &'a str,
    #[serde(rename = "Destination Plate")]
    destination_plate: &'a str,
    #[serde(rename = "Destination Well")]
    destination_well: &'a str,
    #[serde(rename = "Volume")]
    volume: f64,
}

impl<'a> From<&'a TransferInstruction> for BiomekTransfer<'a> {
    fn from(transfer: &'a TransferInstruction) -> Self {
        BiomekTransfer {
            source_plate: &transfer.source_plate,
            source_well: &transfer.source_well,
            destination_plate: &transfer.destination_plate,
            destination_well: &transfer.destination_well,
            volume: transfer.volume,
        }
    }
}

/// Output of a planner: the instructions and how many destination wells they occupy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferPlan {
    pub transfers: Vec<TransferInstruction>,
    pub wells_used: usize,
}

impl TransferPlan {
    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}

/// Volumes handed to the liquid handler must be finite and non-negative.
pub fn check_volume(volume: f64) -> Result<f64> {
    if !volume.is_finite() || volume < 0.0 {
        bail!("Transfer volume must be a non-negative number of uL, got {}", volume);
    }
    Ok(volume)
}

pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn write_transfers(output_file: &Path, transfers: &[TransferInstruction]) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_file)
        .with_context(|| format!("Could not open output file {:?}", output_file))?;
    for transfer in transfers {
        writer.serialize(transfer)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_biomek_transfers(output_file: &Path, transfers: &[TransferInstruction]) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_file)
        .with_context(|| format!("Could not open output file {:?}", output_file))?;
    for transfer in transfers {
        writer.serialize(BiomekTransfer::from(transfer))?;
    }
    writer.flush()?;
    Ok(())
}

/// `plan.csv` -> `plan_biomek.csv`, next to the original.
pub fn biomek_path(output_file: &Path) -> PathBuf {
    let stem = output_file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "transfers".to_string());
    output_file.with_file_name(format!("{stem}_biomek.csv"))
}

/// Writes both the named and the biomek layout of a stage.
pub fn write_stage(output_file: &Path, transfers: &[TransferInstruction]) -> Result<PathBuf> {
    let biomek_file = biomek_path(output_file);
    write_transfers(output_file, transfers)
        .with_context(|| format!("Failed to write transfers to {:?}", output_file))?;
    write_biomek_transfers(&biomek_file, transfers)
        .with_context(|| format!("Failed to write transfers to {:?}", biomek_file))?;
    Ok(biomek_file)
}
