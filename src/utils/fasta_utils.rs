use anyhow::{Context, Result, anyhow};
use bio::io::fasta;
use std::path::Path;

/// Records in file order, as (id, sequence).
pub type FastaRecords = Vec<(String, Vec<u8>)>;

pub fn load_fasta(file_path: &Path) -> Result<FastaRecords> {
    let reader = fasta::Reader::from_file(file_path)
        .with_context(|| format!("Could not open FASTA file {:?}", file_path))?;

    let mut records = FastaRecords::new();
    for result in reader.records() {
        let record = result.with_context(|| format!("Invalid FASTA record in {:?}", file_path))?;
        records.push((record.id().to_string(), record.seq().to_vec()));
    }
    Ok(records)
}

/// Reads the first record of a file that should hold a single sequence.
pub fn load_single_fasta(file_path: &Path) -> Result<(String, Vec<u8>)> {
    let mut records = load_fasta(file_path)?.into_iter();
    let first = records
        .next()
        .ok_or_else(|| anyhow!("No sequences found in {:?}", file_path))?;

    let extra = records.count();
    if extra > 0 {
        log::warn!(
            "{:?} holds {} more sequences, only {:?} is used",
            file_path,
            extra,
            first.0
        );
    }
    Ok(first)
}

pub fn write_fasta_sequences(output_file: &Path, sequences: &[(String, Vec<u8>)]) -> Result<()> {
    let mut writer = fasta::Writer::to_file(output_file)
        .with_context(|| format!("Could not open output file {:?}", output_file))?;

    for (seq_id, seq) in sequences {
        writer.write(seq_id, None, seq.as_slice())?;
    }
    writer.flush()?;

    Ok(())
}
