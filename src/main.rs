mod tools;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tools::mix_primers::MixOptions;

#[derive(Parser)]
#[command(name = "double-syn-muts")]
#[command(version)]
#[command(about = "Plan Biomek i7 primer transfers and synonymous double mutants for overlap-extension assembly")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dissolve, dilute and combine the fragment primers of an ordered plate
    MixPrimers {
        /// Path to the plate specification CSV exported by the vendor
        #[arg(short = 'p', long)]
        plate_file: PathBuf,

        /// Directory to write the transfer CSV files to
        #[arg(short = 'o', long, default_value = "outputs")]
        output_dir: PathBuf,

        #[command(flatten)]
        options: MixOptions,
    },
    /// Collect the primers carrying each codon combination from labeled source plates
    CrossReference {
        /// JSON file listing the mutants and the forward and reverse source plates
        #[arg(short = 'c', long)]
        config: PathBuf,

        /// Where to write the transfer CSV. A biomek variant is written next to it.
        #[arg(short = 'o', long)]
        output_file: PathBuf,
    },
    /// Enumerate synonymous codon substitutions at pairs of residue positions
    SynDualMuts {
        /// FASTA file holding the wild-type sequence. Only the first record is used.
        #[arg(short = 'f', long)]
        fasta_file: PathBuf,

        /// Text file with a list of position pairs, e.g. [(40, 52), (10, 12)]
        #[arg(short = 'p', long)]
        positions_file: PathBuf,

        /// Directory to write dual_mutants.fa and dual_mutants.csv to
        #[arg(short = 'o', long, default_value = "outputs")]
        output_dir: PathBuf,

        /// Gene name used in the mutant identifiers. Defaults to the FASTA record id.
        #[arg(short = 'n', long)]
        gene_name: Option<String>,
    },
}

fn main() -> Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()?;

    let cli = Cli::parse();

    match &cli.command {
        Commands::MixPrimers {
            plate_file,
            output_dir,
            options,
        } => tools::mix_primers::run(plate_file, output_dir, options)?,
        Commands::CrossReference {
            config,
            output_file,
        } => tools::cross_reference::run(config, output_file)?,
        Commands::SynDualMuts {
            fasta_file,
            positions_file,
            output_dir,
            gene_name,
        } => tools::syn_dual_muts::run(
            fasta_file,
            positions_file,
            output_dir,
            gene_name.as_deref(),
        )?,
    }
    Ok(())
}
