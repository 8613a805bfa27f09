use crate::utils::fasta_utils::{load_single_fasta, write_fasta_sequences};
use crate::utils::translate::{Codon, synonymous_codons, translate_lossy};
use anyhow::{Context, Result, anyhow, bail};
use colored::Colorize;
use itertools::Itertools;
use std::ops::Range;
use std::path::Path;

const VERSION: &str = "1.0.0";

const START_MARKER: &[u8] = b"tatg";
const END_MARKER: &[u8] = b"gagacc";
/// The end marker only counts when it sits within this many bases of the end of the sequence.
const END_MARKER_WINDOW: usize = 30;

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// A wild-type sequence split into flanking prefix, in-frame coding region and suffix.
/// `prefix + coding + suffix` always gives back the whole (lowercased) sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct CodingFrame {
    sequence: Vec<u8>,
    coding: Range<usize>,
}

impl CodingFrame {
    /// The coding region starts at the `atg` of the first `tatg` and ends before a `gagacc`
    /// found in the last 30 bases, or at the end of the sequence. A trailing partial codon is
    /// left in the suffix.
    pub fn locate(sequence: &[u8]) -> Result<Self> {
        let sequence = sequence.to_ascii_lowercase();
        let marker = find_subsequence(&sequence, START_MARKER).ok_or_else(|| {
            anyhow!(
                "No {:?} found in the sequence, cannot establish the coding frame",
                String::from_utf8_lossy(START_MARKER)
            )
        })?;
        let coding_start = marker + 1;

        let search_from = sequence
            .len()
            .saturating_sub(END_MARKER_WINDOW)
            .max(coding_start + 1);
        let coding_end = sequence
            .get(search_from..)
            .and_then(|tail| find_subsequence(tail, END_MARKER))
            .map(|idx| search_from + idx)
            .unwrap_or(sequence.len());

        let in_frame = (coding_end - coding_start) / 3 * 3;
        Ok(CodingFrame {
            coding: coding_start..coding_start + in_frame,
            sequence,
        })
    }

    pub fn prefix(&self) -> &[u8] {
        &self.sequence[..self.coding.start]
    }

    pub fn coding(&self) -> &[u8] {
        &self.sequence[self.coding.clone()]
    }

    pub fn suffix(&self) -> &[u8] {
        &self.sequence[self.coding.end..]
    }

    pub fn num_codons(&self) -> usize {
        self.coding.len() / 3
    }

    /// Byte range of a 1-based residue position within the coding region.
    fn codon_range(&self, position: usize) -> Result<Range<usize>> {
        if position == 0 || position > self.num_codons() {
            bail!(
                "Position {} is out of range (the coding region has {} codons)",
                position,
                self.num_codons()
            );
        }
        let start = (position - 1) * 3;
        Ok(start..start + 3)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutantRecord {
    pub id: String,
    /// Full sequence with the two substituted codons in uppercase.
    pub sequence: Vec<u8>,
    /// Translation of the mutated coding region, stops included. Unreadable codons show as `X`.
    pub protein: Vec<u8>,
}

/// Every combination of synonymous codons at the two positions. Returns an error describing
/// why the pair cannot be mutated.
pub fn mutate_pair(
    frame: &CodingFrame,
    gene: &str,
    position1: usize,
    position2: usize,
) -> Result<Vec<MutantRecord>> {
    if position1 == position2 {
        bail!("Both positions point at residue {}", position1);
    }
    let range1 = frame.codon_range(position1)?;
    let range2 = frame.codon_range(position2)?;

    let coding = frame.coding().to_ascii_uppercase();
    let (aa1, synonyms1) = synonymous_codons(&coding[range1.clone()])
        .with_context(|| format!("Cannot read the wild-type codon at position {}", position1))?;
    let (aa2, synonyms2) = synonymous_codons(&coding[range2.clone()])
        .with_context(|| format!("Cannot read the wild-type codon at position {}", position2))?;

    if synonyms1.is_empty() || synonyms2.is_empty() {
        bail!("No synonymous codons to mutate");
    }

    let offset = frame.prefix().len();
    let mut mutants = Vec::with_capacity(synonyms1.len() * synonyms2.len());
    for (codon1, codon2) in synonyms1.iter().cartesian_product(synonyms2.iter()) {
        let mut mutant_coding = coding.clone();
        mutant_coding[range1.clone()].copy_from_slice(codon1);
        mutant_coding[range2.clone()].copy_from_slice(codon2);
        let protein = translate_lossy(&mutant_coding);

        let mut sequence = Vec::with_capacity(frame.sequence.len());
        sequence.extend_from_slice(frame.prefix());
        sequence.extend(mutant_coding.to_ascii_lowercase());
        sequence.extend_from_slice(frame.suffix());
        sequence[offset + range1.start..offset + range1.end].copy_from_slice(codon1);
        sequence[offset + range2.start..offset + range2.end].copy_from_slice(codon2);

        mutants.push(MutantRecord {
            id: mutant_id(gene, position1, aa1, codon1, position2, aa2, codon2),
            sequence,
            protein,
        });
    }
    Ok(mutants)
}

fn mutant_id(
    gene: &str,
    position1: usize,
    aa1: u8,
    codon1: &Codon,
    position2: usize,
    aa2: u8,
    codon2: &Codon,
) -> String {
    format!(
        "{}_{}{}_{}_{}{}_{}",
        gene,
        position1,
        aa1 as char,
        String::from_utf8_lossy(codon1),
        position2,
        aa2 as char,
        String::from_utf8_lossy(codon2)
    )
}

/// Mutants for all pairs, in pair order. Pairs that cannot be mutated are logged and skipped.
pub fn generate_mutants(
    frame: &CodingFrame,
    gene: &str,
    pairs: &[(usize, usize)],
) -> Vec<MutantRecord> {
    let mut mutants = Vec::new();
    for &(position1, position2) in pairs {
        match mutate_pair(frame, gene, position1, position2) {
            Ok(pair_mutants) => {
                log::info!(
                    "[{}, {}] -> {} mutants",
                    position1,
                    position2,
                    pair_mutants.len()
                );
                mutants.extend(pair_mutants);
            }
            Err(err) => log::warn!("Skipping pair [{}, {}]: {:#}", position1, position2, err),
        }
    }
    mutants
}

/// Reads a literal list of integer pairs such as `[(40, 52), (10, 12)]`.
pub fn parse_position_pairs(text: &str) -> Result<Vec<(usize, usize)>> {
    if let Some(bad_char) = text
        .chars()
        .find(|c| !(c.is_ascii_digit() || c.is_whitespace() || "[](),".contains(*c)))
    {
        bail!("Unexpected character {:?} in the position list", bad_char);
    }

    let positions: Vec<usize> = text
        .split(|c: char| !c.is_ascii_digit())
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<usize>()
                .with_context(|| format!("Invalid position {:?}", token))
        })
        .collect::<Result<_>>()?;

    if positions.len() % 2 != 0 {
        bail!(
            "The position list holds {} numbers, which cannot be split into pairs",
            positions.len()
        );
    }
    Ok(positions.into_iter().tuples().collect())
}

fn write_mutants_csv(output_file: &Path, mutants: &[MutantRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_file)
        .with_context(|| format!("Could not open output file {:?}", output_file))?;
    writer.write_record(["Name", "Sequence"])?;
    for mutant in mutants {
        writer.write_record([mutant.id.as_bytes(), mutant.sequence.as_slice()])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn run(
    fasta_file: &Path,
    positions_file: &Path,
    output_dir: &Path,
    gene_name: Option<&str>,
) -> Result<()> {
    log::info!(
        "{}",
        format!("This is {} version {}", "syn-dual-muts".italic(), VERSION)
            .bold()
            .bright_green()
    );

    log::info!("Reading position pairs from {:?}", positions_file);
    let positions_text = std::fs::read_to_string(positions_file)
        .with_context(|| format!("Could not read position file {:?}", positions_file))?;
    let pairs = parse_position_pairs(&positions_text)
        .with_context(|| format!("Failed to parse position file {:?}", positions_file))?;

    log::info!("Reading the wild-type sequence from {:?}", fasta_file);
    let (record_id, sequence) = load_single_fasta(fasta_file)?;
    let gene = gene_name.unwrap_or(&record_id);

    let frame = CodingFrame::locate(&sequence)
        .with_context(|| format!("Failed to find the coding region of {:?}", record_id))?;
    log::info!(
        "Coding region of {} covers {} codons after a {} nt prefix.",
        gene,
        frame.num_codons(),
        frame.prefix().len()
    );

    let mutants = generate_mutants(&frame, gene, &pairs);
    log::info!("Protein sequences of the double mutants:");
    for mutant in &mutants {
        log::info!("{} | Protein: {}", mutant.id, String::from_utf8_lossy(&mutant.protein));
    }

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Could not create output directory {:?}", output_dir))?;

    let fasta_output = output_dir.join("dual_mutants.fa");
    let records: Vec<(String, Vec<u8>)> = mutants
        .iter()
        .map(|mutant| (mutant.id.clone(), mutant.sequence.clone()))
        .collect();
    write_fasta_sequences(&fasta_output, &records)?;

    let csv_output = output_dir.join("dual_mutants.csv");
    write_mutants_csv(&csv_output, &mutants)?;

    log::info!(
        "Wrote {} mutants to {:?} and {:?}",
        mutants.len(),
        fasta_output,
        csv_output
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::translate::{translate, translate_codon};

    // ATG AAA CGT TAA behind a short flank.
    const WILD_TYPE: &[u8] = b"cctATGAAACGTTAA";

    #[test]
    fn frame_starts_after_marker_t() {
        let frame = CodingFrame::locate(WILD_TYPE).unwrap();
        assert_eq!(frame.prefix(), b"cct");
        assert_eq!(frame.coding(), b"atgaaacgttaa");
        assert!(frame.suffix().is_empty());
        assert_eq!(frame.num_codons(), 4);
    }

    #[test]
    fn frame_stops_at_end_marker() {
        let sequence = b"ggtatgaaacgtgccagagacctt";
        let frame = CodingFrame::locate(sequence).unwrap();
        assert_eq!(frame.prefix(), b"ggt");
        assert_eq!(frame.coding(), b"atgaaacgtgcc");
        assert_eq!(frame.suffix(), b"agagacctt");
        assert_eq!(
            frame.prefix().len() + frame.coding().len() + frame.suffix().len(),
            sequence.len()
        );
    }

    #[test]
    fn early_end_marker_is_ignored() {
        let mut sequence = b"ttatggagaccaaa".to_vec();
        sequence.extend(std::iter::repeat_n(b'a', 40));
        let frame = CodingFrame::locate(&sequence).unwrap();
        assert!(frame.suffix().len() < 3);
        assert_eq!(frame.coding().len() % 3, 0);
    }

    #[test]
    fn missing_start_marker_is_fatal() {
        assert!(CodingFrame::locate(b"ccccatgaaataa").is_err());
    }

    #[test]
    fn synonymous_pair_enumeration() {
        let frame = CodingFrame::locate(WILD_TYPE).unwrap();
        let mutants = mutate_pair(&frame, "ddlA", 2, 3).unwrap();
        assert_eq!(mutants.len(), 5);

        let ids: Vec<&str> = mutants.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "ddlA_2K_AAG_3R_CGC",
                "ddlA_2K_AAG_3R_CGA",
                "ddlA_2K_AAG_3R_CGG",
                "ddlA_2K_AAG_3R_AGA",
                "ddlA_2K_AAG_3R_AGG",
            ]
        );
        assert_eq!(mutants[0].sequence, b"cctatgAAGCGCtaa".to_vec());
        assert!(mutants.iter().all(|m| m.protein == b"MKR*".to_vec()));
        assert!(mutants.iter().all(|m| m.sequence.len() == WILD_TYPE.len()));
        assert!(mutants.iter().all(|m| &m.sequence[3..9] == b"atgAAG"));
    }

    #[test]
    fn untouched_codons_translate_the_same() {
        let frame = CodingFrame::locate(b"gtATGAAACGTGGCCTGTAA").unwrap();
        let wild_type = translate(frame.coding()).unwrap();
        for mutant in mutate_pair(&frame, "gene", 2, 5).unwrap() {
            let coding = &mutant.sequence[frame.prefix().len()..][..frame.coding().len()];
            let protein = translate(coding).unwrap();
            assert_eq!(protein, wild_type);
            for (idx, codon) in coding.chunks(3).enumerate() {
                if idx != 1 && idx != 4 {
                    assert_eq!(codon, &frame.coding()[idx * 3..idx * 3 + 3]);
                    assert_eq!(translate_codon(codon).unwrap(), wild_type[idx]);
                }
            }
        }
    }

    #[test]
    fn ambiguous_bases_elsewhere_keep_the_mutants() {
        let frame = CodingFrame::locate(b"cctATGAAACGTNNNTAA").unwrap();
        let mutants = mutate_pair(&frame, "ddlA", 2, 3).unwrap();
        assert_eq!(mutants.len(), 5);
        assert_eq!(mutants[0].sequence, b"cctatgAAGCGCnnntaa".to_vec());
        assert!(mutants.iter().all(|m| m.protein == b"MKRX*".to_vec()));
    }

    #[test]
    fn ambiguous_wild_type_codon_skips_pair() {
        let frame = CodingFrame::locate(b"cctATGAAACGTNNNTAA").unwrap();
        assert!(mutate_pair(&frame, "ddlA", 2, 4).is_err());
    }

    #[test]
    fn single_codon_residue_skips_pair() {
        let frame = CodingFrame::locate(WILD_TYPE).unwrap();
        assert!(mutate_pair(&frame, "ddlA", 1, 3).is_err());
        assert!(generate_mutants(&frame, "ddlA", &[(1, 3)]).is_empty());
    }

    #[test]
    fn out_of_range_skips_pair() {
        let frame = CodingFrame::locate(WILD_TYPE).unwrap();
        let err = mutate_pair(&frame, "ddlA", 2, 5).unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(mutate_pair(&frame, "ddlA", 0, 2).is_err());
    }

    #[test]
    fn skipped_pairs_do_not_stop_the_run() {
        let frame = CodingFrame::locate(WILD_TYPE).unwrap();
        let mutants = generate_mutants(&frame, "ddlA", &[(1, 2), (2, 9), (2, 2), (3, 2)]);
        assert_eq!(mutants.len(), 5);
        assert!(mutants.iter().all(|m| m.id.starts_with("ddlA_3R_")));
    }

    #[test]
    fn position_pairs_parse() {
        assert_eq!(
            parse_position_pairs("[(40, 52), (10,12)]\n").unwrap(),
            vec![(40, 52), (10, 12)]
        );
        assert_eq!(parse_position_pairs("[]").unwrap(), vec![]);
        assert!(parse_position_pairs("[(40, 52), (10,)]").is_err());
        assert!(parse_position_pairs("[(-4, 52)]").is_err());
    }

    #[test]
    fn run_writes_fasta_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let fasta_file = dir.path().join("ddlA_frag.fa");
        let positions_file = dir.path().join("dual_muts.txt");
        std::fs::write(&fasta_file, ">ddlA\ncctATGAAACGTTAA\n").unwrap();
        std::fs::write(&positions_file, "[(2, 3), (1, 3)]").unwrap();
        let output_dir = dir.path().join("outputs");

        run(&fasta_file, &positions_file, &output_dir, None).unwrap();

        let fasta = std::fs::read_to_string(output_dir.join("dual_mutants.fa")).unwrap();
        assert_eq!(fasta.matches('>').count(), 5);
        assert!(fasta.starts_with(">ddlA_2K_AAG_3R_CGC\ncctatgAAGCGCtaa\n"));

        let csv = std::fs::read_to_string(output_dir.join("dual_mutants.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "Name,Sequence");
        assert_eq!(lines[5], "ddlA_2K_AAG_3R_AGG,cctatgAAGAGGtaa");
    }

    #[test]
    fn run_fails_without_start_marker() {
        let dir = tempfile::tempdir().unwrap();
        let fasta_file = dir.path().join("gene.fa");
        let positions_file = dir.path().join("dual_muts.txt");
        std::fs::write(&fasta_file, ">gene\nccccATGAAACGTTAA\n").unwrap();
        std::fs::write(&positions_file, "[(2, 3)]").unwrap();
        let output_dir = dir.path().join("outputs");

        assert!(run(&fasta_file, &positions_file, &output_dir, Some("gene")).is_err());
        assert!(!output_dir.exists());
    }
}
