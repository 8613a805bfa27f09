use anyhow::{Result, anyhow, bail};
use phf::phf_ordered_map;
use std::collections::HashMap;
use std::sync::LazyLock;

pub const STOP_CHAR: u8 = b'*';
pub const UNKNOWN_AA_CHAR: u8 = b'X';

pub type Codon = [u8; 3];

// Standard genetic code, in the order of the NCBI translation table layout.
static CODON_TABLE: phf::OrderedMap<&'static Codon, u8> = phf_ordered_map! {
    b"TTT" => b'F', b"TCT" => b'S', b"TAT" => b'Y', b"TGT" => b'C',
    b"TTC" => b'F', b"TCC" => b'S', b"TAC" => b'Y', b"TGC" => b'C',
    b"TTA" => b'L', b"TCA" => b'S', b"TAA" => b'*', b"TGA" => b'*',
    b"TTG" => b'L', b"TCG" => b'S', b"TAG" => b'*', b"TGG" => b'W',
    b"CTT" => b'L', b"CCT" => b'P', b"CAT" => b'H', b"CGT" => b'R',
    b"CTC" => b'L', b"CCC" => b'P', b"CAC" => b'H', b"CGC" => b'R',
    b"CTA" => b'L', b"CCA" => b'P', b"CAA" => b'Q', b"CGA" => b'R',
    b"CTG" => b'L', b"CCG" => b'P', b"CAG" => b'Q', b"CGG" => b'R',
    b"ATT" => b'I', b"ACT" => b'T', b"AAT" => b'N', b"AGT" => b'S',
    b"ATC" => b'I', b"ACC" => b'T', b"AAC" => b'N', b"AGC" => b'S',
    b"ATA" => b'I', b"ACA" => b'T', b"AAA" => b'K', b"AGA" => b'R',
    b"ATG" => b'M', b"ACG" => b'T', b"AAG" => b'K', b"AGG" => b'R',
    b"GTT" => b'V', b"GCT" => b'A', b"GAT" => b'D', b"GGT" => b'G',
    b"GTC" => b'V', b"GCC" => b'A', b"GAC" => b'D', b"GGC" => b'G',
    b"GTA" => b'V', b"GCA" => b'A', b"GAA" => b'E', b"GGA" => b'G',
    b"GTG" => b'V', b"GCG" => b'A', b"GAG" => b'E', b"GGG" => b'G',
};

/// Amino acid -> codons encoding it. Stop codons are left out, so a stop has no synonyms.
static AMINO_ACID_CODONS: LazyLock<HashMap<u8, Vec<Codon>>> = LazyLock::new(|| {
    let mut codons_by_aa: HashMap<u8, Vec<Codon>> = HashMap::new();
    for (codon, amino_acid) in CODON_TABLE.entries() {
        if *amino_acid == STOP_CHAR {
            continue;
        }
        codons_by_aa.entry(*amino_acid).or_default().push(**codon);
    }
    codons_by_aa
});

/// Uppercases a codon and checks that it is a triplet of A, C, G or T.
pub fn normalize_codon(codon: &[u8]) -> Result<Codon> {
    let triplet: Codon = codon.try_into().map_err(|_| {
        anyhow!(
            "Codon {:?} has a length of {}, expected 3",
            String::from_utf8_lossy(codon),
            codon.len()
        )
    })?;
    let triplet = triplet.map(|nt| nt.to_ascii_uppercase());

    if let Some(bad_nt) = triplet.iter().find(|nt| !b"ACGT".contains(*nt)) {
        bail!(
            "Codon {:?} contains the non-ACGT character {:?}",
            String::from_utf8_lossy(codon),
            *bad_nt as char
        );
    }
    Ok(triplet)
}

pub fn translate_codon(codon: &[u8]) -> Result<u8> {
    let triplet = normalize_codon(codon)?;
    CODON_TABLE
        .get(&triplet)
        .copied()
        .ok_or_else(|| anyhow!("Codon {:?} is not in the codon table", String::from_utf8_lossy(&triplet)))
}

/// Translates a coding sequence codon by codon. Stop codons are kept as `*` and translation
/// carries on past them.
pub fn translate(dna_seq: &[u8]) -> Result<Vec<u8>> {
    let codons = dna_seq.chunks_exact(3);
    if !codons.remainder().is_empty() {
        log::warn!(
            "Sequence length {} is not a multiple of 3, dropping the trailing {:?}",
            dna_seq.len(),
            String::from_utf8_lossy(codons.remainder())
        );
    }

    codons.map(translate_codon).collect()
}

/// Like `translate`, but codons that cannot be read (ambiguous bases) come out as `X` instead
/// of failing the whole sequence.
pub fn translate_lossy(dna_seq: &[u8]) -> Vec<u8> {
    dna_seq
        .chunks_exact(3)
        .map(|codon| translate_codon(codon).unwrap_or(UNKNOWN_AA_CHAR))
        .collect()
}

/// All codons for a one-letter amino acid, in codon table order. Unknown letters and stops
/// give an empty slice.
pub fn codons_for(amino_acid: u8) -> &'static [Codon] {
    AMINO_ACID_CODONS
        .get(&amino_acid.to_ascii_uppercase())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Returns the amino acid a codon encodes along with every other codon for it.
pub fn synonymous_codons(codon: &[u8]) -> Result<(u8, Vec<Codon>)> {
    let triplet = normalize_codon(codon)?;
    let amino_acid = translate_codon(&triplet)?;
    let alternatives = codons_for(amino_acid)
        .iter()
        .filter(|candidate| **candidate != triplet)
        .copied()
        .collect();

    Ok((amino_acid, alternatives))
}
