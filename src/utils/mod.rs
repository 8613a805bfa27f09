pub mod fasta_utils;
pub mod plate;
pub mod transfers;
pub mod translate;
pub mod wells;
