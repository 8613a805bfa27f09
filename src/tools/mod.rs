pub mod cross_reference;
pub mod mix_primers;
pub mod syn_dual_muts;
