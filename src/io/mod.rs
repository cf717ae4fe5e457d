pub mod fasta;
pub mod lines;
pub mod sam;
