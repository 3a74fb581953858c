//! # contig-forge
//!
//! A de Bruijn graph short-read assembler. Reads are chopped into
//! canonical k-mers held in a concurrent vertex store; iterative cleaning
//! (tip erosion, dead-end trimming, low-coverage filtering, bubble
//! popping) tolerates sequencing error, and contigs fall out as maximal
//! non-branching paths.

pub mod assembly;
pub mod error;
pub mod graph;
pub mod io;
pub mod kmer;
pub mod utils;

// Re-export the types most callers touch.
pub use crate::assembly::{Assembler, AssemblySummary, Contig, ContigSink};
pub use crate::error::AssemblyError;
pub use crate::graph::KmerStore;
pub use crate::kmer::PackedKmer;
pub use crate::utils::configuration::{AssemblyOptions, ForgeConfig};
pub use crate::utils::CancelToken;

/// Result type used throughout the crate
pub type Result<T> = anyhow::Result<T>;

/// Error type used throughout the crate
pub type Error = anyhow::Error;
