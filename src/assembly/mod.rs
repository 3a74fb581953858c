//! Assembly Engine
//! ===============
//!
//! The graph-cleaning transformations and the contig walk, scheduled by
//! the pipeline: erode, trim, low-coverage filter (with one re-entry into
//! erosion), bubble popping, then extraction.

pub mod bubble;
pub mod coverage;
pub mod erode;
pub mod filter;
pub mod pipeline;
pub mod trim;
pub mod walk;

pub use bubble::{BubbleRecord, BubbleSink, NullBubbleSink, VecBubbleSink};
pub use pipeline::{Assembler, AssemblySummary, NoopTelemetry, TelemetrySink};
pub use walk::{Contig, ContigSink, VecContigSink};
