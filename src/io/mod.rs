pub mod sequence;
pub mod writers;

pub use sequence::{open_path, ChainSource, MemorySource, SequenceRecord, SequenceSource};
pub use writers::{DotGraphWriter, FastaBubbleWriter, FastaContigWriter, GraphSink};
