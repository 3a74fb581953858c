//! Sequence Sources
//! ================
//!
//! The assembly core consumes a source abstraction yielding id/sequence
//! records and never parses files itself. FASTA and FASTQ (plain or
//! gzipped) are wired up here through the `bio` readers, with the format
//! picked from the file extension.

use anyhow::{anyhow, Context, Result};
use flate2::read::MultiGzDecoder;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Records handed to the loader in one batch.
const BATCH: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    pub id: String,
    pub sequence: String,
    /// Phred qualities when the input format carries them.
    pub quality: Option<Vec<u8>>,
}

/// Yields reads in batches. Returns false once exhausted; a true return
/// guarantees at least one record was appended.
pub trait SequenceSource {
    fn read_batch(&mut self, out: &mut Vec<SequenceRecord>) -> Result<bool>;
}

/// In-memory source for tests and for feeding contigs between sweep
/// iterations without touching disk.
#[derive(Debug, Default)]
pub struct MemorySource {
    records: VecDeque<SequenceRecord>,
}

impl MemorySource {
    pub fn new(records: Vec<SequenceRecord>) -> MemorySource {
        MemorySource {
            records: records.into(),
        }
    }

    /// Anonymous reads from bare sequences.
    pub fn from_sequences<S: AsRef<str>>(seqs: &[S]) -> MemorySource {
        MemorySource::new(
            seqs.iter()
                .enumerate()
                .map(|(i, s)| SequenceRecord {
                    id: format!("read_{i}"),
                    sequence: s.as_ref().to_string(),
                    quality: None,
                })
                .collect(),
        )
    }
}

impl SequenceSource for MemorySource {
    fn read_batch(&mut self, out: &mut Vec<SequenceRecord>) -> Result<bool> {
        if self.records.is_empty() {
            return Ok(false);
        }
        for _ in 0..BATCH {
            match self.records.pop_front() {
                Some(rec) => out.push(rec),
                None => break,
            }
        }
        Ok(true)
    }
}

type DynRead = BufReader<Box<dyn Read>>;

pub struct FastaSource {
    records: bio::io::fasta::Records<DynRead>,
}

impl FastaSource {
    pub fn new(reader: Box<dyn Read>) -> FastaSource {
        FastaSource {
            records: bio::io::fasta::Reader::new(reader).records(),
        }
    }
}

impl SequenceSource for FastaSource {
    fn read_batch(&mut self, out: &mut Vec<SequenceRecord>) -> Result<bool> {
        let mut any = false;
        for _ in 0..BATCH {
            match self.records.next() {
                Some(rec) => {
                    let rec = rec.context("malformed FASTA record")?;
                    out.push(SequenceRecord {
                        id: rec.id().to_string(),
                        sequence: String::from_utf8_lossy(rec.seq()).into_owned(),
                        quality: None,
                    });
                    any = true;
                }
                None => break,
            }
        }
        Ok(any)
    }
}

pub struct FastqSource {
    records: bio::io::fastq::Records<DynRead>,
}

impl FastqSource {
    pub fn new(reader: Box<dyn Read>) -> FastqSource {
        FastqSource {
            records: bio::io::fastq::Reader::new(reader).records(),
        }
    }
}

impl SequenceSource for FastqSource {
    fn read_batch(&mut self, out: &mut Vec<SequenceRecord>) -> Result<bool> {
        let mut any = false;
        for _ in 0..BATCH {
            match self.records.next() {
                Some(rec) => {
                    let rec = rec.context("malformed FASTQ record")?;
                    out.push(SequenceRecord {
                        id: rec.id().to_string(),
                        sequence: String::from_utf8_lossy(rec.seq()).into_owned(),
                        quality: Some(rec.qual().to_vec()),
                    });
                    any = true;
                }
                None => break,
            }
        }
        Ok(any)
    }
}

/// Several sources drained in order; used when the command line names more
/// than one input file.
pub struct ChainSource {
    sources: VecDeque<Box<dyn SequenceSource>>,
}

impl ChainSource {
    pub fn new(sources: Vec<Box<dyn SequenceSource>>) -> ChainSource {
        ChainSource {
            sources: sources.into(),
        }
    }

    pub fn open<P: AsRef<Path>>(paths: &[P]) -> Result<ChainSource> {
        let sources = paths
            .iter()
            .map(|p| open_path(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(ChainSource::new(sources))
    }
}

impl SequenceSource for ChainSource {
    fn read_batch(&mut self, out: &mut Vec<SequenceRecord>) -> Result<bool> {
        while let Some(front) = self.sources.front_mut() {
            if front.read_batch(out)? {
                return Ok(true);
            }
            self.sources.pop_front();
        }
        Ok(false)
    }
}

/// Open a FASTA/FASTQ file, transparently un-gzipping `.gz`.
pub fn open_path(path: &Path) -> Result<Box<dyn SequenceSource>> {
    let file =
        File::open(path).with_context(|| format!("cannot open input `{}`", path.display()))?;

    let mut name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let reader: Box<dyn Read> = if name.ends_with(".gz") {
        name.truncate(name.len() - 3);
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };

    if name.ends_with(".fa") || name.ends_with(".fasta") || name.ends_with(".fna") {
        Ok(Box::new(FastaSource::new(reader)))
    } else if name.ends_with(".fq") || name.ends_with(".fastq") {
        Ok(Box::new(FastqSource::new(reader)))
    } else {
        Err(anyhow!(
            "unrecognized sequence format: `{}` (expected .fa/.fasta/.fna/.fq/.fastq, optionally .gz)",
            path.display()
        ))
    }
}
