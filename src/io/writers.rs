//! Output Sinks
//! ============
//!
//! Contigs are serialized as FASTA by a dedicated writer thread fed from a
//! bounded queue, so the walker never blocks on disk for long and the file
//! has exactly one owner. Bubble pairs and the optional DOT graph dump are
//! small and written inline.

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Sender};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crate::assembly::bubble::{BubbleRecord, BubbleSink};
use crate::assembly::walk::{Contig, ContigSink};
use crate::error::AssemblyError;
use crate::graph::KmerStore;
use crate::kmer::Dir;

const QUEUE_DEPTH: usize = 256;
const FASTA_WIDTH: usize = 60;

fn unwritable(path: &Path, source: std::io::Error) -> AssemblyError {
    AssemblyError::OutputUnwritable {
        path: path.to_path_buf(),
        source,
    }
}

/// FASTA contig sink backed by a writer thread. `finish` must be called to
/// flush and surface any write error.
#[derive(Debug)]
pub struct FastaContigWriter {
    tx: Option<Sender<Contig>>,
    worker: Option<JoinHandle<Result<()>>>,
}

impl FastaContigWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<FastaContigWriter> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| unwritable(&path, e))?;
        let (tx, rx) = bounded::<Contig>(QUEUE_DEPTH);
        let worker = std::thread::spawn(move || {
            let mut out = BufWriter::new(file);
            for contig in rx {
                write_fasta_contig(&mut out, &contig).map_err(|e| unwritable(&path, e))?;
            }
            out.flush().map_err(|e| unwritable(&path, e))?;
            Ok(())
        });
        Ok(FastaContigWriter {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    /// Close the queue, join the writer, and report its result.
    pub fn finish(mut self) -> Result<()> {
        drop(self.tx.take());
        match self.worker.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("contig writer thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl ContigSink for FastaContigWriter {
    fn write_contig(&mut self, contig: &Contig) -> Result<()> {
        match &self.tx {
            Some(tx) => tx
                .send(contig.clone())
                .map_err(|_| anyhow!("contig writer thread terminated early")),
            None => Err(anyhow!("contig writer already finished")),
        }
    }
}

impl Drop for FastaContigWriter {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn write_fasta_contig<W: Write>(out: &mut W, contig: &Contig) -> std::io::Result<()> {
    writeln!(out, ">{} {} {}", contig.id, contig.length, contig.coverage)?;
    for chunk in contig.sequence.as_bytes().chunks(FASTA_WIDTH) {
        out.write_all(chunk)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

/// Paired-path records for popped bubbles, one FASTA entry per branch.
pub struct FastaBubbleWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl FastaBubbleWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<FastaBubbleWriter> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| unwritable(&path, e))?;
        Ok(FastaBubbleWriter {
            path,
            out: BufWriter::new(file),
        })
    }

    pub fn finish(mut self) -> Result<()> {
        self.out.flush().map_err(|e| unwritable(&self.path, e))?;
        Ok(())
    }
}

impl BubbleSink for FastaBubbleWriter {
    fn write_bubble(&mut self, record: &BubbleRecord) -> Result<()> {
        let write = |out: &mut BufWriter<File>| -> std::io::Result<()> {
            writeln!(out, ">bubble{}a {} kept", record.id, record.kept.len())?;
            writeln!(out, "{}", record.kept)?;
            writeln!(
                out,
                ">bubble{}b {} popped dlen={}",
                record.id,
                record.popped.len(),
                record.length_difference
            )?;
            writeln!(out, "{}", record.popped)?;
            Ok(())
        };
        write(&mut self.out).map_err(|e| unwritable(&self.path, e))?;
        Ok(())
    }
}

/// Destination for the post-cleaning graph.
pub trait GraphSink {
    fn write_graph(&mut self, store: &KmerStore) -> Result<()>;
}

/// DOT dump: one node per oriented vertex word, one directed edge per
/// adjacency bit.
pub struct DotGraphWriter {
    path: PathBuf,
}

impl DotGraphWriter {
    pub fn new<P: AsRef<Path>>(path: P) -> DotGraphWriter {
        DotGraphWriter {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl GraphSink for DotGraphWriter {
    fn write_graph(&mut self, store: &KmerStore) -> Result<()> {
        let file = File::create(&self.path).map_err(|e| unwritable(&self.path, e))?;
        let mut out = BufWriter::new(file);
        write_dot(store, &mut out).map_err(|e| unwritable(&self.path, e))?;
        Ok(())
    }
}

pub fn write_dot<W: Write>(store: &KmerStore, out: &mut W) -> std::io::Result<()> {
    writeln!(out, "digraph adj {{")?;
    writeln!(out, "graph [k={}];", store.k())?;
    let mut keys = store.keys();
    keys.sort_unstable();
    for kmer in keys {
        let Some(v) = store.get(&kmer) else { continue };
        for orient in Dir::BOTH {
            let oriented = crate::graph::Oriented { kmer, orient };
            let raw = oriented.raw();
            for base in v.extensions(orient).iter() {
                writeln!(out, "\"{}\" -> \"{}\";", raw, raw.shift_left(base))?;
            }
        }
    }
    writeln!(out, "}}")
}
