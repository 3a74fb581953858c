//! Contig Extraction
//! =================
//!
//! Marks ambiguous vertices as contig boundaries, then walks maximal
//! non-branching paths. A walk extends while the next vertex is present,
//! unconsumed, and unambiguous; an ambiguous vertex terminates the walk
//! before being consumed and later seeds its own single-vertex contig.

use anyhow::Result;
use rayon::prelude::*;
use tracing::debug;

use crate::error::AssemblyError;
use crate::graph::{KmerStore, Oriented, VertexFlag, VertexRecord};
use crate::kmer::{Dir, PackedKmer};
use crate::utils::CancelToken;

/// One assembled contig: the decoded path sequence and the sum of the
/// multiplicities of its vertices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contig {
    pub id: usize,
    pub sequence: String,
    pub length: usize,
    pub coverage: u64,
    /// Vertices on the path; `coverage / kmer_count` is the mean
    /// multiplicity.
    pub kmer_count: usize,
}

impl Contig {
    pub fn mean_coverage(&self) -> f64 {
        if self.kmer_count == 0 {
            0.0
        } else {
            self.coverage as f64 / self.kmer_count as f64
        }
    }
}

/// Destination for assembled contigs; wired to a FASTA writer in
/// production and to an in-memory vector in tests.
pub trait ContigSink {
    fn write_contig(&mut self, contig: &Contig) -> Result<()>;
}

/// Collects contigs in memory.
#[derive(Debug, Default)]
pub struct VecContigSink {
    pub contigs: Vec<Contig>,
}

impl ContigSink for VecContigSink {
    fn write_contig(&mut self, contig: &Contig) -> Result<()> {
        self.contigs.push(contig.clone());
        Ok(())
    }
}

/// Set the boundary mark on every vertex with out-degree > 1, per
/// direction. Returns the number of vertices marked.
pub fn mark_ambiguous(store: &KmerStore) -> usize {
    let keys = store.keys();
    keys.par_iter()
        .map(|kmer| {
            let Some(v) = store.get(kmer) else { return 0 };
            let mut marked = 0;
            for dir in Dir::BOTH {
                if v.degree(dir) > 1 {
                    store.mark(kmer, VertexFlag::mark_for(dir));
                    marked = 1;
                }
            }
            marked
        })
        .sum()
}

pub(crate) fn is_boundary(v: &VertexRecord) -> bool {
    v.has_flag(VertexFlag::MarkSense) || v.has_flag(VertexFlag::MarkAntisense)
}

/// The next vertex of a walk, or None at a contig boundary: absent,
/// already consumed, ambiguous, or not uniquely reachable.
fn next_vertex(store: &KmerStore, cur: &Oriented) -> Option<Oriented> {
    let rec = store.get(&cur.kmer)?;
    let base = rec.extensions(cur.orient).single()?;
    let next = cur.step(base);
    let nrec = store.get(&next.kmer)?;
    if is_boundary(&nrec) || nrec.has_flag(VertexFlag::Seen) {
        return None;
    }
    Some(next)
}

/// Trace the maximal unambiguous path through `seed` in both directions,
/// consuming every vertex on it. The caller guarantees the seed itself is
/// live and unmarked.
pub(crate) fn trace_path(store: &KmerStore, seed: PackedKmer) -> Vec<Oriented> {
    store.mark(&seed, VertexFlag::Seen);
    let start = Oriented {
        kmer: seed,
        orient: Dir::Sense,
    };

    let mut forward = Vec::new();
    let mut cur = start;
    while let Some(next) = next_vertex(store, &cur) {
        store.mark(&next.kmer, VertexFlag::Seen);
        forward.push(next);
        cur = next;
    }

    let mut backward = Vec::new();
    let mut cur = start.flip();
    while let Some(next) = next_vertex(store, &cur) {
        store.mark(&next.kmer, VertexFlag::Seen);
        backward.push(next);
        cur = next;
    }

    let mut path: Vec<Oriented> = backward.iter().rev().map(Oriented::flip).collect();
    path.push(start);
    path.extend(forward);
    path
}

pub(crate) fn path_coverage(store: &KmerStore, path: &[Oriented]) -> u64 {
    path.iter()
        .filter_map(|o| store.get(&o.kmer))
        .map(|v| v.coverage())
        .sum()
}

fn build_contig(store: &KmerStore, id: usize, path: &[Oriented]) -> Contig {
    let mut sequence = path[0].raw().decode();
    for o in &path[1..] {
        sequence.push(o.raw().last_base().to_ascii() as char);
    }
    let coverage = path_coverage(store, path);
    Contig {
        id,
        length: sequence.len(),
        sequence,
        coverage,
        kmer_count: path.len(),
    }
}

/// Walk every contig and feed it to the sink. Preconditions: adjacency is
/// current and `mark_ambiguous` has run. Returns (contig count, summed
/// coverage); zero contigs is fatal.
pub fn extract_contigs(
    store: &KmerStore,
    sink: &mut dyn ContigSink,
    cancel: &CancelToken,
) -> Result<(usize, u64)> {
    let mut keys = store.keys();
    // Contig identity must not depend on hash iteration order.
    keys.sort_unstable();

    let mut count = 0;
    let mut total_coverage = 0u64;
    for kmer in keys {
        cancel.checkpoint()?;
        let Some(v) = store.get(&kmer) else { continue };
        if v.has_flag(VertexFlag::Seen) {
            continue;
        }
        let path = if is_boundary(&v) {
            store.mark(&kmer, VertexFlag::Seen);
            vec![Oriented {
                kmer,
                orient: Dir::Sense,
            }]
        } else {
            trace_path(store, kmer)
        };
        let contig = build_contig(store, count, &path);
        total_coverage += contig.coverage;
        sink.write_contig(&contig)?;
        count += 1;
    }
    debug!(count, total_coverage, "contig walk complete");
    if count == 0 {
        return Err(AssemblyError::AssemblyEmpty.into());
    }
    Ok((count, total_coverage))
}
