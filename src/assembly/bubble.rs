//! Bubble Popping
//! ==============
//!
//! A bubble is a pair of internally disjoint simple paths between a
//! splitting source and a merging sink, the classic signature of a
//! sequencing error or a heterozygous site. From every ambiguous vertex
//! each branch is walked as a simple path up to the length bound; branches
//! that meet at the same sink are resolved by keeping the one with higher
//! mean coverage (ties go to the lexicographically smaller sequence) and
//! tombstoning the other's interior, which also erases the edge out of the
//! source and into the sink.
//!
//! Branches that re-enter themselves, dead-end, split again, or exceed the
//! bound are not poppable and are left untouched.

use anyhow::Result;
use rayon::prelude::*;
use tracing::debug;

use crate::graph::{adjacency, KmerStore, Oriented};
use crate::kmer::{Base, Dir, PackedKmer};
use crate::utils::CancelToken;

/// One popped bubble: both branch sequences (source and sink included) and
/// the difference of their interior lengths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BubbleRecord {
    pub id: usize,
    pub kept: String,
    pub popped: String,
    pub length_difference: usize,
}

/// Destination for popped-bubble records.
pub trait BubbleSink {
    fn write_bubble(&mut self, record: &BubbleRecord) -> Result<()>;
}

/// Discards every record.
#[derive(Debug, Default)]
pub struct NullBubbleSink;

impl BubbleSink for NullBubbleSink {
    fn write_bubble(&mut self, _record: &BubbleRecord) -> Result<()> {
        Ok(())
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct VecBubbleSink {
    pub records: Vec<BubbleRecord>,
}

impl BubbleSink for VecBubbleSink {
    fn write_bubble(&mut self, record: &BubbleRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

struct Branch {
    sink: Oriented,
    interior: Vec<Oriented>,
    coverage: u64,
}

impl Branch {
    fn sequence(&self, source: &Oriented) -> String {
        let mut seq = source.raw().decode();
        for o in &self.interior {
            seq.push(o.raw().last_base().to_ascii() as char);
        }
        seq.push(self.sink.raw().last_base().to_ascii() as char);
        seq
    }

    /// Compare mean coverages exactly: cov_a/len_a vs cov_b/len_b by
    /// cross-multiplication, so ties are ties regardless of float rounding.
    fn mean_cmp(&self, other: &Branch) -> std::cmp::Ordering {
        let lhs = self.coverage as u128 * other.interior.len() as u128;
        let rhs = other.coverage as u128 * self.interior.len() as u128;
        lhs.cmp(&rhs)
    }
}

/// Pop every bubble within the bound. Candidate sources are collected in
/// parallel; walking and popping run serially over the sorted candidates so
/// the outcome is identical across thread counts. Returns the number of
/// branches removed.
pub fn pop_bubbles(
    store: &KmerStore,
    bubble_len: usize,
    sink: &mut dyn BubbleSink,
    cancel: &CancelToken,
) -> Result<usize> {
    let keys = store.keys();
    let mut sources: Vec<PackedKmer> = keys
        .par_iter()
        .filter(|kmer| store.get(kmer).map(|v| v.is_ambiguous()).unwrap_or(false))
        .copied()
        .collect();
    sources.sort_unstable();

    let mut popped = 0;
    for skmer in sources {
        cancel.checkpoint()?;
        for orient in Dir::BOTH {
            // Refetch: earlier pops may have resolved this fork already.
            let Some(v) = store.get(&skmer) else { break };
            let source = Oriented {
                kmer: skmer,
                orient,
            };
            let ext = v.extensions(orient);
            if ext.degree() < 2 {
                continue;
            }
            let branches: Vec<(Base, Branch)> = ext
                .iter()
                .filter_map(|base| {
                    walk_branch(store, &source, base, bubble_len).map(|b| (base, b))
                })
                .collect();
            popped += resolve(store, &source, branches, sink, popped)?;
        }
    }
    debug!(popped, "bubble popping complete");
    Ok(popped)
}

/// Walk one branch from the source as a simple path: every interior vertex
/// has exactly one way in and one way onward. Terminates successfully at
/// the first vertex with a second way in (the merge).
fn walk_branch(
    store: &KmerStore,
    source: &Oriented,
    base: Base,
    bound: usize,
) -> Option<Branch> {
    let mut cur = source.step(base);
    let mut interior: Vec<Oriented> = Vec::new();
    let mut coverage = 0u64;
    loop {
        let rec = store.get(&cur.kmer)?;
        if rec.degree(cur.orient.flip()) > 1 {
            // Merge vertex. Immediate merges have no interior to pop and
            // are not treated as bubbles.
            if interior.is_empty() {
                return None;
            }
            return Some(Branch {
                sink: cur,
                interior,
                coverage,
            });
        }
        if cur.kmer == source.kmer || interior.iter().any(|o| o.kmer == cur.kmer) {
            // Re-entrant branch.
            return None;
        }
        if interior.len() >= bound {
            return None;
        }
        let onward = rec.extensions(cur.orient).single()?;
        coverage += rec.coverage();
        interior.push(cur);
        cur = cur.step(onward);
    }
}

fn resolve(
    store: &KmerStore,
    source: &Oriented,
    branches: Vec<(Base, Branch)>,
    sink: &mut dyn BubbleSink,
    next_id: usize,
) -> Result<usize> {
    let mut count = 0;
    // Group the walked branches by the merge vertex they reached.
    let mut groups: Vec<(Oriented, Vec<Branch>)> = Vec::new();
    for (_, branch) in branches {
        match groups.iter_mut().find(|(s, _)| *s == branch.sink) {
            Some((_, members)) => members.push(branch),
            None => groups.push((branch.sink, vec![branch])),
        }
    }

    for (_, mut members) in groups {
        if members.len() < 2 {
            continue;
        }
        // Winner: higher mean coverage, then lexicographically smaller
        // sequence. Losers are popped.
        members.sort_by(|a, b| {
            b.mean_cmp(a)
                .then_with(|| a.sequence(source).cmp(&b.sequence(source)))
        });
        let Some((winner, losers)) = members.split_first() else {
            continue;
        };
        for loser in losers {
            let record = BubbleRecord {
                id: next_id + count,
                kept: winner.sequence(source),
                popped: loser.sequence(source),
                length_difference: winner.interior.len().abs_diff(loser.interior.len()),
            };
            sink.write_bubble(&record)?;
            for o in &loser.interior {
                adjacency::disconnect_and_remove(store, &o.kmer);
            }
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::adjacency::generate_adjacency;
    use crate::utils::CancelToken;

    const BASE: &str = "TACATCTGTTTCTTGCGTCGTAGCGGGACC";
    const ALT: &str = "TACATCTGTTTCTTGAGTCGTAGCGGGACC";

    fn load(reads: &[(&str, usize)], k: usize) -> KmerStore {
        let store = KmerStore::new(k);
        for (read, copies) in reads {
            for _ in 0..*copies {
                for window in read.as_bytes().windows(k) {
                    store.observe(PackedKmer::encode(window).unwrap());
                }
            }
        }
        generate_adjacency(&store, &CancelToken::new()).unwrap();
        store
    }

    fn canon(s: &str) -> PackedKmer {
        PackedKmer::encode(s.as_bytes()).unwrap().canonical().0
    }

    #[test]
    fn pops_exactly_one_bubble_and_keeps_the_deep_branch() {
        let store = load(&[(BASE, 3), (ALT, 1)], 5);
        let before = store.len();

        let mut sink = VecBubbleSink::default();
        let popped = pop_bubbles(&store, 15, &mut sink, &CancelToken::new()).unwrap();
        store.cleanup();

        assert_eq!(popped, 1);
        assert_eq!(sink.records.len(), 1);
        assert_eq!(store.len(), before - 5);
        // The deep branch's variant k-mer survives, the shallow one is gone.
        assert!(store.contains(&canon("TTGCG")));
        assert!(!store.contains(&canon("TTGAG")));
    }

    #[test]
    fn record_carries_both_branch_sequences() {
        let store = load(&[(BASE, 3), (ALT, 1)], 5);
        let mut sink = VecBubbleSink::default();
        pop_bubbles(&store, 15, &mut sink, &CancelToken::new()).unwrap();

        let rec = &sink.records[0];
        assert_ne!(rec.kept, rec.popped);
        assert_eq!(rec.kept.len(), rec.popped.len());
        assert_eq!(rec.length_difference, 0);
    }

    #[test]
    fn bound_too_small_leaves_the_bubble_alone() {
        let store = load(&[(BASE, 3), (ALT, 1)], 5);
        let before = store.len();
        let mut sink = VecBubbleSink::default();
        let popped = pop_bubbles(&store, 2, &mut sink, &CancelToken::new()).unwrap();
        assert_eq!(popped, 0);
        assert_eq!(store.len(), before);
    }

    #[test]
    fn tie_break_is_deterministic() {
        // Equal coverage on both branches: the lexicographically smaller
        // sequence survives.
        let store = load(&[(BASE, 2), (ALT, 2)], 5);
        let mut sink = VecBubbleSink::default();
        let popped = pop_bubbles(&store, 15, &mut sink, &CancelToken::new()).unwrap();
        assert_eq!(popped, 1);
        let rec = &sink.records[0];
        assert!(rec.kept < rec.popped);
    }

    #[test]
    fn linear_graph_has_no_bubbles() {
        let store = load(&[(BASE, 3)], 5);
        let mut sink = VecBubbleSink::default();
        let popped = pop_bubbles(&store, 15, &mut sink, &CancelToken::new()).unwrap();
        assert_eq!(popped, 0);
    }
}
