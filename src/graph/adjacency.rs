//! Adjacency Builder
//! =================
//!
//! Populates per-vertex edge bitsets from vertex existence: after load,
//! each vertex probes its eight candidate neighbors (four bases in each
//! direction) and sets a bit exactly when the canonical candidate is live
//! in the store. Removal erases the reciprocal bits before tombstoning, so
//! the bitsets never assert a neighbor the store does not contain.

use anyhow::Result;
use rayon::prelude::*;

use crate::graph::KmerStore;
use crate::kmer::{Base, Dir, PackedKmer};
use crate::utils::CancelToken;

const SCAN_CHUNK: usize = 1024;

/// Build every vertex's edge bitsets. Each worker writes only to its own
/// vertex after probing, so concurrent population is race-free.
pub fn generate_adjacency(store: &KmerStore, cancel: &CancelToken) -> Result<()> {
    let keys = store.keys();
    keys.par_chunks(SCAN_CHUNK).try_for_each(|chunk| {
        cancel.checkpoint()?;
        for kmer in chunk {
            let mut edges = [crate::graph::EdgeSet::empty(); 2];
            for dir in Dir::BOTH {
                for (base, candidate) in kmer.neighbors(dir) {
                    let (canon, _) = candidate.canonical();
                    if store.contains(&canon) {
                        edges[dir.index()].set(base);
                    }
                }
            }
            store.update(kmer, |v| v.edges = edges);
        }
        Ok(())
    })
}

/// The edge stored on the neighbor that points back at `kmer`.
///
/// Walking out of `kmer` along `(dir, base)` lands on `canonical(candidate)`
/// in some orientation; the reciprocal bit lives on the flipped direction
/// when the candidate is canonical as-read, on the same direction (with the
/// complemented base) when it canonicalizes to the other strand.
pub fn reciprocal_edge(kmer: &PackedKmer, dir: Dir, base: Base) -> (PackedKmer, Dir, Base) {
    let candidate = match dir {
        Dir::Sense => kmer.shift_left(base),
        Dir::Antisense => kmer.shift_right(base),
    };
    let (canon, orient) = candidate.canonical();
    let back_base = match dir {
        Dir::Sense => kmer.first_base(),
        Dir::Antisense => kmer.last_base(),
    };
    match orient {
        Dir::Sense => (canon, dir.flip(), back_base),
        Dir::Antisense => (canon, dir, back_base.complement()),
    }
}

/// Erase the vertex from its neighbors' bitsets, then tombstone it.
pub fn disconnect_and_remove(store: &KmerStore, kmer: &PackedKmer) {
    let Some(record) = store.get(kmer) else {
        return;
    };
    for dir in Dir::BOTH {
        for base in record.edges[dir.index()].iter() {
            let (neighbor, rdir, rbase) = reciprocal_edge(kmer, dir, base);
            if neighbor == *kmer {
                continue;
            }
            store.set_edge(&neighbor, rdir, rbase, false);
        }
    }
    store.remove(kmer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::VertexRecord;

    fn km(s: &str) -> PackedKmer {
        PackedKmer::encode(s.as_bytes()).unwrap()
    }

    fn store_from(reads: &[&str], k: usize) -> KmerStore {
        let store = KmerStore::new(k);
        for read in reads {
            let bytes = read.as_bytes();
            for window in bytes.windows(k) {
                store.observe(PackedKmer::encode(window).unwrap());
            }
        }
        store
    }

    fn assert_reciprocity(store: &KmerStore) {
        for kmer in store.keys() {
            let v = store.get(&kmer).unwrap();
            for dir in Dir::BOTH {
                for base in v.edges[dir.index()].iter() {
                    let (neighbor, rdir, rbase) = reciprocal_edge(&kmer, dir, base);
                    let n = store
                        .get(&neighbor)
                        .unwrap_or_else(|| panic!("edge {kmer:?} {dir:?} {base:?} dangles"));
                    assert!(
                        n.edges[rdir.index()].contains(rbase),
                        "no reciprocal bit on {neighbor:?} for {kmer:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn linear_chain_adjacency() {
        let store = store_from(&["AACAGG"], 3);
        generate_adjacency(&store, &CancelToken::new()).unwrap();

        // AAC extends right by A (to ACA) and nothing else.
        let v = store.get(&km("AAC")).unwrap();
        assert_eq!(v.degree(Dir::Sense), 1);
        assert!(v.extensions(Dir::Sense).contains(Base::A));
        assert_eq!(v.degree(Dir::Antisense), 0);
        assert_reciprocity(&store);
    }

    #[test]
    fn adjacency_only_asserts_live_neighbors() {
        let store = store_from(&["ACGGTC"], 3);
        generate_adjacency(&store, &CancelToken::new()).unwrap();
        let total_bits: u32 = store
            .keys()
            .iter()
            .map(|k| {
                let v = store.get(k).unwrap();
                v.degree(Dir::Sense) + v.degree(Dir::Antisense)
            })
            .sum();
        assert!(total_bits > 0);
        assert_reciprocity(&store);
    }

    #[test]
    fn disconnect_clears_neighbor_bits() {
        let store = store_from(&["AAAAAC"], 4);
        generate_adjacency(&store, &CancelToken::new()).unwrap();

        // AAAC is the tip off AAAA.
        let before = store.get(&km("AAAA")).unwrap();
        assert!(before.extensions(Dir::Sense).contains(Base::C));

        disconnect_and_remove(&store, &km("AAAC"));
        assert!(store.get(&km("AAAC")).is_none());
        let after = store.get(&km("AAAA")).unwrap();
        assert!(!after.extensions(Dir::Sense).contains(Base::C));
        assert_reciprocity(&store);
    }

    #[test]
    fn branching_vertex_is_ambiguous() {
        let store = store_from(&["AACGT", "AACCT"], 3);
        generate_adjacency(&store, &CancelToken::new()).unwrap();
        let v: VertexRecord = store.get(&km("AAC")).unwrap();
        assert_eq!(v.degree(Dir::Sense), 2);
        assert!(v.is_ambiguous());
        assert_reciprocity(&store);
    }
}
