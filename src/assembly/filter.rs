//! Low-Coverage Contig Filter
//! ==========================
//!
//! Walks every non-ambiguous maximal path and removes those whose mean
//! vertex multiplicity falls below the configured cutoff. Ambiguous
//! vertices act as split points: they are never part of a walked path and
//! survive the removal (the edges into them are cleared). The pipeline
//! re-enters erosion once after this phase.

use anyhow::Result;
use tracing::debug;

use crate::assembly::walk::{is_boundary, path_coverage, trace_path};
use crate::graph::{adjacency, KmerStore, VertexFlag};
use crate::utils::CancelToken;

/// Remove all paths with mean multiplicity below `cutoff`. Returns the
/// number of vertices removed. `mark_ambiguous` must have run first; the
/// caller wipes marks and compacts afterwards.
pub fn remove_low_coverage(store: &KmerStore, cutoff: f64, cancel: &CancelToken) -> Result<usize> {
    let mut keys = store.keys();
    keys.sort_unstable();

    let mut removed = 0;
    for kmer in keys {
        cancel.checkpoint()?;
        let Some(v) = store.get(&kmer) else { continue };
        if v.has_flag(VertexFlag::Seen) || is_boundary(&v) {
            continue;
        }
        let path = trace_path(store, kmer);
        let mean = path_coverage(store, &path) as f64 / path.len() as f64;
        if mean < cutoff {
            for o in &path {
                adjacency::disconnect_and_remove(store, &o.kmer);
            }
            removed += path.len();
        }
    }
    store.wipe_flags(&[VertexFlag::Seen]);
    debug!(removed, cutoff, "low-coverage filter");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::walk::mark_ambiguous;
    use crate::graph::adjacency::generate_adjacency;
    use crate::kmer::PackedKmer;

    fn canon(s: &str) -> PackedKmer {
        PackedKmer::encode(s.as_bytes()).unwrap().canonical().0
    }

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

    #[test]
    fn removes_the_low_mean_path_and_keeps_the_deep_one() {
        // Two disjoint linear components with means 3 and 30.
        let low = "CTATGCTACTGCGG";
        let high = "TTAACGGGGATGGC";
        let store = load(&[(low, 3), (high, 30)], 5);
        assert_eq!(store.len(), 20);

        mark_ambiguous(&store);
        let removed =
            remove_low_coverage(&store, 10.0, &CancelToken::new()).unwrap();
        store.cleanup();

        assert_eq!(removed, 10);
        assert_eq!(store.len(), 10);
        assert!(!store.contains(&canon("CTATG")));
        assert!(store.contains(&canon("TTAAC")));
    }

    #[test]
    fn cutoff_spares_paths_at_or_above_the_mean() {
        let read = "CTATGCTACTGCGG";
        let store = load(&[(read, 3)], 5);
        mark_ambiguous(&store);
        let removed = remove_low_coverage(&store, 3.0, &CancelToken::new()).unwrap();
        assert_eq!(removed, 0);
    }

    #[test]
    fn seen_flags_are_wiped_after_the_pass() {
        let store = load(&[("CTATGCTACTGCGG", 3)], 5);
        mark_ambiguous(&store);
        remove_low_coverage(&store, 1.0, &CancelToken::new()).unwrap();
        for kmer in store.keys() {
            assert!(!store.is_marked(&kmer, VertexFlag::Seen));
        }
    }
}
