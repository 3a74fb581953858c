//! Dead-End Trimming
//! =================
//!
//! Removes short branches that terminate in a dead end. From each tip the
//! trimmer walks inward along the unique adjacency; when it reaches the
//! junction that attaches the branch to the rest of the graph within the
//! length bound, the walked vertices are marked for removal. Workers scan
//! tips in parallel into a private set; removal and compaction are
//! serialized.
//!
//! The bound grows 1, 2, 4, .. up to `trim_len`, then rounds repeat at the
//! full bound until one marks nothing. Growing the bound removes the
//! shortest spurs first, so a junction whose other branch is legitimate
//! becomes unambiguous before the longer branch ever looks disposable.

use ahash::AHashSet;
use anyhow::Result;
use rayon::prelude::*;
use tracing::debug;

use crate::graph::{adjacency, KmerStore, Oriented};
use crate::kmer::{Dir, PackedKmer};
use crate::utils::CancelToken;

/// Trim until convergence. Returns the total number of vertices removed.
pub fn trim(store: &KmerStore, trim_len: usize, cancel: &CancelToken) -> Result<usize> {
    let trim_len = trim_len.max(1);
    let mut total = 0;
    let mut bound = 1;
    loop {
        cancel.checkpoint()?;
        let removed = trim_round(store, bound);
        total += removed;
        debug!(bound, removed, "trim round");
        if bound < trim_len {
            bound = (bound * 2).min(trim_len);
        } else if removed == 0 {
            break;
        }
    }
    Ok(total)
}

fn trim_round(store: &KmerStore, bound: usize) -> usize {
    let keys = store.keys();
    let marked: AHashSet<PackedKmer> = keys
        .par_iter()
        .filter(|kmer| store.get(kmer).map(|v| v.is_tip()).unwrap_or(false))
        .filter_map(|tip| walk_branch(store, tip, bound))
        .flatten()
        .collect::<std::collections::HashSet<PackedKmer, ahash::RandomState>>()
        .into();
    for kmer in &marked {
        adjacency::disconnect_and_remove(store, kmer);
    }
    if !marked.is_empty() {
        store.cleanup();
    }
    marked.len()
}

/// Walk inward from a tip. Returns the branch vertices (tip included,
/// junction excluded) when a junction is reached within `max_len`
/// vertices; None for floating chains, fans, cycles, and branches longer
/// than the bound.
fn walk_branch(store: &KmerStore, tip: &PackedKmer, max_len: usize) -> Option<Vec<PackedKmer>> {
    let v = store.get(tip)?;
    let orient = match (v.dead_end(Dir::Sense), v.dead_end(Dir::Antisense)) {
        (true, false) => Dir::Antisense,
        (false, true) => Dir::Sense,
        // Isolated vertices have no junction to reach.
        _ => return None,
    };

    let mut path = vec![*tip];
    let mut cur = Oriented { kmer: *tip, orient };
    loop {
        let rec = store.get(&cur.kmer)?;
        let base = rec.extensions(cur.orient).single()?;
        let next = cur.step(base);
        let nrec = store.get(&next.kmer)?;

        let toward_us = nrec.degree(next.orient.flip());
        let onward = nrec.degree(next.orient);
        if toward_us > 1 || onward > 1 {
            // The junction attaching this branch to the trunk. Only
            // branches strictly shorter than the bound are disposable.
            return (path.len() < max_len).then_some(path);
        }
        if path.len() >= max_len || path.contains(&next.kmer) {
            return None;
        }
        path.push(next.kmer);
        cur = next;
    }
}
