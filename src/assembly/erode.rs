//! Tip Erosion
//! ===========
//!
//! Iteratively removes low-coverage tip vertices. Each pass scans a key
//! snapshot in parallel, collects a private victim set, then removes
//! serially; passes repeat until one removes nothing, so the operation is
//! idempotent at its fixed point.

use anyhow::Result;
use rayon::prelude::*;
use tracing::debug;

use crate::assembly::coverage::CoverageThresholds;
use crate::graph::{adjacency, KmerStore, VertexRecord};
use crate::kmer::Dir;
use crate::utils::CancelToken;

fn erodable(v: &VertexRecord, thresholds: &CoverageThresholds) -> bool {
    if !v.is_tip() {
        return false;
    }
    if thresholds.erode > 0 && v.coverage() < thresholds.erode as u64 {
        return true;
    }
    thresholds.erode_strand > 0
        && v.strand_coverage(Dir::Sense).min(v.strand_coverage(Dir::Antisense))
            < thresholds.erode_strand
}

/// Erode until no tip below threshold remains. Returns the number of
/// vertices removed; a second invocation must return zero.
pub fn erode(
    store: &KmerStore,
    thresholds: &CoverageThresholds,
    cancel: &CancelToken,
) -> Result<usize> {
    if thresholds.erode == 0 && thresholds.erode_strand == 0 {
        return Ok(0);
    }
    let mut total = 0;
    loop {
        cancel.checkpoint()?;
        let keys = store.keys();
        let victims: Vec<_> = keys
            .par_iter()
            .filter(|kmer| {
                store
                    .get(kmer)
                    .map(|v| erodable(&v, thresholds))
                    .unwrap_or(false)
            })
            .copied()
            .collect();
        if victims.is_empty() {
            break;
        }
        for kmer in &victims {
            adjacency::disconnect_and_remove(store, kmer);
        }
        total += victims.len();
        debug!(removed = victims.len(), "erosion pass");
    }
    Ok(total)
}
