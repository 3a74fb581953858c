//! Coverage Analysis
//! =================
//!
//! Builds the k-mer multiplicity histogram and derives the erosion
//! threshold from it. Thresholds are computed once after load and are
//! read-only for the remainder of the assembly.

use rayon::prelude::*;

use crate::graph::KmerStore;
use crate::utils::configuration::ErodeSetting;

/// Multiplicities above this are binned together; the interesting structure
/// (error peak and first valley) lives far below it.
const HISTOGRAM_CAP: usize = 65_536;

#[derive(Debug, Clone)]
pub struct CoverageHistogram {
    counts: Vec<u64>,
}

impl CoverageHistogram {
    pub fn from_store(store: &KmerStore) -> CoverageHistogram {
        let keys = store.keys();
        let counts = keys
            .par_chunks(4096)
            .map(|chunk| {
                let mut local: Vec<u64> = Vec::new();
                for kmer in chunk {
                    if let Some(v) = store.get(kmer) {
                        let m = (v.coverage() as usize).min(HISTOGRAM_CAP - 1);
                        if local.len() <= m {
                            local.resize(m + 1, 0);
                        }
                        local[m] += 1;
                    }
                }
                local
            })
            .reduce(Vec::new, merge_counts);
        CoverageHistogram { counts }
    }

    pub fn count_at(&self, multiplicity: usize) -> u64 {
        self.counts.get(multiplicity).copied().unwrap_or(0)
    }

    /// Number of distinct vertices observed.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn max_multiplicity(&self) -> usize {
        self.counts.len().saturating_sub(1)
    }

    /// The first valley to the right of the low-multiplicity noise mode:
    /// the smallest m >= 1 where the histogram stops falling. Returns None
    /// for histograms with no rise at all (noise and signal inseparable).
    pub fn first_minimum(&self) -> Option<u32> {
        let n = self.counts.len();
        (1..n.saturating_sub(1)).find(|&m| self.counts[m + 1] > self.counts[m]).map(|m| m as u32)
    }
}

fn merge_counts(mut a: Vec<u64>, b: Vec<u64>) -> Vec<u64> {
    if a.len() < b.len() {
        a.resize(b.len(), 0);
    }
    for (slot, v) in a.iter_mut().zip(b.iter()) {
        *slot += v;
    }
    a
}

/// Process-wide cleaning thresholds, fixed after setup.
#[derive(Debug, Clone, Copy)]
pub struct CoverageThresholds {
    /// Tips below this total coverage are eroded. Zero disables erosion.
    pub erode: u32,
    /// Tips below this per-strand coverage are eroded. Zero disables the
    /// stranded variant.
    pub erode_strand: u32,
    /// Mean-multiplicity cutoff for the low-coverage contig filter.
    /// Non-positive disables the filter.
    pub coverage: f64,
}

impl CoverageThresholds {
    pub fn derive(
        histogram: &CoverageHistogram,
        erode: ErodeSetting,
        erode_strand: u32,
        coverage: f64,
    ) -> CoverageThresholds {
        let erode = match erode {
            ErodeSetting::Off => 0,
            ErodeSetting::Fixed(n) => n,
            ErodeSetting::Auto => histogram.first_minimum().unwrap_or(0),
        };
        CoverageThresholds {
            erode,
            erode_strand,
            coverage,
        }
    }
}
