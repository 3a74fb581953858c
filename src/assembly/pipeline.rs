//! Assembly Pipeline
//! =================
//!
//! Single-k control flow: load, compact, histogram, adjacency, then
//! erode / trim / [low-coverage filter, re-erode] / pop bubbles, and
//! finally the contig walk. Phases are idempotent; the low-coverage filter
//! fires at most once per run and re-enters erosion when it does. A
//! cancellation token is checked between phases and inside the scans.

use anyhow::Result;
use rayon::prelude::*;
use tracing::info;

use crate::assembly::bubble::{pop_bubbles, BubbleSink};
use crate::assembly::coverage::{CoverageHistogram, CoverageThresholds};
use crate::assembly::erode::erode;
use crate::assembly::filter::remove_low_coverage;
use crate::assembly::trim::trim;
use crate::assembly::walk::{extract_contigs, mark_ambiguous, ContigSink};
use crate::error::AssemblyError;
use crate::graph::adjacency::generate_adjacency;
use crate::graph::{KmerStore, VertexFlag};
use crate::io::sequence::{SequenceRecord, SequenceSource};
use crate::io::writers::GraphSink;
use crate::kmer::{Base, PackedKmer};
use crate::utils::configuration::AssemblyOptions;
use crate::utils::CancelToken;

/// Pluggable run-statistics receiver; stands in for a results database.
pub trait TelemetrySink {
    fn record(&mut self, key: &str, value: i64);
}

/// Swallows every statistic.
#[derive(Debug, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn record(&mut self, _key: &str, _value: i64) {}
}

/// Per-run counters, one line per phase in the log.
#[derive(Debug, Clone, Default)]
pub struct AssemblySummary {
    pub k: usize,
    pub reads: usize,
    pub kmers_loaded: usize,
    /// K-mer windows dropped for containing non-ACGT characters.
    pub windows_skipped: usize,
    pub eroded: usize,
    pub trimmed: usize,
    pub filtered: usize,
    pub bubbles_popped: usize,
    pub contigs: usize,
    pub kmers_surviving: usize,
    pub kmers_removed: usize,
}

impl AssemblySummary {
    /// 10*log10(surviving/removed), when both sides are non-zero.
    pub fn snr_db(&self) -> Option<f64> {
        if self.kmers_surviving > 0 && self.kmers_removed > 0 {
            Some(10.0 * (self.kmers_surviving as f64 / self.kmers_removed as f64).log10())
        } else {
            None
        }
    }
}

pub struct Assembler {
    options: AssemblyOptions,
    cancel: CancelToken,
    telemetry: Box<dyn TelemetrySink>,
}

impl std::fmt::Debug for Assembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assembler")
            .field("options", &self.options)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl Assembler {
    pub fn new(options: AssemblyOptions) -> Result<Assembler> {
        options
            .validate()
            .map_err(|e| AssemblyError::ConfigInvalid(e.to_string()))?;
        Ok(Assembler {
            options,
            cancel: CancelToken::new(),
            telemetry: Box::new(NoopTelemetry),
        })
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Assembler {
        self.cancel = cancel;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Box<dyn TelemetrySink>) -> Assembler {
        self.telemetry = telemetry;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the whole single-k assembly: read from `source`, emit contigs,
    /// bubble pairs, and optionally the cleaned graph.
    pub fn assemble(
        &mut self,
        source: &mut dyn SequenceSource,
        contigs: &mut dyn ContigSink,
        bubbles: &mut dyn BubbleSink,
        graph: Option<&mut dyn GraphSink>,
    ) -> Result<AssemblySummary> {
        let k = self.options.k;
        let cancel = self.cancel.clone();
        let store = KmerStore::new(k);
        let mut summary = AssemblySummary {
            k,
            ..AssemblySummary::default()
        };

        let load = load_sequences(&store, source, k, &cancel)?;
        summary.reads = load.reads;
        summary.windows_skipped = load.skipped;
        summary.kmers_loaded = store.len();
        store.shrink();
        info!(
            "Loaded {} k-mers from {} reads ({} windows skipped)",
            summary.kmers_loaded, load.reads, load.skipped
        );
        self.telemetry
            .record("loaded_kmers", summary.kmers_loaded as i64);
        if store.is_empty() {
            return Err(AssemblyError::InputUnusable.into());
        }

        let histogram = CoverageHistogram::from_store(&store);
        let thresholds = CoverageThresholds::derive(
            &histogram,
            self.options.erode_setting(),
            self.options.erode_strand,
            self.options.coverage,
        );
        info!(
            "Coverage thresholds: erode={} erode_strand={} coverage={}",
            thresholds.erode, thresholds.erode_strand, thresholds.coverage
        );

        info!("Generating adjacency");
        generate_adjacency(&store, &cancel)?;

        let mut coverage_cutoff = thresholds.coverage;
        loop {
            if thresholds.erode > 0 || thresholds.erode_strand > 0 {
                info!("Eroding tips");
                let eroded = erode(&store, &thresholds, &cancel)?;
                // The eroder claims a fixed point; hold it to that.
                let residue = erode(&store, &thresholds, &cancel)?;
                assert_eq!(residue, 0, "erosion left {residue} erodable tips behind");
                store.cleanup();
                summary.eroded += eroded;
                info!("Eroded {} tips", eroded);
            }

            info!("Trimming dead ends (bound {})", self.options.trim_bound());
            let trimmed = trim(&store, self.options.trim_bound(), &cancel)?;
            store.cleanup();
            summary.trimmed += trimmed;
            info!("Trimmed {} k-mers", trimmed);

            if coverage_cutoff > 0.0 {
                info!(
                    "Removing low-coverage contigs (mean k-mer coverage < {})",
                    coverage_cutoff
                );
                mark_ambiguous(&store);
                let filtered = remove_low_coverage(&store, coverage_cutoff, &cancel)?;
                store.wipe_flags(&[
                    VertexFlag::MarkSense,
                    VertexFlag::MarkAntisense,
                    VertexFlag::Seen,
                ]);
                store.cleanup();
                summary.filtered = filtered;
                info!("Removed {} low-coverage k-mers", filtered);
                // One shot, then back through erosion.
                coverage_cutoff = 0.0;
                continue;
            }
            break;
        }

        let bubble_bound = self.options.bubble_bound();
        if bubble_bound > 0 {
            info!("Popping bubbles (bound {})", bubble_bound);
            summary.bubbles_popped = pop_bubbles(&store, bubble_bound, bubbles, &cancel)?;
            store.cleanup();
            info!("Removed {} bubbles", summary.bubbles_popped);
            self.telemetry
                .record("bubbles_popped", summary.bubbles_popped as i64);
        }

        if let Some(graph) = graph {
            info!("Writing the cleaned graph");
            graph.write_graph(&store)?;
        }

        mark_ambiguous(&store);
        let (n_contigs, _) = extract_contigs(&store, contigs, &cancel)?;
        summary.contigs = n_contigs;
        summary.kmers_surviving = store.len();
        summary.kmers_removed = summary.kmers_loaded - summary.kmers_surviving;
        self.telemetry.record("contigs", n_contigs as i64);

        info!(
            "Assembled {} contigs; removed {} of {} k-mers",
            summary.contigs, summary.kmers_removed, summary.kmers_loaded
        );
        if let Some(snr) = summary.snr_db() {
            info!("The signal-to-noise ratio (SNR) is {:.2} dB", snr);
        }
        Ok(summary)
    }
}

struct LoadStats {
    reads: usize,
    skipped: usize,
}

/// Read every record and count each k-mer window in its observed
/// orientation. Batches are chopped in parallel; the store serializes
/// same-key increments internally.
fn load_sequences(
    store: &KmerStore,
    source: &mut dyn SequenceSource,
    k: usize,
    cancel: &CancelToken,
) -> Result<LoadStats> {
    let mut stats = LoadStats {
        reads: 0,
        skipped: 0,
    };
    let mut batch: Vec<SequenceRecord> = Vec::new();
    while source.read_batch(&mut batch)? {
        cancel.checkpoint()?;
        let skipped = batch
            .par_iter()
            .map(|rec| chop_read(store, rec.sequence.as_bytes(), k))
            .try_reduce(|| 0, |a, b| Ok(a + b))?;
        stats.reads += batch.len();
        stats.skipped += skipped;
        batch.clear();
    }
    Ok(stats)
}

/// Slide a window over one read, skipping windows broken by non-ACGT
/// bytes. Returns the number of skipped windows.
fn chop_read(store: &KmerStore, seq: &[u8], k: usize) -> Result<usize> {
    if seq.len() < k {
        return Ok(0);
    }
    let mut run = 0usize;
    let mut cur: Option<PackedKmer> = None;
    let mut observed = 0usize;
    for (i, &byte) in seq.iter().enumerate() {
        match Base::from_ascii(byte) {
            None => {
                run = 0;
                cur = None;
            }
            Some(base) => {
                run += 1;
                if run >= k {
                    let kmer = match cur {
                        Some(prev) => prev.shift_left(base),
                        None => PackedKmer::encode(&seq[i + 1 - k..=i])?,
                    };
                    store.observe(kmer);
                    observed += 1;
                    cur = Some(kmer);
                }
            }
        }
    }
    Ok(seq.len() - k + 1 - observed)
}
