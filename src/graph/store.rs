//! Concurrent Vertex Store
//! =======================
//!
//! Sharded hash map from canonical k-mer to vertex record. Inserts and
//! bit-level edge updates are safe under concurrent invocation (the shard
//! lock serializes same-key updates); removal is a tombstone and `cleanup`
//! is the serialized compaction that reclaims the slots.

use ahash::RandomState;
use dashmap::DashMap;

use crate::graph::{VertexFlag, VertexRecord, FLAG_DELETED};
use crate::kmer::{Base, Dir, PackedKmer};

pub struct KmerStore {
    map: DashMap<PackedKmer, VertexRecord, RandomState>,
    k: usize,
}

impl KmerStore {
    pub fn new(k: usize) -> KmerStore {
        KmerStore {
            map: DashMap::with_hasher(RandomState::new()),
            k,
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Insert a canonical k-mer or bump its counter in the orientation slot.
    pub fn add(&self, kmer: PackedKmer, orient: Dir) {
        debug_assert_eq!(kmer.k(), self.k);
        self.map
            .entry(kmer)
            .and_modify(|v| {
                let slot = &mut v.multiplicity[orient.index()];
                *slot = slot.saturating_add(1);
            })
            .or_insert_with(|| VertexRecord::new(orient));
    }

    /// Canonicalize an as-read k-mer and record the observation.
    pub fn observe(&self, raw: PackedKmer) {
        let (canon, orient) = raw.canonical();
        self.add(canon, orient);
    }

    /// Snapshot of a live record. Tombstoned vertices are invisible.
    pub fn get(&self, kmer: &PackedKmer) -> Option<VertexRecord> {
        self.map
            .get(kmer)
            .map(|r| *r.value())
            .filter(|v| !v.is_deleted())
    }

    pub fn contains(&self, kmer: &PackedKmer) -> bool {
        self.get(kmer).is_some()
    }

    /// Apply a mutation to a live record. Returns false when the vertex is
    /// absent or tombstoned.
    pub fn update<F: FnOnce(&mut VertexRecord)>(&self, kmer: &PackedKmer, f: F) -> bool {
        match self.map.get_mut(kmer) {
            Some(mut r) if !r.is_deleted() => {
                f(r.value_mut());
                true
            }
            _ => false,
        }
    }

    pub fn set_edge(&self, kmer: &PackedKmer, dir: Dir, base: Base, present: bool) {
        self.update(kmer, |v| {
            if present {
                v.edges[dir.index()].set(base);
            } else {
                v.edges[dir.index()].clear(base);
            }
        });
    }

    pub fn mark(&self, kmer: &PackedKmer, flag: VertexFlag) {
        self.update(kmer, |v| v.set_flag_bit(flag.bit()));
    }

    pub fn unmark(&self, kmer: &PackedKmer, flag: VertexFlag) {
        self.update(kmer, |v| v.clear_flag_bit(flag.bit()));
    }

    pub fn is_marked(&self, kmer: &PackedKmer, flag: VertexFlag) -> bool {
        self.get(kmer).map(|v| v.has_flag(flag)).unwrap_or(false)
    }

    /// Tombstone a vertex. The slot remains until `cleanup`; the caller is
    /// responsible for erasing the neighbors' edge bits first.
    pub fn remove(&self, kmer: &PackedKmer) -> bool {
        match self.map.get_mut(kmer) {
            Some(mut r) if !r.is_deleted() => {
                r.value_mut().set_flag_bit(FLAG_DELETED);
                true
            }
            _ => false,
        }
    }

    /// Compact tombstones. Serialized with respect to all phase work;
    /// invalidates any key snapshot taken before the call.
    pub fn cleanup(&self) {
        self.map.retain(|_, v| !v.is_deleted());
        self.map.shrink_to_fit();
    }

    /// Release excess capacity after the load phase.
    pub fn shrink(&self) {
        self.map.shrink_to_fit();
    }

    /// Clear the given flags on every live record (between phases).
    pub fn wipe_flags(&self, flags: &[VertexFlag]) {
        let mask: u8 = flags.iter().map(|f| f.bit()).fold(0, |a, b| a | b);
        for mut entry in self.map.iter_mut() {
            entry.value_mut().clear_flag_bit(mask);
        }
    }

    pub fn len(&self) -> usize {
        self.map.iter().filter(|e| !e.value().is_deleted()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all live keys, for phase scans. Order is unspecified;
    /// sort before use where determinism matters.
    pub fn keys(&self) -> Vec<PackedKmer> {
        self.map
            .iter()
            .filter(|e| !e.value().is_deleted())
            .map(|e| *e.key())
            .collect()
    }

    /// Sum of coverage over all live vertices.
    pub fn total_coverage(&self) -> u64 {
        self.map
            .iter()
            .filter(|e| !e.value().is_deleted())
            .map(|e| e.value().coverage())
            .sum()
    }
}
