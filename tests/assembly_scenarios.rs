//! End-to-end assembly scenarios driven through the public pipeline API.

use contig_forge::assembly::bubble::{NullBubbleSink, VecBubbleSink};
use contig_forge::assembly::walk::{extract_contigs, mark_ambiguous, VecContigSink};
use contig_forge::assembly::{Assembler, AssemblySummary};
use contig_forge::error::AssemblyError;
use contig_forge::graph::KmerStore;
use contig_forge::io::sequence::MemorySource;
use contig_forge::io::open_path;
use contig_forge::io::writers::FastaContigWriter;
use contig_forge::kmer::{Base, Dir, PackedKmer};
use contig_forge::utils::configuration::AssemblyOptions;
use contig_forge::utils::CancelToken;
use std::io::Write;

fn rc(seq: &str) -> String {
    PackedKmer::encode(seq.as_bytes())
        .unwrap()
        .reverse_complement()
        .decode()
}

fn assemble(reads: &[&str], options: AssemblyOptions) -> (AssemblySummary, VecContigSink) {
    let mut source = MemorySource::from_sequences(reads);
    let mut contigs = VecContigSink::default();
    let mut bubbles = NullBubbleSink;
    let mut assembler = Assembler::new(options).unwrap();
    let summary = assembler
        .assemble(&mut source, &mut contigs, &mut bubbles, None)
        .unwrap();
    (summary, contigs)
}

#[test]
fn trivial_single_read_yields_one_contig() {
    // AACAGGA at k=3 is the longest shape whose canonical 3-mer graph
    // stays a clean chain; 5 k-mers in, one 7 bp contig out.
    let read = "AACAGGA";
    let (summary, contigs) = assemble(&[read], AssemblyOptions::defaults_for_k(3));

    assert_eq!(summary.kmers_loaded, 5);
    assert_eq!(summary.contigs, 1);
    assert_eq!(summary.kmers_removed, 0);
    let seq = &contigs.contigs[0].sequence;
    assert!(*seq == read || *seq == rc(read), "unexpected contig {seq}");
}

#[test]
fn tip_is_eroded_before_walking() {
    let mut options = AssemblyOptions::defaults_for_k(4);
    options.erode = Some(2);
    let (summary, contigs) = assemble(&["AAAAAA", "AAAAAC"], options);

    // The lone AAAC observation hangs off the homopolymer loop and is
    // below the erosion threshold.
    assert_eq!(summary.eroded, 1);
    assert_eq!(summary.contigs, 1);
    assert_eq!(contigs.contigs[0].sequence, "AAAA");
}

const BUBBLE_BASE: &str = "TACATCTGTTTCTTGCGTCGTAGCGGGACC";
const BUBBLE_ALT: &str = "TACATCTGTTTCTTGAGTCGTAGCGGGACC";

#[test]
fn bubble_is_popped_and_deep_branch_kept() {
    let mut source =
        MemorySource::from_sequences(&[BUBBLE_BASE, BUBBLE_BASE, BUBBLE_BASE, BUBBLE_ALT]);
    let mut contigs = VecContigSink::default();
    let mut bubbles = VecBubbleSink::default();
    let mut assembler = Assembler::new(AssemblyOptions::defaults_for_k(5)).unwrap();
    let summary = assembler
        .assemble(&mut source, &mut contigs, &mut bubbles, None)
        .unwrap();

    assert_eq!(summary.bubbles_popped, 1);
    assert_eq!(bubbles.records.len(), 1);
    assert_eq!(summary.contigs, 1);
    let seq = &contigs.contigs[0].sequence;
    assert!(
        *seq == BUBBLE_BASE || *seq == rc(BUBBLE_BASE),
        "bubble resolution must keep the deep branch, got {seq}"
    );

    let record = &bubbles.records[0];
    assert_eq!(record.length_difference, 0);
    assert_ne!(record.kept, record.popped);
}

#[test]
fn low_coverage_contig_is_filtered_out() {
    let low = "CTATGCTACTGCGG";
    let high = "TTAACGGGGATGGC";
    let reads: Vec<&str> = std::iter::repeat(low)
        .take(3)
        .chain(std::iter::repeat(high).take(30))
        .collect();

    let mut options = AssemblyOptions::defaults_for_k(5);
    options.coverage = 10.0;
    let (summary, contigs) = assemble(&reads, options);

    assert_eq!(summary.filtered, 10);
    assert_eq!(summary.contigs, 1);
    let seq = &contigs.contigs[0].sequence;
    assert!(*seq == high || *seq == rc(high));
    assert!((contigs.contigs[0].mean_coverage() - 30.0).abs() < f64::EPSILON);
}

#[test]
fn empty_input_fails_with_nonzero_exit() {
    let mut source = MemorySource::from_sequences::<&str>(&[]);
    let mut contigs = VecContigSink::default();
    let mut bubbles = NullBubbleSink;
    let mut assembler = Assembler::new(AssemblyOptions::defaults_for_k(5)).unwrap();
    let err = assembler
        .assemble(&mut source, &mut contigs, &mut bubbles, None)
        .unwrap_err();

    let kind = err.downcast_ref::<AssemblyError>().unwrap();
    assert!(matches!(kind, AssemblyError::InputUnusable));
    assert_ne!(kind.exit_code(), 0);
}

#[test]
fn reads_shorter_than_k_are_unusable() {
    let mut source = MemorySource::from_sequences(&["ACG", "TT"]);
    let mut contigs = VecContigSink::default();
    let mut bubbles = NullBubbleSink;
    let mut assembler = Assembler::new(AssemblyOptions::defaults_for_k(5)).unwrap();
    let err = assembler
        .assemble(&mut source, &mut contigs, &mut bubbles, None)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AssemblyError>(),
        Some(AssemblyError::InputUnusable)
    ));
}

#[test]
fn all_ambiguous_graph_emits_singleton_contigs() {
    // Synthetic graph: every vertex branches in the sense direction, so
    // every vertex is its own contig.
    let store = KmerStore::new(5);
    let kmers = ["AACTC", "ACCTG", "ATCGG"];
    for s in kmers {
        let kmer = PackedKmer::encode(s.as_bytes()).unwrap();
        store.add(kmer, Dir::Sense);
        store.update(&kmer, |v| {
            v.edges[Dir::Sense.index()].set(Base::A);
            v.edges[Dir::Sense.index()].set(Base::T);
        });
    }
    mark_ambiguous(&store);

    let mut sink = VecContigSink::default();
    let (count, total) = extract_contigs(&store, &mut sink, &CancelToken::new()).unwrap();
    assert_eq!(count, kmers.len());
    assert_eq!(total, store.total_coverage());
    assert!(sink.contigs.iter().all(|c| c.kmer_count == 1));
}

#[test]
fn palindromic_kmer_occupies_one_orientation_slot() {
    let store = KmerStore::new(4);
    let palindrome = PackedKmer::encode(b"ATAT").unwrap();
    assert!(palindrome.is_palindrome());
    store.observe(palindrome);
    store.observe(palindrome.reverse_complement());

    let v = store.get(&palindrome).unwrap();
    assert_eq!(v.multiplicity, [2, 0]);
}

#[test]
fn fasta_in_fasta_out_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let in_path = dir.path().join("reads.fa");
    let out_path = dir.path().join("contigs.fa");
    let mut file = std::fs::File::create(&in_path).unwrap();
    write!(file, ">r1\nAACAGGA\n>r2\nAACAGGA\n").unwrap();
    drop(file);

    let mut source = open_path(&in_path).unwrap();
    let mut writer = FastaContigWriter::create(&out_path).unwrap();
    let mut bubbles = NullBubbleSink;
    let mut assembler = Assembler::new(AssemblyOptions::defaults_for_k(3)).unwrap();
    let summary = assembler
        .assemble(source.as_mut(), &mut writer, &mut bubbles, None)
        .unwrap();
    writer.finish().unwrap();

    assert_eq!(summary.contigs, 1);
    let text = std::fs::read_to_string(&out_path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some(">0 7 10"));
    let body = lines.next().unwrap();
    assert!(body == "AACAGGA" || body == rc("AACAGGA"));
}

#[test]
fn multi_read_overlap_merges_into_one_contig() {
    // Two overlapping reads reconstruct the longer chain at k=3.
    let (summary, contigs) = assemble(&["AACAGG", "ACAGGA"], AssemblyOptions::defaults_for_k(3));
    assert_eq!(summary.contigs, 1);
    assert_eq!(contigs.contigs[0].length, 7);
}
