use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use mimalloc::MiMalloc;
use std::path::{Path, PathBuf};
use tracing::info;

use contig_forge::assembly::bubble::{BubbleSink, NullBubbleSink};
use contig_forge::assembly::{Assembler, AssemblySummary};
use contig_forge::error::AssemblyError;
use contig_forge::io::sequence::{open_path, ChainSource, SequenceSource};
use contig_forge::io::writers::{DotGraphWriter, FastaBubbleWriter, FastaContigWriter, GraphSink};
use contig_forge::utils::configuration::{AssemblyOptions, ConfigError, ForgeConfig};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
#[command(
    name = "contig-forge",
    version,
    about = "De Bruijn graph short-read assembler"
)]
struct Cli {
    /// Input reads (FASTA/FASTQ, optionally gzipped)
    #[arg(required_unless_present = "config")]
    inputs: Vec<PathBuf>,

    /// K-mer length
    #[arg(short, long, default_value_t = 25)]
    kmer: usize,

    /// Final k of a multi-k sweep; contigs of each iteration feed the next
    #[arg(long)]
    k_max: Option<usize>,

    /// Sweep step
    #[arg(long, default_value_t = 2)]
    k_step: usize,

    /// Erosion coverage threshold (omitted = derive from the histogram,
    /// 0 = disabled)
    #[arg(long)]
    erode: Option<u32>,

    /// Per-strand erosion threshold (0 = disabled)
    #[arg(long, default_value_t = 0)]
    erode_strand: u32,

    /// Mean-coverage cutoff for the low-coverage filter (<= 0 disables)
    #[arg(long, default_value_t = 0.0)]
    coverage: f64,

    /// Trimmer length bound (default: k)
    #[arg(long)]
    trim_len: Option<usize>,

    /// Bubble length bound in vertices (default: 3k, 0 disables)
    #[arg(long)]
    bubble_len: Option<usize>,

    /// Write the cleaned graph as DOT
    #[arg(long)]
    graph: Option<PathBuf>,

    /// Contigs output path
    #[arg(short, long, default_value = "contigs.fa")]
    output: PathBuf,

    /// Popped-bubble pairs output path
    #[arg(long)]
    bubbles: Option<PathBuf>,

    /// Worker threads (0 = one per core)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// TOML configuration file; command-line inputs are appended
    #[arg(long)]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

fn build_config(cli: &Cli) -> Result<ForgeConfig, ConfigError> {
    let config = match &cli.config {
        Some(path) => {
            let mut cfg = ForgeConfig::from_file(path)?;
            if !cli.inputs.is_empty() {
                cfg.io.inputs = cli.inputs.clone();
            }
            cfg
        }
        None => {
            let mut cfg = ForgeConfig::default();
            cfg.assembly = AssemblyOptions {
                k: cli.kmer,
                erode: cli.erode,
                erode_strand: cli.erode_strand,
                coverage: cli.coverage,
                trim_len: cli.trim_len,
                bubble_len: cli.bubble_len,
            };
            cfg.sweep.k_max = cli.k_max;
            cfg.sweep.k_step = cli.k_step;
            cfg.io.inputs = cli.inputs.clone();
            cfg.io.contigs_path = cli.output.clone();
            cfg.io.graph_path = cli.graph.clone();
            cfg.io.bubble_path = cli.bubbles.clone();
            cfg.performance.threads = cli.threads;
            cfg
        }
    };
    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;
    let threads = if config.performance.threads > 0 {
        config.performance.threads
    } else {
        num_cpus::get()
    };
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()?;
    info!("Using {threads} worker threads");

    let k_min = config.assembly.k;
    let k_max = config.sweep.k_max.unwrap_or(k_min);
    let step = config.sweep.k_step;
    if k_max > k_min {
        info!("Assembling k={}-{}:{}", k_min, k_max, step);
    }

    let mut previous: Option<PathBuf> = None;
    let mut k = k_min;
    loop {
        let last = k + step > k_max;
        // Options apply to the first iteration; later k values restart
        // from per-k defaults, as coverage statistics differ per k.
        let options = if k == k_min {
            config.assembly.clone()
        } else {
            AssemblyOptions::defaults_for_k(k)
        };
        let out_path = if last {
            config.io.contigs_path.clone()
        } else {
            PathBuf::from(format!("contigs-k{k}.fa"))
        };

        let mut source: Box<dyn SequenceSource> = match &previous {
            Some(path) => open_path(path)?,
            None => Box::new(ChainSource::open(&config.io.inputs)?),
        };
        let mut contig_writer = FastaContigWriter::create(&out_path)?;
        let mut bubble_writer = match &config.io.bubble_path {
            Some(path) => Some(FastaBubbleWriter::create(path)?),
            None => None,
        };
        let mut null_bubbles = NullBubbleSink;
        let mut graph_writer = config.io.graph_path.as_ref().map(DotGraphWriter::new);

        let mut assembler = Assembler::new(options)?;
        let summary = {
            let bubbles: &mut dyn BubbleSink = match bubble_writer.as_mut() {
                Some(w) => w,
                None => &mut null_bubbles,
            };
            assembler.assemble(
                source.as_mut(),
                &mut contig_writer,
                bubbles,
                graph_writer.as_mut().map(|g| g as &mut dyn GraphSink),
            )?
        };
        contig_writer.finish()?;
        if let Some(writer) = bubble_writer {
            writer.finish()?;
        }
        print_summary(&summary, &out_path);

        previous = Some(out_path);
        if last {
            break;
        }
        k += step;
    }
    Ok(())
}

fn print_summary(summary: &AssemblySummary, out_path: &Path) {
    println!(
        "{}",
        format!("Assembly k={} complete", summary.k).bold().green()
    );
    println!(
        "  loaded:   {} k-mers from {} reads ({} windows skipped)",
        summary.kmers_loaded, summary.reads, summary.windows_skipped
    );
    println!("  eroded:   {} k-mers", summary.eroded);
    println!("  trimmed:  {} k-mers", summary.trimmed);
    if summary.filtered > 0 {
        println!("  filtered: {} k-mers", summary.filtered);
    }
    println!("  bubbles:  {} popped", summary.bubbles_popped);
    println!(
        "  contigs:  {} -> {}",
        summary.contigs,
        out_path.display()
    );
    if let Some(snr) = summary.snr_db() {
        println!("  SNR:      {snr:.2} dB");
    }
}

fn main() {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    if let Err(err) = run(cli) {
        eprintln!("{} {err:#}", "error:".red().bold());
        let code = if let Some(e) = err.downcast_ref::<AssemblyError>() {
            e.exit_code()
        } else if err.downcast_ref::<ConfigError>().is_some() {
            2
        } else {
            1
        };
        std::process::exit(code);
    }
}
