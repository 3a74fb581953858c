//! Configuration
//! =============
//!
//! Serde-backed settings for the assembler: per-k cleaning knobs, the
//! multi-k sweep, I/O paths, and thread count. A TOML file can seed the
//! configuration; command-line flags override it.

use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::kmer::{MAX_K, MIN_K};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("k-mer length {0} out of range (3-64)")]
    KmerOutOfRange(usize),

    #[error("sweep end k={0} is smaller than start k={1}")]
    SweepRange(usize, usize),

    #[error("sweep step must be at least 1")]
    SweepStep,

    #[error("trim length must be at least 1")]
    TrimLen,

    #[error("coverage cutoff must be finite, got {0}")]
    Coverage(f64),

    #[error("no input files")]
    NoInputs,

    #[error("cannot load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// How the erosion threshold is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErodeSetting {
    /// Derive the threshold from the coverage histogram.
    Auto,
    Off,
    Fixed(u32),
}

/// Per-k assembly knobs. The sweep resets these to defaults for every k
/// after the first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyOptions {
    /// K-mer length (3-64).
    pub k: usize,
    /// Erosion coverage threshold. Absent = derive from the histogram;
    /// zero = disabled.
    pub erode: Option<u32>,
    /// Per-strand erosion threshold; zero = disabled.
    pub erode_strand: u32,
    /// Mean-coverage cutoff for the low-coverage filter; non-positive
    /// disables it.
    pub coverage: f64,
    /// Trimmer length bound; absent = k.
    pub trim_len: Option<usize>,
    /// Bubble length bound in vertices; absent = 3k, zero disables.
    pub bubble_len: Option<usize>,
}

impl AssemblyOptions {
    pub fn defaults_for_k(k: usize) -> AssemblyOptions {
        AssemblyOptions {
            k,
            erode: None,
            erode_strand: 0,
            coverage: 0.0,
            trim_len: None,
            bubble_len: None,
        }
    }

    pub fn erode_setting(&self) -> ErodeSetting {
        match self.erode {
            None => ErodeSetting::Auto,
            Some(0) => ErodeSetting::Off,
            Some(n) => ErodeSetting::Fixed(n),
        }
    }

    pub fn trim_bound(&self) -> usize {
        self.trim_len.unwrap_or(self.k)
    }

    /// Zero disables bubble popping.
    pub fn bubble_bound(&self) -> usize {
        self.bubble_len.unwrap_or(3 * self.k)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.k < MIN_K || self.k > MAX_K {
            return Err(ConfigError::KmerOutOfRange(self.k));
        }
        if self.trim_len == Some(0) {
            return Err(ConfigError::TrimLen);
        }
        if !self.coverage.is_finite() {
            return Err(ConfigError::Coverage(self.coverage));
        }
        Ok(())
    }
}

impl Default for AssemblyOptions {
    fn default() -> AssemblyOptions {
        AssemblyOptions::defaults_for_k(25)
    }
}

/// Outer multi-k sweep: re-run the whole core at successive k, feeding
/// each iteration's contigs into the next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSettings {
    /// Final k of the sweep; absent = single-k run.
    pub k_max: Option<usize>,
    pub k_step: usize,
}

impl Default for SweepSettings {
    fn default() -> SweepSettings {
        SweepSettings {
            k_max: None,
            k_step: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoSettings {
    pub inputs: Vec<PathBuf>,
    pub contigs_path: PathBuf,
    /// Optional DOT dump of the cleaned graph.
    pub graph_path: Option<PathBuf>,
    /// Optional destination for popped-bubble pairs.
    pub bubble_path: Option<PathBuf>,
}

impl Default for IoSettings {
    fn default() -> IoSettings {
        IoSettings {
            inputs: Vec::new(),
            contigs_path: PathBuf::from("contigs.fa"),
            graph_path: None,
            bubble_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSettings {
    /// Worker threads; zero = one per core.
    pub threads: usize,
}

impl Default for PerformanceSettings {
    fn default() -> PerformanceSettings {
        PerformanceSettings { threads: 0 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForgeConfig {
    #[serde(default)]
    pub assembly: AssemblyOptions,
    #[serde(default)]
    pub sweep: SweepSettings,
    #[serde(default)]
    pub io: IoSettings,
    #[serde(default)]
    pub performance: PerformanceSettings,
}

impl ForgeConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ForgeConfig, ConfigError> {
        let cfg = Config::builder()
            .add_source(File::from(path.as_ref()).format(FileFormat::Toml))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.assembly.validate()?;
        if let Some(k_max) = self.sweep.k_max {
            if k_max < self.assembly.k {
                return Err(ConfigError::SweepRange(k_max, self.assembly.k));
            }
            if k_max > MAX_K {
                return Err(ConfigError::KmerOutOfRange(k_max));
            }
        }
        if self.sweep.k_step == 0 {
            return Err(ConfigError::SweepStep);
        }
        if self.io.inputs.is_empty() {
            return Err(ConfigError::NoInputs);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid() -> ForgeConfig {
        let mut cfg = ForgeConfig::default();
        cfg.io.inputs.push(PathBuf::from("reads.fa"));
        cfg
    }

    #[test]
    fn default_configuration_validates() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn k_bounds_are_enforced() {
        let mut cfg = valid();
        cfg.assembly.k = 2;
        assert!(matches!(cfg.validate(), Err(ConfigError::KmerOutOfRange(2))));
        cfg.assembly.k = 65;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn sweep_range_is_checked() {
        let mut cfg = valid();
        cfg.assembly.k = 31;
        cfg.sweep.k_max = Some(25);
        assert!(matches!(cfg.validate(), Err(ConfigError::SweepRange(25, 31))));
    }

    #[test]
    fn erode_setting_mapping() {
        let mut opts = AssemblyOptions::defaults_for_k(21);
        assert_eq!(opts.erode_setting(), ErodeSetting::Auto);
        opts.erode = Some(0);
        assert_eq!(opts.erode_setting(), ErodeSetting::Off);
        opts.erode = Some(4);
        assert_eq!(opts.erode_setting(), ErodeSetting::Fixed(4));
    }

    #[test]
    fn bounds_default_to_k_and_three_k() {
        let opts = AssemblyOptions::defaults_for_k(21);
        assert_eq!(opts.trim_bound(), 21);
        assert_eq!(opts.bubble_bound(), 63);
    }

    #[test]
    fn loads_a_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[assembly]\nk = 31\nerode = 4\nerode_strand = 0\ncoverage = 5.5\n\
             [io]\ninputs = [\"reads.fq\"]\ncontigs_path = \"out.fa\"\n"
        )
        .unwrap();
        let cfg = ForgeConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.assembly.k, 31);
        assert_eq!(cfg.assembly.erode, Some(4));
        assert!((cfg.assembly.coverage - 5.5).abs() < f64::EPSILON);
        assert_eq!(cfg.io.inputs.len(), 1);
        assert!(cfg.validate().is_ok());
    }
}
