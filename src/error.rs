use std::path::PathBuf;
use thiserror::Error;

/// Error kinds surfaced at the assembly boundary. I/O failures abort the
/// phase that hit them; internal invariant violations are programming
/// errors and panic instead of appearing here.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("no usable sequence: the store is empty after loading")]
    InputUnusable,

    #[error("cannot write output {path:?}: {source}")]
    OutputUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no contigs assembled")]
    AssemblyEmpty,

    #[error("assembly cancelled")]
    Cancelled,
}

impl AssemblyError {
    /// Process exit code for the CLI: configuration errors are
    /// distinguished from runtime failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            AssemblyError::ConfigInvalid(_) => 2,
            _ => 1,
        }
    }
}
