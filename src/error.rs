//src/error.rs

use std::path::PathBuf;
use thiserror::Error;

use crate::tree::TreeState;

/// Every failure the aggregation core can report.
///
/// None of these are recoverable inside the crate: they point at mismatched
/// or malformed pipeline output, so callers decide whether to skip the
/// analysis or stop the batch.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed line or unparseable number.
    #[error("{path}:{line}: {message}")]
    Format {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("taxon '{name}' in {path} is not present in the hierarchy")]
    UnknownTaxon { name: String, path: PathBuf },

    #[error("unknown sample '{name}' ({context})")]
    UnknownSample { name: String, context: String },

    #[error(
        "negative top-aligned count for taxon '{node}' in sample '{sample}': \
         {count} reads at the node but {child_sum} reads in its children"
    )]
    NegativeTopAligned {
        node: String,
        sample: String,
        count: u64,
        child_sum: u64,
    },

    #[error(
        "taxon '{node}' at height {height} is deeper than the {ranks} configured ranks \
         (root offset {offset})"
    )]
    RankOutOfRange {
        node: String,
        height: usize,
        ranks: usize,
        offset: usize,
    },

    #[error("cannot {operation} while the tree is {state}")]
    OutOfOrder {
        operation: &'static str,
        state: TreeState,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(
        "sample '{sample}' reports {total} total reads but {assigned} reads were assigned to ranks"
    )]
    UnassignedUnderflow {
        sample: String,
        total: u64,
        assigned: u64,
    },
}

impl TreeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TreeError>;
