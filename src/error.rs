//! Error types for fqsieve

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::fastq::ParseState;

/// Result type alias for fqsieve operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which input or output an open failure refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileRole {
    /// The list of read identifiers to filter by.
    Filter,
    /// The FASTQ file being filtered.
    Target,
    /// Where the kept records are written.
    Output,
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileRole::Filter => "filter-id",
            FileRole::Target => "FASTQ",
            FileRole::Output => "output",
        })
    }
}

/// Error types that can occur in fqsieve
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error while reading or writing an already opened stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A file could not be opened or created
    #[error("could not open {role} file {}: {source}", path.display())]
    Open {
        /// Which file failed
        role: FileRole,
        /// Path as given by the caller
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// An allocation failed while growing one of the index structures
    #[error("out of memory while growing the {0}")]
    OutOfMemory(&'static str),

    /// The input ended in the middle of a record
    #[error(
        "not a valid FASTQ file: input ended while parsing the {state} of record {record} (started at line {line})"
    )]
    InvalidFastq {
        /// Part of the record being parsed when the input ran out
        state: ParseState,
        /// 1-based record ordinal
        record: u64,
        /// 1-based line on which the record starts
        line: u64,
    },

    /// Strict mode only: a record does not start with `@`
    #[error("not a valid FASTQ file: record {record} at line {line} does not start with '@'")]
    MissingHeaderMarker {
        /// 1-based record ordinal
        record: u64,
        /// 1-based line of the offending header
        line: u64,
    },
}

impl Error {
    /// Whether this error means the FASTQ input is malformed.
    pub fn is_invalid_fastq(&self) -> bool {
        matches!(
            self,
            Error::InvalidFastq { .. } | Error::MissingHeaderMarker { .. }
        )
    }
}
